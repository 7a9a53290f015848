use std::collections::BTreeMap;

/// Replaces every `{{key}}` in `template` with `values[key]`.
///
/// Unknown keys render as the empty string. Whitespace inside the braces is
/// not trimmed. An opening `{{` without a closing `}}` is copied verbatim.
pub fn render_template(template: &str, values: &BTreeMap<String, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find("{{") {
        out.push_str(&rest[..open]);
        let after_open = &rest[open + 2..];
        match after_open.find("}}") {
            Some(close) => {
                let key = &after_open[..close];
                if let Some(value) = values.get(key) {
                    out.push_str(value);
                }
                rest = &after_open[close + 2..];
            }
            None => {
                out.push_str(&rest[open..]);
                return out;
            }
        }
    }

    out.push_str(rest);
    out
}
