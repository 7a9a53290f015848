#![no_main]

use std::collections::BTreeMap;

use libfuzzer_sys::fuzz_target;
use bordereau::render::render_template;

fuzz_target!(|data: &[u8]| {
    // Arbitrary template text, including unbalanced and nested braces
    let template = String::from_utf8_lossy(data);

    let mut values = BTreeMap::new();
    values.insert("number".to_string(), "2025 0001".to_string());
    values.insert("marchandise".to_string(), "{{number}}".to_string());

    let rendered = render_template(&template, &values);

    // Without any placeholder the text must come back unchanged
    if !template.contains("{{") {
        assert_eq!(rendered, template);
    }
});
