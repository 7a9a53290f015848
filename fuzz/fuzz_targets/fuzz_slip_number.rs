#![no_main]

use libfuzzer_sys::fuzz_target;
use bordereau::contracts::SlipNumber;

fuzz_target!(|data: &[u8]| {
    let text = String::from_utf8_lossy(data);

    // Parsing arbitrary text must not panic; accepted numbers print back
    // with the same sequence value
    if let Ok(number) = text.parse::<SlipNumber>() {
        let reparsed: SlipNumber = number.to_string().parse().unwrap();
        assert_eq!(reparsed.sequence, number.sequence);
        assert_eq!(reparsed.prefix, number.prefix);
    }
});
