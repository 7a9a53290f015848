#![no_main]

use libfuzzer_sys::fuzz_target;
use bordereau::contracts::OutgoingMail;
use bordereau::mail::validate;

fuzz_target!(|data: &[u8]| {
    // Relay payloads arrive as untrusted JSON; decoding and validation must
    // reject bad input without panicking
    if let Ok(mail) = serde_json::from_slice::<OutgoingMail>(data) {
        let _ = validate(&mail);
    }
});
