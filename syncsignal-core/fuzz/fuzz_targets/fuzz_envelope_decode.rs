#![no_main]

use libfuzzer_sys::fuzz_target;
use syncsignal_core::codec::{decode_envelope, encode_envelope};

fuzz_target!(|data: &[u8]| {
    // Payloads arrive from other contexts and from disk; none may panic
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    if let Ok(envelope) = decode_envelope(text) {
        // Anything accepted must be re-encodable into something accepted
        let again = decode_envelope(&encode_envelope(&envelope)).expect("re-encoded envelope decodes");
        assert_eq!(again.timestamp, envelope.timestamp);
    }
});
