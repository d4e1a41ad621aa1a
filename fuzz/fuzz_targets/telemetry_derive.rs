//! Fuzz harness for the telemetry pipeline's parsing surface.
//!
//! Feeds arbitrary bytes through JSON parsing into [`derive_events`],
//! [`packet_hash`], and [`Metadata::from_json`], ensuring no input shape
//! (deep nesting, huge numbers, malformed Unicode, non-object roots) can
//! panic the ingestion path.

#![no_main]
use dropforge_core::{derive_events, packet_hash, Metadata};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    // Metadata parsing tolerates any string.
    let meta = Metadata::from_json(text);
    let _ = meta.price_cents();
    let _ = Metadata::from_json(&meta.to_json());

    let Ok(packet) = serde_json::from_str::<serde_json::Value>(text) else {
        return;
    };

    // Hashing is total and stable.
    let first = packet_hash(&packet);
    assert_eq!(first, packet_hash(&packet));
    assert_eq!(first.len(), 64);

    // Derivation always yields at least one event and never panics.
    let events = derive_events(&packet);
    assert!(!events.is_empty());
});
