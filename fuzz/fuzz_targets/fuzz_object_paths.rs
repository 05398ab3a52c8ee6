//! Fuzz target for object path parsing and normalization.
//!
//! Checks that `parse_object_path` only yields well-formed locations, that
//! signing any such location yields a URL under the signer base, and that
//! `normalize_object_entity_path` maps raw backend URLs onto logical paths.
//!
//! Run with: `cargo +nightly fuzz run fuzz_object_paths`

#![no_main]

use std::time::Duration;

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use opsdesk::storage::{
    GatewayConfig, HmacUrlSigner, MemoryBackend, ObjectStorageGateway, SignMethod,
    parse_object_path,
};

const BASE: &str = "http://localhost:5000/storage";

#[derive(Arbitrary, Debug)]
struct Input {
    path: String,
    /// Prefix the path with the object URL base.
    as_url: bool,
}

fuzz_target!(|input: Input| {
    let signer = HmacUrlSigner::new(BASE, "fuzz-secret", "fuzz").expect("valid signer");

    if let Ok(location) = parse_object_path(&input.path) {
        // INVARIANT: single-segment, non-empty bucket and a non-empty name
        assert!(!location.bucket.is_empty());
        assert!(!location.bucket.contains('/'));
        assert!(!location.name.is_empty());

        // INVARIANT: signed URLs stay under the base
        if let Ok(signed) = signer.sign(&location, SignMethod::Get, Duration::from_secs(60)) {
            assert!(signed.url.starts_with(BASE), "escaped base: {}", signed.url);
        }
    }

    let gateway = ObjectStorageGateway::new(
        MemoryBackend::new(signer),
        GatewayConfig::new(vec!["/b/public".to_string()], "/b/.private").with_object_url_base(BASE),
    );
    let raw = if input.as_url {
        format!("{BASE}{}", input.path)
    } else {
        input.path
    };
    let normalized = gateway.normalize_object_entity_path(&raw);

    // INVARIANT: anything outside the base passes through untouched
    if !raw.starts_with(BASE) {
        assert_eq!(normalized, raw);
    }

    // INVARIANT: plain keys under the private root map onto /objects/
    if let Some(entity) = raw.strip_prefix(&format!("{BASE}/b/.private/"))
        && !entity.contains(['?', '#', '%'])
    {
        assert_eq!(normalized, format!("/objects/{entity}"));
    }
});
