//! Verify certificate formatting and response handling against JSON test
//! vectors stored in `test-vectors/`.
//!
//! Each vector file lists named cases with an input and the expected output.
//! Case names are included in every assertion message so a failing vector is
//! easy to find.

use std::time::Duration;

use mock_server::{pki::TestPki, tls::server_tls_config, BackgroundServer};
use mtls_post_core::{send_authenticated, to_compact_text, to_display_text, Error, SendOptions};

// ---------------------------------------------------------------------------
// Certificate display text
// ---------------------------------------------------------------------------

#[test]
fn display_text_vectors() {
    let raw = include_str!("../../test-vectors/display_text.json");
    let vectors: serde_json::Value = serde_json::from_str(raw).unwrap();

    for case in vectors["cases"].as_array().unwrap() {
        let name = case["name"].as_str().unwrap();
        let input = case["input"].as_str().unwrap();

        let display = to_display_text(input);
        assert_eq!(display, case["display"].as_str().unwrap(), "{name}: display");
        assert_eq!(to_display_text(&display), display, "{name}: display idempotent");

        let compact = to_compact_text(input);
        assert_eq!(compact, case["compact"].as_str().unwrap(), "{name}: compact");
        assert_eq!(to_compact_text(&compact), compact, "{name}: compact idempotent");
    }
}

// ---------------------------------------------------------------------------
// Responses served byte for byte by a raw mTLS server
// ---------------------------------------------------------------------------

#[test]
fn response_vectors() {
    let raw = include_str!("../../test-vectors/responses.json");
    let vectors: serde_json::Value = serde_json::from_str(raw).unwrap();
    let pki = TestPki::generate().unwrap();
    let options = SendOptions::new()
        .insecure_skip_verify(true)
        .connect_timeout(Duration::from_secs(5))
        .overall_timeout(Duration::from_secs(10));

    for case in vectors["cases"].as_array().unwrap() {
        let name = case["name"].as_str().unwrap();
        let server = BackgroundServer::start_raw(
            server_tls_config(&pki).unwrap(),
            case["raw"].as_str().unwrap(),
        )
        .unwrap();

        let result = send_authenticated(
            &server.url("/"),
            b"{}",
            pki.client_cert_pem.as_bytes(),
            pki.client_key_pem.as_bytes(),
            options.clone(),
        );

        if let Some(expected_error) = case.get("expected_error") {
            let err = result.expect_err(name);
            match expected_error.as_str().unwrap() {
                "Network" => assert!(matches!(err, Error::Network(_)), "{name}: got {err:?}"),
                other => panic!("{name}: unknown expected_error: {other}"),
            }
            continue;
        }

        let response = result.unwrap_or_else(|e| panic!("{name}: {e}"));
        let expected = &case["expected"];
        assert_eq!(
            u64::from(response.status),
            expected["status"].as_u64().unwrap(),
            "{name}: status"
        );
        assert_eq!(
            response.body,
            expected["body"].as_str().unwrap().as_bytes(),
            "{name}: body"
        );
    }
}
