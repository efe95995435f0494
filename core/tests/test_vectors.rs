//! Verify URL resolution against JSON test vectors stored in `test-vectors/`.
//!
//! Each case names a resource, whether it is org scoped, and either the
//! expected absolute URL or the expected error kind.

use pce_core::{resolve_url, Credential};

#[test]
fn resolve_url_test_vectors() {
    let raw = include_str!("../../test-vectors/resolve_url.json");
    let vectors: serde_json::Value = serde_json::from_str(raw).unwrap();

    let c = &vectors["credential"];
    let credential = Credential::new(
        c["identity"].as_str().unwrap(),
        c["secret"].as_str().unwrap(),
        c["host"].as_str().unwrap(),
    )
    .with_port(c["port"].as_u64().unwrap() as u16)
    .with_org_scope(c["org_scope"].as_str().unwrap());

    for case in vectors["cases"].as_array().unwrap() {
        let name = case["name"].as_str().unwrap();
        let resource = case["resource"].as_str().unwrap();
        let org_scoped = case["org_scoped"].as_bool().unwrap();

        let result = resolve_url(&credential, resource, org_scoped);
        match case["expected"].as_str() {
            Some(expected) => assert_eq!(result.unwrap(), expected, "{name}"),
            None => {
                let err = result.unwrap_err();
                assert_eq!(err.kind(), case["expected_error"].as_str().unwrap(), "{name}");
            }
        }
    }
}

#[test]
fn resolved_urls_have_one_separator_after_api_root() {
    let raw = include_str!("../../test-vectors/resolve_url.json");
    let vectors: serde_json::Value = serde_json::from_str(raw).unwrap();
    let credential = Credential::new("u", "p", "pce").with_org_scope("orgs/85");

    for case in vectors["cases"].as_array().unwrap() {
        let resource = case["resource"].as_str().unwrap();
        // Inputs with at most one leading separator.
        if resource.is_empty() || resource.starts_with("//") || resource == "/" {
            continue;
        }
        for org_scoped in [false, true] {
            let url = resolve_url(&credential, resource, org_scoped).unwrap();
            let after_root = url.split("/api/v2").nth(1).unwrap();
            assert!(after_root.starts_with('/'), "{url}");
            assert!(!after_root.contains("//"), "{url}");
        }
    }
}
