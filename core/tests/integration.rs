//! End-to-end tests against the live mock PCE.
//!
//! # Design
//! Starts the mock server on a random port and drives the real
//! `UreqTransport` through every call path: probe-then-sync, probe-then-async,
//! label and workload writes, and a rejected credential.

use std::time::Duration;

use mock_pce::{AppState, MockConfig, Store};
use pce_core::{
    ApiError, CancellationReceiver, Credential, Dispatcher, HttpMethod, PceClient, Request, UnmanagedWorkload,
    UreqTransport,
};
use serde_json::json;

async fn start(config: MockConfig, store: Store) -> u16 {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(mock_pce::run_with_state(listener, AppState::with_store(config, store)));
    port
}

fn credential(port: u16) -> Credential {
    Credential::new("api_user", "api_secret", "127.0.0.1")
        .with_scheme("http")
        .with_port(port)
        .with_org_id(1)
}

fn client() -> PceClient<UreqTransport> {
    PceClient::new(Dispatcher::new(UreqTransport::new()))
}

fn labels(n: usize) -> Store {
    let mut store = Store::default();
    for i in 0..n {
        store.add_label(1, "app", &format!("app-{i}"));
    }
    store
}

#[tokio::test(flavor = "multi_thread")]
async fn small_label_list_is_synchronous() {
    let port = start(MockConfig::default(), labels(3)).await;

    let fetched = client().list_labels(&credential(port)).await.unwrap();

    assert_eq!(fetched.len(), 3);
    assert_eq!(fetched[0].href, "/orgs/1/labels/1");
}

#[tokio::test(flavor = "multi_thread")]
async fn large_label_list_goes_through_async_job() {
    let config = MockConfig {
        retry_after_secs: 0,
        pending_polls: 1,
        ..MockConfig::default()
    };
    let port = start(config, labels(650)).await;

    let fetched = client().list_labels(&credential(port)).await.unwrap();

    // A synchronous page would have stopped at 500.
    assert_eq!(fetched.len(), 650);
    let index = pce_core::LabelIndex::new(&fetched);
    assert_eq!(index.href("app", "app-649"), Some("/orgs/1/labels/650"));
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_async_job_surfaces_diagnostics() {
    let config = MockConfig {
        fail_jobs: true,
        ..MockConfig::default()
    };
    let port = start(config, labels(1)).await;
    let dispatcher = Dispatcher::new(UreqTransport::new());

    let request = Request::list("/labels").with_volume(pce_core::Volume::Large);
    let err = dispatcher.call(&credential(port), request).await.unwrap_err();

    match err {
        ApiError::AsyncJobFailed { diagnostics, .. } => assert!(diagnostics.contains("job_failed")),
        other => panic!("expected AsyncJobFailed, got {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn deadline_bounds_a_slow_job() {
    let config = MockConfig {
        retry_after_secs: 5,
        ..MockConfig::default()
    };
    let port = start(config, labels(1)).await;

    // Below the threshold the deadline is never reached.
    let client = client().with_call_timeout(Duration::from_secs(5));
    assert!(client.list_workloads(&credential(port)).await.unwrap().is_empty());

    let dispatcher = Dispatcher::new(UreqTransport::new());
    let cancel = CancellationReceiver::none().with_timeout(Duration::from_millis(300));
    let request = Request::list("/labels").with_volume(pce_core::Volume::Large);
    let err = dispatcher
        .call_with_cancellation(&credential(port), request, &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Cancelled));
}

#[tokio::test(flavor = "multi_thread")]
async fn label_create_and_rename() {
    let port = start(MockConfig::default(), Store::default()).await;
    let cred = credential(port);
    let client = client();

    let created = client.create_label(&cred, "role", "db").await.unwrap();
    assert_eq!(created.key, "role");

    let duplicate = client.create_label(&cred, "role", "db").await.unwrap_err();
    assert!(matches!(duplicate, ApiError::HttpError { status: 406, .. }));

    client.update_label(&cred, &created.href, "database").await.unwrap();
    let index = client.label_index(&cred).await.unwrap();
    assert_eq!(index.href("role", "database"), Some(created.href.as_str()));
    assert_eq!(index.href("role", "db"), None);

    let missing = client.update_label(&cred, "/orgs/1/labels/999", "x").await.unwrap_err();
    assert!(matches!(missing, ApiError::NotFound));
}

#[tokio::test(flavor = "multi_thread")]
async fn unmanaged_workload_registration_and_update() {
    let port = start(MockConfig::default(), Store::default()).await;
    let cred = credential(port);
    let client = client();

    let role = client.create_label(&cred, "role", "web").await.unwrap();
    let input = UnmanagedWorkload::new("web-1", "web-1.corp", "10.1.2.3", [role.href.clone()]);
    let created = client.create_unmanaged_workload(&cred, &input).await.unwrap();
    assert_eq!(created.public_ip.as_deref(), Some("10.1.2.3"));
    assert!(created.online);
    assert_eq!(created.labels.len(), 1);

    client
        .update_workload(&cred, &created.href, json!({"hostname": "web-1.prod"}))
        .await
        .unwrap();

    let workloads = client.list_workloads(&cred).await.unwrap();
    assert_eq!(workloads.len(), 1);
    assert_eq!(workloads[0].hostname.as_deref(), Some("web-1.prod"));
    assert_eq!(workloads[0].labels[0].href, role.href);
}

#[tokio::test(flavor = "multi_thread")]
async fn labels_are_assigned_by_address() {
    let port = start(MockConfig::default(), Store::default()).await;
    let cred = credential(port);
    let client = client();

    let web = client.create_label(&cred, "role", "web").await.unwrap();
    let input = UnmanagedWorkload::new("web-1", "web-1.corp", "10.1.2.3", Vec::<String>::new());
    let workload = client.create_unmanaged_workload(&cred, &input).await.unwrap();

    let assigned = client
        .assign_labels(&cred, "10.1.2.3", &[("role", "web"), ("app", ""), ("env", "prod")])
        .await
        .unwrap();
    assert_eq!(assigned, [workload.href.clone()]);

    let index = client.label_index(&cred).await.unwrap();
    let prod = index.href("env", "prod").expect("env label created");
    let workloads = client.list_workloads(&cred).await.unwrap();
    let hrefs: Vec<&str> = workloads[0].labels.iter().map(|l| l.href.as_str()).collect();
    assert_eq!(hrefs, [web.href.as_str(), prod]);

    let unmatched = client.assign_labels(&cred, "10.9.9.9", &[("role", "web")]).await.unwrap();
    assert!(unmatched.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn bad_secret_returns_status_not_error() {
    let port = start(MockConfig::default(), labels(1)).await;
    let cred = Credential::new("api_user", "wrong", "127.0.0.1")
        .with_scheme("http")
        .with_port(port)
        .with_org_id(1);
    let dispatcher = Dispatcher::new(UreqTransport::new());

    let response = dispatcher.call(&cred, Request::list("/labels")).await.unwrap();
    assert_eq!(response.status, 401);

    let response = dispatcher
        .call(&cred, Request::new(HttpMethod::Get, "/orgs/1/labels/1"))
        .await
        .unwrap();
    assert_eq!(response.status, 401);
}

#[tokio::test(flavor = "multi_thread")]
async fn unreachable_host_is_network_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    let dispatcher = Dispatcher::new(UreqTransport::new());

    let err = dispatcher
        .call(&credential(port), Request::new(HttpMethod::Get, "/orgs/1/labels/1"))
        .await
        .unwrap_err();

    assert!(matches!(err, ApiError::Network(_)), "got {err:?}");
}

/// Accept one connection, answer 204, and hand back the raw request text.
fn capture_one_request() -> (u16, std::thread::JoinHandle<String>) {
    use std::io::{Read, Write};

    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let handle = std::thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut raw = Vec::new();
        let mut buf = [0u8; 1024];
        loop {
            let n = stream.read(&mut buf).unwrap();
            raw.extend_from_slice(&buf[..n]);
            let text = String::from_utf8_lossy(&raw).to_string();
            if let Some(end) = text.find("\r\n\r\n") {
                let length = text[..end]
                    .lines()
                    .find_map(|line| {
                        let (name, value) = line.split_once(':')?;
                        name.eq_ignore_ascii_case("content-length")
                            .then(|| value.trim().parse::<usize>().ok())
                            .flatten()
                    })
                    .unwrap_or(0);
                if raw.len() >= end + 4 + length || n == 0 {
                    break;
                }
            }
            if n == 0 {
                break;
            }
        }
        stream
            .write_all(b"HTTP/1.1 204 No Content\r\nContent-Length: 0\r\nConnection: close\r\n\r\n")
            .unwrap();
        String::from_utf8_lossy(&raw).to_string()
    });
    (port, handle)
}

#[tokio::test(flavor = "multi_thread")]
async fn delete_payload_reaches_the_wire() {
    let (port, server) = capture_one_request();
    let dispatcher = Dispatcher::new(UreqTransport::new());

    let request = Request::new(HttpMethod::Delete, "/orgs/1/labels/7").with_payload(json!({"force": true}));
    let response = dispatcher.call(&credential(port), request).await.unwrap();
    assert_eq!(response.status, 204);

    let raw = server.join().unwrap();
    assert!(raw.starts_with("DELETE /api/v2/orgs/1/labels/7 HTTP/1.1"), "{raw}");
    assert!(raw.ends_with(r#"{"force":true}"#), "{raw}");
}
