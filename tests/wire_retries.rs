//! Transport retry and content store conflict behavior over a local stub
//!
//! The stub answers a fixed sequence of canned http responses on a loopback
//! port, one connection per response, so tests can script exactly what the
//! server says on each attempt.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use eventcall::client::store::{encode_content, rsvps_path};
use eventcall::client::{ContentStore, RetryPolicy, Transport};
use eventcall::ErrorKind;

/// Render one canned http response
fn canned(status: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
        body.len()
    )
}

/// Serve a fixed sequence of responses on a loopback port
async fn serve(responses: Vec<String>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        for response in responses {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            // drain the request head before answering
            let mut buf = [0u8; 8192];
            let _ = socket.read(&mut buf).await;
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.shutdown().await;
        }
    });
    format!("http://{addr}")
}

/// Build a transport that retries fast
fn transport() -> Transport {
    let policy = RetryPolicy {
        max_attempts: 3,
        base_delay_ms: 1,
        jitter: false,
    };
    Transport::new(&reqwest::Client::new(), policy)
}

#[tokio::test]
async fn transient_server_errors_are_retried() {
    let host = serve(vec![
        canned("503 Service Unavailable", r#"{"error":"warming up"}"#),
        canned("200 OK", r#"{"ok":true}"#),
    ])
    .await;
    let transport = transport();
    let req = transport.raw().get(format!("{host}/api/events"));
    let resp = transport.send(req, "events_list").await.unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::OK);
}

#[tokio::test]
async fn client_errors_fail_without_a_retry() {
    // only one response is scripted; a retry would hit a dead listener and
    // surface a network error instead of the 400
    let host = serve(vec![canned("400 Bad Request", r#"{"error":"bad form"}"#)]).await;
    let transport = transport();
    let req = transport.raw().get(format!("{host}/api/events"));
    let error = transport.send(req, "events_list").await.unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn lost_version_races_reread_and_reapply() {
    let blob_v1 = format!(
        r#"{{"content":"{}"}}"#,
        encode_content(br#"["amy@example.com"]"#)
    );
    let blob_v2 = format!(
        r#"{{"content":"{}"}}"#,
        encode_content(br#"["amy@example.com","ben@example.com"]"#)
    );
    let host = serve(vec![
        // first round reads the blob at v1 and loses the write race
        canned(
            "200 OK",
            r#"{"tree":[{"path":"rsvps/E1.json","sha":"v1","type":"blob"}]}"#,
        ),
        canned("200 OK", &blob_v1),
        canned("409 Conflict", r#"{"error":"sha mismatch"}"#),
        // the reread finds the row the race winner wrote at v2
        canned(
            "200 OK",
            r#"{"tree":[{"path":"rsvps/E1.json","sha":"v2","type":"blob"}]}"#,
        ),
        canned("200 OK", &blob_v2),
        canned("200 OK", r#"{"content":{"sha":"v3"}}"#),
    ])
    .await;
    let store = ContentStore::new(&host, "main", transport());
    let mut seen = Vec::new();
    let version = store
        .update_blob(&rsvps_path("E1"), "Update RSVPs for E1", 3, |current| {
            let mut rows: Vec<String> = match current {
                Some(bytes) => serde_json::from_slice(bytes)?,
                None => Vec::new(),
            };
            seen.push(rows.len());
            rows.push("cam@example.com".to_owned());
            Ok(serde_json::to_vec(&rows)?)
        })
        .await
        .unwrap();
    // the write that stuck replaced v2 and was applied on top of both rows
    assert_eq!(version, "v3");
    assert_eq!(seen, vec![1, 2]);
}

#[tokio::test]
async fn exhausted_conflict_bounds_surface_the_conflict() {
    let blob = format!(r#"{{"content":"{}"}}"#, encode_content(b"[]"));
    let tree = r#"{"tree":[{"path":"rsvps/E1.json","sha":"v1","type":"blob"}]}"#;
    // both rounds lose the race
    let host = serve(vec![
        canned("200 OK", tree),
        canned("200 OK", &blob),
        canned("409 Conflict", r#"{"error":"sha mismatch"}"#),
        canned("200 OK", tree),
        canned("200 OK", &blob),
        canned("409 Conflict", r#"{"error":"sha mismatch"}"#),
    ])
    .await;
    let store = ContentStore::new(&host, "main", transport());
    let error = store
        .update_blob(&rsvps_path("E1"), "Update RSVPs for E1", 2, |current| {
            Ok(current.unwrap_or_default().to_vec())
        })
        .await
        .unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Conflict);
}
