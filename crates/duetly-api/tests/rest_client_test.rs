#![allow(clippy::unwrap_used)]
// Integration tests for `RestClient` using wiremock.

use std::time::Duration;

use bytes::Bytes;
use secrecy::SecretString;
use serde_json::json;
use url::Url;
use wiremock::matchers::{body_string, body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use duetly_api::{CodeAck, Error, RestClient, TransportConfig};

// ── Helpers ─────────────────────────────────────────────────────────

async fn setup() -> (MockServer, RestClient) {
    let server = MockServer::start().await;
    let base_url = Url::parse(&server.uri()).unwrap();
    let config = TransportConfig {
        default_timeout: Duration::from_millis(500),
        ..TransportConfig::default()
    };
    let client = RestClient::with_client(reqwest::Client::new(), base_url, config);
    (server, client)
}

async fn connected() -> (MockServer, RestClient) {
    let (server, client) = setup().await;
    Mock::given(method("GET"))
        .and(path("/machine/connect"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "sessionKey": "k-123", "apiVersion": 1
        })))
        .mount(&server)
        .await;
    client
        .connect(&SecretString::from("secret".to_string()))
        .await
        .unwrap();
    (server, client)
}

// ── Login ───────────────────────────────────────────────────────────

#[tokio::test]
async fn test_connect_forbidden_is_invalid_password() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/machine/connect"))
        .respond_with(ResponseTemplate::new(403))
        .expect(1)
        .mount(&server)
        .await;

    let result = client.connect(&SecretString::from("bad".to_string())).await;
    assert!(matches!(result, Err(Error::InvalidPassword)));
    assert!(client.session().is_none());
}

#[tokio::test]
async fn test_connect_service_unavailable_is_network_error() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/machine/connect"))
        .respond_with(ResponseTemplate::new(502))
        .expect(1)
        .mount(&server)
        .await;

    let err = client
        .connect(&SecretString::from("x".to_string()))
        .await
        .unwrap_err();
    assert!(err.is_transient(), "got: {err:?}");
}

// ── Model & codes ───────────────────────────────────────────────────

#[tokio::test]
async fn test_query_model_sends_session_key() {
    let (server, client) = connected().await;

    Mock::given(method("GET"))
        .and(path("/machine/model"))
        .and(header("X-Session-Key", "k-123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "state": { "status": "idle", "upTime": 12 }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let model = client.query_model().await.unwrap();
    assert_eq!(model["state"]["status"], json!("idle"));
}

#[tokio::test]
async fn test_send_code_waits_for_reply() {
    let (server, client) = connected().await;

    Mock::given(method("POST"))
        .and(path("/machine/code"))
        .and(body_string("M115"))
        .respond_with(ResponseTemplate::new(200).set_body_string("FIRMWARE_NAME: RepRapFirmware"))
        .expect(1)
        .mount(&server)
        .await;

    let ack = client.send_code("M115", true).await.unwrap();
    assert_eq!(
        ack,
        CodeAck::Replied("FIRMWARE_NAME: RepRapFirmware".into())
    );
}

#[tokio::test]
async fn test_send_code_fire_and_forget() {
    let (server, client) = connected().await;

    Mock::given(method("POST"))
        .and(path("/machine/code"))
        .and(query_param("async", "true"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let ack = client.send_code("G28", false).await.unwrap();
    assert!(matches!(ack, CodeAck::Queued { .. }));
}

// ── Files ───────────────────────────────────────────────────────────

#[tokio::test]
async fn test_upload_puts_encoded_path() {
    let (server, client) = connected().await;

    Mock::given(method("PUT"))
        .and(path("/machine/file/0%3A%2Fgcodes%2Fcube.g"))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    client
        .upload(
            "0:/gcodes/cube.g",
            Bytes::from_static(b"G28\n"),
            None,
            None,
            None,
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn test_move_posts_form() {
    let (server, client) = connected().await;

    Mock::given(method("POST"))
        .and(path("/machine/file/move"))
        .and(body_string_contains("force=true"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    client
        .move_file("0:/sys/config.g", "0:/sys/config.g.bak", true)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_missing_directory() {
    let (server, client) = connected().await;

    Mock::given(method("GET"))
        .and(path("/machine/directory/0%3A%2Fnope"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let result = client.list_files("0:/nope").await;
    assert!(matches!(result, Err(Error::DirectoryNotFound { .. })));
}

#[tokio::test]
async fn test_list_directory() {
    let (server, client) = connected().await;

    Mock::given(method("GET"))
        .and(path("/machine/directory/0%3A%2Fmacros"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "type": "f", "name": "home.g", "size": 80, "date": "2024-05-01T08:00:00" },
            { "type": "d", "name": "tools", "size": 0, "date": "2024-05-01T08:00:00" }
        ])))
        .mount(&server)
        .await;

    let files = client.list_files("0:/macros").await.unwrap();
    assert_eq!(files.len(), 2);
    assert!(files[1].is_directory());
}
