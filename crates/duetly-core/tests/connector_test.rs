#![allow(clippy::unwrap_used)]
// Integration tests for `Connector` against a mocked standalone controller.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use secrecy::SecretString;
use serde_json::{Value, json};
use tokio::sync::broadcast;
use url::Url;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

use duetly_api::{Error, ReconnectPolicy, Variant};
use duetly_core::{
    ConnectionState, Connector, ConnectorConfig, ConnectorEvent, CoreError, MachineStatus,
    ObjectModel, Protocol,
};

const LIVE_FLAGS: &str = "d99fn";
const FULL_FLAGS: &str = "d99vn";

// ── Helpers ─────────────────────────────────────────────────────────

/// Responds with `body(n)` for the n-th request, counting from zero.
struct Counting<F> {
    calls: AtomicU64,
    body: F,
}

impl<F> Counting<F>
where
    F: Fn(u64) -> Value + Send + Sync,
{
    fn new(body: F) -> Self {
        Self {
            calls: AtomicU64::new(0),
            body,
        }
    }
}

impl<F> Respond for Counting<F>
where
    F: Fn(u64) -> Value + Send + Sync,
{
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        ResponseTemplate::new(200).set_body_json((self.body)(n))
    }
}

/// Responds with `respond(n)` for the n-th request, status included.
fn sequenced<F>(respond: F) -> impl Respond
where
    F: Fn(u64) -> ResponseTemplate + Send + Sync + 'static,
{
    let calls = AtomicU64::new(0);
    move |_: &Request| respond(calls.fetch_add(1, Ordering::SeqCst))
}

fn unavailable() -> ResponseTemplate {
    ResponseTemplate::new(503)
}

fn config(server: &MockServer) -> ConnectorConfig {
    let mut config = ConnectorConfig::new(
        Url::parse(&server.uri()).unwrap(),
        SecretString::from("reprap".to_string()),
    );
    config.protocol = Protocol::Poll;
    config.default_timeout = Duration::from_millis(500);
    config.update_interval = Duration::from_millis(10);
    config
}

async fn setup() -> MockServer {
    let server = MockServer::start().await;
    mount_login(&server).await;
    mount_sections(&server).await;
    Mock::given(method("GET"))
        .and(path("/rr_disconnect"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "err": 0 })))
        .mount(&server)
        .await;
    server
}

async fn mount_login(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/rr_connect"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "err": 0,
            "sessionTimeout": 8000,
            "boardType": "duet3mb6hc",
            "apiLevel": 1
        })))
        .mount(server)
        .await;
}

/// Every section not mocked more specifically comes back empty.
async fn mount_sections(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/rr_model"))
        .and(query_param("flags", FULL_FLAGS))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "result": null })))
        .with_priority(10)
        .mount(server)
        .await;
}

async fn mount_live<F>(server: &MockServer, body: F)
where
    F: Fn(u64) -> Value + Send + Sync + 'static,
{
    Mock::given(method("GET"))
        .and(path("/rr_model"))
        .and(query_param("flags", LIVE_FLAGS))
        .respond_with(Counting::new(body))
        .mount(server)
        .await;
}

/// Accepts codes and raises `sent` once the first one arrived.
async fn mount_gcode(server: &MockServer, sent: Arc<AtomicBool>) {
    Mock::given(method("GET"))
        .and(path("/rr_gcode"))
        .respond_with(Counting::new(move |_| {
            sent.store(true, Ordering::SeqCst);
            json!({ "buff": 255 })
        }))
        .mount(server)
        .await;
}

fn live(up_time: i64, seqs: Value) -> Value {
    json!({
        "result": {
            "state": { "status": "idle", "upTime": up_time },
            "seqs": seqs
        }
    })
}

async fn wait_for_model(connector: &Connector, pred: impl Fn(&ObjectModel) -> bool) {
    let mut rx = connector.model();
    tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|model| pred(model)))
        .await
        .unwrap()
        .unwrap();
}

/// Collect announced connection states until `done` holds for them.
async fn wait_for_states(
    events: &mut broadcast::Receiver<ConnectorEvent>,
    done: impl Fn(&[ConnectionState]) -> bool,
) -> Vec<ConnectionState> {
    let mut states = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), async {
        while !done(&states) {
            match events.recv().await {
                Ok(ConnectorEvent::ConnectionStateChanged { state }) => states.push(state),
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
    .await
    .unwrap();
    states
}

fn back_live_after_first_attempt(states: &[ConnectionState]) -> bool {
    states.windows(2).any(|pair| {
        pair == [
            ConnectionState::Reconnecting { attempt: 1 },
            ConnectionState::Live,
        ]
    })
}

// ── Lifecycle ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_connect_syncs_every_section_and_goes_live() {
    let server = setup().await;
    mount_live(&server, |_| live(1000, json!({ "state": 3, "reply": 0 }))).await;
    Mock::given(method("GET"))
        .and(path("/rr_model"))
        .and(query_param("key", "state"))
        .and(query_param("flags", FULL_FLAGS))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "result": { "status": "idle", "upTime": 1000 }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = config(&server);
    config.protocol = Protocol::Auto;
    let connector = Connector::new(config);
    let mut events = connector.subscribe();

    connector.connect().await.unwrap();

    assert_eq!(connector.connection_state(), ConnectionState::Live);
    assert_eq!(connector.variant(), Some(Variant::Poll));
    let session = connector.session().unwrap();
    assert_eq!(session.api_level, 1);
    assert_eq!(session.board_type.as_deref(), Some("duet3mb6hc"));

    let model = connector.snapshot();
    assert_eq!(model.state.status, MachineStatus::Idle);
    assert_eq!(model.state.up_time, 1000);

    let mut states = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let ConnectorEvent::ConnectionStateChanged { state } = event {
            states.push(state);
        }
    }
    assert_eq!(states.first(), Some(&ConnectionState::Connecting));
    assert_eq!(states.last(), Some(&ConnectionState::Live));
    assert!(states.contains(&ConnectionState::SyncingInitialModel { progress: 1.0 }));

    connector.disconnect(true).await;
    assert_eq!(connector.connection_state(), ConnectionState::Disconnected);
    assert!(connector.session().is_none());
}

#[tokio::test]
async fn test_connect_twice_is_rejected() {
    let server = setup().await;
    mount_live(&server, |_| live(1000, json!({ "reply": 0 }))).await;

    let connector = Connector::new(config(&server));
    connector.connect().await.unwrap();

    let err = connector.connect().await.unwrap_err();
    assert!(matches!(err, CoreError::AlreadyConnected));

    connector.disconnect(true).await;
}

#[tokio::test]
async fn test_invalid_password_requires_login() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rr_connect"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "err": 1 })))
        .mount(&server)
        .await;

    let connector = Connector::new(config(&server));
    let mut events = connector.subscribe();

    let err = connector.connect().await.unwrap_err();
    assert!(matches!(err.api_error(), Some(Error::InvalidPassword)));
    assert!(err.is_terminal_login());
    assert!(connector.session().is_none());
    assert_eq!(connector.connection_state(), ConnectionState::Disconnected);

    let mut login_required = false;
    while let Ok(event) = events.try_recv() {
        login_required |= matches!(event, ConnectorEvent::LoginRequired { .. });
    }
    assert!(login_required);
}

#[tokio::test]
async fn test_operations_require_a_connection() {
    let config = ConnectorConfig::new(
        Url::parse("http://duet.invalid").unwrap(),
        SecretString::from(String::new()),
    );
    let connector = Connector::new(config);

    assert!(matches!(
        connector.send_code("M115", true).await,
        Err(CoreError::NotConnected)
    ));
    assert!(matches!(
        connector.reconnect().await,
        Err(CoreError::NotConnected)
    ));
    assert!(matches!(
        connector.list_files("0:/gcodes").await,
        Err(CoreError::NotConnected)
    ));
}

#[tokio::test]
async fn test_explicit_reconnect_logs_in_again() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rr_connect"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "err": 0,
            "apiLevel": 1
        })))
        .expect(2)
        .mount(&server)
        .await;
    mount_sections(&server).await;
    mount_live(&server, |_| live(1000, json!({ "reply": 0 }))).await;

    let connector = Connector::new(config(&server));
    connector.connect().await.unwrap();
    connector.reconnect().await.unwrap();

    assert_eq!(connector.connection_state(), ConnectionState::Live);
    connector.disconnect(false).await;
}

// ── Recovery ────────────────────────────────────────────────────────

#[tokio::test]
async fn test_transient_poll_failure_reconnects_and_goes_live() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rr_connect"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "err": 0,
            "apiLevel": 1
        })))
        .expect(2)
        .mount(&server)
        .await;
    mount_sections(&server).await;
    // The first attempt and both retries of one live query fail.
    Mock::given(method("GET"))
        .and(path("/rr_model"))
        .and(query_param("flags", LIVE_FLAGS))
        .respond_with(sequenced(|n| {
            if (2..5).contains(&n) {
                unavailable()
            } else {
                ResponseTemplate::new(200).set_body_json(live(1000, json!({ "reply": 0 })))
            }
        }))
        .mount(&server)
        .await;

    let connector = Connector::new(config(&server));
    let mut events = connector.subscribe();
    connector.connect().await.unwrap();

    let states = wait_for_states(&mut events, back_live_after_first_attempt).await;
    assert!(!states.contains(&ConnectionState::Failed));
    assert_eq!(connector.connection_state(), ConnectionState::Live);

    connector.disconnect(false).await;
}

#[tokio::test]
async fn test_halted_controller_forces_a_reconnect() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rr_connect"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "err": 0,
            "apiLevel": 1
        })))
        .expect(2)
        .mount(&server)
        .await;
    mount_sections(&server).await;
    mount_live(&server, |n| {
        let status = if n < 3 { "idle" } else { "halted" };
        json!({
            "result": {
                "state": { "status": status, "upTime": 1000 },
                "seqs": { "reply": 0 }
            }
        })
    })
    .await;

    let connector = Connector::new(config(&server));
    let mut events = connector.subscribe();
    connector.connect().await.unwrap();

    wait_for_states(&mut events, back_live_after_first_attempt).await;
    wait_for_model(&connector, |model| model.state.status == MachineStatus::Halted).await;

    // Staying halted is not a new transition.
    tokio::time::sleep(Duration::from_millis(100)).await;
    connector.disconnect(false).await;
}

#[tokio::test]
async fn test_reboot_requeries_every_section() {
    let server = setup().await;
    mount_live(&server, |n| {
        let up_time = if n < 3 { 1000 } else { 5 };
        live(up_time, json!({ "heat": 4, "fans": 9, "reply": 0 }))
    })
    .await;
    for key in ["heat", "fans"] {
        Mock::given(method("GET"))
            .and(path("/rr_model"))
            .and(query_param("key", key))
            .and(query_param("flags", FULL_FLAGS))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "result": null })))
            .expect(2)
            .mount(&server)
            .await;
    }

    let connector = Connector::new(config(&server));
    connector.connect().await.unwrap();

    wait_for_model(&connector, |model| model.state.up_time == 5).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(connector.connection_state(), ConnectionState::Live);
    connector.disconnect(true).await;
}

#[tokio::test]
async fn test_failed_recovery_refuses_new_codes() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rr_connect"))
        .respond_with(sequenced(|n| {
            if n == 0 {
                ResponseTemplate::new(200).set_body_json(json!({ "err": 0, "apiLevel": 1 }))
            } else {
                unavailable()
            }
        }))
        .mount(&server)
        .await;
    mount_sections(&server).await;
    Mock::given(method("GET"))
        .and(path("/rr_model"))
        .and(query_param("flags", LIVE_FLAGS))
        .respond_with(sequenced(|n| {
            if n == 0 {
                ResponseTemplate::new(200).set_body_json(live(1000, json!({ "reply": 0 })))
            } else {
                unavailable()
            }
        }))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rr_gcode"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "buff": 255 })))
        .expect(0)
        .mount(&server)
        .await;

    let mut config = config(&server);
    config.reconnect = ReconnectPolicy {
        max_attempts: Some(1),
        ..ReconnectPolicy::default()
    };
    let connector = Connector::new(config);
    connector.connect().await.unwrap();

    let mut state = connector.state();
    tokio::time::timeout(
        Duration::from_secs(5),
        state.wait_for(|s| *s == ConnectionState::Failed),
    )
    .await
    .unwrap()
    .unwrap();

    let result = tokio::time::timeout(Duration::from_secs(2), connector.send_code("M115", true))
        .await
        .unwrap();
    assert!(matches!(result, Err(CoreError::NotConnected)));

    connector.disconnect(false).await;
}

// ── Sequence-gated sync ─────────────────────────────────────────────

#[tokio::test]
async fn test_moved_sequence_requeries_only_that_section() {
    let server = setup().await;
    mount_live(&server, |n| {
        let heat = if n < 3 { 1 } else { 2 };
        live(1000, json!({ "heat": heat, "fans": 7, "reply": 0 }))
    })
    .await;
    Mock::given(method("GET"))
        .and(path("/rr_model"))
        .and(query_param("key", "heat"))
        .respond_with(Counting::new(|n| {
            let current = if n == 0 { 20.0 } else { 210.0 };
            json!({ "result": { "heaters": [{ "current": current, "state": "active" }] } })
        }))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rr_model"))
        .and(query_param("key", "fans"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "result": [] })))
        .expect(1)
        .mount(&server)
        .await;

    let connector = Connector::new(config(&server));
    connector.connect().await.unwrap();

    wait_for_model(&connector, |model| {
        model
            .heat
            .heaters
            .first()
            .and_then(Option::as_ref)
            .is_some_and(|heater| heater.current > 200.0)
    })
    .await;

    // A few more cycles with unchanged counters must not query again.
    tokio::time::sleep(Duration::from_millis(100)).await;
    connector.disconnect(true).await;
}

#[tokio::test]
async fn test_live_values_merge_every_cycle() {
    let server = setup().await;
    mount_live(&server, |n| {
        let status = if n < 2 { "idle" } else { "busy" };
        json!({
            "result": {
                "state": { "status": status, "upTime": 1000 + n },
                "seqs": { "reply": 0 }
            }
        })
    })
    .await;

    let connector = Connector::new(config(&server));
    connector.connect().await.unwrap();
    wait_for_model(&connector, |model| model.state.status == MachineStatus::Busy).await;
    connector.disconnect(true).await;
}

// ── Codes and replies ───────────────────────────────────────────────

#[tokio::test]
async fn test_reply_is_fetched_once_and_resolves_waiting_code() {
    let server = setup().await;
    let sent = Arc::new(AtomicBool::new(false));
    mount_gcode(&server, Arc::clone(&sent)).await;
    let observed = Arc::clone(&sent);
    mount_live(&server, move |_| {
        let reply = if observed.load(Ordering::SeqCst) { 6 } else { 5 };
        live(1000, json!({ "reply": reply }))
    })
    .await;
    Mock::given(method("GET"))
        .and(path("/rr_reply"))
        .respond_with(ResponseTemplate::new(200).set_body_string("FIRMWARE_NAME: RepRapFirmware\n"))
        .expect(1)
        .mount(&server)
        .await;

    let connector = Connector::new(config(&server));
    let mut events = connector.subscribe();
    connector.connect().await.unwrap();

    let reply = tokio::time::timeout(Duration::from_secs(5), connector.send_code("M115", true))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reply.as_deref(), Some("FIRMWARE_NAME: RepRapFirmware\n"));

    tokio::time::sleep(Duration::from_millis(100)).await;
    connector.disconnect(true).await;

    let mut replies = 0;
    while let Ok(event) = events.try_recv() {
        if matches!(event, ConnectorEvent::ReplyReceived { .. }) {
            replies += 1;
        }
    }
    assert_eq!(replies, 1);
}

#[tokio::test]
async fn test_unchanged_reply_sequence_is_not_fetched() {
    let server = setup().await;
    mount_live(&server, |_| live(1000, json!({ "reply": 5 }))).await;
    Mock::given(method("GET"))
        .and(path("/rr_reply"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok\n"))
        .expect(0)
        .mount(&server)
        .await;

    let connector = Connector::new(config(&server));
    connector.connect().await.unwrap();
    tokio::time::sleep(Duration::from_millis(150)).await;
    connector.disconnect(true).await;
}

#[tokio::test]
async fn test_emergency_stop_does_not_wait_for_reply() {
    let server = setup().await;
    mount_live(&server, |_| live(1000, json!({ "reply": 5 }))).await;
    let sent = Arc::new(AtomicBool::new(false));
    mount_gcode(&server, Arc::clone(&sent)).await;

    let connector = Connector::new(config(&server));
    connector.connect().await.unwrap();

    let reply = tokio::time::timeout(Duration::from_secs(1), connector.send_code("M112", true))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reply, None);
    assert!(sent.load(Ordering::SeqCst));

    connector.disconnect(true).await;
}

#[tokio::test]
async fn test_reboot_rejects_waiting_codes() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rr_connect"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "err": 0,
            "apiLevel": 1
        })))
        .expect(2..)
        .mount(&server)
        .await;
    mount_sections(&server).await;
    let sent = Arc::new(AtomicBool::new(false));
    mount_gcode(&server, Arc::clone(&sent)).await;
    let observed = Arc::clone(&sent);
    mount_live(&server, move |_| {
        let up_time = if observed.load(Ordering::SeqCst) { 3 } else { 1000 };
        live(up_time, json!({ "reply": 5 }))
    })
    .await;

    let connector = Connector::new(config(&server));
    connector.connect().await.unwrap();

    let err = tokio::time::timeout(Duration::from_secs(5), connector.send_code("G28", true))
        .await
        .unwrap()
        .unwrap_err();
    assert!(err.is_cancelled());

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(connector.connection_state(), ConnectionState::Live);
    connector.disconnect(false).await;
}

#[tokio::test]
async fn test_code_sent_after_reboot_gets_its_reply() {
    let server = setup().await;
    let sent = Arc::new(AtomicBool::new(false));
    mount_gcode(&server, Arc::clone(&sent)).await;
    let observed = Arc::clone(&sent);
    // The reply counter starts over at zero with the restart.
    mount_live(&server, move |n| {
        if n < 3 {
            live(1000, json!({ "reply": 5 }))
        } else {
            let reply = u64::from(observed.load(Ordering::SeqCst));
            live(4, json!({ "reply": reply }))
        }
    })
    .await;
    Mock::given(method("GET"))
        .and(path("/rr_reply"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok\n"))
        .expect(1)
        .mount(&server)
        .await;

    let connector = Connector::new(config(&server));
    connector.connect().await.unwrap();
    wait_for_model(&connector, |model| model.state.up_time == 4).await;

    let reply = tokio::time::timeout(Duration::from_secs(5), connector.send_code("M115", true))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reply.as_deref(), Some("ok\n"));

    connector.disconnect(true).await;
}

#[tokio::test]
async fn test_disconnect_rejects_waiting_codes() {
    let server = setup().await;
    mount_live(&server, |_| live(1000, json!({ "reply": 5 }))).await;
    mount_gcode(&server, Arc::new(AtomicBool::new(false))).await;

    let connector = Connector::new(config(&server));
    connector.connect().await.unwrap();

    let waiting = {
        let connector = connector.clone();
        tokio::spawn(async move { connector.send_code("M115", true).await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;
    connector.disconnect(false).await;

    let err = tokio::time::timeout(Duration::from_secs(1), waiting)
        .await
        .unwrap()
        .unwrap()
        .unwrap_err();
    assert!(matches!(err.api_error(), Some(Error::Disconnected { .. })));
}
