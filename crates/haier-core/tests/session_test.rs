#![allow(clippy::unwrap_used)]
// Session tests against a local WebSocket gateway plus wiremock for the
// REST side (login, gateway assignment, fallback commands).

use std::io::Write;
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use flate2::Compression;
use flate2::write::GzEncoder;
use futures_util::{SinkExt, StreamExt};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use tempfile::TempDir;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use haier_core::{
    CommandArgs, CommandRoute, ConnectionStatus, CoreError, Credentials, DigitalModel, DiskCache,
    Endpoints, ReconnectConfig, Session, SessionConfig, SessionEvent, WriteMode,
};

const LOGIN: &str = "/oauthserver/account/v1/login";
const ASSIGN: &str = "/gmsWS/wsag/assign";
const WAIT: Duration = Duration::from_secs(5);

// ── Gateway harness ─────────────────────────────────────────────────

/// A local live-channel server. Each accepted connection is handed to the
/// test as a [`Conn`]; dropping the `Conn` drops the connection.
struct Gateway {
    url: String,
    conns: mpsc::UnboundedReceiver<Conn>,
    accept: JoinHandle<()>,
}

struct Conn {
    frames: mpsc::UnboundedReceiver<Value>,
    outbound: mpsc::UnboundedSender<Message>,
}

impl Gateway {
    async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        let (conn_tx, conns) = mpsc::unbounded_channel();

        let accept = tokio::spawn(async move {
            while let Ok((tcp, _)) = listener.accept().await {
                let Ok(ws) = tokio_tungstenite::accept_async(tcp).await else {
                    continue;
                };
                let (frames_tx, frames) = mpsc::unbounded_channel();
                let (outbound, out_rx) = mpsc::unbounded_channel();
                if conn_tx.send(Conn { frames, outbound }).is_err() {
                    break;
                }
                tokio::spawn(serve(ws, frames_tx, out_rx));
            }
        });

        Self { url, conns, accept }
    }

    async fn next_conn(&mut self) -> Conn {
        timeout(WAIT, self.conns.recv())
            .await
            .expect("no connection within timeout")
            .unwrap()
    }

    /// Stop accepting; later connects are refused.
    async fn shut(&self) {
        self.accept.abort();
        while !self.accept.is_finished() {
            sleep(Duration::from_millis(5)).await;
        }
    }
}

async fn serve(
    ws: WebSocketStream<TcpStream>,
    frames: mpsc::UnboundedSender<Value>,
    mut outbound: mpsc::UnboundedReceiver<Message>,
) {
    let (mut sink, mut stream) = ws.split();
    loop {
        tokio::select! {
            msg = stream.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    let _ = frames.send(serde_json::from_str(text.as_str()).unwrap());
                }
                Some(Ok(_)) => {}
                _ => break,
            },
            out = outbound.recv() => match out {
                Some(msg) => {
                    if sink.send(msg).await.is_err() {
                        break;
                    }
                }
                None => break,
            },
        }
    }
}

impl Conn {
    async fn next_frame(&mut self) -> Value {
        timeout(WAIT, self.frames.recv())
            .await
            .expect("no frame within timeout")
            .expect("connection closed")
    }

    fn push(&self, frame: &Value) {
        self.outbound.send(Message::text(frame.to_string())).unwrap();
    }

    fn push_raw(&self, text: &str) {
        self.outbound.send(Message::text(text.to_owned())).unwrap();
    }
}

// ── REST mocks ──────────────────────────────────────────────────────

fn ok(data: Value) -> Value {
    json!({ "retCode": "00000", "retInfo": "success", "data": data })
}

async fn mount_login(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path(LOGIN))
        .respond_with(ResponseTemplate::new(200).set_body_json(ok(json!({
            "tokenInfo": {
                "accountToken": "account-token",
                "expiresIn": 86_400,
                "tokenType": "Bearer",
                "refreshToken": "refresh-token",
                "uhomeAccessToken": "uhome-token",
                "uhomeUserId": "10001",
                "uocUserId": "20002"
            }
        }))))
        .mount(server)
        .await;
}

async fn mount_assign(server: &MockServer, gateway_url: &str, delay: Duration) {
    Mock::given(method("POST"))
        .and(path(ASSIGN))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(ok(json!({ "agAddr": gateway_url })))
                .set_delay(delay),
        )
        .mount(server)
        .await;
}

async fn assign_calls(server: &MockServer) -> usize {
    server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.url.path() == ASSIGN)
        .count()
}

// ── Fixtures ────────────────────────────────────────────────────────

fn config_for(server: &MockServer, dir: &TempDir) -> SessionConfig {
    let mut config = SessionConfig::new(Credentials::new("13800000000", "secret"), dir.path());
    config.endpoints = Endpoints::single(Url::parse(&server.uri()).unwrap());
    config.connect_timeout = Duration::from_secs(2);
    config.heartbeat_interval = Duration::from_secs(3600);
    config.reconnect = ReconnectConfig {
        base_delay: Duration::from_millis(10),
        max_delay: None,
        max_attempts: 3,
    };
    config.cache_write_mode = WriteMode::Immediate;
    config
}

async fn setup() -> (MockServer, Gateway, Session, TempDir) {
    let server = MockServer::start().await;
    let gateway = Gateway::start().await;
    mount_login(&server).await;
    mount_assign(&server, &gateway.url, Duration::ZERO).await;
    let dir = tempfile::tempdir().unwrap();
    let session = Session::new(config_for(&server, &dir)).unwrap();
    (server, gateway, session, dir)
}

fn model_json(temperature: &str) -> Value {
    json!({
        "alarms": [],
        "attributes": [{
            "name": "targetTemperature",
            "desc": "Target temperature",
            "readable": true,
            "writable": true,
            "invisible": false,
            "value": temperature,
            "valueRange": {
                "type": "STEP",
                "dataStep": { "dataType": "Integer", "step": "1", "minValue": "16", "maxValue": "30" }
            }
        }]
    })
}

fn push_frame(device_id: &str, model: &Value) -> Value {
    let mut gz = GzEncoder::new(Vec::new(), Compression::default());
    gz.write_all(model.to_string().as_bytes()).unwrap();
    let args = STANDARD.encode(gz.finish().unwrap());
    let data = STANDARD.encode(json!({ "dev": device_id, "args": args }).to_string());
    json!({
        "topic": "GenMsgDown",
        "content": { "businType": "DigitalModel", "data": data }
    })
}

fn temperature(model: &DigitalModel) -> Option<&str> {
    model.attribute("targetTemperature")?.current_value.as_deref()
}

fn one_command(name: &str, value: &str) -> Vec<CommandArgs> {
    vec![CommandArgs::from([(name.to_owned(), value.to_owned())])]
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + WAIT;
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met within timeout"
        );
        sleep(Duration::from_millis(10)).await;
    }
}

// ── Lifecycle ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_connect_opens_channel() {
    let (_server, mut gateway, session, _dir) = setup().await;

    session.connect().await.unwrap();
    let _conn = gateway.next_conn().await;

    let state = session.state();
    assert_eq!(state.status, ConnectionStatus::Open);
    assert_eq!(state.reconnect_attempts, 0);
    assert!(state.heartbeat_active);
}

#[tokio::test]
async fn test_subscription_set_is_replayed_after_reconnect() {
    let (_server, mut gateway, session, _dir) = setup().await;

    // Declared while closed: stored, reported as not sent.
    let err = session.subscribe_devices(["DEV1", "DEV2"]).await.unwrap_err();
    assert!(matches!(err, CoreError::NotConnected));

    session.connect().await.unwrap();
    let mut first = gateway.next_conn().await;
    assert_eq!(
        first.next_frame().await,
        json!({ "topic": "BoundDevs", "content": { "devs": ["DEV1", "DEV2"] } })
    );

    session.subscribe_devices(["DEV3", "DEV1"]).await.unwrap();
    assert_eq!(
        first.next_frame().await["content"]["devs"],
        json!(["DEV3", "DEV1"])
    );

    drop(first);
    let mut second = gateway.next_conn().await;
    assert_eq!(
        second.next_frame().await,
        json!({ "topic": "BoundDevs", "content": { "devs": ["DEV3", "DEV1"] } })
    );

    wait_until(|| session.state().status == ConnectionStatus::Open).await;
    assert_eq!(session.state().reconnect_attempts, 0);
}

#[tokio::test]
async fn test_reconnect_stops_at_attempt_cap() {
    let (server, mut gateway, session, _dir) = setup().await;

    session.connect().await.unwrap();
    let conn = gateway.next_conn().await;
    gateway.shut().await;
    drop(conn);

    wait_until(|| {
        let state = session.state();
        state.reconnect_attempts == 3 && state.status == ConnectionStatus::Disconnected
    })
    .await;
    assert!(!session.state().heartbeat_active);

    // One assignment for the connect, one per attempt, then nothing more.
    sleep(Duration::from_millis(200)).await;
    assert_eq!(assign_calls(&server).await, 4);
    assert_eq!(session.state().reconnect_attempts, 3);
}

#[tokio::test]
async fn test_connect_times_out_without_handshake() {
    let server = MockServer::start().await;
    mount_login(&server).await;

    // Accepts TCP but never answers the WebSocket handshake.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((tcp, _)) = listener.accept().await {
            held.push(tcp);
        }
    });
    mount_assign(&server, &url, Duration::ZERO).await;

    let dir = tempfile::tempdir().unwrap();
    let mut config = config_for(&server, &dir);
    config.connect_timeout = Duration::from_millis(200);
    let session = Session::new(config).unwrap();

    let err = session.connect().await.unwrap_err();
    assert!(matches!(err, CoreError::Timeout { timeout_ms: 200 }), "{err:?}");
    assert_eq!(session.state().status, ConnectionStatus::Disconnected);

    // A failed connect is the caller's to retry.
    sleep(Duration::from_millis(200)).await;
    assert_eq!(assign_calls(&server).await, 1);
}

#[tokio::test]
async fn test_connect_while_connecting_is_a_no_op() {
    let server = MockServer::start().await;
    let mut gateway = Gateway::start().await;
    mount_login(&server).await;
    mount_assign(&server, &gateway.url, Duration::from_millis(300)).await;
    let dir = tempfile::tempdir().unwrap();
    let session = Session::new(config_for(&server, &dir)).unwrap();

    let (first, second) = tokio::join!(session.connect(), async {
        sleep(Duration::from_millis(50)).await;
        session.connect().await
    });
    first.unwrap();
    second.unwrap();

    let _conn = gateway.next_conn().await;
    assert_eq!(assign_calls(&server).await, 1);
    assert_eq!(session.state().status, ConnectionStatus::Open);
}

#[tokio::test]
async fn test_disconnect_stops_everything_and_allows_reconnect() {
    let (_server, mut gateway, session, _dir) = setup().await;

    session.connect().await.unwrap();
    let mut conn = gateway.next_conn().await;

    session.disconnect().await;
    let state = session.state();
    assert_eq!(state.status, ConnectionStatus::Disconnected);
    assert!(!state.heartbeat_active);

    // The server sees the close and no reconnect follows.
    assert!(timeout(WAIT, conn.frames.recv()).await.unwrap().is_none());
    sleep(Duration::from_millis(100)).await;
    assert!(gateway.conns.try_recv().is_err());

    session.connect().await.unwrap();
    let _again = gateway.next_conn().await;
    assert_eq!(session.state().status, ConnectionStatus::Open);
}

#[tokio::test]
async fn test_heartbeat_frames_are_sent() {
    let server = MockServer::start().await;
    let mut gateway = Gateway::start().await;
    mount_login(&server).await;
    mount_assign(&server, &gateway.url, Duration::ZERO).await;
    let dir = tempfile::tempdir().unwrap();
    let mut config = config_for(&server, &dir);
    config.heartbeat_interval = Duration::from_millis(50);
    let session = Session::new(config).unwrap();

    session.connect().await.unwrap();
    let mut conn = gateway.next_conn().await;

    let frame = conn.next_frame().await;
    assert_eq!(frame["topic"], "HeartBeat");
    assert_eq!(frame["content"]["duration"], 0);
    assert!(frame["content"]["sn"].as_str().is_some_and(|sn| sn.len() > 14));

    session.disconnect().await;
}

#[tokio::test]
async fn test_dead_channel_under_heartbeat_is_replaced() {
    let server = MockServer::start().await;
    let mut gateway = Gateway::start().await;
    mount_login(&server).await;
    mount_assign(&server, &gateway.url, Duration::ZERO).await;
    let dir = tempfile::tempdir().unwrap();
    let mut config = config_for(&server, &dir);
    config.heartbeat_interval = Duration::from_millis(50);
    let session = Session::new(config).unwrap();

    session.subscribe_devices(["DEV1"]).await.unwrap_err();
    session.connect().await.unwrap();
    let mut first = gateway.next_conn().await;
    assert_eq!(first.next_frame().await["topic"], "BoundDevs");
    assert_eq!(first.next_frame().await["topic"], "HeartBeat");

    // The gateway vanishes between beats.
    drop(first);

    let mut second = gateway.next_conn().await;
    assert_eq!(
        second.next_frame().await,
        json!({ "topic": "BoundDevs", "content": { "devs": ["DEV1"] } })
    );
    assert_eq!(second.next_frame().await["topic"], "HeartBeat");
    assert_eq!(assign_calls(&server).await, 2);

    wait_until(|| session.state().status == ConnectionStatus::Open).await;
    assert!(session.state().heartbeat_active);
    session.disconnect().await;
}

// ── Inbound pushes ──────────────────────────────────────────────────

#[tokio::test]
async fn test_push_updates_cache_and_emits_event() {
    let (_server, mut gateway, session, dir) = setup().await;
    let mut events = session.events();

    session.connect().await.unwrap();
    let conn = gateway.next_conn().await;

    // Noise the session must survive.
    conn.push_raw("not json");
    conn.push(&json!({ "topic": "SomethingNew", "content": {} }));
    conn.push(&json!({ "topic": "HeartBeatAck", "content": {} }));
    conn.push(&json!({ "topic": "GenMsgDown", "content": { "businType": "Other", "data": "x" } }));
    conn.push(&json!({ "topic": "GenMsgDown", "content": { "businType": "DigitalModel", "data": "%%%" } }));

    conn.push(&push_frame("DEV1", &model_json("22")));

    let event = timeout(WAIT, events.recv()).await.unwrap().unwrap();
    let SessionEvent::DevDigitalModelUpdate { device_id, model } = event;
    assert_eq!(device_id, "DEV1");
    assert_eq!(temperature(&model), Some("22"));

    let cached = session.cache().get("DEV1").unwrap();
    assert_eq!(temperature(&cached), Some("22"));
    assert!(dir.path().join("digital-models").join("DEV1.json").exists());
    assert_eq!(session.state().status, ConnectionStatus::Open);
}

#[tokio::test]
async fn test_debounced_push_is_on_disk_after_disconnect() {
    let server = MockServer::start().await;
    let mut gateway = Gateway::start().await;
    mount_login(&server).await;
    mount_assign(&server, &gateway.url, Duration::ZERO).await;
    let dir = tempfile::tempdir().unwrap();
    let mut config = config_for(&server, &dir);
    config.cache_write_mode = WriteMode::Debounced(Duration::from_secs(3600));
    let models_dir = config.digital_models_dir();
    let session = Session::new(config).unwrap();
    let mut events = session.events();

    session.connect().await.unwrap();
    let conn = gateway.next_conn().await;
    conn.push(&push_frame("DEV1", &model_json("23")));
    timeout(WAIT, events.recv()).await.unwrap().unwrap();

    // Still inside the window: memory only.
    assert!(session.cache().has("DEV1"));
    assert!(!models_dir.join("DEV1.json").exists());

    session.disconnect().await;
    drop(session);

    let reopened: DiskCache<DigitalModel> = DiskCache::open(&models_dir, WriteMode::Immediate).unwrap();
    assert_eq!(temperature(&reopened.get("DEV1").unwrap()), Some("23"));
}

// ── Commands ────────────────────────────────────────────────────────

#[tokio::test]
async fn test_commands_go_over_open_channel() {
    let (_server, mut gateway, session, _dir) = setup().await;
    session
        .cache()
        .set("DEV1", DigitalModel::from_value_lenient(&model_json("24")).unwrap());
    let mut events = session.events();

    session.connect().await.unwrap();
    let mut conn = gateway.next_conn().await;

    let route = session
        .send_commands("DEV1", &one_command("targetTemperature", "26"))
        .await
        .unwrap();
    assert_eq!(route, CommandRoute::LiveChannel);

    let frame = conn.next_frame().await;
    assert_eq!(frame["topic"], "BatchCmdReq");
    let sn = frame["content"]["sn"].as_str().unwrap();
    assert!(frame["content"]["trace"].as_str().is_some());
    let msg = &frame["content"]["data"][0];
    assert_eq!(msg["deviceId"], "DEV1");
    assert_eq!(msg["index"], 0);
    assert_eq!(msg["subSn"], format!("{sn}:0"));
    assert_eq!(msg["cmdArgs"], json!({ "targetTemperature": "26" }));

    assert_eq!(temperature(&session.cache().get("DEV1").unwrap()), Some("26"));
    let SessionEvent::DevDigitalModelUpdate { model, .. } =
        timeout(WAIT, events.recv()).await.unwrap().unwrap();
    assert_eq!(temperature(&model), Some("26"));
}

#[tokio::test]
async fn test_commands_fall_back_to_rest_when_closed() {
    let (server, _gateway, session, _dir) = setup().await;
    Mock::given(method("POST"))
        .and(path("/stdudse/v1/sendbatchCmd/DEV1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(ok(json!({}))))
        .expect(1)
        .mount(&server)
        .await;
    session
        .cache()
        .set("DEV1", DigitalModel::from_value_lenient(&model_json("24")).unwrap());

    let route = session
        .send_commands("DEV1", &one_command("targetTemperature", "18"))
        .await
        .unwrap();
    assert_eq!(route, CommandRoute::Rest);
    assert_eq!(temperature(&session.cache().get("DEV1").unwrap()), Some("18"));

    let requests = server.received_requests().await.unwrap();
    let body: Value = requests
        .iter()
        .find(|r| r.url.path() == "/stdudse/v1/sendbatchCmd/DEV1")
        .unwrap()
        .body_json()
        .unwrap();
    let sn = body["sn"].as_str().unwrap();
    assert_eq!(body["cmdMsgList"][0]["subSn"], format!("{sn}:0"));
    assert_eq!(
        body["cmdMsgList"][0]["cmdArgs"],
        json!({ "targetTemperature": "18" })
    );
}

#[tokio::test]
async fn test_failed_rest_fallback_is_surfaced() {
    let (server, _gateway, session, _dir) = setup().await;
    Mock::given(method("POST"))
        .and(path("/stdudse/v1/sendbatchCmd/DEV1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "retCode": "C0001",
            "retInfo": "device offline"
        })))
        .mount(&server)
        .await;
    session
        .cache()
        .set("DEV1", DigitalModel::from_value_lenient(&model_json("24")).unwrap());

    let err = session
        .send_commands("DEV1", &one_command("targetTemperature", "18"))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Api { ref code, .. } if code == "C0001"));
    assert_eq!(temperature(&session.cache().get("DEV1").unwrap()), Some("24"));
}

// ── REST-backed model fetch ─────────────────────────────────────────

#[tokio::test]
async fn test_model_fetch_caches_and_reports_missing_devices() {
    let (server, _gateway, session, _dir) = setup().await;
    Mock::given(method("POST"))
        .and(path("/shadow/v1/devdigitalmodels"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "retCode": "00000",
            "retInfo": "success",
            "detailInfo": { "DEV1": model_json("20").to_string() }
        })))
        .mount(&server)
        .await;

    let model = session.get_dev_digital_model("DEV1", false).await.unwrap();
    assert_eq!(temperature(&model), Some("20"));
    assert!(session.cache().has("DEV1"));

    let err = session.get_dev_digital_model("GHOST", true).await.unwrap_err();
    assert!(matches!(err, CoreError::DeviceNotFound { ref device_id } if device_id == "GHOST"));
}
