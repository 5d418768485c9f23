use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use awachat_client::ws::{Transport, TransportEvent, TransportEvents, TransportHandle};
use awachat_client::{
    ConnectionError, ConnectionManager, ConnectionState, CredentialStore, ManagerConfig, Notifier,
    StaticCredentials, TransportError,
};
use awachat_shared::{
    AckPayload, ChatMessagePayload, ChatType, MessagePayload, MessageTag, WireMessage,
};
use serde_json::{json, Value};
use url::Url;

// --- Scripted transport ---

struct Connection {
    url: Url,
    events: TransportEvents,
    sent: Arc<Mutex<Vec<String>>>,
    closed: Arc<AtomicBool>,
}

#[derive(Default)]
struct ScriptedTransport {
    connections: Mutex<Vec<Connection>>,
    open_calls: AtomicUsize,
    fail_opens: AtomicUsize,
}

impl ScriptedTransport {
    fn opened(&self) -> usize {
        self.connections.lock().unwrap().len()
    }

    fn emit(&self, index: usize, event: TransportEvent) {
        let events = self.connections.lock().unwrap()[index].events.clone();
        events.emit(event);
    }

    fn url(&self, index: usize) -> Url {
        self.connections.lock().unwrap()[index].url.clone()
    }

    fn sent(&self, index: usize) -> Vec<String> {
        self.connections.lock().unwrap()[index]
            .sent
            .lock()
            .unwrap()
            .clone()
    }

    fn is_closed(&self, index: usize) -> bool {
        self.connections.lock().unwrap()[index]
            .closed
            .load(Ordering::SeqCst)
    }
}

impl Transport for ScriptedTransport {
    fn open(
        &self,
        url: &Url,
        events: TransportEvents,
    ) -> Result<Box<dyn TransportHandle>, TransportError> {
        self.open_calls.fetch_add(1, Ordering::SeqCst);
        if self
            .fail_opens
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(TransportError::Open("refused".into()));
        }

        let sent = Arc::new(Mutex::new(Vec::new()));
        let closed = Arc::new(AtomicBool::new(false));
        self.connections.lock().unwrap().push(Connection {
            url: url.clone(),
            events,
            sent: sent.clone(),
            closed: closed.clone(),
        });
        Ok(Box::new(ScriptedHandle { sent, closed }))
    }
}

struct ScriptedHandle {
    sent: Arc<Mutex<Vec<String>>>,
    closed: Arc<AtomicBool>,
}

impl TransportHandle for ScriptedHandle {
    fn send_text(&self, text: String) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        self.sent.lock().unwrap().push(text);
        Ok(())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct RecordingNotifier {
    errors: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    fn errors(&self) -> Vec<String> {
        self.errors.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn report_error(&self, title: &str, _detail: &str) {
        self.errors.lock().unwrap().push(title.to_string());
    }

    fn report_success(&self, _title: &str) {}
}

// --- Harness ---

struct Harness {
    manager: ConnectionManager,
    transport: Arc<ScriptedTransport>,
    notifier: Arc<RecordingNotifier>,
}

fn harness_with(credentials: impl CredentialStore + 'static) -> Harness {
    harness_from(ManagerConfig::default(), credentials)
}

fn harness_from(config: ManagerConfig, credentials: impl CredentialStore + 'static) -> Harness {
    let transport = Arc::new(ScriptedTransport::default());
    let notifier = Arc::new(RecordingNotifier::default());
    let manager = ConnectionManager::new(
        config,
        transport.clone(),
        Arc::new(credentials),
        notifier.clone(),
    );
    Harness {
        manager,
        transport,
        notifier,
    }
}

fn harness() -> Harness {
    harness_with(StaticCredentials::new("secret"))
}

/// Let the event loop drain whatever is queued.
async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}

async fn advance(ms: u64) {
    tokio::time::advance(Duration::from_millis(ms)).await;
    settle().await;
}

async fn open_session(h: &Harness) {
    h.manager.init("https://chat.example.com").await.unwrap();
    h.transport.emit(0, TransportEvent::Open);
    settle().await;
}

fn chat_frame(text: &str) -> String {
    json!({
        "type": "chat",
        "data": {
            "id": 11,
            "chatType": "private",
            "chatId": 3,
            "from": 9,
            "to": 1,
            "msgType": "text",
            "content": { "content": text },
            "sentAt": 1_700_000_000_000_i64,
        }
    })
    .to_string()
}

fn tags(sent: &[String]) -> Vec<String> {
    sent.iter()
        .map(|text| {
            let value: Value = serde_json::from_str(text).unwrap();
            value["type"].as_str().unwrap().to_string()
        })
        .collect()
}

// --- Connect ---

#[tokio::test(start_paused = true)]
async fn init_connects_to_derived_socket_url_with_token() {
    let h = harness_with(StaticCredentials::new("tok en"));
    h.manager.init("https://chat.example.com").await.unwrap();
    settle().await;

    assert_eq!(h.transport.opened(), 1);
    assert_eq!(
        h.transport.url(0).as_str(),
        "wss://chat.example.com/api/ws/chat?token=tok+en"
    );
    assert_eq!(h.manager.state(), ConnectionState::Connecting);
    assert!(!h.manager.is_connected());

    h.transport.emit(0, TransportEvent::Open);
    settle().await;
    assert!(h.manager.is_connected());
    assert!(*h.manager.connected().borrow());
    assert_eq!(h.manager.state(), ConnectionState::Open);
}

#[tokio::test(start_paused = true)]
async fn invalid_base_url_is_rejected() {
    let h = harness();
    let err = h.manager.init("ftp://chat.example.com").await.unwrap_err();
    assert!(matches!(err, ConnectionError::UnsupportedScheme(_)));
    settle().await;
    assert_eq!(h.transport.opened(), 0);
}

#[tokio::test(start_paused = true)]
async fn missing_token_does_not_connect_or_retry() {
    let h = harness_with(StaticCredentials::none());
    h.manager.init("http://localhost:8080").await.unwrap();
    advance(60_000).await;

    assert_eq!(h.transport.open_calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.manager.state(), ConnectionState::Idle);
}

#[tokio::test(start_paused = true)]
async fn reinit_closes_previous_socket() {
    let h = harness();
    open_session(&h).await;

    h.manager.init("https://chat.example.com").await.unwrap();
    settle().await;

    assert!(h.transport.is_closed(0));
    assert_eq!(h.transport.opened(), 2);
    assert!(!h.manager.is_connected());
}

// --- Messaging ---

#[tokio::test(start_paused = true)]
async fn chat_message_is_dispatched_once_and_recorded() {
    let h = harness();
    let received = Arc::new(Mutex::new(Vec::new()));
    let sink = received.clone();
    h.manager
        .register_message_handler(MessageTag::Chat, move |payload| {
            sink.lock().unwrap().push(payload)
        });
    open_session(&h).await;

    h.transport
        .emit(0, TransportEvent::Message(chat_frame("hello")));
    settle().await;

    let received = received.lock().unwrap();
    assert_eq!(received.len(), 1);
    match &received[0] {
        MessagePayload::Chat(message) => {
            assert_eq!(message.from, 9);
            assert_eq!(message.id, Some(11));
        }
        other => panic!("unexpected payload {other:?}"),
    }
    assert_eq!(
        h.manager.last_message().map(|m| m.tag),
        Some(MessageTag::Chat)
    );
}

#[tokio::test(start_paused = true)]
async fn unregistered_handler_is_not_called() {
    let h = harness();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    h.manager
        .register_message_handler("system", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
    assert!(h.manager.unregister_message_handler("system"));
    open_session(&h).await;

    h.transport.emit(
        0,
        TransportEvent::Message(r#"{"type":"system","data":"maintenance"}"#.into()),
    );
    settle().await;

    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(
        h.manager.last_message().map(|m| m.tag),
        Some(MessageTag::System)
    );
}

#[tokio::test(start_paused = true)]
async fn malformed_frames_are_dropped_without_closing() {
    let h = harness();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    h.manager
        .register_message_handler(MessageTag::Chat, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
    open_session(&h).await;

    h.transport
        .emit(0, TransportEvent::Message("not json".into()));
    h.transport.emit(
        0,
        TransportEvent::Message(r#"{"type":"chat","data":{"msgType":"text"}}"#.into()),
    );
    settle().await;

    assert!(h.manager.is_connected());
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    h.transport
        .emit(0, TransportEvent::Message(chat_frame("still here")));
    settle().await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn send_fails_until_open() {
    let h = harness();
    let message = ChatMessagePayload::text(ChatType::Private, 3, 1, 9, "hi");

    assert!(!h.manager.send_chat_message(&message).await);

    h.manager.init("https://chat.example.com").await.unwrap();
    assert!(matches!(
        h.manager.try_send_message(&WireMessage::chat(message.clone())).await,
        Err(ConnectionError::NotOpen)
    ));

    h.transport.emit(0, TransportEvent::Open);
    settle().await;
    assert!(h.manager.send_chat_message(&message).await);
    assert!(
        h.manager
            .send_ack(&AckPayload {
                chat_type: ChatType::Private,
                chat_id: 3,
                last_message_id: 11,
            })
            .await
    );

    let sent = h.transport.sent(0);
    assert_eq!(tags(&sent), vec!["chat", "ack"]);
    let chat: Value = serde_json::from_str(&sent[0]).unwrap();
    assert_eq!(chat["data"]["content"]["content"], "hi");
    let ack: Value = serde_json::from_str(&sent[1]).unwrap();
    assert_eq!(ack["data"]["lastMessageId"], 11);
}

// --- Heartbeat ---

#[tokio::test(start_paused = true)]
async fn heartbeat_every_interval_while_open() {
    let h = harness();
    open_session(&h).await;

    advance(29_999).await;
    assert!(h.transport.sent(0).is_empty());

    advance(1).await;
    advance(30_000).await;
    let sent = h.transport.sent(0);
    assert_eq!(tags(&sent), vec!["heartbeat", "heartbeat"]);

    let stamps: Vec<i64> = sent
        .iter()
        .map(|text| {
            let value: Value = serde_json::from_str(text).unwrap();
            value["data"]["timestamp"].as_i64().unwrap()
        })
        .collect();
    assert!(stamps[1] >= stamps[0]);
}

#[tokio::test(start_paused = true)]
async fn heartbeat_stops_after_close() {
    let h = harness();
    open_session(&h).await;
    advance(30_000).await;
    assert_eq!(h.transport.sent(0).len(), 1);

    h.transport.emit(
        0,
        TransportEvent::Close {
            clean: true,
            code: Some(1000),
            reason: String::new(),
        },
    );
    settle().await;
    advance(120_000).await;

    assert_eq!(h.transport.sent(0).len(), 1);
    assert_eq!(h.transport.opened(), 1);
    assert_eq!(h.manager.state(), ConnectionState::Closed { clean: true });
}

// --- Reconnect ---

#[tokio::test(start_paused = true)]
async fn abnormal_close_reconnects_once_after_delay() {
    let h = harness();
    open_session(&h).await;

    h.transport
        .emit(0, TransportEvent::abnormal_close("network down"));
    settle().await;
    assert!(!h.manager.is_connected());
    assert_eq!(
        h.manager.state(),
        ConnectionState::Reconnecting { attempt: 1 }
    );

    advance(2_999).await;
    assert_eq!(h.transport.opened(), 1);

    advance(1).await;
    assert_eq!(h.transport.opened(), 2);
    assert_eq!(h.transport.url(1), h.transport.url(0));

    advance(30_000).await;
    assert_eq!(h.transport.opened(), 2);
}

#[tokio::test(start_paused = true)]
async fn successful_open_resets_attempt_counter() {
    let h = harness();
    open_session(&h).await;

    h.transport.emit(0, TransportEvent::abnormal_close("drop"));
    settle().await;
    advance(3_000).await;
    assert_eq!(h.transport.opened(), 2);
    h.transport.emit(1, TransportEvent::Open);
    settle().await;
    assert!(h.manager.is_connected());

    h.transport.emit(1, TransportEvent::abnormal_close("drop"));
    settle().await;
    assert_eq!(
        h.manager.state(),
        ConnectionState::Reconnecting { attempt: 1 }
    );
}

#[tokio::test(start_paused = true)]
async fn gives_up_after_max_attempts() {
    let h = harness();
    h.manager.init("https://chat.example.com").await.unwrap();
    settle().await;

    for index in 0..5 {
        h.transport
            .emit(index, TransportEvent::abnormal_close("refused"));
        settle().await;
        assert_eq!(
            h.manager.state(),
            ConnectionState::Reconnecting {
                attempt: index as u32 + 1
            }
        );
        advance(3_000).await;
        assert_eq!(h.transport.opened(), index + 2);
    }

    h.transport.emit(5, TransportEvent::abnormal_close("refused"));
    settle().await;
    assert_eq!(h.manager.state(), ConnectionState::Exhausted);
    assert_eq!(h.notifier.errors(), vec!["Connection failed".to_string()]);

    advance(60_000).await;
    assert_eq!(h.transport.opened(), 6);

    h.manager.init("https://chat.example.com").await.unwrap();
    settle().await;
    assert_eq!(h.transport.opened(), 7);
}

#[tokio::test(start_paused = true)]
async fn failed_open_schedules_reconnect() {
    let h = harness();
    h.transport.fail_opens.store(1, Ordering::SeqCst);
    h.manager.init("https://chat.example.com").await.unwrap();
    settle().await;

    assert_eq!(h.transport.open_calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        h.manager.state(),
        ConnectionState::Reconnecting { attempt: 1 }
    );

    advance(3_000).await;
    assert_eq!(h.transport.open_calls.load(Ordering::SeqCst), 2);
    assert_eq!(h.transport.opened(), 1);
}

#[tokio::test(start_paused = true)]
async fn transport_error_is_reported() {
    let h = harness();
    open_session(&h).await;

    h.transport
        .emit(0, TransportEvent::Error("reset by peer".into()));
    settle().await;

    assert_eq!(
        h.notifier.errors(),
        vec!["WebSocket connection error".to_string()]
    );
}

// --- Disconnect and stale events ---

#[tokio::test(start_paused = true)]
async fn disconnect_cancels_heartbeat_and_reconnect() {
    let h = harness();
    open_session(&h).await;

    h.manager.disconnect().await;
    assert!(h.transport.is_closed(0));
    assert!(!h.manager.is_connected());
    assert_eq!(h.manager.state(), ConnectionState::Idle);

    // the socket's own close report arrives after the manager moved on
    h.transport.emit(0, TransportEvent::abnormal_close("late"));
    advance(120_000).await;

    assert!(h.transport.sent(0).is_empty());
    assert_eq!(h.transport.opened(), 1);

    h.manager.disconnect().await;
    assert_eq!(h.manager.state(), ConnectionState::Idle);
}

#[tokio::test(start_paused = true)]
async fn disconnect_during_reconnect_delay_stops_retry() {
    let h = harness();
    open_session(&h).await;
    h.transport.emit(0, TransportEvent::abnormal_close("drop"));
    settle().await;

    h.manager.disconnect().await;
    advance(10_000).await;
    assert_eq!(h.transport.opened(), 1);
}

#[tokio::test(start_paused = true)]
async fn events_from_superseded_socket_are_ignored() {
    let h = harness();
    h.manager.init("https://chat.example.com").await.unwrap();
    h.manager.init("https://chat.example.com").await.unwrap();
    settle().await;
    assert_eq!(h.transport.opened(), 2);

    h.transport.emit(0, TransportEvent::Open);
    h.transport.emit(0, TransportEvent::abnormal_close("stale"));
    settle().await;
    assert!(!h.manager.is_connected());
    assert_eq!(h.manager.state(), ConnectionState::Connecting);

    advance(10_000).await;
    assert_eq!(h.transport.opened(), 2);

    h.transport.emit(1, TransportEvent::Open);
    settle().await;
    assert!(h.manager.is_connected());
}

// --- Robustness ---

#[tokio::test(start_paused = true)]
async fn panicking_handler_does_not_stop_the_manager() {
    let h = harness();
    h.manager
        .register_message_handler(MessageTag::System, |_| panic!("handler bug"));
    open_session(&h).await;

    h.transport.emit(
        0,
        TransportEvent::Message(r#"{"type":"system","data":"x"}"#.into()),
    );
    settle().await;

    assert!(h.manager.is_connected());
    let message = ChatMessagePayload::text(ChatType::Private, 3, 1, 9, "still alive");
    assert!(h.manager.send_chat_message(&message).await);
    assert_eq!(tags(&h.transport.sent(0)), vec!["chat"]);

    h.transport.emit(0, TransportEvent::abnormal_close("drop"));
    settle().await;
    advance(3_000).await;
    assert_eq!(h.transport.opened(), 2);
}

#[tokio::test(start_paused = true)]
async fn zero_heartbeat_interval_falls_back_to_default() {
    let config = ManagerConfig {
        heartbeat_interval: Duration::ZERO,
        ..ManagerConfig::default()
    };
    let h = harness_from(config, StaticCredentials::new("secret"));
    open_session(&h).await;
    assert!(h.manager.is_connected());

    advance(29_999).await;
    assert!(h.transport.sent(0).is_empty());
    advance(1).await;
    assert_eq!(tags(&h.transport.sent(0)), vec!["heartbeat"]);
}

#[tokio::test(start_paused = true)]
async fn handler_holding_weak_handle_can_send_and_does_not_pin_the_loop() {
    let Harness {
        manager, transport, ..
    } = harness();
    let weak = manager.downgrade();
    manager.register_message_handler(MessageTag::System, move |_| {
        let weak = weak.clone();
        tokio::spawn(async move {
            if let Some(manager) = weak.upgrade() {
                manager
                    .send_ack(&AckPayload {
                        chat_type: ChatType::Group,
                        chat_id: 4,
                        last_message_id: 20,
                    })
                    .await;
            }
        });
    });
    manager.init("https://chat.example.com").await.unwrap();
    transport.emit(0, TransportEvent::Open);
    settle().await;

    transport.emit(
        0,
        TransportEvent::Message(r#"{"type":"system","data":"hello"}"#.into()),
    );
    settle().await;
    assert_eq!(tags(&transport.sent(0)), vec!["ack"]);

    drop(manager);
    settle().await;
    assert!(transport.is_closed(0));
}
