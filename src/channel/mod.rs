//! Realtime event channel
//!
//! One WebSocket connection to the backend's event endpoint, shared by every
//! repository. Topic handlers registered via [`RealtimeChannel::register`]
//! receive decoded [`SocketEvent`]s; the synthetic [`TOPIC_ALL`] topic sees
//! every event. Lost connections retry on a doubling backoff; an explicit
//! [`RealtimeChannel::disconnect`] suppresses retries for a short cooldown.
//!
//! Concurrent `connect()` callers coalesce behind an async gate, so at most
//! one socket is ever opened. All synchronous state lives behind `std`
//! mutexes that are never held across an await.

mod backoff;
mod event;

pub use event::{
    ChangeEvent, SocketEvent, TOPIC_ALL, TOPIC_CONNECTION, TOPIC_ENTRY, TOPIC_ENTRY_STATUS,
    TOPIC_GROUP, TOPIC_LANGUAGE, TOPIC_MEDIA, TOPIC_TEMPLATE, TOPIC_WIDGET,
};

use crate::error::{Error, Result};
use backoff::Backoff;
use event::Envelope;
use futures_util::future::BoxFuture;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, warn};
use uuid::Uuid;

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsStream = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

type TopicHandler = Arc<dyn Fn(SocketEvent) -> BoxFuture<'static, Result<()>> + Send + Sync>;
type LifecycleHandler = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// Connection lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Disconnected,
    Connecting,
    Connected,
    /// Explicitly closed; retries suppressed until the cooldown elapses
    Closed,
}

/// Channel tuning knobs
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    pub url: String,
    pub handshake_timeout: Duration,
    pub backoff_floor: Duration,
    pub backoff_ceiling: Duration,
    pub disconnect_cooldown: Duration,
    pub debug: bool,
}

impl ChannelConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            handshake_timeout: Duration::from_secs(10),
            backoff_floor: Duration::from_secs(1),
            backoff_ceiling: Duration::from_secs(60),
            disconnect_cooldown: Duration::from_secs(1),
            debug: false,
        }
    }
}

struct Shared {
    config: ChannelConfig,
    state: Mutex<ChannelState>,
    connection_id: Mutex<Option<String>>,
    subs: Mutex<HashMap<Uuid, (String, TopicHandler)>>,
    open_subs: Mutex<HashMap<Uuid, LifecycleHandler>>,
    close_subs: Mutex<HashMap<Uuid, LifecycleHandler>>,
    backoff: Mutex<Backoff>,
    sink: tokio::sync::Mutex<Option<WsSink>>,
    /// Serializes connect attempts so concurrent callers coalesce
    connect_gate: tokio::sync::Mutex<()>,
    /// True while a reconnect loop is running
    reconnect_armed: AtomicBool,
    /// True during the post-disconnect cooldown; blocks retries
    suppressed: AtomicBool,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

/// Handle to one registered handler; call [`unregister`](Self::unregister)
/// to stop delivery
pub struct Subscription {
    id: Uuid,
    target: Target,
    shared: Weak<Shared>,
}

enum Target {
    Topic,
    Open,
    Close,
}

impl Subscription {
    pub fn unregister(self) {
        if let Some(shared) = self.shared.upgrade() {
            match self.target {
                Target::Topic => {
                    lock(&shared.subs).remove(&self.id);
                }
                Target::Open => {
                    lock(&shared.open_subs).remove(&self.id);
                }
                Target::Close => {
                    lock(&shared.close_subs).remove(&self.id);
                }
            }
        }
    }
}

/// Shared realtime channel over one WebSocket connection
pub struct RealtimeChannel {
    shared: Arc<Shared>,
}

impl RealtimeChannel {
    pub fn new(config: ChannelConfig) -> Self {
        let backoff = Backoff::new(config.backoff_floor, config.backoff_ceiling);
        Self {
            shared: Arc::new(Shared {
                config,
                state: Mutex::new(ChannelState::Disconnected),
                connection_id: Mutex::new(None),
                subs: Mutex::new(HashMap::new()),
                open_subs: Mutex::new(HashMap::new()),
                close_subs: Mutex::new(HashMap::new()),
                backoff: Mutex::new(backoff),
                sink: tokio::sync::Mutex::new(None),
                connect_gate: tokio::sync::Mutex::new(()),
                reconnect_armed: AtomicBool::new(false),
                suppressed: AtomicBool::new(false),
            }),
        }
    }

    pub fn state(&self) -> ChannelState {
        *lock(&self.shared.state)
    }

    /// Connection id announced by the backend, when connected
    pub fn connection_id(&self) -> Option<String> {
        lock(&self.shared.connection_id).clone()
    }

    /// Establish the connection
    ///
    /// Concurrent callers share one attempt. On failure the close
    /// subscribers fire and a backoff retry loop is armed, same as for an
    /// unexpected close.
    pub async fn connect(&self) -> Result<()> {
        self.shared.suppressed.store(false, Ordering::SeqCst);
        match try_connect(&self.shared).await {
            Ok(()) => Ok(()),
            Err(e) => {
                // When a disconnect raced the attempt it already fired the
                // close subscribers; do not retry either
                if !self.shared.suppressed.load(Ordering::SeqCst) {
                    fire_lifecycle(&self.shared.close_subs).await;
                    arm_reconnect(Arc::clone(&self.shared));
                }
                Err(e)
            }
        }
    }

    /// Close the connection and suppress retries for the configured cooldown
    pub async fn disconnect(&self) {
        self.shared.suppressed.store(true, Ordering::SeqCst);
        *lock(&self.shared.state) = ChannelState::Closed;

        if let Some(mut sink) = self.shared.sink.lock().await.take() {
            let _ = sink.close().await;
        }
        *lock(&self.shared.connection_id) = None;
        fire_lifecycle(&self.shared.close_subs).await;

        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            tokio::time::sleep(shared.config.disconnect_cooldown).await;
            shared.suppressed.store(false, Ordering::SeqCst);
            let mut state = lock(&shared.state);
            if *state == ChannelState::Closed {
                *state = ChannelState::Disconnected;
            }
        });
    }

    /// Send an event to the backend; silently dropped unless connected
    pub async fn emit(&self, name: &str, data: Value) -> Result<()> {
        if self.state() != ChannelState::Connected {
            debug!(event = %name, "channel not connected, dropping emit");
            return Ok(());
        }
        let frame = serde_json::to_string(&Envelope {
            en: name.to_string(),
            ed: data,
        })?;
        let mut sink = self.shared.sink.lock().await;
        if let Some(sink) = sink.as_mut() {
            sink.send(Message::Text(frame))
                .await
                .map_err(|e| Error::Channel(format!("send failed: {}", e)))?;
        }
        Ok(())
    }

    /// Register a handler for one topic (or [`TOPIC_ALL`])
    pub fn register<F, Fut>(&self, topic: &str, handler: F) -> Subscription
    where
        F: Fn(SocketEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let id = Uuid::new_v4();
        let handler: TopicHandler = Arc::new(move |event| Box::pin(handler(event)));
        lock(&self.shared.subs).insert(id, (topic.to_string(), handler));
        Subscription {
            id,
            target: Target::Topic,
            shared: Arc::downgrade(&self.shared),
        }
    }

    /// Register a handler fired after every successful connection
    pub fn register_open<F, Fut>(&self, handler: F) -> Subscription
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let id = Uuid::new_v4();
        let handler: LifecycleHandler = Arc::new(move || Box::pin(handler()));
        lock(&self.shared.open_subs).insert(id, handler);
        Subscription {
            id,
            target: Target::Open,
            shared: Arc::downgrade(&self.shared),
        }
    }

    /// Register a handler fired after every close, expected or not
    pub fn register_close<F, Fut>(&self, handler: F) -> Subscription
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let id = Uuid::new_v4();
        let handler: LifecycleHandler = Arc::new(move || Box::pin(handler()));
        lock(&self.shared.close_subs).insert(id, handler);
        Subscription {
            id,
            target: Target::Close,
            shared: Arc::downgrade(&self.shared),
        }
    }
}

/// One gated connect attempt
async fn try_connect(shared: &Arc<Shared>) -> Result<()> {
    let _gate = shared.connect_gate.lock().await;
    if *lock(&shared.state) == ChannelState::Connected {
        return Ok(());
    }
    *lock(&shared.state) = ChannelState::Connecting;
    debug!(url = %shared.config.url, "connecting realtime channel");

    let connected = tokio::time::timeout(
        shared.config.handshake_timeout,
        connect_async(shared.config.url.as_str()),
    )
    .await;
    let mut ws = match connected {
        Ok(Ok((ws, _response))) => ws,
        Ok(Err(e)) => {
            *lock(&shared.state) = ChannelState::Disconnected;
            return Err(Error::Channel(format!("connect failed: {}", e)));
        }
        Err(_) => {
            *lock(&shared.state) = ChannelState::Disconnected;
            return Err(Error::Channel("handshake timed out".to_string()));
        }
    };

    // A disconnect issued during the handshake wins; drop the new socket
    if shared.suppressed.load(Ordering::SeqCst) || *lock(&shared.state) == ChannelState::Closed {
        let _ = ws.close(None).await;
        return Err(Error::Channel("closed while connecting".to_string()));
    }

    let (sink, stream) = ws.split();
    *shared.sink.lock().await = Some(sink);
    lock(&shared.backoff).reset();
    *lock(&shared.connection_id) = None;
    *lock(&shared.state) = ChannelState::Connected;
    debug!(url = %shared.config.url, "realtime channel connected");

    tokio::spawn(read_loop(stream, Arc::clone(shared)));
    fire_lifecycle(&shared.open_subs).await;
    Ok(())
}

async fn read_loop(mut stream: WsStream, shared: Arc<Shared>) {
    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => handle_frame(&shared, &text).await,
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                warn!(error = %e, "realtime channel read error");
                break;
            }
        }
    }

    *shared.sink.lock().await = None;
    *lock(&shared.connection_id) = None;
    if shared.suppressed.load(Ordering::SeqCst) || *lock(&shared.state) == ChannelState::Closed {
        return;
    }
    *lock(&shared.state) = ChannelState::Disconnected;
    debug!("realtime channel closed unexpectedly");
    fire_lifecycle(&shared.close_subs).await;
    arm_reconnect(shared);
}

async fn handle_frame(shared: &Arc<Shared>, text: &str) {
    let envelope: Envelope = match serde_json::from_str(text) {
        Ok(envelope) => envelope,
        Err(e) => {
            warn!(error = %e, "dropping malformed realtime frame");
            return;
        }
    };
    if shared.config.debug {
        debug!(event = %envelope.en, data = %envelope.ed, "realtime event");
    }
    if envelope.en == TOPIC_CONNECTION {
        let id = envelope
            .ed
            .as_str()
            .map(str::to_string)
            .or_else(|| envelope.ed.get("id").and_then(Value::as_str).map(str::to_string));
        *lock(&shared.connection_id) = id;
    }

    let handlers: Vec<TopicHandler> = lock(&shared.subs)
        .values()
        .filter(|(topic, _)| topic == &envelope.en || topic == TOPIC_ALL)
        .map(|(_, handler)| Arc::clone(handler))
        .collect();
    for handler in handlers {
        let event = SocketEvent {
            name: envelope.en.clone(),
            data: envelope.ed.clone(),
        };
        if let Err(e) = handler(event).await {
            error!(event = %envelope.en, error = %e, "realtime handler failed");
        }
    }
}

async fn fire_lifecycle(subs: &Mutex<HashMap<Uuid, LifecycleHandler>>) {
    let handlers: Vec<LifecycleHandler> = lock(subs).values().map(Arc::clone).collect();
    for handler in handlers {
        handler().await;
    }
}

/// Start the single retry loop, unless one is already running
fn arm_reconnect(shared: Arc<Shared>) {
    if shared.reconnect_armed.swap(true, Ordering::SeqCst) {
        return;
    }
    tokio::spawn(async move {
        loop {
            let state = *lock(&shared.state);
            if shared.suppressed.load(Ordering::SeqCst)
                || state == ChannelState::Closed
                || state == ChannelState::Connected
            {
                break;
            }
            let delay = lock(&shared.backoff).next_delay();
            debug!(delay_ms = delay.as_millis() as u64, "reconnect scheduled");
            tokio::time::sleep(delay).await;
            if shared.suppressed.load(Ordering::SeqCst)
                || *lock(&shared.state) == ChannelState::Closed
            {
                break;
            }
            match try_connect(&shared).await {
                Ok(()) => break,
                Err(e) => debug!(error = %e, "reconnect attempt failed"),
            }
        }
        shared.reconnect_armed.store(false, Ordering::SeqCst);
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::net::TcpListener;
    use tokio::sync::mpsc;
    use tokio_tungstenite::accept_async;

    async fn local_server() -> (String, TcpListener) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        (format!("ws://{}", addr), listener)
    }

    fn test_config(url: &str) -> ChannelConfig {
        let mut config = ChannelConfig::new(url);
        config.backoff_floor = Duration::from_millis(10);
        config.backoff_ceiling = Duration::from_millis(40);
        config.disconnect_cooldown = Duration::from_millis(10);
        config
    }

    #[tokio::test]
    async fn dispatches_to_topic_and_all() {
        let (url, listener) = local_server().await;
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            ws.send(Message::Text(
                r#"{"en":"template","ed":{"type":"update","templateId":"t1"}}"#.to_string(),
            ))
            .await
            .unwrap();
            // Hold the connection open
            while ws.next().await.is_some() {}
        });

        let channel = RealtimeChannel::new(test_config(&url));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let tx2 = tx.clone();
        let _topic_sub = channel.register(TOPIC_TEMPLATE, move |event| {
            let tx = tx.clone();
            async move {
                tx.send(format!("topic:{}", event.name)).ok();
                Ok(())
            }
        });
        let _all_sub = channel.register(TOPIC_ALL, move |event| {
            let tx = tx2.clone();
            async move {
                tx.send(format!("all:{}", event.name)).ok();
                Ok(())
            }
        });

        channel.connect().await.unwrap();
        let mut seen = vec![rx.recv().await.unwrap(), rx.recv().await.unwrap()];
        seen.sort();
        assert_eq!(seen, vec!["all:template", "topic:template"]);
    }

    #[tokio::test]
    async fn handler_error_does_not_block_others() {
        let (url, listener) = local_server().await;
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            ws.send(Message::Text(
                r#"{"en":"entry","ed":{"type":"update","entryId":"e1"}}"#.to_string(),
            ))
            .await
            .unwrap();
            while ws.next().await.is_some() {}
        });

        let channel = RealtimeChannel::new(test_config(&url));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _failing = channel.register(TOPIC_ENTRY, |_event| async {
            Err(Error::Channel("boom".to_string()))
        });
        let _ok = channel.register(TOPIC_ENTRY, move |event| {
            let tx = tx.clone();
            async move {
                tx.send(event.name).ok();
                Ok(())
            }
        });

        channel.connect().await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), "entry");
    }

    #[tokio::test]
    async fn malformed_frames_are_dropped() {
        let (url, listener) = local_server().await;
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            ws.send(Message::Text("not json at all".to_string()))
                .await
                .unwrap();
            ws.send(Message::Text(
                r#"{"en":"group","ed":{"type":"update","groupId":"g1"}}"#.to_string(),
            ))
            .await
            .unwrap();
            while ws.next().await.is_some() {}
        });

        let channel = RealtimeChannel::new(test_config(&url));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _sub = channel.register(TOPIC_GROUP, move |event| {
            let tx = tx.clone();
            async move {
                tx.send(event.name).ok();
                Ok(())
            }
        });

        channel.connect().await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), "group");
    }

    #[tokio::test]
    async fn emit_reaches_server_when_connected() {
        let (url, listener) = local_server().await;
        let (tx, mut rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            while let Some(Ok(Message::Text(text))) = ws.next().await {
                tx.send(text).ok();
            }
        });

        let channel = RealtimeChannel::new(test_config(&url));
        // Not connected yet: dropped without error
        channel.emit("ping", json!({})).await.unwrap();

        channel.connect().await.unwrap();
        channel.emit("ping", json!({"n": 1})).await.unwrap();

        let frame = rx.recv().await.unwrap();
        let envelope: Envelope = serde_json::from_str(&frame).unwrap();
        assert_eq!(envelope.en, "ping");
        assert_eq!(envelope.ed, json!({"n": 1}));
    }

    #[tokio::test]
    async fn unregister_stops_delivery() {
        let (url, listener) = local_server().await;
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            ws.send(Message::Text(
                r#"{"en":"media","ed":{"type":"update","mediaId":"m1"}}"#.to_string(),
            ))
            .await
            .unwrap();
            while ws.next().await.is_some() {}
        });

        let channel = RealtimeChannel::new(test_config(&url));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let removed = channel.register(TOPIC_MEDIA, |_event| async { Ok(()) });
        removed.unregister();
        let _kept = channel.register(TOPIC_MEDIA, move |event| {
            let tx = tx.clone();
            async move {
                tx.send(event.name).ok();
                Ok(())
            }
        });
        assert_eq!(lock(&channel.shared.subs).len(), 1);

        channel.connect().await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), "media");
    }

    #[tokio::test]
    async fn reconnects_after_server_drop() {
        let (url, listener) = local_server().await;
        tokio::spawn(async move {
            // First connection dropped immediately, second held open
            let (stream, _) = listener.accept().await.unwrap();
            let ws = accept_async(stream).await.unwrap();
            drop(ws);
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            while ws.next().await.is_some() {}
        });

        let channel = RealtimeChannel::new(test_config(&url));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _open = channel.register_open(move || {
            let tx = tx.clone();
            async move {
                tx.send(()).ok();
            }
        });

        channel.connect().await.unwrap();
        rx.recv().await.unwrap();
        // Backoff floor is 10ms; the second open signals the reconnect
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("reconnect timed out")
            .unwrap();
        assert_eq!(channel.state(), ChannelState::Connected);
    }

    #[tokio::test]
    async fn disconnect_suppresses_retry() {
        let (url, listener) = local_server().await;
        tokio::spawn(async move {
            loop {
                let (stream, _) = listener.accept().await.unwrap();
                let mut ws = accept_async(stream).await.unwrap();
                tokio::spawn(async move { while ws.next().await.is_some() {} });
            }
        });

        let channel = RealtimeChannel::new(test_config(&url));
        channel.connect().await.unwrap();
        channel.disconnect().await;
        assert_eq!(channel.state(), ChannelState::Closed);

        // Past the cooldown the state settles at Disconnected, not Connected
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(channel.state(), ChannelState::Disconnected);
    }

    #[tokio::test]
    async fn disconnect_during_handshake_closes_the_new_socket() {
        let (url, listener) = local_server().await;
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            // Delay the handshake so the disconnect lands mid-connect
            tokio::time::sleep(Duration::from_millis(50)).await;
            let mut ws = accept_async(stream).await.unwrap();
            while ws.next().await.is_some() {}
        });

        let mut config = test_config(&url);
        config.disconnect_cooldown = Duration::from_secs(5);
        let channel = Arc::new(RealtimeChannel::new(config));
        let connecting = {
            let channel = Arc::clone(&channel);
            tokio::spawn(async move { channel.connect().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        channel.disconnect().await;

        assert!(connecting.await.unwrap().is_err());
        assert_eq!(channel.state(), ChannelState::Closed);
        // The stray socket was closed, which ends the server's read loop
        tokio::time::timeout(Duration::from_secs(2), server)
            .await
            .expect("socket left open")
            .unwrap();
    }
}
