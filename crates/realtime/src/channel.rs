//! 实时状态通道
//!
//! 维护一条到上游的持久连接，按主题把收到的状态事件同步派发给订阅者。
//! 连接断开后以封顶的指数退避无限重连，订阅者只会通过状态回调看到
//! `Reconnecting`，不会收到错误。断线期间的事件不补发。

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use derive_more::Display;
use futures::StreamExt;
use icu_common::RetryConfig;
use metrics::{counter, gauge};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::event::{EntityStatusEvent, StatusFrame};
use crate::transport::StatusTransport;

/// 订阅标识
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display)]
#[display("sub-{_0}")]
pub struct SubscriptionId(u64);

/// 连接状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[display("connected")]
    Connected,
    #[display("disconnected")]
    Disconnected,
    #[display("reconnecting")]
    Reconnecting,
}

/// 状态事件回调
pub type StatusHandler = Arc<dyn Fn(&EntityStatusEvent) + Send + Sync>;

/// 连接状态回调
pub type StateHandler = Arc<dyn Fn(ConnectionState) + Send + Sync>;

struct Entry {
    id: SubscriptionId,
    on_event: StatusHandler,
    on_state: Option<StateHandler>,
    active: Arc<AtomicBool>,
}

struct Shared {
    registry: Mutex<HashMap<String, Vec<Entry>>>,
    next_id: AtomicU64,
    state: watch::Sender<ConnectionState>,
}

impl Shared {
    fn register(
        &self,
        topic: &str,
        on_event: StatusHandler,
        on_state: Option<StateHandler>,
    ) -> (SubscriptionId, Arc<AtomicBool>) {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let active = Arc::new(AtomicBool::new(true));

        self.registry
            .lock()
            .entry(topic.to_string())
            .or_default()
            .push(Entry {
                id,
                on_event,
                on_state,
                active: Arc::clone(&active),
            });

        gauge!("live_channel_subscriptions").increment(1.0);
        debug!(topic, subscription = %id, "Subscribed");
        (id, active)
    }

    fn remove(&self, topic: &str, id: SubscriptionId) -> bool {
        let mut registry = self.registry.lock();
        let Some(entries) = registry.get_mut(topic) else {
            return false;
        };
        let Some(index) = entries.iter().position(|entry| entry.id == id) else {
            return false;
        };

        let entry = entries.remove(index);
        // 在锁内置位，正在派发的快照会看到它
        entry.active.store(false, Ordering::Release);
        if entries.is_empty() {
            registry.remove(topic);
        }
        drop(registry);

        gauge!("live_channel_subscriptions").decrement(1.0);
        debug!(topic, subscription = %id, "Unsubscribed");
        true
    }

    fn count(&self) -> usize {
        self.registry.lock().values().map(Vec::len).sum()
    }

    fn dispatch(&self, frame: &StatusFrame) {
        let targets: Vec<(StatusHandler, Arc<AtomicBool>)> = match self.registry.lock().get(&frame.event) {
            Some(entries) => entries
                .iter()
                .map(|entry| (Arc::clone(&entry.on_event), Arc::clone(&entry.active)))
                .collect(),
            None => Vec::new(),
        };

        if targets.is_empty() {
            debug!(topic = %frame.event, "No subscribers for frame");
            return;
        }

        let event = match frame.decode_status() {
            Ok(event) => event,
            Err(e) => {
                warn!(topic = %frame.event, error = %e, "Dropping undecodable frame");
                return;
            }
        };

        let mut delivered = 0u64;
        for (handler, active) in targets {
            if active.load(Ordering::Acquire) {
                handler(&event);
                delivered += 1;
            }
        }
        counter!("live_status_events_delivered_total").increment(delivered);
    }

    fn set_state(&self, next: ConnectionState) {
        let changed = self.state.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            *current = next;
            true
        });
        if !changed {
            return;
        }

        info!(state = %next, "Live channel state changed");
        let listeners: Vec<StateHandler> = self
            .registry
            .lock()
            .values()
            .flatten()
            .filter_map(|entry| entry.on_state.clone())
            .collect();
        for listener in listeners {
            listener(next);
        }
    }
}

/// 订阅句柄
///
/// 丢弃时自动退订。
#[must_use = "dropping a Subscription unsubscribes it"]
pub struct Subscription {
    shared: Weak<Shared>,
    topic: String,
    id: SubscriptionId,
    active: Arc<AtomicBool>,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// 退订；返回后不会再有事件送达该回调
    pub fn unsubscribe(self) -> bool {
        self.release()
    }

    fn release(&self) -> bool {
        match self.shared.upgrade() {
            Some(shared) => shared.remove(&self.topic, self.id),
            None => false,
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if self.is_active() {
            self.release();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("topic", &self.topic)
            .field("active", &self.is_active())
            .finish()
    }
}

struct Pump {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// 实时状态通道
pub struct LiveStateChannel {
    shared: Arc<Shared>,
    transport: Arc<dyn StatusTransport>,
    reconnect: RetryConfig,
    pump: Mutex<Option<Pump>>,
}

impl LiveStateChannel {
    pub fn new(transport: Arc<dyn StatusTransport>, reconnect: RetryConfig) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            shared: Arc::new(Shared {
                registry: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                state,
            }),
            transport,
            reconnect,
            pump: Mutex::new(None),
        }
    }

    /// 启动连接泵；已在运行时不做任何事
    ///
    /// 需要在 tokio 运行时中调用。
    pub fn connect(&self) {
        let mut pump = self.pump.lock();
        if pump.as_ref().is_some_and(|p| !p.handle.is_finished()) {
            return;
        }

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_pump(
            Arc::clone(&self.shared),
            Arc::clone(&self.transport),
            self.reconnect.clone(),
            cancel.clone(),
        ));
        info!(transport = self.transport.name(), "Live channel connecting");
        *pump = Some(Pump { cancel, handle });
    }

    /// 关闭连接，未派发的帧被丢弃；返回时连接泵已停止
    pub async fn disconnect(&self) {
        let pump = self.pump.lock().take();
        if let Some(Pump { cancel, handle }) = pump {
            cancel.cancel();
            if let Err(e) = handle.await {
                warn!(error = %e, "Live channel pump ended abnormally");
            }
        }
        self.shared.set_state(ConnectionState::Disconnected);
    }

    /// 订阅主题
    pub fn subscribe<F>(&self, topic: &str, handler: F) -> Subscription
    where
        F: Fn(&EntityStatusEvent) + Send + Sync + 'static,
    {
        self.register(topic, Arc::new(handler), None)
    }

    /// 订阅主题，同时接收连接状态变化
    pub fn subscribe_with_state<F, S>(&self, topic: &str, handler: F, on_state: S) -> Subscription
    where
        F: Fn(&EntityStatusEvent) + Send + Sync + 'static,
        S: Fn(ConnectionState) + Send + Sync + 'static,
    {
        self.register(topic, Arc::new(handler), Some(Arc::new(on_state)))
    }

    fn register(&self, topic: &str, on_event: StatusHandler, on_state: Option<StateHandler>) -> Subscription {
        let (id, active) = self.shared.register(topic, on_event, on_state);
        Subscription {
            shared: Arc::downgrade(&self.shared),
            topic: topic.to_string(),
            id,
            active,
        }
    }

    /// 按标识退订；未找到时返回 false
    pub fn unsubscribe(&self, topic: &str, id: SubscriptionId) -> bool {
        self.shared.remove(topic, id)
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    /// 监听连接状态
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    pub fn subscription_count(&self) -> usize {
        self.shared.count()
    }
}

impl Drop for LiveStateChannel {
    fn drop(&mut self) {
        if let Some(pump) = self.pump.get_mut().take() {
            pump.cancel.cancel();
        }
    }
}

impl std::fmt::Debug for LiveStateChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveStateChannel")
            .field("transport", &self.transport.name())
            .field("state", &self.state())
            .field("subscriptions", &self.subscription_count())
            .finish()
    }
}

async fn run_pump(
    shared: Arc<Shared>,
    transport: Arc<dyn StatusTransport>,
    reconnect: RetryConfig,
    cancel: CancellationToken,
) {
    let mut failures: u32 = 0;

    'pump: loop {
        let opened = tokio::select! {
            biased;
            _ = cancel.cancelled() => break 'pump,
            opened = transport.open() => opened,
        };

        match opened {
            Ok(mut frames) => {
                failures = 0;
                shared.set_state(ConnectionState::Connected);

                loop {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break 'pump,
                        next = frames.next() => match next {
                            Some(Ok(frame)) => shared.dispatch(&frame),
                            Some(Err(e)) => {
                                warn!(error = %e, "Live transport failed");
                                break;
                            }
                            None => {
                                warn!("Live transport closed");
                                break;
                            }
                        },
                    }
                }
            }
            Err(e) => warn!(attempt = failures + 1, error = %e, "Live transport connect failed"),
        }

        if !reconnect.allows_attempt(failures) {
            warn!(attempts = failures, "Live channel giving up reconnecting");
            break 'pump;
        }

        let delay = reconnect.delay_for_attempt(failures);
        failures = failures.saturating_add(1);
        shared.set_state(ConnectionState::Reconnecting);
        counter!("live_channel_reconnects_total").increment(1);
        debug!(delay_ms = delay.as_millis() as u64, "Live channel reconnecting");

        tokio::select! {
            biased;
            _ = cancel.cancelled() => break 'pump,
            _ = tokio::time::sleep(delay) => {}
        }
    }

    shared.set_state(ConnectionState::Disconnected);
}
