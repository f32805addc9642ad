//! icu-realtime - ICU 实时状态同步
//!
//! - `StatusHub`：上游状态源，单一发布者
//! - `LiveStateChannel`：到上游的持久连接，按主题派发、断线自动重连
//! - `IcuBoard`：消费端的 ICU 视图

pub mod board;
pub mod channel;
pub mod event;
pub mod hub;
pub mod transport;

pub use board::{IcuBoard, IcuRecord, follow};
pub use channel::{
    ConnectionState, LiveStateChannel, StateHandler, StatusHandler, Subscription, SubscriptionId,
};
pub use event::{EntityStatusEvent, ICU_STATUS_TOPIC, IcuStatusPayload, StatusFrame, topic_for};
pub use hub::StatusHub;
pub use transport::{FrameStream, HubTransport, StatusTransport};
