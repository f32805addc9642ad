//! 实时通道的传输层

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use icu_errors::AppResult;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tracing::warn;

use crate::event::StatusFrame;
use crate::hub::StatusHub;

/// 一次连接上收到的帧流；流结束或产生错误都视为连接断开
pub type FrameStream = BoxStream<'static, AppResult<StatusFrame>>;

/// 持久连接
#[async_trait]
pub trait StatusTransport: Send + Sync + 'static {
    /// 建立连接
    async fn open(&self) -> AppResult<FrameStream>;

    /// 传输名称（用于日志）
    fn name(&self) -> &'static str {
        "transport"
    }
}

/// 进程内传输，直接挂在 `StatusHub` 上
#[derive(Debug, Clone)]
pub struct HubTransport {
    hub: StatusHub,
}

impl HubTransport {
    pub fn new(hub: StatusHub) -> Self {
        Self { hub }
    }
}

#[async_trait]
impl StatusTransport for HubTransport {
    async fn open(&self) -> AppResult<FrameStream> {
        let frames = BroadcastStream::new(self.hub.subscribe()).filter_map(|item| async move {
            match item {
                Ok(frame) => Some(Ok(frame)),
                // 尽力而为：落后的帧直接跳过，不重放
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    warn!(skipped, "Live transport lagged, frames dropped");
                    None
                }
            }
        });
        Ok(frames.boxed())
    }

    fn name(&self) -> &'static str {
        "hub"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EntityStatusEvent;
    use icu_common::IcuStatus;

    #[tokio::test]
    async fn test_hub_transport_streams_published_frames() {
        let hub = StatusHub::new(8);
        let transport = HubTransport::new(hub.clone());
        let mut frames = transport.open().await.unwrap();

        hub.publish(&EntityStatusEvent::icu("icu01", IcuStatus::Occupied));
        hub.publish(&EntityStatusEvent::icu("icu01", IcuStatus::Maintenance));

        let first = frames.next().await.unwrap().unwrap().decode_status().unwrap();
        let second = frames.next().await.unwrap().unwrap().decode_status().unwrap();
        assert_eq!(first.new_status, IcuStatus::Occupied);
        assert_eq!(second.new_status, IcuStatus::Maintenance);
    }

    #[tokio::test]
    async fn test_hub_transport_skips_lagged_frames() {
        let hub = StatusHub::new(2);
        let transport = HubTransport::new(hub.clone());
        let mut frames = transport.open().await.unwrap();

        for status in [IcuStatus::Occupied, IcuStatus::Maintenance, IcuStatus::Available] {
            hub.publish(&EntityStatusEvent::icu("icu01", status));
        }

        // 容量为 2，最早的一帧被覆盖，后两帧仍按顺序到达
        let next = frames.next().await.unwrap().unwrap().decode_status().unwrap();
        assert_eq!(next.new_status, IcuStatus::Maintenance);
        let next = frames.next().await.unwrap().unwrap().decode_status().unwrap();
        assert_eq!(next.new_status, IcuStatus::Available);
    }
}
