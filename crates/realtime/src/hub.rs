//! 上游状态源
//!
//! 单一发布者，基于 `tokio::sync::broadcast` 扇出到所有在线的接收端

use metrics::counter;
use tokio::sync::broadcast;
use tracing::debug;

use crate::event::{EntityStatusEvent, StatusFrame};

/// 状态广播中心
#[derive(Debug, Clone)]
pub struct StatusHub {
    sender: broadcast::Sender<StatusFrame>,
}

impl StatusHub {
    /// 创建新的广播中心，`capacity` 为慢接收端可落后的最大帧数
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// 发布状态事件，返回收到该帧的接收端数量
    pub fn publish(&self, event: &EntityStatusEvent) -> usize {
        let delivered = self.publish_frame(StatusFrame::from_event(event));
        debug!(
            entity_id = %event.entity_id,
            new_status = %event.new_status,
            receivers = delivered,
            "Status event published"
        );
        delivered
    }

    /// 发布原始帧；没有接收端时直接丢弃
    pub fn publish_frame(&self, frame: StatusFrame) -> usize {
        counter!("live_status_events_published_total").increment(1);
        self.sender.send(frame).unwrap_or(0)
    }

    /// 获取订阅接收器
    pub fn subscribe(&self) -> broadcast::Receiver<StatusFrame> {
        self.sender.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use icu_common::IcuStatus;

    #[test]
    fn test_publish_without_receivers_is_dropped() {
        let hub = StatusHub::new(8);
        assert_eq!(hub.publish(&EntityStatusEvent::icu("icu01", IcuStatus::Occupied)), 0);
    }

    #[tokio::test]
    async fn test_every_receiver_gets_the_frame() {
        let hub = StatusHub::new(8);
        let mut first = hub.subscribe();
        let mut second = hub.subscribe();

        let event = EntityStatusEvent::icu("icu02", IcuStatus::Maintenance);
        assert_eq!(hub.publish(&event), 2);

        assert_eq!(first.recv().await.unwrap().decode_status().unwrap(), event);
        assert_eq!(second.recv().await.unwrap().decode_status().unwrap(), event);
    }

    #[test]
    fn test_late_receiver_sees_nothing_old() {
        let hub = StatusHub::new(8);
        let _early = hub.subscribe();
        hub.publish(&EntityStatusEvent::icu("icu01", IcuStatus::Available));

        let mut late = hub.subscribe();
        assert!(late.try_recv().is_err());
        assert_eq!(hub.receiver_count(), 2);
    }
}
