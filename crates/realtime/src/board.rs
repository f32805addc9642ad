//! ICU 看板
//!
//! 消费端本地的 ICU 视图，通过实时通道保持最新状态

use std::collections::BTreeMap;
use std::sync::Arc;

use icu_common::IcuStatus;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::channel::{LiveStateChannel, Subscription};
use crate::event::{EntityStatusEvent, ICU_STATUS_TOPIC};

/// ICU 记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IcuRecord {
    pub id: String,
    pub room: String,
    pub specialization: String,
    pub status: IcuStatus,
    pub capacity: u32,
    pub fee: u32,
}

/// 按 id 索引的 ICU 集合
#[derive(Debug, Clone, Default)]
pub struct IcuBoard {
    records: BTreeMap<String, IcuRecord>,
}

impl IcuBoard {
    pub fn new(records: impl IntoIterator<Item = IcuRecord>) -> Self {
        Self {
            records: records.into_iter().map(|r| (r.id.clone(), r)).collect(),
        }
    }

    pub fn insert(&mut self, record: IcuRecord) -> Option<IcuRecord> {
        self.records.insert(record.id.clone(), record)
    }

    pub fn get(&self, id: &str) -> Option<&IcuRecord> {
        self.records.get(id)
    }

    pub fn list(&self) -> Vec<IcuRecord> {
        self.records.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// 应用状态事件；未知 id 忽略，返回是否有记录被更新
    pub fn apply(&mut self, event: &EntityStatusEvent) -> bool {
        match self.records.get_mut(&event.entity_id) {
            Some(record) => {
                record.status = event.new_status;
                true
            }
            None => {
                debug!(icu_id = %event.entity_id, "Ignoring status for unknown ICU");
                false
            }
        }
    }
}

/// 让看板跟随实时通道；丢弃返回的订阅即停止跟随
pub fn follow(board: Arc<RwLock<IcuBoard>>, channel: &LiveStateChannel) -> Subscription {
    channel.subscribe(ICU_STATUS_TOPIC, move |event| {
        board.write().apply(event);
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> IcuBoard {
        IcuBoard::new([
            IcuRecord {
                id: "icu01".into(),
                room: "101".into(),
                specialization: "Cardiology".into(),
                status: IcuStatus::Available,
                capacity: 1,
                fee: 600,
            },
            IcuRecord {
                id: "icu02".into(),
                room: "102".into(),
                specialization: "Neurology".into(),
                status: IcuStatus::Occupied,
                capacity: 1,
                fee: 800,
            },
            IcuRecord {
                id: "icu03".into(),
                room: "103".into(),
                specialization: "General".into(),
                status: IcuStatus::Maintenance,
                capacity: 2,
                fee: 500,
            },
        ])
    }

    #[test]
    fn test_apply_replaces_status() {
        let mut board = sample();
        assert!(board.apply(&EntityStatusEvent::icu("icu01", IcuStatus::Occupied)));
        assert_eq!(board.get("icu01").unwrap().status, IcuStatus::Occupied);
        assert_eq!(board.get("icu02").unwrap().status, IcuStatus::Occupied);
    }

    #[test]
    fn test_apply_ignores_unknown_icu() {
        let mut board = sample();
        let before = board.list();
        assert!(!board.apply(&EntityStatusEvent::icu("icu99", IcuStatus::Available)));
        assert_eq!(board.list(), before);
    }

    #[test]
    fn test_record_serializes_camel_case() {
        let board = sample();
        let json = serde_json::to_value(board.get("icu03").unwrap()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "id": "icu03",
                "room": "103",
                "specialization": "General",
                "status": "MAINTENANCE",
                "capacity": 2,
                "fee": 500
            })
        );
    }

    #[tokio::test]
    async fn test_follow_keeps_board_current() {
        use crate::hub::StatusHub;
        use crate::transport::HubTransport;
        use icu_common::RetryConfig;
        use std::time::Duration;

        let hub = StatusHub::new(8);
        let channel = LiveStateChannel::new(
            Arc::new(HubTransport::new(hub.clone())),
            RetryConfig::unlimited(Duration::from_millis(5), Duration::from_millis(20)),
        );
        let board = Arc::new(RwLock::new(sample()));
        let _following = follow(Arc::clone(&board), &channel);

        channel.connect();
        let mut state = channel.watch_state();
        state
            .wait_for(|s| *s == crate::channel::ConnectionState::Connected)
            .await
            .unwrap();

        hub.publish(&EntityStatusEvent::icu("icu03", IcuStatus::Available));
        for _ in 0..200 {
            if board.read().get("icu03").unwrap().status == IcuStatus::Available {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(board.read().get("icu03").unwrap().status, IcuStatus::Available);

        channel.disconnect().await;
    }
}
