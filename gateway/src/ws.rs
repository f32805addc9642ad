use std::fmt::Display;

use axum::{
    extract::{ws::{Message, WebSocket, WebSocketUpgrade}, State},
    response::IntoResponse,
};
use futures::{Sink, sink::SinkExt, stream::StreamExt};
use icu_realtime::{StatusFrame, StatusHub};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, warn};

use crate::app::AppState;

/// WebSocket 处理器
///
/// 只读广播，不需要鉴权：连接上的客户端收到此后发布的所有状态帧。
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state.hub))
}

async fn handle_socket(socket: WebSocket, hub: StatusHub) {
    let (sender, mut receiver) = socket.split();

    // 订阅广播通道
    let rx = hub.subscribe();
    info!(receivers = hub.receiver_count(), "WebSocket connected");

    let mut send_task = tokio::spawn(forward_frames(rx, sender));

    // 客户端消息只用于感知关闭
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Close(_) = msg {
                break;
            }
        }
    });

    // 等待任一任务结束
    tokio::select! {
        _ = (&mut send_task) => recv_task.abort(),
        _ = (&mut recv_task) => send_task.abort(),
    };

    info!("WebSocket disconnected");
}

/// 将广播帧以文本消息推送给客户端，直到广播关闭或发送失败
///
/// 落后过多时跳过丢失的帧，继续推送之后的帧。
async fn forward_frames<S>(mut rx: broadcast::Receiver<StatusFrame>, mut sink: S)
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    loop {
        let frame = match rx.recv().await {
            Ok(frame) => frame,
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "WebSocket client lagged, frames dropped");
                continue;
            }
            Err(RecvError::Closed) => break,
        };

        let text = match frame.to_json() {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "Skipping unserializable frame");
                continue;
            }
        };

        if let Err(e) = sink.send(Message::Text(text.into())).await {
            debug!("Failed to send message to websocket: {}", e);
            break;
        }
    }
}
