use crate::AppState;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tracing::debug;
use vigia_monitor::ChannelSink;

pub async fn stream_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// 把订阅中心的推送桥接到 WebSocket
///
/// 连接关闭后 ChannelSink 的接收端随之释放，订阅中心在下一次推送时移除该订阅者。
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (sink, mut rx) = ChannelSink::new();
    let subscriber = state.monitor.subscribe(Arc::new(sink)).await;
    let (mut sender, mut receiver) = socket.split();

    loop {
        tokio::select! {
            payload = rx.recv() => {
                let Some(payload) = payload else { break };
                if sender.send(Message::Text(payload)).await.is_err() {
                    break;
                }
            }
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    state.monitor.unsubscribe(subscriber).await;
    debug!(subscriber, "WebSocket stream closed");
}
