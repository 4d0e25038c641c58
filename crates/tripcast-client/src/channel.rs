//! 피드 채널 추상화.
//!
//! 세션 관리자가 요구하는 유일한 네트워킹 프리미티브:
//! 열기/닫기/전송과 수신 이벤트 스트림. 실 구현은 WebSocket이며
//! 테스트는 인메모리 채널로 대체합니다.

use async_trait::async_trait;
use futures::stream::{SplitSink, StreamExt};
use futures::SinkExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{
    connect_async, tungstenite::protocol::Message, MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, info, warn};

use crate::error::ClientError;

/// 채널 수명주기 이벤트.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// 수신된 텍스트 프레임
    Message(String),
    /// 상대방 또는 전송 계층에 의한 종료
    Closed,
    /// 채널 수준 에러
    Error(String),
}

/// 양방향 피드 채널.
#[async_trait]
pub trait FeedChannel: Send {
    /// 채널을 열고 수신 이벤트 스트림을 반환합니다.
    async fn open(&mut self) -> Result<mpsc::Receiver<ChannelEvent>, ClientError>;

    /// 텍스트 프레임을 전송합니다.
    async fn send(&mut self, text: String) -> Result<(), ClientError>;

    /// 채널을 닫고 내부 자원을 해제합니다.
    async fn close(&mut self);
}

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// WebSocket 기반 피드 채널.
pub struct WsFeedChannel {
    url: String,
    write: Option<WsSink>,
    read_task: Option<JoinHandle<()>>,
}

impl WsFeedChannel {
    /// 주어진 URL에 연결하는 채널을 생성합니다.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            write: None,
            read_task: None,
        }
    }
}

#[async_trait]
impl FeedChannel for WsFeedChannel {
    async fn open(&mut self) -> Result<mpsc::Receiver<ChannelEvent>, ClientError> {
        info!("Connecting to feed: {}", self.url);

        let (ws, _) = connect_async(&self.url)
            .await
            .map_err(|e| ClientError::Channel(e.to_string()))?;

        let (write, mut read) = ws.split();
        self.write = Some(write);

        let (tx, rx) = mpsc::channel(256);
        self.read_task = Some(tokio::spawn(async move {
            while let Some(result) = read.next().await {
                match result {
                    Ok(Message::Text(text)) => {
                        if tx.send(ChannelEvent::Message(text.to_string())).await.is_err() {
                            break;
                        }
                    }
                    Ok(Message::Close(_)) => {
                        debug!("Feed channel closed by peer");
                        let _ = tx.send(ChannelEvent::Closed).await;
                        return;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!("Feed channel error: {}", e);
                        let _ = tx.send(ChannelEvent::Error(e.to_string())).await;
                        return;
                    }
                }
            }
            let _ = tx.send(ChannelEvent::Closed).await;
        }));

        info!("Feed channel open");
        Ok(rx)
    }

    async fn send(&mut self, text: String) -> Result<(), ClientError> {
        let write = self.write.as_mut().ok_or(ClientError::NotOpen)?;
        write
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| ClientError::Channel(e.to_string()))
    }

    async fn close(&mut self) {
        if let Some(mut write) = self.write.take() {
            let _ = write.close().await;
        }
        if let Some(task) = self.read_task.take() {
            task.abort();
        }
        debug!("Feed channel closed");
    }
}

// ==================== 테스트용 인메모리 채널 ====================

/// 테스트용 인메모리 피드 채널.
///
/// `pair()`로 만든 핸들을 통해 원격 측을 흉내냅니다.
pub struct MemoryChannel {
    fail_open: bool,
    events_rx: Option<mpsc::Receiver<ChannelEvent>>,
    sent_tx: mpsc::UnboundedSender<String>,
}

/// 인메모리 채널의 원격 측 핸들.
pub struct MemoryChannelHandle {
    events_tx: mpsc::Sender<ChannelEvent>,
    sent_rx: mpsc::UnboundedReceiver<String>,
}

impl MemoryChannel {
    /// 채널과 원격 핸들 쌍을 생성합니다.
    pub fn pair() -> (Self, MemoryChannelHandle) {
        let (events_tx, events_rx) = mpsc::channel(256);
        let (sent_tx, sent_rx) = mpsc::unbounded_channel();
        (
            Self {
                fail_open: false,
                events_rx: Some(events_rx),
                sent_tx,
            },
            MemoryChannelHandle { events_tx, sent_rx },
        )
    }

    /// 열기가 항상 실패하는 채널 (피드 불가 시나리오).
    pub fn failing() -> Self {
        let (sent_tx, _) = mpsc::unbounded_channel();
        Self {
            fail_open: true,
            events_rx: None,
            sent_tx,
        }
    }
}

#[async_trait]
impl FeedChannel for MemoryChannel {
    async fn open(&mut self) -> Result<mpsc::Receiver<ChannelEvent>, ClientError> {
        if self.fail_open {
            return Err(ClientError::Channel("feed unavailable".to_string()));
        }
        self.events_rx
            .take()
            .ok_or_else(|| ClientError::Channel("channel already opened".to_string()))
    }

    async fn send(&mut self, text: String) -> Result<(), ClientError> {
        self.sent_tx
            .send(text)
            .map_err(|_| ClientError::Channel("remote side dropped".to_string()))
    }

    async fn close(&mut self) {}
}

impl MemoryChannelHandle {
    /// 원격에서 텍스트 프레임을 전달합니다.
    pub async fn push_text(&self, text: impl Into<String>) {
        let _ = self
            .events_tx
            .send(ChannelEvent::Message(text.into()))
            .await;
    }

    /// 원격에서 채널을 닫습니다.
    pub async fn push_closed(&self) {
        let _ = self.events_tx.send(ChannelEvent::Closed).await;
    }

    /// 채널 에러를 발생시킵니다.
    pub async fn push_error(&self, reason: impl Into<String>) {
        let _ = self
            .events_tx
            .send(ChannelEvent::Error(reason.into()))
            .await;
    }

    /// 클라이언트가 보낸 프레임을 모두 가져옵니다.
    pub fn drain_sent(&mut self) -> Vec<String> {
        let mut sent = Vec::new();
        while let Ok(text) = self.sent_rx.try_recv() {
            sent.push(text);
        }
        sent
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_channel_roundtrip() {
        let (mut channel, mut handle) = MemoryChannel::pair();
        let mut rx = channel.open().await.unwrap();

        handle.push_text("hello").await;
        assert_eq!(
            rx.recv().await,
            Some(ChannelEvent::Message("hello".to_string()))
        );

        channel.send("world".to_string()).await.unwrap();
        assert_eq!(handle.drain_sent(), vec!["world"]);
    }

    #[tokio::test]
    async fn test_memory_channel_failing_open() {
        let mut channel = MemoryChannel::failing();
        assert!(channel.open().await.is_err());
    }

    #[tokio::test]
    async fn test_memory_channel_double_open_fails() {
        let (mut channel, _handle) = MemoryChannel::pair();
        channel.open().await.unwrap();
        assert!(channel.open().await.is_err());
    }
}
