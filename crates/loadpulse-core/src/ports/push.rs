//! 푸시 채널 포트.
//!
//! 구현: `loadpulse-network` crate (tokio-tungstenite + STOMP)

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::error::CoreError;

/// 와이어 레벨 구독 식별자 (STOMP `id` 헤더)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(String);

impl SubscriptionHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SubscriptionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// 링크에서 올라오는 수신 이벤트
#[derive(Debug, Clone, PartialEq)]
pub enum PushEvent {
    /// 토픽 메시지 (본문은 원본 문자열)
    Message { topic: String, body: String },
    /// 서버 하트비트 또는 영수증: 연결 생존 신호
    Heartbeat,
    /// 프로토콜 에러 (서버는 보통 이후 연결을 닫는다)
    Error(String),
    /// 연결 종료
    Closed(Option<String>),
}

/// 수립된 연결 하나에 대한 송신 핸들
#[async_trait]
pub trait PushLink: Send + Sync {
    /// 토픽 구독
    async fn subscribe(&self, topic: &str, handle: &SubscriptionHandle) -> Result<(), CoreError>;

    /// 구독 해제
    async fn unsubscribe(&self, handle: &SubscriptionHandle) -> Result<(), CoreError>;

    /// 목적지로 메시지 발행
    async fn publish(&self, destination: &str, body: &str) -> Result<(), CoreError>;

    /// 연결 종료
    async fn close(&self) -> Result<(), CoreError>;

    /// 서버가 약속한 heart-beat 수신 간격. 약속하지 않았으면 `None`.
    fn server_heartbeat(&self) -> Option<Duration> {
        None
    }
}

/// 푸시 채널 연결 수립기
#[async_trait]
pub trait PushConnector: Send + Sync {
    /// 핸드셰이크까지 완료된 링크를 반환한다.
    ///
    /// 이후 수신 이벤트는 `events`로 전달되며,
    /// 연결이 끝나면 `PushEvent::Closed`가 마지막으로 전송된다.
    async fn connect(
        &self,
        url: &str,
        events: mpsc::Sender<PushEvent>,
    ) -> Result<Arc<dyn PushLink>, CoreError>;
}
