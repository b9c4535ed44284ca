//! 연결 상태 추적.
//!
//! 푸시 채널의 상태 전이를 `watch` 채널로 브로드캐스트한다.
//! 코디네이터와 관찰자는 수신기를 구독해 상태 변화를 감지한다.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// 전송 계층 내부 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkState {
    /// 연결 없음 (초기 상태 또는 명시적 종료)
    #[default]
    Disconnected,
    /// 핸드셰이크 진행 중
    Connecting,
    /// 연결됨
    Connected,
    /// 실패: 재연결 대기 중이거나 재시도 소진
    Failing,
}

/// 관찰자에게 보이는 연결 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// 연결 시도 중
    Connecting,
    /// 연결됨
    Connected,
    /// 연결 끊김
    Disconnected,
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionStatus::Connecting => write!(f, "Connecting"),
            ConnectionStatus::Connected => write!(f, "Connected"),
            ConnectionStatus::Disconnected => write!(f, "Disconnected"),
        }
    }
}

/// 연결 상태 스냅샷
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConnectionSnapshot {
    pub state: LinkState,
    /// 현재까지의 재연결 시도 횟수 (연결 성공 시 0)
    pub reconnect_attempt: u32,
    pub last_error: Option<String>,
    /// 재시도 한도 소진: 명시적 `connect()` 전까지 재시도하지 않는다
    pub exhausted: bool,
}

impl ConnectionSnapshot {
    pub fn status(&self) -> ConnectionStatus {
        match self.state {
            LinkState::Connecting => ConnectionStatus::Connecting,
            LinkState::Connected => ConnectionStatus::Connected,
            LinkState::Disconnected | LinkState::Failing => ConnectionStatus::Disconnected,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state == LinkState::Connected
    }
}

/// 연결 상태 추적기
pub struct ConnectivityTracker {
    /// 상태 변경 브로드캐스트
    state_tx: watch::Sender<ConnectionSnapshot>,
    /// 상태 수신기 (복제 가능)
    state_rx: watch::Receiver<ConnectionSnapshot>,
    /// 마지막 연결 성공 시각 (epoch ms, 0 = 없음)
    last_success: AtomicI64,
}

impl ConnectivityTracker {
    pub fn new() -> Self {
        let (state_tx, state_rx) = watch::channel(ConnectionSnapshot::default());
        Self {
            state_tx,
            state_rx,
            last_success: AtomicI64::new(0),
        }
    }

    /// 현재 스냅샷
    pub fn snapshot(&self) -> ConnectionSnapshot {
        self.state_rx.borrow().clone()
    }

    pub fn state(&self) -> LinkState {
        self.state_rx.borrow().state
    }

    pub fn status(&self) -> ConnectionStatus {
        self.state_rx.borrow().status()
    }

    /// 상태 변경 수신기 생성
    pub fn subscribe(&self) -> watch::Receiver<ConnectionSnapshot> {
        self.state_rx.clone()
    }

    /// 핸드셰이크 시작
    pub fn mark_connecting(&self) {
        self.state_tx.send_modify(|s| {
            s.state = LinkState::Connecting;
            s.exhausted = false;
        });
        debug!("푸시 채널 연결 시도");
    }

    /// 연결 성공 기록: 시도 횟수 리셋
    pub fn record_success(&self) {
        self.last_success
            .store(loadpulse_core::models::now_millis(), Ordering::Relaxed);
        self.state_tx.send_modify(|s| {
            s.state = LinkState::Connected;
            s.reconnect_attempt = 0;
            s.last_error = None;
            s.exhausted = false;
        });
        info!("푸시 채널 연결됨");
    }

    /// 연결 실패 기록
    pub fn record_failure(&self, error: &str) {
        self.state_tx.send_modify(|s| {
            s.state = LinkState::Failing;
            s.last_error = Some(error.to_string());
        });
        warn!("푸시 채널 실패: {error}");
    }

    /// 다음 재연결 시도 번호 기록
    pub fn record_retry(&self, attempt: u32) {
        self.state_tx.send_modify(|s| s.reconnect_attempt = attempt);
    }

    /// 재시도 한도 소진
    pub fn mark_exhausted(&self, error: &str) {
        self.state_tx.send_modify(|s| {
            s.state = LinkState::Failing;
            s.exhausted = true;
            s.last_error = Some(error.to_string());
        });
        warn!("푸시 채널 재연결 포기: {error}");
    }

    /// 명시적 종료
    pub fn mark_disconnected(&self) {
        self.state_tx.send_modify(|s| {
            s.state = LinkState::Disconnected;
            s.reconnect_attempt = 0;
        });
        info!("푸시 채널 연결 해제");
    }

    /// 마지막 연결 성공 시각 (epoch ms)
    pub fn last_success_at(&self) -> Option<i64> {
        match self.last_success.load(Ordering::Relaxed) {
            0 => None,
            ts => Some(ts),
        }
    }
}

impl Default for ConnectivityTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Arc로 감싼 ConnectivityTracker
pub type SharedConnectivityTracker = Arc<ConnectivityTracker>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_state_is_disconnected() {
        let tracker = ConnectivityTracker::new();
        assert_eq!(tracker.state(), LinkState::Disconnected);
        assert_eq!(tracker.status(), ConnectionStatus::Disconnected);
        assert!(tracker.last_success_at().is_none());
    }

    #[test]
    fn success_resets_attempts_and_error() {
        let tracker = ConnectivityTracker::new();
        tracker.mark_connecting();
        tracker.record_failure("refused");
        tracker.record_retry(3);
        assert_eq!(tracker.snapshot().reconnect_attempt, 3);

        tracker.record_success();
        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.state, LinkState::Connected);
        assert_eq!(snapshot.reconnect_attempt, 0);
        assert!(snapshot.last_error.is_none());
        assert!(tracker.last_success_at().is_some());
    }

    #[test]
    fn failing_maps_to_disconnected() {
        let tracker = ConnectivityTracker::new();
        tracker.mark_connecting();
        assert_eq!(tracker.status(), ConnectionStatus::Connecting);
        tracker.record_failure("timeout");
        assert_eq!(tracker.status(), ConnectionStatus::Disconnected);
        assert_eq!(tracker.snapshot().last_error.as_deref(), Some("timeout"));
    }

    #[test]
    fn connecting_clears_exhausted() {
        let tracker = ConnectivityTracker::new();
        tracker.mark_exhausted("gave up");
        assert!(tracker.snapshot().exhausted);
        tracker.mark_connecting();
        assert!(!tracker.snapshot().exhausted);
    }

    #[tokio::test]
    async fn subscribe_receives_changes() {
        let tracker = ConnectivityTracker::new();
        let mut rx = tracker.subscribe();

        tracker.mark_connecting();
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().state, LinkState::Connecting);

        tracker.record_success();
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().status(), ConnectionStatus::Connected);
    }
}
