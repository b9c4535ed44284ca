//! 모니터 이벤트 버스.
//!
//! `tokio::broadcast` 기반 변경 알림. 관찰자는 이벤트를 받은 뒤 `MonitorView`로 스냅샷을 읽는다.

use loadpulse_core::models::status::TestStatus;
use loadpulse_network::connectivity::ConnectionStatus;
use tokio::sync::broadcast;
use tracing::debug;

use crate::coordinator::MonitorPhase;

/// 모니터 이벤트
#[derive(Debug, Clone, PartialEq)]
pub enum MonitorEvent {
    /// 메트릭 갱신 (실시간 샘플 또는 시드)
    MetricsUpdated { test_id: String, version: u64 },
    /// 상태 변경
    StatusChanged { test_id: String, status: TestStatus },
    /// 로그 추가
    LogsUpdated { test_id: String },
    /// 세션 단계 변경
    PhaseChanged { test_id: String, phase: MonitorPhase },
    /// 연결 상태 변경
    ConnectionChanged(ConnectionStatus),
    /// 코디네이터 에러 발생 (`None`이면 해소)
    ErrorChanged(Option<String>),
}

/// 이벤트 버스
pub struct EventBus {
    tx: broadcast::Sender<MonitorEvent>,
}

impl EventBus {
    /// 새 이벤트 버스 생성
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// 이벤트 발행 (구독자가 없으면 버림)
    pub fn publish(&self, event: MonitorEvent) {
        debug!("이벤트 발행: {:?}", std::mem::discriminant(&event));
        let _ = self.tx.send(event);
    }

    /// 구독자 생성
    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
