//! 관찰자 인터페이스.
//!
//! 모든 읽기는 동기 스냅샷이다. 변경 알림은 이벤트 버스와 에러 watch 채널로 받는다.

use loadpulse_core::models::log::LogEntry;
use loadpulse_core::models::metrics::MetricSample;
use loadpulse_core::models::status::StatusState;
use loadpulse_network::connection::PushConnection;
use loadpulse_network::connectivity::{ConnectionSnapshot, ConnectionStatus};
use std::sync::Arc;
use tokio::sync::{broadcast, watch};

use crate::coordinator::MonitorPhase;
use crate::events::MonitorEvent;
use crate::state::MonitorState;

/// 테스트 하나의 버전 스냅샷
#[derive(Debug, Clone)]
pub struct TestSnapshot {
    pub test_id: String,
    pub phase: MonitorPhase,
    /// 메트릭 변경마다 증가
    pub version: u64,
    pub current: Option<Arc<MetricSample>>,
    pub history: Vec<Arc<MetricSample>>,
    pub status: Option<StatusState>,
    /// 최신순
    pub logs: Vec<LogEntry>,
}

/// 모니터 관찰 핸들 (복제 비용 낮음)
#[derive(Clone)]
pub struct MonitorView {
    state: Arc<MonitorState>,
    connection: PushConnection,
}

impl MonitorView {
    pub(crate) fn new(state: Arc<MonitorState>, connection: PushConnection) -> Self {
        Self { state, connection }
    }

    pub fn current_metrics(&self, test_id: &str) -> Option<Arc<MetricSample>> {
        self.state.metrics.current(test_id)
    }

    /// 메트릭 히스토리. `window_minutes`가 없으면 전체.
    pub fn metrics_history(
        &self,
        test_id: &str,
        window_minutes: Option<u32>,
    ) -> Vec<Arc<MetricSample>> {
        match window_minutes {
            Some(window) => self.state.metrics.query(test_id, window),
            None => self.state.metrics.history(test_id),
        }
    }

    pub fn status(&self, test_id: &str) -> Option<StatusState> {
        self.state.status.get(test_id)
    }

    /// 최신순 로그
    pub fn log_entries(&self, test_id: &str) -> Vec<LogEntry> {
        self.state.logs.entries(test_id)
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        self.connection.status()
    }

    pub fn connection_snapshot(&self) -> ConnectionSnapshot {
        self.connection.snapshot()
    }

    /// 코디네이터 에러 (재연결 소진, 연결 대기 타임아웃)
    pub fn error(&self) -> Option<String> {
        self.state.error()
    }

    pub fn phase(&self, test_id: &str) -> MonitorPhase {
        self.state.phase(test_id)
    }

    /// 모니터링 중인 테스트 ID (정렬)
    pub fn monitored_tests(&self) -> Vec<String> {
        self.state.monitored_tests()
    }

    /// 모니터링 중이 아니면 `None`
    pub fn snapshot(&self, test_id: &str) -> Option<TestSnapshot> {
        let metrics = self.state.metrics.snapshot(test_id)?;
        Some(TestSnapshot {
            test_id: test_id.to_string(),
            phase: self.state.phase(test_id),
            version: metrics.version,
            current: metrics.current,
            history: metrics.history,
            status: self.state.status.get(test_id),
            logs: self.state.logs.entries(test_id),
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.state.events.subscribe()
    }

    pub fn watch_error(&self) -> watch::Receiver<Option<String>> {
        self.state.watch_error()
    }

    pub fn watch_connection(&self) -> watch::Receiver<ConnectionSnapshot> {
        self.connection.watch_state()
    }
}
