//! 코디네이터와 관찰자가 공유하는 모니터 상태.

use loadpulse_core::config::MonitorConfig;
use parking_lot::RwLock;
use std::collections::HashMap;
use tokio::sync::watch;

use crate::aggregator::MetricsAggregator;
use crate::coordinator::MonitorPhase;
use crate::events::{EventBus, MonitorEvent};
use crate::logs::LogBook;
use crate::status::StatusBoard;

pub(crate) struct MonitorState {
    pub(crate) metrics: MetricsAggregator,
    pub(crate) status: StatusBoard,
    pub(crate) logs: LogBook,
    pub(crate) events: EventBus,
    phases: RwLock<HashMap<String, MonitorPhase>>,
    error_tx: watch::Sender<Option<String>>,
}

impl MonitorState {
    pub(crate) fn new(config: &MonitorConfig) -> Self {
        let (error_tx, _) = watch::channel(None);
        Self {
            metrics: MetricsAggregator::new(config.history_capacity),
            status: StatusBoard::new(),
            logs: LogBook::new(config.log_capacity),
            events: EventBus::new(config.event_capacity),
            phases: RwLock::new(HashMap::new()),
            error_tx,
        }
    }

    /// 테스트 저장소 등록
    pub(crate) fn register(&self, test_id: &str) {
        self.metrics.register(test_id);
        self.status.register(test_id);
        self.logs.register(test_id);
    }

    /// 테스트 저장소 정리 후 `Idle`로 전환
    pub(crate) fn clear(&self, test_id: &str) {
        self.metrics.clear(test_id);
        self.status.clear(test_id);
        self.logs.clear(test_id);
        self.set_phase(test_id, MonitorPhase::Idle);
    }

    pub(crate) fn set_phase(&self, test_id: &str, phase: MonitorPhase) {
        let previous = {
            let mut phases = self.phases.write();
            if phase == MonitorPhase::Idle {
                phases.remove(test_id)
            } else {
                phases.insert(test_id.to_string(), phase)
            }
        };
        if previous.unwrap_or_default() != phase {
            self.events.publish(MonitorEvent::PhaseChanged {
                test_id: test_id.to_string(),
                phase,
            });
        }
    }

    pub(crate) fn phase(&self, test_id: &str) -> MonitorPhase {
        self.phases
            .read()
            .get(test_id)
            .copied()
            .unwrap_or_default()
    }

    pub(crate) fn monitored_tests(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.phases.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// 코디네이터 에러 설정. 값이 바뀌었으면 `true`.
    pub(crate) fn set_error(&self, error: Option<String>) -> bool {
        let changed = self.error_tx.send_if_modified(|current| {
            if *current == error {
                return false;
            }
            *current = error.clone();
            true
        });
        if changed {
            self.events.publish(MonitorEvent::ErrorChanged(error));
        }
        changed
    }

    pub(crate) fn error(&self) -> Option<String> {
        self.error_tx.borrow().clone()
    }

    pub(crate) fn watch_error(&self) -> watch::Receiver<Option<String>> {
        self.error_tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_transitions_publish_once() {
        let state = MonitorState::new(&MonitorConfig::default());
        let mut rx = state.events.subscribe();

        state.set_phase("T1", MonitorPhase::Connecting);
        state.set_phase("T1", MonitorPhase::Connecting);
        state.set_phase("T1", MonitorPhase::Idle);

        let mut phases = Vec::new();
        while let Ok(MonitorEvent::PhaseChanged { phase, .. }) = rx.try_recv() {
            phases.push(phase);
        }
        assert_eq!(phases, vec![MonitorPhase::Connecting, MonitorPhase::Idle]);
        assert!(state.monitored_tests().is_empty());
    }

    #[test]
    fn error_is_deduplicated() {
        let state = MonitorState::new(&MonitorConfig::default());
        let rx = state.watch_error();

        assert!(state.set_error(Some("x".into())));
        assert!(!state.set_error(Some("x".into())));
        assert_eq!(rx.borrow().as_deref(), Some("x"));

        assert!(state.set_error(None));
        assert!(state.error().is_none());
    }
}
