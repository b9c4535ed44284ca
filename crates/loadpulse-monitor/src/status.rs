//! 테스트별 상태 보관소.

use loadpulse_core::models::status::{StatusState, StatusUpdate};
use parking_lot::RwLock;
use std::collections::HashMap;

/// 상태 보관소
#[derive(Default)]
pub struct StatusBoard {
    tests: RwLock<HashMap<String, StatusState>>,
}

impl StatusBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, test_id: &str) {
        self.tests
            .write()
            .entry(test_id.to_string())
            .or_default();
    }

    /// 부분 업데이트 병합. 미등록 테스트면 `None`, 아니면 병합 결과.
    pub fn apply(&self, test_id: &str, update: StatusUpdate) -> Option<StatusState> {
        let mut tests = self.tests.write();
        let state = tests.get_mut(test_id)?;
        state.apply(update);
        Some(state.clone())
    }

    pub fn get(&self, test_id: &str) -> Option<StatusState> {
        self.tests.read().get(test_id).cloned()
    }

    pub fn clear(&self, test_id: &str) -> bool {
        self.tests.write().remove(test_id).is_some()
    }
}
