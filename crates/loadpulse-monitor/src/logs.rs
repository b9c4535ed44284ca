//! 테스트별 로그 보관소.
//!
//! 최신 로그가 앞에 오도록 보관한다 (서버 시드 응답 순서와 같음).

use loadpulse_core::models::log::LogEntry;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet, VecDeque};

/// 로그 보관소
pub struct LogBook {
    capacity: usize,
    tests: RwLock<HashMap<String, VecDeque<LogEntry>>>,
}

impl LogBook {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            tests: RwLock::new(HashMap::new()),
        }
    }

    /// 테스트 등록 (멱등)
    pub fn register(&self, test_id: &str) {
        self.tests
            .write()
            .entry(test_id.to_string())
            .or_default();
    }

    /// 실시간 로그 추가 (맨 앞). 미등록 테스트면 `false`.
    pub fn push(&self, test_id: &str, entry: LogEntry) -> bool {
        let mut tests = self.tests.write();
        let Some(entries) = tests.get_mut(test_id) else {
            return false;
        };
        entries.push_front(entry);
        entries.truncate(self.capacity);
        true
    }

    /// 초기 로그 병합
    ///
    /// `entries`는 최신순. 이미 받은 실시간 로그가 더 새로우므로 시드는 뒤에 붙이고,
    /// 같은 (시각, 레벨, 메시지)는 한 번만 남긴다.
    pub fn seed(&self, test_id: &str, entries: Vec<LogEntry>) -> bool {
        let mut tests = self.tests.write();
        let Some(existing) = tests.get_mut(test_id) else {
            return false;
        };

        let mut seen: HashSet<(i64, String, String)> = existing
            .iter()
            .map(|e| (e.timestamp, e.level.clone(), e.message.clone()))
            .collect();
        for entry in entries {
            if seen.insert((entry.timestamp, entry.level.clone(), entry.message.clone())) {
                existing.push_back(entry);
            }
        }
        existing.truncate(self.capacity);
        true
    }

    /// 최신순 로그
    pub fn entries(&self, test_id: &str) -> Vec<LogEntry> {
        self.tests
            .read()
            .get(test_id)
            .map(|entries| entries.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self, test_id: &str) -> usize {
        self.tests.read().get(test_id).map_or(0, VecDeque::len)
    }

    pub fn clear(&self, test_id: &str) -> bool {
        self.tests.write().remove(test_id).is_some()
    }
}
