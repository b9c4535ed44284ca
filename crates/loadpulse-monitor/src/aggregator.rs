//! 테스트별 메트릭 집계.
//!
//! 등록된 테스트마다 현재 샘플, 히스토리, 버전을 보관한다.
//! 등록되지 않은 테스트로 온 샘플은 버린다 (정리된 상태가 되살아나지 않도록).

use loadpulse_core::models::metrics::MetricSample;
use loadpulse_core::models::now_millis;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

use crate::history::MetricHistory;

/// 테스트 하나의 메트릭 상태
#[derive(Debug, Clone)]
struct TestMetricsState {
    current: Option<Arc<MetricSample>>,
    history: MetricHistory,
    version: u64,
}

impl TestMetricsState {
    fn new(capacity: usize) -> Self {
        Self {
            current: None,
            history: MetricHistory::new(capacity),
            version: 0,
        }
    }
}

/// 한 번의 잠금으로 읽은 메트릭 상태
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub version: u64,
    pub current: Option<Arc<MetricSample>>,
    pub history: Vec<Arc<MetricSample>>,
}

/// 메트릭 집계기
pub struct MetricsAggregator {
    capacity: usize,
    tests: RwLock<HashMap<String, TestMetricsState>>,
}

impl MetricsAggregator {
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
            .or_insert_with(|| TestMetricsState::new(self.capacity));
    }

    pub fn is_registered(&self, test_id: &str) -> bool {
        self.tests.read().contains_key(test_id)
    }

    /// 실시간 샘플 반영. 등록되지 않은 테스트면 `false`.
    pub fn ingest(&self, test_id: &str, sample: MetricSample) -> bool {
        let mut tests = self.tests.write();
        let Some(state) = tests.get_mut(test_id) else {
            debug!(test_id, "미등록 테스트 샘플 무시");
            return false;
        };
        let sample = Arc::new(sample);
        state.history.push(sample.clone());
        state.current = Some(sample);
        state.version += 1;
        true
    }

    /// 초기 히스토리 병합
    ///
    /// 기존 히스토리와 합쳐 타임스탬프 순으로 정렬하고, 같은 타임스탬프는 기존 값을 유지한다.
    /// 같은 입력으로 두 번 호출해도 결과는 같다.
    pub fn seed(&self, test_id: &str, samples: Vec<MetricSample>) -> bool {
        let mut tests = self.tests.write();
        let Some(state) = tests.get_mut(test_id) else {
            return false;
        };
        if samples.is_empty() {
            return true;
        }

        let mut seen: HashSet<i64> = state.history.iter().map(|s| s.timestamp).collect();
        let mut merged = state.history.to_vec();
        for sample in samples {
            if seen.insert(sample.timestamp) {
                merged.push(Arc::new(sample));
            }
        }
        merged.sort_by_key(|s| s.timestamp);

        state.history.replace(merged);
        state.current = state.history.latest().cloned();
        state.version += 1;
        debug!(test_id, len = state.history.len(), "메트릭 히스토리 시드");
        true
    }

    /// 테스트 상태 제거
    pub fn clear(&self, test_id: &str) -> bool {
        self.tests.write().remove(test_id).is_some()
    }

    /// 최근 `window_minutes`분 이내 샘플
    pub fn query(&self, test_id: &str, window_minutes: u32) -> Vec<Arc<MetricSample>> {
        self.query_at(test_id, window_minutes, now_millis())
    }

    /// 기준 시각을 지정한 조회 (`timestamp > now - window`)
    pub fn query_at(&self, test_id: &str, window_minutes: u32, now_ms: i64) -> Vec<Arc<MetricSample>> {
        let cutoff = now_ms - i64::from(window_minutes) * 60_000;
        self.tests
            .read()
            .get(test_id)
            .map(|state| state.history.since(cutoff))
            .unwrap_or_default()
    }

    pub fn current(&self, test_id: &str) -> Option<Arc<MetricSample>> {
        self.tests.read().get(test_id)?.current.clone()
    }

    pub fn history(&self, test_id: &str) -> Vec<Arc<MetricSample>> {
        self.tests
            .read()
            .get(test_id)
            .map(|state| state.history.to_vec())
            .unwrap_or_default()
    }

    pub fn version(&self, test_id: &str) -> Option<u64> {
        self.tests.read().get(test_id).map(|state| state.version)
    }

    /// 버전, 현재 샘플, 히스토리를 같은 시점 기준으로 읽는다
    pub fn snapshot(&self, test_id: &str) -> Option<MetricsSnapshot> {
        let tests = self.tests.read();
        let state = tests.get(test_id)?;
        Some(MetricsSnapshot {
            version: state.version,
            current: state.current.clone(),
            history: state.history.to_vec(),
        })
    }

    /// 히스토리 길이
    pub fn len(&self, test_id: &str) -> usize {
        self.tests
            .read()
            .get(test_id)
            .map_or(0, |state| state.history.len())
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tps_of(agg: &MetricsAggregator, id: &str) -> Vec<f64> {
        agg.history(id).iter().map(|s| s.tps).collect()
    }

    #[test]
    fn ingest_requires_registration() {
        let agg = MetricsAggregator::new(10);
        assert!(!agg.ingest("T1", MetricSample::new(1, 1.0)));
        assert!(agg.current("T1").is_none());

        agg.register("T1");
        assert!(agg.ingest("T1", MetricSample::new(1, 1.0)));
        assert_eq!(agg.current("T1").map(|s| s.tps), Some(1.0));
        assert_eq!(agg.version("T1"), Some(1));
    }

    #[test]
    fn capacity_three_keeps_last_three() {
        let agg = MetricsAggregator::new(3);
        agg.register("T1");
        for i in 1..=5 {
            agg.ingest("T1", MetricSample::new(i, i as f64));
        }
        assert_eq!(tps_of(&agg, "T1"), vec![3.0, 4.0, 5.0]);
        assert_eq!(agg.current("T1").map(|s| s.tps), Some(5.0));
    }

    #[test]
    fn seed_then_live_sample() {
        let agg = MetricsAggregator::new(300);
        agg.register("T1");
        agg.seed(
            "T1",
            vec![
                MetricSample::new(0, 10.0),
                MetricSample::new(1, 12.0),
                MetricSample::new(2, 9.0),
            ],
        );
        assert_eq!(agg.current("T1").map(|s| s.tps), Some(9.0));

        agg.ingest("T1", MetricSample::new(3, 15.0));
        assert_eq!(agg.current("T1").map(|s| s.tps), Some(15.0));
        assert_eq!(agg.len("T1"), 4);
    }

    #[test]
    fn seed_is_idempotent() {
        let agg = MetricsAggregator::new(300);
        agg.register("T1");
        let input = vec![MetricSample::new(5, 1.0), MetricSample::new(3, 2.0)];

        agg.seed("T1", input.clone());
        let first: Vec<MetricSample> = agg.history("T1").iter().map(|s| (**s).clone()).collect();
        agg.seed("T1", input);
        let second: Vec<MetricSample> = agg.history("T1").iter().map(|s| (**s).clone()).collect();

        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].timestamp, 3);
    }

    #[test]
    fn seed_keeps_live_samples_on_conflict() {
        let agg = MetricsAggregator::new(300);
        agg.register("T1");
        agg.ingest("T1", MetricSample::new(10, 99.0));
        agg.seed("T1", vec![MetricSample::new(5, 1.0), MetricSample::new(10, 2.0)]);

        assert_eq!(tps_of(&agg, "T1"), vec![1.0, 99.0]);
        assert_eq!(agg.current("T1").map(|s| s.tps), Some(99.0));
    }

    #[test]
    fn seed_truncates_to_capacity() {
        let agg = MetricsAggregator::new(3);
        agg.register("T1");
        let samples = (0..10).map(|i| MetricSample::new(i, i as f64)).collect();
        agg.seed("T1", samples);
        assert_eq!(tps_of(&agg, "T1"), vec![7.0, 8.0, 9.0]);
    }

    #[test]
    fn untimestamped_seed_entries_are_all_kept() {
        use loadpulse_core::models::metrics::{seed_samples, MetricPayload};

        let agg = MetricsAggregator::new(300);
        agg.register("T1");
        let payloads: Vec<MetricPayload> =
            serde_json::from_str(r#"[{"tps": 1.0}, {"tps": 2.0}, {"tps": 3.0}]"#).unwrap();
        agg.seed("T1", seed_samples(payloads, 5_000));

        assert_eq!(tps_of(&agg, "T1"), vec![1.0, 2.0, 3.0]);
        assert_eq!(agg.current("T1").map(|s| s.tps), Some(3.0));
    }

    #[test]
    fn snapshot_is_consistent_under_concurrent_ingest() {
        let agg = Arc::new(MetricsAggregator::new(1_000));
        agg.register("T1");

        let writer = {
            let agg = agg.clone();
            std::thread::spawn(move || {
                for i in 1..=500 {
                    agg.ingest("T1", MetricSample::new(i, i as f64));
                }
            })
        };

        for _ in 0..500 {
            let snap = agg.snapshot("T1").unwrap();
            assert_eq!(snap.history.len() as u64, snap.version);
            assert_eq!(
                snap.current.as_ref().map(|s| s.timestamp),
                snap.history.last().map(|s| s.timestamp)
            );
        }
        writer.join().unwrap();

        let snap = agg.snapshot("T1").unwrap();
        assert_eq!(snap.version, 500);
        assert!(agg.snapshot("T2").is_none());
    }

    #[test]
    fn query_window() {
        let agg = MetricsAggregator::new(300);
        agg.register("T1");
        let now = 10 * 60_000;
        for minute in 0..=10 {
            agg.ingest("T1", MetricSample::new(minute * 60_000, minute as f64));
        }
        let recent = agg.query_at("T1", 5, now);
        let minutes: Vec<f64> = recent.iter().map(|s| s.tps).collect();
        assert_eq!(minutes, vec![6.0, 7.0, 8.0, 9.0, 10.0]);
        assert!(agg.query_at("T2", 5, now).is_empty());
    }

    #[test]
    fn clear_removes_state() {
        let agg = MetricsAggregator::new(10);
        agg.register("T1");
        agg.ingest("T1", MetricSample::new(1, 1.0));
        assert!(agg.clear("T1"));
        assert!(!agg.ingest("T1", MetricSample::new(2, 2.0)));
        assert!(agg.history("T1").is_empty());
        assert!(!agg.clear("T1"));
    }
}
