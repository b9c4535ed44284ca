//! 메트릭 히스토리 링 버퍼.
//!
//! 타임스탬프 오름차순을 유지하는 고정 용량 버퍼. 가득 차면 가장 오래된 샘플을 버린다.

use loadpulse_core::models::metrics::MetricSample;
use std::collections::VecDeque;
use std::sync::Arc;

/// 메트릭 히스토리 (FIFO, 최대 크기 제한)
#[derive(Debug, Clone)]
pub struct MetricHistory {
    samples: VecDeque<Arc<MetricSample>>,
    capacity: usize,
}

impl MetricHistory {
    /// 새 히스토리 생성
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity.min(1024)),
            capacity: capacity.max(1),
        }
    }

    /// 샘플 추가
    ///
    /// 순서대로 도착한 샘플은 O(1). 늦게 도착한 샘플은 정렬 위치에 끼워 넣는다.
    pub fn push(&mut self, sample: Arc<MetricSample>) {
        let in_order = self
            .samples
            .back()
            .map_or(true, |last| last.timestamp <= sample.timestamp);

        if in_order {
            self.samples.push_back(sample);
        } else {
            let idx = self
                .samples
                .partition_point(|s| s.timestamp <= sample.timestamp);
            self.samples.insert(idx, sample);
        }

        while self.samples.len() > self.capacity {
            self.samples.pop_front();
        }
    }

    /// 전체 교체 (오름차순으로 정렬된 입력, 용량 초과분은 오래된 쪽부터 제거)
    pub fn replace(&mut self, samples: Vec<Arc<MetricSample>>) {
        let skip = samples.len().saturating_sub(self.capacity);
        self.samples = samples.into_iter().skip(skip).collect();
    }

    /// `cutoff`보다 새로운 샘플
    pub fn since(&self, cutoff: i64) -> Vec<Arc<MetricSample>> {
        let start = self.samples.partition_point(|s| s.timestamp <= cutoff);
        self.samples.range(start..).cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<MetricSample>> {
        self.samples.iter()
    }

    pub fn to_vec(&self) -> Vec<Arc<MetricSample>> {
        self.samples.iter().cloned().collect()
    }

    pub fn latest(&self) -> Option<&Arc<MetricSample>> {
        self.samples.back()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(ts: i64, tps: f64) -> Arc<MetricSample> {
        Arc::new(MetricSample::new(ts, tps))
    }

    fn tps(history: &MetricHistory) -> Vec<f64> {
        history.iter().map(|s| s.tps).collect()
    }

    #[test]
    fn evicts_oldest_when_full() {
        let mut history = MetricHistory::new(3);
        for i in 1..=5 {
            history.push(sample(i, i as f64));
        }
        assert_eq!(tps(&history), vec![3.0, 4.0, 5.0]);
        assert_eq!(history.len(), 3);
    }

    #[test]
    fn stays_sorted_and_bounded() {
        let mut history = MetricHistory::new(50);
        for i in 0..500 {
            history.push(sample(i * 1000, 1.0));
            assert!(history.len() <= 50);
        }
        let timestamps: Vec<i64> = history.iter().map(|s| s.timestamp).collect();
        assert!(timestamps.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(timestamps.first(), Some(&450_000));
    }

    #[test]
    fn late_sample_is_inserted_in_order() {
        let mut history = MetricHistory::new(10);
        history.push(sample(10, 1.0));
        history.push(sample(30, 3.0));
        history.push(sample(20, 2.0));
        assert_eq!(tps(&history), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn since_excludes_cutoff() {
        let mut history = MetricHistory::new(10);
        for ts in [100, 200, 300, 400] {
            history.push(sample(ts, ts as f64));
        }
        let recent: Vec<i64> = history.since(200).iter().map(|s| s.timestamp).collect();
        assert_eq!(recent, vec![300, 400]);
        assert!(history.since(400).is_empty());
    }

    #[test]
    fn replace_keeps_newest() {
        let mut history = MetricHistory::new(2);
        history.replace(vec![sample(1, 1.0), sample(2, 2.0), sample(3, 3.0)]);
        assert_eq!(tps(&history), vec![2.0, 3.0]);
        assert_eq!(history.latest().map(|s| s.timestamp), Some(3));
    }
}
