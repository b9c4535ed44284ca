//! 메트릭 샘플 모델.
//!
//! `/topic/metrics/{testId}` 푸시와 `GET /tests/{testId}/metrics` 응답이 공유하는 형식.

use serde::{Deserialize, Serialize};

/// 서버가 보내는 메트릭 페이로드 (모든 필드 nullable)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricPayload {
    /// 테스트 ID
    #[serde(default)]
    pub test_id: Option<String>,
    /// 측정 시각 (epoch 밀리초)
    #[serde(default)]
    pub timestamp: Option<i64>,
    /// 현재 활성 사용자 수
    #[serde(default)]
    pub active_users: Option<u32>,
    /// 초당 트랜잭션 수
    #[serde(default)]
    pub tps: Option<f64>,
    /// 평균 응답시간 (ms)
    #[serde(default)]
    pub avg_response_time: Option<f64>,
    /// 최소 응답시간 (ms)
    #[serde(default)]
    pub min_response_time: Option<f64>,
    /// 최대 응답시간 (ms)
    #[serde(default)]
    pub max_response_time: Option<f64>,
    /// P95 응답시간 (ms)
    #[serde(default)]
    pub p95_response_time: Option<f64>,
    /// P99 응답시간 (ms)
    #[serde(default)]
    pub p99_response_time: Option<f64>,
    /// 성공 요청 수
    #[serde(default)]
    pub success_count: Option<u64>,
    /// 에러 요청 수
    #[serde(default)]
    pub error_count: Option<u64>,
    /// 구버전 서버의 에러 수 필드
    #[serde(default)]
    pub errors: Option<u64>,
    /// 서버가 계산한 에러율: 사용하지 않음, `MetricSample::error_rate` 참조
    #[serde(default)]
    pub error_rate: Option<f64>,
    /// 테스트 진행률 (%)
    #[serde(default)]
    pub progress: Option<f64>,
    /// 총 요청 수
    #[serde(default)]
    pub total_requests: Option<u64>,
    /// 구버전 서버의 총 요청 수 필드
    #[serde(default)]
    pub requests: Option<u64>,
}

impl MetricPayload {
    /// 내부 샘플로 변환
    ///
    /// `timestamp`가 없으면 `received_at`을 사용한다.
    /// 총 요청 수는 `totalRequests` → `requests` → `successCount + errorCount` 순으로 결정.
    pub fn into_sample(self, received_at: i64) -> MetricSample {
        let error_count = self.error_count.or(self.errors).unwrap_or(0);
        let total_requests = self
            .total_requests
            .or(self.requests)
            .unwrap_or_else(|| self.success_count.unwrap_or(0).saturating_add(error_count));

        MetricSample {
            timestamp: self.timestamp.unwrap_or(received_at),
            tps: self.tps.unwrap_or(0.0),
            avg_response_time: self.avg_response_time.unwrap_or(0.0),
            p95_response_time: self.p95_response_time.unwrap_or(0.0),
            active_users: self.active_users.unwrap_or(0),
            error_count,
            total_requests,
            min_response_time: self.min_response_time,
            max_response_time: self.max_response_time,
            p99_response_time: self.p99_response_time,
            success_count: self.success_count,
            progress: self.progress,
        }
    }
}

/// 히스토리 응답을 샘플 목록으로 변환
///
/// `timestamp`가 없는 항목은 목록 순서를 유지하도록 `received_at`에서 1ms씩 앞당긴 시각을 받는다.
/// 모두 같은 시각을 받으면 병합 시 하나만 남는다.
pub fn seed_samples(payloads: Vec<MetricPayload>, received_at: i64) -> Vec<MetricSample> {
    let last = payloads.len().saturating_sub(1);
    payloads
        .into_iter()
        .enumerate()
        .map(|(i, payload)| {
            let offset = i64::try_from(last - i).unwrap_or(i64::MAX);
            payload.into_sample(received_at.saturating_sub(offset))
        })
        .collect()
}

/// 단일 시점 메트릭 샘플
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricSample {
    /// 측정 시각 (epoch 밀리초)
    pub timestamp: i64,
    /// 초당 트랜잭션 수
    pub tps: f64,
    /// 평균 응답시간 (ms)
    pub avg_response_time: f64,
    /// P95 응답시간 (ms)
    pub p95_response_time: f64,
    /// 활성 가상 사용자 수
    pub active_users: u32,
    /// 에러 요청 수
    pub error_count: u64,
    /// 총 요청 수
    pub total_requests: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_response_time: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_response_time: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub p99_response_time: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
}

impl MetricSample {
    /// 필수 필드만으로 샘플 생성 (나머지는 0)
    pub fn new(timestamp: i64, tps: f64) -> Self {
        Self {
            timestamp,
            tps,
            avg_response_time: 0.0,
            p95_response_time: 0.0,
            active_users: 0,
            error_count: 0,
            total_requests: 0,
            min_response_time: None,
            max_response_time: None,
            p99_response_time: None,
            success_count: None,
            progress: None,
        }
    }

    /// 에러율 (0.0 ~ 1.0)
    ///
    /// 항상 `error_count / total_requests`로 재계산한다. 요청이 없으면 0.
    pub fn error_rate(&self) -> f64 {
        if self.total_requests == 0 {
            return 0.0;
        }
        self.error_count as f64 / self.total_requests as f64
    }
}
