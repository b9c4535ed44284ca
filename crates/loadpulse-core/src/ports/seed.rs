//! 초기 데이터(REST 시드) 포트.
//!
//! 구현: `loadpulse-network::http_client::HttpSeedClient`

use async_trait::async_trait;

use crate::error::CoreError;
use crate::models::log::LogPayload;
use crate::models::metrics::MetricPayload;
use crate::models::status::StatusUpdate;

/// 모니터링 시작 시 한 번 호출되는 조회 API
#[async_trait]
pub trait SeedApi: Send + Sync {
    /// 메트릭 히스토리 (`GET /tests/{testId}/metrics?maxPoints=N`)
    async fn metrics_history(
        &self,
        test_id: &str,
        max_points: usize,
    ) -> Result<Vec<MetricPayload>, CoreError>;

    /// 현재 상태 (`GET /tests/{testId}/result`). 결과가 없으면 `None`.
    async fn test_status(&self, test_id: &str) -> Result<Option<StatusUpdate>, CoreError>;

    /// 최근 로그, 최신순 (`GET /tests/{testId}/logs?count=N`)
    async fn recent_logs(&self, test_id: &str, count: usize) -> Result<Vec<LogPayload>, CoreError>;
}
