//! REST 시드 클라이언트.
//!
//! `SeedApi` 포트 구현. 모니터링 시작 시 메트릭 히스토리, 현재 상태, 최근 로그를
//! 한 번 조회한다. 서버 응답의 `{"success": .., "data": ..}` 래퍼를 벗긴다.

use async_trait::async_trait;
use loadpulse_core::config::ServerConfig;
use loadpulse_core::error::CoreError;
use loadpulse_core::models::log::LogPayload;
use loadpulse_core::models::metrics::MetricPayload;
use loadpulse_core::models::status::StatusUpdate;
use loadpulse_core::ports::seed::SeedApi;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// 기본 재시도 횟수
const DEFAULT_MAX_RETRIES: u32 = 2;

/// 재시도 가능한 에러인지 판별
fn is_retryable(error: &CoreError) -> bool {
    matches!(
        error,
        CoreError::Network(_) | CoreError::ServiceUnavailable(_) | CoreError::RateLimit { .. }
    )
}

/// 대시보드 REST API 클라이언트: `SeedApi` 포트 구현
pub struct HttpSeedClient {
    client: reqwest::Client,
    base_url: Url,
    max_retries: u32,
    retry_delay: Duration,
}

impl HttpSeedClient {
    /// 새 시드 클라이언트 생성
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, CoreError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CoreError::Network(format!("HTTP 클라이언트 빌드 실패: {}", e)))?;

        let base_url = Url::parse(base_url)
            .map_err(|e| CoreError::Config(format!("잘못된 REST URL '{base_url}': {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(CoreError::Config(format!("경로를 붙일 수 없는 REST URL: {base_url}")));
        }

        Ok(Self {
            client,
            base_url,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: Duration::from_secs(1),
        })
    }

    pub fn from_config(config: &ServerConfig) -> Result<Self, CoreError> {
        Self::new(
            &config.base_url,
            Duration::from_millis(config.request_timeout_ms),
        )
    }

    /// 재시도 횟수 설정
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// 첫 재시도 대기 시간 설정 (이후 2배씩 증가)
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// 응답 상태 코드 확인 및 에러 매핑
    async fn check_response(
        &self,
        resp: reqwest::Response,
    ) -> Result<reqwest::Response, CoreError> {
        let status = resp.status();

        if status.is_success() {
            return Ok(resp);
        }

        let retry_after = resp
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        let text = resp.text().await.unwrap_or_else(|e| {
            warn!("응답 본문 읽기 실패: {e}");
            String::new()
        });

        match status.as_u16() {
            404 => Err(CoreError::NotFound {
                resource_type: "API".to_string(),
                id: text,
            }),
            429 => Err(CoreError::RateLimit {
                retry_after_secs: retry_after.unwrap_or(60),
            }),
            502..=504 => Err(CoreError::ServiceUnavailable(text)),
            _ => Err(CoreError::Internal(format!("API 에러 ({status}): {text}"))),
        }
    }

    /// 재시도가 포함된 요청 실행
    ///
    /// exponential backoff: 1s → 2s → 4s (상한 30s)
    async fn execute_with_retry<F, Fut, T>(&self, operation: F) -> Result<T, CoreError>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T, CoreError>>,
    {
        let mut delay = self.retry_delay;
        let mut attempt = 0;

        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    if !is_retryable(&e) || attempt >= self.max_retries {
                        return Err(e);
                    }
                    attempt += 1;

                    warn!(
                        "요청 실패 (시도 {}/{}): {e}, {delay:?} 후 재시도",
                        attempt,
                        self.max_retries + 1
                    );

                    // RateLimit의 경우 서버 지정 대기 시간 사용
                    if let CoreError::RateLimit { retry_after_secs } = &e {
                        delay = Duration::from_secs(*retry_after_secs);
                    }

                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(Duration::from_secs(30));
                }
            }
        }
    }

    /// `{base}/tests/{test_id}/{resource}` URL. 테스트 ID는 경로 세그먼트 하나로 인코딩된다.
    fn test_url(&self, test_id: &str, resource: &str, query: Option<(&str, usize)>) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push("tests").push(test_id).push(resource);
        }
        if let Some((key, value)) = query {
            url.query_pairs_mut().append_pair(key, &value.to_string());
        }
        url
    }

    /// GET 요청 후 래퍼를 벗긴 `data`를 역직렬화
    async fn get_data<T: DeserializeOwned>(&self, url: Url) -> Result<T, CoreError> {
        debug!("시드 요청: GET {url}");

        let value: serde_json::Value = self
            .execute_with_retry(|| async {
                let resp = self
                    .client
                    .get(url.clone())
                    .send()
                    .await
                    .map_err(|e| CoreError::Network(format!("요청 실패: {e}")))?;

                let resp = self.check_response(resp).await?;
                resp.json()
                    .await
                    .map_err(|e| CoreError::Internal(format!("응답 파싱 실패: {e}")))
            })
            .await?;

        let data = unwrap_envelope(value)?;
        serde_json::from_value(data).map_err(CoreError::from)
    }
}

/// `{"success": bool, "data": ...}` 래퍼 제거. 래퍼가 없으면 그대로 반환.
fn unwrap_envelope(value: serde_json::Value) -> Result<serde_json::Value, CoreError> {
    let mut map = match value {
        serde_json::Value::Object(map) => map,
        other => return Ok(other),
    };
    if !map.contains_key("success") {
        return Ok(serde_json::Value::Object(map));
    }

    let success = map
        .get("success")
        .and_then(serde_json::Value::as_bool)
        .unwrap_or(false);
    if !success {
        let message = map
            .get("message")
            .and_then(serde_json::Value::as_str)
            .unwrap_or("success=false")
            .to_string();
        return Err(CoreError::SeedFailed(message));
    }
    Ok(map.remove("data").unwrap_or(serde_json::Value::Null))
}

fn seed_error(what: &str, test_id: &str, error: CoreError) -> CoreError {
    match error {
        CoreError::SeedFailed(_) => error,
        other => CoreError::SeedFailed(format!("{what} 조회 실패 (test_id={test_id}): {other}")),
    }
}

#[async_trait]
impl SeedApi for HttpSeedClient {
    async fn metrics_history(
        &self,
        test_id: &str,
        max_points: usize,
    ) -> Result<Vec<MetricPayload>, CoreError> {
        let url = self.test_url(test_id, "metrics", Some(("maxPoints", max_points)));
        let data: Option<Vec<MetricPayload>> = self
            .get_data(url)
            .await
            .map_err(|e| seed_error("메트릭 히스토리", test_id, e))?;
        let data = data.unwrap_or_default();
        debug!("메트릭 히스토리 수신: test_id={test_id}, {}건", data.len());
        Ok(data)
    }

    async fn test_status(&self, test_id: &str) -> Result<Option<StatusUpdate>, CoreError> {
        let url = self.test_url(test_id, "result", None);
        match self.get_data::<Option<StatusUpdate>>(url).await {
            Ok(status) => Ok(status),
            Err(CoreError::NotFound { .. }) => {
                debug!("테스트 결과 없음: test_id={test_id}");
                Ok(None)
            }
            Err(e) => Err(seed_error("테스트 상태", test_id, e)),
        }
    }

    async fn recent_logs(&self, test_id: &str, count: usize) -> Result<Vec<LogPayload>, CoreError> {
        let url = self.test_url(test_id, "logs", Some(("count", count)));
        let data: Option<Vec<LogPayload>> = self
            .get_data(url)
            .await
            .map_err(|e| seed_error("최근 로그", test_id, e))?;
        Ok(data.unwrap_or_default())
    }
}
