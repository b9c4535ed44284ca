//! 테스트 상태 모델.
//!
//! `/topic/status/{testId}` 푸시와 `GET /tests/{testId}/result` 응답을 부분 병합한다.

use serde::{Deserialize, Serialize};

/// 테스트 실행 상태
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TestStatus {
    /// 실행 중
    Running,
    /// 정상 완료
    Completed,
    /// 실패
    Failed,
    /// 취소됨
    Cancelled,
    /// 중지됨
    Stopped,
    /// 알 수 없음 (서버의 NOT_FOUND, PARSE_ERROR 등 포함)
    #[default]
    #[serde(other)]
    Unknown,
}

impl TestStatus {
    /// 종료 상태 여부: 유예 시간 후 자동 구독 해제 대상
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TestStatus::Completed | TestStatus::Failed | TestStatus::Cancelled | TestStatus::Stopped
        )
    }
}

impl std::fmt::Display for TestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TestStatus::Unknown => "UNKNOWN",
            TestStatus::Running => "RUNNING",
            TestStatus::Completed => "COMPLETED",
            TestStatus::Failed => "FAILED",
            TestStatus::Cancelled => "CANCELLED",
            TestStatus::Stopped => "STOPPED",
        };
        f.write_str(s)
    }
}

/// 서버가 보내는 상태 페이로드 (부분 업데이트)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdate {
    #[serde(default)]
    pub test_id: Option<String>,
    #[serde(default)]
    pub status: Option<TestStatus>,
    #[serde(default)]
    pub message: Option<String>,
    /// 진행률 (%)
    #[serde(default)]
    pub progress: Option<f64>,
    /// 시작 시각: 서버 설정에 따라 문자열 또는 배열로 직렬화됨
    #[serde(default)]
    pub start_time: Option<serde_json::Value>,
    #[serde(default)]
    pub end_time: Option<serde_json::Value>,
    /// 메시지 생성 시각 (epoch 밀리초)
    #[serde(default)]
    pub timestamp: Option<i64>,
}

/// 테스트 상태 스냅샷
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusState {
    pub status: TestStatus,
    pub message: Option<String>,
    /// 진행률 (0 ~ 100)
    pub progress: f64,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    /// 마지막 상태 메시지 시각 (epoch 밀리초)
    pub updated_at: Option<i64>,
}

impl Default for StatusState {
    fn default() -> Self {
        Self {
            status: TestStatus::Unknown,
            message: None,
            progress: 0.0,
            start_time: None,
            end_time: None,
            updated_at: None,
        }
    }
}

impl StatusState {
    /// 페이로드에 존재하는 필드만 덮어쓴다.
    pub fn apply(&mut self, update: StatusUpdate) {
        if let Some(status) = update.status {
            self.status = status;
        }
        if let Some(message) = update.message {
            self.message = Some(message);
        }
        if let Some(progress) = update.progress {
            self.progress = progress.clamp(0.0, 100.0);
        }
        if let Some(start) = update.start_time.and_then(time_text) {
            self.start_time = Some(start);
        }
        if let Some(end) = update.end_time.and_then(time_text) {
            self.end_time = Some(end);
        }
        if let Some(ts) = update.timestamp {
            self.updated_at = Some(ts);
        }
    }
}

fn time_text(value: serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}
