//! 테스트 로그 모델.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// 로그 ID 시퀀스: 같은 밀리초에 들어온 로그도 구분된다
static NEXT_LOG_ID: AtomicU64 = AtomicU64::new(1);

/// 서버가 보내는 로그 페이로드
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogPayload {
    #[serde(default)]
    pub test_id: Option<String>,
    #[serde(default)]
    pub level: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub timestamp: Option<i64>,
}

impl LogPayload {
    /// 고유 ID를 부여해 로그 항목으로 변환
    pub fn into_entry(self, received_at: i64) -> LogEntry {
        LogEntry {
            id: NEXT_LOG_ID.fetch_add(1, Ordering::Relaxed),
            level: self.level.unwrap_or_else(|| "INFO".to_string()),
            message: self.message.unwrap_or_default(),
            timestamp: self.timestamp.unwrap_or(received_at),
        }
    }
}

/// 로그 항목
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// 프로세스 내 단조 증가 ID
    pub id: u64,
    pub level: String,
    pub message: String,
    /// epoch 밀리초
    pub timestamp: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique_within_same_millisecond() {
        let a = LogPayload {
            message: Some("a".into()),
            timestamp: Some(1),
            ..Default::default()
        }
        .into_entry(0);
        let b = LogPayload {
            message: Some("b".into()),
            timestamp: Some(1),
            ..Default::default()
        }
        .into_entry(0);
        assert!(b.id > a.id);
        assert_eq!(a.timestamp, b.timestamp);
    }

    #[test]
    fn defaults_for_missing_fields() {
        let entry = serde_json::from_str::<LogPayload>("{}")
            .unwrap()
            .into_entry(42);
        assert_eq!(entry.level, "INFO");
        assert_eq!(entry.message, "");
        assert_eq!(entry.timestamp, 42);
    }
}
