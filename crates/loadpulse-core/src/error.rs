//! LOADPULSE 핵심 에러 타입.
//!
//! 모든 어댑터 crate는 이 타입을 그대로 반환하거나 `#[from] CoreError`로 래핑한다.

use thiserror::Error;

/// 코어 레이어 에러.
/// 전송 계층, 구독, 시드 조회, 설정, 유효성 검증 등 공통 에러를 정의한다.
#[derive(Debug, Error)]
pub enum CoreError {
    /// JSON 직렬화/역직렬화 실패
    #[error("직렬화 에러: {0}")]
    Serialization(#[from] serde_json::Error),

    /// 설정값 오류
    #[error("설정 에러: {0}")]
    Config(String),

    /// 필드 유효성 검증 실패
    #[error("유효성 검증 실패: {field}: {message}")]
    Validation {
        /// 검증 실패한 필드명
        field: String,
        /// 실패 사유
        message: String,
    },

    /// 리소스를 찾을 수 없음
    #[error("{resource_type} 미발견: {id}")]
    NotFound {
        /// 리소스 종류 (예: "TestResult")
        resource_type: String,
        /// 리소스 식별자
        id: String,
    },

    /// 내부 에러 (예상치 못한 상황)
    #[error("내부 에러: {0}")]
    Internal(String),

    /// 네트워크 에러 (HTTP 요청 실패, 타임아웃)
    #[error("네트워크 에러: {0}")]
    Network(String),

    /// Rate Limit 초과 (429)
    #[error("요청 한도 초과, {retry_after_secs}초 후 재시도")]
    RateLimit {
        /// 재시도 대기 시간 (초)
        retry_after_secs: u64,
    },

    /// 서비스 일시 불가 (503)
    #[error("서비스 일시 불가: {0}")]
    ServiceUnavailable(String),

    /// 푸시 채널 연결 실패 (핸드셰이크 실패, 타임아웃, 연결 유실)
    #[error("전송 계층 사용 불가: {0}")]
    TransportUnavailable(String),

    /// 연결되지 않은 상태에서 구독/발행 시도
    #[error("푸시 채널 미연결")]
    NotConnected,

    /// 토픽 구독 거부
    #[error("구독 실패: {topic}: {reason}")]
    SubscribeFailed {
        /// 구독 대상 토픽
        topic: String,
        /// 실패 사유
        reason: String,
    },

    /// 수신 프레임 파싱 실패
    #[error("잘못된 페이로드: {topic}: {reason}")]
    MalformedPayload {
        /// 프레임이 도착한 토픽
        topic: String,
        /// 파싱 실패 사유
        reason: String,
    },

    /// REST 시드 조회 실패
    #[error("초기 데이터 조회 실패: {0}")]
    SeedFailed(String),

    /// 재연결 시도 소진: 사용자가 명시적으로 재시작해야 함
    #[error("재연결 시도 {attempts}회 소진")]
    ReconnectExhausted {
        /// 수행한 재연결 시도 횟수
        attempts: u32,
    },

    /// 연결 대기 타임아웃
    #[error("연결 대기 타임아웃: {timeout_ms}ms 초과")]
    ConnectionTimeout {
        /// 초과된 대기 시간 (밀리초)
        timeout_ms: u64,
    },

    /// I/O 에러
    #[error("I/O 에러: {0}")]
    Io(#[from] std::io::Error),
}

impl CoreError {
    /// 재시도로 회복 가능한 에러인지 여부
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            CoreError::Network(_)
                | CoreError::ServiceUnavailable(_)
                | CoreError::RateLimit { .. }
                | CoreError::TransportUnavailable(_)
                | CoreError::NotConnected
                | CoreError::SubscribeFailed { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(CoreError::NotConnected.is_transient());
        assert!(CoreError::TransportUnavailable("x".into()).is_transient());
        assert!(!CoreError::ReconnectExhausted { attempts: 3 }.is_transient());
        assert!(!CoreError::ConnectionTimeout { timeout_ms: 10 }.is_transient());
    }

    #[test]
    fn display_includes_context() {
        let err = CoreError::SubscribeFailed {
            topic: "/topic/metrics/T1".to_string(),
            reason: "거부됨".to_string(),
        };
        assert!(err.to_string().contains("/topic/metrics/T1"));

        let err = CoreError::ReconnectExhausted { attempts: 10 };
        assert!(err.to_string().contains("10"));
    }
}
