//! LOADPULSE 도메인 모델.
//!
//! 서버가 푸시/REST로 보내는 메트릭, 상태, 로그 데이터 구조체를 정의한다.
//! 와이어 페이로드는 모든 필드가 nullable인 서버 DTO를 그대로 따르며,
//! 내부 모델로 변환할 때 기본값을 채운다.

pub mod log;
pub mod metrics;
pub mod status;
pub mod topic;

/// 현재 시각 (Unix epoch 밀리초)
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
