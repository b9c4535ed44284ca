//! 애플리케이션 설정 구조체.
//!
//! 서버 URL, 푸시 채널(하트비트/재연결) 정책, 모니터링 버퍼 크기와 타이머 등
//! 런타임 설정을 정의한다. `ConfigManager`가 JSON 파일 + 환경변수에서 로드.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::CoreError;

/// 최상위 애플리케이션 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// 서버 연결 설정
    #[serde(default)]
    pub server: ServerConfig,
    /// 푸시 채널 설정
    #[serde(default)]
    pub transport: TransportConfig,
    /// 모니터링 설정
    #[serde(default)]
    pub monitor: MonitorConfig,
}

// ============================================================
// 서버 설정
// ============================================================

/// 서버 설정: REST 시드 API와 STOMP 엔드포인트
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// REST API 기본 URL
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// STOMP over WebSocket 엔드포인트
    #[serde(default = "default_ws_url")]
    pub ws_url: String,
    /// REST 요청 타임아웃 (ms)
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            ws_url: default_ws_url(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

// ============================================================
// 푸시 채널 설정
// ============================================================

/// 푸시 채널 설정: 핸드셰이크, 하트비트, 재연결 정책
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// ping 메시지에 실리는 클라이언트 ID (비어 있으면 실행 시 생성)
    #[serde(default)]
    pub client_id: String,
    /// 핸드셰이크 타임아웃 (ms)
    #[serde(default = "default_handshake_timeout_ms")]
    pub handshake_timeout_ms: u64,
    /// STOMP heart-beat 협상 값 (ms, 송수신 공통)
    #[serde(default = "default_stomp_heartbeat_ms")]
    pub stomp_heartbeat_ms: u64,
    /// `/app/ping` 발송 및 생존 확인 주기 (ms)
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
    /// 이 횟수의 주기 동안 수신이 없으면 연결 실패로 간주
    #[serde(default = "default_max_missed_heartbeats")]
    pub max_missed_heartbeats: u32,
    /// 재연결 기본 지연 (ms): 시도 횟수만큼 곱해진다
    #[serde(default = "default_reconnect_base_delay_ms")]
    pub reconnect_base_delay_ms: u64,
    /// 재연결 최대 지연 (ms)
    #[serde(default = "default_reconnect_max_delay_ms")]
    pub reconnect_max_delay_ms: u64,
    /// 첫 실패 이후 최대 재연결 시도 횟수
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
    /// 수신 이벤트 채널 버퍼 크기
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            handshake_timeout_ms: default_handshake_timeout_ms(),
            stomp_heartbeat_ms: default_stomp_heartbeat_ms(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            max_missed_heartbeats: default_max_missed_heartbeats(),
            reconnect_base_delay_ms: default_reconnect_base_delay_ms(),
            reconnect_max_delay_ms: default_reconnect_max_delay_ms(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            event_buffer: default_event_buffer(),
        }
    }
}

impl TransportConfig {
    /// 핸드셰이크 타임아웃
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    /// 하트비트 주기
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// 재연결 기본 지연
    pub fn reconnect_base_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_base_delay_ms)
    }

    /// 재연결 최대 지연
    pub fn reconnect_max_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_max_delay_ms)
    }
}

// ============================================================
// 모니터링 설정
// ============================================================

/// 모니터링 설정: 버퍼 크기, 시드 범위, 타이머
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// 테스트별 메트릭 히스토리 용량 (1Hz 기준 5분)
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
    /// 테스트별 로그 보관 개수
    #[serde(default = "default_log_capacity")]
    pub log_capacity: usize,
    /// 시드로 가져올 메트릭 포인트 수
    #[serde(default = "default_seed_max_points")]
    pub seed_max_points: usize,
    /// 시드로 가져올 로그 수
    #[serde(default = "default_seed_log_count")]
    pub seed_log_count: usize,
    /// 종료 상태 수신 후 자동 구독 해제까지 유예 (ms)
    #[serde(default = "default_terminal_grace_ms")]
    pub terminal_grace_ms: u64,
    /// 연결 상태 점검 주기 (ms)
    #[serde(default = "default_health_check_interval_ms")]
    pub health_check_interval_ms: u64,
    /// 모니터링 시작 시 연결 대기 한도 (ms)
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// 토픽 구독 재시도 횟수
    #[serde(default = "default_subscribe_retry_attempts")]
    pub subscribe_retry_attempts: u32,
    /// 토픽 구독 재시도 간격 (ms)
    #[serde(default = "default_subscribe_retry_delay_ms")]
    pub subscribe_retry_delay_ms: u64,
    /// 히스토리 조회 기본 윈도우 (분)
    #[serde(default = "default_window_minutes")]
    pub default_window_minutes: u32,
    /// 이벤트 버스 용량
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            history_capacity: default_history_capacity(),
            log_capacity: default_log_capacity(),
            seed_max_points: default_seed_max_points(),
            seed_log_count: default_seed_log_count(),
            terminal_grace_ms: default_terminal_grace_ms(),
            health_check_interval_ms: default_health_check_interval_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            subscribe_retry_attempts: default_subscribe_retry_attempts(),
            subscribe_retry_delay_ms: default_subscribe_retry_delay_ms(),
            default_window_minutes: default_window_minutes(),
            event_capacity: default_event_capacity(),
        }
    }
}

impl MonitorConfig {
    /// 종료 상태 유예 시간
    pub fn terminal_grace(&self) -> Duration {
        Duration::from_millis(self.terminal_grace_ms)
    }

    /// 연결 점검 주기
    pub fn health_check_interval(&self) -> Duration {
        Duration::from_millis(self.health_check_interval_ms)
    }

    /// 연결 대기 한도
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// 구독 재시도 간격
    pub fn subscribe_retry_delay(&self) -> Duration {
        Duration::from_millis(self.subscribe_retry_delay_ms)
    }
}

// ============================================================
// AppConfig impl
// ============================================================

impl AppConfig {
    /// 기본 설정
    pub fn default_config() -> Self {
        Self::default()
    }

    /// REST 요청 타임아웃
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.server.request_timeout_ms)
    }

    /// 설정값 검증
    pub fn validate(&self) -> Result<(), CoreError> {
        check_url("server.base_url", &self.server.base_url, &["http", "https"])?;
        check_url("server.ws_url", &self.server.ws_url, &["ws", "wss"])?;

        let positives: [(&str, u64); 11] = [
            ("server.request_timeout_ms", self.server.request_timeout_ms),
            ("transport.handshake_timeout_ms", self.transport.handshake_timeout_ms),
            ("transport.heartbeat_interval_ms", self.transport.heartbeat_interval_ms),
            ("transport.max_missed_heartbeats", self.transport.max_missed_heartbeats.into()),
            ("transport.event_buffer", self.transport.event_buffer as u64),
            ("monitor.history_capacity", self.monitor.history_capacity as u64),
            ("monitor.log_capacity", self.monitor.log_capacity as u64),
            ("monitor.health_check_interval_ms", self.monitor.health_check_interval_ms),
            ("monitor.connect_timeout_ms", self.monitor.connect_timeout_ms),
            ("monitor.default_window_minutes", self.monitor.default_window_minutes.into()),
            ("monitor.event_capacity", self.monitor.event_capacity as u64),
        ];
        for (field, value) in positives {
            if value == 0 {
                return Err(CoreError::Validation {
                    field: field.to_string(),
                    message: "0보다 커야 합니다".to_string(),
                });
            }
        }

        if self.transport.reconnect_max_delay_ms < self.transport.reconnect_base_delay_ms {
            return Err(CoreError::Validation {
                field: "transport.reconnect_max_delay_ms".to_string(),
                message: "reconnect_base_delay_ms 이상이어야 합니다".to_string(),
            });
        }

        Ok(())
    }
}

fn check_url(field: &str, value: &str, schemes: &[&str]) -> Result<(), CoreError> {
    let parsed = url::Url::parse(value).map_err(|e| CoreError::Validation {
        field: field.to_string(),
        message: format!("잘못된 URL '{value}': {e}"),
    })?;
    if !schemes.contains(&parsed.scheme()) {
        return Err(CoreError::Validation {
            field: field.to_string(),
            message: format!("지원하지 않는 스킴 '{}' (허용: {schemes:?})", parsed.scheme()),
        });
    }
    Ok(())
}

fn default_base_url() -> String {
    "http://localhost:8097/performance/api/dashboard".to_string()
}
fn default_ws_url() -> String {
    "ws://localhost:8097/performance/ws".to_string()
}
fn default_request_timeout_ms() -> u64 {
    30_000
}
fn default_handshake_timeout_ms() -> u64 {
    10_000
}
fn default_stomp_heartbeat_ms() -> u64 {
    4_000
}
fn default_heartbeat_interval_ms() -> u64 {
    10_000
}
fn default_max_missed_heartbeats() -> u32 {
    3
}
fn default_reconnect_base_delay_ms() -> u64 {
    5_000
}
fn default_reconnect_max_delay_ms() -> u64 {
    30_000
}
fn default_max_reconnect_attempts() -> u32 {
    10
}
fn default_event_buffer() -> usize {
    256
}
fn default_history_capacity() -> usize {
    300
}
fn default_log_capacity() -> usize {
    100
}
fn default_seed_max_points() -> usize {
    300
}
fn default_seed_log_count() -> usize {
    50
}
fn default_terminal_grace_ms() -> u64 {
    5_000
}
fn default_health_check_interval_ms() -> u64 {
    5_000
}
fn default_connect_timeout_ms() -> u64 {
    10_000
}
fn default_subscribe_retry_attempts() -> u32 {
    3
}
fn default_subscribe_retry_delay_ms() -> u64 {
    1_000
}
fn default_window_minutes() -> u32 {
    5
}
fn default_event_capacity() -> usize {
    256
}
