//! # loadpulse-network
//!
//! 푸시 채널(STOMP over WebSocket)과 REST 시드 어댑터.
//! 단일 연결 위에 테스트별 토픽 구독을 다중화하고, 연결 유실 시 선형 백오프로
//! 재연결하며 구독을 복원한다.
//!
//! ## Feature Flags
//!
//! - `test-util`: 인메모리 `MockConnector`/`MockLink` 공개 (다른 크레이트 테스트용)
//!
//! ## 사용 예시
//!
//! ```rust,ignore
//! use loadpulse_network::connection::{ConnectionSettings, PushConnection};
//! use loadpulse_network::ws_client::StompConnector;
//!
//! let connector = Arc::new(StompConnector::from_config(&config.transport));
//! let connection = PushConnection::new(connector, ConnectionSettings::from_config(&config));
//! connection.reconnect().await?;
//! ```

pub mod backoff;
pub mod connection;
pub mod connectivity;
pub mod http_client;
pub mod multiplexer;
pub mod stomp;
pub mod ws_client;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;
