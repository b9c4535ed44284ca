//! # loadpulse-monitor
//!
//! 부하 테스트 모니터링 파이프라인.
//! 테스트별 세션을 관리하며 푸시 토픽을 구독하고, 메트릭/상태/로그를
//! 보관소에 반영한 뒤 관찰자에게 스냅샷과 변경 이벤트를 제공한다.
//! 시작 시 REST로 초기 데이터를 채운다.

pub mod aggregator;
pub mod coordinator;
pub mod events;
pub mod history;
pub mod logs;
pub mod observer;
mod state;
pub mod status;

pub use coordinator::{MonitorPhase, SubscriptionCoordinator};
pub use events::MonitorEvent;
pub use observer::{MonitorView, TestSnapshot};
