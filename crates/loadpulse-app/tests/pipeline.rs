//! 설정 → 어댑터 → 코디네이터 파이프라인 통합 테스트.
//!
//! REST 시드는 mockito 서버, 푸시 채널은 인메모리 커넥터를 사용한다.

use loadpulse_core::config::AppConfig;
use loadpulse_core::models::status::TestStatus;
use loadpulse_monitor::{MonitorPhase, SubscriptionCoordinator};
use loadpulse_network::connection::{ConnectionSettings, PushConnection};
use loadpulse_network::http_client::HttpSeedClient;
use loadpulse_network::testing::MockConnector;
use loadpulse_network::ws_client::StompConnector;
use mockito::Matcher;
use std::sync::Arc;
use std::time::Duration;

async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}

#[test]
fn config_defaults_are_valid() {
    let config = AppConfig::default_config();
    config.validate().unwrap();

    assert!(config.monitor.history_capacity >= config.monitor.seed_max_points);
    assert!(config.transport.reconnect_max_delay_ms >= config.transport.reconnect_base_delay_ms);
    assert!(config.monitor.connect_timeout_ms > 0);
}

#[test]
fn adapters_instantiate_from_config() {
    let config = AppConfig::default_config();

    let _connector = StompConnector::from_config(&config.transport);
    let _seed = HttpSeedClient::from_config(&config.server).unwrap();

    let settings = ConnectionSettings::from_config(&config);
    assert!(settings.client_id.starts_with("loadpulse-"));
    assert_eq!(settings.url, config.server.ws_url);
}

#[tokio::test]
async fn rest_seed_and_live_push() {
    let mut server = mockito::Server::new_async().await;
    let metrics = server
        .mock("GET", "/tests/T1/metrics")
        .match_query(Matcher::UrlEncoded("maxPoints".into(), "300".into()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{"success":true,"data":[
                {"testId":"T1","timestamp":0,"tps":10.0},
                {"testId":"T1","timestamp":1,"tps":12.0},
                {"testId":"T1","timestamp":2,"tps":9.0}
            ]}"#,
        )
        .create_async()
        .await;
    let status = server
        .mock("GET", "/tests/T1/result")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"success":true,"data":{"testId":"T1","status":"RUNNING","progress":30}}"#)
        .create_async()
        .await;
    let logs = server
        .mock("GET", "/tests/T1/logs")
        .match_query(Matcher::Any)
        .with_status(500)
        .with_body("boom")
        .create_async()
        .await;

    let config = AppConfig::default_config();
    let seed = Arc::new(
        HttpSeedClient::new(&server.url(), Duration::from_secs(5))
            .unwrap()
            .with_retry_delay(Duration::from_millis(10)),
    );
    let connector = MockConnector::new();
    let connection = PushConnection::new(connector.clone(), ConnectionSettings::from_config(&config));
    let coordinator = SubscriptionCoordinator::new(connection, seed, config.monitor.clone());
    let view = coordinator.view();

    coordinator.start_monitoring("T1").await.unwrap();
    metrics.assert_async().await;
    status.assert_async().await;
    logs.assert_async().await;

    assert_eq!(view.phase("T1"), MonitorPhase::Active);
    assert_eq!(view.current_metrics("T1").map(|s| s.tps), Some(9.0));
    assert_eq!(view.status("T1").map(|s| s.status), Some(TestStatus::Running));
    assert!(view.log_entries("T1").is_empty());

    connector
        .push_message("/topic/metrics/T1", r#"{"testId":"T1","timestamp":3,"tps":15.0}"#)
        .await;
    assert!(eventually(|| view.current_metrics("T1").map(|s| s.tps) == Some(15.0)).await);
    assert_eq!(view.metrics_history("T1", None).len(), 4);

    coordinator.shutdown().await;
    assert!(view.monitored_tests().is_empty());
}
