//! 코디네이터 시나리오 테스트: 인메모리 커넥터와 시드 API로 전체 흐름을 검증한다.

use async_trait::async_trait;
use loadpulse_core::config::MonitorConfig;
use loadpulse_core::error::CoreError;
use loadpulse_core::models::log::LogPayload;
use loadpulse_core::models::metrics::MetricPayload;
use loadpulse_core::models::status::{StatusUpdate, TestStatus};
use loadpulse_core::models::topic::PONG_TOPIC;
use loadpulse_core::ports::seed::SeedApi;
use loadpulse_monitor::{MonitorEvent, MonitorPhase, SubscriptionCoordinator};
use loadpulse_network::backoff::ReconnectPolicy;
use loadpulse_network::connection::{ConnectionSettings, PushConnection};
use loadpulse_network::connectivity::ConnectionStatus;
use loadpulse_network::testing::MockConnector;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const URL: &str = "ws://mock/ws";

#[derive(Default)]
struct MockSeed {
    metrics: Mutex<Vec<MetricPayload>>,
    status: Mutex<Option<StatusUpdate>>,
    logs: Mutex<Vec<LogPayload>>,
    fail: AtomicBool,
    calls: AtomicUsize,
}

impl MockSeed {
    fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn check(&self) -> Result<(), CoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(CoreError::SeedFailed("mock 시드 실패".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl SeedApi for MockSeed {
    async fn metrics_history(
        &self,
        _test_id: &str,
        max_points: usize,
    ) -> Result<Vec<MetricPayload>, CoreError> {
        self.check()?;
        Ok(self.metrics.lock().iter().take(max_points).cloned().collect())
    }

    async fn test_status(&self, _test_id: &str) -> Result<Option<StatusUpdate>, CoreError> {
        self.check()?;
        Ok(self.status.lock().clone())
    }

    async fn recent_logs(&self, _test_id: &str, count: usize) -> Result<Vec<LogPayload>, CoreError> {
        self.check()?;
        Ok(self.logs.lock().iter().take(count).cloned().collect())
    }
}

fn connection_settings(max_attempts: u32) -> ConnectionSettings {
    ConnectionSettings {
        url: URL.to_string(),
        client_id: "scenario".to_string(),
        handshake_timeout: Duration::from_secs(10),
        heartbeat_interval: Duration::from_secs(3600),
        max_missed_heartbeats: 3,
        event_buffer: 64,
        policy: ReconnectPolicy::new(Duration::from_secs(1), Duration::from_secs(5), max_attempts),
    }
}

fn monitor_config() -> MonitorConfig {
    MonitorConfig {
        connect_timeout_ms: 60_000,
        ..MonitorConfig::default()
    }
}

fn coordinator(
    connector: &Arc<MockConnector>,
    seed: &Arc<MockSeed>,
    max_attempts: u32,
) -> SubscriptionCoordinator {
    let connection = PushConnection::new(connector.clone(), connection_settings(max_attempts));
    SubscriptionCoordinator::new(connection, seed.clone(), monitor_config())
}

fn metric(ts: i64, tps: f64) -> MetricPayload {
    MetricPayload {
        test_id: Some("T1".to_string()),
        timestamp: Some(ts),
        tps: Some(tps),
        ..Default::default()
    }
}

fn log(ts: i64, message: &str) -> LogPayload {
    LogPayload {
        level: Some("INFO".to_string()),
        message: Some(message.to_string()),
        timestamp: Some(ts),
        ..Default::default()
    }
}

async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test(start_paused = true)]
async fn start_subscribes_and_announces() {
    let connector = MockConnector::new();
    let seed = MockSeed::new();
    let coordinator = coordinator(&connector, &seed, 3);
    let view = coordinator.view();

    coordinator.start_monitoring("T1").await.unwrap();

    let link = connector.last_link().unwrap();
    assert_eq!(
        link.subscribed_topics(),
        vec![
            "/topic/logs/T1",
            "/topic/metrics/T1",
            PONG_TOPIC,
            "/topic/status/T1"
        ]
    );
    for destination in [
        "/app/test/T1/subscribe",
        "/app/test/T1/status",
        "/app/test/T1/logs",
    ] {
        assert_eq!(link.published_to(destination), vec![r#"{"testId":"T1"}"#]);
    }
    assert_eq!(view.phase("T1"), MonitorPhase::Active);
    assert_eq!(view.connection_status(), ConnectionStatus::Connected);
    assert_eq!(view.monitored_tests(), vec!["T1"]);
    assert_eq!(seed.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn empty_test_id_is_rejected() {
    let connector = MockConnector::new();
    let coordinator = coordinator(&connector, &MockSeed::new(), 3);

    for id in ["", "   "] {
        let err = coordinator.start_monitoring(id).await.unwrap_err();
        assert!(matches!(err, CoreError::Validation { ref field, .. } if field == "test_id"));
    }
    assert_eq!(connector.attempts(), 0);
}

#[tokio::test(start_paused = true)]
async fn starting_twice_issues_one_wire_subscription_per_topic() {
    let connector = MockConnector::new();
    let coordinator = coordinator(&connector, &MockSeed::new(), 3);

    coordinator.start_monitoring("T1").await.unwrap();
    coordinator.start_monitoring("T1").await.unwrap();

    let link = connector.last_link().unwrap();
    // ping 응답 구독 1 + 테스트 토픽 3
    assert_eq!(link.subscribe_count(), 4);
    assert_eq!(link.published_to("/app/test/T1/subscribe").len(), 1);
    assert_eq!(connector.attempts(), 1);
}

#[tokio::test(start_paused = true)]
async fn seed_then_live_sample() {
    let connector = MockConnector::new();
    let seed = MockSeed::new();
    *seed.metrics.lock() = vec![metric(0, 10.0), metric(1, 12.0), metric(2, 9.0)];
    let coordinator = coordinator(&connector, &seed, 3);
    let view = coordinator.view();

    coordinator.start_monitoring("T1").await.unwrap();
    assert_eq!(view.current_metrics("T1").map(|s| s.tps), Some(9.0));

    connector
        .push_message("/topic/metrics/T1", r#"{"testId":"T1","timestamp":3,"tps":15}"#)
        .await;
    settle().await;

    assert_eq!(view.current_metrics("T1").map(|s| s.tps), Some(15.0));
    assert_eq!(view.metrics_history("T1", None).len(), 4);
}

#[tokio::test(start_paused = true)]
async fn seeded_logs_stay_newest_first() {
    let connector = MockConnector::new();
    let seed = MockSeed::new();
    *seed.logs.lock() = vec![log(30, "c"), log(20, "b"), log(10, "a")];
    let coordinator = coordinator(&connector, &seed, 3);
    let view = coordinator.view();

    coordinator.start_monitoring("T1").await.unwrap();
    connector
        .push_message("/topic/logs/T1", r#"{"level":"WARN","message":"d","timestamp":40}"#)
        .await;
    settle().await;

    let messages: Vec<String> = view
        .log_entries("T1")
        .into_iter()
        .map(|e| e.message)
        .collect();
    assert_eq!(messages, vec!["d", "c", "b", "a"]);
}

#[tokio::test(start_paused = true)]
async fn seed_failures_are_ignored() {
    let connector = MockConnector::new();
    let seed = MockSeed::new();
    seed.fail.store(true, Ordering::SeqCst);
    let coordinator = coordinator(&connector, &seed, 3);
    let view = coordinator.view();

    coordinator.start_monitoring("T1").await.unwrap();
    assert_eq!(view.phase("T1"), MonitorPhase::Active);
    assert!(view.current_metrics("T1").is_none());
    assert!(view.error().is_none());
}

#[tokio::test(start_paused = true)]
async fn late_messages_after_stop_are_dropped() {
    let connector = MockConnector::new();
    let coordinator = coordinator(&connector, &MockSeed::new(), 3);
    let view = coordinator.view();

    coordinator.start_monitoring("T1").await.unwrap();
    assert!(coordinator.stop_monitoring("T1"));
    assert!(!coordinator.stop_monitoring("T1"));

    connector
        .push_message("/topic/metrics/T1", r#"{"timestamp":1,"tps":99}"#)
        .await;
    connector
        .push_message("/topic/status/T1", r#"{"status":"RUNNING"}"#)
        .await;
    settle().await;

    assert!(view.current_metrics("T1").is_none());
    assert!(view.status("T1").is_none());
    assert!(view.snapshot("T1").is_none());
    assert_eq!(view.phase("T1"), MonitorPhase::Idle);
    assert!(view.monitored_tests().is_empty());

    let link = connector.last_link().unwrap();
    assert_eq!(link.unsubscribe_count(), 3);
    assert_eq!(link.subscribed_topics(), vec![PONG_TOPIC]);
}

#[tokio::test(start_paused = true)]
async fn always_failing_connector_exhausts() {
    let connector = MockConnector::always_failing();
    let coordinator = coordinator(&connector, &MockSeed::new(), 3);
    let view = coordinator.view();

    let err = coordinator.start_monitoring("T1").await.unwrap_err();
    assert!(matches!(err, CoreError::ReconnectExhausted { attempts: 3 }));
    assert_eq!(connector.attempts(), 4);
    assert!(view.error().is_some());
    assert!(view.monitored_tests().is_empty());

    // 추가 시도 없음
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(connector.attempts(), 4);
}

#[tokio::test(start_paused = true)]
async fn connect_wait_times_out() {
    let connector = MockConnector::new();
    connector.set_hang(true);
    let connection = PushConnection::new(connector.clone(), connection_settings(3));
    let config = MonitorConfig {
        connect_timeout_ms: 3_000,
        ..MonitorConfig::default()
    };
    let coordinator = SubscriptionCoordinator::new(connection, MockSeed::new(), config);
    let view = coordinator.view();

    let err = coordinator.start_monitoring("T1").await.unwrap_err();
    assert!(matches!(err, CoreError::ConnectionTimeout { timeout_ms: 3_000 }));
    assert!(view.error().is_some());
    assert!(!coordinator.is_monitoring("T1"));
}

#[tokio::test(start_paused = true)]
async fn stop_during_connect_wait_is_noop() {
    let connector = MockConnector::new();
    connector.set_hang(true);
    let coordinator = Arc::new(coordinator(&connector, &MockSeed::new(), 3));
    let view = coordinator.view();

    let starter = coordinator.clone();
    let task = tokio::spawn(async move { starter.start_monitoring("T1").await });
    settle().await;
    assert_eq!(view.phase("T1"), MonitorPhase::Connecting);

    assert!(coordinator.stop_monitoring("T1"));
    let result = task.await.unwrap();
    assert!(result.is_ok());
    assert!(view.monitored_tests().is_empty());
    assert!(view.error().is_none());
}

#[tokio::test(start_paused = true)]
async fn completed_status_stops_after_grace() {
    let connector = MockConnector::new();
    let coordinator = coordinator(&connector, &MockSeed::new(), 3);
    let view = coordinator.view();

    coordinator.start_monitoring("T1").await.unwrap();
    connector
        .push_message("/topic/status/T1", r#"{"testId":"T1","status":"COMPLETED","progress":100}"#)
        .await;
    settle().await;
    assert_eq!(view.status("T1").map(|s| s.status), Some(TestStatus::Completed));

    tokio::time::sleep(Duration::from_secs(4)).await;
    assert!(coordinator.is_monitoring("T1"));

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(!coordinator.is_monitoring("T1"));
    assert_eq!(view.phase("T1"), MonitorPhase::Idle);
    assert!(view.status("T1").is_none());
}

#[tokio::test(start_paused = true)]
async fn restarted_session_survives_old_grace_timer() {
    let connector = MockConnector::new();
    let coordinator = coordinator(&connector, &MockSeed::new(), 3);

    coordinator.start_monitoring("T1").await.unwrap();
    connector
        .push_message("/topic/status/T1", r#"{"status":"FAILED"}"#)
        .await;
    settle().await;

    coordinator.stop_monitoring("T1");
    coordinator.start_monitoring("T1").await.unwrap();

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(coordinator.is_monitoring("T1"));
}

#[tokio::test(start_paused = true)]
async fn malformed_payload_keeps_current() {
    let connector = MockConnector::new();
    let coordinator = coordinator(&connector, &MockSeed::new(), 3);
    let view = coordinator.view();

    coordinator.start_monitoring("T1").await.unwrap();
    connector
        .push_message("/topic/metrics/T1", r#"{"timestamp":1,"tps":5}"#)
        .await;
    connector.push_message("/topic/metrics/T1", "{not json").await;
    connector.push_message("/topic/metrics/T1", "[1, 2]").await;
    settle().await;

    assert_eq!(view.current_metrics("T1").map(|s| s.tps), Some(5.0));
    assert_eq!(view.metrics_history("T1", None).len(), 1);
    assert_eq!(view.phase("T1"), MonitorPhase::Active);
}

#[tokio::test(start_paused = true)]
async fn link_loss_reconnects_and_resubscribes() {
    let connector = MockConnector::new();
    let coordinator = coordinator(&connector, &MockSeed::new(), 5);
    let view = coordinator.view();

    coordinator.start_monitoring("T1").await.unwrap();
    connector.drop_connection().await;
    settle().await;
    assert_eq!(view.phase("T1"), MonitorPhase::Reconnecting);
    assert_eq!(view.connection_status(), ConnectionStatus::Disconnected);

    tokio::time::sleep(Duration::from_secs(2)).await;
    settle().await;
    assert_eq!(connector.attempts(), 2);
    assert_eq!(view.phase("T1"), MonitorPhase::Active);

    let second = connector.last_link().unwrap();
    assert_eq!(second.subscribed_topics().len(), 4);
    assert_eq!(second.published_to("/app/test/T1/subscribe").len(), 1);

    connector
        .push_message("/topic/metrics/T1", r#"{"timestamp":7,"tps":3}"#)
        .await;
    settle().await;
    assert_eq!(view.current_metrics("T1").map(|s| s.tps), Some(3.0));
}

#[tokio::test(start_paused = true)]
async fn rejected_topic_subscription_is_retried_on_live_link() {
    let connector = MockConnector::new();
    let coordinator = coordinator(&connector, &MockSeed::new(), 3);
    let view = coordinator.view();

    coordinator.connection().connect(URL).await.unwrap();
    let link = connector.last_link().unwrap();
    // metrics 토픽의 SUBSCRIBE가 재시도 3회 모두 거부된다
    link.fail_subscribes(3);

    coordinator.start_monitoring("T1").await.unwrap();
    assert_eq!(view.phase("T1"), MonitorPhase::Reconnecting);
    assert_eq!(view.connection_status(), ConnectionStatus::Connected);
    assert!(!link
        .subscribed_topics()
        .contains(&"/topic/metrics/T1".to_string()));

    // 링크는 그대로, 다음 점검 주기에 다시 구독한다
    tokio::time::sleep(Duration::from_secs(6)).await;
    settle().await;
    assert_eq!(view.phase("T1"), MonitorPhase::Active);
    assert_eq!(connector.attempts(), 1);
    assert!(link
        .subscribed_topics()
        .contains(&"/topic/metrics/T1".to_string()));

    connector
        .push_message("/topic/metrics/T1", r#"{"timestamp":5,"tps":8}"#)
        .await;
    settle().await;
    assert_eq!(view.current_metrics("T1").map(|s| s.tps), Some(8.0));
}

#[tokio::test(start_paused = true)]
async fn exhaustion_while_active_then_restart() {
    let connector = MockConnector::new();
    let coordinator = coordinator(&connector, &MockSeed::new(), 1);
    let view = coordinator.view();
    let mut errors = view.watch_error();

    coordinator.start_monitoring("T1").await.unwrap();
    connector.set_always_fail(true);
    connector.drop_connection().await;

    tokio::time::sleep(Duration::from_secs(3)).await;
    settle().await;
    assert!(view.connection_snapshot().exhausted);
    assert_eq!(view.phase("T1"), MonitorPhase::Reconnecting);
    assert!(errors.has_changed().unwrap());
    assert!(errors.borrow_and_update().is_some());

    connector.set_always_fail(false);
    coordinator.restart().await.unwrap();
    settle().await;
    assert_eq!(view.phase("T1"), MonitorPhase::Active);
    assert!(view.error().is_none());
}

#[tokio::test(start_paused = true)]
async fn tests_share_one_transport() {
    let connector = MockConnector::new();
    let coordinator = coordinator(&connector, &MockSeed::new(), 3);
    let view = coordinator.view();

    coordinator.start_monitoring("T1").await.unwrap();
    coordinator.start_monitoring("T2").await.unwrap();
    assert_eq!(connector.attempts(), 1);
    assert_eq!(connector.last_link().unwrap().subscribed_topics().len(), 7);

    coordinator.stop_monitoring("T1");
    connector
        .push_message("/topic/metrics/T2", r#"{"timestamp":1,"tps":42}"#)
        .await;
    settle().await;

    assert_eq!(view.monitored_tests(), vec!["T2"]);
    assert_eq!(view.current_metrics("T2").map(|s| s.tps), Some(42.0));
}

#[tokio::test(start_paused = true)]
async fn observers_receive_events_and_versions() {
    let connector = MockConnector::new();
    let coordinator = coordinator(&connector, &MockSeed::new(), 3);
    let view = coordinator.view();

    coordinator.start_monitoring("T1").await.unwrap();
    let mut events = view.subscribe();
    let before = view.snapshot("T1").unwrap().version;

    connector
        .push_message("/topic/metrics/T1", r#"{"timestamp":1,"tps":1}"#)
        .await;
    settle().await;

    let mut updated = None;
    while let Ok(event) = events.try_recv() {
        if let MonitorEvent::MetricsUpdated { test_id, version } = event {
            updated = Some((test_id, version));
        }
    }
    let snapshot = view.snapshot("T1").unwrap();
    assert_eq!(updated, Some(("T1".to_string(), snapshot.version)));
    assert!(snapshot.version > before);
    assert_eq!(snapshot.phase, MonitorPhase::Active);
}

#[tokio::test(start_paused = true)]
async fn shutdown_stops_everything() {
    let connector = MockConnector::new();
    let coordinator = coordinator(&connector, &MockSeed::new(), 3);
    let view = coordinator.view();

    coordinator.start_monitoring("T1").await.unwrap();
    coordinator.shutdown().await;
    settle().await;

    assert!(view.monitored_tests().is_empty());
    assert_eq!(view.connection_status(), ConnectionStatus::Disconnected);
    assert!(connector.last_link().unwrap().is_closed());

    // 종료 후 재연결 시도 없음
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(connector.attempts(), 1);
}
