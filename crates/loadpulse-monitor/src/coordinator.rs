//! 구독 코디네이터.
//!
//! 테스트별 모니터링 세션의 수명주기를 관리한다:
//! 연결 대기 → 토픽 구독 → 시작 알림 → REST 시드 → 실시간 반영 → 종료.
//! 모든 테스트는 하나의 `PushConnection`을 공유한다.
//!
//! 세션마다 세대 번호와 취소 신호를 둔다. 중지 후 늦게 끝난 대기나 타이머는
//! 세대가 달라 아무것도 하지 않는다.

use loadpulse_core::config::MonitorConfig;
use loadpulse_core::error::CoreError;
use loadpulse_core::models::log::LogPayload;
use loadpulse_core::models::metrics::{seed_samples, MetricPayload};
use loadpulse_core::models::now_millis;
use loadpulse_core::models::status::StatusUpdate;
use loadpulse_core::models::topic::TopicKind;
use loadpulse_core::ports::seed::SeedApi;
use loadpulse_network::connection::PushConnection;
use loadpulse_network::connectivity::{ConnectionSnapshot, ConnectionStatus, LinkState};
use loadpulse_network::multiplexer::TopicCallback;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::events::MonitorEvent;
use crate::observer::MonitorView;
use crate::state::MonitorState;

/// 테스트 모니터링 단계
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MonitorPhase {
    #[default]
    Idle,
    /// 푸시 채널 연결 대기
    Connecting,
    /// 토픽 구독 및 시작 알림 전송
    Subscribing,
    Active,
    /// 연결 유실, 복구 대기
    Reconnecting,
    Stopping,
}

impl std::fmt::Display for MonitorPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MonitorPhase::Idle => "idle",
            MonitorPhase::Connecting => "connecting",
            MonitorPhase::Subscribing => "subscribing",
            MonitorPhase::Active => "active",
            MonitorPhase::Reconnecting => "reconnecting",
            MonitorPhase::Stopping => "stopping",
        };
        f.write_str(s)
    }
}

/// `activate` 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Activation {
    /// 모든 토픽 구독 완료
    Active,
    /// 일부 토픽의 와이어 구독 실패
    Incomplete,
    /// 진행 중에 세션이 중지됨
    Stopped,
}

struct Session {
    generation: u64,
    cancel: watch::Sender<bool>,
    grace: Option<JoinHandle<()>>,
}

struct CoordinatorInner {
    connection: PushConnection,
    seed: Arc<dyn SeedApi>,
    config: MonitorConfig,
    state: Arc<MonitorState>,
    sessions: Mutex<HashMap<String, Session>>,
    next_generation: AtomicU64,
    supervisor: Mutex<Option<JoinHandle<()>>>,
    last_status: Mutex<Option<ConnectionStatus>>,
}

/// 구독 코디네이터
pub struct SubscriptionCoordinator {
    inner: Arc<CoordinatorInner>,
}

impl SubscriptionCoordinator {
    pub fn new(connection: PushConnection, seed: Arc<dyn SeedApi>, config: MonitorConfig) -> Self {
        let state = Arc::new(MonitorState::new(&config));
        Self {
            inner: Arc::new(CoordinatorInner {
                connection,
                seed,
                config,
                state,
                sessions: Mutex::new(HashMap::new()),
                next_generation: AtomicU64::new(0),
                supervisor: Mutex::new(None),
                last_status: Mutex::new(None),
            }),
        }
    }

    /// 읽기 전용 관찰 핸들
    pub fn view(&self) -> MonitorView {
        MonitorView::new(self.inner.state.clone(), self.inner.connection.clone())
    }

    /// 테스트 모니터링 시작
    ///
    /// 이미 모니터링 중이면 아무것도 하지 않는다. 연결 대기 타임아웃이나
    /// 재연결 소진은 에러로 반환하고 코디네이터 에러로도 알린다.
    /// 구독/시드 실패는 로그만 남기고 계속 진행한다.
    pub async fn start_monitoring(&self, test_id: &str) -> Result<(), CoreError> {
        self.inner.start(test_id).await
    }

    /// 테스트 모니터링 중지 (동기). 세션이 있었으면 `true`.
    pub fn stop_monitoring(&self, test_id: &str) -> bool {
        self.inner.stop_session(test_id.trim(), None)
    }

    /// 재연결 소진 후 사용자 요청으로 다시 연결
    ///
    /// 첫 시도가 실패하면 에러를 반환하지만 재시도는 계속 예약된다.
    pub async fn restart(&self) -> Result<(), CoreError> {
        info!("푸시 채널 재시작 요청");
        self.inner.state.set_error(None);
        self.inner.connection.reconnect().await
    }

    /// 모든 테스트 중지, 연결 감시 중단, 연결 종료
    pub async fn shutdown(&self) {
        let ids: Vec<String> = self.inner.sessions.lock().keys().cloned().collect();
        for id in ids {
            self.inner.stop_session(&id, None);
        }
        if let Some(supervisor) = self.inner.supervisor.lock().take() {
            supervisor.abort();
        }
        self.inner.connection.disconnect().await;
        info!("구독 코디네이터 종료");
    }

    pub fn is_monitoring(&self, test_id: &str) -> bool {
        self.inner.sessions.lock().contains_key(test_id)
    }

    pub fn connection(&self) -> &PushConnection {
        &self.inner.connection
    }
}

impl Drop for SubscriptionCoordinator {
    fn drop(&mut self) {
        if let Some(supervisor) = self.inner.supervisor.lock().take() {
            supervisor.abort();
        }
        for (_, session) in self.inner.sessions.lock().drain() {
            let _ = session.cancel.send(true);
            if let Some(grace) = session.grace {
                grace.abort();
            }
        }
    }
}

impl CoordinatorInner {
    async fn start(self: &Arc<Self>, test_id: &str) -> Result<(), CoreError> {
        let test_id = test_id.trim();
        if test_id.is_empty() {
            return Err(CoreError::Validation {
                field: "test_id".to_string(),
                message: "테스트 ID가 비어 있습니다".to_string(),
            });
        }

        let (generation, cancel) = {
            let mut sessions = self.sessions.lock();
            if sessions.contains_key(test_id) {
                debug!(test_id, "이미 모니터링 중");
                return Ok(());
            }
            let generation = self.next_generation.fetch_add(1, Ordering::SeqCst) + 1;
            let (cancel_tx, cancel_rx) = watch::channel(false);
            sessions.insert(
                test_id.to_string(),
                Session {
                    generation,
                    cancel: cancel_tx,
                    grace: None,
                },
            );
            self.state.register(test_id);
            self.state.set_phase(test_id, MonitorPhase::Connecting);
            (generation, cancel_rx)
        };
        info!(test_id, "모니터링 시작");
        self.ensure_supervisor();

        match self.wait_connected(cancel.clone()).await {
            Ok(true) => {}
            Ok(false) => {
                debug!(test_id, "연결 대기 중 중지됨");
                return Ok(());
            }
            Err(e) => {
                warn!(test_id, "모니터링 시작 실패: {e}");
                self.state.set_error(Some(e.to_string()));
                self.stop_session(test_id, Some(generation));
                return Err(e);
            }
        }

        if self.activate(test_id, generation).await == Activation::Stopped {
            return Ok(());
        }
        self.state.set_error(None);
        self.load_seed(test_id, generation, cancel).await;
        Ok(())
    }

    /// 연결될 때까지 대기. 중지되면 `Ok(false)`.
    async fn wait_connected(&self, mut cancel: watch::Receiver<bool>) -> Result<bool, CoreError> {
        let mut state_rx = self.connection.watch_state();
        if observe_connected(&mut state_rx) {
            return Ok(true);
        }

        let connection = self.connection.clone();
        tokio::spawn(async move {
            if let Err(e) = connection.reconnect().await {
                debug!("연결 시도 실패: {e}");
            }
        });

        let timeout = self.config.connect_timeout();
        tokio::select! {
            result = tokio::time::timeout(timeout, next_link_outcome(&mut state_rx)) => match result {
                Ok(Ok(())) => Ok(true),
                Ok(Err(e)) => Err(e),
                Err(_) => Err(CoreError::ConnectionTimeout {
                    timeout_ms: timeout.as_millis() as u64,
                }),
            },
            _ = cancelled(&mut cancel) => Ok(false),
        }
    }

    /// 토픽 구독과 시작 알림 후 `Active`로 전환
    ///
    /// 와이어 구독이 빠진 토픽이 남으면 `Reconnecting`으로 두고, 연결 감시가 다시 시도한다.
    async fn activate(self: &Arc<Self>, test_id: &str, generation: u64) -> Activation {
        if !self.is_current(test_id, generation) {
            return Activation::Stopped;
        }
        self.state.set_phase(test_id, MonitorPhase::Subscribing);

        for kind in TopicKind::ALL {
            self.subscribe_topic(test_id, kind, generation).await;
            if !self.is_current(test_id, generation) {
                self.discard_orphan_topics(test_id).await;
                return Activation::Stopped;
            }
        }

        self.send_start_notifications(test_id).await;
        if !self.is_current(test_id, generation) {
            return Activation::Stopped;
        }

        let missing = self.missing_topics(test_id);
        if missing.is_empty() {
            self.state.set_phase(test_id, MonitorPhase::Active);
            Activation::Active
        } else {
            warn!(test_id, ?missing, "구독되지 않은 토픽: 재시도 대기");
            self.state.set_phase(test_id, MonitorPhase::Reconnecting);
            Activation::Incomplete
        }
    }

    /// 현재 링크에 와이어 구독이 없는 토픽
    fn missing_topics(&self, test_id: &str) -> Vec<TopicKind> {
        let mux = self.connection.multiplexer();
        TopicKind::ALL
            .into_iter()
            .filter(|kind| !mux.is_wired(&kind.topic(test_id)))
            .collect()
    }

    async fn subscribe_topic(self: &Arc<Self>, test_id: &str, kind: TopicKind, generation: u64) {
        let topic = kind.topic(test_id);
        let attempts = self.config.subscribe_retry_attempts.max(1);

        for attempt in 1..=attempts {
            if !self.is_current(test_id, generation) {
                return;
            }
            let callback = self.topic_callback(test_id, kind);
            match self.connection.subscribe(&topic, callback).await {
                Ok(handle) => {
                    debug!(topic = %topic, handle = %handle, "토픽 구독 완료");
                    return;
                }
                Err(e) if attempt < attempts => {
                    warn!(topic = %topic, "토픽 구독 실패 ({attempt}/{attempts}): {e}");
                    tokio::time::sleep(self.config.subscribe_retry_delay()).await;
                }
                Err(e) => {
                    warn!(topic = %topic, "토픽 구독 포기: {e}");
                }
            }
        }
    }

    /// 세션이 사라진 뒤 남은 구독 정리 (같은 ID로 새 세션이 시작됐으면 그대로 둔다)
    async fn discard_orphan_topics(&self, test_id: &str) {
        if self.sessions.lock().contains_key(test_id) {
            return;
        }
        for kind in TopicKind::ALL {
            self.connection.unsubscribe(&kind.topic(test_id)).await;
        }
    }

    async fn send_start_notifications(&self, test_id: &str) {
        let body = serde_json::json!({ "testId": test_id }).to_string();
        for kind in TopicKind::ALL {
            let destination = kind.start_destination(test_id);
            if let Err(e) = self.connection.publish(&destination, &body).await {
                warn!(destination = %destination, "시작 알림 전송 실패: {e}");
            }
        }
    }

    /// REST 시드: 세 요청을 동시에 보내고 실패는 무시한다
    async fn load_seed(self: &Arc<Self>, test_id: &str, generation: u64, mut cancel: watch::Receiver<bool>) {
        let fetch = async {
            tokio::join!(
                self.seed.metrics_history(test_id, self.config.seed_max_points),
                self.seed.test_status(test_id),
                self.seed.recent_logs(test_id, self.config.seed_log_count),
            )
        };

        let (metrics, status, logs) = tokio::select! {
            results = fetch => results,
            _ = cancelled(&mut cancel) => {
                debug!(test_id, "시드 조회 중 중지됨");
                return;
            }
        };
        if !self.is_current(test_id, generation) {
            return;
        }

        let now = now_millis();
        match metrics {
            Ok(payloads) => {
                let samples = seed_samples(payloads, now);
                if self.state.metrics.seed(test_id, samples) {
                    self.publish_metrics(test_id);
                }
            }
            Err(e) => warn!(test_id, "메트릭 시드 실패: {e}"),
        }

        match status {
            Ok(Some(update)) => self.apply_status(test_id, update),
            Ok(None) => debug!(test_id, "상태 시드 없음"),
            Err(e) => warn!(test_id, "상태 시드 실패: {e}"),
        }

        match logs {
            Ok(payloads) => {
                let entries = payloads.into_iter().map(|p| p.into_entry(now)).collect();
                if self.state.logs.seed(test_id, entries) {
                    self.state.events.publish(MonitorEvent::LogsUpdated {
                        test_id: test_id.to_string(),
                    });
                }
            }
            Err(e) => warn!(test_id, "로그 시드 실패: {e}"),
        }
        info!(test_id, "초기 데이터 로드 완료");
    }

    fn topic_callback(self: &Arc<Self>, test_id: &str, kind: TopicKind) -> TopicCallback {
        let weak = Arc::downgrade(self);
        let test_id = test_id.to_string();
        Arc::new(move |value| {
            let (Some(inner), Some(value)) = (weak.upgrade(), value) else {
                return;
            };
            match kind {
                TopicKind::Metrics => inner.on_metrics(&test_id, value),
                TopicKind::Status => inner.on_status(&test_id, value),
                TopicKind::Logs => inner.on_log(&test_id, value),
            }
        })
    }

    fn on_metrics(&self, test_id: &str, value: serde_json::Value) {
        let Some(payload) = parse_payload::<MetricPayload>(TopicKind::Metrics, test_id, value) else {
            return;
        };
        if self.state.metrics.ingest(test_id, payload.into_sample(now_millis())) {
            self.publish_metrics(test_id);
        }
    }

    fn on_status(self: &Arc<Self>, test_id: &str, value: serde_json::Value) {
        if let Some(update) = parse_payload::<StatusUpdate>(TopicKind::Status, test_id, value) {
            self.apply_status(test_id, update);
        }
    }

    fn on_log(&self, test_id: &str, value: serde_json::Value) {
        let Some(payload) = parse_payload::<LogPayload>(TopicKind::Logs, test_id, value) else {
            return;
        };
        if self.state.logs.push(test_id, payload.into_entry(now_millis())) {
            self.state.events.publish(MonitorEvent::LogsUpdated {
                test_id: test_id.to_string(),
            });
        }
    }

    fn publish_metrics(&self, test_id: &str) {
        if let Some(version) = self.state.metrics.version(test_id) {
            self.state.events.publish(MonitorEvent::MetricsUpdated {
                test_id: test_id.to_string(),
                version,
            });
        }
    }

    fn apply_status(self: &Arc<Self>, test_id: &str, update: StatusUpdate) {
        let Some(state) = self.state.status.apply(test_id, update) else {
            return;
        };
        self.state.events.publish(MonitorEvent::StatusChanged {
            test_id: test_id.to_string(),
            status: state.status,
        });
        if state.status.is_terminal() {
            self.schedule_grace(test_id);
        }
    }

    /// 종료 상태 수신: 유예 시간 뒤 세션 중지
    fn schedule_grace(self: &Arc<Self>, test_id: &str) {
        let mut sessions = self.sessions.lock();
        let Some(session) = sessions.get_mut(test_id) else {
            return;
        };
        if session.grace.is_some() {
            return;
        }

        let generation = session.generation;
        let delay = self.config.terminal_grace();
        let weak = Arc::downgrade(self);
        let id = test_id.to_string();
        info!(test_id, "테스트 종료: {}ms 후 구독 해제", delay.as_millis());
        session.grace = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(inner) = weak.upgrade() {
                inner.expire(&id, generation);
            }
        }));
    }

    fn expire(&self, test_id: &str, generation: u64) {
        {
            let mut sessions = self.sessions.lock();
            match sessions.get_mut(test_id) {
                Some(session) if session.generation == generation => session.grace = None,
                _ => return,
            }
        }
        self.stop_session(test_id, Some(generation));
    }

    /// 세션 중지. `generation`이 주어지면 같은 세대일 때만 중지한다.
    fn stop_session(&self, test_id: &str, generation: Option<u64>) -> bool {
        let mut sessions = self.sessions.lock();
        let matches = sessions
            .get(test_id)
            .is_some_and(|s| generation.map_or(true, |g| g == s.generation));
        if !matches {
            return false;
        }
        let Some(session) = sessions.remove(test_id) else {
            return false;
        };

        self.state.set_phase(test_id, MonitorPhase::Stopping);
        let _ = session.cancel.send(true);
        if let Some(grace) = session.grace {
            grace.abort();
        }

        let mux = self.connection.multiplexer();
        let handles: Vec<_> = TopicKind::ALL
            .iter()
            .filter_map(|kind| mux.remove(&kind.topic(test_id)))
            .collect();
        self.state.clear(test_id);
        drop(sessions);

        if !handles.is_empty() {
            match tokio::runtime::Handle::try_current() {
                Ok(runtime) => {
                    runtime.spawn(async move { mux.release(handles).await });
                }
                Err(_) => debug!(test_id, "런타임 없음: 와이어 구독 해제 생략"),
            }
        }
        info!(test_id, "모니터링 중지");
        true
    }

    fn is_current(&self, test_id: &str, generation: u64) -> bool {
        self.sessions
            .lock()
            .get(test_id)
            .is_some_and(|s| s.generation == generation)
    }

    fn ensure_supervisor(self: &Arc<Self>) {
        let mut supervisor = self.supervisor.lock();
        if supervisor.as_ref().is_some_and(|h| !h.is_finished()) {
            return;
        }
        let weak = Arc::downgrade(self);
        let state_rx = self.connection.watch_state();
        let period = self.config.health_check_interval();
        *supervisor = Some(tokio::spawn(supervise(weak, state_rx, period)));
    }

    /// 연결 상태 점검: 세션 단계 전환, 재연결 요청, 소진 알림
    async fn check_connection(self: &Arc<Self>) {
        let snapshot = self.connection.snapshot();
        let status = snapshot.status();
        {
            let mut last = self.last_status.lock();
            if *last != Some(status) {
                *last = Some(status);
                self.state
                    .events
                    .publish(MonitorEvent::ConnectionChanged(status));
            }
        }

        let sessions: Vec<(String, u64)> = self
            .sessions
            .lock()
            .iter()
            .map(|(id, s)| (id.clone(), s.generation))
            .collect();
        if sessions.is_empty() {
            return;
        }

        if snapshot.is_connected() {
            self.state.set_error(None);
            for (test_id, generation) in sessions {
                let resume = match self.state.phase(&test_id) {
                    MonitorPhase::Reconnecting => true,
                    MonitorPhase::Active => !self.missing_topics(&test_id).is_empty(),
                    _ => false,
                };
                if resume {
                    info!(test_id = %test_id, "연결 복구: 구독 재개");
                    self.activate(&test_id, generation).await;
                }
            }
            return;
        }

        for (test_id, _) in &sessions {
            if self.state.phase(test_id) == MonitorPhase::Active {
                self.state.set_phase(test_id, MonitorPhase::Reconnecting);
            }
        }

        if snapshot.exhausted {
            let err = CoreError::ReconnectExhausted {
                attempts: snapshot.reconnect_attempt,
            };
            if self.state.set_error(Some(err.to_string())) {
                error!("{err}: 재시작이 필요합니다");
            }
        } else if snapshot.state == LinkState::Disconnected {
            info!("푸시 채널 유휴 상태: 연결 요청");
            let connection = self.connection.clone();
            tokio::spawn(async move {
                if let Err(e) = connection.reconnect().await {
                    debug!("연결 시도 실패: {e}");
                }
            });
        }
    }
}

/// 연결 상태 변경 또는 주기마다 점검
async fn supervise(
    weak: Weak<CoordinatorInner>,
    mut state_rx: watch::Receiver<ConnectionSnapshot>,
    period: Duration,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            changed = state_rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = ticker.tick() => {}
        }
        let Some(inner) = weak.upgrade() else {
            break;
        };
        inner.check_connection().await;
    }
    debug!("연결 감시 종료");
}

/// 현재 값을 확인하면서 읽음 처리한다.
///
/// 확인과 읽음 처리가 한 번에 일어나므로, 이후의 상태 변경은 모두 `changed()`로 관찰된다.
/// 현재 값의 소진 표시는 이전 시도의 결과라서 보지 않는다.
fn observe_connected(state_rx: &mut watch::Receiver<ConnectionSnapshot>) -> bool {
    state_rx.borrow_and_update().is_connected()
}

/// 다음 상태 변경부터 연결 또는 재시도 소진까지 대기
async fn next_link_outcome(
    state_rx: &mut watch::Receiver<ConnectionSnapshot>,
) -> Result<(), CoreError> {
    loop {
        if state_rx.changed().await.is_err() {
            return Err(CoreError::TransportUnavailable(
                "연결 상태 채널 종료".to_string(),
            ));
        }
        let snapshot = state_rx.borrow_and_update().clone();
        if snapshot.is_connected() {
            return Ok(());
        }
        if snapshot.exhausted {
            return Err(CoreError::ReconnectExhausted {
                attempts: snapshot.reconnect_attempt,
            });
        }
    }
}

/// 취소 신호 대기 (송신 측이 사라져도 취소로 본다)
async fn cancelled(rx: &mut watch::Receiver<bool>) {
    let _ = rx.wait_for(|stopped| *stopped).await;
}

fn parse_payload<T: serde::de::DeserializeOwned>(
    kind: TopicKind,
    test_id: &str,
    value: serde_json::Value,
) -> Option<T> {
    match serde_json::from_value(value) {
        Ok(payload) => Some(payload),
        Err(e) => {
            let err = CoreError::MalformedPayload {
                topic: kind.topic(test_id),
                reason: e.to_string(),
            };
            warn!("{err}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_display() {
        assert_eq!(MonitorPhase::default(), MonitorPhase::Idle);
        assert_eq!(MonitorPhase::Reconnecting.to_string(), "reconnecting");
    }

    fn link(state: LinkState, exhausted: bool) -> ConnectionSnapshot {
        ConnectionSnapshot {
            state,
            exhausted,
            ..ConnectionSnapshot::default()
        }
    }

    #[test]
    fn connected_value_published_before_observation_is_seen() {
        let (tx, mut rx) = watch::channel(link(LinkState::Connecting, false));
        // 수신기 생성 후, 확인 전에 핸드셰이크가 끝난 경우
        tx.send_replace(link(LinkState::Connected, false));
        assert!(observe_connected(&mut rx));
    }

    #[tokio::test]
    async fn change_after_observation_wakes_waiter() {
        let (tx, mut rx) = watch::channel(link(LinkState::Connecting, false));
        assert!(!observe_connected(&mut rx));

        let waiter = tokio::spawn(async move { next_link_outcome(&mut rx).await });
        tx.send_replace(link(LinkState::Connected, false));
        let result = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn stale_exhaustion_is_ignored_until_next_change() {
        let (tx, mut rx) = watch::channel(link(LinkState::Failing, true));
        assert!(!observe_connected(&mut rx));

        let waiter = tokio::spawn(async move { next_link_outcome(&mut rx).await });
        tx.send_replace(link(LinkState::Connecting, false));
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        tx.send_replace(ConnectionSnapshot {
            reconnect_attempt: 3,
            ..link(LinkState::Failing, true)
        });
        let result = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(result, Err(CoreError::ReconnectExhausted { attempts: 3 })));
    }

    #[tokio::test]
    async fn cancelled_returns_when_sender_dropped() {
        let (tx, mut rx) = watch::channel(false);
        drop(tx);
        cancelled(&mut rx).await;
    }

    #[test]
    fn malformed_status_payload_is_rejected() {
        let value = serde_json::json!({ "progress": "half" });
        assert!(parse_payload::<StatusUpdate>(TopicKind::Status, "T1", value).is_none());
        let value = serde_json::json!({ "status": "RUNNING" });
        assert!(parse_payload::<StatusUpdate>(TopicKind::Status, "T1", value).is_some());
    }
}
