//! 푸시 채널 연결 관리.
//!
//! 단일 STOMP 링크의 수명주기를 관리한다: 핸드셰이크, 하트비트, 연결 유실 감지,
//! 선형 백오프 재연결. 재연결 후에는 멀티플렉서가 구독을 복원한다.
//!
//! 링크마다 세대(generation) 번호를 붙여, 이전 링크에서 늦게 도착한 이벤트는 무시한다.
//!
//! 생존 확인은 `/app/ping` 발행과 `/topic/pong` 응답으로 한다. 서버가 STOMP heart-beat를
//! 약속한 경우에만 그 간격 기준의 무수신 검사를 추가로 적용한다.

use futures::future::BoxFuture;
use loadpulse_core::config::AppConfig;
use loadpulse_core::error::CoreError;
use loadpulse_core::models::now_millis;
use loadpulse_core::models::topic::{PING_DESTINATION, PONG_TOPIC};
use loadpulse_core::ports::push::{PushConnector, PushEvent, PushLink, SubscriptionHandle};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::backoff::ReconnectPolicy;
use crate::connectivity::{ConnectionSnapshot, ConnectionStatus, ConnectivityTracker, LinkState};
use crate::multiplexer::{TopicCallback, TopicMultiplexer};

/// ping 응답 구독의 와이어 ID (멀티플렉서 ID와 겹치지 않는다)
const PONG_SUBSCRIPTION: &str = "sub-pong";

/// 연결 에러 콜백
pub type ErrorCallback = Arc<dyn Fn(&CoreError) + Send + Sync>;

/// 연결 설정
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    pub url: String,
    pub client_id: String,
    pub handshake_timeout: Duration,
    pub heartbeat_interval: Duration,
    pub max_missed_heartbeats: u32,
    pub event_buffer: usize,
    pub policy: ReconnectPolicy,
}

impl ConnectionSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        let transport = &config.transport;
        let client_id = if transport.client_id.is_empty() {
            format!("loadpulse-{}", uuid::Uuid::new_v4())
        } else {
            transport.client_id.clone()
        };
        Self {
            url: config.server.ws_url.clone(),
            client_id,
            handshake_timeout: transport.handshake_timeout(),
            heartbeat_interval: transport.heartbeat_interval(),
            max_missed_heartbeats: transport.max_missed_heartbeats,
            event_buffer: transport.event_buffer,
            policy: ReconnectPolicy::from_config(transport),
        }
    }

    /// 수신 없이 허용되는 최대 시간
    fn silence_limit(&self) -> Duration {
        self.heartbeat_interval
            .saturating_mul(self.max_missed_heartbeats.max(1))
    }
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default_config())
    }
}

struct ConnectionInner {
    connector: Arc<dyn PushConnector>,
    settings: ConnectionSettings,
    url: RwLock<String>,
    mux: Arc<TopicMultiplexer>,
    tracker: ConnectivityTracker,
    /// 핸드셰이크 직렬화
    handshake: tokio::sync::Mutex<()>,
    /// 링크 세대: 새 링크 수립 또는 유실 시 증가
    generation: AtomicU64,
    /// 명시적 종료 세대: `disconnect()` 시 증가, 진행 중인 핸드셰이크 결과를 버린다
    epoch: AtomicU64,
    link: Mutex<Option<Arc<dyn PushLink>>>,
    link_tasks: Mutex<Vec<JoinHandle<()>>>,
    retry_task: Mutex<Option<JoinHandle<()>>>,
    last_inbound: Mutex<Instant>,
    on_error: RwLock<Option<ErrorCallback>>,
}

/// 푸시 채널 연결 (복제 가능한 핸들)
#[derive(Clone)]
pub struct PushConnection {
    inner: Arc<ConnectionInner>,
}

impl PushConnection {
    pub fn new(connector: Arc<dyn PushConnector>, settings: ConnectionSettings) -> Self {
        let url = settings.url.clone();
        Self {
            inner: Arc::new(ConnectionInner {
                connector,
                settings,
                url: RwLock::new(url),
                mux: Arc::new(TopicMultiplexer::new()),
                tracker: ConnectivityTracker::new(),
                handshake: tokio::sync::Mutex::new(()),
                generation: AtomicU64::new(0),
                epoch: AtomicU64::new(0),
                link: Mutex::new(None),
                link_tasks: Mutex::new(Vec::new()),
                retry_task: Mutex::new(None),
                last_inbound: Mutex::new(Instant::now()),
                on_error: RwLock::new(None),
            }),
        }
    }

    /// 에러 콜백 등록 (핸드셰이크 실패, 연결 유실, 재시도 소진)
    pub fn on_error(&self, callback: ErrorCallback) {
        *self.inner.on_error.write() = Some(callback);
    }

    /// 지정 URL로 연결
    ///
    /// 연결 중이거나 연결된 상태면 아무것도 하지 않는다.
    /// 재연결 대기 중이면 타이머를 취소하고 즉시 시도하며, 시도 횟수는 처음부터 센다.
    pub async fn connect(&self, url: &str) -> Result<(), CoreError> {
        match self.inner.tracker.state() {
            LinkState::Connecting | LinkState::Connected => {
                debug!("이미 연결 중: connect 무시");
                return Ok(());
            }
            LinkState::Disconnected | LinkState::Failing => {}
        }

        *self.inner.url.write() = url.to_string();
        self.inner.cancel_retry();
        self.inner.tracker.record_retry(0);
        ConnectionInner::attempt(self.inner.clone(), 0).await
    }

    /// 마지막으로 사용한 URL(없으면 설정값)로 연결
    pub async fn reconnect(&self) -> Result<(), CoreError> {
        let url = self.url();
        self.connect(&url).await
    }

    /// 연결 종료
    ///
    /// 재연결 타이머를 취소하고 모든 구독을 해제한 뒤 소켓을 닫는다.
    pub async fn disconnect(&self) {
        let inner = &self.inner;
        let idle = inner.tracker.state() == LinkState::Disconnected
            && inner.link.lock().is_none()
            && inner.retry_task.lock().is_none();
        if idle {
            debug!("이미 연결 해제 상태");
            return;
        }

        inner.epoch.fetch_add(1, Ordering::SeqCst);
        inner.generation.fetch_add(1, Ordering::SeqCst);
        inner.tracker.mark_disconnected();
        inner.cancel_retry();

        inner.mux.unsubscribe_all().await;
        inner.stop_link_tasks();
        inner.mux.detach();

        let link = inner.link.lock().take();
        if let Some(link) = link {
            if let Err(e) = link.close().await {
                debug!("링크 종료 실패: {e}");
            }
        }
    }

    /// 토픽 구독
    pub async fn subscribe(
        &self,
        topic: &str,
        callback: TopicCallback,
    ) -> Result<SubscriptionHandle, CoreError> {
        self.inner.mux.subscribe(topic, callback).await
    }

    /// 토픽 구독 해제
    pub async fn unsubscribe(&self, topic: &str) {
        self.inner.mux.unsubscribe(topic).await
    }

    /// 목적지로 메시지 발행
    pub async fn publish(&self, destination: &str, body: &str) -> Result<(), CoreError> {
        self.inner.mux.publish(destination, body).await
    }

    pub fn multiplexer(&self) -> Arc<TopicMultiplexer> {
        self.inner.mux.clone()
    }

    pub fn snapshot(&self) -> ConnectionSnapshot {
        self.inner.tracker.snapshot()
    }

    pub fn status(&self) -> ConnectionStatus {
        self.inner.tracker.status()
    }

    pub fn is_connected(&self) -> bool {
        self.inner.tracker.state() == LinkState::Connected
    }

    /// 상태 변경 수신기
    pub fn watch_state(&self) -> watch::Receiver<ConnectionSnapshot> {
        self.inner.tracker.subscribe()
    }

    pub fn url(&self) -> String {
        self.inner.url.read().clone()
    }

    pub fn client_id(&self) -> &str {
        &self.inner.settings.client_id
    }
}

impl ConnectionInner {
    /// 핸드셰이크 1회 시도. 실패하면 다음 재시도를 예약한다.
    fn attempt(inner: Arc<Self>, attempt: u32) -> BoxFuture<'static, Result<(), CoreError>> {
        Box::pin(async move {
            let _guard = inner.handshake.lock().await;
            if inner.tracker.state() == LinkState::Connected {
                return Ok(());
            }

            let epoch = inner.epoch.load(Ordering::SeqCst);
            inner.tracker.mark_connecting();
            if attempt > 0 {
                info!(
                    "푸시 채널 재연결 시도 {attempt}/{}",
                    inner.settings.policy.max_attempts
                );
            }

            let url = inner.url.read().clone();
            let (tx, rx) = mpsc::channel(inner.settings.event_buffer);
            let timeout = inner.settings.handshake_timeout;
            let outcome =
                tokio::time::timeout(timeout, inner.connector.connect(&url, tx)).await;

            let result = match outcome {
                Ok(Ok(link)) => Ok(link),
                Ok(Err(e @ CoreError::TransportUnavailable(_))) => Err(e),
                Ok(Err(e)) => Err(CoreError::TransportUnavailable(e.to_string())),
                Err(_) => Err(CoreError::TransportUnavailable(format!(
                    "핸드셰이크 시간 초과 ({}ms)",
                    timeout.as_millis()
                ))),
            };

            if inner.epoch.load(Ordering::SeqCst) != epoch {
                // 핸드셰이크 도중 disconnect() 호출됨
                if let Ok(link) = result {
                    let _ = link.close().await;
                }
                return Err(CoreError::NotConnected);
            }

            match result {
                Ok(link) => {
                    Self::establish(&inner, link, rx).await;
                    Ok(())
                }
                Err(e) => {
                    Self::on_failure(&inner, &e, attempt);
                    Err(e)
                }
            }
        })
    }

    /// 링크 수립 처리: 구독 복원 후 펌프/하트비트 태스크 시작
    async fn establish(
        inner: &Arc<Self>,
        link: Arc<dyn PushLink>,
        events: mpsc::Receiver<PushEvent>,
    ) {
        let generation = inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        inner.stop_link_tasks();
        *inner.link.lock() = Some(link.clone());
        *inner.last_inbound.lock() = Instant::now();

        if let Err(e) = link
            .subscribe(PONG_TOPIC, &SubscriptionHandle::new(PONG_SUBSCRIPTION))
            .await
        {
            warn!("ping 응답 구독 실패: {e}");
        }
        let server_heartbeat = link.server_heartbeat();

        inner.mux.attach(link).await;
        inner.tracker.record_success();

        let pump = tokio::spawn(Self::pump(inner.clone(), events, generation));
        let heartbeat = tokio::spawn(Self::heartbeat(
            inner.clone(),
            generation,
            server_heartbeat,
        ));
        inner.link_tasks.lock().extend([pump, heartbeat]);
    }

    /// 수신 이벤트 처리 루프 (링크당 1개, 수신 순서 보존)
    async fn pump(inner: Arc<Self>, mut events: mpsc::Receiver<PushEvent>, generation: u64) {
        let mut reason = "수신 채널 종료".to_string();

        while let Some(event) = events.recv().await {
            if inner.generation.load(Ordering::SeqCst) != generation {
                return;
            }
            *inner.last_inbound.lock() = Instant::now();

            match event {
                PushEvent::Message { topic, body } if topic == PONG_TOPIC => {
                    inner.on_pong(&body);
                }
                PushEvent::Message { topic, body } => inner.mux.dispatch(&topic, &body),
                PushEvent::Heartbeat => {}
                PushEvent::Error(message) => {
                    reason = format!("서버 에러 프레임: {message}");
                    break;
                }
                PushEvent::Closed(close) => {
                    reason = close.unwrap_or_else(|| "서버가 연결을 종료".to_string());
                    break;
                }
            }
        }

        Self::handle_link_lost(&inner, generation, reason);
    }

    /// 하트비트: ping 발행 및 무응답 감지
    ///
    /// ping 주기마다 무수신 시간을 `silence_limit`과 비교한다. 서버가 heart-beat를
    /// 약속했으면 그 간격마다 추가로 검사하고, 간격의 2배를 넘으면 유실로 본다.
    async fn heartbeat(inner: Arc<Self>, generation: u64, server_heartbeat: Option<Duration>) {
        let interval = inner.settings.heartbeat_interval;
        let start = Instant::now();
        let mut ping = tokio::time::interval_at(start + interval, interval);
        ping.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        let mut limit = inner.settings.silence_limit();
        let mut check = server_heartbeat.map(|every| {
            limit = limit.min(every.saturating_mul(2));
            let mut check = tokio::time::interval_at(start + every, every);
            check.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            check
        });

        loop {
            let send_ping = tokio::select! {
                _ = ping.tick() => true,
                _ = async {
                    match check.as_mut() {
                        Some(check) => {
                            check.tick().await;
                        }
                        None => std::future::pending::<()>().await,
                    }
                } => false,
            };
            if inner.generation.load(Ordering::SeqCst) != generation {
                return;
            }

            let silent = inner.last_inbound.lock().elapsed();
            if silent >= limit {
                Self::handle_link_lost(
                    &inner,
                    generation,
                    format!("하트비트 응답 없음 ({}ms)", silent.as_millis()),
                );
                return;
            }
            if !send_ping {
                continue;
            }

            let body = serde_json::json!({
                "clientId": inner.settings.client_id,
                "timestamp": now_millis(),
            })
            .to_string();
            let link = inner.link.lock().clone();
            if let Some(link) = link {
                if let Err(e) = link.publish(PING_DESTINATION, &body).await {
                    debug!("ping 전송 실패: {e}");
                }
            }
        }
    }

    /// 연결 유실 처리: 현재 세대일 때만 재연결을 예약한다
    fn handle_link_lost(inner: &Arc<Self>, generation: u64, reason: String) {
        if inner
            .generation
            .compare_exchange(
                generation,
                generation + 1,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_err()
        {
            debug!("이전 링크 이벤트 무시: {reason}");
            return;
        }
        if inner.tracker.state() == LinkState::Disconnected {
            return;
        }

        warn!("푸시 채널 연결 유실: {reason}");
        inner.stop_link_tasks();
        inner.mux.detach();
        if let Some(link) = inner.link.lock().take() {
            tokio::spawn(async move {
                let _ = link.close().await;
            });
        }

        let err = CoreError::TransportUnavailable(reason);
        Self::on_failure(inner, &err, 0);
    }

    fn on_failure(inner: &Arc<Self>, err: &CoreError, attempt: u32) {
        inner.tracker.record_failure(&err.to_string());
        inner.notify_error(err);
        Self::schedule_retry(inner, attempt + 1);
    }

    /// 다음 재연결 예약. 한도를 넘으면 소진 상태로 전환한다.
    fn schedule_retry(inner: &Arc<Self>, next: u32) {
        if inner.tracker.state() == LinkState::Disconnected {
            return;
        }

        match inner.settings.policy.delay_for(next) {
            Some(delay) => {
                inner.tracker.record_retry(next);
                info!("{}ms 후 재연결 ({next}번째)", delay.as_millis());
                let task_inner = inner.clone();
                let handle = tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = Self::attempt(task_inner, next).await;
                });
                *inner.retry_task.lock() = Some(handle);
            }
            None => {
                *inner.retry_task.lock() = None;
                let err = CoreError::ReconnectExhausted {
                    attempts: inner.settings.policy.max_attempts,
                };
                error!("{err}");
                inner.tracker.mark_exhausted(&err.to_string());
                inner.notify_error(&err);
            }
        }
    }

    /// ping 응답 확인 (다른 클라이언트의 응답도 생존 신호로 이미 반영됨)
    fn on_pong(&self, body: &str) {
        let client_id = serde_json::from_str::<serde_json::Value>(body)
            .ok()
            .and_then(|v| v.get("clientId").and_then(|id| id.as_str().map(str::to_string)));
        if client_id.as_deref() == Some(self.settings.client_id.as_str()) {
            debug!("pong 수신");
        }
    }

    fn cancel_retry(&self) {
        if let Some(task) = self.retry_task.lock().take() {
            task.abort();
        }
    }

    fn stop_link_tasks(&self) {
        for task in self.link_tasks.lock().drain(..) {
            task.abort();
        }
    }

    fn notify_error(&self, err: &CoreError) {
        let callback = self.on_error.read().clone();
        if let Some(callback) = callback {
            callback(err);
        }
    }
}
