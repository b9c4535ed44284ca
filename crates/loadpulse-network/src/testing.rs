//! 테스트용 인메모리 커넥터/링크.
//!
//! 와이어 호출 횟수를 세고, 수신 이벤트를 직접 주입할 수 있다.
//! 다른 크레이트에서는 `test-util` feature로 사용한다.

use async_trait::async_trait;
use loadpulse_core::error::CoreError;
use loadpulse_core::ports::push::{PushConnector, PushEvent, PushLink, SubscriptionHandle};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// 호출을 기록하는 링크
#[derive(Default)]
pub struct MockLink {
    subscribed: Mutex<Vec<(String, SubscriptionHandle)>>,
    published: Mutex<Vec<(String, String)>>,
    subscribe_calls: AtomicUsize,
    unsubscribe_calls: AtomicUsize,
    failing_subscribes: AtomicU32,
    closed: AtomicBool,
    server_heartbeat: Option<Duration>,
}

impl MockLink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// 다음 `n`번의 SUBSCRIBE를 실패시킨다
    pub fn fail_subscribes(&self, n: u32) {
        self.failing_subscribes.store(n, Ordering::SeqCst);
    }

    pub fn subscribe_count(&self) -> usize {
        self.subscribe_calls.load(Ordering::SeqCst)
    }

    pub fn unsubscribe_count(&self) -> usize {
        self.unsubscribe_calls.load(Ordering::SeqCst)
    }

    /// 현재 구독 중인 토픽 (정렬)
    pub fn subscribed_topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self
            .subscribed
            .lock()
            .iter()
            .map(|(topic, _)| topic.clone())
            .collect();
        topics.sort();
        topics
    }

    /// 발행된 메시지 (목적지, 본문)
    pub fn published(&self) -> Vec<(String, String)> {
        self.published.lock().clone()
    }

    /// 특정 목적지로 발행된 본문
    pub fn published_to(&self, destination: &str) -> Vec<String> {
        self.published
            .lock()
            .iter()
            .filter(|(dest, _)| dest == destination)
            .map(|(_, body)| body.clone())
            .collect()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PushLink for MockLink {
    async fn subscribe(&self, topic: &str, handle: &SubscriptionHandle) -> Result<(), CoreError> {
        self.subscribe_calls.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failing_subscribes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(CoreError::TransportUnavailable(
                "mock SUBSCRIBE 거부".to_string(),
            ));
        }
        self.subscribed
            .lock()
            .push((topic.to_string(), handle.clone()));
        Ok(())
    }

    async fn unsubscribe(&self, handle: &SubscriptionHandle) -> Result<(), CoreError> {
        self.unsubscribe_calls.fetch_add(1, Ordering::SeqCst);
        self.subscribed.lock().retain(|(_, h)| h != handle);
        Ok(())
    }

    async fn publish(&self, destination: &str, body: &str) -> Result<(), CoreError> {
        if self.is_closed() {
            return Err(CoreError::NotConnected);
        }
        self.published
            .lock()
            .push((destination.to_string(), body.to_string()));
        Ok(())
    }

    async fn close(&self) -> Result<(), CoreError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn server_heartbeat(&self) -> Option<Duration> {
        self.server_heartbeat
    }
}

/// 연결 결과를 조작할 수 있는 커넥터
#[derive(Default)]
pub struct MockConnector {
    attempts: AtomicU32,
    always_fail: AtomicBool,
    fail_next: AtomicU32,
    hang: AtomicBool,
    server_heartbeat: Mutex<Option<Duration>>,
    links: Mutex<Vec<Arc<MockLink>>>,
    senders: Mutex<Vec<mpsc::Sender<PushEvent>>>,
}

impl MockConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// 항상 핸드셰이크에 실패하는 커넥터
    pub fn always_failing() -> Arc<Self> {
        let connector = Self::new();
        connector.set_always_fail(true);
        connector
    }

    pub fn set_always_fail(&self, fail: bool) {
        self.always_fail.store(fail, Ordering::SeqCst);
    }

    /// 다음 `n`번의 핸드셰이크를 실패시킨다
    pub fn fail_next(&self, n: u32) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    /// 핸드셰이크가 응답 없이 멈추도록 설정
    pub fn set_hang(&self, hang: bool) {
        self.hang.store(hang, Ordering::SeqCst);
    }

    /// 이후 링크가 협상 결과로 보고할 서버 heart-beat 간격
    pub fn set_server_heartbeat(&self, every: Option<Duration>) {
        *self.server_heartbeat.lock() = every;
    }

    /// 지금까지의 핸드셰이크 시도 횟수
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn links(&self) -> Vec<Arc<MockLink>> {
        self.links.lock().clone()
    }

    pub fn last_link(&self) -> Option<Arc<MockLink>> {
        self.links.lock().last().cloned()
    }

    /// 가장 최근 링크로 수신 이벤트 주입
    pub async fn emit(&self, event: PushEvent) -> bool {
        let sender = self.senders.lock().last().cloned();
        match sender {
            Some(tx) => tx.send(event).await.is_ok(),
            None => false,
        }
    }

    /// 토픽 메시지 주입
    pub async fn push_message(&self, topic: &str, body: &str) -> bool {
        self.emit(PushEvent::Message {
            topic: topic.to_string(),
            body: body.to_string(),
        })
        .await
    }

    /// 서버 측 연결 끊김 흉내
    pub async fn drop_connection(&self) -> bool {
        self.emit(PushEvent::Closed(Some("mock 연결 끊김".to_string())))
            .await
    }
}

#[async_trait]
impl PushConnector for MockConnector {
    async fn connect(
        &self,
        _url: &str,
        events: mpsc::Sender<PushEvent>,
    ) -> Result<Arc<dyn PushLink>, CoreError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        if self.hang.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }

        let scheduled_failure = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if self.always_fail.load(Ordering::SeqCst) || scheduled_failure {
            return Err(CoreError::TransportUnavailable(
                "mock 연결 거부".to_string(),
            ));
        }

        let link = Arc::new(MockLink {
            server_heartbeat: *self.server_heartbeat.lock(),
            ..MockLink::default()
        });
        self.links.lock().push(link.clone());
        self.senders.lock().push(events);
        Ok(link)
    }
}
