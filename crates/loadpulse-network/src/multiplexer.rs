//! 토픽 멀티플렉서.
//!
//! 단일 푸시 링크 위에서 토픽별 구독을 관리하고 수신 메시지를 콜백으로 라우팅한다.
//! 구독 테이블은 링크 교체(재연결)에도 유지되며, `attach` 시 와이어 구독을 복원한다.

use loadpulse_core::error::CoreError;
use loadpulse_core::ports::push::{PushLink, SubscriptionHandle};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// 토픽 콜백. JSON 파싱에 실패한 메시지는 `None`으로 전달된다.
pub type TopicCallback = Arc<dyn Fn(Option<serde_json::Value>) + Send + Sync>;

struct Entry {
    handle: SubscriptionHandle,
    callback: TopicCallback,
    /// 현재 링크에 SUBSCRIBE가 발행되었는지
    wired: bool,
}

/// 토픽 멀티플렉서
pub struct TopicMultiplexer {
    entries: RwLock<HashMap<String, Entry>>,
    link: RwLock<Option<Arc<dyn PushLink>>>,
    next_id: AtomicU64,
}

impl TopicMultiplexer {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            link: RwLock::new(None),
            next_id: AtomicU64::new(0),
        }
    }

    fn current_link(&self) -> Option<Arc<dyn PushLink>> {
        self.link.read().clone()
    }

    /// 토픽 구독
    ///
    /// 이미 구독 중인 토픽은 콜백만 교체하고 와이어 구독을 다시 내지 않는다.
    pub async fn subscribe(
        &self,
        topic: &str,
        callback: TopicCallback,
    ) -> Result<SubscriptionHandle, CoreError> {
        let link = self.current_link().ok_or(CoreError::NotConnected)?;

        let (handle, issue) = {
            let mut entries = self.entries.write();
            match entries.get_mut(topic) {
                Some(entry) => {
                    entry.callback = callback;
                    let issue = !entry.wired;
                    entry.wired = true;
                    (entry.handle.clone(), issue)
                }
                None => {
                    let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                    let handle = SubscriptionHandle::new(format!("sub-{id}"));
                    entries.insert(
                        topic.to_string(),
                        Entry {
                            handle: handle.clone(),
                            callback,
                            wired: true,
                        },
                    );
                    (handle, true)
                }
            }
        };

        if !issue {
            debug!(topic, "이미 구독 중: 콜백 교체");
            return Ok(handle);
        }

        if let Err(e) = link.subscribe(topic, &handle).await {
            if let Some(entry) = self.entries.write().get_mut(topic) {
                if entry.handle == handle {
                    entry.wired = false;
                }
            }
            return Err(CoreError::SubscribeFailed {
                topic: topic.to_string(),
                reason: e.to_string(),
            });
        }

        debug!(topic, handle = %handle, "토픽 구독");
        Ok(handle)
    }

    /// 테이블에서 토픽 제거 (동기). 와이어 해제가 필요한 핸들을 반환한다.
    pub fn remove(&self, topic: &str) -> Option<SubscriptionHandle> {
        let entry = self.entries.write().remove(topic)?;
        debug!(topic, "구독 테이블에서 제거");
        entry.wired.then_some(entry.handle)
    }

    /// 와이어 구독 해제. 연결이 없으면 아무것도 하지 않는다.
    pub async fn release(&self, handles: Vec<SubscriptionHandle>) {
        if handles.is_empty() {
            return;
        }
        let Some(link) = self.current_link() else {
            return;
        };
        for handle in handles {
            if let Err(e) = link.unsubscribe(&handle).await {
                warn!(handle = %handle, "구독 해제 실패: {e}");
            }
        }
    }

    /// 토픽 구독 해제 (멱등)
    pub async fn unsubscribe(&self, topic: &str) {
        if let Some(handle) = self.remove(topic) {
            self.release(vec![handle]).await;
        }
    }

    /// 전체 구독 해제
    pub async fn unsubscribe_all(&self) {
        let handles: Vec<SubscriptionHandle> = {
            let mut entries = self.entries.write();
            entries
                .drain()
                .filter_map(|(_, entry)| entry.wired.then_some(entry.handle))
                .collect()
        };
        if !handles.is_empty() {
            info!("전체 구독 해제: {}개", handles.len());
        }
        self.release(handles).await;
    }

    /// 수신 메시지를 토픽 콜백으로 전달
    pub fn dispatch(&self, topic: &str, body: &str) {
        let callback = match self.entries.read().get(topic) {
            Some(entry) => entry.callback.clone(),
            None => {
                debug!(topic, "구독하지 않은 토픽 메시지 무시");
                return;
            }
        };

        let value = match serde_json::from_str::<serde_json::Value>(body) {
            Ok(value) => Some(value),
            Err(e) => {
                let err = CoreError::MalformedPayload {
                    topic: topic.to_string(),
                    reason: e.to_string(),
                };
                warn!("{err}");
                None
            }
        };
        callback(value);
    }

    /// 목적지로 메시지 발행
    pub async fn publish(&self, destination: &str, body: &str) -> Result<(), CoreError> {
        let link = self.current_link().ok_or(CoreError::NotConnected)?;
        link.publish(destination, body).await
    }

    /// 새 링크 연결: 테이블의 모든 토픽을 다시 구독한다
    pub async fn attach(&self, link: Arc<dyn PushLink>) {
        *self.link.write() = Some(link.clone());

        let pending: Vec<(String, SubscriptionHandle)> = {
            let mut entries = self.entries.write();
            entries
                .iter_mut()
                .map(|(topic, entry)| {
                    entry.wired = true;
                    (topic.clone(), entry.handle.clone())
                })
                .collect()
        };

        if pending.is_empty() {
            return;
        }

        let mut restored = 0usize;
        for (topic, handle) in pending {
            match link.subscribe(&topic, &handle).await {
                Ok(()) => restored += 1,
                Err(e) => {
                    warn!(topic = %topic, "구독 복원 실패: {e}");
                    if let Some(entry) = self.entries.write().get_mut(&topic) {
                        if entry.handle == handle {
                            entry.wired = false;
                        }
                    }
                }
            }
        }
        info!("구독 복원: {restored}개");
    }

    /// 링크 분리: 테이블은 유지하고 와이어 상태만 초기화
    pub fn detach(&self) {
        *self.link.write() = None;
        for entry in self.entries.write().values_mut() {
            entry.wired = false;
        }
    }

    pub fn is_attached(&self) -> bool {
        self.link.read().is_some()
    }

    pub fn is_subscribed(&self, topic: &str) -> bool {
        self.entries.read().contains_key(topic)
    }

    /// 테이블에 있고 현재 링크에 와이어 구독까지 된 토픽인지
    pub fn is_wired(&self, topic: &str) -> bool {
        self.entries.read().get(topic).is_some_and(|e| e.wired)
    }

    pub fn active_topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.entries.read().keys().cloned().collect();
        topics.sort();
        topics
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl Default for TopicMultiplexer {
    fn default() -> Self {
        Self::new()
    }
}
