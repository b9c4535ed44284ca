//! STOMP over WebSocket 클라이언트.
//!
//! `tokio-tungstenite` 기반 `PushConnector`/`PushLink` 구현.
//! 핸드셰이크(CONNECT → CONNECTED)까지 마친 뒤 수신 루프를 띄운다.

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use loadpulse_core::config::TransportConfig;
use loadpulse_core::error::CoreError;
use loadpulse_core::ports::push::{PushConnector, PushEvent, PushLink, SubscriptionHandle};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::stomp::{self, Command, Frame, HeartBeat, Inbound};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = Arc<tokio::sync::Mutex<SplitSink<WsStream, Message>>>;

/// STOMP 커넥터: `PushConnector` 포트 구현
pub struct StompConnector {
    /// 협상할 heart-beat 간격 (ms)
    heartbeat_ms: u64,
}

impl StompConnector {
    pub fn new(heartbeat_ms: u64) -> Self {
        Self { heartbeat_ms }
    }

    pub fn from_config(config: &TransportConfig) -> Self {
        Self::new(config.stomp_heartbeat_ms)
    }

    /// CONNECTED 프레임까지 대기
    async fn await_connected(read: &mut SplitStream<WsStream>) -> Result<Frame, CoreError> {
        while let Some(msg) = read.next().await {
            let text = match msg {
                Ok(Message::Text(text)) => text.to_string(),
                Ok(Message::Close(_)) => break,
                Ok(_) => continue,
                Err(e) => {
                    return Err(CoreError::TransportUnavailable(format!(
                        "핸드셰이크 수신 실패: {e}"
                    )))
                }
            };

            match stomp::decode(&text)? {
                Inbound::Heartbeat => continue,
                Inbound::Frame(frame) => match frame.command {
                    Command::Connected => return Ok(frame),
                    Command::Error => {
                        let reason = frame.get("message").unwrap_or(&frame.body).to_string();
                        return Err(CoreError::TransportUnavailable(format!(
                            "STOMP 연결 거부: {reason}"
                        )));
                    }
                    other => {
                        return Err(CoreError::TransportUnavailable(format!(
                            "예상하지 못한 프레임: {}",
                            other.as_str()
                        )))
                    }
                },
            }
        }
        Err(CoreError::TransportUnavailable(
            "핸드셰이크 중 연결 종료".to_string(),
        ))
    }

    /// 수신 루프: 프레임을 `PushEvent`로 변환
    async fn read_loop(mut read: SplitStream<WsStream>, tx: mpsc::Sender<PushEvent>) {
        let mut close_reason = None;

        while let Some(msg) = read.next().await {
            let event = match msg {
                Ok(Message::Text(text)) => match translate(text.as_str()) {
                    Some(event) => event,
                    None => continue,
                },
                Ok(Message::Binary(data)) => match std::str::from_utf8(&data) {
                    Ok(text) => match translate(text) {
                        Some(event) => event,
                        None => continue,
                    },
                    Err(_) => {
                        warn!("UTF-8이 아닌 바이너리 프레임 무시");
                        continue;
                    }
                },
                Ok(Message::Close(frame)) => {
                    close_reason = frame.map(|f| f.reason.to_string());
                    break;
                }
                // Ping/Pong도 생존 신호로 취급
                Ok(_) => PushEvent::Heartbeat,
                Err(e) => {
                    warn!("WebSocket 수신 에러: {e}");
                    close_reason = Some(e.to_string());
                    break;
                }
            };

            if tx.send(event).await.is_err() {
                debug!("수신 채널 닫힘: 수신 루프 종료");
                return;
            }
        }

        let _ = tx.send(PushEvent::Closed(close_reason)).await;
        debug!("WebSocket 수신 루프 종료");
    }
}

/// 텍스트 메시지 하나를 이벤트로 변환. 무시할 프레임은 `None`.
fn translate(text: &str) -> Option<PushEvent> {
    let frame = match stomp::decode(text) {
        Ok(Inbound::Heartbeat) => return Some(PushEvent::Heartbeat),
        Ok(Inbound::Frame(frame)) => frame,
        Err(e) => {
            warn!("{e}");
            return None;
        }
    };

    match frame.command {
        Command::Message => match frame.get("destination") {
            Some(topic) => Some(PushEvent::Message {
                topic: topic.to_string(),
                body: frame.body,
            }),
            None => {
                warn!("destination 없는 MESSAGE 프레임 무시");
                None
            }
        },
        Command::Receipt => Some(PushEvent::Heartbeat),
        Command::Error => {
            let reason = frame
                .get("message")
                .map(str::to_string)
                .unwrap_or(frame.body);
            Some(PushEvent::Error(reason))
        }
        other => {
            debug!("처리하지 않는 프레임: {}", other.as_str());
            None
        }
    }
}

#[async_trait]
impl PushConnector for StompConnector {
    async fn connect(
        &self,
        url: &str,
        events: mpsc::Sender<PushEvent>,
    ) -> Result<Arc<dyn PushLink>, CoreError> {
        let parsed = url::Url::parse(url)
            .map_err(|e| CoreError::Config(format!("잘못된 WebSocket URL '{url}': {e}")))?;
        let host = match (parsed.host_str(), parsed.port()) {
            (Some(host), Some(port)) => format!("{host}:{port}"),
            (Some(host), None) => host.to_string(),
            (None, _) => "localhost".to_string(),
        };

        info!("WebSocket 연결: {url}");

        let (ws_stream, _) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| CoreError::TransportUnavailable(format!("WebSocket 연결 실패: {e}")))?;

        let (mut write, mut read) = ws_stream.split();

        write
            .send(Message::text(Frame::connect(&host, self.heartbeat_ms).encode()))
            .await
            .map_err(|e| CoreError::TransportUnavailable(format!("CONNECT 전송 실패: {e}")))?;

        let connected = Self::await_connected(&mut read).await?;
        let heart_beat = HeartBeat::negotiate(self.heartbeat_ms, connected.get("heart-beat"));
        debug!(
            "STOMP 연결 수립: version={}, heart-beat={:?}",
            connected.get("version").unwrap_or("?"),
            heart_beat
        );

        let write: WsSink = Arc::new(tokio::sync::Mutex::new(write));
        let reader = tokio::spawn(Self::read_loop(read, events));
        let beater = heart_beat
            .outgoing
            .map(|every| tokio::spawn(send_heart_beats(write.clone(), every)));

        Ok(Arc::new(StompLink {
            write,
            reader: parking_lot::Mutex::new(Some(reader)),
            beater: parking_lot::Mutex::new(beater),
            heart_beat,
        }))
    }
}

/// 협상된 간격마다 EOL heart-beat 송신
async fn send_heart_beats(write: WsSink, every: Duration) {
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + every, every);
    loop {
        ticker.tick().await;
        let mut sink = write.lock().await;
        if let Err(e) = sink.send(Message::text("\n")).await {
            debug!("heart-beat 전송 실패, 송신 중단: {e}");
            return;
        }
    }
}

/// 수립된 STOMP 세션: `PushLink` 포트 구현
pub struct StompLink {
    write: WsSink,
    reader: parking_lot::Mutex<Option<JoinHandle<()>>>,
    beater: parking_lot::Mutex<Option<JoinHandle<()>>>,
    heart_beat: HeartBeat,
}

impl StompLink {
    fn stop_heart_beats(&self) {
        if let Some(beater) = self.beater.lock().take() {
            beater.abort();
        }
    }

    async fn send_frame(&self, frame: Frame) -> Result<(), CoreError> {
        let mut write = self.write.lock().await;
        write
            .send(Message::text(frame.encode()))
            .await
            .map_err(|e| CoreError::TransportUnavailable(format!("WebSocket 전송 실패: {e}")))
    }
}

#[async_trait]
impl PushLink for StompLink {
    async fn subscribe(&self, topic: &str, handle: &SubscriptionHandle) -> Result<(), CoreError> {
        self.send_frame(Frame::subscribe(handle.as_str(), topic))
            .await
    }

    async fn unsubscribe(&self, handle: &SubscriptionHandle) -> Result<(), CoreError> {
        self.send_frame(Frame::unsubscribe(handle.as_str())).await
    }

    async fn publish(&self, destination: &str, body: &str) -> Result<(), CoreError> {
        self.send_frame(Frame::send_json(destination, body)).await
    }

    async fn close(&self) -> Result<(), CoreError> {
        self.stop_heart_beats();
        if let Err(e) = self.send_frame(Frame::disconnect()).await {
            debug!("DISCONNECT 전송 실패: {e}");
        }
        let mut write = self.write.lock().await;
        write
            .send(Message::Close(None))
            .await
            .map_err(|e| CoreError::TransportUnavailable(format!("WebSocket 종료 실패: {e}")))
    }

    fn server_heartbeat(&self) -> Option<Duration> {
        self.heart_beat.incoming
    }
}

impl Drop for StompLink {
    fn drop(&mut self) {
        self.stop_heart_beats();
        if let Some(reader) = self.reader.lock().take() {
            reader.abort();
        }
    }
}
