//! 푸시 채널 토픽/목적지 이름.
//!
//! 구독: `/topic/{kind}/{testId}`, 구독 시작 알림: `/app/test/{testId}/...`,
//! 연결 유지: `/app/ping` 발행, `/topic/pong` 응답.

/// 연결 유지 ping 목적지
pub const PING_DESTINATION: &str = "/app/ping";

/// ping 응답 토픽 (모든 클라이언트에게 브로드캐스트됨)
pub const PONG_TOPIC: &str = "/topic/pong";

/// 테스트별 토픽 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TopicKind {
    Metrics,
    Status,
    Logs,
}

impl TopicKind {
    /// 테스트 하나가 구독하는 토픽 전체
    pub const ALL: [TopicKind; 3] = [TopicKind::Metrics, TopicKind::Status, TopicKind::Logs];

    fn segment(self) -> &'static str {
        match self {
            TopicKind::Metrics => "metrics",
            TopicKind::Status => "status",
            TopicKind::Logs => "logs",
        }
    }

    /// 구독 토픽 (예: `/topic/metrics/T1`)
    pub fn topic(self, test_id: &str) -> String {
        format!("/topic/{}/{test_id}", self.segment())
    }

    /// 구독 시작 알림 목적지 (예: `/app/test/T1/subscribe`)
    pub fn start_destination(self, test_id: &str) -> String {
        let action = match self {
            TopicKind::Metrics => "subscribe",
            TopicKind::Status => "status",
            TopicKind::Logs => "logs",
        };
        format!("/app/test/{test_id}/{action}")
    }

    /// 토픽 문자열에서 종류와 테스트 ID 추출
    pub fn parse(topic: &str) -> Option<(TopicKind, &str)> {
        let rest = topic.strip_prefix("/topic/")?;
        let (segment, test_id) = rest.split_once('/')?;
        let kind = match segment {
            "metrics" => TopicKind::Metrics,
            "status" => TopicKind::Status,
            "logs" => TopicKind::Logs,
            _ => return None,
        };
        if test_id.is_empty() {
            return None;
        }
        Some((kind, test_id))
    }
}

impl std::fmt::Display for TopicKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.segment())
    }
}
