//! STOMP 1.2 프레임 코덱.
//!
//! WebSocket 텍스트 메시지 하나에 프레임 하나(또는 heart-beat EOL)가 실린다.
//! 헤더 값은 1.2 규칙으로 이스케이프한다 (`CONNECT`/`CONNECTED` 제외).

use loadpulse_core::error::CoreError;
use std::time::Duration;

/// 프레임 커맨드
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Connect,
    Connected,
    Send,
    Subscribe,
    Unsubscribe,
    Disconnect,
    Message,
    Receipt,
    Error,
}

impl Command {
    pub fn as_str(self) -> &'static str {
        match self {
            Command::Connect => "CONNECT",
            Command::Connected => "CONNECTED",
            Command::Send => "SEND",
            Command::Subscribe => "SUBSCRIBE",
            Command::Unsubscribe => "UNSUBSCRIBE",
            Command::Disconnect => "DISCONNECT",
            Command::Message => "MESSAGE",
            Command::Receipt => "RECEIPT",
            Command::Error => "ERROR",
        }
    }

    fn parse(line: &str) -> Option<Self> {
        let command = match line {
            "CONNECT" | "STOMP" => Command::Connect,
            "CONNECTED" => Command::Connected,
            "SEND" => Command::Send,
            "SUBSCRIBE" => Command::Subscribe,
            "UNSUBSCRIBE" => Command::Unsubscribe,
            "DISCONNECT" => Command::Disconnect,
            "MESSAGE" => Command::Message,
            "RECEIPT" => Command::Receipt,
            "ERROR" => Command::Error,
            _ => return None,
        };
        Some(command)
    }

    /// 헤더 이스케이프 적용 여부
    fn escapes_headers(self) -> bool {
        !matches!(self, Command::Connect | Command::Connected)
    }
}

/// STOMP 프레임
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: Command,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl Frame {
    pub fn new(command: Command) -> Self {
        Self {
            command,
            headers: Vec::new(),
            body: String::new(),
        }
    }

    /// 헤더 추가 (빌더)
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// 본문 설정 (빌더)
    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// 헤더 조회. 중복 헤더는 첫 번째 값이 유효하다.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    // ============================================================
    // 클라이언트 프레임 생성
    // ============================================================

    pub fn connect(host: &str, heartbeat_ms: u64) -> Self {
        Frame::new(Command::Connect)
            .header("accept-version", "1.2,1.1")
            .header("host", host)
            .header("heart-beat", format!("{heartbeat_ms},{heartbeat_ms}"))
    }

    pub fn subscribe(id: &str, destination: &str) -> Self {
        Frame::new(Command::Subscribe)
            .header("id", id)
            .header("destination", destination)
            .header("ack", "auto")
    }

    pub fn unsubscribe(id: &str) -> Self {
        Frame::new(Command::Unsubscribe).header("id", id)
    }

    pub fn send_json(destination: &str, body: &str) -> Self {
        Frame::new(Command::Send)
            .header("destination", destination)
            .header("content-type", "application/json")
            .body(body)
    }

    pub fn disconnect() -> Self {
        Frame::new(Command::Disconnect)
    }

    /// 와이어 포맷으로 인코딩 (NUL 종료)
    pub fn encode(&self) -> String {
        let escape = self.command.escapes_headers();
        let mut out = String::with_capacity(64 + self.body.len());
        out.push_str(self.command.as_str());
        out.push('\n');
        for (name, value) in &self.headers {
            if escape {
                out.push_str(&escape_header(name));
                out.push(':');
                out.push_str(&escape_header(value));
            } else {
                out.push_str(name);
                out.push(':');
                out.push_str(value);
            }
            out.push('\n');
        }
        if !self.body.is_empty() && self.get("content-length").is_none() {
            out.push_str(&format!("content-length:{}\n", self.body.len()));
        }
        out.push('\n');
        out.push_str(&self.body);
        out.push('\0');
        out
    }
}

/// 수신 텍스트 하나의 해석 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// heart-beat (EOL만 있는 메시지)
    Heartbeat,
    /// 프레임
    Frame(Frame),
}

/// WebSocket 텍스트 메시지 디코딩
pub fn decode(text: &str) -> Result<Inbound, CoreError> {
    let trimmed = text.trim_start_matches(['\r', '\n']);
    if trimmed.is_empty() {
        return Ok(Inbound::Heartbeat);
    }
    parse_frame(trimmed).map(Inbound::Frame)
}

/// 협상된 heart-beat 간격
///
/// `outgoing`은 클라이언트가 EOL을 보내야 하는 간격, `incoming`은 서버가 약속한 간격.
/// 어느 한쪽이라도 0이면 해당 방향은 사용하지 않는다.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeartBeat {
    pub outgoing: Option<Duration>,
    pub incoming: Option<Duration>,
}

impl HeartBeat {
    /// CONNECT에 보낸 값(`client_ms,client_ms`)과 CONNECTED의 `heart-beat` 헤더로 협상
    pub fn negotiate(client_ms: u64, server_header: Option<&str>) -> Self {
        let (sx, sy) = server_header.and_then(parse_heart_beat).unwrap_or((0, 0));
        let pick = |ours: u64, theirs: u64| {
            (ours > 0 && theirs > 0).then(|| Duration::from_millis(ours.max(theirs)))
        };
        Self {
            outgoing: pick(client_ms, sy),
            incoming: pick(client_ms, sx),
        }
    }
}

/// `heart-beat` 헤더 값 (`cx,cy`)
fn parse_heart_beat(value: &str) -> Option<(u64, u64)> {
    let (x, y) = value.split_once(',')?;
    Some((x.trim().parse().ok()?, y.trim().parse().ok()?))
}

fn parse_frame(text: &str) -> Result<Frame, CoreError> {
    let (head, rest) = split_head(text)
        .ok_or_else(|| malformed("헤더 종료(빈 줄)를 찾을 수 없습니다"))?;

    let mut lines = head.split('\n').map(|l| l.strip_suffix('\r').unwrap_or(l));
    let command_line = lines.next().unwrap_or_default();
    let command = Command::parse(command_line)
        .ok_or_else(|| malformed(&format!("알 수 없는 커맨드: {command_line}")))?;

    let mut headers = Vec::new();
    for line in lines {
        if line.is_empty() {
            continue;
        }
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| malformed(&format!("잘못된 헤더 줄: {line}")))?;
        if command.escapes_headers() {
            headers.push((unescape_header(name)?, unescape_header(value)?));
        } else {
            headers.push((name.to_string(), value.to_string()));
        }
    }

    let content_length = headers
        .iter()
        .find(|(k, _)| k == "content-length")
        .map(|(_, v)| {
            v.trim()
                .parse::<usize>()
                .map_err(|_| malformed(&format!("잘못된 content-length: {v}")))
        })
        .transpose()?;

    let body = match content_length {
        Some(len) => {
            let bytes = rest.as_bytes();
            if bytes.len() < len {
                return Err(malformed("본문이 content-length보다 짧습니다"));
            }
            String::from_utf8(bytes[..len].to_vec())
                .map_err(|_| malformed("본문이 UTF-8이 아닙니다"))?
        }
        None => match rest.find('\0') {
            Some(end) => rest[..end].to_string(),
            None => rest.to_string(),
        },
    };

    Ok(Frame {
        command,
        headers,
        body,
    })
}

/// 헤더 블록과 나머지 분리 (`\n\n` 또는 `\r\n\r\n`)
fn split_head(text: &str) -> Option<(&str, &str)> {
    let lf = text.find("\n\n").map(|i| (i, 2));
    let crlf = text.find("\r\n\r\n").map(|i| (i, 4));
    let (idx, sep) = match (lf, crlf) {
        (Some(a), Some(b)) => {
            if a.0 <= b.0 {
                a
            } else {
                b
            }
        }
        (Some(a), None) => a,
        (None, Some(b)) => b,
        (None, None) => {
            // 헤더 없는 프레임 (`COMMAND\n` + 본문 없음)
            let stripped = text.trim_end_matches('\0');
            if stripped.ends_with('\n') {
                return Some((stripped.trim_end_matches(['\r', '\n']), ""));
            }
            return None;
        }
    };
    Some((&text[..idx], &text[idx + sep..]))
}

fn escape_header(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            ':' => out.push_str("\\c"),
            other => out.push(other),
        }
    }
    out
}

fn unescape_header(value: &str) -> Result<String, CoreError> {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('c') => out.push(':'),
            other => {
                return Err(malformed(&format!(
                    "정의되지 않은 이스케이프: \\{}",
                    other.map(String::from).unwrap_or_default()
                )))
            }
        }
    }
    Ok(out)
}

fn malformed(reason: &str) -> CoreError {
    CoreError::Internal(format!("STOMP 프레임 파싱 실패: {reason}"))
}
