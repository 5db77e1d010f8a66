//! Quake3-style `getstatus` query against the game server.
//!
//! The reply is one datagram: a header line, a backslash-separated info
//! string, then one `score ping "name"` line per player. Parsing is
//! best-effort; anything that does not fit is skipped rather than rejected.

use indexmap::IndexMap;
use serde::Serialize;
use std::time::Duration;
use tokio::net::UdpSocket;
use tracing::debug;

pub const STATUS_QUERY: &[u8] = b"\xff\xff\xff\xffgetstatus\n";
pub const QUERY_TIMEOUT: Duration = Duration::from_millis(1500);

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ServerStatus {
    pub online: bool,
    /// Info keys in the order the server sent them.
    pub info: IndexMap<String, String>,
    pub players: Vec<Player>,
    pub raw: String,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Player {
    pub score: i64,
    pub ping: i64,
    pub name: String,
}

/// Sends one status query to `host:port` and parses the reply.
///
/// Network failures and timeouts are reported in `error`, never returned.
pub async fn query_server(host: &str, port: u16) -> ServerStatus {
    match tokio::time::timeout(QUERY_TIMEOUT, exchange(host, port)).await {
        Ok(Ok(data)) => parse_response(&data),
        Ok(Err(e)) => ServerStatus {
            error: e.to_string(),
            ..Default::default()
        },
        Err(_) => ServerStatus {
            error: "timed out".to_string(),
            ..Default::default()
        },
    }
}

async fn exchange(host: &str, port: u16) -> std::io::Result<Vec<u8>> {
    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    socket.send_to(STATUS_QUERY, (host, port)).await?;

    let mut buf = vec![0u8; 65535];
    let (len, from) = socket.recv_from(&mut buf).await?;
    debug!("Received {} byte status reply from {}", len, from);
    buf.truncate(len);
    Ok(buf)
}

/// Latin-1: every byte maps to the code point of the same value.
fn decode_latin1(data: &[u8]) -> String {
    data.iter().map(|&b| char::from(b)).collect()
}

pub fn parse_response(data: &[u8]) -> ServerStatus {
    let text = decode_latin1(data);
    let lines: Vec<&str> = text.split('\n').collect();

    if lines.len() < 2 {
        return ServerStatus {
            raw: text.clone(),
            error: "Unexpected response".to_string(),
            ..Default::default()
        };
    }

    let info = parse_info_string(lines[1]);
    let players = lines[2..]
        .iter()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| parse_player_line(line))
        .collect();

    ServerStatus {
        online: true,
        info,
        players,
        raw: text,
        error: String::new(),
    }
}

/// Parses `\key\value\key\value`; a dangling key without value is dropped.
pub fn parse_info_string(info: &str) -> IndexMap<String, String> {
    let mut parts: Vec<&str> = info.split('\\').collect();
    if parts.first() == Some(&"") {
        parts.remove(0);
    }

    parts
        .chunks_exact(2)
        .map(|pair| (pair[0].to_string(), pair[1].to_string()))
        .collect()
}

pub fn parse_player_line(line: &str) -> Option<Player> {
    let mut parts = line.trim().splitn(3, ' ');
    let score = parts.next()?;
    let ping = parts.next()?;
    let rest = parts.next()?;

    let name = match (rest.find('"'), rest.rfind('"')) {
        (Some(first), Some(last)) if last > first + 1 => &rest[first + 1..last],
        _ => rest,
    };

    Some(Player {
        score: score.parse().unwrap_or(0),
        ping: ping.parse().unwrap_or(0),
        name: name.to_string(),
    })
}
