use std::fmt;
use std::str::FromStr;
use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};
use uuid::Uuid;

/// TTL stamped on every packet unless a producer overrides it
pub const DEFAULT_TTL: u8 = 64;

/// Transport or application protocol carried by a packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Protocol {
    Tcp,
    Udp,
    Icmp,
    Http,
    Https,
}

impl Protocol {
    pub const ALL: [Protocol; 5] = [
        Protocol::Tcp,
        Protocol::Udp,
        Protocol::Icmp,
        Protocol::Http,
        Protocol::Https,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Tcp => "TCP",
            Protocol::Udp => "UDP",
            Protocol::Icmp => "ICMP",
            Protocol::Http => "HTTP",
            Protocol::Https => "HTTPS",
        }
    }

    /// True for protocols that carry a request line as payload
    pub fn is_web(&self) -> bool {
        matches!(self, Protocol::Http | Protocol::Https)
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseProtocolError(String);

impl fmt::Display for ParseProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown protocol: {}", self.0)
    }
}

impl std::error::Error for ParseProtocolError {}

impl FromStr for Protocol {
    type Err = ParseProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Protocol::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ParseProtocolError(s.to_string()))
    }
}

/// TCP control flag recorded on a packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TcpFlag {
    Syn,
    Ack,
    Fin,
    Rst,
    Psh,
    Urg,
}

impl TcpFlag {
    pub const ALL: [TcpFlag; 6] = [
        TcpFlag::Syn,
        TcpFlag::Ack,
        TcpFlag::Fin,
        TcpFlag::Rst,
        TcpFlag::Psh,
        TcpFlag::Urg,
    ];
}

/// A captured (or synthesized) network packet.
/// Records are immutable once handed to the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Packet {
    /// Unique identifier, e.g. "pkt_01890a5d-ac96-774b-bcce-b302099a8057"
    pub id: String,

    pub source_ip: String,

    pub destination_ip: String,

    pub protocol: Protocol,

    /// Destination port, never 0
    pub port: u16,

    /// Size on the wire in bytes
    pub size: u32,

    /// Creation time, assigned once
    pub timestamp: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<u8>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flags: Option<TcpFlag>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
}

impl Packet {
    /// Build a packet stamped with a fresh id and the current time.
    /// TTL and flags start at their producer defaults (64, SYN).
    ///
    /// `port` must be non-zero and `size` at least 1; debug builds assert both.
    pub fn new(
        source_ip: impl Into<String>,
        destination_ip: impl Into<String>,
        protocol: Protocol,
        port: u16,
        size: u32,
    ) -> Self {
        debug_assert!(port != 0, "packet port must be in 1..=65535");
        debug_assert!(size >= 1, "packet size must be at least 1 byte");

        Self {
            id: generate_packet_id(),
            source_ip: source_ip.into(),
            destination_ip: destination_ip.into(),
            protocol,
            port,
            size,
            timestamp: Utc::now(),
            ttl: Some(DEFAULT_TTL),
            flags: Some(TcpFlag::Syn),
            payload: None,
        }
    }
}

/// UUIDv7 ids sort by creation time and never collide within a process.
fn generate_packet_id() -> String {
    format!("pkt_{}", Uuid::now_v7())
}

/// Query descriptor. Unset fields match everything; `limit == 0` disables pagination.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PacketFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<Protocol>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_ip: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_ip: Option<String>,

    /// Inclusive lower bound on the packet timestamp
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<DateTime<Utc>>,

    /// Inclusive upper bound on the packet timestamp
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<DateTime<Utc>>,

    #[serde(default)]
    pub limit: usize,

    #[serde(default)]
    pub offset: usize,
}

impl PacketFilter {
    pub fn matches(&self, packet: &Packet) -> bool {
        if let Some(protocol) = self.protocol {
            if packet.protocol != protocol {
                return false;
            }
        }

        if let Some(source_ip) = non_empty(&self.source_ip) {
            if packet.source_ip != source_ip {
                return false;
            }
        }

        if let Some(destination_ip) = non_empty(&self.destination_ip) {
            if packet.destination_ip != destination_ip {
                return false;
            }
        }

        if self.from.is_some_and(|from| packet.timestamp < from) {
            return false;
        }

        if self.to.is_some_and(|to| packet.timestamp > to) {
            return false;
        }

        true
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}

/// Result of a packet query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PacketResponse {
    pub packets: Vec<Packet>,

    /// Number of matches before pagination
    pub total: usize,

    /// When the snapshot was taken
    pub timestamp: DateTime<Utc>,
}

/// Point-in-time summary of the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stats {
    pub total_packets: usize,
    pub capacity: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oldest_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub newest_at: Option<DateTime<Utc>>,
}
