// Per-port counters and aggregated rate samples

use serde::{Deserialize, Serialize};
use std::fmt;

/// Traffic direction of an accounting rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Inbound,
    Outbound,
}

impl Direction {
    /// Chain the accounting rule for this direction lives in.
    pub fn chain(self) -> &'static str {
        match self {
            Direction::Inbound => "INPUT",
            Direction::Outbound => "OUTPUT",
        }
    }

    /// Rule match flag: inbound counts traffic to the port, outbound from it.
    pub fn port_flag(self) -> &'static str {
        match self {
            Direction::Inbound => "--dport",
            Direction::Outbound => "--sport",
        }
    }

    /// Row selector as printed by `iptables -L -n` (e.g. "tcp dpt:8080").
    pub fn row_selector(self, port: u16) -> String {
        match self {
            Direction::Inbound => format!("tcp dpt:{port}"),
            Direction::Outbound => format!("tcp spt:{port}"),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Inbound => f.write_str("inbound"),
            Direction::Outbound => f.write_str("outbound"),
        }
    }
}

/// Last observed cumulative byte counters for one tracked port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortCounter {
    pub port: u16,
    pub in_bytes: i64,
    pub out_bytes: i64,
}

impl PortCounter {
    pub fn new(port: u16) -> Self {
        Self {
            port,
            in_bytes: 0,
            out_bytes: 0,
        }
    }

    pub fn reset(&mut self) {
        self.in_bytes = 0;
        self.out_bytes = 0;
    }
}

/// Aggregated throughput of all tracked ports for one collection cycle (bytes/sec).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateSample {
    pub in_bytes: i64,
    pub out_bytes: i64,
    /// Unix seconds at capture time.
    pub timestamp: i64,
}

impl fmt::Display for RateSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "in_bytes: {}, out_bytes: {}, timestamp: {}",
            self.in_bytes, self.out_bytes, self.timestamp
        )
    }
}
