use chrono::{DateTime, Local};
use std::net::IpAddr;
use std::sync::OnceLock;

use crate::backends::process::TcpState;

/// Aggregate rates of the sampled network interface
#[derive(Debug, Clone, PartialEq)]
pub struct InterfaceSample {
    /// Interface the rates were measured on; `None` when none qualified
    pub interface: Option<String>,
    pub download_bytes_per_sec: f64,
    pub upload_bytes_per_sec: f64,
    pub sampled_at: DateTime<Local>,
}

impl InterfaceSample {
    pub fn zero(interface: Option<String>) -> Self {
        Self {
            interface,
            download_bytes_per_sec: 0.0,
            upload_bytes_per_sec: 0.0,
            sampled_at: Local::now(),
        }
    }
}

/// Estimated network rate of a single process for one tick
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessSample {
    pub pid: i32,
    pub name: String,
    pub download_bytes_per_sec: f64,
    pub upload_bytes_per_sec: f64,
}

impl ProcessSample {
    pub fn idle(pid: i32, name: String) -> Self {
        Self {
            pid,
            name,
            download_bytes_per_sec: 0.0,
            upload_bytes_per_sec: 0.0,
        }
    }
}

/// One TCP connection of a process
///
/// Records are shared as `Arc<ConnectionRecord>` so a hostname lookup can
/// finish after the record has left the visible set; the late write lands
/// in the `OnceLock` and nobody reads it.
#[derive(Debug)]
pub struct ConnectionRecord {
    pub remote_addr: IpAddr,
    pub remote_port: u16,
    pub local_port: u16,
    pub state: TcpState,
    pub protocol: &'static str,
    remote_hostname: OnceLock<String>,
}

impl ConnectionRecord {
    pub fn new(remote_addr: IpAddr, remote_port: u16, local_port: u16, state: TcpState) -> Self {
        Self {
            remote_addr,
            remote_port,
            local_port,
            state,
            protocol: "TCP",
            remote_hostname: OnceLock::new(),
        }
    }

    pub fn remote_hostname(&self) -> Option<&str> {
        self.remote_hostname.get().map(String::as_str)
    }

    /// Record the resolved hostname; only the first write sticks
    pub fn set_remote_hostname(&self, hostname: String) -> bool {
        self.remote_hostname.set(hostname).is_ok()
    }

    /// Same endpoint and state as another connection, ignoring the hostname
    pub fn same_connection(&self, other: &ConnectionRecord) -> bool {
        self.remote_addr == other.remote_addr
            && self.remote_port == other.remote_port
            && self.local_port == other.local_port
            && self.state == other.state
    }

    /// `addr:port`, bracketing IPv6 addresses
    pub fn remote_endpoint(&self) -> String {
        match self.remote_addr {
            IpAddr::V4(ip) => format!("{}:{}", ip, self.remote_port),
            IpAddr::V6(ip) => format!("[{}]:{}", ip, self.remote_port),
        }
    }

    /// `host (addr:port)` once resolved, plain `addr:port` before
    pub fn display_text(&self) -> String {
        match self.remote_hostname() {
            Some(host) => format!("{} ({})", host, self.remote_endpoint()),
            None => self.remote_endpoint(),
        }
    }
}

/// All TCP connections owned by one process
#[derive(Debug, Clone)]
pub struct ProcessConnections {
    pub pid: i32,
    pub name: String,
    pub connections: Vec<std::sync::Arc<ConnectionRecord>>,
    /// Presentation flag, survives reconciliation
    pub expanded: bool,
}

impl ProcessConnections {
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }
}

/// Format a byte rate with binary units, e.g. `1.5 KB/s`
pub fn format_rate(bytes_per_sec: f64) -> String {
    const UNITS: [&str; 4] = ["B/s", "KB/s", "MB/s", "GB/s"];

    let mut speed = bytes_per_sec;
    let mut order = 0;
    while speed >= 1024.0 && order < UNITS.len() - 1 {
        order += 1;
        speed /= 1024.0;
    }

    let fixed = format!("{:.2}", speed);
    let trimmed = fixed.trim_end_matches('0').trim_end_matches('.');
    format!("{} {}", trimmed, UNITS[order])
}
