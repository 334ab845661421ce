// Process utilities trait for platform-specific operations
//
// This module provides a platform-agnostic interface for process-related operations
// that vary across operating systems (Linux, macOS, Windows).

use anyhow::Result;
use std::collections::HashMap;
use std::net::IpAddr;
use std::path::PathBuf;

/// Platform-agnostic process utilities interface
pub trait ProcessUtils: Send + Sync {
    /// Get process name by PID
    fn get_process_name(&self, pid: i32) -> Result<String>;

    /// Get the executable path of a running process
    fn get_executable_path(&self, pid: i32) -> Result<PathBuf>;

    /// Get all running processes with their names and I/O counters
    fn get_all_processes(&self) -> Result<Vec<ProcessEntry>>;

    /// Get socket-to-PID mapping for TCP connections
    fn get_connection_map(&self) -> Result<ConnectionMap>;

    /// Forcefully terminate a process
    fn kill_process(&self, pid: i32) -> Result<()>;

    /// Refresh any cached system state (called once per sampling pass)
    fn refresh_caches(&self) {}
}

/// Process entry with PID, name and cumulative I/O transfer counters
#[derive(Debug, Clone)]
pub struct ProcessEntry {
    pub pid: i32,
    pub name: String,
    /// Process start time in platform units; distinguishes a reused PID
    pub start_time: u64,
    /// `None` when the counters could not be read (privileges, exit race)
    pub io: Option<IoCounters>,
}

/// Cumulative bytes moved through read/write calls (disk and network alike)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IoCounters {
    pub read_bytes: u64,
    pub write_bytes: u64,
}

/// TCP connection table with socket ownership
#[derive(Debug, Clone, Default)]
pub struct ConnectionMap {
    /// Socket inode -> (PID, process name) mapping
    pub socket_to_pid: HashMap<u64, (i32, String)>,
    /// TCP IPv4 connections
    pub tcp_connections: Vec<ConnectionEntry>,
    /// TCP IPv6 connections
    pub tcp6_connections: Vec<ConnectionEntry>,
}

impl ConnectionMap {
    /// All TCP connections, IPv4 first
    pub fn all_tcp(&self) -> impl Iterator<Item = &ConnectionEntry> {
        self.tcp_connections
            .iter()
            .chain(self.tcp6_connections.iter())
    }

    /// Resolve the owning process of a connection, if known
    pub fn owner_of(&self, entry: &ConnectionEntry) -> Option<(i32, &str)> {
        self.socket_to_pid
            .get(&entry.inode)
            .filter(|(pid, _)| *pid > 0)
            .map(|(pid, name)| (*pid, name.as_str()))
    }
}

/// Network connection entry
#[derive(Debug, Clone)]
pub struct ConnectionEntry {
    pub local_addr: IpAddr,
    pub local_port: u16,
    pub remote_addr: IpAddr,
    pub remote_port: u16,
    pub inode: u64,
    pub state: TcpState,
}

/// TCP connection state as reported by the system connection table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TcpState {
    Established,
    SynSent,
    SynRecv,
    FinWait1,
    FinWait2,
    TimeWait,
    Close,
    CloseWait,
    LastAck,
    Listen,
    Closing,
    DeleteTcb,
    Unknown,
}

impl TcpState {
    /// Parse a state label in either `Established` or `ESTABLISHED`/`TIME_WAIT` style
    pub fn from_label(label: &str) -> Self {
        let normalized: String = label
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .collect::<String>()
            .to_ascii_lowercase();

        match normalized.as_str() {
            "established" => TcpState::Established,
            "synsent" => TcpState::SynSent,
            "synrecv" | "synreceived" | "newsynrecv" => TcpState::SynRecv,
            "finwait1" => TcpState::FinWait1,
            "finwait2" => TcpState::FinWait2,
            "timewait" => TcpState::TimeWait,
            "close" | "closed" => TcpState::Close,
            "closewait" => TcpState::CloseWait,
            "lastack" => TcpState::LastAck,
            "listen" => TcpState::Listen,
            "closing" => TcpState::Closing,
            "deletetcb" => TcpState::DeleteTcb,
            _ => TcpState::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TcpState::Established => "ESTABLISHED",
            TcpState::SynSent => "SYN_SENT",
            TcpState::SynRecv => "SYN_RECV",
            TcpState::FinWait1 => "FIN_WAIT1",
            TcpState::FinWait2 => "FIN_WAIT2",
            TcpState::TimeWait => "TIME_WAIT",
            TcpState::Close => "CLOSED",
            TcpState::CloseWait => "CLOSE_WAIT",
            TcpState::LastAck => "LAST_ACK",
            TcpState::Listen => "LISTEN",
            TcpState::Closing => "CLOSING",
            TcpState::DeleteTcb => "DELETE_TCB",
            TcpState::Unknown => "UNKNOWN",
        }
    }
}

impl std::fmt::Display for TcpState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// Socket mapper backend system (cross-platform)
pub mod socket_mapper;

// Platform-specific implementations
#[cfg(target_os = "linux")]
mod linux;
#[cfg(target_os = "linux")]
pub use linux::LinuxProcessUtils;

#[cfg(not(target_os = "linux"))]
mod portable;
#[cfg(not(target_os = "linux"))]
pub use portable::SysinfoProcessUtils;

/// Factory function to create platform-specific ProcessUtils with custom socket mapper
pub fn create_process_utils_with_socket_mapper(
    socket_mapper_preference: Option<&str>,
) -> Box<dyn ProcessUtils> {
    #[cfg(target_os = "linux")]
    {
        Box::new(LinuxProcessUtils::with_socket_mapper(socket_mapper_preference))
    }

    #[cfg(not(target_os = "linux"))]
    {
        Box::new(SysinfoProcessUtils::with_socket_mapper(socket_mapper_preference))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tcp_state_labels() {
        assert_eq!(TcpState::from_label("Established"), TcpState::Established);
        assert_eq!(TcpState::from_label("TIME_WAIT"), TcpState::TimeWait);
        assert_eq!(TcpState::from_label("FinWait1"), TcpState::FinWait1);
        assert_eq!(TcpState::from_label("NewSynRecv"), TcpState::SynRecv);
        assert_eq!(TcpState::from_label("bogus"), TcpState::Unknown);
        assert_eq!(TcpState::CloseWait.to_string(), "CLOSE_WAIT");
    }

    #[test]
    fn test_owner_of_skips_unknown_and_pid_zero() {
        let entry = |inode| ConnectionEntry {
            local_addr: "10.0.0.2".parse().unwrap(),
            local_port: 50000,
            remote_addr: "8.8.8.8".parse().unwrap(),
            remote_port: 443,
            inode,
            state: TcpState::Established,
        };

        let mut map = ConnectionMap::default();
        map.socket_to_pid.insert(1, (100, "firefox".to_string()));
        map.socket_to_pid.insert(2, (0, "Idle".to_string()));

        assert_eq!(map.owner_of(&entry(1)), Some((100, "firefox")));
        assert_eq!(map.owner_of(&entry(2)), None);
        assert_eq!(map.owner_of(&entry(3)), None);
    }
}
