// Linux procfs-based socket mapper

use super::super::SocketMapperBackend;
use crate::backends::BackendPriority;
use crate::backends::process::{ConnectionEntry, ConnectionMap, TcpState};
use anyhow::Result;
use procfs::net::TcpNetEntry;
use procfs::process::{FDTarget, all_processes};
use std::collections::HashMap;

/// Socket mapper using Linux /proc filesystem
///
/// This backend reads socket information from:
/// - /proc/[pid]/fd/ - for socket inodes
/// - /proc/net/tcp - for TCP IPv4 connections
/// - /proc/net/tcp6 - for TCP IPv6 connections
///
/// Sockets owned by processes we cannot inspect (other users without
/// CAP_SYS_PTRACE) stay unmapped and their connections are dropped upstream.
pub struct ProcfsSocketMapper;

impl ProcfsSocketMapper {
    pub fn new() -> Result<Self> {
        if !Self::is_available() {
            anyhow::bail!("procfs not available (is /proc mounted?)");
        }
        Ok(Self)
    }
}

impl SocketMapperBackend for ProcfsSocketMapper {
    fn name(&self) -> &'static str {
        "procfs"
    }

    fn priority(&self) -> BackendPriority {
        BackendPriority::Best
    }

    fn is_available() -> bool {
        std::path::Path::new("/proc/net/tcp").exists()
    }

    fn get_connection_map(&self) -> Result<ConnectionMap> {
        let mut socket_to_pid = HashMap::new();

        // Build socket inode -> PID map by scanning all processes
        for process in all_processes()?.flatten() {
            let pid = process.pid();
            let name = match process.stat() {
                Ok(stat) => stat.comm,
                Err(_) => format!("PID {}", pid),
            };

            if let Ok(fds) = process.fd() {
                for fd_info in fds.flatten() {
                    if let FDTarget::Socket(inode) = fd_info.target {
                        socket_to_pid.insert(inode, (pid, name.clone()));
                    }
                }
            }
        }

        let tcp_connections = match procfs::net::tcp() {
            Ok(entries) => entries.iter().map(to_connection_entry).collect(),
            Err(e) => {
                log::debug!("Failed to read /proc/net/tcp: {}", e);
                Vec::new()
            }
        };

        let tcp6_connections = match procfs::net::tcp6() {
            Ok(entries) => entries.iter().map(to_connection_entry).collect(),
            Err(e) => {
                log::debug!("Failed to read /proc/net/tcp6: {}", e);
                Vec::new()
            }
        };

        Ok(ConnectionMap {
            socket_to_pid,
            tcp_connections,
            tcp6_connections,
        })
    }
}

fn to_connection_entry(entry: &TcpNetEntry) -> ConnectionEntry {
    ConnectionEntry {
        local_addr: entry.local_address.ip(),
        local_port: entry.local_address.port(),
        remote_addr: entry.remote_address.ip(),
        remote_port: entry.remote_address.port(),
        inode: entry.inode,
        state: TcpState::from_label(&format!("{:?}", entry.state)),
    }
}
