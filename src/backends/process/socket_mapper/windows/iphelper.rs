// Windows IP Helper API-based socket mapper
//
// This backend uses Windows IP Helper API (iphlpapi.dll) to enumerate
// TCP connections with their owning process IDs.
//
// Uses GetExtendedTcpTable with TCP_TABLE_OWNER_PID_ALL, which is available
// on Windows XP SP2 and later.

use crate::backends::BackendPriority;
use crate::backends::process::socket_mapper::SocketMapperBackend;
use crate::backends::process::{ConnectionEntry, ConnectionMap, TcpState};
use anyhow::Result;
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use windows::Win32::Foundation::NO_ERROR;
use windows::Win32::NetworkManagement::IpHelper::{
    GetExtendedTcpTable, MIB_TCP6ROW_OWNER_PID, MIB_TCP6TABLE_OWNER_PID, MIB_TCPROW_OWNER_PID,
    MIB_TCPTABLE_OWNER_PID, TCP_TABLE_OWNER_PID_ALL,
};
use windows::Win32::Networking::WinSock::{AF_INET, AF_INET6};

/// Socket mapper using Windows IP Helper API
///
/// The owner-PID TCP tables are the same source netstat -ano and Task
/// Manager use. Windows has no socket inodes, so each connection gets a
/// synthetic inode derived from its endpoint tuple.
pub struct IpHelperSocketMapper;

impl IpHelperSocketMapper {
    pub fn new() -> Result<Self> {
        if !Self::is_available() {
            anyhow::bail!("IP Helper API not available");
        }
        Ok(Self)
    }
}

impl SocketMapperBackend for IpHelperSocketMapper {
    fn name(&self) -> &'static str {
        "iphelper"
    }

    fn priority(&self) -> BackendPriority {
        BackendPriority::Best
    }

    fn is_available() -> bool {
        cfg!(target_os = "windows")
    }

    fn get_connection_map(&self) -> Result<ConnectionMap> {
        let mut socket_to_pid = HashMap::new();
        let mut tcp_connections = Vec::new();
        let mut tcp6_connections = Vec::new();

        match get_tcp_table() {
            Ok(rows) => {
                for entry in rows {
                    let inode = create_synthetic_inode(&entry);
                    // Names are resolved by the caller through its process cache
                    socket_to_pid.insert(inode, (entry.pid, String::new()));
                    tcp_connections.push(entry.into_connection(inode));
                }
            }
            Err(e) => log::debug!("IPv4 TCP table unavailable: {}", e),
        }

        match get_tcp6_table() {
            Ok(rows) => {
                for entry in rows {
                    let inode = create_synthetic_inode(&entry);
                    socket_to_pid.insert(inode, (entry.pid, String::new()));
                    tcp6_connections.push(entry.into_connection(inode));
                }
            }
            Err(e) => log::debug!("IPv6 TCP table unavailable: {}", e),
        }

        Ok(ConnectionMap {
            socket_to_pid,
            tcp_connections,
            tcp6_connections,
        })
    }
}

// Internal row representation shared by the IPv4 and IPv6 tables

struct TcpEntry {
    local_addr: IpAddr,
    local_port: u16,
    remote_addr: IpAddr,
    remote_port: u16,
    state: TcpState,
    pid: i32,
}

impl TcpEntry {
    fn into_connection(self, inode: u64) -> ConnectionEntry {
        ConnectionEntry {
            local_addr: self.local_addr,
            local_port: self.local_port,
            remote_addr: self.remote_addr,
            remote_port: self.remote_port,
            inode,
            state: self.state,
        }
    }
}

/// Ports are stored in network byte order in the low 16 bits
fn port_from_dword(port: u32) -> u16 {
    u16::from_be(port as u16)
}

/// MIB_TCP_STATE values
fn state_from_mib(state: u32) -> TcpState {
    match state {
        1 => TcpState::Close,
        2 => TcpState::Listen,
        3 => TcpState::SynSent,
        4 => TcpState::SynRecv,
        5 => TcpState::Established,
        6 => TcpState::FinWait1,
        7 => TcpState::FinWait2,
        8 => TcpState::CloseWait,
        9 => TcpState::Closing,
        10 => TcpState::LastAck,
        11 => TcpState::TimeWait,
        12 => TcpState::DeleteTcb,
        _ => TcpState::Unknown,
    }
}

/// Fetch the raw owner-PID TCP table for an address family
///
/// The buffer is u32-backed so the row structs read from it stay aligned.
fn read_table(family: u32) -> Result<Vec<u32>> {
    unsafe {
        // First call to get buffer size
        let mut size: u32 = 0;
        let _ = GetExtendedTcpTable(None, &mut size, false, family, TCP_TABLE_OWNER_PID_ALL, 0);

        if size == 0 {
            return Ok(Vec::new());
        }

        // Allocate buffer and get actual data
        let mut buffer = vec![0u32; (size as usize).div_ceil(4)];
        let result = GetExtendedTcpTable(
            Some(buffer.as_mut_ptr() as *mut _),
            &mut size,
            false,
            family,
            TCP_TABLE_OWNER_PID_ALL,
            0,
        );

        if result != NO_ERROR.0 {
            anyhow::bail!("GetExtendedTcpTable failed with error code: {}", result);
        }

        Ok(buffer)
    }
}

fn get_tcp_table() -> Result<Vec<TcpEntry>> {
    let buffer = read_table(AF_INET.0 as u32)?;
    if buffer.is_empty() {
        return Ok(Vec::new());
    }

    let rows: &[MIB_TCPROW_OWNER_PID] = unsafe {
        let table = &*(buffer.as_ptr() as *const MIB_TCPTABLE_OWNER_PID);
        std::slice::from_raw_parts(table.table.as_ptr(), table.dwNumEntries as usize)
    };

    Ok(rows
        .iter()
        .map(|row| TcpEntry {
            local_addr: IpAddr::V4(Ipv4Addr::from(u32::from_be(row.dwLocalAddr))),
            local_port: port_from_dword(row.dwLocalPort),
            remote_addr: IpAddr::V4(Ipv4Addr::from(u32::from_be(row.dwRemoteAddr))),
            remote_port: port_from_dword(row.dwRemotePort),
            state: state_from_mib(row.dwState),
            pid: row.dwOwningPid as i32,
        })
        .collect())
}

fn get_tcp6_table() -> Result<Vec<TcpEntry>> {
    let buffer = read_table(AF_INET6.0 as u32)?;
    if buffer.is_empty() {
        return Ok(Vec::new());
    }

    let rows: &[MIB_TCP6ROW_OWNER_PID] = unsafe {
        let table = &*(buffer.as_ptr() as *const MIB_TCP6TABLE_OWNER_PID);
        std::slice::from_raw_parts(table.table.as_ptr(), table.dwNumEntries as usize)
    };

    Ok(rows
        .iter()
        .map(|row| TcpEntry {
            local_addr: IpAddr::V6(Ipv6Addr::from(row.ucLocalAddr)),
            local_port: port_from_dword(row.dwLocalPort),
            remote_addr: IpAddr::V6(Ipv6Addr::from(row.ucRemoteAddr)),
            remote_port: port_from_dword(row.dwRemotePort),
            state: state_from_mib(row.dwState),
            pid: row.dwOwningPid as i32,
        })
        .collect())
}

/// Create a synthetic inode from connection tuple
/// Windows doesn't have socket inodes, so we create a deterministic hash
fn create_synthetic_inode(entry: &TcpEntry) -> u64 {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    let mut hasher = DefaultHasher::new();
    entry.local_addr.hash(&mut hasher);
    entry.local_port.hash(&mut hasher);
    entry.remote_addr.hash(&mut hasher);
    entry.remote_port.hash(&mut hasher);
    hasher.finish()
}
