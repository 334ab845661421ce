// Cross-platform socket-to-PID mapping backend system
//
// This module provides a trait-based abstraction for socket-to-PID mapping
// that works across different operating systems:
// - Linux: procfs (/proc/net/tcp, /proc/[pid]/fd)
// - Windows: IP Helper (GetExtendedTcpTable)

use super::ConnectionMap;
use crate::backends::BackendPriority;
use anyhow::Result;

/// Cross-platform socket-to-PID mapping backend trait
///
/// This trait abstracts the platform-specific mechanisms for determining
/// which process owns which TCP connection.
pub trait SocketMapperBackend: Send + Sync {
    /// Backend name (e.g., "procfs", "iphelper")
    fn name(&self) -> &'static str;

    /// Backend priority for auto-selection
    fn priority(&self) -> BackendPriority;

    /// Check if this backend is available on the current system
    fn is_available() -> bool
    where
        Self: Sized;

    /// Get complete socket-to-PID connection map
    fn get_connection_map(&self) -> Result<ConnectionMap>;
}

// Platform-specific modules
#[cfg(target_os = "linux")]
pub mod linux;

#[cfg(target_os = "windows")]
pub mod windows;

// Platform-specific re-exports and functions
#[cfg(target_os = "linux")]
pub use linux::{detect_socket_mappers, select_socket_mapper};

#[cfg(target_os = "windows")]
pub use windows::{detect_socket_mappers, select_socket_mapper};

/// No socket mapper backends on this platform
#[cfg(not(any(target_os = "linux", target_os = "windows")))]
pub fn detect_socket_mappers() -> Vec<crate::backends::BackendInfo> {
    Vec::new()
}

#[cfg(not(any(target_os = "linux", target_os = "windows")))]
pub fn select_socket_mapper(_preference: Option<&str>) -> Result<Box<dyn SocketMapperBackend>> {
    Err(anyhow::anyhow!("No socket mapper backends available on this platform"))
}
