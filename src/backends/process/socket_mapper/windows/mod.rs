// Windows socket-to-PID mapping backends
//
// This module provides Windows-specific socket mapping implementations
// using GetExtendedTcpTable from IP Helper.

mod iphelper;

pub use iphelper::IpHelperSocketMapper;

use crate::backends::process::socket_mapper::SocketMapperBackend;
use crate::backends::{BackendInfo, BackendPriority};
use anyhow::Result;

/// Detect available socket mapper backends on Windows
pub fn detect_socket_mappers() -> Vec<BackendInfo> {
    vec![BackendInfo {
        name: "iphelper",
        priority: BackendPriority::Best,
        available: IpHelperSocketMapper::is_available(),
    }]
}

/// Select socket mapper backend for Windows
///
/// Currently only supports IP Helper API (iphelper).
pub fn select_socket_mapper(preference: Option<&str>) -> Result<Box<dyn SocketMapperBackend>> {
    match preference {
        Some("iphelper") | None => Ok(Box::new(IpHelperSocketMapper::new()?)),
        Some(name) => Err(anyhow::anyhow!("Unknown socket mapper: {}", name)),
    }
}
