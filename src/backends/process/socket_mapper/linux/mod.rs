// Linux socket mapper backends

mod procfs;

pub use self::procfs::ProcfsSocketMapper;

use super::SocketMapperBackend;
use crate::backends::{BackendInfo, BackendPriority};
use anyhow::Result;

/// Detect all available socket mapper backends on Linux
pub fn detect_socket_mappers() -> Vec<BackendInfo> {
    vec![BackendInfo {
        name: "procfs",
        priority: BackendPriority::Best,
        available: ProcfsSocketMapper::is_available(),
    }]
}

/// Select socket mapper backend for Linux
pub fn select_socket_mapper(preference: Option<&str>) -> Result<Box<dyn SocketMapperBackend>> {
    match preference {
        Some("procfs") | None => {
            if ProcfsSocketMapper::is_available() {
                Ok(Box::new(ProcfsSocketMapper::new()?))
            } else {
                Err(anyhow::anyhow!("No socket mapper backends available on Linux"))
            }
        }
        Some(name) => Err(anyhow::anyhow!("Unknown socket mapper: {}", name)),
    }
}
