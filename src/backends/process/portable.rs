// sysinfo-backed ProcessUtils for Windows and macOS
//
// On Windows sysinfo's disk usage counters come from GetProcessIoCounters,
// i.e. the read/write transfer counts that include socket traffic.

use super::socket_mapper::{SocketMapperBackend, select_socket_mapper};
use super::{ConnectionMap, IoCounters, ProcessEntry, ProcessUtils};
use anyhow::Result;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use sysinfo::{Pid, System};

pub struct SysinfoProcessUtils {
    socket_mapper: Option<Box<dyn SocketMapperBackend>>,
    // Cached System instance - refreshed once per sampling pass.
    // System::new_all() costs 10-20ms, far too much to pay per lookup.
    cached_system: Arc<Mutex<System>>,
}

impl SysinfoProcessUtils {
    pub fn new() -> Self {
        Self::with_socket_mapper(None)
    }

    pub fn with_socket_mapper(socket_mapper_preference: Option<&str>) -> Self {
        let socket_mapper = match select_socket_mapper(socket_mapper_preference) {
            Ok(mapper) => {
                log::debug!("Using socket mapper backend: {}", mapper.name());
                Some(mapper)
            }
            Err(e) => {
                log::warn!("Connection sampling disabled: {}", e);
                None
            }
        };

        let cached_system = Arc::new(Mutex::new(System::new_all()));
        log::debug!("Created cached System instance for SysinfoProcessUtils");

        Self {
            socket_mapper,
            cached_system,
        }
    }

    fn system(&self) -> MutexGuard<'_, System> {
        self.cached_system
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for SysinfoProcessUtils {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessUtils for SysinfoProcessUtils {
    fn get_process_name(&self, pid: i32) -> Result<String> {
        let sys = self.system();
        sys.process(Pid::from_u32(pid as u32))
            .map(|p| p.name().to_str().unwrap_or("unknown").to_string())
            .ok_or_else(|| anyhow::anyhow!("Process {} not found", pid))
    }

    fn get_executable_path(&self, pid: i32) -> Result<PathBuf> {
        let mut sys = self.system();
        sys.refresh_all();
        sys.process(Pid::from_u32(pid as u32))
            .and_then(|p| p.exe())
            .map(|path| path.to_path_buf())
            .ok_or_else(|| anyhow::anyhow!("Could not resolve executable path for PID {}", pid))
    }

    fn get_all_processes(&self) -> Result<Vec<ProcessEntry>> {
        let sys = self.system();

        let entries = sys
            .processes()
            .iter()
            .map(|(pid, proc)| {
                let usage = proc.disk_usage();
                ProcessEntry {
                    pid: pid.as_u32() as i32,
                    name: proc.name().to_str().unwrap_or("unknown").to_string(),
                    start_time: proc.start_time(),
                    io: Some(IoCounters {
                        read_bytes: usage.total_read_bytes,
                        write_bytes: usage.total_written_bytes,
                    }),
                }
            })
            .collect();

        Ok(entries)
    }

    fn get_connection_map(&self) -> Result<ConnectionMap> {
        match &self.socket_mapper {
            Some(mapper) => mapper.get_connection_map(),
            None => Err(anyhow::anyhow!("No socket mapper available")),
        }
    }

    fn kill_process(&self, pid: i32) -> Result<()> {
        let mut sys = self.system();
        sys.refresh_all();
        let process = sys
            .process(Pid::from_u32(pid as u32))
            .ok_or_else(|| anyhow::anyhow!("Process {} not found", pid))?;

        if !process.kill() {
            anyhow::bail!("Failed to kill PID {}", pid);
        }
        log::info!("Killed PID {}", pid);
        Ok(())
    }

    fn refresh_caches(&self) {
        self.system().refresh_all();
    }
}
