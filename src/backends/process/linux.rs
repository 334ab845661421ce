// Linux-specific process utilities using procfs

use super::socket_mapper::{SocketMapperBackend, select_socket_mapper};
use super::{ConnectionMap, IoCounters, ProcessEntry, ProcessUtils};
use anyhow::{Context, Result};
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use procfs::process::{Process, all_processes};
use std::path::PathBuf;

/// Linux process utilities with pluggable socket mapping
pub struct LinuxProcessUtils {
    socket_mapper: Option<Box<dyn SocketMapperBackend>>,
}

impl LinuxProcessUtils {
    pub fn new() -> Self {
        Self::with_socket_mapper(None)
    }

    /// Create with a specific socket mapper backend
    pub fn with_socket_mapper(backend_name: Option<&str>) -> Self {
        let socket_mapper = match select_socket_mapper(backend_name) {
            Ok(mapper) => {
                log::debug!("Using socket mapper backend: {}", mapper.name());
                Some(mapper)
            }
            Err(e) => {
                log::warn!("Connection sampling disabled: {}", e);
                None
            }
        };

        Self { socket_mapper }
    }
}

impl Default for LinuxProcessUtils {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessUtils for LinuxProcessUtils {
    fn get_process_name(&self, pid: i32) -> Result<String> {
        std::fs::read_to_string(format!("/proc/{}/comm", pid))
            .map(|s| s.trim().to_string())
            .with_context(|| format!("Process {} not found", pid))
    }

    fn get_executable_path(&self, pid: i32) -> Result<PathBuf> {
        Process::new(pid)
            .and_then(|process| process.exe())
            .with_context(|| format!("Could not resolve executable path for PID {}", pid))
    }

    fn get_all_processes(&self) -> Result<Vec<ProcessEntry>> {
        let mut entries = Vec::new();

        for process in all_processes()?.flatten() {
            let pid = process.pid();

            // Exited between listing and stat: skip like any other race
            let Ok(stat) = process.stat() else {
                continue;
            };

            // /proc/[pid]/io is only readable by the owner (or with ptrace rights)
            let io = process.io().ok().map(|io| IoCounters {
                read_bytes: io.rchar,
                write_bytes: io.wchar,
            });

            entries.push(ProcessEntry {
                pid,
                name: stat.comm,
                start_time: stat.starttime,
                io,
            });
        }

        Ok(entries)
    }

    fn get_connection_map(&self) -> Result<ConnectionMap> {
        // Delegate to pluggable socket mapper backend
        match &self.socket_mapper {
            Some(mapper) => mapper.get_connection_map(),
            None => Err(anyhow::anyhow!("No socket mapper available")),
        }
    }

    fn kill_process(&self, pid: i32) -> Result<()> {
        kill(Pid::from_raw(pid), Signal::SIGKILL)
            .with_context(|| format!("Failed to kill PID {}", pid))?;
        log::info!("Sent SIGKILL to PID {}", pid);
        Ok(())
    }
}
