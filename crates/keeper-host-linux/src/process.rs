//! Process inspection and termination

use keeper_api::RunningProcess;
use keeper_host_api::{matches_pattern, HostError, HostResult, ProcessInspector};
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::sync::Mutex;
use sysinfo::{ProcessesToUpdate, System};
use tracing::debug;

/// [`ProcessInspector`] backed by the live process table
pub struct SysinfoInspector {
    system: Mutex<System>,
    own_pid: u32,
}

impl SysinfoInspector {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
            own_pid: std::process::id(),
        }
    }
}

impl Default for SysinfoInspector {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessInspector for SysinfoInspector {
    fn find(&self, pattern: &str) -> HostResult<Vec<RunningProcess>> {
        let mut system = self
            .system
            .lock()
            .map_err(|_| HostError::Internal("process table mutex poisoned".into()))?;
        system.refresh_processes(ProcessesToUpdate::All, true);

        let mut found: Vec<RunningProcess> = system
            .processes()
            .iter()
            .filter_map(|(pid, process)| {
                let name = process.name().to_string_lossy();
                if !matches_pattern(&name, pattern) {
                    return None;
                }
                Some(RunningProcess {
                    name: name.into_owned(),
                    pid: pid.as_u32(),
                    exe: process.exe().map(|p| p.display().to_string()),
                })
            })
            .filter(|p| p.pid != self.own_pid)
            .collect();
        found.sort_by_key(|p| p.pid);

        debug!(pattern = %pattern, count = found.len(), "Process lookup");
        Ok(found)
    }

    fn kill(&self, pid: u32) -> HostResult<()> {
        // Never init, the kernel, or ourselves
        if pid <= 1 || pid == self.own_pid {
            return Err(HostError::PermissionDenied(format!(
                "refusing to terminate pid {}",
                pid
            )));
        }
        let raw = i32::try_from(pid)
            .map_err(|_| HostError::Internal(format!("pid {} out of range", pid)))?;

        match signal::kill(Pid::from_raw(raw), Signal::SIGKILL) {
            Ok(()) => {
                debug!(pid, "Sent SIGKILL");
                Ok(())
            }
            Err(nix::errno::Errno::ESRCH) => Err(HostError::ProcessNotFound(pid)),
            Err(nix::errno::Errno::EPERM) => {
                Err(HostError::PermissionDenied(format!("pid {}", pid)))
            }
            Err(e) => Err(HostError::Internal(format!(
                "Failed to send SIGKILL to {}: {}",
                pid, e
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command;

    #[test]
    fn refuses_protected_pids() {
        let inspector = SysinfoInspector::new();
        assert!(matches!(
            inspector.kill(1),
            Err(HostError::PermissionDenied(_))
        ));
        assert!(matches!(
            inspector.kill(std::process::id()),
            Err(HostError::PermissionDenied(_))
        ));
    }

    #[test]
    fn find_and_kill_child() {
        let mut child = Command::new("sleep").arg("60").spawn().unwrap();
        let pid = child.id();

        let inspector = SysinfoInspector::new();
        let found = inspector.find("sleep").unwrap();
        assert!(found.iter().any(|p| p.pid == pid));

        inspector.kill(pid).unwrap();
        let status = child.wait().unwrap();
        assert!(!status.success());
    }

    #[test]
    fn empty_pattern_finds_nothing() {
        let inspector = SysinfoInspector::new();
        assert!(inspector.find("  ").unwrap().is_empty());
    }
}
