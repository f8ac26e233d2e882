//! Tracked child processes and the on-disk PID registry.
//!
//! Every child the pipeline spawns is recorded in a registry directory as
//! `<pid>.pid` containing the command marker. Reaping reads only this
//! registry and verifies the recorded marker against `/proc/<pid>/cmdline`
//! before signalling, so an unrelated process that reused the PID is never
//! touched. A prior aborted run leaves its entries behind; the next run
//! reclaims the devices by reaping them at startup.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus};
use std::time::{Duration, Instant};
use stereo_core::CaptureError;

/// Registry of child PIDs recorded at spawn time.
#[derive(Debug)]
pub struct PidRegistry {
    dir: PathBuf,
}

fn process_alive(pid: i32) -> bool {
    // Signal 0 probes existence without delivering anything.
    unsafe { libc::kill(pid, 0) == 0 }
}

fn cmdline_contains(pid: i32, marker: &str) -> bool {
    match fs::read(format!("/proc/{pid}/cmdline")) {
        Ok(raw) => String::from_utf8_lossy(&raw).contains(marker),
        Err(_) => false,
    }
}

impl PidRegistry {
    pub fn open(dir: &Path) -> std::io::Result<Self> {
        fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, pid: u32) -> PathBuf {
        self.dir.join(format!("{pid}.pid"))
    }

    /// Spawn `cmd` and record its PID with `marker` (the command name used
    /// for identity verification at reap time).
    pub fn spawn_tracked(
        &self,
        cmd: &mut Command,
        marker: &str,
    ) -> Result<TrackedChild, CaptureError> {
        let child = cmd.spawn()?;
        let entry = self.entry_path(child.id());
        fs::write(&entry, marker)?;
        log::debug!("tracked child {} ({marker})", child.id());
        Ok(TrackedChild { child, entry })
    }

    /// Kill every recorded child that is still alive and matches its
    /// recorded marker; drop stale entries whose PID died or was reused.
    ///
    /// Returns the number of processes reaped. A live matching process that
    /// survives SIGKILL means the device cannot be reclaimed:
    /// [`CaptureError::DeviceLocked`].
    pub fn reap_orphans(&self) -> Result<usize, CaptureError> {
        let mut reaped = 0;
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            let Some(pid) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse::<i32>().ok())
            else {
                continue;
            };
            let marker = fs::read_to_string(&path).unwrap_or_default();

            if !process_alive(pid) {
                fs::remove_file(&path).ok();
                continue;
            }
            if !cmdline_contains(pid, marker.trim()) {
                // PID reused by something we did not spawn; only the stale
                // record goes away.
                log::debug!("pid {pid} no longer matches '{}', dropping entry", marker.trim());
                fs::remove_file(&path).ok();
                continue;
            }

            log::warn!("reaping orphaned capture process {pid} ({})", marker.trim());
            unsafe {
                libc::kill(pid, libc::SIGKILL);
            }
            let deadline = Instant::now() + Duration::from_millis(500);
            while process_alive(pid) && cmdline_contains(pid, marker.trim()) {
                if Instant::now() > deadline {
                    return Err(CaptureError::DeviceLocked { pid });
                }
                std::thread::sleep(Duration::from_millis(10));
            }
            fs::remove_file(&path).ok();
            reaped += 1;
        }
        Ok(reaped)
    }
}

/// A spawned child plus its registry entry. Dropping kills the child and
/// removes the entry, so no exit path leaks a captor holding the device.
#[derive(Debug)]
pub struct TrackedChild {
    child: Child,
    entry: PathBuf,
}

impl TrackedChild {
    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    /// Poll for exit up to `timeout`; `None` means the child is still
    /// running.
    pub fn wait_timeout(&mut self, timeout: Duration) -> std::io::Result<Option<ExitStatus>> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(status) = self.child.try_wait()? {
                return Ok(Some(status));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    /// Force-stop the child and reap it.
    pub fn kill_and_wait(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }

    /// Leak the child on purpose, keeping its registry entry on disk.
    ///
    /// Simulates an aborted run for the reaping tests; never used by the
    /// pipeline itself.
    pub fn detach(self) {
        std::mem::forget(self);
    }
}

impl Drop for TrackedChild {
    fn drop(&mut self) {
        if matches!(self.child.try_wait(), Ok(None)) {
            self.kill_and_wait();
        } else {
            let _ = self.child.wait();
        }
        fs::remove_file(&self.entry).ok();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracked_child_cleans_up_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let registry = PidRegistry::open(dir.path()).unwrap();
        let child = registry
            .spawn_tracked(Command::new("sleep").arg("30"), "sleep")
            .unwrap();
        let pid = child.pid() as i32;
        assert!(registry.dir().join(format!("{pid}.pid")).exists());
        drop(child);
        assert!(!registry.dir().join(format!("{pid}.pid")).exists());
        assert!(!process_alive(pid) || !cmdline_contains(pid, "sleep"));
    }

    #[test]
    fn reap_kills_orphans_from_aborted_run() {
        let dir = tempfile::tempdir().unwrap();
        let registry = PidRegistry::open(dir.path()).unwrap();
        let child = registry
            .spawn_tracked(Command::new("sleep").arg("30"), "sleep")
            .unwrap();
        let pid = child.pid() as i32;
        child.detach(); // simulate the prior run dying without cleanup

        let reaped = registry.reap_orphans().unwrap();
        assert_eq!(reaped, 1);
        assert!(!registry.dir().join(format!("{pid}.pid")).exists());
        // The process is gone (or at least no longer the tracked command).
        assert!(!process_alive(pid) || !cmdline_contains(pid, "sleep"));
    }

    #[test]
    fn stale_entries_are_dropped_silently() {
        let dir = tempfile::tempdir().unwrap();
        let registry = PidRegistry::open(dir.path()).unwrap();
        // A PID that cannot exist plus one that exists but is not ours.
        fs::write(dir.path().join("999999999.pid"), "sleep").unwrap();
        fs::write(dir.path().join("1.pid"), "no-such-command-marker").unwrap();
        let reaped = registry.reap_orphans().unwrap();
        assert_eq!(reaped, 0);
        assert!(!dir.path().join("999999999.pid").exists());
        assert!(!dir.path().join("1.pid").exists());
    }

    #[test]
    fn wait_timeout_reports_running_child() {
        let dir = tempfile::tempdir().unwrap();
        let registry = PidRegistry::open(dir.path()).unwrap();
        let mut child = registry
            .spawn_tracked(Command::new("sleep").arg("30"), "sleep")
            .unwrap();
        let status = child.wait_timeout(Duration::from_millis(30)).unwrap();
        assert!(status.is_none());
        child.kill_and_wait();
    }

    #[test]
    fn wait_timeout_reports_finished_child() {
        let dir = tempfile::tempdir().unwrap();
        let registry = PidRegistry::open(dir.path()).unwrap();
        let mut child = registry
            .spawn_tracked(&mut Command::new("true"), "true")
            .unwrap();
        let status = child.wait_timeout(Duration::from_secs(5)).unwrap();
        assert!(status.expect("child exits").success());
    }
}
