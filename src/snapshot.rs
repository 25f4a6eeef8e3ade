// Copyright (C) 2025 Ryan Daum <ryan.daum@gmail.com> This program is free
// software: you can redistribute it and/or modify it under the terms of the GNU
// General Public License as published by the Free Software Foundation, version
// 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! The snapshot writer and checkpoint orchestrator: fork-or-inline dumps,
//! temp-file-then-rename crash safety, retry-on-failure policy, and the
//! per-process generation counter.

use crate::dbio::{DbioError, DbioWriter};
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{error, info, warn};

/// Why a dump was triggered. Drives naming, forking, and retry policy.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum DumpReason {
    Shutdown,
    Checkpoint,
    Panic,
}

/// Whether `Checkpoint` dumps run in a forked child or the calling process.
/// `Shutdown` and `Panic` are never forked regardless of this setting.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum CheckpointPolicy {
    Fork,
    Inline,
}

const SHUTDOWN_RETRY_BACKOFF: Duration = Duration::from_secs(60);

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("could not open temp file {0}: {1}")]
    Open(PathBuf, #[source] io::Error),
    #[error("write failed: {0}")]
    Write(#[source] DbioError),
    #[error("fork failed: {0}")]
    Fork(#[source] io::Error),
    #[error("rename failed: {0}")]
    Rename(#[source] io::Error),
}

enum WriteOnceError {
    Open(io::Error),
    Write(DbioError),
}

/// Orchestrates dumps against one canonical on-disk path. Owns the
/// per-process generation counter; see the data-model section for why this
/// lives here rather than being derived from the filesystem (a crashed
/// dump's temp file must not be mistaken for the next generation).
pub struct SnapshotWriter {
    canonical: PathBuf,
    generation: u64,
    policy: CheckpointPolicy,
    /// Narrow collaborator hook: the running server's command-history
    /// buffer reset, invoked by the parent immediately after a successful
    /// fork. Out of scope for this crate beyond the call site.
    on_fork_parent: Option<Box<dyn FnMut() + Send>>,
}

impl SnapshotWriter {
    pub fn new(canonical: impl Into<PathBuf>, policy: CheckpointPolicy) -> Self {
        Self {
            canonical: canonical.into(),
            generation: 0,
            policy,
            on_fork_parent: None,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn with_fork_parent_hook(mut self, hook: impl FnMut() + Send + 'static) -> Self {
        self.on_fork_parent = Some(Box::new(hook));
        self
    }

    fn temp_path(&self, generation: u64) -> PathBuf {
        let mut s = self.canonical.as_os_str().to_owned();
        s.push(format!(".#{generation}#"));
        PathBuf::from(s)
    }

    fn panic_path(&self) -> PathBuf {
        let mut s = self.canonical.as_os_str().to_owned();
        s.push(".PANIC");
        PathBuf::from(s)
    }

    /// Computes this dump's temp file name, removing the prior generation's
    /// orphaned temp file first, and (for non-PANIC reasons) advancing the
    /// generation counter.
    fn next_temp_path(&mut self, reason: DumpReason) -> PathBuf {
        let prior_temp = self.temp_path(self.generation);
        match fs::remove_file(&prior_temp) {
            Ok(()) => info!(path = ?prior_temp, "removed orphaned checkpoint temp file"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = ?prior_temp, error = %e, "could not remove prior temp file"),
        }
        if reason == DumpReason::Panic {
            self.panic_path()
        } else {
            self.generation += 1;
            self.temp_path(self.generation)
        }
    }

    /// Runs a single dump of `reason`, calling `write_sections` to emit the
    /// header/counts/users/objects/programs/tasks/connections in order.
    /// Blocks until the dump (and, for `Checkpoint` under
    /// [`CheckpointPolicy::Fork`], only the parent's half of it) completes.
    pub fn dump<F>(&mut self, reason: DumpReason, write_sections: F) -> Result<(), SnapshotError>
    where
        F: Fn(&mut DbioWriter<File>) -> Result<(), DbioError>,
    {
        let temp_path = self.next_temp_path(reason);

        if reason == DumpReason::Checkpoint && self.policy == CheckpointPolicy::Fork {
            return self.fork_checkpoint(temp_path, write_sections);
        }

        Self::write_with_retry(reason, &temp_path, &self.canonical, write_sections)
    }

    fn fork_checkpoint<F>(
        &mut self,
        temp_path: PathBuf,
        write_sections: F,
    ) -> Result<(), SnapshotError>
    where
        F: Fn(&mut DbioWriter<File>) -> Result<(), DbioError>,
    {
        let canonical = self.canonical.clone();
        // Safety: fork() duplicates the process; the child immediately
        // either execs nothing further (it only does I/O) or exits. We
        // never touch Rust-level shared state across the fork other than
        // reading already-initialized local values, so this is sound.
        let pid = unsafe { libc::fork() };
        match pid {
            -1 => Err(SnapshotError::Fork(io::Error::last_os_error())),
            0 => {
                name_checkpointer_process();
                let result =
                    Self::write_with_retry(DumpReason::Checkpoint, &temp_path, &canonical, write_sections);
                std::process::exit(if result.is_ok() { 0 } else { 1 });
            }
            _child_pid => {
                info!(pid = _child_pid, "forked checkpoint child");
                if let Some(hook) = self.on_fork_parent.as_mut() {
                    hook();
                }
                Ok(())
            }
        }
    }

    fn write_once<F>(path: &Path, write_sections: &F) -> Result<(), WriteOnceError>
    where
        F: Fn(&mut DbioWriter<File>) -> Result<(), DbioError>,
    {
        let file = File::create(path).map_err(WriteOnceError::Open)?;
        let mut writer = DbioWriter::new(file);
        write_sections(&mut writer).map_err(WriteOnceError::Write)?;
        writer.flush().map_err(WriteOnceError::Write)?;
        let file = writer.into_inner();
        file.sync_all()
            .map_err(|e| WriteOnceError::Write(DbioError::Io(e, 0)))?;
        drop(file);
        Ok(())
    }

    fn write_with_retry<F>(
        reason: DumpReason,
        temp_path: &Path,
        canonical: &Path,
        write_sections: F,
    ) -> Result<(), SnapshotError>
    where
        F: Fn(&mut DbioWriter<File>) -> Result<(), DbioError>,
    {
        loop {
            match Self::write_once(temp_path, &write_sections) {
                Ok(()) => {
                    if reason == DumpReason::Panic {
                        info!(path = ?temp_path, "panic dump written; canonical file left untouched");
                        return Ok(());
                    }
                    if let Err(e) = fs::remove_file(canonical) {
                        if e.kind() != io::ErrorKind::NotFound {
                            warn!(error = %e, "could not remove prior canonical snapshot before rename");
                        }
                    }
                    fs::rename(temp_path, canonical).map_err(SnapshotError::Rename)?;
                    info!(path = ?canonical, "snapshot installed");
                    return Ok(());
                }
                Err(WriteOnceError::Open(e)) => {
                    error!(path = ?temp_path, error = %e, "could not open temp file for dump");
                    return Err(SnapshotError::Open(temp_path.to_path_buf(), e));
                }
                Err(WriteOnceError::Write(e)) => {
                    error!(error = %e, reason = ?reason, "dump write failed");
                    let _ = fs::remove_file(temp_path);
                    match reason {
                        DumpReason::Checkpoint => return Err(SnapshotError::Write(e)),
                        DumpReason::Shutdown | DumpReason::Panic => {
                            error!(
                                "{reason:?} dump failed, retrying in {}s (operator attention required)",
                                SHUTDOWN_RETRY_BACKOFF.as_secs()
                            );
                            std::thread::sleep(SHUTDOWN_RETRY_BACKOFF);
                            continue;
                        }
                    }
                }
            }
        }
    }
}

#[cfg(target_os = "linux")]
fn name_checkpointer_process() {
    let name = std::ffi::CString::new("checkpointer").unwrap();
    unsafe {
        libc::prctl(libc::PR_SET_NAME, name.as_ptr() as libc::c_ulong, 0, 0, 0);
    }
}

#[cfg(not(target_os = "linux"))]
fn name_checkpointer_process() {}
