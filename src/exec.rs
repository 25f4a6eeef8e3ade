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

//! The subprocess-exec collaborator: a narrow `spawn`/`reap_finished`
//! contract for the out-of-scope task scheduler to suspend a task on and
//! resume it with captured output. This crate only forks, wires pipes, and
//! reaps; what the caller does with a suspended task is none of our
//! business.

use std::collections::HashMap;
use std::ffi::CString;
use std::io::{Read, Write};

#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    #[error("argument {0:?} is not a permitted path")]
    InvalidArgument(String),
    #[error("argv must be non-empty")]
    EmptyArgv,
    #[error("pipe() failed: {0}")]
    Pipe(#[source] std::io::Error),
    #[error("fork() failed: {0}")]
    Fork(#[source] std::io::Error),
    #[error("argument contains an interior nul byte: {0}")]
    NulByte(String),
}

pub type Pid = libc::pid_t;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecOutcome {
    Exited(i32),
    Signaled(i32),
}

/// A still-running child, tracked between `spawn` and `reap_finished`.
pub struct PendingExec {
    pub argv: Vec<String>,
    stdin_fd: i32,
    stdout_fd: i32,
    stderr_fd: i32,
}

#[derive(Debug, Clone)]
pub struct ChildHandle {
    pub pid: Pid,
    /// Write end of the child's stdin pipe. Feed it via
    /// [`ExecTable::write_stdin`], and close it with
    /// [`ExecTable::close_stdin`] once done (or let [`ExecTable::reap_finished`]
    /// close it on exit).
    pub stdin_fd: i32,
}

#[derive(Debug, Clone)]
pub struct ExecResult {
    pub outcome: ExecOutcome,
    pub stdout: String,
    pub stderr: String,
}

/// Rejects path-like arguments that escape the caller's intended root:
/// anything starting with `..` or containing `/.` (covers `../`, `a/../b`,
/// and hidden-file traversal attempts alike).
fn validate_argument(arg: &str) -> Result<(), ExecError> {
    if arg.starts_with("..") || arg.contains("/.") {
        return Err(ExecError::InvalidArgument(arg.to_string()));
    }
    Ok(())
}

/// Tracks forked children between `spawn` and `reap_finished`.
#[derive(Default)]
pub struct ExecTable {
    pending: HashMap<Pid, PendingExec>,
}

impl ExecTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forks, wires stdin/stdout/stderr pipes, and execs `argv[0]` with the
    /// rest as arguments and a fixed minimal environment (`PATH`, `HOME`
    /// only).
    pub fn spawn(&mut self, argv: &[String]) -> Result<ChildHandle, ExecError> {
        let Some(prog) = argv.first() else {
            return Err(ExecError::EmptyArgv);
        };
        for arg in argv {
            validate_argument(arg)?;
        }
        let c_argv: Vec<CString> = argv
            .iter()
            .map(|a| CString::new(a.as_str()).map_err(|_| ExecError::NulByte(a.clone())))
            .collect::<Result<_, _>>()?;
        let c_prog = CString::new(prog.as_str()).map_err(|_| ExecError::NulByte(prog.clone()))?;
        let c_envp = fixed_environment();

        let mut stdin_fds = [0i32; 2];
        let mut stdout_fds = [0i32; 2];
        let mut stderr_fds = [0i32; 2];
        // Safety: all three arrays are valid `[i32; 2]` stack buffers;
        // pipe() writes exactly two fds into them on success.
        unsafe {
            if libc::pipe(stdin_fds.as_mut_ptr()) != 0 {
                return Err(ExecError::Pipe(std::io::Error::last_os_error()));
            }
            if libc::pipe(stdout_fds.as_mut_ptr()) != 0 {
                libc::close(stdin_fds[0]);
                libc::close(stdin_fds[1]);
                return Err(ExecError::Pipe(std::io::Error::last_os_error()));
            }
            if libc::pipe(stderr_fds.as_mut_ptr()) != 0 {
                libc::close(stdin_fds[0]);
                libc::close(stdin_fds[1]);
                libc::close(stdout_fds[0]);
                libc::close(stdout_fds[1]);
                return Err(ExecError::Pipe(std::io::Error::last_os_error()));
            }
        }

        // Safety: fork() duplicates the process; the child only calls
        // async-signal-safe libc functions (dup2, close, execvp, _exit)
        // before replacing its image or exiting.
        let pid = unsafe { libc::fork() };
        match pid {
            -1 => {
                unsafe {
                    libc::close(stdin_fds[0]);
                    libc::close(stdin_fds[1]);
                    libc::close(stdout_fds[0]);
                    libc::close(stdout_fds[1]);
                    libc::close(stderr_fds[0]);
                    libc::close(stderr_fds[1]);
                }
                Err(ExecError::Fork(std::io::Error::last_os_error()))
            }
            0 => {
                unsafe {
                    libc::close(stdin_fds[1]);
                    libc::close(stdout_fds[0]);
                    libc::close(stderr_fds[0]);
                    libc::dup2(stdin_fds[0], libc::STDIN_FILENO);
                    libc::dup2(stdout_fds[1], libc::STDOUT_FILENO);
                    libc::dup2(stderr_fds[1], libc::STDERR_FILENO);
                    libc::close(stdin_fds[0]);
                    libc::close(stdout_fds[1]);
                    libc::close(stderr_fds[1]);

                    let mut argv_ptrs: Vec<*const libc::c_char> =
                        c_argv.iter().map(|a| a.as_ptr()).collect();
                    argv_ptrs.push(std::ptr::null());
                    let mut envp_ptrs: Vec<*const libc::c_char> =
                        c_envp.iter().map(|e| e.as_ptr()).collect();
                    envp_ptrs.push(std::ptr::null());
                    libc::execve(c_prog.as_ptr(), argv_ptrs.as_ptr(), envp_ptrs.as_ptr());
                    libc::_exit(127);
                }
            }
            child_pid => {
                unsafe {
                    libc::close(stdin_fds[0]);
                    libc::close(stdout_fds[1]);
                    libc::close(stderr_fds[1]);
                }
                self.pending.insert(
                    child_pid,
                    PendingExec {
                        argv: argv.to_vec(),
                        stdin_fd: stdin_fds[1],
                        stdout_fd: stdout_fds[0],
                        stderr_fd: stderr_fds[0],
                    },
                );
                Ok(ChildHandle {
                    pid: child_pid,
                    stdin_fd: stdin_fds[1],
                })
            }
        }
    }

    /// Writes `data` to the child's stdin pipe. Returns an error if `pid`
    /// isn't pending or its stdin has already been closed.
    pub fn write_stdin(&mut self, pid: Pid, data: &[u8]) -> std::io::Result<()> {
        let Some(pending) = self.pending.get(&pid) else {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "no such pending child",
            ));
        };
        if pending.stdin_fd < 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "stdin already closed",
            ));
        }
        // Safety: stdin_fd is a pipe write-end fd this table owns and
        // hasn't closed; `File` is forgotten below so it doesn't close the
        // fd out from under `pending` on drop.
        let mut file =
            unsafe { <std::fs::File as std::os::unix::io::FromRawFd>::from_raw_fd(pending.stdin_fd) };
        let result = file.write_all(data);
        std::mem::forget(file);
        result
    }

    /// Closes the child's stdin pipe, signalling EOF to the subprocess.
    /// Idempotent.
    pub fn close_stdin(&mut self, pid: Pid) {
        if let Some(pending) = self.pending.get_mut(&pid)
            && pending.stdin_fd >= 0
        {
            // Safety: stdin_fd is a pipe write-end fd this table owns and
            // hasn't closed yet.
            unsafe {
                libc::close(pending.stdin_fd);
            }
            pending.stdin_fd = -1;
        }
    }

    /// Drains every child that has exited or been signaled, via
    /// `waitpid(..., WNOHANG)`, reading whatever's buffered in its pipes.
    pub fn reap_finished(&mut self) -> Vec<(Pid, ExecResult)> {
        let mut done = Vec::new();
        let pids: Vec<Pid> = self.pending.keys().copied().collect();
        for pid in pids {
            let mut status: libc::c_int = 0;
            // Safety: pid was returned by a prior fork() we own, and hasn't
            // been reaped yet (removed from `pending` once it has).
            let r = unsafe { libc::waitpid(pid, &mut status, libc::WNOHANG) };
            if r == 0 {
                continue; // still running
            }
            if r < 0 {
                // ECHILD or similar; drop our bookkeeping, nothing more we
                // can learn about this child.
                self.pending.remove(&pid);
                continue;
            }
            let Some(mut pending) = self.pending.remove(&pid) else {
                continue;
            };
            let outcome = if libc::WIFEXITED(status) {
                ExecOutcome::Exited(libc::WEXITSTATUS(status))
            } else {
                ExecOutcome::Signaled(libc::WTERMSIG(status))
            };
            if pending.stdin_fd >= 0 {
                // Safety: stdin_fd is a pipe write-end fd this table owns
                // and hasn't closed yet.
                unsafe {
                    libc::close(pending.stdin_fd);
                }
                pending.stdin_fd = -1;
            }
            let stdout = read_and_close(pending.stdout_fd);
            let stderr = read_and_close(pending.stderr_fd);
            pending.stdout_fd = -1;
            pending.stderr_fd = -1;
            done.push((
                pid,
                ExecResult {
                    outcome,
                    stdout,
                    stderr,
                },
            ));
        }
        done
    }

    pub fn is_pending(&self, pid: Pid) -> bool {
        self.pending.contains_key(&pid)
    }
}

/// The fixed minimal environment execed children get: `PATH` and `HOME`
/// passed through from this process if set, nothing else.
fn fixed_environment() -> Vec<CString> {
    ["PATH", "HOME"]
        .iter()
        .filter_map(|key| std::env::var(key).ok().map(|val| format!("{key}={val}")))
        .filter_map(|kv| CString::new(kv).ok())
        .collect()
}

fn read_and_close(fd: i32) -> String {
    if fd < 0 {
        return String::new();
    }
    // Safety: fd was returned by our own pipe() call and hasn't been
    // closed yet.
    let mut file = unsafe { <std::fs::File as std::os::unix::io::FromRawFd>::from_raw_fd(fd) };
    let mut buf = Vec::new();
    let _ = file.read_to_end(&mut buf);
    String::from_utf8_lossy(&buf).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn rejects_parent_traversal() {
        let mut table = ExecTable::new();
        let err = table
            .spawn(&s(&["/bin/echo", "../etc/passwd"]))
            .unwrap_err();
        assert!(matches!(err, ExecError::InvalidArgument(_)));
    }

    #[test]
    fn rejects_hidden_path_segment() {
        let mut table = ExecTable::new();
        let err = table.spawn(&s(&["/bin/echo", "a/.ssh/id_rsa"])).unwrap_err();
        assert!(matches!(err, ExecError::InvalidArgument(_)));
    }

    #[test]
    fn rejects_empty_argv() {
        let mut table = ExecTable::new();
        let err = table.spawn(&[]).unwrap_err();
        assert!(matches!(err, ExecError::EmptyArgv));
    }

    #[test]
    fn spawn_and_reap_captures_stdout() {
        let mut table = ExecTable::new();
        let handle = table
            .spawn(&s(&["/bin/echo", "hello-from-child"]))
            .unwrap();
        assert!(table.is_pending(handle.pid));

        let mut results = Vec::new();
        for _ in 0..200 {
            results = table.reap_finished();
            if !results.is_empty() {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(10));
        }
        assert_eq!(results.len(), 1);
        let (pid, result) = &results[0];
        assert_eq!(*pid, handle.pid);
        assert_eq!(result.outcome, ExecOutcome::Exited(0));
        assert_eq!(result.stdout.trim(), "hello-from-child");
        assert!(!table.is_pending(handle.pid));
    }

    #[test]
    fn stdin_is_piped_through_to_the_child() {
        let mut table = ExecTable::new();
        let handle = table.spawn(&s(&["/bin/cat"])).unwrap();
        table
            .write_stdin(handle.pid, b"fed-through-stdin\n")
            .unwrap();
        table.close_stdin(handle.pid);

        let mut results = Vec::new();
        for _ in 0..200 {
            results = table.reap_finished();
            if !results.is_empty() {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(10));
        }
        assert_eq!(results.len(), 1);
        let (_, result) = &results[0];
        assert_eq!(result.outcome, ExecOutcome::Exited(0));
        assert_eq!(result.stdout.trim(), "fed-through-stdin");
    }

    #[test]
    fn nonzero_exit_status_is_reported() {
        let mut table = ExecTable::new();
        let handle = table.spawn(&s(&["/bin/sh", "-c", "exit 7"])).unwrap();
        let mut results = Vec::new();
        for _ in 0..200 {
            results = table.reap_finished();
            if !results.is_empty() {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(10));
        }
        let (pid, result) = &results[0];
        assert_eq!(*pid, handle.pid);
        assert_eq!(result.outcome, ExecOutcome::Exited(7));
    }
}
