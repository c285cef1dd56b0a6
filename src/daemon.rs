//! PID-file lifecycle for the background MCP HTTP server (`qpg mcp` without
//! `--stdio`, and `qpg mcp stop`). Stdio-transport MCP runs in the
//! foreground under the calling process and never touches the PID file.

use anyhow::{bail, Context, Result};
use std::path::Path;

/// Checks whether `pid` is a live process by sending it signal 0 — the
/// standard no-op liveness probe (`kill -0`).
fn process_is_alive(pid: u32) -> bool {
    #[cfg(unix)]
    {
        unsafe { libc::kill(pid as i32, 0) == 0 }
    }
    #[cfg(not(unix))]
    {
        let _ = pid;
        false
    }
}

/// Writes the current process's pid to `pid_file`, refusing if another
/// live process already holds it.
pub fn write_pid_file(pid_file: &Path) -> Result<()> {
    if let Some(existing) = read_pid_file(pid_file)? {
        if process_is_alive(existing) {
            bail!("mcp server already running with pid {existing}");
        }
    }
    if let Some(parent) = pid_file.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(pid_file, std::process::id().to_string()).context("failed to write pid file")?;
    Ok(())
}

pub fn read_pid_file(pid_file: &Path) -> Result<Option<u32>> {
    match std::fs::read_to_string(pid_file) {
        Ok(contents) => Ok(contents.trim().parse::<u32>().ok()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn remove_pid_file(pid_file: &Path) -> Result<()> {
    match std::fs::remove_file(pid_file) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Stops a previously started server by signaling its pid with SIGTERM
/// and removing the pid file. A no-op (not an error) if nothing is running.
pub fn stop_server(pid_file: &Path) -> Result<bool> {
    let Some(pid) = read_pid_file(pid_file)? else {
        return Ok(false);
    };
    if !process_is_alive(pid) {
        remove_pid_file(pid_file)?;
        return Ok(false);
    }

    #[cfg(unix)]
    unsafe {
        libc::kill(pid as i32, libc::SIGTERM);
    }

    remove_pid_file(pid_file)?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn read_pid_file_returns_none_when_absent() {
        let dir = tempdir().unwrap();
        let pid_file = dir.path().join("mcp-http.pid");
        assert_eq!(read_pid_file(&pid_file).unwrap(), None);
    }

    #[test]
    fn write_then_read_pid_file_roundtrips() {
        let dir = tempdir().unwrap();
        let pid_file = dir.path().join("mcp-http.pid");
        write_pid_file(&pid_file).unwrap();
        assert_eq!(read_pid_file(&pid_file).unwrap(), Some(std::process::id()));
    }

    #[test]
    fn stop_server_on_missing_pid_file_is_a_noop() {
        let dir = tempdir().unwrap();
        let pid_file = dir.path().join("mcp-http.pid");
        assert!(!stop_server(&pid_file).unwrap());
    }
}
