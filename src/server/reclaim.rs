//! Freeing the listening port from a stale holder.
//!
//! A previous server instance that crashed or was orphaned may still hold
//! the fixed port the agent dials. Before binding, the server asks a
//! [`PortReclaimer`] to terminate whoever holds it. Reclamation is best
//! effort; the bind poll decides whether startup succeeds.

// ============================================================================
// Imports
// ============================================================================

use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

// ============================================================================
// PortReclaimer
// ============================================================================

/// Terminates processes holding a TCP port.
#[async_trait]
pub trait PortReclaimer: Send + Sync + 'static {
    /// Attempts to free `port`. Returns the number of processes terminated.
    ///
    /// Must never terminate the current process.
    ///
    /// # Errors
    ///
    /// Returns an error if holders could not be looked up. Callers log it and
    /// continue to the bind poll.
    async fn reclaim(&self, port: u16) -> Result<usize>;
}

// ============================================================================
// NoopReclaimer
// ============================================================================

/// Reclaimer that does nothing.
///
/// For ephemeral ports and environments where killing processes is not
/// acceptable.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopReclaimer;

#[async_trait]
impl PortReclaimer for NoopReclaimer {
    async fn reclaim(&self, _port: u16) -> Result<usize> {
        Ok(0)
    }
}

// ============================================================================
// ProcessPortReclaimer
// ============================================================================

/// Reclaimer that looks up holders with OS tools and kills them.
///
/// | Platform | Lookup | Kill |
/// |----------|--------|------|
/// | Unix | `lsof -t -i tcp:<port> -sTCP:LISTEN` | `kill -9 <pid>` |
/// | Windows | `netstat -ano -p tcp` | `taskkill /F /PID <pid>` |
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessPortReclaimer;

#[async_trait]
impl PortReclaimer for ProcessPortReclaimer {
    async fn reclaim(&self, port: u16) -> Result<usize> {
        let holders = find_holders(port).await?;
        let targets = kill_targets(holders, std::process::id());

        if targets.is_empty() {
            debug!(port, "No process holds port");
            return Ok(0);
        }

        let mut killed = 0;
        for pid in targets {
            match kill(pid).await {
                Ok(()) => {
                    info!(port, pid, "Terminated process holding port");
                    killed += 1;
                }
                Err(e) => warn!(port, pid, error = %e, "Failed to terminate port holder"),
            }
        }

        Ok(killed)
    }
}

// ============================================================================
// Platform Commands
// ============================================================================

#[cfg(not(windows))]
async fn find_holders(port: u16) -> Result<Vec<u32>> {
    let output = Command::new("lsof")
        .arg("-t")
        .arg("-i")
        .arg(format!("tcp:{port}"))
        .arg("-sTCP:LISTEN")
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .output()
        .await?;

    // lsof exits with 1 when nothing matches.
    Ok(parse_lsof_pids(&String::from_utf8_lossy(&output.stdout)))
}

#[cfg(windows)]
async fn find_holders(port: u16) -> Result<Vec<u32>> {
    let output = Command::new("netstat")
        .args(["-ano", "-p", "tcp"])
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .output()
        .await?;

    Ok(parse_netstat_pids(
        &String::from_utf8_lossy(&output.stdout),
        port,
    ))
}

#[cfg(not(windows))]
async fn kill(pid: u32) -> Result<()> {
    let status = Command::new("kill")
        .arg("-9")
        .arg(pid.to_string())
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await?;

    if status.success() {
        Ok(())
    } else {
        Err(Error::connection(format!("kill -9 {pid} exited with {status}")))
    }
}

#[cfg(windows)]
async fn kill(pid: u32) -> Result<()> {
    let status = Command::new("taskkill")
        .args(["/F", "/PID", &pid.to_string()])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await?;

    if status.success() {
        Ok(())
    } else {
        Err(Error::connection(format!("taskkill {pid} exited with {status}")))
    }
}

// ============================================================================
// Parsing
// ============================================================================

/// Parses `lsof -t` output: one pid per line.
#[cfg_attr(windows, allow(dead_code))]
fn parse_lsof_pids(output: &str) -> Vec<u32> {
    output
        .lines()
        .filter_map(|line| line.trim().parse().ok())
        .collect()
}

/// Parses `netstat -ano` output for listeners on `port`.
///
/// Rows look like `TCP    0.0.0.0:8080    0.0.0.0:0    LISTENING    1234`.
#[cfg_attr(not(windows), allow(dead_code))]
fn parse_netstat_pids(output: &str, port: u16) -> Vec<u32> {
    let suffix = format!(":{port}");

    output
        .lines()
        .filter_map(|line| {
            let columns: Vec<&str> = line.split_whitespace().collect();
            match columns.as_slice() {
                [proto, local, _remote, state, pid]
                    if proto.eq_ignore_ascii_case("tcp")
                        && local.ends_with(&suffix)
                        && state.eq_ignore_ascii_case("listening") =>
                {
                    pid.parse().ok()
                }
                _ => None,
            }
        })
        .collect()
}

/// Deduplicates holders and drops `own_pid`.
fn kill_targets(mut pids: Vec<u32>, own_pid: u32) -> Vec<u32> {
    pids.sort_unstable();
    pids.dedup();
    pids.retain(|&pid| pid != own_pid && pid != 0);
    pids
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_lsof_pids() {
        assert_eq!(parse_lsof_pids("123\n456\n\n"), vec![123, 456]);
        assert!(parse_lsof_pids("").is_empty());
        assert!(parse_lsof_pids("lsof: WARNING").is_empty());
    }

    #[test]
    fn test_parse_netstat_pids() {
        let output = "\
Active Connections

  Proto  Local Address          Foreign Address        State           PID
  TCP    0.0.0.0:8080           0.0.0.0:0              LISTENING       4242
  TCP    0.0.0.0:18080          0.0.0.0:0              LISTENING       7
  TCP    127.0.0.1:8080         127.0.0.1:50000        ESTABLISHED     4242
  TCP    [::]:8080              [::]:0                 LISTENING       4243
";
        assert_eq!(parse_netstat_pids(output, 8080), vec![4242, 4243]);
    }

    #[test]
    fn test_kill_targets_skip_own_process() {
        assert_eq!(kill_targets(vec![10, 42, 10, 0, 7], 42), vec![7, 10]);
    }

    #[tokio::test]
    async fn test_noop_reclaimer() {
        assert_eq!(NoopReclaimer.reclaim(8080).await.expect("noop"), 0);
    }
}
