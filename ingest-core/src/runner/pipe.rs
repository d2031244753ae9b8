//! Platform adapter for spawning the validating node
//!
//! All process plumbing lives here: the node's stdout carries framed
//! metadata, stderr is captured for diagnostics, and stdin is held open as
//! the shutdown channel (closing it asks the node to stop).

use crate::runner::NodeMode;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

/// Build the node command for a mode
///
/// The returned command has all three standard streams piped and is set to
/// kill the child when the handle drops, so an aborted session never leaks
/// a node process.
pub(super) fn node_command(binary: &Path, config: &Path, mode: &NodeMode) -> Command {
    let mut cmd = Command::new(binary);
    cmd.arg("--conf").arg(config);
    match mode {
        NodeMode::CatchUp { from, to } => {
            cmd.arg("--mode")
                .arg("catchup")
                .arg("--from")
                .arg(from.to_string())
                .arg("--to")
                .arg(to.to_string());
        }
        NodeMode::Track { from } => {
            cmd.arg("--mode")
                .arg("track")
                .arg("--from")
                .arg(from.to_string());
        }
    }
    cmd.stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    cmd
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsStr;
    use std::path::PathBuf;

    #[test]
    fn test_catchup_args() {
        let cmd = node_command(
            &PathBuf::from("meridian-node"),
            &PathBuf::from("/etc/meridian/node.cfg"),
            &NodeMode::CatchUp { from: 10, to: 20 },
        );
        let args: Vec<&OsStr> = cmd.as_std().get_args().collect();
        assert_eq!(
            args,
            vec![
                "--conf",
                "/etc/meridian/node.cfg",
                "--mode",
                "catchup",
                "--from",
                "10",
                "--to",
                "20"
            ]
        );
    }

    #[test]
    fn test_track_args() {
        let cmd = node_command(
            &PathBuf::from("meridian-node"),
            &PathBuf::from("node.cfg"),
            &NodeMode::Track { from: 42 },
        );
        let args: Vec<&OsStr> = cmd.as_std().get_args().collect();
        assert_eq!(
            args,
            vec!["--conf", "node.cfg", "--mode", "track", "--from", "42"]
        );
    }
}
