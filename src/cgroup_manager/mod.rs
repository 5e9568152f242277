//! Launching agent processes, contained in a cgroup v2 when possible.

#[cfg(target_os = "linux")]
mod cgroup_manager_linux;

#[cfg(target_os = "linux")]
pub use cgroup_manager_linux::*;

#[cfg(not(target_os = "linux"))]
mod cgroup_manager_stub;

#[cfg(not(target_os = "linux"))]
pub use cgroup_manager_stub::*;

use std::process::{Child, Command, Stdio};

use anyhow::Context;
use tracing::{instrument, trace, warn};

/// Resource limits of one agent process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessLimits {
    /// bytes
    pub max_memory: Option<usize>,
    /// cgroup/taskset format, e.g. `"0,1,4"`
    pub cpus: Option<String>,
}

/// Maximum number of pids a contained agent may own.
#[cfg(target_os = "linux")]
const MAX_PIDS: i64 = 64;

/// Start `command` as an agent process.
///
/// The process is placed in a fresh cgroup and pinned with `taskset` when CPUs are given.
/// If that fails and `allow_uncontained` is set, it is started as a plain child process
/// instead, with no memory or CPU limit.
#[instrument(skip(args, limits))]
pub fn spawn_agent_process(
    command: &str,
    args: &[String],
    limits: &ProcessLimits,
    allow_uncontained: bool,
    allow_stderr: bool,
) -> anyhow::Result<ContainedProcess> {
    let (program, full_args) = match &limits.cpus {
        Some(cpus) => {
            let mut full = vec!["-c".to_string(), cpus.clone(), command.to_string()];
            full.extend_from_slice(args);
            ("taskset", full)
        }
        None => (command, args.to_vec()),
    };

    match ContainedProcess::launch(program, &full_args, limits, allow_stderr) {
        Ok(process) => Ok(process),
        Err(e) if allow_uncontained => {
            warn!("could not contain agent process, running it uncontained: {e:#}");
            ContainedProcess::launch_uncontained(command, args, allow_stderr)
        }
        Err(e) => Err(e.context(
            "could not contain agent process (uncontained execution is not allowed)",
        )),
    }
}

fn create_process(command: &str, args: &[String], allow_stderr: bool) -> anyhow::Result<Child> {
    let mut cmd = Command::new(command);
    cmd.args(args).stdin(Stdio::null()).stdout(Stdio::null());
    if !allow_stderr {
        cmd.stderr(Stdio::null());
    }
    // leader of its own group, so teardown reaches everything the agent starts
    #[cfg(unix)]
    std::os::unix::process::CommandExt::process_group(&mut cmd, 0);
    cmd.spawn()
        .with_context(|| format!("could not launch '{command}'"))
}

/// Kill `child` and every process of its group, then reap it.
fn kill_process_tree(child: &mut Child) -> anyhow::Result<()> {
    #[cfg(unix)]
    kill_process_group(child.id());
    if child.try_wait().ok().flatten().is_none() {
        child.kill().context("could not kill process")?;
    }
    let _ = child.wait();
    Ok(())
}

#[cfg(unix)]
fn kill_process_group(pgid: u32) {
    let status = Command::new("sh")
        .arg("-c")
        .arg(format!("kill -s KILL -- -{pgid}"))
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();
    match status {
        Ok(status) if status.success() => trace!(pgid, "process group killed"),
        Ok(_) => trace!(pgid, "process group already empty"),
        Err(e) => warn!("could not kill process group {pgid}: {e}"),
    }
}
