use std::{
    process::{Child, ExitStatus},
    sync::atomic::{AtomicU32, Ordering},
    time::{Duration, Instant},
};

use anyhow::{bail, Context};
use cgroups_rs::{Cgroup, CgroupPid};
use tracing::{error, trace, warn};

use super::{create_process, kill_process_tree, ProcessLimits, MAX_PIDS};

fn get_current_user_id() -> anyhow::Result<String> {
    let output = std::process::Command::new("id")
        .arg("-u")
        .output()
        .context("Could not launch 'id -u'")?;
    let id = std::str::from_utf8(&output.stdout).context("id is not a valid string")?;
    Ok(id.trim().to_string())
}

fn get_cgroup_path(user_id: &str, group_name: &str) -> String {
    format!("user.slice/user-{user_id}.slice/user@{user_id}.service/{group_name}")
}

fn create_cgroup(path: &str, limits: &ProcessLimits) -> anyhow::Result<Cgroup> {
    let mut builder = cgroups_rs::cgroup_builder::CgroupBuilder::new(path);
    if let Some(max_memory) = limits.max_memory {
        builder = builder
            .memory()
            .memory_hard_limit(max_memory as i64)
            .done();
    }
    builder = builder
        .pid()
        .maximum_number_of_processes(cgroups_rs::MaxValue::Value(MAX_PIDS))
        .done();
    if let Some(cpus) = &limits.cpus {
        builder = builder.cpu().cpus(cpus.clone()).done();
    }
    builder
        .build(cgroups_rs::hierarchies::auto())
        .context("could not create cgroup")
}

fn wait_for_process_cleanup(
    cgroup: &Cgroup,
    pid: u64,
    max_duration: Duration,
) -> anyhow::Result<()> {
    let deadline = Instant::now() + max_duration;
    while cgroup.tasks().iter().any(|cpid| cpid.pid == pid) {
        if Instant::now() > deadline {
            bail!("process {pid} still alive after {max_duration:?}");
        }
        std::thread::sleep(Duration::from_millis(1).min(max_duration / 10));
    }
    Ok(())
}

/// Agent child process, killed (and its cgroup removed) on drop.
#[derive(Debug)]
pub struct ContainedProcess {
    child: Child,
    cgroup: Option<Cgroup>,
    cleaned_up: bool,
}

impl ContainedProcess {
    /// Launch `command` inside a new cgroup limited by `limits`.
    pub fn launch(
        command: &str,
        args: &[String],
        limits: &ProcessLimits,
        allow_stderr: bool,
    ) -> anyhow::Result<ContainedProcess> {
        static COUNTER: AtomicU32 = AtomicU32::new(1);
        let user_id = get_current_user_id().context("could not get user id")?;
        let group_name = format!(
            "CONNECT_FOUR_AGENT_{}_{}",
            std::process::id(),
            COUNTER.fetch_add(1, Ordering::Relaxed)
        );
        let group = create_cgroup(&get_cgroup_path(&user_id, &group_name), limits)?;

        let mut child = match create_process(command, args, allow_stderr) {
            Ok(child) => child,
            Err(e) => {
                let _ = group.delete();
                return Err(e);
            }
        };
        let pid = child.id() as u64;
        if let Err(e) = group.add_task_by_tgid(CgroupPid { pid }) {
            let _ = child.kill();
            let _ = child.wait();
            let _ = group.delete();
            return Err(e).context("could not add process to cgroup");
        }
        trace!(pid, group = group.path(), "agent process contained");

        Ok(ContainedProcess {
            child,
            cgroup: Some(group),
            cleaned_up: false,
        })
    }

    /// Launch `command` as a plain child process.
    pub fn launch_uncontained(
        command: &str,
        args: &[String],
        allow_stderr: bool,
    ) -> anyhow::Result<ContainedProcess> {
        let child = create_process(command, args, allow_stderr)?;
        Ok(ContainedProcess {
            child,
            cgroup: None,
            cleaned_up: false,
        })
    }

    /// Exit status, if the process already exited.
    pub fn try_exit_status(&mut self) -> Option<ExitStatus> {
        self.child.try_wait().ok().flatten()
    }

    /// Kill the process and everything in its cgroup (its process group when uncontained),
    /// then reap it.
    pub fn try_kill(&mut self, max_duration: Duration) -> anyhow::Result<()> {
        if self.cleaned_up {
            return Ok(());
        }
        match &self.cgroup {
            Some(cgroup) => {
                if let Err(e) = cgroup.kill() {
                    warn!("could not kill cgroup, killing the agent process group: {e}");
                    kill_process_tree(&mut self.child)?;
                }
                let _ = self.child.wait();
                wait_for_process_cleanup(cgroup, self.child.id() as u64, max_duration)
                    .context("process cleanup timed out")?;
                self.cleaned_up = true;
                if let Err(e) = cgroup.delete() {
                    warn!("could not remove cgroup {}: {e}", cgroup.path());
                }
            }
            None => {
                kill_process_tree(&mut self.child)?;
                self.cleaned_up = true;
            }
        }
        Ok(())
    }
}

impl Drop for ContainedProcess {
    fn drop(&mut self) {
        const CLEANUP_DURATION: Duration = Duration::from_millis(100);
        if let Err(e) = self.try_kill(CLEANUP_DURATION) {
            error!("could not clean up agent process {}: {e:#}", self.child.id());
        }
    }
}
