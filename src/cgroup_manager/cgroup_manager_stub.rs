use std::{
    process::{Child, ExitStatus},
    time::Duration,
};

use anyhow::bail;
use tracing::error;

use super::{create_process, kill_process_tree, ProcessLimits};

/// Agent child process, killed on drop.
#[derive(Debug)]
pub struct ContainedProcess {
    child: Child,
    cleaned_up: bool,
}

impl ContainedProcess {
    /// cgroups are only available on linux.
    pub fn launch(
        _command: &str,
        _args: &[String],
        _limits: &ProcessLimits,
        _allow_stderr: bool,
    ) -> anyhow::Result<ContainedProcess> {
        bail!("cgroups only available on linux")
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
            cleaned_up: false,
        })
    }

    /// Exit status, if the process already exited.
    pub fn try_exit_status(&mut self) -> Option<ExitStatus> {
        self.child.try_wait().ok().flatten()
    }

    /// Kill the process and its process group, then reap it.
    pub fn try_kill(&mut self, _max_duration: Duration) -> anyhow::Result<()> {
        if self.cleaned_up {
            return Ok(());
        }
        kill_process_tree(&mut self.child)?;
        self.cleaned_up = true;
        Ok(())
    }
}

impl Drop for ContainedProcess {
    fn drop(&mut self) {
        if let Err(e) = self.try_kill(Duration::from_millis(100)) {
            error!("could not clean up agent process {}: {e:#}", self.child.id());
        }
    }
}
