use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use tracing::{info, instrument};

use crate::agent::ProcessAgent;
use crate::agent_collector::config_file_utils::{check_dir_integrity, is_yaml};

mod agent_compiler;

mod config_file_utils;

/// Load the agent stored in `dir`.
///
/// With `compile`, `dir` is a cargo crate providing an `eval` binary. Otherwise it holds a
/// single executable. Either way an optional YAML file provides the launch arguments.
#[instrument]
pub fn collect_agent(name: &str, dir: &Path, compile: bool) -> anyhow::Result<ProcessAgent> {
    check_dir_integrity(dir)?;

    let path_to_exe = if compile {
        agent_compiler::compile_single_agent(dir)?
    } else {
        collect_binary(dir)?
    };
    let args = config_file_utils::get_eval_args(dir).context("invalid agent config")?;
    info!(exe = %path_to_exe.display(), ?args, "agent collected");

    Ok(ProcessAgent::new(name, path_to_exe, args))
}

fn collect_binary(dir: &Path) -> anyhow::Result<PathBuf> {
    let mut binaries = vec![];
    for entry in std::fs::read_dir(dir).context("error reading directory")? {
        let entry = entry.context("one entry cannot be read in directory")?;
        let metadata = entry
            .metadata()
            .with_context(|| format!("cannot read metadata of {:?}", entry.file_name()))?;
        if !metadata.is_file() {
            bail!("{:?} is not a file", entry.file_name());
        }
        let path = entry.path();
        if !is_yaml(&path) {
            binaries.push(path);
        }
    }
    match binaries.len() {
        0 => bail!("binary not found in {}", dir.display()),
        1 => Ok(binaries.remove(0)),
        n => bail!("directory contains {n} files besides the config, expected a single binary"),
    }
}
