use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use anyhow::{bail, Context};
use tracing::{error, instrument, trace};

/// Name of the binary every agent crate must provide.
const BIN_NAME: &str = "eval";

/// Build the agent crate in `dir` and return the path of its `eval` binary.
#[instrument]
pub fn compile_single_agent(dir: &Path) -> anyhow::Result<PathBuf> {
    //TODO: --offline to prevent agents from pulling crates at evaluation time
    let args = [
        "build",
        "--release",
        "--bin",
        BIN_NAME,
        "--message-format",
        "short",
    ];
    let dir = dir
        .canonicalize()
        .with_context(|| format!("could not canonicalize {}", dir.display()))?;

    let output = Command::new("cargo")
        .args(args)
        .current_dir(&dir)
        .stdin(Stdio::null())
        .output()
        .context("could not launch command 'cargo'")?;

    if output.status.success() {
        let path = dir
            .join("target/release")
            .join(format!("{BIN_NAME}{}", std::env::consts::EXE_SUFFIX));
        trace!(path = %path.display(), "agent compiled");
        Ok(path)
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let stderr = stderr.trim();
        error!("compilation error: {stderr}");
        bail!(
            "Compilation error: {}",
            stderr.lines().next().unwrap_or_default()
        )
    }
}
