//! Agent argument files.
//!
//! An agent directory may carry one `.yaml`/`.yml` file naming the arguments to launch the
//! agent with:
//!
//! ```yaml
//! eval: default
//! configs:
//!   - default: "--depth 4"
//!   - fast: "--depth 1"
//! ```
//!
//! Only this subset of YAML is understood.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context};
use tracing::{error, instrument};

/// Arguments of the `eval` config of the YAML file in `dir`, or no argument when the
/// directory has no YAML file.
pub fn get_eval_args(dir: &Path) -> anyhow::Result<Vec<String>> {
    let Some(config_file) = find_yaml(dir)? else {
        return Ok(vec![]);
    };
    let yaml = std::fs::read_to_string(&config_file)
        .with_context(|| format!("could not read {}", config_file.display()))?;
    let full_config = parse_yaml(&yaml)?;
    let config_name = &full_config.eval;
    let config = full_config
        .configs
        .get(config_name)
        .with_context(|| format!("unknown config '{config_name}'"))?;
    get_args_from_config(config)
}

fn get_args_from_config(config: &str) -> anyhow::Result<Vec<String>> {
    if config.contains(['"', '\'', '`']) {
        bail!("arguments should not contain any quote")
    }
    Ok(config.split_whitespace().map(String::from).collect())
}

#[derive(Debug)]
struct ConfigFile {
    eval: String,
    configs: HashMap<String, String>,
}

fn parse_yaml(yaml: &str) -> anyhow::Result<ConfigFile> {
    let mut eval = None;
    let mut configs = HashMap::new();
    let mut in_configs = false;

    for (i, line) in yaml.lines().enumerate() {
        let line = line.trim_end();
        let line_number = i + 1;

        if line.trim().is_empty() || line.trim().starts_with('#') {
            continue;
        }

        // a top-level key ends the `configs` list
        if in_configs && !line.starts_with([' ', '\t', '-']) {
            in_configs = false;
        }

        if !in_configs {
            if let Some(value) = line.strip_prefix("eval:") {
                let value = value.trim();
                if value.is_empty() {
                    bail!("Line {line_number}: 'eval' value missing");
                }
                eval = Some(value.to_string());
            } else if line.starts_with("configs:") {
                in_configs = true;
            } else {
                bail!("Line {line_number}: Expected 'eval:' or 'configs:' key");
            }
            continue;
        }

        // '- key: "value"'
        let Some(rest) = line.trim_start().strip_prefix('-') else {
            bail!("Line {line_number}: Expected list item starting with '-'");
        };
        let (key, value_part) = rest
            .split_once(':')
            .with_context(|| format!("Line {line_number}: Missing ':' in config item"))?;
        let value = value_part
            .trim()
            .strip_prefix('"')
            .and_then(|v| v.split_once('"'))
            .map(|(value, _)| value)
            .with_context(|| {
                format!("Line {line_number}: Value must be quoted with double quotes")
            })?;

        configs.insert(key.trim().to_string(), value.to_string());
    }

    let eval = eval.context("Missing 'eval' key")?;

    Ok(ConfigFile { eval, configs })
}

#[instrument]
pub(super) fn check_dir_integrity(dir: &Path) -> anyhow::Result<()> {
    let metadata = match dir.metadata() {
        Ok(metadata) => metadata,
        Err(e) => {
            error!("Error reading directory: {}", e);
            bail!("error reading directory {}: {}", dir.display(), e);
        }
    };
    if !metadata.is_dir() {
        error!("Not a directory");
        bail!("{} is not a directory", dir.display());
    }
    Ok(())
}

fn find_yaml(dir: &Path) -> anyhow::Result<Option<PathBuf>> {
    check_dir_integrity(dir)?;

    let mut result: Option<PathBuf> = None;
    for entry in std::fs::read_dir(dir)?.flatten() {
        if !entry.metadata().is_ok_and(|m| m.is_file()) {
            continue;
        }
        let path = entry.path();
        if !is_yaml(&path) {
            continue;
        }
        if let Some(previous) = &result {
            bail!(
                "two YAML files found: {} and {}",
                previous.display(),
                path.display()
            );
        }
        result = Some(path);
    }
    Ok(result)
}

pub(super) fn is_yaml(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext == "yaml" || ext == "yml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_eval_config() {
        let yaml = "# agent settings\neval: deep\nconfigs:\n  \
                    - fast: \"--depth 1\"\n  - deep: \"--depth 6 --book\"\n";
        let config = parse_yaml(yaml).unwrap();
        assert_eq!(config.eval, "deep");
        assert_eq!(config.configs["fast"], "--depth 1");
        assert_eq!(
            get_args_from_config(&config.configs["deep"]).unwrap(),
            vec!["--depth", "6", "--book"]
        );
    }

    #[test]
    fn eval_may_follow_configs() {
        let yaml = "configs:\n  - a: \"\"\neval: a\n";
        let config = parse_yaml(yaml).unwrap();
        assert_eq!(config.eval, "a");
        assert!(get_args_from_config(&config.configs["a"]).unwrap().is_empty());
    }

    #[test]
    fn rejects_malformed_yaml() {
        assert!(parse_yaml("configs:\n  - a: \"x\"\n").is_err());
        assert!(parse_yaml("eval:\n").is_err());
        assert!(parse_yaml("eval: a\nconfigs:\n  - a: x\n").is_err());
        assert!(parse_yaml("eval: a\nconfigs:\n  a: \"x\"\n").is_err());
        assert!(get_args_from_config("--name 'bob'").is_err());
    }

    #[test]
    fn reads_args_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert!(get_eval_args(dir.path()).unwrap().is_empty());

        std::fs::write(
            dir.path().join("agent.yml"),
            "eval: default\nconfigs:\n  - default: \"--seed 3\"\n",
        )
        .unwrap();
        assert_eq!(get_eval_args(dir.path()).unwrap(), vec!["--seed", "3"]);

        std::fs::write(dir.path().join("other.yaml"), "eval: x\n").unwrap();
        assert!(get_eval_args(dir.path()).is_err());
    }
}
