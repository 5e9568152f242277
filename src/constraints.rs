//! Defines limits applied to every agent invocation.
//!
//! The main entry point is the [`ConstraintsBuilder`] struct, which uses a builder pattern
//! to configure:
//!
//! - **Action timeout**: wall-clock time an agent has to pick a column (default 2 seconds).
//!   Applies to every agent, in-process or external.
//! - **Memory**: maximum RAM of an external agent process, enforced with cgroups v2.
//! - **CPU affinity**: CPUs an external agent process may run on, enforced with `taskset`
//!   and the cgroup cpuset.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use connect_four_arena::constraints::ConstraintsBuilder;
//!
//! let constraints = ConstraintsBuilder::new()
//!     .with_ram_per_agent(512)
//!     .with_cpu_list("0-1")
//!     .with_action_timeout(Duration::from_millis(500))
//!     .build()
//!     .unwrap();
//! ```
//!
//! You may also construct constraints from environment variables using
//! [`ConstraintsBuilder::from_env()`].

use std::{collections::BTreeSet, env, time::Duration};

use anyhow::{bail, Context};
use tracing::trace;

/// Time an agent has to answer when nothing else is configured.
pub const DEFAULT_ACTION_TIMEOUT: Duration = Duration::from_secs(2);

/// A builder for the limits applied to agents.
///
/// By default agents get [`DEFAULT_ACTION_TIMEOUT`] per decision, and no memory or CPU
/// restriction.
#[derive(Debug, Default)]
pub struct ConstraintsBuilder {
    agent_ram: Option<usize>,
    cpus: Option<String>,
    action_time: Option<Duration>,
}

impl ConstraintsBuilder {
    /// Creates a new `ConstraintsBuilder` with the default timeout and no resource limits.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new `ConstraintsBuilder` configured from environment variables.
    ///
    /// Read environment variables are:
    /// - `RAM_PER_AGENT` (usize): maximum RAM per agent process in MB
    /// - `CPU_LIST` (string): comma-separated list or ranges of CPUs, e.g. "0-3,6"
    /// - `ACTION_TIMEOUT_MS` (u64): timeout per decision in milliseconds
    #[must_use]
    pub fn from_env() -> Self {
        fn parse_usize(var: &str) -> Option<usize> {
            env::var(var).ok()?.parse().ok()
        }

        fn parse_duration_millis(var: &str) -> Option<Duration> {
            env::var(var)
                .ok()?
                .parse::<u64>()
                .ok()
                .map(Duration::from_millis)
        }

        ConstraintsBuilder {
            agent_ram: parse_usize("RAM_PER_AGENT"),
            cpus: env::var("CPU_LIST").ok(),
            action_time: parse_duration_millis("ACTION_TIMEOUT_MS"),
        }
    }

    /// Sets the maximum RAM available per agent process (in MB).
    #[must_use]
    pub fn with_ram_per_agent(self, max: usize) -> Self {
        Self {
            agent_ram: Some(max),
            ..self
        }
    }

    /// Sets the CPUs agent processes may run on.
    ///
    /// Format follows the pattern: `"0-3,6,8"` (inclusive ranges and individual IDs).
    #[must_use]
    pub fn with_cpu_list(self, cpus: &str) -> Self {
        Self {
            cpus: Some(cpus.to_string()),
            ..self
        }
    }

    /// Sets the maximum duration allowed for a single decision.
    #[must_use]
    pub fn with_action_timeout(self, duration: Duration) -> Self {
        Self {
            action_time: Some(duration),
            ..self
        }
    }

    /// Consumes the builder and returns the constructed `Constraints`.
    ///
    /// # Errors
    ///
    /// Returns an error when constraints are impossible: zero timeout, more RAM per agent
    /// than the host has, malformed CPU list or CPU ids the host does not have.
    pub fn build(self) -> anyhow::Result<Constraints> {
        let action_time = self.action_time.unwrap_or(DEFAULT_ACTION_TIMEOUT);
        if action_time.is_zero() {
            bail!("action timeout must be greater than zero");
        }

        let agent_ram = match self.agent_ram {
            Some(0) => bail!("agent RAM must be greater than zero"),
            Some(mb) => {
                let mut sys = sysinfo::System::new();
                sys.refresh_memory();
                let total = sys.total_memory() as usize;
                let bytes = mb * 1_000_000;
                if total != 0 && bytes > total {
                    bail!(
                        "Agent RAM size ({mb}MB) is greater than total RAM ({}MB)",
                        total / 1_000_000
                    );
                }
                Some(bytes)
            }
            None => None,
        };

        let cpus = match self.cpus {
            Some(s) => {
                let set = cpu_list_to_set(&s).context("error parsing cpu list")?;
                let available = num_cpus::get();
                if let Some(cpu) = set.iter().find(|&&cpu| cpu as usize >= available) {
                    bail!("cpu {cpu} does not exist (only {available} logical CPUs)");
                }
                Some(set)
            }
            None => None,
        };

        let constraints = Constraints {
            agent_ram,
            cpus,
            action_time,
        };
        trace!(?constraints);
        Ok(constraints)
    }
}

fn cpu_list_to_set(s: &str) -> anyhow::Result<BTreeSet<u8>> {
    if s.is_empty() {
        bail!("Empty string");
    }
    let mut set = BTreeSet::new();
    for item in s.split(',') {
        let bounds = item
            .split('-')
            .map(|v| {
                v.trim()
                    .parse::<u8>()
                    .with_context(|| format!("could not parse {v}"))
            })
            .collect::<anyhow::Result<Vec<u8>>>()?;
        match bounds[..] {
            [cpu] => {
                set.insert(cpu);
            }
            [start, end] => set.extend(start.min(end)..=start.max(end)),
            _ => bail!(
                "each comma-separated item must be a number or a range (e.g. '0-3'), got '{item}'"
            ),
        }
    }
    Ok(set)
}

/// Obtained using `ConstraintsBuilder`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Constraints {
    /// bytes
    pub(crate) agent_ram: Option<usize>,
    pub(crate) cpus: Option<BTreeSet<u8>>,
    pub(crate) action_time: Duration,
}

impl Constraints {
    /// create a ConstraintsBuilder
    pub fn builder() -> ConstraintsBuilder {
        ConstraintsBuilder::new()
    }

    /// Deadline of a single decision.
    pub fn action_timeout(&self) -> Duration {
        self.action_time
    }

    /// CPU list in cgroup/taskset format (`"0,1,4"`), if restricted.
    pub(crate) fn cpu_list(&self) -> Option<String> {
        self.cpus.as_ref().map(|cpus| {
            cpus.iter()
                .map(u8::to_string)
                .collect::<Vec<_>>()
                .join(",")
        })
    }
}

impl Default for Constraints {
    fn default() -> Self {
        Constraints {
            agent_ram: None,
            cpus: None,
            action_time: DEFAULT_ACTION_TIMEOUT,
        }
    }
}
