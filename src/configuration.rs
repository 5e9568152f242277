//! Config for the evaluator behaviors
//!
//! This module provides configuration options for controlling how the evaluator reports
//! progress, collects agents and contains agent processes.
//!
//! Configuration can be created programmatically using [`Configuration::new()`] or by reading
//! environment variables using [`Configuration::from_env()`].
//!
//! # Environment Variables
//!
//! All values are optional, and case-insensitive. Set the value to `"true"` to enable a flag.
//!
//! - `ARENA_VERBOSE`: Print match results to stdout (default: `false`)
//! - `ARENA_LOG`: Enable logging to a file (default: `false`)
//! - `ARENA_ALLOW_UNCONTAINED`: Run process agents without cgroup/`taskset` when those are
//!   unavailable (default: `false`)
//! - `ARENA_COMPILE_AGENTS`: Build agent crates with cargo before running them (default: `false`)
//! - `ARENA_DEBUG_AGENT_STDERR`: Forward agent stderr for debugging (default: `false`)

/// Configuration for evaluator behaviors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Configuration {
    pub(crate) verbose: bool,
    pub(crate) log: bool,
    pub(crate) allow_uncontained: bool,
    pub(crate) compile_agents: bool,
    pub(crate) debug_agent_stderr: bool,
}

impl Configuration {
    /// Create a new configuration with default parameters.
    ///
    /// By default:
    /// - Nothing is printed to stdout.
    /// - Logging to file is disabled.
    /// - Process agents must run contained (cgroup v2 available).
    /// - Agent directories hold prebuilt executables.
    /// - Agent stderr output is discarded.
    pub fn new() -> Self {
        Self {
            verbose: false,
            log: false,
            allow_uncontained: false,
            compile_agents: false,
            debug_agent_stderr: false,
        }
    }

    /// Create configuration from environment variables.
    ///
    /// Any value other than `"true"` (including unset) keeps the default of the flag.
    pub fn from_env() -> Self {
        fn get_env_flag(var: &str, default: bool) -> bool {
            match std::env::var(var) {
                Ok(val) => val.eq_ignore_ascii_case("true"),
                Err(_) => default,
            }
        }

        Self {
            verbose: get_env_flag("ARENA_VERBOSE", false),
            log: get_env_flag("ARENA_LOG", false),
            allow_uncontained: get_env_flag("ARENA_ALLOW_UNCONTAINED", false),
            compile_agents: get_env_flag("ARENA_COMPILE_AGENTS", false),
            debug_agent_stderr: get_env_flag("ARENA_DEBUG_AGENT_STDERR", false),
        }
    }

    /// Enable or disable printing match results.
    pub fn with_verbose(mut self, value: bool) -> Self {
        self.verbose = value;
        self
    }

    /// Enable or disable logging to file.
    pub fn with_log(mut self, value: bool) -> Self {
        self.log = value;
        self
    }

    /// Allow process agents to run without containment when cgroups are unavailable.
    ///
    /// Only the time limit is enforced on uncontained agents.
    pub fn with_allow_uncontained(mut self, value: bool) -> Self {
        self.allow_uncontained = value;
        self
    }

    /// Enable or disable agent compilation.
    ///
    /// When enabled, agent directories are expected to be cargo crates with an `eval` binary.
    pub fn with_compile_agents(mut self, value: bool) -> Self {
        self.compile_agents = value;
        self
    }

    /// Enable or disable agent stderr output (debug purposes only).
    pub fn with_debug_agent_stderr(mut self, value: bool) -> Self {
        self.debug_agent_stderr = value;
        self
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Self::new()
    }
}
