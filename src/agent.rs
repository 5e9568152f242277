use std::{fmt::Display, path::PathBuf, sync::Arc};

use crate::game_interface::Agent;

/// How an agent is isolated from the evaluator while it decides.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Isolation {
    /// Worker thread. Errors and panics are contained, a runaway thread is abandoned.
    Thread,
    /// Child process, optionally inside a cgroup. Killed after every decision.
    Process,
}

impl Display for Isolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Isolation::Thread => write!(f, "thread"),
            Isolation::Process => write!(f, "process"),
        }
    }
}

/// An external agent: an executable speaking the line protocol of
/// [`game_interface`](crate::game_interface).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProcessAgent {
    /// Name used in logs and move logs.
    pub name: String,
    /// Executable launched for every decision.
    pub path_to_exe: PathBuf,
    /// Appended after the port and timeout arguments.
    pub args: Vec<String>,
}

impl ProcessAgent {
    /// Describe an executable agent.
    pub fn new(
        name: impl Into<String>,
        path_to_exe: impl Into<PathBuf>,
        args: Vec<String>,
    ) -> Self {
        ProcessAgent {
            name: name.into(),
            path_to_exe: path_to_exe.into(),
            args,
        }
    }
}

/// A resolved, untrusted agent.
///
/// Cheap to clone. Only ever invoked through the [`Sandbox`](crate::sandbox::Sandbox).
#[derive(Clone)]
pub enum AgentHandle {
    /// Compiled-in agent, run on a worker thread.
    Native {
        /// Name used in logs.
        name: String,
        /// The decision function.
        agent: Arc<dyn Agent>,
    },
    /// Executable, run as a child process.
    Process(Arc<ProcessAgent>),
}

impl AgentHandle {
    /// Wrap an in-process agent.
    ///
    /// Native agents run on a worker thread of the evaluator. A worker that misses its
    /// deadline is abandoned, not stopped, and keeps its thread until it returns: native
    /// agents must be trusted to terminate. Untrusted code belongs in a [`ProcessAgent`]
    /// (see [`AgentHandle::process`]), which is killed after every decision.
    pub fn native(name: impl Into<String>, agent: impl Agent + 'static) -> Self {
        AgentHandle::Native {
            name: name.into(),
            agent: Arc::new(agent),
        }
    }

    /// Wrap an executable agent.
    pub fn process(agent: ProcessAgent) -> Self {
        AgentHandle::Process(Arc::new(agent))
    }

    /// Name of the agent.
    pub fn name(&self) -> &str {
        match self {
            AgentHandle::Native { name, .. } => name,
            AgentHandle::Process(agent) => &agent.name,
        }
    }

    /// Isolation strategy the sandbox uses for this agent.
    pub fn isolation(&self) -> Isolation {
        match self {
            AgentHandle::Native { .. } => Isolation::Thread,
            AgentHandle::Process(_) => Isolation::Process,
        }
    }
}

impl std::fmt::Debug for AgentHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentHandle::Native { name, .. } => {
                f.debug_struct("Native").field("name", name).finish()
            }
            AgentHandle::Process(agent) => f.debug_tuple("Process").field(agent).finish(),
        }
    }
}

impl Display for AgentHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name(), self.isolation())
    }
}
