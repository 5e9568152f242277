//! Where agents come from.
//!
//! The evaluator never loads agents itself: it asks an [`AgentRegistry`] for the agent of a
//! player, and runs whatever it gets through the [`Sandbox`](crate::sandbox::Sandbox).
//!
//! Two registries are provided:
//! - [`StaticRegistry`]: agents registered in code,
//! - [`DirectoryRegistry`]: uploaded agents stored as `<root>/player1/`, `<root>/player2/`.

use std::collections::HashMap;
use std::path::PathBuf;

use tracing::{instrument, warn};

use crate::agent::AgentHandle;
use crate::agent_collector::collect_agent;
use crate::board::Mark;
use crate::error::AgentResolutionError;

/// Resolves a player to its agent.
pub trait AgentRegistry {
    /// Agent playing `player`.
    ///
    /// # Errors
    /// [`AgentResolutionError`] if no usable agent exists for `player`.
    fn resolve(&self, player: Mark) -> Result<AgentHandle, AgentResolutionError>;
}

impl<R: AgentRegistry + ?Sized> AgentRegistry for &R {
    fn resolve(&self, player: Mark) -> Result<AgentHandle, AgentResolutionError> {
        (**self).resolve(player)
    }
}

/// Agents registered in code.
#[derive(Debug, Clone, Default)]
pub struct StaticRegistry {
    agents: HashMap<Mark, AgentHandle>,
}

impl StaticRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `agent` for `player`, replacing any previous one.
    pub fn with_agent(mut self, player: Mark, agent: AgentHandle) -> Self {
        self.register(player, agent);
        self
    }

    /// Register `agent` for `player`, replacing any previous one.
    pub fn register(&mut self, player: Mark, agent: AgentHandle) {
        self.agents.insert(player, agent);
    }
}

impl AgentRegistry for StaticRegistry {
    fn resolve(&self, player: Mark) -> Result<AgentHandle, AgentResolutionError> {
        self.agents
            .get(&player)
            .cloned()
            .ok_or_else(|| AgentResolutionError::new(player, "no agent registered"))
    }
}

/// Agents uploaded to a directory, one subdirectory per player slot.
///
/// `<root>/player<N>/` holds the agent of mark `N`: a single executable (or, with
/// `compile`, a cargo crate with an `eval` binary) and an optional YAML argument file.
/// Agents are loaded again on every resolution, so a new upload is picked up by the next
/// match.
#[derive(Debug, Clone)]
pub struct DirectoryRegistry {
    root: PathBuf,
    compile: bool,
}

impl DirectoryRegistry {
    /// Registry reading prebuilt executables under `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        DirectoryRegistry {
            root: root.into(),
            compile: false,
        }
    }

    /// Build agent crates with cargo before running them.
    pub fn with_compile_agents(mut self, value: bool) -> Self {
        self.compile = value;
        self
    }

    /// Directory of `player`'s agent.
    pub fn player_dir(&self, player: Mark) -> PathBuf {
        self.root.join(format!("player{player}"))
    }
}

impl AgentRegistry for DirectoryRegistry {
    #[instrument(skip(self), fields(root = %self.root.display()))]
    fn resolve(&self, player: Mark) -> Result<AgentHandle, AgentResolutionError> {
        let name = format!("player{player}");
        collect_agent(&name, &self.player_dir(player), self.compile)
            .map(AgentHandle::process)
            .map_err(|e| {
                warn!("agent collection failed: {e:#}");
                AgentResolutionError::new(player, format!("{e:#}"))
            })
    }
}
