//! Bounded invocation of untrusted agents.
//!
//! The [`Sandbox`] runs one agent decision in an isolated execution context and classifies
//! what happened:
//!
//! - [`Invocation::Completed`]: the agent answered before the deadline,
//! - [`Invocation::Faulted`]: the agent failed before the deadline (error, panic, crash,
//!   unreadable answer),
//! - `Err(`[`AgentTimeout`]`)`: no answer before the deadline.
//!
//! The isolation strategy follows the agent handle:
//!
//! - in-process agents run on a fresh worker thread. A panic stays in the worker. A worker
//!   that misses the deadline cannot be killed safely; it is detached and its result channel
//!   is closed, so a late answer is never observed.
//! - external agents run as a fresh child process (inside a cgroup when available), which is
//!   killed as soon as the decision is over, whatever its outcome.
//!
//! In both cases the caller waits at most the configured timeout (plus process teardown).

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, instrument, warn};

use crate::agent::{AgentHandle, ProcessAgent};
use crate::cgroup_manager::ProcessLimits;
use crate::client_handler::{ClientError, ClientHandler, LaunchSettings};
use crate::configuration::Configuration;
use crate::constraints::Constraints;
use crate::error::{AgentFault, AgentTimeout};
use crate::game_interface::{encode_request, parse_response, Agent, GameConfiguration, Observation};

/// Outcome of an agent decision that did not time out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invocation {
    /// The agent returned this column (not validated).
    Completed(i64),
    /// The agent failed.
    Faulted(AgentFault),
}

/// Runs agent decisions under a deadline.
#[derive(Debug, Clone)]
pub struct Sandbox {
    timeout: Duration,
    launch: LaunchSettings,
}

impl Sandbox {
    /// Sandbox applying `constraints` with the containment policy of `config`.
    pub fn new(constraints: &Constraints, config: &Configuration) -> Sandbox {
        Sandbox {
            timeout: constraints.action_timeout(),
            launch: LaunchSettings {
                limits: ProcessLimits {
                    max_memory: constraints.agent_ram,
                    cpus: constraints.cpu_list(),
                },
                allow_uncontained: config.allow_uncontained,
                allow_stderr: config.debug_agent_stderr,
            },
        }
    }

    /// Deadline of each decision.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Ask `agent` for a column.
    ///
    /// `observation` is moved into the isolated context: the agent never sees the caller's
    /// board.
    ///
    /// # Errors
    /// [`AgentTimeout`] if the agent did not answer within [`timeout`](Self::timeout).
    #[instrument(skip_all, fields(agent = %agent, mark = %observation.mark))]
    pub fn invoke(
        &self,
        agent: &AgentHandle,
        observation: Observation,
        configuration: &GameConfiguration,
    ) -> Result<Invocation, AgentTimeout> {
        let start = Instant::now();
        let outcome = match agent {
            AgentHandle::Native { name, agent } => {
                self.invoke_on_thread(name, agent, observation, *configuration)
            }
            AgentHandle::Process(agent) => {
                self.invoke_in_process(agent, &observation, configuration)
            }
        };
        debug!(elapsed = ?start.elapsed(), ?outcome);
        outcome
    }

    fn invoke_on_thread(
        &self,
        name: &str,
        agent: &Arc<dyn Agent>,
        observation: Observation,
        configuration: GameConfiguration,
    ) -> Result<Invocation, AgentTimeout> {
        let (tx, rx) = mpsc::sync_channel(1);
        let agent = Arc::clone(agent);

        let spawned = thread::Builder::new()
            .name(format!("agent-{name}"))
            .spawn(move || {
                let result = panic::catch_unwind(AssertUnwindSafe(|| {
                    agent.select_column(&observation, &configuration)
                }));
                // fails only once the caller stopped waiting
                let _ = tx.send(result);
            });
        if let Err(e) = spawned {
            warn!("could not spawn agent worker: {e}");
            return Ok(Invocation::Faulted(AgentFault::new(format!(
                "could not start agent worker: {e}"
            ))));
        }

        match rx.recv_timeout(self.timeout) {
            Ok(Ok(Ok(column))) => Ok(Invocation::Completed(column)),
            Ok(Ok(Err(e))) => Ok(Invocation::Faulted(AgentFault::new(format!("{e:#}")))),
            Ok(Err(payload)) => Ok(Invocation::Faulted(AgentFault::new(panic_message(&payload)))),
            Err(mpsc::RecvTimeoutError::Timeout) => {
                warn!("agent worker missed its deadline and is abandoned");
                Err(AgentTimeout)
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => Ok(Invocation::Faulted(AgentFault::new(
                "agent worker stopped without answering",
            ))),
        }
    }

    fn invoke_in_process(
        &self,
        agent: &ProcessAgent,
        observation: &Observation,
        configuration: &GameConfiguration,
    ) -> Result<Invocation, AgentTimeout> {
        let deadline = Instant::now() + self.timeout;

        let exchange = || -> Result<i64, ClientError> {
            let request = encode_request(observation, configuration)?;
            let mut client = ClientHandler::init(agent, &self.launch, self.timeout, deadline)?;
            let line = client.send_and_recv(request.as_bytes(), deadline)?;
            if let Err(e) = client.kill_child() {
                warn!("could not kill agent process: {e:#}");
            }
            Ok(parse_response(&line)?)
        };

        match exchange() {
            Ok(column) => Ok(Invocation::Completed(column)),
            Err(ClientError::TimedOut) => Err(AgentTimeout),
            Err(ClientError::Failed(e)) => {
                Ok(Invocation::Faulted(AgentFault::new(format!("{e:#}"))))
            }
        }
    }
}

impl Default for Sandbox {
    /// Default constraints and configuration: 2 second timeout, contained processes only.
    fn default() -> Self {
        Sandbox::new(&Constraints::default(), &Configuration::default())
    }
}

fn panic_message(payload: &Box<dyn Any + Send>) -> String {
    let msg = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string());
    format!("agent panicked: {msg}")
}
