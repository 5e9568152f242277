//! # Connect Four Arena
//!
//! Runs Connect Four matches between untrusted agents, enforcing the rules of the game and a
//! time limit on every decision.
//!
//! It provides:
//! - Match simulation with a full move log and forfeit handling (`Evaluator::simulate_match`)
//! - Single decisions on an arbitrary board (`Evaluator::get_move`)
//! - Agent resolution through the [`AgentRegistry`](crate::registry::AgentRegistry) trait,
//!   with in-code agents and agents uploaded to a directory
//! - Resource constraints enforced through Linux cgroups v2 and `taskset` for external agents
//!
//! An agent is asked for one column per turn. Whatever it does, the arena keeps going:
//! an agent that errors, panics, crashes, answers too late or plays an impossible column
//! forfeits the match and the reason is recorded in the log.
//!
//! # Documentation Overview
//!
//! - For the operations and agent lifecycle, see the [`server`] module.
//! - For the rules of the game, see [`board`] and [`match_runner`].
//! - For time and resource limits, see [`Configuration`](crate::configuration::Configuration),
//!   [`constraints`] and [`sandbox`].
//! - For writing agents, check out the [`Agent`](crate::game_interface::Agent) trait and the
//!   line protocol in [`game_interface`].
//!
//! # Usage Example
//!
//! ```no_run
//! use std::time::Duration;
//! use connect_four_arena::prelude::*;
//!
//! fn main() -> anyhow::Result<()> {
//!     let constraints = ConstraintsBuilder::new()
//!         .with_ram_per_agent(500) // in MB
//!         .with_action_timeout(Duration::from_secs(2))
//!         .build()?;
//!
//!     // run even if cgroup v2 or taskset are not available
//!     let config = Configuration::new().with_allow_uncontained(true);
//!
//!     // agents stored as ./agents/player1/ and ./agents/player2/
//!     let evaluator = Evaluator::from_directory("agents", config, constraints);
//!     let outcome = evaluator.simulate_match(MatchSettings::default())?;
//!
//!     for entry in outcome.log() {
//!         println!("turn {}: player {} played {}", entry.turn, entry.player, entry.column);
//!     }
//!     println!("{}", outcome.result_text());
//!     Ok(())
//! }
//! ```
//!
//! # Example Agent
//!
//! An external agent is started once per decision, connects back over TCP, reads one request
//! line and answers with a column:
//!
//! ```no_run
//! use std::{
//!     env,
//!     io::{BufRead, BufReader, Write},
//!     net::TcpStream,
//! };
//!
//! fn main() -> anyhow::Result<()> {
//!     let mut args = env::args().skip(1);
//!     let port: u16 = args.next().unwrap().parse()?;
//!     // then: decision timeout in microseconds, then the arguments of the YAML config
//!
//!     let stream = TcpStream::connect(("127.0.0.1", port))?;
//!     let mut line = String::new();
//!     BufReader::new(&stream).read_line(&mut line)?;
//!     let request: serde_json::Value = serde_json::from_str(&line)?;
//!
//!     let columns = request["configuration"]["columns"].as_u64().unwrap();
//!     let board = request["observation"]["board"].as_array().unwrap();
//!     // first column whose top cell is empty
//!     let column = (0..columns).find(|&c| board[c as usize] == 0).unwrap_or(0);
//!
//!     writeln!(&stream, "{column}")?;
//!     Ok(())
//! }
//! ```
#![warn(missing_docs)]

mod agent;
mod agent_collector;
pub mod board;
mod cgroup_manager;
mod client_handler;
pub mod configuration;
pub mod constraints;
pub mod error;
pub mod game_interface;
mod logger;
pub mod match_runner;
pub mod registry;
pub mod sandbox;
pub mod server;

pub use agent::{AgentHandle, Isolation, ProcessAgent};
pub use anyhow;

/// Commonly used types and traits for quick access.
///
/// Import this prelude to get started easily:
/// ```rust
/// use connect_four_arena::prelude::*;
/// ```
///
/// Includes:
/// - [`Configuration`](crate::configuration::Configuration)
/// - [`ConstraintsBuilder`](crate::constraints::ConstraintsBuilder)
/// - [`Evaluator`](crate::server::Evaluator)
/// - the registries, agent types and match types
pub mod prelude {
    pub use crate::agent::{AgentHandle, ProcessAgent};
    pub use crate::board::{Board, Cell, Mark};
    pub use crate::configuration::Configuration;
    pub use crate::constraints::ConstraintsBuilder;
    pub use crate::error::EvalError;
    pub use crate::game_interface::{Agent, GameConfiguration, Observation};
    pub use crate::match_runner::{MatchOutcome, MatchSettings, Move};
    pub use crate::registry::{AgentRegistry, DirectoryRegistry, StaticRegistry};
    pub use crate::server::Evaluator;
}
