//! Entry points of the arena.
//!
//! The [`Evaluator`] owns an [`AgentRegistry`], the per-decision [`Constraints`] and the
//! [`Configuration`], and exposes the two operations of the arena:
//!
//! - [`simulate_match`](Evaluator::simulate_match): play a full match between the agents of
//!   player 1 and player 2,
//! - [`get_move`](Evaluator::get_move): ask one agent for one column on a given board.
//!
//! Agents are resolved on every call, before anything runs: a missing agent is reported as an
//! [`AgentResolutionError`], never as a forfeit.
//!
//! # Uploaded agents
//!
//! [`Evaluator::from_directory`] reads agents from `<root>/player1/` and `<root>/player2/`.
//! Each directory holds a single executable, or a cargo crate providing an `eval` binary when
//! `compile_agents` is set, plus an optional YAML argument file:
//!
//! ```yaml
//! eval: default
//! configs:
//!   - default: "--depth 4"
//! ```
//!
//! ## Uncontained Mode
//!
//! Uploaded agents run inside a cgroup v2 pinned with `taskset`. If
//! `config.allow_uncontained = true`, the evaluator still runs them when either is missing;
//! **only the time limit is enforced** then.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use connect_four_arena::prelude::*;
//!
//! fn main() -> anyhow::Result<()> {
//!     let constraints = ConstraintsBuilder::new()
//!         .with_action_timeout(Duration::from_millis(500))
//!         .build()?;
//!     let left = |_: &Observation, _: &GameConfiguration| -> anyhow::Result<i64> { Ok(0) };
//!     let right = |_: &Observation, _: &GameConfiguration| -> anyhow::Result<i64> { Ok(6) };
//!     let registry = StaticRegistry::new()
//!         .with_agent(Mark::One, AgentHandle::native("left", left))
//!         .with_agent(Mark::Two, AgentHandle::native("right", right));
//!
//!     let evaluator = Evaluator::new(registry, Configuration::new(), constraints);
//!     let outcome = evaluator.simulate_match(MatchSettings::default())?;
//!     println!("{}", outcome.result_text());
//!     Ok(())
//! }
//! ```

use std::path::Path;

use tracing::{info, instrument, trace, warn};

use crate::board::{Board, Mark, ROWS};
use crate::configuration::Configuration;
use crate::constraints::Constraints;
use crate::error::{AgentResolutionError, EvalError, InvalidInput, InvalidMove};
use crate::game_interface::{GameConfiguration, Observation};
use crate::logger::init_logger;
use crate::match_runner::{run_match, MatchOutcome, MatchSettings};
use crate::registry::{AgentRegistry, DirectoryRegistry};
use crate::sandbox::{Invocation, Sandbox};

/// Runs matches and single decisions between the agents of a registry.
#[derive(Debug)]
pub struct Evaluator<R: AgentRegistry> {
    registry: R,
    config: Configuration,
    sandbox: Sandbox,
}

impl Evaluator<DirectoryRegistry> {
    /// Evaluator over the agents uploaded under `root`.
    pub fn from_directory(
        root: impl AsRef<Path>,
        config: Configuration,
        constraints: Constraints,
    ) -> Evaluator<DirectoryRegistry> {
        let registry =
            DirectoryRegistry::new(root.as_ref()).with_compile_agents(config.compile_agents);
        Evaluator::new(registry, config, constraints)
    }
}

impl<R: AgentRegistry> Evaluator<R> {
    /// Create an [`Evaluator`] resolving agents through `registry`.
    ///
    /// With `config.log`, a log file is created in the current directory. Failing to create
    /// it is reported on stderr and does not prevent evaluation.
    #[instrument(skip_all)]
    pub fn new(registry: R, config: Configuration, constraints: Constraints) -> Evaluator<R> {
        if config.log {
            if let Err(e) = init_logger() {
                eprintln!("logger disabled: {e:#}");
            }
        }

        trace!(?config, ?constraints);
        let sandbox = Sandbox::new(&constraints, &config);

        Evaluator {
            registry,
            config,
            sandbox,
        }
    }

    /// Registry agents are resolved from.
    pub fn registry(&self) -> &R {
        &self.registry
    }

    /// Play a full match: player 1 moves first.
    ///
    /// Agent failures during the match end it by forfeit and are reported in the outcome.
    ///
    /// # Errors
    /// [`AgentResolutionError`] if either agent cannot be resolved. No move is played then.
    #[instrument(skip(self))]
    pub fn simulate_match(
        &self,
        settings: MatchSettings,
    ) -> Result<MatchOutcome, AgentResolutionError> {
        let first = self.registry.resolve(Mark::One)?;
        let second = self.registry.resolve(Mark::Two)?;
        info!(%first, %second, "agents resolved");

        let outcome = run_match(&first, &second, settings, &self.sandbox);

        if self.config.verbose {
            print_outcome(&first.to_string(), &second.to_string(), &outcome);
        }
        Ok(outcome)
    }

    /// Ask the agent of `player_mark` for a column on `board` (row-major, `0` empty, `1`/`2`
    /// marks, `6 * columns` cells).
    ///
    /// The request is validated before any agent is resolved or run.
    ///
    /// # Errors
    /// - [`EvalError::InvalidInput`]: bad mark, column count or board
    /// - [`EvalError::Resolution`]: no agent for `player_mark`
    /// - [`EvalError::Timeout`] / [`EvalError::Fault`]: the agent failed
    /// - [`EvalError::InvalidMove`]: the returned column is outside the board or full
    #[instrument(skip(self, board))]
    pub fn get_move(
        &self,
        player_mark: i64,
        board: &[i64],
        columns: usize,
    ) -> Result<usize, EvalError> {
        let mark = u8::try_from(player_mark)
            .ok()
            .and_then(|m| Mark::try_from(m).ok())
            .ok_or(InvalidInput::PlayerMark { mark: player_mark })?;
        let board = Board::from_raw(board, columns)?;

        let agent = self.registry.resolve(mark)?;
        let configuration = GameConfiguration {
            columns,
            rows: ROWS,
        };
        let observation = Observation {
            board: board.snapshot(),
            mark,
        };

        let column = match self.sandbox.invoke(&agent, observation, &configuration)? {
            Invocation::Completed(column) => column,
            Invocation::Faulted(fault) => {
                warn!(%agent, %fault, "agent faulted");
                return Err(fault.into());
            }
        };

        if !board.is_valid_column(column) {
            return Err(InvalidMove::InvalidColumn.into());
        }
        let column = column as usize;
        if board.is_column_full(column) {
            return Err(InvalidMove::ColumnFull.into());
        }
        trace!(%agent, column, "move selected");
        Ok(column)
    }
}

fn print_outcome(first: &str, second: &str, outcome: &MatchOutcome) {
    let color = match outcome.winner() {
        None => "\x1b[33m",
        Some(_) => "\x1b[32m",
    };
    let reason = outcome
        .log()
        .last()
        .and_then(|entry| entry.reason.as_deref())
        .map(|reason| format!(" \x1b[31m{reason}\x1b[39m"))
        .unwrap_or_default();
    // green (yellow on draw) result, red forfeit reason
    println!(
        "{first} vs {second}: {color}{}\x1b[39m after {} turns{reason}",
        outcome.result_text(),
        outcome.log().len()
    );
}
