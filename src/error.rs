//! Errors surfaced by the evaluator.
//!
//! Inside a match, agent failures ([`AgentTimeout`], [`AgentFault`], [`InvalidMove`]) are
//! turned into forfeits and recorded in the move log. They only reach the caller through
//! [`Evaluator::get_move`](crate::server::Evaluator::get_move), wrapped in [`EvalError`].
//! [`AgentResolutionError`] and [`InvalidInput`] always reach the caller.

use derive_more::{Display, Error, From};

use crate::board::Mark;

/// The registry could not produce an agent for a player.
#[derive(Debug, Clone, PartialEq, Eq, Display, Error)]
#[display("could not resolve agent for player {player}: {reason}")]
pub struct AgentResolutionError {
    /// Player the agent was requested for.
    pub player: Mark,
    /// Why resolution failed.
    pub reason: String,
}

impl AgentResolutionError {
    /// Build a resolution error for `player`.
    pub fn new(player: Mark, reason: impl Into<String>) -> Self {
        Self {
            player,
            reason: reason.into(),
        }
    }
}

/// The agent did not answer before its deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Error)]
#[display("Agent timed out.")]
pub struct AgentTimeout;

/// The agent failed before its deadline (returned an error, panicked, crashed, or answered
/// garbage).
#[derive(Debug, Clone, PartialEq, Eq, Display, Error)]
#[display("{message}")]
pub struct AgentFault {
    /// Human readable description of the failure.
    pub message: String,
}

impl AgentFault {
    /// Build a fault from its description.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// The column returned by an agent cannot be played.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Error)]
pub enum InvalidMove {
    /// Column outside `0..columns`.
    #[display("Invalid column")]
    InvalidColumn,
    /// No empty cell left in the column.
    #[display("Column full")]
    ColumnFull,
}

/// Malformed request given to the evaluator. Rejected before any agent runs.
#[derive(Debug, Clone, PartialEq, Eq, Display, Error)]
pub enum InvalidInput {
    /// Board state does not have `rows * columns` cells.
    #[display("Invalid board state: expected {expected} cells, got {actual}")]
    BoardLength {
        /// `rows * columns`
        expected: usize,
        /// length received
        actual: usize,
    },
    /// A cell holds something other than 0, 1 or 2.
    #[display("Invalid board state: cell {index} holds {value}")]
    CellValue {
        /// Row-major index of the cell.
        index: usize,
        /// Offending value.
        value: i64,
    },
    /// Player mark other than 1 or 2.
    #[display("Invalid player mark: {mark}")]
    PlayerMark {
        /// Offending mark.
        mark: i64,
    },
    /// A board needs at least one column.
    #[display("Invalid column count: {columns}")]
    Columns {
        /// Offending column count.
        columns: usize,
    },
}

/// Every failure [`Evaluator::get_move`](crate::server::Evaluator::get_move) can report.
#[derive(Debug, Clone, PartialEq, Eq, Display, Error, From)]
pub enum EvalError {
    /// See [`AgentResolutionError`].
    #[display("{_0}")]
    Resolution(AgentResolutionError),
    /// See [`AgentTimeout`].
    #[display("{_0}")]
    Timeout(AgentTimeout),
    /// See [`AgentFault`].
    #[display("{_0}")]
    Fault(AgentFault),
    /// See [`InvalidMove`].
    #[display("{_0}")]
    InvalidMove(InvalidMove),
    /// See [`InvalidInput`].
    #[display("{_0}")]
    InvalidInput(InvalidInput),
}
