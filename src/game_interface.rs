//! What an agent sees and what it must implement.
//!
//! An agent is an opaque decision function `(observation, configuration) -> column`.
//! In-process agents implement [`Agent`] (any matching closure does); external agents are
//! executables speaking the line protocol described below.
//!
//! # Line protocol
//!
//! An external agent is launched once per decision with the arguments
//! `<port> <timeout in microseconds> [extra args...]`. It must connect to
//! `127.0.0.1:<port>`, read one JSON line
//!
//! ```text
//! {"observation":{"board":[0,0,...,1,2],"mark":1},"configuration":{"columns":7,"rows":6}}
//! ```
//!
//! and answer with one line holding the chosen column, e.g. `3\n`.

use serde::{Deserialize, Serialize};

use crate::board::{Cell, Mark, DEFAULT_COLUMNS, ROWS};
use crate::error::InvalidInput;

/// Snapshot of the game given to an agent for one decision.
///
/// Always a copy: an agent cannot reach the board the match is played on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    /// Row-major cells, row 0 being the top.
    pub board: Vec<Cell>,
    /// Mark of the player who must move.
    pub mark: Mark,
}

/// Read-only parameters visible to an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameConfiguration {
    /// Number of columns.
    pub columns: usize,
    /// Number of rows, always [`ROWS`].
    pub rows: usize,
}

impl GameConfiguration {
    /// Configuration for a board of `columns` columns.
    ///
    /// # Errors
    /// [`InvalidInput::Columns`] if `columns` is zero.
    pub fn new(columns: usize) -> Result<Self, InvalidInput> {
        if columns == 0 {
            return Err(InvalidInput::Columns { columns });
        }
        Ok(Self {
            columns,
            rows: ROWS,
        })
    }

    /// `rows * columns`
    pub fn cell_count(&self) -> usize {
        self.rows * self.columns
    }
}

impl Default for GameConfiguration {
    fn default() -> Self {
        Self {
            columns: DEFAULT_COLUMNS,
            rows: ROWS,
        }
    }
}

/// An in-process decision function.
///
/// Implementations are untrusted: the evaluator only calls them through the
/// [`Sandbox`](crate::sandbox::Sandbox), on a worker thread, with a deadline. Returning an
/// error or panicking forfeits the match.
///
/// The returned column is not checked by the agent side, hence `i64`: out of range values
/// are a legal answer that loses the game.
pub trait Agent: Send + Sync {
    /// Choose a column for `observation.mark`.
    fn select_column(
        &self,
        observation: &Observation,
        configuration: &GameConfiguration,
    ) -> anyhow::Result<i64>;
}

impl<F> Agent for F
where
    F: Fn(&Observation, &GameConfiguration) -> anyhow::Result<i64> + Send + Sync,
{
    fn select_column(
        &self,
        observation: &Observation,
        configuration: &GameConfiguration,
    ) -> anyhow::Result<i64> {
        self(observation, configuration)
    }
}

#[derive(Serialize)]
struct AgentRequest<'a> {
    observation: &'a Observation,
    configuration: &'a GameConfiguration,
}

/// Encode the request line sent to an external agent, trailing newline included.
pub(crate) fn encode_request(
    observation: &Observation,
    configuration: &GameConfiguration,
) -> anyhow::Result<String> {
    let mut line = serde_json::to_string(&AgentRequest {
        observation,
        configuration,
    })?;
    line.push('\n');
    Ok(line)
}

/// Parse the answer line of an external agent.
pub(crate) fn parse_response(line: &str) -> anyhow::Result<i64> {
    let trimmed = line.trim();
    trimmed
        .parse::<i64>()
        .map_err(|_| anyhow::anyhow!("invalid response '{trimmed}', expected a column number"))
}
