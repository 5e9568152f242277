//! The turn loop of a single match.
//!
//! [`run_match`] plays a match to its end and returns an owned [`MatchOutcome`]: the winner
//! and the log of every turn. Agent failures never escape as errors; the player to move
//! when one happens forfeits:
//!
//! | what happened                     | winner    | log entry                        |
//! |-----------------------------------|-----------|----------------------------------|
//! | agent faulted                     | opponent  | `move: "ERROR"`, reason = error  |
//! | agent timed out                   | opponent  | `move: "ERROR"`, `"Agent timed out."` |
//! | column outside the board          | opponent  | reason `"Invalid column"`        |
//! | column already full               | opponent  | reason `"Column full"`           |
//! | four in a row                     | mover     | `result: "win"`                  |
//! | `max_moves` turns without the above | draw (0) | none                            |

use std::fmt::Display;

use anyhow::{bail, ensure};
use serde::{Serialize, Serializer};
use tracing::{info, instrument, trace, warn};

use crate::agent::AgentHandle;
use crate::board::{Board, Cell, Mark, DEFAULT_COLUMNS, ROWS};
use crate::error::{AgentTimeout, InvalidInput, InvalidMove};
use crate::game_interface::{GameConfiguration, Observation};
use crate::sandbox::{Invocation, Sandbox};

/// Parameters of one match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchSettings {
    pub(crate) columns: usize,
    pub(crate) max_moves: usize,
}

impl MatchSettings {
    /// Board of `columns` columns, played until it is full (`rows * columns` moves).
    ///
    /// # Errors
    /// [`InvalidInput::Columns`] if `columns` is zero.
    pub fn new(columns: usize) -> Result<Self, InvalidInput> {
        let configuration = GameConfiguration::new(columns)?;
        Ok(MatchSettings {
            columns,
            max_moves: configuration.cell_count(),
        })
    }

    /// Stop the match as a draw after `max_moves` turns.
    pub fn with_max_moves(mut self, max_moves: usize) -> Self {
        self.max_moves = max_moves;
        self
    }

    /// Number of columns.
    pub fn columns(&self) -> usize {
        self.columns
    }

    /// Turn limit.
    pub fn max_moves(&self) -> usize {
        self.max_moves
    }
}

impl Default for MatchSettings {
    /// 7 columns, 42 moves.
    fn default() -> Self {
        MatchSettings {
            columns: DEFAULT_COLUMNS,
            max_moves: ROWS * DEFAULT_COLUMNS,
        }
    }
}

/// What a player did on its turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Move {
    /// Column returned by the agent, possibly out of range.
    Column(i64),
    /// The agent faulted or timed out. Serialized as `"ERROR"`.
    Error,
}

impl Serialize for Move {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Move::Column(column) => serializer.serialize_i64(*column),
            Move::Error => serializer.serialize_str("ERROR"),
        }
    }
}

impl Display for Move {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Move::Column(column) => write!(f, "{column}"),
            Move::Error => write!(f, "ERROR"),
        }
    }
}

/// Tag of a winning log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnResult {
    /// The move connected four.
    Win,
}

/// One turn of the audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MoveLogEntry {
    /// 1-based
    pub turn: usize,
    /// Player who acted.
    pub player: Mark,
    /// What it played.
    #[serde(rename = "move")]
    pub column: Move,
    /// Why the player forfeited, if it did.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Board after the move, or before it when the player forfeited.
    pub board: Vec<Cell>,
    /// Set when the move won the game.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<TurnResult>,
}

impl MoveLogEntry {
    /// True if this entry ended the match by forfeit.
    pub fn is_forfeit(&self) -> bool {
        self.reason.is_some()
    }
}

/// Winner and full log of a finished match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchOutcome {
    #[serde(serialize_with = "serialize_winner")]
    winner: Option<Mark>,
    log: Vec<MoveLogEntry>,
    #[serde(skip)]
    columns: usize,
}

impl MatchOutcome {
    /// Winning player, `None` for a draw.
    pub fn winner(&self) -> Option<Mark> {
        self.winner
    }

    /// `0` for a draw, otherwise the winner's mark.
    pub fn winner_value(&self) -> u8 {
        self.winner.map_or(0, Mark::value)
    }

    /// Every turn played, in order.
    pub fn log(&self) -> &[MoveLogEntry] {
        &self.log
    }

    /// `"draw"` or `"player N wins"`.
    pub fn result_text(&self) -> String {
        match self.winner {
            None => "draw".to_string(),
            Some(mark) => format!("player {mark} wins"),
        }
    }

    /// `(player, move)` of every turn.
    pub fn player_moves(&self) -> Vec<(Mark, Move)> {
        self.log.iter().map(|e| (e.player, e.column)).collect()
    }

    /// Check the log against a replay from an empty board. See [`replay`].
    pub fn replay(&self) -> anyhow::Result<()> {
        replay(&self.log, self.columns)
    }
}

fn serialize_winner<S: Serializer>(
    winner: &Option<Mark>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_u8(winner.map_or(0, Mark::value))
}

struct MatchState {
    board: Board,
    log: Vec<MoveLogEntry>,
}

impl MatchState {
    fn forfeit(&mut self, turn: usize, player: Mark, column: Move, reason: String) -> Option<Mark> {
        warn!(turn, %player, %column, reason = %reason, "forfeit");
        self.log.push(MoveLogEntry {
            turn,
            player,
            column,
            reason: Some(reason),
            board: self.board.snapshot(),
            result: None,
        });
        Some(player.opponent())
    }
}

/// Play a match between `first` (mark 1, moves first) and `second` (mark 2).
///
/// Turns are strictly sequential, each agent decision goes through `sandbox`.
#[instrument(skip_all, fields(first = %first, second = %second, columns = settings.columns))]
pub fn run_match(
    first: &AgentHandle,
    second: &AgentHandle,
    settings: MatchSettings,
    sandbox: &Sandbox,
) -> MatchOutcome {
    let configuration = GameConfiguration {
        columns: settings.columns,
        rows: ROWS,
    };
    let mut state = MatchState {
        board: Board::new(settings.columns),
        log: Vec::with_capacity(settings.max_moves.min(ROWS * settings.columns)),
    };
    let mut mark = Mark::One;
    let mut winner = None;

    for turn in 1..=settings.max_moves {
        trace!(turn, %mark, "player to play");
        let agent = match mark {
            Mark::One => first,
            Mark::Two => second,
        };
        let observation = Observation {
            board: state.board.snapshot(),
            mark,
        };

        let column = match sandbox.invoke(agent, observation, &configuration) {
            Ok(Invocation::Completed(column)) => column,
            Ok(Invocation::Faulted(fault)) => {
                winner = state.forfeit(turn, mark, Move::Error, fault.to_string());
                break;
            }
            Err(AgentTimeout) => {
                winner = state.forfeit(turn, mark, Move::Error, AgentTimeout.to_string());
                break;
            }
        };

        if !state.board.is_valid_column(column) {
            let reason = InvalidMove::InvalidColumn.to_string();
            winner = state.forfeit(turn, mark, Move::Column(column), reason);
            break;
        }
        if let Err(invalid) = state.board.place(column as usize, mark) {
            winner = state.forfeit(turn, mark, Move::Column(column), invalid.to_string());
            break;
        }

        let won = state.board.check_win(mark);
        state.log.push(MoveLogEntry {
            turn,
            player: mark,
            column: Move::Column(column),
            reason: None,
            board: state.board.snapshot(),
            result: won.then_some(TurnResult::Win),
        });
        if won {
            winner = Some(mark);
            break;
        }

        mark = mark.opponent();
    }

    let outcome = MatchOutcome {
        winner,
        log: state.log,
        columns: settings.columns,
    };
    info!(
        result = %outcome.result_text(),
        turns = outcome.log.len(),
        "match finished"
    );
    outcome
}

/// Replay `log` on an empty board of `columns` columns and check every snapshot.
///
/// Forfeit entries must be last and carry the unchanged board. Returns the first divergence
/// found.
pub fn replay(log: &[MoveLogEntry], columns: usize) -> anyhow::Result<()> {
    let mut board = Board::new(columns);
    let mut mark = Mark::One;

    for (i, entry) in log.iter().enumerate() {
        ensure!(
            entry.turn == i + 1,
            "entry {i} has turn {}, expected {}",
            entry.turn,
            i + 1
        );
        ensure!(
            entry.player == mark,
            "turn {}: player {} moved, expected {mark}",
            entry.turn,
            entry.player
        );

        if entry.is_forfeit() {
            ensure!(i + 1 == log.len(), "turn {}: forfeit is not the last entry", entry.turn);
        } else {
            let Move::Column(column) = entry.column else {
                bail!("turn {}: error move without a reason", entry.turn);
            };
            ensure!(
                board.is_valid_column(column),
                "turn {}: column {column} is outside the board",
                entry.turn
            );
            board.place(column as usize, mark).map_err(|e| {
                anyhow::anyhow!("turn {}: column {column} cannot be played: {e}", entry.turn)
            })?;
        }

        ensure!(
            entry.board == board.cells(),
            "turn {}: recorded board differs from replay",
            entry.turn
        );
        let won = board.check_win(mark);
        ensure!(
            won == (entry.result == Some(TurnResult::Win)) || entry.is_forfeit(),
            "turn {}: win tag does not match the board",
            entry.turn
        );
        if won && i + 1 != log.len() {
            bail!("turn {}: game continued after a win", entry.turn);
        }

        mark = mark.opponent();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::configuration::Configuration;
    use crate::constraints::ConstraintsBuilder;

    fn always(column: i64) -> AgentHandle {
        AgentHandle::native(
            format!("always-{column}"),
            move |_: &Observation, _: &GameConfiguration| -> anyhow::Result<i64> { Ok(column) },
        )
    }

    fn sequence(columns: Vec<i64>) -> AgentHandle {
        let moves = std::sync::Mutex::new(columns.into_iter());
        AgentHandle::native(
            "sequence",
            move |_: &Observation, _: &GameConfiguration| -> anyhow::Result<i64> {
                moves
                    .lock()
                    .map_err(|_| anyhow::anyhow!("poisoned"))?
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("out of moves"))
            },
        )
    }

    fn play(first: &AgentHandle, second: &AgentHandle, settings: MatchSettings) -> MatchOutcome {
        run_match(first, second, settings, &sandbox(Duration::from_secs(2)))
    }

    fn sandbox(timeout: Duration) -> Sandbox {
        let constraints = ConstraintsBuilder::new()
            .with_action_timeout(timeout)
            .build()
            .unwrap();
        Sandbox::new(&constraints, &Configuration::new())
    }

    #[test]
    fn vertical_four_wins_on_turn_seven() {
        let outcome = play(&always(0), &always(1), MatchSettings::default());

        assert_eq!(outcome.winner(), Some(Mark::One));
        assert_eq!(outcome.log().len(), 7);
        let last = outcome.log().last().unwrap();
        assert_eq!(last.turn, 7);
        assert_eq!(last.player, Mark::One);
        assert_eq!(last.result, Some(TurnResult::Win));
        for row in [5, 4, 3, 2] {
            assert_eq!(last.board[row * 7], Cell::Taken(Mark::One));
            let expected = if row == 2 {
                Cell::Empty
            } else {
                Cell::Taken(Mark::Two)
            };
            assert_eq!(last.board[row * 7 + 1], expected);
        }
        assert!(outcome.log()[..6].iter().all(|e| e.result.is_none() && e.reason.is_none()));
        outcome.replay().unwrap();
    }

    #[test]
    fn out_of_range_column_forfeits() {
        let outcome = play(&always(7), &always(0), MatchSettings::default());

        assert_eq!(outcome.winner(), Some(Mark::Two));
        assert_eq!(outcome.log().len(), 1);
        let entry = &outcome.log()[0];
        assert_eq!(entry.player, Mark::One);
        assert_eq!(entry.column, Move::Column(7));
        assert_eq!(entry.reason.as_deref(), Some("Invalid column"));
        assert!(entry.board.iter().all(|c| c.is_empty()));
    }

    #[test]
    fn negative_column_forfeits() {
        let outcome = play(&always(0), &always(-1), MatchSettings::default());
        assert_eq!(outcome.winner(), Some(Mark::One));
        assert_eq!(outcome.log().len(), 2);
        assert_eq!(outcome.log()[1].reason.as_deref(), Some("Invalid column"));
        // the board before the forfeit holds the first move
        assert_eq!(outcome.log()[1].board[35], Cell::Taken(Mark::One));
        outcome.replay().unwrap();
    }

    #[test]
    fn sleeping_agent_times_out() {
        let sleeper = AgentHandle::native(
            "sleeper",
            |_: &Observation, _: &GameConfiguration| -> anyhow::Result<i64> {
                std::thread::sleep(Duration::from_secs(3600));
                Ok(0)
            },
        );
        let short = sandbox(Duration::from_millis(100));
        let outcome = run_match(&sleeper, &always(0), MatchSettings::default(), &short);

        assert_eq!(outcome.winner(), Some(Mark::Two));
        let entry = &outcome.log()[0];
        assert_eq!(entry.column, Move::Error);
        assert_eq!(entry.reason.as_deref(), Some("Agent timed out."));
    }

    #[test]
    fn faulting_agent_forfeits_with_its_error() {
        let faulty = AgentHandle::native(
            "faulty",
            |_: &Observation, _: &GameConfiguration| -> anyhow::Result<i64> {
                anyhow::bail!("model weights missing")
            },
        );
        let outcome = play(&always(3), &faulty, MatchSettings::default());

        assert_eq!(outcome.winner(), Some(Mark::One));
        let entry = outcome.log().last().unwrap();
        assert_eq!(entry.player, Mark::Two);
        assert_eq!(entry.column, Move::Error);
        assert_eq!(entry.reason.as_deref(), Some("model weights missing"));
    }

    #[test]
    fn seventh_placement_in_a_column_forfeits() {
        let outcome = play(&always(2), &always(2), MatchSettings::default());

        assert_eq!(outcome.winner(), Some(Mark::Two));
        assert_eq!(outcome.log().len(), 7);
        let entry = outcome.log().last().unwrap();
        assert_eq!(entry.player, Mark::One);
        assert_eq!(entry.column, Move::Column(2));
        assert_eq!(entry.reason.as_deref(), Some("Column full"));
        outcome.replay().unwrap();
    }

    #[test]
    fn full_board_without_four_is_a_draw() {
        // columns filled in pairs with the order swapped every other pair; no four anywhere
        let moves: Vec<i64> = vec![
            0, 1, 0, 1, 0, 1, 1, 0, 1, 0, 1, 0, //
            2, 3, 2, 3, 2, 3, 3, 2, 3, 2, 3, 2, //
            4, 5, 4, 5, 4, 5, 5, 4, 5, 4, 5, 4, //
            6, 6, 6, 6, 6, 6,
        ];
        let first = moves.iter().step_by(2).copied().collect();
        let second = moves.iter().skip(1).step_by(2).copied().collect();

        let outcome = play(&sequence(first), &sequence(second), MatchSettings::default());

        assert_eq!(outcome.winner(), None);
        assert_eq!(outcome.winner_value(), 0);
        assert_eq!(outcome.log().len(), 42);
        assert!(outcome.log().iter().all(|e| e.reason.is_none() && e.result.is_none()));
        assert_eq!(outcome.result_text(), "draw");
        assert_eq!(serde_json::to_value(&outcome).unwrap()["winner"], 0);
        outcome.replay().unwrap();
    }

    #[test]
    fn move_limit_ends_in_a_draw() {
        let settings = MatchSettings::default().with_max_moves(4);
        let outcome = play(&always(0), &always(1), settings);
        assert_eq!(outcome.winner(), None);
        assert_eq!(outcome.log().len(), 4);
    }

    #[test]
    fn wider_boards_are_supported() {
        let settings = MatchSettings::new(9).unwrap();
        assert_eq!(settings.max_moves(), 54);
        let outcome = play(&always(8), &always(7), settings);
        assert_eq!(outcome.winner(), Some(Mark::One));
        assert_eq!(outcome.log().last().unwrap().board.len(), 54);
        outcome.replay().unwrap();
    }

    #[test]
    fn replay_detects_tampering() {
        let outcome = play(&always(0), &always(1), MatchSettings::default());
        let mut log = outcome.log().to_vec();
        log[2].board[0] = Cell::Taken(Mark::Two);
        assert!(replay(&log, 7).is_err());

        let mut log = outcome.log().to_vec();
        log[3].column = Move::Column(4);
        assert!(replay(&log, 7).is_err());
    }

    #[test]
    fn serializes_like_the_move_log_format() {
        let outcome = play(&always(9), &always(0), MatchSettings::default());
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["winner"], 2);
        let entry = &json["log"][0];
        assert_eq!(entry["turn"], 1);
        assert_eq!(entry["player"], 1);
        assert_eq!(entry["move"], 9);
        assert_eq!(entry["reason"], "Invalid column");
        assert!(entry.get("result").is_none());
        assert_eq!(entry["board"].as_array().unwrap().len(), 42);

        let error_entry = MoveLogEntry {
            turn: 1,
            player: Mark::One,
            column: Move::Error,
            reason: Some("Agent timed out.".to_string()),
            board: vec![],
            result: None,
        };
        assert_eq!(serde_json::to_value(&error_entry).unwrap()["move"], "ERROR");
    }
}
