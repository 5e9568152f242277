//! Connect-Four grid: placement under gravity and win detection.
//!
//! The grid is stored row-major, row `0` being the top row:
//! `index = row * columns + col`. The row count is fixed to [`ROWS`], the
//! column count is chosen per match.

use std::fmt::Display;

use derive_more::Display;
use serde::{Deserialize, Serialize};

use crate::error::{InvalidInput, InvalidMove};

/// Number of rows of every board.
pub const ROWS: usize = 6;

/// Column count used when none is specified.
pub const DEFAULT_COLUMNS: usize = 7;

/// Number of aligned marks needed to win.
pub const CONNECT: usize = 4;

/// A player, and the value written into the cells it owns.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Mark {
    /// First player to move.
    #[display("1")]
    One,
    /// Second player to move.
    #[display("2")]
    Two,
}

impl Mark {
    /// The other player (`3 - mark`).
    pub fn opponent(self) -> Mark {
        match self {
            Mark::One => Mark::Two,
            Mark::Two => Mark::One,
        }
    }

    /// Numeric value of the mark, `1` or `2`.
    pub fn value(self) -> u8 {
        match self {
            Mark::One => 1,
            Mark::Two => 2,
        }
    }
}

impl From<Mark> for u8 {
    fn from(mark: Mark) -> u8 {
        mark.value()
    }
}

impl TryFrom<u8> for Mark {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Mark::One),
            2 => Ok(Mark::Two),
            _ => Err(format!("invalid mark {value}, expected 1 or 2")),
        }
    }
}

/// Content of a single board cell.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Cell {
    /// No mark yet.
    #[default]
    Empty,
    /// Owned by a player.
    Taken(Mark),
}

impl Cell {
    /// True if no player owns this cell.
    pub fn is_empty(self) -> bool {
        self == Cell::Empty
    }
}

impl From<Mark> for Cell {
    fn from(mark: Mark) -> Cell {
        Cell::Taken(mark)
    }
}

impl From<Cell> for u8 {
    fn from(cell: Cell) -> u8 {
        match cell {
            Cell::Empty => 0,
            Cell::Taken(mark) => mark.value(),
        }
    }
}

impl TryFrom<u8> for Cell {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Cell::Empty),
            v => Mark::try_from(v)
                .map(Cell::Taken)
                .map_err(|_| format!("invalid cell value {v}, expected 0, 1 or 2")),
        }
    }
}

/// Board of [`ROWS`] rows and a configurable number of columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Board {
    columns: usize,
    cells: Vec<Cell>,
}

impl Board {
    /// Empty board with `columns` columns.
    pub fn new(columns: usize) -> Board {
        Board {
            columns,
            cells: vec![Cell::Empty; ROWS * columns],
        }
    }

    /// Rebuild a board from raw cell values, as received from a caller.
    ///
    /// # Errors
    /// [`InvalidInput`] if `cells` does not hold exactly `ROWS * columns` values,
    /// or if a value is not `0`, `1` or `2`.
    pub fn from_raw(raw: &[i64], columns: usize) -> Result<Board, InvalidInput> {
        if columns == 0 {
            return Err(InvalidInput::Columns { columns });
        }
        let expected = ROWS * columns;
        if raw.len() != expected {
            return Err(InvalidInput::BoardLength {
                expected,
                actual: raw.len(),
            });
        }
        let cells = raw
            .iter()
            .enumerate()
            .map(|(index, &value)| {
                u8::try_from(value)
                    .ok()
                    .and_then(|v| Cell::try_from(v).ok())
                    .ok_or(InvalidInput::CellValue { index, value })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Board { columns, cells })
    }

    /// Number of columns.
    pub fn columns(&self) -> usize {
        self.columns
    }

    /// Row-major cells.
    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    /// Copy of the cells. Used for observations and log entries.
    pub fn snapshot(&self) -> Vec<Cell> {
        self.cells.clone()
    }

    /// Cell at `(row, col)`, row 0 being the top.
    pub fn get(&self, row: usize, col: usize) -> Cell {
        self.cells[row * self.columns + col]
    }

    /// `0 <= column < columns`.
    pub fn is_valid_column(&self, column: i64) -> bool {
        usize::try_from(column).is_ok_and(|c| c < self.columns)
    }

    /// True if the top cell of `column` is taken.
    pub fn is_column_full(&self, column: usize) -> bool {
        !self.get(0, column).is_empty()
    }

    /// True when no column accepts a mark anymore.
    pub fn is_full(&self) -> bool {
        self.cells.iter().all(|c| !c.is_empty())
    }

    /// Drop `mark` into `column` and return the row it landed on.
    ///
    /// # Errors
    /// [`InvalidMove::ColumnFull`] when the column has no empty cell,
    /// [`InvalidMove::InvalidColumn`] when `column` is out of range.
    pub fn place(&mut self, column: usize, mark: Mark) -> Result<usize, InvalidMove> {
        if column >= self.columns {
            return Err(InvalidMove::InvalidColumn);
        }
        for row in (0..ROWS).rev() {
            let index = row * self.columns + column;
            if self.cells[index].is_empty() {
                self.cells[index] = Cell::Taken(mark);
                return Ok(row);
            }
        }
        Err(InvalidMove::ColumnFull)
    }

    /// True if `mark` owns [`CONNECT`] consecutive cells horizontally,
    /// vertically or on either diagonal.
    ///
    /// Scans the whole board on every call.
    pub fn check_win(&self, mark: Mark) -> bool {
        let target = Cell::Taken(mark);
        let columns = self.columns;
        let n = CONNECT - 1;
        let aligned = |row: usize, col: usize, d_row: usize, d_col: isize| {
            (0..CONNECT).all(|i| {
                let c = col as isize + d_col * i as isize;
                self.cells[(row + d_row * i) * columns + c as usize] == target
            })
        };

        for row in 0..ROWS {
            for col in 0..columns {
                let fits_right = col + n < columns;
                let fits_down = row + n < ROWS;
                let fits_left = col >= n;

                if fits_right && aligned(row, col, 0, 1) {
                    return true;
                }
                if fits_down && aligned(row, col, 1, 0) {
                    return true;
                }
                if fits_down && fits_right && aligned(row, col, 1, 1) {
                    return true;
                }
                if fits_down && fits_left && aligned(row, col, 1, -1) {
                    return true;
                }
            }
        }
        false
    }
}

impl Display for Board {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for row in 0..ROWS {
            let line = (0..self.columns)
                .map(|col| match self.get(row, col) {
                    Cell::Empty => '.',
                    Cell::Taken(Mark::One) => 'X',
                    Cell::Taken(Mark::Two) => 'O',
                })
                .collect::<String>();
            writeln!(f, "{line}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn board_with(columns: usize, marks: &[(usize, usize, Mark)]) -> Board {
        let mut board = Board::new(columns);
        for &(row, col, mark) in marks {
            board.cells[row * columns + col] = Cell::Taken(mark);
        }
        board
    }

    #[test]
    fn place_lands_on_lowest_empty_row() {
        let mut board = Board::new(DEFAULT_COLUMNS);
        assert_eq!(board.place(3, Mark::One), Ok(5));
        assert_eq!(board.place(3, Mark::Two), Ok(4));
        assert_eq!(board.place(0, Mark::One), Ok(5));
        assert_eq!(board.get(5, 3), Cell::Taken(Mark::One));
        assert_eq!(board.get(4, 3), Cell::Taken(Mark::Two));
    }

    #[test]
    fn place_into_full_column_fails() {
        let mut board = Board::new(DEFAULT_COLUMNS);
        for i in 0..ROWS {
            let mark = if i % 2 == 0 { Mark::One } else { Mark::Two };
            assert_eq!(board.place(2, mark), Ok(ROWS - 1 - i));
        }
        assert!(board.is_column_full(2));
        assert_eq!(board.place(2, Mark::One), Err(InvalidMove::ColumnFull));
        assert_eq!(board.place(7, Mark::One), Err(InvalidMove::InvalidColumn));
    }

    #[test]
    fn valid_columns_are_bounded() {
        let board = Board::new(DEFAULT_COLUMNS);
        assert!(board.is_valid_column(0));
        assert!(board.is_valid_column(6));
        assert!(!board.is_valid_column(7));
        assert!(!board.is_valid_column(-1));
    }

    #[test]
    fn detects_all_four_directions() {
        let horizontal = board_with(
            7,
            &[(5, 3, Mark::One), (5, 4, Mark::One), (5, 5, Mark::One), (5, 6, Mark::One)],
        );
        assert!(horizontal.check_win(Mark::One));
        assert!(!horizontal.check_win(Mark::Two));

        let vertical = board_with(
            7,
            &[(0, 0, Mark::Two), (1, 0, Mark::Two), (2, 0, Mark::Two), (3, 0, Mark::Two)],
        );
        assert!(vertical.check_win(Mark::Two));

        let down_right = board_with(
            7,
            &[(2, 3, Mark::One), (3, 4, Mark::One), (4, 5, Mark::One), (5, 6, Mark::One)],
        );
        assert!(down_right.check_win(Mark::One));

        let down_left = board_with(
            7,
            &[(2, 3, Mark::Two), (3, 2, Mark::Two), (4, 1, Mark::Two), (5, 0, Mark::Two)],
        );
        assert!(down_left.check_win(Mark::Two));
    }

    #[test]
    fn no_wraparound_across_rows() {
        // last two cells of row 4 and first two of row 5 are contiguous in memory
        let board = board_with(
            7,
            &[(4, 5, Mark::One), (4, 6, Mark::One), (5, 0, Mark::One), (5, 1, Mark::One)],
        );
        assert!(!board.check_win(Mark::One));
    }

    #[test]
    fn three_in_a_row_is_not_a_win() {
        let board = board_with(
            7,
            &[(5, 0, Mark::One), (5, 1, Mark::One), (5, 2, Mark::One), (5, 3, Mark::Two)],
        );
        assert!(!board.check_win(Mark::One));
        assert!(!board.check_win(Mark::Two));
    }

    #[test]
    fn narrow_board_never_wins_horizontally() {
        let board = board_with(3, &[(5, 0, Mark::One), (5, 1, Mark::One), (5, 2, Mark::One)]);
        assert!(!board.check_win(Mark::One));
    }

    #[test]
    fn from_raw_validates_input() {
        assert_eq!(
            Board::from_raw(&[0; 41], 7),
            Err(InvalidInput::BoardLength {
                expected: 42,
                actual: 41
            })
        );
        let mut raw = vec![0; 42];
        raw[10] = 3;
        assert_eq!(
            Board::from_raw(&raw, 7),
            Err(InvalidInput::CellValue { index: 10, value: 3 })
        );
        raw[10] = 2;
        let board = Board::from_raw(&raw, 7).unwrap();
        assert_eq!(board.get(1, 3), Cell::Taken(Mark::Two));
        assert_eq!(Board::from_raw(&[], 0), Err(InvalidInput::Columns { columns: 0 }));
    }

    #[test]
    fn cells_serialize_as_integers() {
        let cells = vec![Cell::Empty, Cell::Taken(Mark::One), Cell::Taken(Mark::Two)];
        assert_eq!(serde_json::to_string(&cells).unwrap(), "[0,1,2]");
        let back: Vec<Cell> = serde_json::from_str("[2,0,1]").unwrap();
        assert_eq!(back, vec![Cell::Taken(Mark::Two), Cell::Empty, Cell::Taken(Mark::One)]);
        assert!(serde_json::from_str::<Cell>("3").is_err());
    }

    #[test]
    fn mark_opponent() {
        assert_eq!(Mark::One.opponent(), Mark::Two);
        assert_eq!(Mark::Two.opponent(), Mark::One);
        assert_eq!(Mark::Two.to_string(), "2");
    }
}
