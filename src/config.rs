use std::path::PathBuf;

use shakmaty::CastlingMode;

use crate::board::{Board, STARTING_BACK_RANK};
use crate::error::SolveError;
use crate::steno::vocabulary::Vocabulary;

/// Upper bound for every numeric limit; `MAX` parses to this.
pub const LIMIT_CEILING: u64 = 2_000_000_000;

/// Everything the host can configure about a solve.
#[derive(Debug, Clone)]
pub struct Config {
    pub vocabulary: Vocabulary,
    pub max_positions_to_examine: usize,
    pub max_cooks_to_keep: usize,
    pub max_solver_tasks: usize,
    pub max_solutions_to_list: usize,
    pub display_positions: bool,
    pub show_meta_marks: bool,
    pub allow_chunking: bool,
    pub start_fen: String,
    pub output_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            vocabulary: Vocabulary::Classic,
            max_positions_to_examine: 1_000_000,
            max_cooks_to_keep: 4,
            max_solver_tasks: 4,
            max_solutions_to_list: 10,
            display_positions: false,
            show_meta_marks: false,
            allow_chunking: true,
            start_fen: String::new(),
            output_file: None,
        }
    }
}

/// Parses a decimal limit with an optional `K`/`M`/`B` suffix; the sentinel
/// `MAX` means the ceiling.
pub fn parse_limit(value: &str) -> Result<u64, SolveError> {
    if value == "MAX" {
        return Ok(LIMIT_CEILING);
    }
    let (digits, multiplier) = match value.chars().last() {
        Some('K') | Some('k') => (&value[..value.len() - 1], 1_000u64),
        Some('M') | Some('m') => (&value[..value.len() - 1], 1_000_000),
        Some('B') | Some('b') => (&value[..value.len() - 1], 1_000_000_000),
        _ => (value, 1),
    };
    let number: u64 = digits.parse().map_err(|_| SolveError::InvalidLimit {
        value: value.to_string(),
        reason: "not a decimal number".to_string(),
    })?;
    let limit = number.checked_mul(multiplier).unwrap_or(u64::MAX);
    if limit == 0 || limit > LIMIT_CEILING {
        return Err(SolveError::InvalidLimit {
            value: value.to_string(),
            reason: format!("must be between 1 and {}", LIMIT_CEILING),
        });
    }
    Ok(limit)
}

impl Config {
    pub fn validate(&self) -> Result<(), SolveError> {
        if self.max_solutions_to_list == 1 {
            return Err(SolveError::InvalidLimit {
                value: "1".to_string(),
                reason: "solutions to list must be 0 or more than 1".to_string(),
            });
        }
        if self.max_solver_tasks == 0 {
            return Err(SolveError::InvalidLimit {
                value: "0".to_string(),
                reason: "at least one solver task is required".to_string(),
            });
        }
        if self.max_cooks_to_keep == 0 {
            return Err(SolveError::InvalidLimit {
                value: "0".to_string(),
                reason: "at least one cook must be kept".to_string(),
            });
        }
        Ok(())
    }

    /// Builds the starting board: empty = the standard position, 8 piece
    /// letters = a Chess960 back rank, anything else = the first 3-6 fields
    /// of a FEN with `-`, `0`, `1` defaults for the missing ones. Also says
    /// whether the start is the standard position, which gates several
    /// validator windows and the castling meta-rules.
    pub fn start_position(&self) -> Result<(Board, bool), SolveError> {
        let text = self.start_fen.trim();
        if text.is_empty() {
            return Ok((Board::starting_position(), true));
        }

        if text.len() == 8 && text.chars().all(|c| c.is_ascii_alphabetic()) {
            let mut sorted: Vec<char> = text.chars().collect();
            sorted.sort_unstable();
            if sorted.iter().collect::<String>() != "BBKNNQRR" {
                return Err(SolveError::fen(
                    text,
                    "a back rank must hold two bishops, two knights, two rooks, a queen and a king",
                ));
            }
            let board = Board::from_back_rank(text)?;
            let standard = text == STARTING_BACK_RANK;
            return Ok((board, standard));
        }

        let mut fields: Vec<&str> = text.split_whitespace().collect();
        if !(3..=6).contains(&fields.len()) {
            return Err(SolveError::fen(text, "expected 3 to 6 FEN fields"));
        }
        let defaults = ["-", "0", "1"];
        while fields.len() < 6 {
            fields.push(defaults[fields.len() - 3]);
        }
        let board = Board::from_fen(&fields.join(" "), CastlingMode::Standard)?;
        let standard = board.position_key() == Board::starting_position().position_key();
        Ok((board, standard))
    }
}
