use rustc_hash::FxHashMap;
use shakmaty::Square;

use crate::board::Board;

/// The live positions after some number of consumed marks, keyed by the first
/// four FEN fields.
pub type Frontier = FxHashMap<String, Position>;

const RESULT_TOKENS: [&str; 3] = ["1-0", "0-1", "½-½"];

/// One path that reached a position: the SAN half-moves (with a terminal
/// result token once the game ends), the accumulated capture and promotion
/// multisets, and the destinations of the last two half-moves (older first,
/// castles resolved to the king's square) for the `"` mark.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MoveSet {
    pub moves: String,
    pub captures: String,
    pub promotions: String,
    pub recent: [Option<Square>; 2],
}

impl MoveSet {
    pub fn new() -> Self {
        Default::default()
    }

    /// Number of SAN tokens, not counting a terminal result token.
    pub fn move_count(&self) -> usize {
        self.moves
            .split_whitespace()
            .filter(|t| !RESULT_TOKENS.contains(t))
            .count()
    }

    pub fn has_result(&self) -> bool {
        self.moves
            .split_whitespace()
            .last()
            .map_or(false, |t| RESULT_TOKENS.contains(&t))
    }

    /// The destination of this player's previous move, two half-moves back.
    pub fn previous_own_destination(&self) -> Option<Square> {
        self.recent[0]
    }

    /// A new MoveSet with this move appended: SAN plus optional result token,
    /// capture and promotion characters, and the rolled destination window.
    pub fn extended(
        &self,
        san: &str,
        capture: Option<char>,
        promotion: Option<char>,
        destination: Square,
        result: Option<&str>,
    ) -> MoveSet {
        let mut moves = String::with_capacity(self.moves.len() + san.len() + 5);
        moves.push_str(&self.moves);
        if !moves.is_empty() {
            moves.push(' ');
        }
        moves.push_str(san);
        if let Some(token) = result {
            moves.push(' ');
            moves.push_str(token);
        }
        let mut captures = self.captures.clone();
        if let Some(c) = capture {
            captures.push(c);
        }
        let mut promotions = self.promotions.clone();
        if let Some(p) = promotion {
            promotions.push(p);
        }
        MoveSet {
            moves,
            captures,
            promotions,
            recent: [self.recent[1], Some(destination)],
        }
    }
}

/// A reachable position: its reconstructed board, whether future lookahead
/// could still prune it, and every retained path that produced it.
#[derive(Debug, Clone)]
pub struct Position {
    pub board: Board,
    pub check_future: bool,
    pub move_sets: Vec<MoveSet>,
}

impl Position {
    pub fn start(board: Board) -> Self {
        Self {
            board,
            check_future: true,
            move_sets: vec![MoveSet::new()],
        }
    }

    /// Appends further cooks, keeping one more than the cap so the host can
    /// say "at least".
    pub fn merge(&mut self, move_sets: Vec<MoveSet>, max_cooks_to_keep: usize) {
        for move_set in move_sets {
            if self.move_sets.len() > max_cooks_to_keep {
                break;
            }
            if !self.move_sets.contains(&move_set) {
                self.move_sets.push(move_set);
            }
        }
    }
}

/// A frontier slot during one step. `Dead` memoises a negative lookahead so
/// other paths to the same key skip it; the step filter drops them.
#[derive(Debug, Clone)]
pub enum Slot {
    Live(Position),
    Dead,
}
