mod display;

use shakmaty::fen::Fen;
use shakmaty::san::San;
use shakmaty::{
    CastlingMode, CastlingSide, Chess, Color, EnPassantMode, File, Move, Position, Rank, Role,
    Square,
};
use thiserror::Error;

use crate::error::SolveError;

pub const STARTING_BACK_RANK: &str = "RNBQKBNR";

/// The chess-rules service the solver drives. Wraps a `shakmaty` position
/// together with its castling mode so FEN round-trips stay faithful for
/// Chess960 starts.
#[derive(Clone, Debug)]
pub struct Board {
    position: Chess,
    mode: CastlingMode,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoardError {
    #[error("the game is already over on this board")]
    GameOver,
    #[error("the board service rejected the move")]
    Rejected,
}

/// How a finished game ended. The insufficient-material rule is always on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endgame {
    Checkmate(Color),
    Stalemate,
    InsufficientMaterial,
}

impl Endgame {
    pub fn result_token(&self) -> &'static str {
        match self {
            Endgame::Checkmate(Color::White) => "1-0",
            Endgame::Checkmate(Color::Black) => "0-1",
            Endgame::Stalemate | Endgame::InsufficientMaterial => "½-½",
        }
    }

    pub fn is_draw(&self) -> bool {
        matches!(self, Endgame::Stalemate | Endgame::InsufficientMaterial)
    }
}

/// One legal move plus the metadata the matcher and evaluator need: SAN with
/// check/mate suffix, and any disambiguation the SAN carries (PGN marks match
/// on it). For pawn captures the SAN origin file lands in
/// `disambiguation_file`.
#[derive(Clone, Debug)]
pub struct Candidate {
    pub mv: Move,
    pub san: String,
    pub is_check: bool,
    pub is_mate: bool,
    pub disambiguation_file: Option<File>,
    pub disambiguation_rank: Option<Rank>,
}

impl Candidate {
    pub fn origin(&self) -> Option<Square> {
        self.mv.from()
    }

    /// Destination square, with castling resolved to the king's target so
    /// file/rank marks see `g1`/`c1`-style squares.
    pub fn destination(&self, mover: Color) -> Square {
        match self.mv.castling_side() {
            Some(side) => side.king_to(mover),
            None => self.mv.to(),
        }
    }

    pub fn role(&self) -> Role {
        self.mv.role()
    }

    pub fn capture(&self) -> Option<Role> {
        self.mv.capture()
    }

    pub fn is_capture(&self) -> bool {
        self.mv.is_capture()
    }

    pub fn is_en_passant(&self) -> bool {
        self.mv.is_en_passant()
    }

    pub fn promotion(&self) -> Option<Role> {
        self.mv.promotion()
    }

    pub fn castling_side(&self) -> Option<CastlingSide> {
        self.mv.castling_side()
    }
}

impl Board {
    pub fn starting_position() -> Self {
        Self {
            position: Chess::default(),
            mode: CastlingMode::Standard,
        }
    }

    pub fn from_fen(fen: &str, mode: CastlingMode) -> Result<Self, SolveError> {
        let parsed: Fen = fen
            .parse()
            .map_err(|_| SolveError::fen(fen, "not a well-formed FEN record"))?;
        let position: Chess = parsed
            .into_position(mode)
            .map_err(|e| SolveError::fen(fen, e.to_string()))?;
        Ok(Self { position, mode })
    }

    /// Builds a Chess960 start from an 8-letter back rank. Castling rights
    /// come out of the usual `KQkq` field; shakmaty locates the rooks.
    pub fn from_back_rank(back_rank: &str) -> Result<Self, SolveError> {
        let mode = if back_rank == STARTING_BACK_RANK {
            CastlingMode::Standard
        } else {
            CastlingMode::Chess960
        };
        let fen = format!(
            "{}/pppppppp/8/8/8/8/PPPPPPPP/{} w KQkq - 0 1",
            back_rank.to_lowercase(),
            back_rank
        );
        Self::from_fen(&fen, mode)
    }

    pub fn mode(&self) -> CastlingMode {
        self.mode
    }

    pub fn turn(&self) -> Color {
        self.position.turn()
    }

    /// The first four FEN fields: placement, side to move, castling,
    /// en-passant. This is the deduplication key for the frontier.
    pub fn position_key(&self) -> String {
        let fen = self.to_fen();
        let fields: Vec<&str> = fen.split(' ').take(4).collect();
        fields.join(" ")
    }

    pub fn to_fen(&self) -> String {
        Fen::from_position(self.position.clone(), EnPassantMode::Legal).to_string()
    }

    pub fn endgame(&self) -> Option<Endgame> {
        if self.position.is_checkmate() {
            Some(Endgame::Checkmate(!self.position.turn()))
        } else if self.position.is_stalemate() {
            Some(Endgame::Stalemate)
        } else if self.position.is_insufficient_material() {
            Some(Endgame::InsufficientMaterial)
        } else {
            None
        }
    }

    pub fn piece_at(&self, square: Square) -> Option<shakmaty::Piece> {
        self.position.board().piece_at(square)
    }

    pub fn has_piece(&self, role: Role, color: Color) -> bool {
        self.position.board().by_piece(role.of(color)).any()
    }

    /// Squares of every piece of the given role and colour.
    pub fn piece_squares(&self, role: Role, color: Color) -> Vec<Square> {
        self.position
            .board()
            .by_piece(role.of(color))
            .into_iter()
            .collect()
    }

    /// Every legal move from this position, in the deterministic order the
    /// rules engine produces them, annotated for the matcher.
    pub fn candidates(&self) -> Vec<Candidate> {
        self.position
            .legal_moves()
            .iter()
            .map(|m| self.annotate(m))
            .collect()
    }

    fn annotate(&self, m: &Move) -> Candidate {
        let san = San::from_move(&self.position, m);
        let (disambiguation_file, disambiguation_rank) = match &san {
            San::Normal { file, rank, .. } => (*file, *rank),
            _ => (None, None),
        };
        let mut text = san.to_string();
        let mut after = self.position.clone();
        after.play_unchecked(m);
        let is_check = after.is_check();
        let is_mate = after.is_checkmate();
        if is_mate {
            text.push('#');
        } else if is_check {
            text.push('+');
        }
        Candidate {
            mv: m.clone(),
            san: text,
            is_check,
            is_mate,
            disambiguation_file,
            disambiguation_rank,
        }
    }

    /// Applies a move on a fresh copy loaded through FEN. The copy sometimes
    /// recognises an endgame the original board missed on exotic inputs, so
    /// the move is rejected when the copy says the game already ended.
    pub fn apply(&self, m: &Move) -> Result<Board, BoardError> {
        let copy = Board::from_fen(&self.to_fen(), self.mode).map_err(|_| BoardError::Rejected)?;
        if copy.endgame().is_some() {
            return Err(BoardError::GameOver);
        }
        let position = copy.position.play(m).map_err(|_| BoardError::Rejected)?;
        Ok(Board {
            position,
            mode: self.mode,
        })
    }
}

/// A square is light when file index plus rank index is odd.
pub fn is_light(square: Square) -> bool {
    (u32::from(square.file()) + u32::from(square.rank())) % 2 == 1
}
