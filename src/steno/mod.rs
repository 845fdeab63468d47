pub mod conditions;
pub mod matcher;
pub mod meta;
pub mod parser;
pub mod validator;
pub mod vocabulary;

use std::fmt;

use shakmaty::{Color, File, Rank, Square};
use smallvec::SmallVec;

/// One `&`-joined conjunction of marks. Nearly always a single character.
pub type AtomGroup = SmallVec<[char; 4]>;

/// A parsed mark expression. Positive atoms form conjunction groups which are
/// OR-ed at the top level (`AB` is A or B, `A&B` is A and B); negated atoms
/// are conjuncts that must all fail to match (`A!C` is A and not C).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MarkExpr {
    pub groups: Vec<AtomGroup>,
    pub negated: AtomGroup,
}

impl MarkExpr {
    pub fn single(mark: char) -> Self {
        let mut group = AtomGroup::new();
        group.push(mark);
        Self {
            groups: vec![group],
            negated: AtomGroup::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty() && self.negated.is_empty()
    }

    pub fn positive_atoms(&self) -> impl Iterator<Item = char> + '_ {
        self.groups.iter().flat_map(|g| g.iter().copied())
    }

    pub fn has_positive(&self, mark: char) -> bool {
        self.positive_atoms().any(|a| a == mark)
    }

    pub fn has_negated(&self, mark: char) -> bool {
        self.negated.contains(&mark)
    }

    /// Adds a negated atom unless it is already present, so synthesis can be
    /// re-run without piling up duplicates.
    pub fn add_negated(&mut self, mark: char) {
        if !self.has_negated(mark) {
            self.negated.push(mark);
        }
    }
}

impl fmt::Display for MarkExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for group in &self.groups {
            for (j, atom) in group.iter().enumerate() {
                if j > 0 {
                    write!(f, "&")?;
                }
                write!(f, "{}", atom)?;
            }
        }
        for atom in &self.negated {
            write!(f, "!{}", atom)?;
        }
        Ok(())
    }
}

/// A full square, or a whole file or rank when the author wrote a partial
/// square (`-e` = the e-file, `R1` = anywhere on the first rank).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SquareSpec {
    At(Square),
    FileOnly(File),
    RankOnly(Rank),
}

impl SquareSpec {
    pub fn squares(&self) -> Vec<Square> {
        match self {
            SquareSpec::At(sq) => vec![*sq],
            SquareSpec::FileOnly(file) => (0..8)
                .map(|r| Square::from_coords(*file, Rank::new(r)))
                .collect(),
            SquareSpec::RankOnly(rank) => (0..8)
                .map(|f| Square::from_coords(File::new(f), *rank))
                .collect(),
        }
    }

    pub fn contains(&self, square: Square) -> bool {
        match self {
            SquareSpec::At(sq) => *sq == square,
            SquareSpec::FileOnly(file) => square.file() == *file,
            SquareSpec::RankOnly(rank) => square.rank() == *rank,
        }
    }
}

impl fmt::Display for SquareSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SquareSpec::At(sq) => write!(f, "{}", sq),
            SquareSpec::FileOnly(file) => write!(f, "{}", file.char()),
            SquareSpec::RankOnly(rank) => write!(f, "{}", rank.char()),
        }
    }
}

/// One atom of a bracketed condition, evaluated on the board after the move.
/// Piece characters use upper case for White and lower for Black, with
/// `L`/`D` (and `l`/`d`) naming light- and dark-squared bishops.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CondAtom {
    /// `xP`: this move captured a piece of the given type (colour implicit).
    CapturedNow(char),
    /// `XPP…`: all listed pieces captured so far along this history.
    CapturedAll(Vec<char>),
    /// `=PP…`: all listed pieces created by promotion so far; an empty list
    /// means any promotion has occurred.
    Promoted(Vec<char>),
    /// `^R`: a White pawn stands on rank R or beyond.
    WhitePawnAtLeast(u32),
    /// `vR`: a Black pawn stands on rank R or nearer its goal.
    BlackPawnAtMost(u32),
    /// `-sq`: the square (or the whole file/rank) is empty.
    Empty(SquareSpec),
    /// `pSQ`: the piece stands on the square (or anywhere on the file/rank).
    PieceAt(char, SquareSpec),
    /// `@sq`: the moving piece originated on the square.
    OriginatedAt(SquareSpec),
}

impl fmt::Display for CondAtom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CondAtom::CapturedNow(p) => write!(f, "x{}", p),
            CondAtom::CapturedAll(ps) => {
                write!(f, "X")?;
                ps.iter().try_for_each(|p| write!(f, "{}", p))
            }
            CondAtom::Promoted(ps) => {
                write!(f, "=")?;
                ps.iter().try_for_each(|p| write!(f, "{}", p))
            }
            CondAtom::WhitePawnAtLeast(r) => write!(f, "^{}", r),
            CondAtom::BlackPawnAtMost(r) => write!(f, "v{}", r),
            CondAtom::Empty(spec) => write!(f, "-{}", spec),
            CondAtom::PieceAt(p, spec) => write!(f, "{}{}", p, spec),
            CondAtom::OriginatedAt(spec) => write!(f, "@{}", spec),
        }
    }
}

/// One bracket group: `|`-separated alternatives of `&`-joined atoms. All
/// groups attached to an entry must hold.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConditionGroup {
    pub alternatives: Vec<Vec<CondAtom>>,
}

impl fmt::Display for ConditionGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, alternative) in self.alternatives.iter().enumerate() {
            if i > 0 {
                write!(f, "|")?;
            }
            for (j, atom) in alternative.iter().enumerate() {
                if j > 0 {
                    write!(f, "&")?;
                }
                write!(f, "{}", atom)?;
            }
        }
        write!(f, "]")
    }
}

/// One half-move of the puzzle: the authored marks and conditions plus the
/// constraints the synthesiser derives from future entries. Created by the
/// parser, annotated before (and during) the search, read-only inside a step.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkEntry {
    pub index: usize,
    pub marks: MarkExpr,
    pub meta_marks: MarkExpr,
    pub conditions: Vec<ConditionGroup>,
    pub meta_conditions: Vec<ConditionGroup>,
    pub checkpoint: bool,
    pub raw: String,
}

impl MarkEntry {
    /// White moves on even indices.
    pub fn color(&self) -> Color {
        if self.index % 2 == 0 {
            Color::White
        } else {
            Color::Black
        }
    }

    /// 1-based half-move number, the counting used by the validator windows.
    pub fn half_move(&self) -> usize {
        self.index + 1
    }

    /// The authored text without any trailing checkpoint marker; this is what
    /// the checkpoint prefix stores.
    pub fn checkpoint_text(&self) -> &str {
        self.raw.trim_end_matches('$')
    }

    pub fn add_meta_condition(&mut self, group: ConditionGroup) {
        if !self.meta_conditions.contains(&group) {
            self.meta_conditions.push(group);
        }
    }
}
