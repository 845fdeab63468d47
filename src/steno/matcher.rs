use shakmaty::{Color, File, Rank, Square};

use super::vocabulary::{CastleSides, PromotionSpec, Vocabulary};
use super::{AtomGroup, MarkEntry, MarkExpr};
use crate::board::{Board, Candidate};

/// Everything a mark expression is evaluated against: the board before the
/// move, the annotated candidate, and (for the `"` mark) each surviving
/// history's previous destination square of the side to move.
pub struct MatchContext<'a> {
    pub board: &'a Board,
    pub candidate: &'a Candidate,
    pub vocabulary: Vocabulary,
    pub mover: Color,
    pub previous_destinations: &'a [Option<Square>],
}

/// The verdict on one candidate move. `must_draw` / `must_not_draw` defer the
/// stalemate and forced-draw marks to a post-move check; `witnesses` narrows
/// the MoveSet list when a `"` atom took part (None keeps every history).
#[derive(Debug, Clone, PartialEq)]
pub struct MatchOutcome {
    pub matched: bool,
    pub must_draw: bool,
    pub must_not_draw: bool,
    pub witnesses: Option<Vec<bool>>,
}

impl MatchOutcome {
    fn rejected() -> Self {
        Self {
            matched: false,
            must_draw: false,
            must_not_draw: false,
            witnesses: None,
        }
    }
}

enum AtomEval {
    Bool(bool),
    /// Tentatively true; the engine confirms the post-move endgame.
    Draw,
    /// True for some histories only.
    PerMoveSet(Vec<bool>),
}

/// Does the candidate satisfy the entry's marks and meta-marks?
pub fn matches(entry: &MarkEntry, ctx: &MatchContext<'_>) -> MatchOutcome {
    let user = eval_expr(&entry.marks, ctx);
    if !user.matched {
        return MatchOutcome::rejected();
    }
    let meta = eval_expr(&entry.meta_marks, ctx);
    if !meta.matched {
        return MatchOutcome::rejected();
    }

    let witnesses = intersect(user.witnesses, meta.witnesses);
    if let Some(mask) = &witnesses {
        if !mask.iter().any(|w| *w) {
            return MatchOutcome::rejected();
        }
    }
    let must_draw = user.must_draw || meta.must_draw;
    let must_not_draw = user.must_not_draw || meta.must_not_draw;
    if must_draw && must_not_draw {
        return MatchOutcome::rejected();
    }
    MatchOutcome {
        matched: true,
        must_draw,
        must_not_draw,
        witnesses,
    }
}

struct ExprEval {
    matched: bool,
    must_draw: bool,
    must_not_draw: bool,
    witnesses: Option<Vec<bool>>,
}

fn eval_expr(expr: &MarkExpr, ctx: &MatchContext<'_>) -> ExprEval {
    let rejected = ExprEval {
        matched: false,
        must_draw: false,
        must_not_draw: false,
        witnesses: None,
    };

    // Positive groups: OR across groups, AND within one.
    let mut any_success = expr.groups.is_empty();
    let mut draw_free_success = expr.groups.is_empty();
    let mut union_mask: Option<Vec<bool>> = None;
    let mut every_success_masked = true;
    for group in &expr.groups {
        match eval_group(group, ctx) {
            None => {}
            Some((draw, mask)) => {
                any_success = true;
                if !draw {
                    draw_free_success = true;
                }
                match mask {
                    Some(mask) => union_mask = Some(unite(union_mask, mask)),
                    None => every_success_masked = false,
                }
            }
        }
    }
    if !any_success {
        return rejected;
    }
    let positive_mask = if every_success_masked { union_mask } else { None };

    // Negated atoms: every one of them must fail to match.
    let mut must_not_draw = false;
    let mut negative_mask: Option<Vec<bool>> = None;
    for atom in &expr.negated {
        match eval_atom(*atom, ctx) {
            AtomEval::Bool(true) => return rejected,
            AtomEval::Bool(false) => {}
            AtomEval::Draw => must_not_draw = true,
            AtomEval::PerMoveSet(mask) => {
                let inverted: Vec<bool> = mask.iter().map(|w| !w).collect();
                negative_mask = Some(match negative_mask {
                    None => inverted,
                    Some(existing) => existing
                        .iter()
                        .zip(&inverted)
                        .map(|(a, b)| *a && *b)
                        .collect(),
                });
            }
        }
    }

    let witnesses = intersect(positive_mask, negative_mask);
    if let Some(mask) = &witnesses {
        if !mask.iter().any(|w| *w) {
            return rejected;
        }
    }

    ExprEval {
        matched: true,
        must_draw: !draw_free_success,
        must_not_draw,
        witnesses,
    }
}

/// Evaluates one conjunction group. `None` means the group failed; otherwise
/// returns whether a draw atom took part, and the per-history mask if a `"`
/// atom did.
fn eval_group(group: &AtomGroup, ctx: &MatchContext<'_>) -> Option<(bool, Option<Vec<bool>>)> {
    let mut draw = false;
    let mut mask: Option<Vec<bool>> = None;
    for atom in group {
        match eval_atom(*atom, ctx) {
            AtomEval::Bool(false) => return None,
            AtomEval::Bool(true) => {}
            AtomEval::Draw => draw = true,
            AtomEval::PerMoveSet(this) => {
                mask = Some(match mask {
                    None => this,
                    Some(existing) => {
                        existing.iter().zip(&this).map(|(a, b)| *a && *b).collect()
                    }
                });
            }
        }
    }
    if let Some(mask) = &mask {
        if !mask.iter().any(|w| *w) {
            return None;
        }
    }
    Some((draw, mask))
}

fn unite(mask: Option<Vec<bool>>, other: Vec<bool>) -> Vec<bool> {
    match mask {
        None => other,
        Some(existing) => existing.iter().zip(&other).map(|(a, b)| *a || *b).collect(),
    }
}

fn intersect(a: Option<Vec<bool>>, b: Option<Vec<bool>>) -> Option<Vec<bool>> {
    match (a, b) {
        (None, None) => None,
        (Some(m), None) | (None, Some(m)) => Some(m),
        (Some(a), Some(b)) => Some(a.iter().zip(&b).map(|(x, y)| *x && *y).collect()),
    }
}

fn eval_atom(atom: char, ctx: &MatchContext<'_>) -> AtomEval {
    let cand = ctx.candidate;
    let vocabulary = ctx.vocabulary;
    let pgn = vocabulary == Vocabulary::Pgn;

    if let Some(demanded) = vocabulary.castle_sides(atom) {
        return AtomEval::Bool(match cand.castling_side() {
            None => false,
            Some(side) => match demanded {
                CastleSides::Either => true,
                CastleSides::King => side == shakmaty::CastlingSide::KingSide,
                CastleSides::Queen => side == shakmaty::CastlingSide::QueenSide,
            },
        });
    }

    if let Some(spec) = vocabulary.promotion(atom) {
        return AtomEval::Bool(match spec {
            PromotionSpec::Any => cand.promotion().is_some(),
            PromotionSpec::Exact(role) => cand.promotion() == Some(role),
        });
    }

    if let Some(role) = vocabulary.piece_role(atom) {
        let mut hit = cand.role() == role;
        if pgn {
            hit = hit || cand.promotion() == Some(role);
        }
        return AtomEval::Bool(hit);
    }

    let origin = cand.origin();
    let destination = cand.destination(ctx.mover);
    match atom {
        'a'..='h' => {
            let file = File::new(atom as u32 - 'a' as u32);
            if pgn {
                if cand.castling_side().is_some() {
                    return AtomEval::Bool(false);
                }
                AtomEval::Bool(
                    destination.file() == file || cand.disambiguation_file == Some(file),
                )
            } else {
                AtomEval::Bool(destination.file() == file)
            }
        }
        '1'..='8' => {
            let rank = Rank::new(atom as u32 - '1' as u32);
            if pgn {
                if cand.castling_side().is_some() {
                    return AtomEval::Bool(false);
                }
                AtomEval::Bool(
                    destination.rank() == rank || cand.disambiguation_rank == Some(rank),
                )
            } else {
                AtomEval::Bool(destination.rank() == rank)
            }
        }
        'x' => AtomEval::Bool(cand.is_capture()),
        '%' => AtomEval::Bool(cand.is_en_passant()),
        '+' => AtomEval::Bool(cand.is_check && cand.promotion().is_none()),
        '#' => AtomEval::Bool(cand.is_mate && cand.promotion().is_none()),
        '~' | '.' => AtomEval::Bool(true),
        '-' => AtomEval::Bool(!cand.is_capture()),
        '=' => {
            // Classic/Extended stalemate: impossible while giving check,
            // otherwise confirmed on the post-move board.
            if cand.is_check {
                AtomEval::Bool(false)
            } else {
                AtomEval::Draw
            }
        }
        '/' if pgn => {
            if cand.is_mate {
                AtomEval::Bool(false)
            } else {
                AtomEval::Draw
            }
        }
        '|' => AtomEval::Bool(origin.map_or(false, |from| from.file() == destination.file())),
        '_' => AtomEval::Bool(origin.map_or(false, |from| from.rank() == destination.rank())),
        '/' | '\\' => AtomEval::Bool(origin.map_or(false, |from| {
            let df = u32::from(destination.file()) as i32 - u32::from(from.file()) as i32;
            let dr = u32::from(destination.rank()) as i32 - u32::from(from.rank()) as i32;
            if atom == '/' {
                df == dr && df != 0
            } else {
                df == -dr && df != 0
            }
        })),
        '<' => AtomEval::Bool(origin.map_or(false, |from| destination.file() < from.file())),
        '>' => AtomEval::Bool(origin.map_or(false, |from| destination.file() > from.file())),
        '^' => AtomEval::Bool(origin.map_or(false, |from| destination.rank() > from.rank())),
        'v' => AtomEval::Bool(origin.map_or(false, |from| destination.rank() < from.rank())),
        '"' => match origin {
            None => AtomEval::Bool(false),
            Some(from) => AtomEval::PerMoveSet(
                ctx.previous_destinations
                    .iter()
                    .map(|previous| *previous == Some(from))
                    .collect(),
            ),
        },
        _ => AtomEval::Bool(false),
    }
}

#[cfg(test)]
mod tests {
    use super::super::parser::parse_entry;
    use super::*;
    use shakmaty::CastlingMode;

    fn board(fen: &str) -> Board {
        Board::from_fen(fen, CastlingMode::Standard).unwrap()
    }

    fn outcome(
        board: &Board,
        san: &str,
        token: &str,
        vocabulary: Vocabulary,
        previous: &[Option<Square>],
    ) -> MatchOutcome {
        let candidate = board
            .candidates()
            .into_iter()
            .find(|c| c.san == san)
            .unwrap_or_else(|| panic!("no candidate {}", san));
        let entry = parse_entry(token, 0, vocabulary).unwrap();
        matches(
            &entry,
            &MatchContext {
                board,
                candidate: &candidate,
                vocabulary,
                mover: board.turn(),
                previous_destinations: previous,
            },
        )
    }

    fn accepts(board: &Board, san: &str, token: &str, vocabulary: Vocabulary) -> bool {
        outcome(board, san, token, vocabulary, &[None]).matched
    }

    const START: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

    #[test]
    fn test_file_rank_and_piece_marks() {
        let board = board(START);
        assert!(accepts(&board, "e4", "e", Vocabulary::Classic));
        assert!(!accepts(&board, "d4", "e", Vocabulary::Classic));
        assert!(accepts(&board, "e4", "4", Vocabulary::Classic));
        assert!(accepts(&board, "Nf3", "N", Vocabulary::Classic));
        assert!(accepts(&board, "e4", "P", Vocabulary::Classic));
        assert!(!accepts(&board, "Nf3", "P", Vocabulary::Classic));
        assert!(accepts(&board, "Nf3", "~", Vocabulary::Classic));
    }

    #[test]
    fn test_polarity_law() {
        let board = board(START);
        for mark in ["e", "4", "N", "P", "x"] {
            for san in ["e4", "Nf3", "a3"] {
                let plain = accepts(&board, san, mark, Vocabulary::Classic);
                let negated = accepts(&board, san, &format!("~!{}", mark), Vocabulary::Classic);
                assert_ne!(plain, negated, "mark {} on {}", mark, san);
            }
        }
    }

    #[test]
    fn test_conjunction_order_is_irrelevant() {
        let board = board(START);
        for san in ["Nf3", "Nc3", "e4", "h3"] {
            assert_eq!(
                accepts(&board, san, "N&3", Vocabulary::Classic),
                accepts(&board, san, "3&N", Vocabulary::Classic),
            );
        }
        assert!(accepts(&board, "Nf3", "N&3", Vocabulary::Classic));
        assert!(!accepts(&board, "e4", "N&3", Vocabulary::Classic));
    }

    #[test]
    fn test_or_groups() {
        let board = board(START);
        assert!(accepts(&board, "e4", "eN", Vocabulary::Classic));
        assert!(accepts(&board, "Nf3", "eN", Vocabulary::Classic));
        assert!(!accepts(&board, "d4", "eN", Vocabulary::Classic));
    }

    #[test]
    fn test_capture_marks() {
        // 1. e4 d5 gives exd5 and the e-pawn a quiet push.
        let board = board("rnbqkbnr/ppp1pppp/8/3p4/4P3/8/PPPP1PPP/RNBQKBNR w KQkq - 0 2");
        assert!(accepts(&board, "exd5", "x", Vocabulary::Classic));
        assert!(!accepts(&board, "e5", "x", Vocabulary::Classic));
        assert!(accepts(&board, "e5", "-", Vocabulary::Extended));
        assert!(!accepts(&board, "exd5", "-", Vocabulary::Extended));
    }

    #[test]
    fn test_en_passant_mark() {
        let board = board("rnbqkbnr/ppp1pppp/8/8/3pP3/8/PPPP1PPP/RNBQKBNR b KQkq e3 0 3");
        assert!(accepts(&board, "dxe3", "%", Vocabulary::Classic));
        assert!(accepts(&board, "dxe3", "x", Vocabulary::Classic));
        assert!(!accepts(&board, "d3", "%", Vocabulary::Classic));
    }

    #[test]
    fn test_castling_marks_and_dialect_equivalence() {
        // White ready to castle either side.
        let castle_ready = "r3k2r/pppqpppp/2nb1n2/3p4/3P4/2NB1N2/PPPQPPPP/R3K2R w KQkq - 0 8";
        let board = board(castle_ready);
        assert!(accepts(&board, "O-O", "o", Vocabulary::Classic));
        assert!(!accepts(&board, "O-O-O", "o", Vocabulary::Classic));
        assert!(accepts(&board, "O-O-O", "O", Vocabulary::Classic));
        assert!(accepts(&board, "O-O", "0", Vocabulary::Extended));
        assert!(accepts(&board, "O-O-O", "0", Vocabulary::Extended));
        // The PGN either-side mark accepts exactly what Classic `o` does on
        // the king side.
        for san in ["O-O", "O-O-O", "Nb1"] {
            let classic_any = accepts(&board, san, "o", Vocabulary::Classic)
                || accepts(&board, san, "O", Vocabulary::Classic);
            assert_eq!(classic_any, accepts(&board, san, "O", Vocabulary::Pgn));
            assert_eq!(classic_any, accepts(&board, san, "-", Vocabulary::Pgn));
        }
        // Castle destinations resolve for file/rank marks outside PGN.
        assert!(accepts(&board, "O-O", "g", Vocabulary::Classic));
        assert!(accepts(&board, "O-O-O", "c", Vocabulary::Classic));
        assert!(accepts(&board, "O-O", "1", Vocabulary::Classic));
        assert!(!accepts(&board, "O-O", "g", Vocabulary::Pgn));
        assert!(!accepts(&board, "O-O", "1", Vocabulary::Pgn));
    }

    #[test]
    fn test_pgn_disambiguation() {
        // Knights on b1 and f3 can both reach d2.
        let board = board("rnbqkbnr/pppppppp/8/8/8/5N2/PPPPPPPP/RNBQKB1R w KQkq - 0 2");
        assert!(accepts(&board, "Nbd2", "b", Vocabulary::Pgn));
        assert!(accepts(&board, "Nfd2", "f", Vocabulary::Pgn));
        assert!(!accepts(&board, "Nbd2", "b", Vocabulary::Classic));
        assert!(accepts(&board, "Nbd2", "d", Vocabulary::Pgn));
    }

    #[test]
    fn test_pgn_pawn_capture_file() {
        let board = board("rnbqkbnr/ppp1pppp/8/3p4/4P3/8/PPPP1PPP/RNBQKBNR w KQkq - 0 2");
        // `exd5` carries its origin file in PGN.
        assert!(accepts(&board, "exd5", "e", Vocabulary::Pgn));
        assert!(accepts(&board, "exd5", "d", Vocabulary::Pgn));
        assert!(!accepts(&board, "exd5", "e", Vocabulary::Classic));
    }

    #[test]
    fn test_promotion_marks() {
        let board = board("8/4P1k1/8/8/8/8/8/4K3 w - - 0 1");
        assert!(accepts(&board, "e8=Q+", "q", Vocabulary::Classic));
        assert!(!accepts(&board, "e8=Q+", "r", Vocabulary::Classic));
        assert!(accepts(&board, "e8=R", "p", Vocabulary::Extended));
        assert!(accepts(&board, "e8=N", "=", Vocabulary::Pgn));
        assert!(accepts(&board, "e8=Q+", "Q", Vocabulary::Pgn));
        // A promotion never satisfies the check mark.
        assert!(!accepts(&board, "e8=Q+", "+", Vocabulary::Classic));
        assert!(accepts(&board, "e8=Q+", "q&e", Vocabulary::Classic));
    }

    #[test]
    fn test_direction_marks() {
        let start_board = board(START);
        assert!(accepts(&start_board, "e4", "|", Vocabulary::Extended));
        assert!(accepts(&start_board, "e4", "^", Vocabulary::Extended));
        assert!(!accepts(&start_board, "e4", "v", Vocabulary::Extended));
        assert!(!accepts(&start_board, "e4", "_", Vocabulary::Extended));
        assert!(accepts(&start_board, "Nf3", ">", Vocabulary::Extended));
        assert!(accepts(&start_board, "Na3", "<", Vocabulary::Extended));
        // A bishop slide is a diagonal.
        let open = board("rnbqkbnr/pppp1ppp/8/4p3/4P3/8/PPPP1PPP/RNBQKBNR w KQkq - 0 2");
        assert!(accepts(&open, "Bc4", "\\", Vocabulary::Extended));
        assert!(!accepts(&open, "Bc4", "/", Vocabulary::Extended));
        assert!(accepts(&open, "Bd3", "/", Vocabulary::Extended));
    }

    #[test]
    fn test_quote_mark_filters_histories() {
        let board = board("rnbqkbnr/ppp1pppp/8/3p4/4P3/8/PPPP1PPP/RNBQKBNR w KQkq - 0 2");
        let previous = [Some(Square::E4), Some(Square::D2), None];
        let outcome = outcome(&board, "exd5", "\"", Vocabulary::Extended, &previous);
        assert!(outcome.matched);
        assert_eq!(outcome.witnesses, Some(vec![true, false, false]));

        let negated = super::super::parser::parse_entry("~!\"", 0, Vocabulary::Extended).unwrap();
        let candidate = board
            .candidates()
            .into_iter()
            .find(|c| c.san == "exd5")
            .unwrap();
        let result = matches(
            &negated,
            &MatchContext {
                board: &board,
                candidate: &candidate,
                vocabulary: Vocabulary::Extended,
                mover: board.turn(),
                previous_destinations: &previous,
            },
        );
        assert!(result.matched);
        assert_eq!(result.witnesses, Some(vec![false, true, true]));
    }

    #[test]
    fn test_stalemate_mark_is_tentative() {
        let board = board("k7/7R/2Q5/8/8/8/8/K7 w - - 0 1");
        let result = outcome(&board, "Qc7", "=", Vocabulary::Classic, &[None]);
        assert!(result.matched);
        assert!(result.must_draw);
        // A checking move can never be a stalemate.
        assert!(!accepts(&board, "Qc8+", "=", Vocabulary::Classic));
    }

    #[test]
    fn test_negated_draw_sets_verification_flag() {
        let mate_board = board("k7/7R/2Q5/8/8/8/8/K7 w - - 0 1");
        let result = outcome(&mate_board, "Qc7", "~!=", Vocabulary::Classic, &[None]);
        assert!(result.matched);
        assert!(result.must_not_draw);
        // `=x` accepted through the capture alternative carries no draw duty.
        let capture_board = board("rnbqkbnr/ppp1pppp/8/3p4/4P3/8/PPPP1PPP/RNBQKBNR w KQkq - 0 2");
        let mixed = outcome(&capture_board, "exd5", "=x", Vocabulary::Classic, &[None]);
        assert!(mixed.matched);
        assert!(!mixed.must_draw);
    }
}
