use shakmaty::{Color, Role, Square};

use super::{CondAtom, ConditionGroup};
use crate::board::{is_light, Board, Candidate};

/// What a bracketed condition is evaluated against: the board after the
/// candidate move, and one history's accumulated capture and promotion
/// multisets (already extended with this move's contribution).
pub struct EvalContext<'a> {
    pub after: &'a Board,
    pub candidate: &'a Candidate,
    pub mover: Color,
    pub captures: &'a str,
    pub promotions: &'a str,
}

/// The character a captured or promoted piece is recorded as: upper case for
/// White, lower for Black, bishops split into `L`/`D` by their square colour.
pub fn piece_letter(role: Role, color: Color, square: Square) -> char {
    let letter = match role {
        Role::Bishop => {
            if is_light(square) {
                'L'
            } else {
                'D'
            }
        }
        other => other.upper_char(),
    };
    match color {
        Color::White => letter,
        Color::Black => letter.to_ascii_lowercase(),
    }
}

fn decode_piece(c: char) -> Option<(Role, Color, Option<bool>)> {
    let color = if c.is_ascii_uppercase() {
        Color::White
    } else {
        Color::Black
    };
    let (role, shade) = match c.to_ascii_uppercase() {
        'P' => (Role::Pawn, None),
        'N' => (Role::Knight, None),
        'R' => (Role::Rook, None),
        'Q' => (Role::Queen, None),
        'K' => (Role::King, None),
        'L' => (Role::Bishop, Some(true)),
        'D' => (Role::Bishop, Some(false)),
        _ => return None,
    };
    Some((role, color, shade))
}

/// All user groups, then all meta groups, must hold.
pub fn evaluate(
    user: &[ConditionGroup],
    meta: &[ConditionGroup],
    ctx: &EvalContext<'_>,
) -> bool {
    user.iter().chain(meta).all(|group| holds(group, ctx))
}

fn holds(group: &ConditionGroup, ctx: &EvalContext<'_>) -> bool {
    group
        .alternatives
        .iter()
        .any(|alternative| alternative.iter().all(|atom| atom_holds(atom, ctx)))
}

fn atom_holds(atom: &CondAtom, ctx: &EvalContext<'_>) -> bool {
    match atom {
        CondAtom::CapturedNow(required) => match ctx.candidate.capture() {
            None => false,
            Some(role) => {
                // The colour is implicit; only the type (and bishop shade)
                // has to agree.
                let square = ctx.candidate.destination(ctx.mover);
                let actual = piece_letter(role, !ctx.mover, square);
                actual.eq_ignore_ascii_case(required)
            }
        },
        CondAtom::CapturedAll(required) => contains_multiset(ctx.captures, required),
        CondAtom::Promoted(required) => {
            if required.is_empty() {
                !ctx.promotions.is_empty()
            } else {
                contains_multiset(ctx.promotions, required)
            }
        }
        CondAtom::WhitePawnAtLeast(rank) => ctx
            .after
            .piece_squares(Role::Pawn, Color::White)
            .iter()
            .any(|sq| u32::from(sq.rank()) + 1 >= *rank),
        CondAtom::BlackPawnAtMost(rank) => ctx
            .after
            .piece_squares(Role::Pawn, Color::Black)
            .iter()
            .any(|sq| u32::from(sq.rank()) + 1 <= *rank),
        CondAtom::Empty(spec) => spec
            .squares()
            .iter()
            .all(|sq| ctx.after.piece_at(*sq).is_none()),
        CondAtom::PieceAt(letter, spec) => match decode_piece(*letter) {
            None => false,
            Some((role, color, shade)) => spec.squares().iter().any(|sq| {
                ctx.after.piece_at(*sq) == Some(role.of(color))
                    && shade.map_or(true, |light| is_light(*sq) == light)
            }),
        },
        CondAtom::OriginatedAt(spec) => ctx
            .candidate
            .origin()
            .map_or(false, |from| spec.contains(from)),
    }
}

/// Does `haystack` contain every character of `required`, with multiplicity?
fn contains_multiset(haystack: &str, required: &[char]) -> bool {
    let mut pool: Vec<char> = haystack.chars().collect();
    for c in required {
        match pool.iter().position(|p| p == c) {
            Some(i) => {
                pool.swap_remove(i);
            }
            None => return false,
        }
    }
    true
}
