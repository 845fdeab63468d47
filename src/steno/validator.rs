use shakmaty::Color;

use super::vocabulary::{CastleSides, Vocabulary};
use super::MarkEntry;
use crate::error::SolveError;

/// Rejects stenos that cannot be satisfied by any legal game, before any
/// search is spent on them. Half-moves are numbered from 1; the windows are
/// the loosest bounds any legal game can beat.
pub fn validate(
    entries: &[MarkEntry],
    vocabulary: Vocabulary,
    standard_start: bool,
) -> Result<(), SolveError> {
    let last_index = match entries.len() {
        0 => return Ok(()),
        n => n - 1,
    };

    let mut castles = [0usize; 2];
    let mut promotions = [0usize; 2];
    let mut en_passants = [0usize; 2];
    let mut captures = [0usize; 2];

    for entry in entries {
        let half_move = entry.half_move();
        let side = if entry.color() == Color::White { 0 } else { 1 };

        for atom in entry.marks.positive_atoms() {
            if vocabulary.is_endgame_mark(atom) && entry.index < last_index {
                return Err(SolveError::steno(
                    &entry.raw,
                    "endgame mark before the last half-move",
                ));
            }

            if let Some(sides) = vocabulary.castle_sides(atom) {
                castles[side] += 1;
                if standard_start {
                    let earliest = match sides {
                        CastleSides::Queen => 8,
                        CastleSides::King | CastleSides::Either => 6,
                    };
                    if half_move < earliest {
                        return Err(SolveError::steno(&entry.raw, "castling too early"));
                    }
                }
            }

            if vocabulary.promotion(atom).is_some() {
                promotions[side] += 1;
                if half_move <= 8 {
                    return Err(SolveError::steno(
                        &entry.raw,
                        "promotion in the first eight half-moves",
                    ));
                }
            }

            if atom == '%' {
                en_passants[side] += 1;
                if half_move <= 4 {
                    return Err(SolveError::steno(
                        &entry.raw,
                        "en passant in the first four half-moves",
                    ));
                }
            }

            if atom == 'x' {
                captures[side] += 1;
            }

            if half_move <= 2 {
                if matches!(atom, 'x' | '%' | '+' | '#') {
                    return Err(SolveError::steno(
                        &entry.raw,
                        "capture or check in the first two half-moves",
                    ));
                }
                if vocabulary == Vocabulary::Extended {
                    if matches!(atom, '_' | '/' | '\\' | '"') {
                        return Err(SolveError::steno(
                            &entry.raw,
                            "impossible direction in the first two half-moves",
                        ));
                    }
                    let against_base = (half_move == 1 && atom == 'v')
                        || (half_move == 2 && atom == '^');
                    if against_base {
                        return Err(SolveError::steno(
                            &entry.raw,
                            "moving against one's own base rank in the opening",
                        ));
                    }
                }
            }

            if standard_start {
                if atom == '#' && half_move < 4 {
                    return Err(SolveError::steno(
                        &entry.raw,
                        "mate before Black's second move",
                    ));
                }
                if atom == vocabulary.draw_mark() && half_move < 18 {
                    return Err(SolveError::steno(
                        &entry.raw,
                        "forced draw before Black's ninth move",
                    ));
                }
            }
        }
    }

    for side in 0..2 {
        if castles[side] > 1 {
            return Err(SolveError::steno(
                "steno",
                "more than one castling mark for one colour",
            ));
        }
        if promotions[side] > 8 {
            return Err(SolveError::steno(
                "steno",
                "more than eight promotions for one colour",
            ));
        }
        if en_passants[side] > 8 {
            return Err(SolveError::steno(
                "steno",
                "more than eight en-passant captures for one colour",
            ));
        }
        if captures[side] > 15 {
            return Err(SolveError::steno(
                "steno",
                "more than fifteen captures for one colour",
            ));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::parser::parse;
    use super::*;

    fn entries(steno: &str, vocabulary: Vocabulary) -> Vec<MarkEntry> {
        parse(steno, vocabulary, true).unwrap().entries
    }

    fn check(steno: &str, vocabulary: Vocabulary) -> Result<(), SolveError> {
        validate(&entries(steno, vocabulary), vocabulary, true)
    }

    #[test]
    fn test_accepts_plausible_stenos() {
        assert!(check("~ ~ ~ #", Vocabulary::Pgn).is_ok());
        assert!(check("e e B c 5 N #", Vocabulary::Extended).is_ok());
    }

    #[test]
    fn test_rejects_mid_steno_endgame_marks() {
        assert!(check("# ~ ~", Vocabulary::Classic).is_err());
        assert!(check("~ ~ ~ # ~", Vocabulary::Pgn).is_err());
    }

    #[test]
    fn test_rejects_early_violence() {
        assert!(check("x ~ ~", Vocabulary::Classic).is_err());
        assert!(check("~ + ~", Vocabulary::Classic).is_err());
        assert!(check("~ ~ ~ %", Vocabulary::Classic).is_err());
        assert!(check("~ ~ ~ ~ ~ ~ ~ q", Vocabulary::Classic).is_err());
        assert!(check("~ ~ ~ ~ ~ ~ ~ ~ q", Vocabulary::Classic).is_ok());
    }

    #[test]
    fn test_rejects_early_mate_and_castles() {
        assert!(check("~ ~ #", Vocabulary::Classic).is_err());
        assert!(check("~ ~ ~ #", Vocabulary::Classic).is_ok());
        assert!(check("~ ~ ~ ~ o", Vocabulary::Classic).is_err());
        assert!(check("~ ~ ~ ~ ~ o", Vocabulary::Classic).is_ok());
        assert!(check("~ ~ ~ ~ ~ ~ O", Vocabulary::Classic).is_err());
        assert!(check("~ ~ ~ ~ ~ ~ ~ O", Vocabulary::Classic).is_ok());
        assert!(check("~ ~ ~ ~ ~ O", Vocabulary::Pgn).is_ok());
    }

    #[test]
    fn test_rejects_two_castles_per_colour() {
        let list = entries("~ ~ ~ ~ ~ o ~ ~ ~ o", Vocabulary::Classic);
        assert!(validate(&list, Vocabulary::Classic, true).is_err());
        // One castle per colour is fine.
        let list = entries("~ ~ ~ ~ ~ ~ o o", Vocabulary::Classic);
        assert!(validate(&list, Vocabulary::Classic, true).is_ok());
    }

    #[test]
    fn test_rejects_early_draws() {
        assert!(check("~ ~ ~ ~ =", Vocabulary::Classic).is_err());
        assert!(check("~ ~ ~ ~ /", Vocabulary::Pgn).is_err());
    }

    #[test]
    fn test_rejects_opening_directions() {
        assert!(check("_ ~", Vocabulary::Extended).is_err());
        assert!(check("v ~", Vocabulary::Extended).is_err());
        assert!(check("~ ^", Vocabulary::Extended).is_err());
        assert!(check("^ v", Vocabulary::Extended).is_ok());
    }

    #[test]
    fn test_non_standard_start_relaxes_windows() {
        let list = entries("~ ~ #", Vocabulary::Classic);
        assert!(validate(&list, Vocabulary::Classic, false).is_ok());
    }
}
