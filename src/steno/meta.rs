use rustc_hash::FxHashSet;
use shakmaty::{Color, File, Rank, Role, Square};

use super::vocabulary::{CastleSides, PromotionSpec, Vocabulary};
use super::{CondAtom, ConditionGroup, MarkEntry, SquareSpec};
use crate::board::is_light;

const ALL_PROMOTION_ROLES: [Role; 4] = [Role::Queen, Role::Rook, Role::Bishop, Role::Knight];

/// Walks the mark entries before the search and injects the constraints the
/// future marks imply: no premature game end, pawn-advance schedules ahead of
/// promotions, and the do-not-disturb rules around a future castle. Safe to
/// re-run; every injection is duplicate-guarded.
pub fn synthesise(entries: &mut [MarkEntry], vocabulary: Vocabulary, standard_start: bool) {
    premature_end(entries, vocabulary, standard_start);
    promotion_prerequisites(entries, vocabulary);
    castling_support(entries, vocabulary, standard_start);
}

fn premature_end(entries: &mut [MarkEntry], vocabulary: Vocabulary, standard_start: bool) {
    if !standard_start || entries.len() < 2 {
        return;
    }
    let last = entries.len() - 1;
    for entry in entries.iter_mut() {
        if entry.index < 2 || entry.index >= last {
            continue;
        }
        entry.meta_marks.add_negated('#');
        if entry.index > 17 {
            entry.meta_marks.add_negated(vocabulary.draw_mark());
        }
    }
}

fn promotion_prerequisites(entries: &mut [MarkEntry], vocabulary: Vocabulary) {
    let promoters: Vec<(usize, Vec<Role>)> = entries
        .iter()
        .filter_map(|entry| {
            let mut roles = Vec::new();
            for atom in entry.marks.positive_atoms() {
                match vocabulary.promotion(atom) {
                    Some(PromotionSpec::Exact(role)) => roles.push(role),
                    Some(PromotionSpec::Any) => roles.extend(ALL_PROMOTION_ROLES),
                    None => {}
                }
            }
            if roles.is_empty() {
                None
            } else {
                roles.dedup();
                Some((entry.index, roles))
            }
        })
        .collect();

    for (index, roles) in promoters {
        let color = entries[index].color();
        advance_schedule(entries, index, color, &roles, 0);
    }
}

/// The rule-2 schedule: for each of the four half-move pairs ahead of a
/// promotion at `index`, the promoting side's pawn must already have advanced
/// far enough, unless the required piece was promoted even earlier.
fn advance_schedule(
    entries: &mut [MarkEntry],
    index: usize,
    color: Color,
    roles: &[Role],
    floor: usize,
) {
    for turn in 1..=4usize {
        let mut group = ConditionGroup::default();
        group.alternatives.push(vec![pawn_advance(color, turn)]);
        for alternative in promotion_alternatives(roles, color) {
            group.alternatives.push(alternative);
        }
        for offset in [2 * turn, 2 * turn - 1] {
            if index < offset {
                continue;
            }
            let target = index - offset;
            if target < floor {
                continue;
            }
            entries[target].add_meta_condition(group.clone());
        }
    }
}

fn pawn_advance(color: Color, turn: usize) -> CondAtom {
    match color {
        Color::White => CondAtom::WhitePawnAtLeast(8 - turn as u32),
        Color::Black => CondAtom::BlackPawnAtMost(1 + turn as u32),
    }
}

/// The condition forms a promoted piece can take. Bishops appear as both the
/// light and the dark letter since the promotion square is unknown.
fn promotion_alternatives(roles: &[Role], color: Color) -> Vec<Vec<CondAtom>> {
    let mut alternatives = Vec::new();
    for role in roles {
        let letters: &[char] = match role {
            Role::Bishop => &['L', 'D'],
            Role::Queen => &['Q'],
            Role::Rook => &['R'],
            Role::Knight => &['N'],
            _ => continue,
        };
        for letter in letters {
            let cased = match color {
                Color::White => *letter,
                Color::Black => letter.to_ascii_lowercase(),
            };
            alternatives.push(vec![CondAtom::Promoted(vec![cased])]);
        }
    }
    alternatives
}

fn castling_support(entries: &mut [MarkEntry], vocabulary: Vocabulary, standard_start: bool) {
    let castles: Vec<(usize, Option<CastleSides>)> = entries
        .iter()
        .filter_map(|entry| {
            entry
                .marks
                .positive_atoms()
                .find_map(|atom| vocabulary.castle_sides(atom))
                .map(|sides| (entry.index, resolve_side(sides, standard_start, entry)))
        })
        .collect();

    for (castle_index, side) in castles {
        let color = entries[castle_index].color();
        let back_rank = match color {
            Color::White => Rank::First,
            Color::Black => Rank::Eighth,
        };

        // The king may not have moved before it castles.
        for entry in entries.iter_mut() {
            if entry.index < castle_index && entry.color() == color {
                entry.meta_marks.add_negated('K');
            }
        }

        // One cannot castle out of check.
        if castle_index > 0 {
            entries[castle_index - 1].meta_marks.add_negated('+');
        }

        let side = match side {
            Some(side) if standard_start => side,
            _ => continue,
        };

        let rook_letter = match color {
            Color::White => 'R',
            Color::Black => 'r',
        };
        let rook_home = Square::from_coords(
            match side {
                CastleSides::King => File::H,
                _ => File::A,
            },
            back_rank,
        );
        let mut rook_at_home = ConditionGroup::default();
        rook_at_home
            .alternatives
            .push(vec![CondAtom::PieceAt(rook_letter, SquareSpec::At(rook_home))]);
        for entry in entries.iter_mut() {
            if entry.index < castle_index {
                entry.add_meta_condition(rook_at_home.clone());
            }
        }

        let between: &[File] = match side {
            CastleSides::King => &[File::F, File::G],
            _ => &[File::B, File::C, File::D],
        };
        for (steps_before, allow_b_visitor) in [(1usize, false), (2usize, true)] {
            if castle_index < steps_before {
                continue;
            }
            let target = castle_index - steps_before;
            for file in between {
                let square = Square::from_coords(*file, back_rank);
                let mut group = ConditionGroup::default();
                group
                    .alternatives
                    .push(vec![CondAtom::Empty(SquareSpec::At(square))]);
                // Two half-moves out, an enemy knight or bishop may still be
                // sitting on the b-file square of a queen-side castle.
                if allow_b_visitor && *file == File::B && side != CastleSides::King {
                    let knight = match color {
                        Color::White => 'n',
                        Color::Black => 'N',
                    };
                    let shade = if is_light(square) { 'l' } else { 'd' };
                    let bishop = match color {
                        Color::White => shade,
                        Color::Black => shade.to_ascii_uppercase(),
                    };
                    group
                        .alternatives
                        .push(vec![CondAtom::PieceAt(knight, SquareSpec::At(square))]);
                    group
                        .alternatives
                        .push(vec![CondAtom::PieceAt(bishop, SquareSpec::At(square))]);
                }
                entries[target].add_meta_condition(group);
            }
        }
    }
}

/// Which side a castle mark is taken to mean when synthesising support. An
/// either-side mark reads as king-side only while a queen-side castle is
/// still impossible; a later one leaves the side unknown, so only the
/// `!K`/`!+` meta applies.
fn resolve_side(sides: CastleSides, standard_start: bool, entry: &MarkEntry) -> Option<CastleSides> {
    match sides {
        CastleSides::King => Some(CastleSides::King),
        CastleSides::Queen => Some(CastleSides::Queen),
        CastleSides::Either if standard_start && entry.half_move() <= 8 => Some(CastleSides::King),
        CastleSides::Either => None,
    }
}

/// Injects a promotion demand when a piece type required by a future entry
/// has vanished from every board in the frontier. `next_index` is the first
/// entry the search has not consumed yet; `placements` are the FEN placement
/// fields of the live frontier. One piece type is forecast per step.
pub fn synthesise_extinction<'a>(
    entries: &mut [MarkEntry],
    next_index: usize,
    placements: impl Iterator<Item = &'a str>,
    vocabulary: Vocabulary,
) {
    let mut present: FxHashSet<char> = FxHashSet::default();
    for placement in placements {
        for c in placement.chars() {
            present.insert(c);
        }
    }

    for j in next_index..entries.len() {
        let color = entries[j].color();
        for atom in entries[j].marks.positive_atoms().collect::<Vec<_>>() {
            let role = match vocabulary.piece_role(atom) {
                Some(role) if ALL_PROMOTION_ROLES.contains(&role) => role,
                _ => continue,
            };
            let fen_char = match color {
                Color::White => role.upper_char(),
                Color::Black => role.char(),
            };
            if present.contains(&fen_char) {
                continue;
            }

            let mut target = if vocabulary == Vocabulary::Pgn { j } else { j.saturating_sub(2) };
            if target < next_index {
                target = next_index;
            }
            let roles = [role];
            let mut group = ConditionGroup::default();
            for alternative in promotion_alternatives(&roles, color) {
                group.alternatives.push(alternative);
            }
            entries[target].add_meta_condition(group);
            advance_schedule(entries, target, color, &roles, next_index);
            return;
        }
    }
}

/// True while an entry beyond `after` still carries a mark the cheap FEN
/// probe can prune on (a castle, or anything that needs a pawn).
pub fn has_future_pruning(entries: &[MarkEntry], after: usize, vocabulary: Vocabulary) -> bool {
    entries.iter().skip(after + 1).any(|entry| {
        entry.marks.positive_atoms().any(|atom| {
            vocabulary.castle_sides(atom).is_some()
                || atom == 'P'
                || atom == '%'
                || vocabulary.promotion(atom).is_some()
        })
    })
}

#[cfg(test)]
mod tests {
    use super::super::parser::parse;
    use super::*;

    fn annotated(steno: &str, vocabulary: Vocabulary) -> Vec<MarkEntry> {
        let mut entries = parse(steno, vocabulary, true).unwrap().entries;
        synthesise(&mut entries, vocabulary, true);
        entries
    }

    #[test]
    fn test_premature_end_marks() {
        let entries = annotated("~ ~ ~ ~ #", Vocabulary::Pgn);
        assert!(!entries[0].meta_marks.has_negated('#'));
        assert!(!entries[1].meta_marks.has_negated('#'));
        assert!(entries[2].meta_marks.has_negated('#'));
        assert!(entries[3].meta_marks.has_negated('#'));
        assert!(!entries[4].meta_marks.has_negated('#'));
        // Too short a steno for the draw guard to appear.
        assert!(!entries[3].meta_marks.has_negated('/'));
    }

    #[test]
    fn test_draw_guard_uses_dialect_mark() {
        let steno = vec!["~"; 20].join(" ");
        let classic = annotated(&steno, Vocabulary::Classic);
        assert!(classic[18].meta_marks.has_negated('='));
        assert!(!classic[18].meta_marks.has_negated('/'));
        let pgn = annotated(&steno, Vocabulary::Pgn);
        assert!(pgn[18].meta_marks.has_negated('/'));
    }

    #[test]
    fn test_promotion_schedule() {
        let entries = annotated("~ ~ ~ ~ ~ ~ ~ ~ q ~", Vocabulary::Classic);
        // turn 1 hits entries 6 and 7: pawn on the seventh, or an earlier queen.
        let group = &entries[6].meta_conditions[0];
        assert!(group
            .alternatives
            .contains(&vec![CondAtom::WhitePawnAtLeast(7)]));
        assert!(group
            .alternatives
            .contains(&vec![CondAtom::Promoted(vec!['Q'])]));
        // turn 4 hits entries 0 and 1.
        assert!(entries[0]
            .meta_conditions
            .iter()
            .any(|g| g.alternatives.contains(&vec![CondAtom::WhitePawnAtLeast(4)])));
        assert!(entries[9].meta_conditions.is_empty());
    }

    #[test]
    fn test_black_promotion_schedule_counts_down() {
        let entries = annotated("~ ~ ~ ~ ~ ~ ~ ~ ~ q ~", Vocabulary::Classic);
        assert!(entries[7]
            .meta_conditions
            .iter()
            .any(|g| g.alternatives.contains(&vec![CondAtom::BlackPawnAtMost(2)])));
    }

    #[test]
    fn test_castling_support() {
        let entries = annotated("~ ~ ~ ~ ~ ~ ~ ~ ~ ~ o ~", Vocabulary::Classic);
        // Index 10 castles: every earlier White move forbids the king.
        for entry in &entries[..10] {
            if entry.index % 2 == 0 {
                assert!(entry.meta_marks.has_negated('K'), "entry {}", entry.index);
            } else {
                assert!(!entry.meta_marks.has_negated('K'));
            }
            assert!(entry.meta_conditions.contains(&ConditionGroup {
                alternatives: vec![vec![CondAtom::PieceAt(
                    'R',
                    SquareSpec::At(Square::H1)
                )]],
            }));
        }
        // The opponent may not give check on the half-move before.
        assert!(entries[9].meta_marks.has_negated('+'));
        assert!(!entries[7].meta_marks.has_negated('+'));
        // f1/g1 must be clear going into the castle.
        let f1_empty = ConditionGroup {
            alternatives: vec![vec![CondAtom::Empty(SquareSpec::At(Square::F1))]],
        };
        assert!(entries[9].meta_conditions.contains(&f1_empty));
        assert!(entries[8].meta_conditions.contains(&f1_empty));
        assert!(!entries[7].meta_conditions.contains(&f1_empty));
    }

    #[test]
    fn test_queenside_allows_b_file_visitor_two_out() {
        let entries = annotated("~ ~ ~ ~ ~ ~ ~ ~ ~ ~ ~ ~ O ~", Vocabulary::Classic);
        let two_before = &entries[10].meta_conditions;
        let b1_group = two_before
            .iter()
            .find(|g| {
                g.alternatives
                    .contains(&vec![CondAtom::Empty(SquareSpec::At(Square::B1))])
            })
            .expect("b1 group two half-moves out");
        assert!(b1_group
            .alternatives
            .contains(&vec![CondAtom::PieceAt('n', SquareSpec::At(Square::B1))]));
        assert!(b1_group
            .alternatives
            .contains(&vec![CondAtom::PieceAt('l', SquareSpec::At(Square::B1))]));
        // One half-move out there is no such leeway.
        let one_before = &entries[11].meta_conditions;
        let b1_strict = one_before
            .iter()
            .find(|g| {
                g.alternatives
                    .contains(&vec![CondAtom::Empty(SquareSpec::At(Square::B1))])
            })
            .expect("b1 group one half-move out");
        assert_eq!(b1_strict.alternatives.len(), 1);
    }

    #[test]
    fn test_either_castle_side_resolution() {
        // Early enough, an either-side castle can only be king-side.
        let early = annotated("~ ~ ~ ~ ~ ~ O", Vocabulary::Pgn);
        let rook_home = ConditionGroup {
            alternatives: vec![vec![CondAtom::PieceAt('R', SquareSpec::At(Square::H1))]],
        };
        assert!(early[0].meta_conditions.contains(&rook_home));
        assert!(early[5].meta_marks.has_negated('+'));

        // Past the window the side is unknown: only the king and check
        // guards are synthesised.
        let steno = format!("{} O", vec!["~"; 21].join(" "));
        let late = annotated(&steno, Vocabulary::Pgn);
        assert!(late.iter().all(|e| e.meta_conditions.is_empty()));
        assert!(late[19].meta_marks.has_negated('K'));
        assert!(!late[18].meta_marks.has_negated('K'));
        assert!(late[20].meta_marks.has_negated('+'));
    }

    #[test]
    fn test_synthesis_is_idempotent() {
        let vocabulary = Vocabulary::Classic;
        let mut entries = parse("~ ~ ~ ~ ~ ~ ~ ~ q ~", vocabulary, true)
            .unwrap()
            .entries;
        synthesise(&mut entries, vocabulary, true);
        let once = entries.clone();
        synthesise(&mut entries, vocabulary, true);
        assert_eq!(once, entries);
    }

    #[test]
    fn test_extinction_forecast() {
        let vocabulary = Vocabulary::Classic;
        let mut entries = parse("~ ~ ~ ~ ~ ~ ~ ~ ~ ~ Q", vocabulary, true)
            .unwrap()
            .entries;
        // Every frontier board has lost the White queen.
        let placements = ["rnb1kbnr/pppppppp/8/8/8/8/PPPPPPPP/RNB1KBNR"];
        synthesise_extinction(&mut entries, 4, placements.iter().copied(), vocabulary);
        // Entry 10 needs a White queen; non-PGN shifts the demand two earlier.
        assert!(entries[8]
            .meta_conditions
            .iter()
            .any(|g| g.alternatives.contains(&vec![CondAtom::Promoted(vec!['Q'])])));
        // The schedule never reaches into consumed entries.
        for entry in &entries[..4] {
            assert!(entry.meta_conditions.is_empty());
        }
    }

    #[test]
    fn test_extinction_skips_present_pieces() {
        let vocabulary = Vocabulary::Classic;
        let mut entries = parse("~ ~ ~ ~ ~ ~ ~ ~ ~ ~ Q", vocabulary, true)
            .unwrap()
            .entries;
        let placements = ["rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR"];
        synthesise_extinction(&mut entries, 4, placements.iter().copied(), vocabulary);
        assert!(entries.iter().all(|e| e.meta_conditions.is_empty()));
    }

    #[test]
    fn test_future_pruning_probe() {
        let vocabulary = Vocabulary::Classic;
        let entries = parse("~ ~ ~ ~ ~ o ~", vocabulary, true).unwrap().entries;
        assert!(has_future_pruning(&entries, 0, vocabulary));
        assert!(has_future_pruning(&entries, 4, vocabulary));
        assert!(!has_future_pruning(&entries, 5, vocabulary));
    }
}
