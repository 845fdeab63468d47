use regex::Regex;

use super::vocabulary::Vocabulary;
use super::{AtomGroup, CondAtom, ConditionGroup, MarkEntry, MarkExpr, SquareSpec};
use crate::error::SolveError;
use shakmaty::{File, Rank, Square};

/// Positions per chunk when a checkpoint is re-solved in slices.
pub const CHUNK_SIZE: usize = 1000;

/// The result of tokenising a whole steno string: an optional chunk
/// directive, an optional leading `$` (resume from the loaded checkpoint
/// prefix), and the mark entries themselves.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedSteno {
    pub chunks: Option<(usize, usize)>,
    pub resume: bool,
    pub entries: Vec<MarkEntry>,
}

pub fn parse(
    input: &str,
    vocabulary: Vocabulary,
    allow_chunking: bool,
) -> Result<ParsedSteno, SolveError> {
    let stripped = strip_comments(input);
    let mut tokens = stripped.split_whitespace().peekable();

    let chunk_re = Regex::new(r"^(\d+)(?:-(\d+))?\*$").unwrap();
    let mut chunks = None;
    if let Some(&first) = tokens.peek() {
        if let Some(caps) = chunk_re.captures(first) {
            if !allow_chunking {
                return Err(SolveError::steno(first, "chunking is disabled"));
            }
            let from: usize = caps[1]
                .parse()
                .map_err(|_| SolveError::steno(first, "chunk number out of range"))?;
            let to: usize = match caps.get(2) {
                Some(m) => m
                    .as_str()
                    .parse()
                    .map_err(|_| SolveError::steno(first, "chunk number out of range"))?,
                None => from,
            };
            if from == 0 || to < from {
                return Err(SolveError::steno(first, "bad chunk range"));
            }
            chunks = Some((from, to));
            tokens.next();
        }
    }

    let resume = if tokens.peek() == Some(&"$") {
        tokens.next();
        true
    } else {
        false
    };

    let mut entries = Vec::new();
    for token in tokens {
        let entry = parse_entry(token, entries.len(), vocabulary)?;
        entries.push(entry);
    }

    let checkpoints = entries.iter().filter(|e| e.checkpoint).count();
    if checkpoints > 1 {
        return Err(SolveError::steno(input.trim(), "more than one $ in steno"));
    }
    if checkpoints > 0 {
        if let Some((from, to)) = chunks {
            if to > from {
                return Err(SolveError::steno(
                    input.trim(),
                    "$ cannot be combined with multi-chunk work",
                ));
            }
        }
    }

    Ok(ParsedSteno {
        chunks,
        resume,
        entries,
    })
}

/// Removes balanced parenthesised comments, innermost first, until none
/// remain. Unbalanced parentheses survive and fail mark validation later.
fn strip_comments(input: &str) -> String {
    let re = Regex::new(r"\([^()]*\)").unwrap();
    let mut text = input.to_string();
    loop {
        let next = re.replace_all(&text, " ").into_owned();
        if next == text {
            return text;
        }
        text = next;
    }
}

/// Parses one whitespace-delimited token as a mark entry:
/// `MARK(&MARK|!MARK|MARK)*([COND(|COND)*(&COND)*])*$?`.
pub fn parse_entry(
    token: &str,
    index: usize,
    vocabulary: Vocabulary,
) -> Result<MarkEntry, SolveError> {
    let mut chars = token.chars().peekable();
    let mut expr = MarkExpr::default();
    let mut conditions = Vec::new();
    let mut checkpoint = false;
    let mut negate_next = false;
    let mut join_next = false;

    while let Some(c) = chars.next() {
        match c {
            '&' => join_next = true,
            '!' => negate_next = true,
            '[' => {
                let mut body = String::new();
                loop {
                    match chars.next() {
                        Some(']') => break,
                        Some(inner) => body.push(inner),
                        None => {
                            return Err(SolveError::steno(token, "unterminated condition bracket"))
                        }
                    }
                }
                conditions.push(parse_condition_group(&body, token)?);
            }
            '$' => {
                if chars.peek().is_some() {
                    return Err(SolveError::steno(token, "$ must end the entry"));
                }
                checkpoint = true;
            }
            _ => {
                let mut mark = c;
                if vocabulary.accepts_prime()
                    && c.is_ascii_uppercase()
                    && chars.peek() == Some(&'\'')
                {
                    chars.next();
                    mark = c.to_ascii_lowercase();
                }
                if !vocabulary.is_mark(mark) {
                    return Err(SolveError::steno(
                        token,
                        format!("`{}` is not a mark in this vocabulary", mark),
                    ));
                }
                if negate_next {
                    expr.negated.push(mark);
                    negate_next = false;
                    join_next = false;
                } else if join_next {
                    match expr.groups.last_mut() {
                        Some(group) => group.push(mark),
                        None => return Err(SolveError::steno(token, "& before any mark")),
                    }
                    join_next = false;
                } else {
                    let mut group = AtomGroup::new();
                    group.push(mark);
                    expr.groups.push(group);
                }
            }
        }
    }

    if negate_next || join_next {
        return Err(SolveError::steno(token, "dangling & or !"));
    }
    if expr.is_empty() {
        return Err(SolveError::steno(token, "entry has no marks"));
    }

    Ok(MarkEntry {
        index,
        marks: expr,
        meta_marks: MarkExpr::default(),
        conditions,
        meta_conditions: Vec::new(),
        checkpoint,
        raw: token.to_string(),
    })
}

fn parse_condition_group(body: &str, token: &str) -> Result<ConditionGroup, SolveError> {
    let mut group = ConditionGroup::default();
    for alternative in body.split('|') {
        let mut atoms = Vec::new();
        for atom in alternative.split('&') {
            atoms.push(parse_condition_atom(atom, token)?);
        }
        group.alternatives.push(atoms);
    }
    Ok(group)
}

fn parse_condition_atom(text: &str, token: &str) -> Result<CondAtom, SolveError> {
    let mut chars = text.chars();
    let first = chars
        .next()
        .ok_or_else(|| SolveError::steno(token, "empty condition"))?;
    let rest: String = chars.collect();
    match first {
        'x' => {
            let mut rest_chars = rest.chars();
            match (rest_chars.next(), rest_chars.next()) {
                (Some(p), None) if is_condition_piece(p) => Ok(CondAtom::CapturedNow(p)),
                _ => Err(SolveError::steno(token, "x condition names one piece")),
            }
        }
        'X' => {
            let pieces = condition_pieces(&rest, token)?;
            if pieces.is_empty() {
                return Err(SolveError::steno(token, "X condition lists pieces"));
            }
            Ok(CondAtom::CapturedAll(pieces))
        }
        '=' => Ok(CondAtom::Promoted(condition_pieces(&rest, token)?)),
        '^' => Ok(CondAtom::WhitePawnAtLeast(condition_rank(&rest, token)?)),
        'v' => Ok(CondAtom::BlackPawnAtMost(condition_rank(&rest, token)?)),
        '-' => Ok(CondAtom::Empty(parse_square_spec(&rest, token)?)),
        '@' => Ok(CondAtom::OriginatedAt(parse_square_spec(&rest, token)?)),
        p if is_condition_piece(p) => Ok(CondAtom::PieceAt(p, parse_square_spec(&rest, token)?)),
        other => Err(SolveError::steno(
            token,
            format!("`{}` does not start a condition", other),
        )),
    }
}

/// Condition piece letters: the six types with bishops split into light `L`
/// and dark `D`; upper case White, lower case Black.
fn is_condition_piece(c: char) -> bool {
    matches!(
        c,
        'P' | 'N' | 'L' | 'D' | 'R' | 'Q' | 'K' | 'p' | 'n' | 'l' | 'd' | 'r' | 'q' | 'k'
    )
}

fn condition_pieces(text: &str, token: &str) -> Result<Vec<char>, SolveError> {
    text.chars()
        .map(|c| {
            if is_condition_piece(c) {
                Ok(c)
            } else {
                Err(SolveError::steno(
                    token,
                    format!("`{}` is not a piece letter", c),
                ))
            }
        })
        .collect()
}

fn condition_rank(text: &str, token: &str) -> Result<u32, SolveError> {
    match text.parse::<u32>() {
        Ok(rank) if (1..=8).contains(&rank) => Ok(rank),
        _ => Err(SolveError::steno(token, "rank must be 1-8")),
    }
}

fn parse_square_spec(text: &str, token: &str) -> Result<SquareSpec, SolveError> {
    let mut chars = text.chars().peekable();
    let mut file = None;
    let mut rank = None;
    if let Some(c) = chars.peek().copied() {
        if ('a'..='h').contains(&c) {
            file = Some(File::new(c as u32 - 'a' as u32));
            chars.next();
        }
    }
    if let Some(c) = chars.peek().copied() {
        if ('1'..='8').contains(&c) {
            rank = Some(Rank::new(c as u32 - '1' as u32));
            chars.next();
        }
    }
    if chars.next().is_some() {
        return Err(SolveError::steno(token, "malformed square"));
    }
    match (file, rank) {
        (Some(f), Some(r)) => Ok(SquareSpec::At(Square::from_coords(f, r))),
        (Some(f), None) => Ok(SquareSpec::FileOnly(f)),
        (None, Some(r)) => Ok(SquareSpec::RankOnly(r)),
        (None, None) => Err(SolveError::steno(token, "condition names no square")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_marks() {
        let parsed = parse("~ ~ ~ #", Vocabulary::Pgn, true).unwrap();
        assert_eq!(parsed.entries.len(), 4);
        assert!(!parsed.resume);
        assert!(parsed.chunks.is_none());
        assert!(parsed.entries[3].marks.has_positive('#'));
        assert_eq!(parsed.entries[1].index, 1);
    }

    #[test]
    fn test_or_and_conjunction_and_negation() {
        let parsed = parse("eB&c!K", Vocabulary::Extended, true).unwrap();
        let expr = &parsed.entries[0].marks;
        assert_eq!(expr.groups.len(), 2);
        assert_eq!(expr.groups[0].as_slice(), &['e']);
        assert_eq!(expr.groups[1].as_slice(), &['B', 'c']);
        assert_eq!(expr.negated.as_slice(), &['K']);
    }

    #[test]
    fn test_prime_shorthand() {
        let parsed = parse("L'", Vocabulary::Classic, true).unwrap();
        assert!(parsed.entries[0].marks.has_positive('l'));
        assert!(parse("L'", Vocabulary::Pgn, true).is_err());
    }

    #[test]
    fn test_comments_are_stripped_iteratively() {
        let parsed = parse("(outer (inner) comment) e e", Vocabulary::Classic, true).unwrap();
        assert_eq!(parsed.entries.len(), 2);
    }

    #[test]
    fn test_chunk_directive() {
        let parsed = parse("3-5* $ ~", Vocabulary::Classic, true).unwrap();
        assert_eq!(parsed.chunks, Some((3, 5)));
        assert!(parsed.resume);
        assert_eq!(parsed.entries.len(), 1);

        assert!(parse("3-5* ~", Vocabulary::Classic, false).is_err());
        assert!(parse("5-3* ~", Vocabulary::Classic, true).is_err());
    }

    #[test]
    fn test_dollar_rules() {
        let parsed = parse("e e$ ~", Vocabulary::Classic, true).unwrap();
        assert!(parsed.entries[1].checkpoint);
        assert!(parse("e$ e$", Vocabulary::Classic, true).is_err());
        assert!(parse("e$e", Vocabulary::Classic, true).is_err());
        assert!(parse("2-4* e$ ~", Vocabulary::Classic, true).is_err());
        // A single-chunk directive may still save.
        assert!(parse("2* e$ ~", Vocabulary::Classic, true).is_ok());
    }

    #[test]
    fn test_conditions() {
        let parsed = parse("e[=Q|^7&-e4][Rh1]", Vocabulary::Classic, true).unwrap();
        let entry = &parsed.entries[0];
        assert_eq!(entry.conditions.len(), 2);
        let first = &entry.conditions[0];
        assert_eq!(first.alternatives.len(), 2);
        assert_eq!(first.alternatives[0], vec![CondAtom::Promoted(vec!['Q'])]);
        assert_eq!(
            first.alternatives[1],
            vec![
                CondAtom::WhitePawnAtLeast(7),
                CondAtom::Empty(SquareSpec::At(Square::E4)),
            ]
        );
        assert_eq!(
            entry.conditions[1].alternatives[0],
            vec![CondAtom::PieceAt('R', SquareSpec::At(Square::H1))]
        );
    }

    #[test]
    fn test_partial_squares() {
        let parsed = parse("~[-e][@2][pd]", Vocabulary::Classic, true).unwrap();
        let conds = &parsed.entries[0].conditions;
        assert_eq!(
            conds[0].alternatives[0],
            vec![CondAtom::Empty(SquareSpec::FileOnly(File::E))]
        );
        assert_eq!(
            conds[1].alternatives[0],
            vec![CondAtom::OriginatedAt(SquareSpec::RankOnly(Rank::Second))]
        );
        assert_eq!(
            conds[2].alternatives[0],
            vec![CondAtom::PieceAt('p', SquareSpec::FileOnly(File::D))]
        );
    }

    #[test]
    fn test_rejects_foreign_marks() {
        assert!(parse("0", Vocabulary::Classic, true).is_err());
        assert!(parse("B", Vocabulary::Classic, true).is_err());
        assert!(parse("e!", Vocabulary::Classic, true).is_err());
        assert!(parse("[", Vocabulary::Classic, true).is_err());
    }
}
