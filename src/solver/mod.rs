pub mod checkpoint;
pub mod frontier;

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use log::{debug, error};
use rayon::prelude::*;
use rustc_hash::FxHashMap;
use shakmaty::{Color, Square};

use self::frontier::{Frontier, MoveSet, Position, Slot};
use crate::board::BoardError;
use crate::config::Config;
use crate::error::SolveError;
use crate::message::{Message, Report};
use crate::steno::conditions::{self, piece_letter, EvalContext};
use crate::steno::matcher::{self, MatchContext};
use crate::steno::meta;
use crate::steno::parser;
use crate::steno::validator;
use crate::steno::vocabulary::{CastleSides, Vocabulary};
use crate::steno::MarkEntry;

/// What a finished solve hands back: the final frontier, and the encoded
/// checkpoint blob if the steno carried a `$`.
pub struct Solution {
    pub frontier: Frontier,
    pub checkpoint: Option<Vec<u8>>,
}

/// The breadth-first search engine. Mark entries are consumed strictly in
/// order; within one entry the live positions are expanded in parallel on a
/// dedicated worker pool, with the next frontier behind a single mutex.
pub struct Solver {
    config: Config,
    reporter: Arc<dyn Report>,
    cancel: Mutex<Arc<AtomicBool>>,
    pool: rayon::ThreadPool,
}

impl Solver {
    pub fn new(config: Config, reporter: Arc<dyn Report>) -> Result<Self, SolveError> {
        config.validate()?;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.max_solver_tasks)
            .build()
            .map_err(|e| SolveError::InvalidLimit {
                value: config.max_solver_tasks.to_string(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            config,
            reporter,
            cancel: Mutex::new(Arc::new(AtomicBool::new(false))),
            pool,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Requests a cooperative stop of the solve in flight.
    pub fn cancel(&self) {
        self.cancel.lock().unwrap().store(true, Ordering::Relaxed);
    }

    /// Each solve gets a fresh token so an old cancellation cannot leak into
    /// the next run.
    fn fresh_cancel(&self) -> Arc<AtomicBool> {
        let token = Arc::new(AtomicBool::new(false));
        *self.cancel.lock().unwrap() = token.clone();
        token
    }

    /// Solves a steno, reporting the outcome to the host. `saved` is the
    /// checkpoint blob a leading `$` or a chunk directive resumes from.
    pub fn solve(&self, steno: &str, saved: Option<&[u8]>) -> Result<Solution, SolveError> {
        let result = self.solve_inner(steno, saved);
        match &result {
            Ok(solution) => self.reporter.report(Message::Success {
                positions: solution.frontier.len(),
            }),
            Err(e) if e.is_abort() => self.reporter.report(Message::Abort(e.to_string())),
            Err(e) => self.reporter.report(Message::Error(e.to_string())),
        }
        result
    }

    fn solve_inner(&self, steno: &str, saved: Option<&[u8]>) -> Result<Solution, SolveError> {
        let cancel = self.fresh_cancel();
        let vocabulary = self.config.vocabulary;
        let (start_board, standard_start) = self.config.start_position()?;
        let parsed = parser::parse(steno, vocabulary, self.config.allow_chunking)?;

        if parsed.resume || parsed.chunks.is_some() {
            let blob = saved.ok_or_else(|| {
                SolveError::InvalidCheckpointChunk("no checkpoint loaded".to_string())
            })?;
            let loaded = checkpoint::decode(blob, vocabulary, start_board.mode())?;
            let start_index = loaded.prefix.len();
            let mut entries = loaded.prefix;
            for mut entry in parsed.entries {
                entry.index = entries.len();
                entries.push(entry);
            }
            validator::validate(&entries, vocabulary, standard_start)?;
            meta::synthesise(&mut entries, vocabulary, standard_start);

            match parsed.chunks {
                Some((from, to)) => {
                    self.solve_chunks(entries, start_index, loaded.frontier, from, to, &cancel)
                }
                None => self.run(&mut entries, start_index, loaded.frontier, &cancel),
            }
        } else {
            let mut entries = parsed.entries;
            validator::validate(&entries, vocabulary, standard_start)?;
            meta::synthesise(&mut entries, vocabulary, standard_start);
            let mut initial = Frontier::default();
            initial.insert(start_board.position_key(), Position::start(start_board));
            self.run(&mut entries, 0, initial, &cancel)
        }
    }

    /// Consumes the entries from `start` onwards, snapshotting at `$` and
    /// running extinction synthesis after every step.
    fn run(
        &self,
        entries: &mut Vec<MarkEntry>,
        start: usize,
        initial: Frontier,
        cancel: &AtomicBool,
    ) -> Result<Solution, SolveError> {
        let mut frontier = initial;
        let mut saved = None;
        for index in start..entries.len() {
            if frontier.is_empty() {
                debug!("frontier empty before half-move {}", index + 1);
                break;
            }
            self.reporter.report(Message::Status(self.entry_status(&entries[index])));
            frontier = self.step(entries, index, frontier, cancel)?;
            if entries[index].checkpoint {
                let blob = checkpoint::encode(&frontier, &entries[..=index])?;
                self.reporter.report(Message::Status(format!(
                    "checkpoint: {} positions after half-move {}",
                    frontier.len(),
                    index + 1
                )));
                saved = Some(blob);
            }
            meta::synthesise_extinction(
                entries,
                index + 1,
                frontier.keys().map(|k| k.split(' ').next().unwrap_or("")),
                self.config.vocabulary,
            );
        }
        Ok(Solution {
            frontier,
            checkpoint: saved,
        })
    }

    fn entry_status(&self, entry: &MarkEntry) -> String {
        let mut status = format!("half-move {}: {}", entry.half_move(), entry.marks);
        for group in &entry.conditions {
            status.push_str(&group.to_string());
        }
        if self.config.show_meta_marks {
            if !entry.meta_marks.is_empty() {
                status.push_str(&format!(" meta {}", entry.meta_marks));
            }
            for group in &entry.meta_conditions {
                status.push_str(&group.to_string());
            }
        }
        status
    }

    /// Runs the loaded checkpoint one sorted key-slice at a time, each as an
    /// independent resumed run, and merges the results.
    fn solve_chunks(
        &self,
        entries: Vec<MarkEntry>,
        start: usize,
        loaded: Frontier,
        from: usize,
        to: usize,
        cancel: &AtomicBool,
    ) -> Result<Solution, SolveError> {
        let slices = checkpoint::chunk_keys(&loaded, from, to)?;
        let mut combined = Frontier::default();
        let mut saved = None;
        for (offset, keys) in slices.into_iter().enumerate() {
            self.reporter.report(Message::Status(format!(
                "chunk {}: {} positions",
                from + offset,
                keys.len()
            )));
            let sub: Frontier = keys
                .iter()
                .filter_map(|k| loaded.get(k).map(|p| (k.clone(), p.clone())))
                .collect();
            let mut chunk_entries = entries.clone();
            let solution = self.run(&mut chunk_entries, start, sub, cancel)?;
            saved = solution.checkpoint.or(saved);
            for (key, position) in solution.frontier {
                match combined.get_mut(&key) {
                    Some(existing) => {
                        existing.merge(position.move_sets, self.config.max_cooks_to_keep)
                    }
                    None => {
                        if combined.len() >= self.config.max_positions_to_examine {
                            let size = combined.len();
                            return Err(SolveError::PositionLimitReached(size));
                        }
                        combined.insert(key, position);
                    }
                }
            }
        }
        Ok(Solution {
            frontier: combined,
            checkpoint: saved,
        })
    }

    /// One mark entry: expand every live position by every matching legal
    /// move, deduplicate by post-move key, and return the survivors.
    fn step(
        &self,
        entries: &[MarkEntry],
        index: usize,
        frontier: Frontier,
        cancel: &AtomicBool,
    ) -> Result<Frontier, SolveError> {
        let mover = entries[index].color();
        let positions: Vec<Position> = frontier.into_iter().map(|(_, p)| p).collect();
        let next: Mutex<FxHashMap<String, Slot>> = Mutex::new(FxHashMap::default());
        let inherit_check_future =
            meta::has_future_pruning(entries, index, self.config.vocabulary);
        let progress = StepProgress::new(index, positions.len());

        let outcome: Result<(), SolveError> = self.pool.install(|| {
            positions.par_iter().try_for_each(|position| {
                if cancel.load(Ordering::Relaxed) {
                    return Err(SolveError::UserAborted);
                }
                self.expand(
                    entries,
                    index,
                    mover,
                    position,
                    inherit_check_future,
                    &next,
                    cancel,
                    &progress,
                )?;
                progress.position_examined(self.reporter.as_ref());
                Ok(())
            })
        });
        outcome?;

        let map = next.into_inner().unwrap();
        Ok(map
            .into_iter()
            .filter_map(|(key, slot)| match slot {
                Slot::Live(position) => Some((key, position)),
                Slot::Dead => None,
            })
            .collect())
    }

    #[allow(clippy::too_many_arguments)]
    fn expand(
        &self,
        entries: &[MarkEntry],
        index: usize,
        mover: Color,
        position: &Position,
        inherit_check_future: bool,
        next: &Mutex<FxHashMap<String, Slot>>,
        cancel: &AtomicBool,
        progress: &StepProgress,
    ) -> Result<(), SolveError> {
        let entry = &entries[index];
        if position.board.endgame().is_some() {
            // A finished game has no further half-moves to offer.
            return Ok(());
        }
        let previous: Vec<Option<Square>> = position
            .move_sets
            .iter()
            .map(MoveSet::previous_own_destination)
            .collect();

        for candidate in position.board.candidates() {
            if cancel.load(Ordering::Relaxed) {
                return Err(SolveError::UserAborted);
            }
            let verdict = matcher::matches(
                entry,
                &MatchContext {
                    board: &position.board,
                    candidate: &candidate,
                    vocabulary: self.config.vocabulary,
                    mover,
                    previous_destinations: &previous,
                },
            );
            if !verdict.matched {
                continue;
            }
            let survivors: Vec<&MoveSet> = match &verdict.witnesses {
                None => position.move_sets.iter().collect(),
                Some(mask) => position
                    .move_sets
                    .iter()
                    .zip(mask)
                    .filter_map(|(set, keep)| if *keep { Some(set) } else { None })
                    .collect(),
            };
            if survivors.is_empty() {
                continue;
            }

            let after = match position.board.apply(&candidate.mv) {
                Ok(board) => board,
                Err(BoardError::GameOver) => continue,
                Err(BoardError::Rejected) => {
                    error!(
                        "board service rejected `{}` on {}",
                        candidate.san,
                        position.board.to_fen()
                    );
                    panic!(
                        "board service rejected `{}` on {}",
                        candidate.san,
                        position.board.to_fen()
                    );
                }
            };
            let key = after.position_key();
            let endgame = after.endgame();
            let destination = candidate.destination(mover);
            let capture = candidate
                .capture()
                .map(|role| piece_letter(role, !mover, destination));
            let promotion = candidate
                .promotion()
                .map(|role| piece_letter(role, mover, destination));
            let result_token = endgame.map(|e| e.result_token());

            // Fast path: a key seen earlier this step merges its cooks with
            // no lookahead and no condition recheck.
            {
                let mut map = next.lock().unwrap();
                match map.get_mut(&key) {
                    Some(Slot::Dead) => continue,
                    Some(Slot::Live(existing)) => {
                        let extended = survivors
                            .iter()
                            .map(|set| {
                                set.extended(
                                    &candidate.san,
                                    capture,
                                    promotion,
                                    destination,
                                    result_token,
                                )
                            })
                            .collect();
                        existing.merge(extended, self.config.max_cooks_to_keep);
                        progress.moveset_inserted(self.reporter.as_ref());
                        continue;
                    }
                    None => {}
                }
            }

            if verdict.must_draw && !endgame.map_or(false, |e| e.is_draw()) {
                continue;
            }
            if verdict.must_not_draw && endgame.map_or(false, |e| e.is_draw()) {
                continue;
            }

            let mut accepted = Vec::new();
            for move_set in &survivors {
                let extended = move_set.extended(
                    &candidate.san,
                    capture,
                    promotion,
                    destination,
                    result_token,
                );
                let passes = conditions::evaluate(
                    &entry.conditions,
                    &entry.meta_conditions,
                    &EvalContext {
                        after: &after,
                        candidate: &candidate,
                        mover,
                        captures: &extended.captures,
                        promotions: &extended.promotions,
                    },
                );
                if passes {
                    accepted.push(extended);
                    if accepted.len() > self.config.max_cooks_to_keep {
                        break;
                    }
                }
            }
            if accepted.is_empty() {
                continue;
            }

            if position.check_future
                && !fen_could_solve(&key, entries, index, self.config.vocabulary)
            {
                let mut map = next.lock().unwrap();
                map.entry(key).or_insert(Slot::Dead);
                continue;
            }

            let mut map = next.lock().unwrap();
            match map.get_mut(&key) {
                Some(Slot::Dead) => {}
                Some(Slot::Live(existing)) => {
                    existing.merge(accepted, self.config.max_cooks_to_keep);
                    progress.moveset_inserted(self.reporter.as_ref());
                }
                None => {
                    if map.len() >= self.config.max_positions_to_examine {
                        let size = map.len();
                        map.clear();
                        return Err(SolveError::PositionLimitReached(size));
                    }
                    map.insert(
                        key,
                        Slot::Live(Position {
                            board: after,
                            check_future: inherit_check_future,
                            move_sets: accepted,
                        }),
                    );
                    progress.moveset_inserted(self.reporter.as_ref());
                }
            }
        }
        Ok(())
    }
}

/// Shared step counters, in the spirit of a search context: progress is
/// reported roughly every 0.1% of positions examined and every thousandth
/// insertion.
struct StepProgress {
    entry: usize,
    total: usize,
    stride: usize,
    examined: AtomicUsize,
    inserted: AtomicUsize,
}

impl StepProgress {
    fn new(entry: usize, total: usize) -> Self {
        Self {
            entry,
            total,
            stride: (total / 1000).max(1),
            examined: AtomicUsize::new(0),
            inserted: AtomicUsize::new(0),
        }
    }

    fn position_examined(&self, reporter: &dyn Report) {
        let done = self.examined.fetch_add(1, Ordering::Relaxed) + 1;
        if done % self.stride == 0 {
            reporter.report(Message::InProgress {
                entry: self.entry,
                examined: done,
                total: self.total,
                inserted: self.inserted.load(Ordering::Relaxed),
            });
        }
    }

    fn moveset_inserted(&self, reporter: &dyn Report) {
        let count = self.inserted.fetch_add(1, Ordering::Relaxed) + 1;
        if count % 1000 == 0 {
            reporter.report(Message::InProgress {
                entry: self.entry,
                examined: self.examined.load(Ordering::Relaxed),
                total: self.total,
                inserted: count,
            });
        }
    }
}

/// A cheap key-only probe for whether any future entry is already
/// unsatisfiable from this position: a demanded castle whose rights are gone,
/// or a pawn-needing mark for a colour with no pawns left.
// TODO: also check mating material for `#` and exact pawn counts for `%`.
fn fen_could_solve(
    key: &str,
    entries: &[MarkEntry],
    index: usize,
    vocabulary: Vocabulary,
) -> bool {
    let mut fields = key.split(' ');
    let placement = fields.next().unwrap_or("");
    let _turn = fields.next();
    let castling = fields.next().unwrap_or("-");

    for entry in &entries[index + 1..] {
        let color = entry.color();
        for atom in entry.marks.positive_atoms() {
            if let Some(sides) = vocabulary.castle_sides(atom) {
                if !castling_available(castling, color, sides) {
                    return false;
                }
            }
            let needs_pawn =
                atom == 'P' || atom == '%' || vocabulary.promotion(atom).is_some();
            if needs_pawn {
                let pawn = match color {
                    Color::White => 'P',
                    Color::Black => 'p',
                };
                if !placement.contains(pawn) {
                    return false;
                }
            }
        }
    }
    true
}

/// Reads the FEN castling field. Standard letters answer exactly; Chess960
/// file letters cannot name a side, so they conservatively allow both.
fn castling_available(field: &str, color: Color, sides: CastleSides) -> bool {
    if field == "-" {
        return false;
    }
    let ours = |c: char| match color {
        Color::White => c.is_ascii_uppercase(),
        Color::Black => c.is_ascii_lowercase(),
    };
    let (king_letter, queen_letter) = match color {
        Color::White => ('K', 'Q'),
        Color::Black => ('k', 'q'),
    };
    let other = field
        .chars()
        .any(|c| ours(c) && c != king_letter && c != queen_letter);
    match sides {
        CastleSides::King => field.contains(king_letter) || other,
        CastleSides::Queen => field.contains(queen_letter) || other,
        CastleSides::Either => field.chars().any(ours),
    }
}
