use std::io::{Read, Write};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use shakmaty::{CastlingMode, Square};

use super::frontier::{Frontier, MoveSet, Position};
use crate::board::Board;
use crate::error::SolveError;
use crate::steno::parser::{parse_entry, CHUNK_SIZE};
use crate::steno::vocabulary::Vocabulary;
use crate::steno::MarkEntry;

/// A decoded checkpoint: the saved frontier and the consumed mark-entry
/// prefix it was taken after.
pub struct Checkpoint {
    pub frontier: Frontier,
    pub prefix: Vec<MarkEntry>,
}

/// Wire shape of one frontier slot. SAN strings are stored brotli-compressed
/// and base64-encoded inside the JSON.
#[derive(Serialize, Deserialize)]
struct PositionRecord {
    f: bool,
    m: Vec<MoveSetRecord>,
}

#[derive(Serialize, Deserialize)]
struct MoveSetRecord {
    m: String,
    c: String,
    p: String,
    r: [Option<u8>; 2],
}

/// Serialises the frontier and the consumed prefix as
/// `JSON(frontier) NUL JSON(prefix)`, brotli-compressed.
pub fn encode(frontier: &Frontier, consumed: &[MarkEntry]) -> Result<Vec<u8>, SolveError> {
    let records: FxHashMap<&str, PositionRecord> = frontier
        .iter()
        .map(|(key, position)| {
            let move_sets = position
                .move_sets
                .iter()
                .map(|set| MoveSetRecord {
                    m: BASE64.encode(compress(set.moves.as_bytes())),
                    c: set.captures.clone(),
                    p: set.promotions.clone(),
                    r: [
                        set.recent[0].map(|sq| u32::from(sq) as u8),
                        set.recent[1].map(|sq| u32::from(sq) as u8),
                    ],
                })
                .collect();
            (
                key.as_str(),
                PositionRecord {
                    f: position.check_future,
                    m: move_sets,
                },
            )
        })
        .collect();
    let prefix: Vec<&str> = consumed.iter().map(|e| e.checkpoint_text()).collect();

    let frontier_json = serde_json::to_vec(&records)
        .map_err(|e| SolveError::InvalidCheckpointChunk(e.to_string()))?;
    let prefix_json = serde_json::to_vec(&prefix)
        .map_err(|e| SolveError::InvalidCheckpointChunk(e.to_string()))?;

    let mut plain = frontier_json;
    plain.push(0);
    plain.extend_from_slice(&prefix_json);
    Ok(compress(&plain))
}

/// Reverses `encode`. Boards are rebuilt from the position key plus a
/// fullmove number derived from the first MoveSet's length.
pub fn decode(
    blob: &[u8],
    vocabulary: Vocabulary,
    mode: CastlingMode,
) -> Result<Checkpoint, SolveError> {
    let plain = decompress(blob)
        .map_err(|_| SolveError::InvalidCheckpointChunk("not a brotli stream".to_string()))?;
    let nul = plain
        .iter()
        .position(|b| *b == 0)
        .ok_or_else(|| SolveError::InvalidCheckpointChunk("missing separator".to_string()))?;
    let records: FxHashMap<String, PositionRecord> = serde_json::from_slice(&plain[..nul])
        .map_err(|e| SolveError::InvalidCheckpointChunk(e.to_string()))?;
    let prefix_text: Vec<String> = serde_json::from_slice(&plain[nul + 1..])
        .map_err(|e| SolveError::InvalidCheckpointChunk(e.to_string()))?;

    let mut frontier = Frontier::default();
    for (key, record) in records {
        let move_sets: Vec<MoveSet> = record
            .m
            .into_iter()
            .map(|set| {
                let bytes = BASE64
                    .decode(&set.m)
                    .map_err(|e| SolveError::InvalidCheckpointChunk(e.to_string()))?;
                let moves = decompress(&bytes).map_err(|_| {
                    SolveError::InvalidCheckpointChunk("bad move stream".to_string())
                })?;
                let moves = String::from_utf8(moves)
                    .map_err(|e| SolveError::InvalidCheckpointChunk(e.to_string()))?;
                Ok(MoveSet {
                    moves,
                    captures: set.c,
                    promotions: set.p,
                    recent: [square_from_index(set.r[0]), square_from_index(set.r[1])],
                })
            })
            .collect::<Result<_, SolveError>>()?;
        if move_sets.is_empty() {
            return Err(SolveError::InvalidCheckpointChunk(format!(
                "position {} has no histories",
                key
            )));
        }
        let fullmove = move_sets[0].move_count() / 2 + 2;
        let board = Board::from_fen(&format!("{} 0 {}", key, fullmove), mode)?;
        frontier.insert(
            key,
            Position {
                board,
                check_future: record.f,
                move_sets,
            },
        );
    }

    let prefix = prefix_text
        .iter()
        .enumerate()
        .map(|(index, raw)| parse_entry(raw, index, vocabulary))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Checkpoint { frontier, prefix })
}

/// The sorted key slices for multi-chunk work: chunk numbers are 1-based and
/// each chunk holds up to `CHUNK_SIZE` positions.
pub fn chunk_keys(
    frontier: &Frontier,
    from: usize,
    to: usize,
) -> Result<Vec<Vec<String>>, SolveError> {
    let mut keys: Vec<String> = frontier.keys().cloned().collect();
    keys.sort_unstable();
    let chunk_count = (keys.len() + CHUNK_SIZE - 1) / CHUNK_SIZE;
    if from == 0 || to < from || to > chunk_count.max(1) {
        return Err(SolveError::InvalidCheckpointChunk(format!(
            "chunks {}-{} outside the available 1-{}",
            from, to, chunk_count
        )));
    }
    Ok(keys
        .chunks(CHUNK_SIZE)
        .skip(from - 1)
        .take(to - from + 1)
        .map(|slice| slice.to_vec())
        .collect())
}

fn square_from_index(index: Option<u8>) -> Option<Square> {
    match index {
        Some(i) if i < 64 => Some(Square::new(u32::from(i))),
        _ => None,
    }
}

fn compress(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    {
        let mut writer = brotli::CompressorWriter::new(&mut out, 4096, 5, 22);
        // Writing into a Vec cannot fail.
        writer.write_all(data).expect("in-memory compression");
    }
    out
}

fn decompress(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut out = Vec::new();
    brotli::Decompressor::new(data, 4096).read_to_end(&mut out)?;
    Ok(out)
}
