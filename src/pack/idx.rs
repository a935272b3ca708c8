//! Reader for pack index v2 (`.idx`) files.
//!
//! Layout: 8-byte magic, 256-entry big-endian fanout table, sha table,
//! crc table, offset table (large offsets side-tabled via an MSB-set
//! marker), then the pack's own checksum and the idx's own checksum.

use std::collections::HashMap;

use crate::error::{GitError, Result};
use crate::object::ObjectId;

const IDX_MAGIC: &[u8; 8] = b"\xfftOc\x00\x00\x00\x02";
const FANOUT_ENTRIES: usize = 256;
const LARGE_OFFSET_MARKER: u32 = 0x8000_0000;

#[derive(Debug, Clone)]
pub struct IdxMap {
    /// sha1 -> byte range `[start, end)` within the pack file.
    pub dict_offset: HashMap<ObjectId, (u64, u64)>,
    /// pack offset -> sha1, for resolving OFS_DELTA bases.
    pub dict_offset_to_sha1: HashMap<u64, ObjectId>,
    /// end of object data in the pack file; the pack's own 20-byte
    /// checksum starts here.
    pub pack_end: u64,
    pub pack_sha: ObjectId,
    pub idx_sha: ObjectId,
}

/// Parses a `.idx` file's bytes, cross-checked against the sibling
/// pack file's total size (needed to compute the last entry's `end`).
pub fn read_idx(idx_data: &[u8], pack_size: u64) -> Result<IdxMap> {
    if pack_size <= 20 {
        return Err(GitError::pack_broken(format!(
            "pack file too short: {pack_size}"
        )));
    }
    let pack_end = pack_size - 20;

    if idx_data.len() < 8 || &idx_data[..8] != IDX_MAGIC.as_slice() {
        return Err(GitError::pack_broken(format!(
            "unexpected idx header {:?}",
            idx_data.get(..8)
        )));
    }

    // fanout table occupies [8, 1032); the last entry is the object count.
    if idx_data.len() < 1032 {
        return Err(GitError::pack_broken("idx file truncated in fanout table"));
    }
    let size = u32::from_be_bytes(idx_data[1028..1032].try_into().unwrap()) as usize;

    let sha_start = 1032;
    let sha_end = sha_start + size * 20;
    let sha_table = idx_data
        .get(sha_start..sha_end)
        .ok_or_else(|| GitError::pack_broken("idx file truncated in sha1 table"))?;
    let mut shas = Vec::with_capacity(size);
    for chunk in sha_table.chunks_exact(20) {
        shas.push(ObjectId::from_slice(chunk)?);
    }

    // crc table: validated by the pack-index generator, not re-verified on read.
    let crc_start = sha_end;
    let crc_end = crc_start + size * 4;
    if idx_data.len() < crc_end {
        return Err(GitError::pack_broken("idx file truncated in crc table"));
    }

    let off_start = crc_end;
    let off_end = off_start + size * 4;
    let off_table = idx_data
        .get(off_start..off_end)
        .ok_or_else(|| GitError::pack_broken("idx file truncated in offset table"))?;
    let mut raw_offsets = Vec::with_capacity(size);
    for chunk in off_table.chunks_exact(4) {
        raw_offsets.push(u32::from_be_bytes(chunk.try_into().unwrap()));
    }

    let large_count = raw_offsets
        .iter()
        .filter(|&&v| v & LARGE_OFFSET_MARKER != 0)
        .count();

    let mut cursor = off_end;
    let large_table: Vec<u64> = if large_count > 0 {
        let large_start = cursor;
        let large_end = large_start + large_count * 8;
        let table = idx_data
            .get(large_start..large_end)
            .ok_or_else(|| GitError::pack_broken("idx file truncated in large offset table"))?;
        cursor = large_end;
        table
            .chunks_exact(8)
            .map(|chunk| u64::from_be_bytes(chunk.try_into().unwrap()))
            .collect()
    } else {
        Vec::new()
    };

    let offsets: Vec<u64> = raw_offsets
        .iter()
        .map(|&raw| {
            if raw & LARGE_OFFSET_MARKER != 0 {
                let idx = (raw & !LARGE_OFFSET_MARKER) as usize;
                large_table
                    .get(idx)
                    .copied()
                    .ok_or_else(|| GitError::pack_broken("large offset index out of range"))
            } else {
                Ok(raw as u64)
            }
        })
        .collect::<Result<_>>()?;

    let pack_sha_bytes = idx_data
        .get(cursor..cursor + 20)
        .ok_or_else(|| GitError::pack_broken("idx file truncated before pack checksum"))?;
    let pack_sha = ObjectId::from_slice(pack_sha_bytes)?;
    cursor += 20;
    let idx_sha_bytes = idx_data
        .get(cursor..cursor + 20)
        .ok_or_else(|| GitError::pack_broken("idx file truncated before idx checksum"))?;
    let idx_sha = ObjectId::from_slice(idx_sha_bytes)?;
    let trailer_end = cursor + 20;

    if idx_data.len() != trailer_end {
        return Err(GitError::pack_broken(format!(
            "idx file has {} trailing bytes after checksum",
            idx_data.len() - trailer_end
        )));
    }

    let mut hasher = sha1_smol::Sha1::new();
    hasher.update(&idx_data[..trailer_end - 20]);
    let computed = ObjectId::from_bytes(hasher.digest().bytes());
    if computed != idx_sha {
        return Err(GitError::pack_broken(format!(
            "idx file sha1 mismatch: computed={computed}, expected={idx_sha}"
        )));
    }

    if shas.len() != offsets.len() {
        return Err(GitError::pack_broken(format!(
            "sha1 table length ({}) does not match offset table length ({})",
            shas.len(),
            offsets.len()
        )));
    }

    let mut dict_offset_to_sha1 = HashMap::with_capacity(size);
    let mut by_offset: Vec<(ObjectId, u64)> = shas.into_iter().zip(offsets).collect();
    for (sha, offset) in &by_offset {
        dict_offset_to_sha1.insert(*offset, *sha);
    }
    by_offset.sort_by_key(|(_, offset)| *offset);

    let mut dict_offset = HashMap::with_capacity(size);
    let mut iter = by_offset.into_iter().peekable();
    while let Some((sha, start)) = iter.next() {
        let end = iter.peek().map(|(_, next)| *next).unwrap_or(pack_end);
        dict_offset.insert(sha, (start, end));
    }

    Ok(IdxMap {
        dict_offset,
        dict_offset_to_sha1,
        pack_end,
        pack_sha,
        idx_sha,
    })
}
