//! Pack file object reading: progressive zlib decompression (we never
//! know the compressed size up front) and the eager/lazy segment read
//! strategy used when loading a whole pack into memory.

use std::io::Read;

use flate2::bufread::ZlibDecoder;

use crate::config::Config;
use crate::error::{GitError, Result};
use crate::object::varint::decode_obj_header;
use crate::object::ObjectType;

/// Decompresses one zlib stream starting at `entry[start..]`, trying
/// successively larger chunk sizes (512, 2048, then 8192 bytes at a time)
/// since the compressed length isn't known ahead of time. Returns
/// `(decompressed_bytes, total_consumed_from_entry_start)`.
pub fn progressive_decompress(entry: &[u8], start: usize) -> Result<(Vec<u8>, usize)> {
    for chunk_size in [512usize, 2048, 8192] {
        let mut decoder = ZlibDecoder::new(&entry[start..]);
        let mut content = Vec::new();
        let mut buf = vec![0u8; chunk_size];

        loop {
            let n = decoder
                .read(&mut buf)
                .map_err(|e| GitError::pack_broken(format!("zlib decompress failed: {e}")))?;
            if n == 0 {
                break;
            }
            content.extend_from_slice(&buf[..n]);
        }
        let consumed = decoder.total_in() as usize;
        if consumed > 0 {
            return Ok((content, start + consumed));
        }
    }
    Err(GitError::pack_broken("zlib stream never terminated"))
}

/// One object entry parsed eagerly out of a pack buffer.
#[derive(Debug, Clone)]
pub struct RawEntry {
    pub kind: ObjectType,
    pub offset: u64,
    /// for OFS_DELTA: the resolved absolute pack offset of the base.
    pub ofs_delta_base: Option<u64>,
    /// for REF_DELTA: the 20-byte base sha1.
    pub ref_delta_base: Option<crate::object::ObjectId>,
    pub payload: Vec<u8>,
    pub consumed: usize,
}

/// Reads a single entry's header + decompressed payload at `offset`
/// within `pack_data`.
pub fn read_entry(pack_data: &[u8], offset: u64) -> Result<RawEntry> {
    let entry = &pack_data[offset as usize..];
    let (kind, _size, header_len) = decode_obj_header(entry)?;

    let (payload_start, ofs_delta_base, ref_delta_base) = match kind {
        ObjectType::OfsDelta => {
            let (back, add) = crate::object::varint::decode_ofs_delta_offset(&entry[header_len..])?;
            let base = offset
                .checked_sub(back)
                .ok_or_else(|| GitError::pack_broken("OFS_DELTA base offset underflows pack start"))?;
            (header_len + add, Some(base), None)
        }
        ObjectType::RefDelta => {
            let sha_bytes = entry
                .get(header_len..header_len + 20)
                .ok_or_else(|| GitError::pack_broken("truncated REF_DELTA base sha1"))?;
            let sha = crate::object::ObjectId::from_slice(sha_bytes)?;
            (header_len + 20, None, Some(sha))
        }
        _ => (header_len, None, None),
    };

    let (payload, consumed) = progressive_decompress(entry, payload_start)?;

    Ok(RawEntry {
        kind,
        offset,
        ofs_delta_base,
        ref_delta_base,
        payload,
        consumed,
    })
}

/// The first-pass, whole-pack read: every object entry is parsed into a
/// `RawEntry`, in pack order. Deltas are left unresolved (the object
/// manager resolves them against the merged view of all loaded packs).
pub fn read_pack_eager(pack_data: &[u8]) -> Result<Vec<RawEntry>> {
    if pack_data.len() < 12 || &pack_data[..4] != b"PACK" {
        return Err(GitError::pack_broken(format!(
            "unexpected pack header {:?}",
            pack_data.get(..4)
        )));
    }
    let version = u32::from_be_bytes(pack_data[4..8].try_into().unwrap());
    if version != 2 {
        return Err(GitError::pack_broken(format!(
            "unsupported pack version: {version}"
        )));
    }
    let num_objects = u32::from_be_bytes(pack_data[8..12].try_into().unwrap());

    let mut entries = Vec::with_capacity(num_objects as usize);
    let mut offset = 12u64;
    for _ in 0..num_objects {
        let entry = read_entry(pack_data, offset)?;
        offset += entry.consumed as u64;
        entries.push(entry);
    }
    Ok(entries)
}

/// A lazily-loaded segment: either a contiguous eagerly-decoded run of
/// small entries, or a single large entry whose payload is deferred.
#[derive(Debug)]
pub enum Segment {
    Eager(Vec<RawEntry>),
    Lazy { offset: u64, kind: ObjectType },
}

/// Builds read segments the way a lazy pack load does: consecutive small
/// objects get coalesced into one segment and decoded together; an object
/// whose declared size exceeds `config.lazy_read_threshold_bytes` is read
/// only far enough to learn its header, then deferred. The very first
/// segment always starts at absolute offset 0 so the 12-byte pack header
/// rides along with the first object's read.
pub fn plan_lazy_segments(pack_data: &[u8], config: &Config) -> Result<Vec<Segment>> {
    if pack_data.len() < 12 || &pack_data[..4] != b"PACK" {
        return Err(GitError::pack_broken(format!(
            "unexpected pack header {:?}",
            pack_data.get(..4)
        )));
    }
    let num_objects = u32::from_be_bytes(pack_data[8..12].try_into().unwrap());

    let mut segments = Vec::new();
    let mut pending: Vec<RawEntry> = Vec::new();
    let mut offset = 12u64;

    for _ in 0..num_objects {
        let entry_bytes = &pack_data[offset as usize..];
        let (kind, size, header_len) = decode_obj_header(entry_bytes)?;

        if size > config.lazy_read_threshold_bytes {
            if !pending.is_empty() {
                segments.push(Segment::Eager(std::mem::take(&mut pending)));
            }
            segments.push(Segment::Lazy { offset, kind });
            let _ = header_len;
            let entry = read_entry(pack_data, offset)?;
            offset += entry.consumed as u64;
            continue;
        }

        let entry = read_entry(pack_data, offset)?;
        offset += entry.consumed as u64;
        pending.push(entry);
    }

    if !pending.is_empty() {
        segments.push(Segment::Eager(pending));
    }

    Ok(segments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    fn zlib_compress(data: &[u8]) -> Vec<u8> {
        let mut encoder = flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    fn blob_entry(content: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        let size = content.len();
        let mut first = (3u8 << 4) | (size as u8 & 0x0F);
        let mut remaining = size >> 4;
        if remaining != 0 {
            first |= 0x80;
        }
        out.push(first);
        while remaining != 0 {
            let mut byte = (remaining & 0x7F) as u8;
            remaining >>= 7;
            if remaining != 0 {
                byte |= 0x80;
            }
            out.push(byte);
        }
        out.extend(zlib_compress(content));
        out
    }

    fn build_pack(entries: &[&[u8]]) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(b"PACK");
        body.extend_from_slice(&2u32.to_be_bytes());
        body.extend_from_slice(&(entries.len() as u32).to_be_bytes());
        for content in entries {
            body.extend(blob_entry(content));
        }
        let mut hasher = sha1_smol::Sha1::new();
        hasher.update(&body);
        body.extend_from_slice(&hasher.digest().bytes());
        body
    }

    #[test]
    fn reads_single_object_eagerly() {
        let pack = build_pack(&[b"hello"]);
        let entries = read_pack_eager(&pack).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].payload, b"hello");
        assert_eq!(entries[0].offset, 12);
    }

    #[test]
    fn reads_multiple_objects_in_order() {
        let pack = build_pack(&[b"first", b"second object"]);
        let entries = read_pack_eager(&pack).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].payload, b"first");
        assert_eq!(entries[1].payload, b"second object");
        assert!(entries[1].offset > entries[0].offset);
    }

    #[test]
    fn plans_everything_eager_when_below_threshold() {
        let pack = build_pack(&[b"a", b"b", b"c"]);
        let config = Config::default();
        let segments = plan_lazy_segments(&pack, &config).unwrap();
        assert_eq!(segments.len(), 1);
        assert!(matches!(segments[0], Segment::Eager(_)));
    }

    #[test]
    fn rejects_wrong_version() {
        let mut pack = build_pack(&[b"x"]);
        pack[4..8].copy_from_slice(&1u32.to_be_bytes());
        assert!(read_pack_eager(&pack).is_err());
    }
}
