//! Rebuilds a pack index v2 (`.idx`) from a received `.pack` file: every
//! object's header is parsed, delta chains are resolved against objects
//! already seen earlier in the same pack (or, for REF_DELTA, anywhere the
//! caller's object manager can resolve it), CRC32 is taken over the raw
//! entry bytes and sha1 over the reconstructed content.

use std::collections::HashMap;

use crc32fast::Hasher as Crc32Hasher;

use crate::error::{GitError, Result};
use crate::object::delta::{apply_delta, parse_delta_object};
use crate::object::varint::{decode_obj_header, decode_ofs_delta_offset};
use crate::object::{hash_object, ObjectId, ObjectType};
use crate::pack::file::progressive_decompress;

const LARGE_OFFSET_MARKER: u32 = 0x8000_0000;

struct ObjectInfo {
    sha: ObjectId,
    offset: u64,
    crc: u32,
}

/// Callback used to resolve a REF_DELTA base that isn't in the pack being
/// indexed (a "thin pack" referencing an object the receiver already has).
pub trait BaseResolver {
    fn resolve(&self, sha: &ObjectId) -> Result<Vec<u8>>;
}

pub struct NoExternalBases;

impl BaseResolver for NoExternalBases {
    fn resolve(&self, sha: &ObjectId) -> Result<Vec<u8>> {
        Err(GitError::NotFound { sha: *sha })
    }
}

fn validate_pack_checksum(data: &[u8]) -> Result<()> {
    if data.len() < 20 {
        return Err(GitError::pack_broken("pack too short to contain a checksum"));
    }
    let (content, checksum) = data.split_at(data.len() - 20);
    let mut hasher = sha1_smol::Sha1::new();
    hasher.update(content);
    let computed = hasher.digest().bytes();
    if computed != checksum {
        return Err(GitError::pack_broken(format!(
            "pack checksum mismatch: computed={}, stored={}",
            hex::encode(computed),
            hex::encode(checksum)
        )));
    }
    Ok(())
}

/// One pass over the pack, reconstructing every object's final bytes and
/// recording its sha1/offset/crc. Entries whose base is already in
/// `dict_offset_to_object` (OFS_DELTA) or resolvable via `bases`
/// (REF_DELTA) are applied immediately; nothing is deferred, matching the
/// non-recursive walk the object manager uses for reads.
fn parse_pack_info(data: &[u8], bases: &dyn BaseResolver) -> Result<Vec<ObjectInfo>> {
    if data.len() < 12 || &data[..8] != b"PACK\x00\x00\x00\x02" {
        return Err(GitError::pack_broken(format!(
            "unexpected pack header {:?}",
            data.get(..8)
        )));
    }
    let num_objects = u32::from_be_bytes(data[8..12].try_into().unwrap());
    validate_pack_checksum(data)?;

    let mut dict_offset_to_object: HashMap<u64, (ObjectType, Vec<u8>)> = HashMap::new();
    let mut infos = Vec::with_capacity(num_objects as usize);
    let mut index: u64 = 12;

    for _ in 0..num_objects {
        let entry = &data[index as usize..];
        let (header_kind, _decl_size, header_len) = decode_obj_header(entry)?;

        let (final_kind, final_bytes, consumed) = match header_kind {
            ObjectType::Commit | ObjectType::Tree | ObjectType::Blob | ObjectType::Tag => {
                let (content, consumed) = progressive_decompress(entry, header_len)?;
                (header_kind, content, consumed)
            }
            ObjectType::RefDelta => {
                let ref_bytes = entry
                    .get(header_len..header_len + 20)
                    .ok_or_else(|| GitError::pack_broken("truncated REF_DELTA base sha1"))?;
                let base_sha = ObjectId::from_slice(ref_bytes)?;
                let delta_start = header_len + 20;
                let (delta_raw, consumed) = progressive_decompress(entry, delta_start)?;
                let delta = parse_delta_object(&delta_raw)?;
                let base_bytes = bases.resolve(&base_sha)?;
                let result = apply_delta(&base_bytes, &delta)?;
                (ObjectType::Blob, result, consumed)
            }
            ObjectType::OfsDelta => {
                let (back_offset, add) = decode_ofs_delta_offset(&entry[header_len..])?;
                let delta_start = header_len + add;
                let base_pack_offset = index
                    .checked_sub(back_offset)
                    .ok_or_else(|| GitError::pack_broken("OFS_DELTA offset underflows pack start"))?;
                let (delta_raw, consumed) = progressive_decompress(entry, delta_start)?;
                let delta = parse_delta_object(&delta_raw)?;
                let (base_kind, base_bytes) = dict_offset_to_object
                    .get(&base_pack_offset)
                    .ok_or_else(|| {
                        GitError::pack_broken(format!(
                            "no pack object at offset {base_pack_offset} for OFS_DELTA at {index}"
                        ))
                    })?;
                let result = apply_delta(base_bytes, &delta)?;
                (*base_kind, result, consumed)
            }
        };

        let crc = {
            let mut hasher = Crc32Hasher::new();
            hasher.update(&entry[..consumed]);
            hasher.finalize()
        };
        let sha = hash_object(final_kind, &final_bytes);

        dict_offset_to_object.insert(index, (final_kind, final_bytes));
        infos.push(ObjectInfo {
            sha,
            offset: index,
            crc,
        });

        index += consumed as u64;
    }

    if data.len() as u64 - index != 20 {
        tracing::warn!(
            extra = data.len() as u64 - index - 20,
            "pack file has redundant trailing data"
        );
    }

    infos.sort_by(|a, b| a.sha.as_bytes().cmp(b.sha.as_bytes()));
    Ok(infos)
}

fn build_idx_bytes(infos: &[ObjectInfo], pack_data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(b"\xfftOc\x00\x00\x00\x02");

    let mut fanout = [0u32; 256];
    for info in infos {
        fanout[info.sha.as_bytes()[0] as usize] += 1;
    }
    let mut cumulative = 0u32;
    for count in fanout.iter_mut() {
        cumulative += *count;
        *count = cumulative;
    }
    for count in fanout {
        out.extend_from_slice(&count.to_be_bytes());
    }

    for info in infos {
        out.extend_from_slice(info.sha.as_bytes());
    }

    for info in infos {
        out.extend_from_slice(&info.crc.to_be_bytes());
    }

    let mut large_table = Vec::new();
    for info in infos {
        if info.offset >= LARGE_OFFSET_MARKER as u64 {
            let idx = large_table.len() as u32;
            large_table.push(info.offset);
            out.extend_from_slice(&(LARGE_OFFSET_MARKER | idx).to_be_bytes());
        } else {
            out.extend_from_slice(&(info.offset as u32).to_be_bytes());
        }
    }
    for offset in &large_table {
        out.extend_from_slice(&offset.to_be_bytes());
    }

    out.extend_from_slice(&pack_data[pack_data.len() - 20..]);
    out
}

/// Rebuilds a `.idx` file's bytes (sha table + crc table + offset table +
/// trailer) from a received pack, given a resolver for bases the pack
/// itself doesn't contain (thin-pack REF_DELTA).
pub fn pack_to_idx_with_bases(pack_data: &[u8], bases: &dyn BaseResolver) -> Result<Vec<u8>> {
    let infos = parse_pack_info(pack_data, bases)?;
    let idx_body = build_idx_bytes(&infos, pack_data);
    let mut hasher = sha1_smol::Sha1::new();
    hasher.update(&idx_body);
    let checksum = hasher.digest().bytes();
    let mut out = idx_body;
    out.extend_from_slice(&checksum);
    Ok(out)
}

/// Convenience entry point for self-contained packs (no thin-pack bases).
pub fn pack_to_idx(pack_data: &[u8]) -> Result<Vec<u8>> {
    pack_to_idx_with_bases(pack_data, &NoExternalBases)
}
