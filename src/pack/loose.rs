//! Loose object reading: `.git/objects/<2-hex>/<38-hex>` files, each a
//! single zlib stream of `<type> <size>\0<payload>`.

use std::io::Read;
use std::path::{Path, PathBuf};

use flate2::bufread::ZlibDecoder;

use crate::error::{GitError, Result};
use crate::object::{ObjectId, ObjectType};

/// A decoded loose object: type tag plus the raw payload bytes (never a
/// delta — loose objects are always fully materialized).
#[derive(Debug, Clone)]
pub struct LooseObject {
    pub kind: ObjectType,
    pub payload: Vec<u8>,
}

pub fn loose_object_path(objects_dir: &Path, sha: &ObjectId) -> PathBuf {
    let hex = sha.to_hex();
    objects_dir.join(&hex[0..2]).join(&hex[2..])
}

fn header_to_kind(header: &[u8]) -> Result<ObjectType> {
    match header {
        b"blob" => Ok(ObjectType::Blob),
        b"tree" => Ok(ObjectType::Tree),
        b"commit" => Ok(ObjectType::Commit),
        b"tag" => Ok(ObjectType::Tag),
        other => Err(GitError::object_broken(format!(
            "invalid loose object header: {:?}",
            String::from_utf8_lossy(other)
        ))),
    }
}

/// Fully decompresses and parses a loose object's raw on-disk bytes.
pub fn parse_loose_data(data: &[u8]) -> Result<LooseObject> {
    let mut decoder = ZlibDecoder::new(data);
    let mut decompressed = Vec::new();
    decoder
        .read_to_end(&mut decompressed)
        .map_err(|e| GitError::object_broken(format!("zlib decompress failed: {e}")))?;

    let null_pos = decompressed
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| GitError::object_broken("loose object missing header terminator"))?;
    let (header, rest) = decompressed.split_at(null_pos);
    let payload = rest[1..].to_vec();

    let space_pos = header
        .iter()
        .position(|&b| b == b' ')
        .ok_or_else(|| GitError::object_broken("loose object header missing size"))?;
    let (type_bytes, size_bytes) = (&header[..space_pos], &header[space_pos + 1..]);
    let kind = header_to_kind(type_bytes)?;

    let size: usize = std::str::from_utf8(size_bytes)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| GitError::object_broken(format!(
            "invalid loose object size: {:?}",
            String::from_utf8_lossy(size_bytes)
        )))?;
    if payload.len() != size {
        return Err(GitError::object_broken(format!(
            "loose object size mismatch: declared {size}, got {}",
            payload.len()
        )));
    }

    Ok(LooseObject { kind, payload })
}

/// Reads just enough of a loose object's compressed bytes to learn its
/// type tag, without decompressing (and buffering) the whole file —
/// useful when scanning many loose objects to build the manager's
/// sha-to-location index.
pub fn read_loose_objtype(data: &[u8]) -> Result<ObjectType> {
    let mut decoder = ZlibDecoder::new(data);
    let mut content = Vec::new();
    let mut buf = [0u8; 128];
    loop {
        let n = decoder
            .read(&mut buf)
            .map_err(|e| GitError::object_broken(format!("zlib decompress failed: {e}")))?;
        if n == 0 {
            break;
        }
        content.extend_from_slice(&buf[..n]);
        if content.len() >= 6 {
            break;
        }
    }

    if content.starts_with(b"blob") {
        Ok(ObjectType::Blob)
    } else if content.starts_with(b"tree") {
        Ok(ObjectType::Tree)
    } else if content.starts_with(b"commit") {
        Ok(ObjectType::Commit)
    } else if content.starts_with(b"tag") {
        Ok(ObjectType::Tag)
    } else {
        Err(GitError::object_broken(format!(
            "unrecognized loose object header: {:?}",
            String::from_utf8_lossy(&content)
        )))
    }
}

/// Walks the fanout directory structure (`objects/xx/*`) returning every
/// loose object's sha1 and file path.
pub fn scan_loose_objects(objects_dir: &Path) -> Result<Vec<(ObjectId, PathBuf)>> {
    let mut found = Vec::new();
    let entries = match std::fs::read_dir(objects_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(found),
        Err(e) => return Err(GitError::Io(e)),
    };

    for entry in entries {
        let entry = entry?;
        let fanout_name = entry.file_name();
        let fanout_name = fanout_name.to_string_lossy();
        if fanout_name.len() != 2 || !fanout_name.bytes().all(|b| b.is_ascii_hexdigit()) {
            continue;
        }
        if !entry.file_type()?.is_dir() {
            continue;
        }
        for inner in std::fs::read_dir(entry.path())? {
            let inner = inner?;
            let rest = inner.file_name();
            let rest = rest.to_string_lossy().to_string();
            if rest.len() != 38 || !rest.bytes().all(|b| b.is_ascii_hexdigit()) {
                continue;
            }
            let hex = format!("{fanout_name}{rest}");
            if let Ok(sha) = ObjectId::from_hex(&hex) {
                found.push((sha, inner.path()));
            }
        }
    }

    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn loose_bytes(kind: &str, content: &[u8]) -> Vec<u8> {
        let mut raw = format!("{kind} {}\0", content.len()).into_bytes();
        raw.extend_from_slice(content);
        let mut encoder = flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(&raw).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn parses_loose_blob() {
        let data = loose_bytes("blob", b"hello");
        let obj = parse_loose_data(&data).unwrap();
        assert_eq!(obj.kind, ObjectType::Blob);
        assert_eq!(obj.payload, b"hello");
    }

    #[test]
    fn rejects_size_mismatch() {
        let mut raw = b"blob 100\0".to_vec();
        raw.extend_from_slice(b"short");
        let mut encoder = flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(&raw).unwrap();
        let data = encoder.finish().unwrap();
        assert!(parse_loose_data(&data).is_err());
    }

    #[test]
    fn reads_type_without_full_decompress() {
        let data = loose_bytes("commit", b"tree abc\n\nmessage\n");
        let kind = read_loose_objtype(&data).unwrap();
        assert_eq!(kind, ObjectType::Commit);
    }

    #[test]
    fn loose_object_path_uses_fanout() {
        let sha = ObjectId::from_hex("e69de29bb2d1d6434b8b29ae775ad8c2e48c5391").unwrap();
        let path = loose_object_path(Path::new("/repo/.git/objects"), &sha);
        assert_eq!(
            path,
            Path::new("/repo/.git/objects/e6/9de29bb2d1d6434b8b29ae775ad8c2e48c5391")
        );
    }
}
