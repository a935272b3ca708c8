//! Decoded representations of the four git object kinds, plus the shared
//! `ObjectId` newtype used everywhere a sha1 crosses a module boundary.

pub mod commit;
pub mod delta;
pub mod tag;
pub mod tree;
pub mod varint;

use std::fmt;

use crate::error::{GitError, Result};

pub use commit::CommitObj;
pub use delta::{DeltaInstr, DeltaObj};
pub use tag::TagObj;
pub use tree::{TreeEntry, TreeObj};

/// A 20-byte sha1, the only form object identities take throughout this crate.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId([u8; 20]);

impl ObjectId {
    pub fn from_bytes(bytes: [u8; 20]) -> Self {
        ObjectId(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != 20 {
            return Err(GitError::object_broken(format!(
                "sha1 must be 20 bytes, got {}",
                bytes.len()
            )));
        }
        let mut buf = [0u8; 20];
        buf.copy_from_slice(bytes);
        Ok(ObjectId(buf))
    }

    pub fn from_hex(hex_str: &str) -> Result<Self> {
        if hex_str.len() != 40 {
            return Err(GitError::object_broken(format!(
                "sha1 hex must be 40 chars, got {}: {hex_str}",
                hex_str.len()
            )));
        }
        let decoded = hex::decode(hex_str)
            .map_err(|e| GitError::object_broken(format!("invalid sha1 hex {hex_str}: {e}")))?;
        Self::from_slice(&decoded)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self.to_hex())
    }
}

/// The seven on-the-wire/on-disk type tags. 0 and 5 are reserved, anything
/// above 7 is unassigned; both are decode errors, never silently accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ObjectType {
    Commit = 1,
    Tree = 2,
    Blob = 3,
    Tag = 4,
    OfsDelta = 6,
    RefDelta = 7,
}

impl TryFrom<u8> for ObjectType {
    type Error = GitError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            1 => Ok(ObjectType::Commit),
            2 => Ok(ObjectType::Tree),
            3 => Ok(ObjectType::Blob),
            4 => Ok(ObjectType::Tag),
            6 => Ok(ObjectType::OfsDelta),
            7 => Ok(ObjectType::RefDelta),
            other => Err(GitError::object_broken(format!(
                "invalid object type tag: {other}"
            ))),
        }
    }
}

impl ObjectType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectType::Commit => "commit",
            ObjectType::Tree => "tree",
            ObjectType::Blob => "blob",
            ObjectType::Tag => "tag",
            ObjectType::OfsDelta => "ofs-delta",
            ObjectType::RefDelta => "ref-delta",
        }
    }
}

/// A fully resolved, in-memory object: header type plus the payload it
/// decodes to once a delta chain (if any) has been walked and applied.
#[derive(Debug, Clone)]
pub enum Decoded {
    Commit(CommitObj),
    Tree(TreeObj),
    Blob(Vec<u8>),
    Tag(TagObj),
}

impl Decoded {
    pub fn kind(&self) -> ObjectType {
        match self {
            Decoded::Commit(_) => ObjectType::Commit,
            Decoded::Tree(_) => ObjectType::Tree,
            Decoded::Blob(_) => ObjectType::Blob,
            Decoded::Tag(_) => ObjectType::Tag,
        }
    }
}

/// sha1("<type> <len>\0<data>") — the canonical object identity hash,
/// shared by loose and packed objects alike.
pub fn hash_object(kind: ObjectType, data: &[u8]) -> ObjectId {
    let header = format!("{} {}\0", kind.as_str(), data.len());
    let mut hasher = sha1_smol::Sha1::new();
    hasher.update(header.as_bytes());
    hasher.update(data);
    ObjectId(hasher.digest().bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_id_hex_roundtrip() {
        let hex_str = "50f49a6350aa584d96dc4efe162cec8ce09a212b";
        let oid = ObjectId::from_hex(hex_str).unwrap();
        assert_eq!(oid.to_hex(), hex_str);
    }

    #[test]
    fn object_id_rejects_bad_length() {
        assert!(ObjectId::from_hex("abcd").is_err());
    }

    #[test]
    fn object_type_rejects_reserved_values() {
        assert!(ObjectType::try_from(0).is_err());
        assert!(ObjectType::try_from(5).is_err());
        assert!(ObjectType::try_from(8).is_err());
        assert_eq!(ObjectType::try_from(1).unwrap(), ObjectType::Commit);
    }

    #[test]
    fn hash_object_matches_known_blob_sha() {
        // git hash-object for an empty blob is well known.
        let oid = hash_object(ObjectType::Blob, b"");
        assert_eq!(oid.to_hex(), "e69de29bb2d1d6434b8b29ae775ad8c2e48c5391");
    }
}
