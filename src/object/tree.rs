//! Tree object parsing: a flat run of `{mode} {name}\0{sha1}` entries.

use crate::error::{GitError, Result};
use crate::object::ObjectId;

/// The five filemodes git actually writes into a tree entry; anything else
/// is a broken object, not a permissive new mode to accept.
const VALID_MODES: &[&[u8]] = &[b"100644", b"100755", b"40000", b"120000", b"160000"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    pub mode: Vec<u8>,
    pub sha1: ObjectId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeObj {
    pub entries: Vec<TreeEntry>,
}

pub fn parse_tree(data: &[u8]) -> Result<TreeObj> {
    let mut entries = Vec::new();
    let mut remain = data;

    loop {
        let null_pos = remain
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| GitError::object_broken("truncated tree entry header"))?;
        let head = &remain[..null_pos];
        remain = &remain[null_pos + 1..];

        let space_pos = head
            .iter()
            .position(|&b| b == b' ')
            .ok_or_else(|| GitError::object_broken("tree entry missing mode/name separator"))?;
        let mode = &head[..space_pos];
        let name = &head[space_pos + 1..];

        if !VALID_MODES.contains(&mode) {
            return Err(GitError::object_broken(format!(
                "invalid filemode: {:?}",
                String::from_utf8_lossy(mode)
            )));
        }
        let name = std::str::from_utf8(name)
            .map_err(|_| GitError::object_broken("failed to decode tree entry filename"))?
            .to_string();

        if remain.len() < 20 {
            return Err(GitError::object_broken(format!(
                "invalid entry sha1: truncated after {} bytes",
                remain.len()
            )));
        }
        let sha1 = ObjectId::from_slice(&remain[..20])?;
        remain = &remain[20..];

        entries.push(TreeEntry {
            mode: mode.to_vec(),
            sha1,
            name,
        });

        if remain.is_empty() {
            break;
        }
    }

    Ok(TreeObj { entries })
}
