//! Commit object parsing: `tree`/`parent`/`author`/`committer`/message,
//! with author/committer times normalized to UTC seconds.

use crate::error::{GitError, Result};
use crate::object::ObjectId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Parents {
    None,
    One(ObjectId),
    Many(Vec<ObjectId>),
}

impl Parents {
    pub fn as_slice(&self) -> Vec<ObjectId> {
        match self {
            Parents::None => Vec::new(),
            Parents::One(id) => vec![*id],
            Parents::Many(ids) => ids.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitObj {
    pub tree: ObjectId,
    pub parent: Parents,
    pub author_name: String,
    pub author_email: String,
    /// unix seconds, already shifted by the author's recorded timezone.
    pub author_time: i64,
    pub committer_name: String,
    pub committer_email: String,
    /// unix seconds, already shifted by the committer's recorded timezone.
    pub committer_time: i64,
    pub message: String,
}

/// Parses `+HHMM`/`-HHMM` (bare `HHMM` treated as `+HHMM`) into signed
/// total seconds east of UTC.
pub fn tz_to_delta(tz: &str) -> Result<i64> {
    let (sign, digits) = match tz.as_bytes().first() {
        Some(b'+') => (1i64, &tz[1..]),
        Some(b'-') => (-1i64, &tz[1..]),
        _ => (1i64, tz),
    };
    if digits.len() != 4 {
        return Err(GitError::object_broken(format!("malformed timezone: {tz}")));
    }
    let hour: i64 = digits[0..2]
        .parse()
        .map_err(|_| GitError::object_broken(format!("malformed timezone: {tz}")))?;
    let minute: i64 = digits[2..4]
        .parse()
        .map_err(|_| GitError::object_broken(format!("malformed timezone: {tz}")))?;
    Ok(sign * (hour * 3600 + minute * 60))
}

/// The lightweight path: only the `tree` line, for callers that just need
/// to chase a commit to its tree without caring about the rest.
pub fn parse_commit_tree(data: &[u8]) -> Result<ObjectId> {
    let (row, _) = split_once(data, b'\n')
        .ok_or_else(|| GitError::object_broken("commit object has no newline"))?;
    let (key, tree) = split_once(row, b' ')
        .ok_or_else(|| GitError::object_broken("commit object malformed tree line"))?;
    if key != b"tree" {
        return Err(GitError::object_broken(format!(
            "commit object should start with \"tree\" not {:?}",
            String::from_utf8_lossy(key)
        )));
    }
    let tree_hex = std::str::from_utf8(tree)
        .map_err(|_| GitError::object_broken("commit tree sha1 is not utf-8"))?;
    ObjectId::from_hex(tree_hex)
}

pub fn parse_commit(data: &[u8]) -> Result<CommitObj> {
    let (row, mut remain) = split_once(data, b'\n')
        .ok_or_else(|| GitError::object_broken("commit object has no newline"))?;
    let (key, tree) = split_once(row, b' ')
        .ok_or_else(|| GitError::object_broken("commit object malformed tree line"))?;
    if key != b"tree" {
        return Err(GitError::object_broken(format!(
            "commit object should start with \"tree\" not {:?}",
            String::from_utf8_lossy(key)
        )));
    }
    let tree_hex = std::str::from_utf8(tree)
        .map_err(|_| GitError::object_broken("commit tree sha1 is not utf-8"))?;
    let tree = ObjectId::from_hex(tree_hex)?;

    let mut parents: Vec<ObjectId> = Vec::new();
    loop {
        if remain.starts_with(b"author") {
            break;
        }
        let (row, rest) = split_once(remain, b'\n')
            .ok_or_else(|| GitError::object_broken("commit object has no \"author\""))?;
        let (key, value) = split_once(row, b' ').unwrap_or((row, b""));
        if key == b"parent" {
            let value = std::str::from_utf8(value)
                .map_err(|_| GitError::object_broken("commit parent is not utf-8"))?;
            parents.push(ObjectId::from_hex(value)?);
        }
        remain = rest;
        if remain.is_empty() {
            return Err(GitError::object_broken("commit object has no \"author\""));
        }
    }

    let (row, rest) = split_once(remain, b'\n')
        .ok_or_else(|| GitError::object_broken("commit object truncated at author line"))?;
    remain = rest;
    let fields: Vec<&[u8]> = row.split(|&b| b == b' ').collect();
    if fields.len() != 5 {
        return Err(GitError::object_broken(format!(
            "unexpected element count in \"author\" line: {}",
            fields.len()
        )));
    }
    let author_name = decode_utf8(fields[1], "author name")?;
    let author_email = decode_utf8(trim_angle_brackets(fields[2]), "author email")?;
    let author_time_raw: i64 = std::str::from_utf8(fields[3])
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| GitError::object_broken("author time is not an integer"))?;
    let author_tz = tz_to_delta(
        std::str::from_utf8(fields[4])
            .map_err(|_| GitError::object_broken("author timezone is not utf-8"))?,
    )?;
    let author_time = author_time_raw + author_tz;

    let (row, rest) = split_once(remain, b'\n')
        .ok_or_else(|| GitError::object_broken("commit object truncated at committer line"))?;
    if !row.starts_with(b"committer") {
        return Err(GitError::object_broken("commit object has no \"committer\""));
    }
    let fields: Vec<&[u8]> = row.split(|&b| b == b' ').collect();
    if fields.len() != 5 {
        return Err(GitError::object_broken(format!(
            "unexpected element count in \"committer\" line: {}",
            fields.len()
        )));
    }
    let committer_name = decode_utf8(fields[1], "committer name")?;
    let committer_email = decode_utf8(trim_angle_brackets(fields[2]), "committer email")?;
    let committer_time_raw: i64 = std::str::from_utf8(fields[3])
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| GitError::object_broken("committer time is not an integer"))?;
    let committer_tz = tz_to_delta(
        std::str::from_utf8(fields[4])
            .map_err(|_| GitError::object_broken("committer timezone is not utf-8"))?,
    )?;
    let committer_time = committer_time_raw + committer_tz;

    let message = extract_message(rest)?;

    let parent = match parents.len() {
        0 => Parents::None,
        1 => Parents::One(parents[0]),
        _ => Parents::Many(parents),
    };

    Ok(CommitObj {
        tree,
        parent,
        author_name,
        author_email,
        author_time,
        committer_name,
        committer_email,
        committer_time,
        message,
    })
}

pub(crate) fn extract_message(data: &[u8]) -> Result<String> {
    let message = match find_subslice(data, b"\n\n") {
        Some(pos) => &data[pos + 2..],
        None => b"",
    };
    std::str::from_utf8(message)
        .map(|s| s.trim().to_string())
        .map_err(|_| GitError::object_broken("commit message is not utf-8"))
}

pub(crate) fn trim_angle_brackets(value: &[u8]) -> &[u8] {
    let mut v = value;
    if v.first() == Some(&b'<') {
        v = &v[1..];
    }
    if v.last() == Some(&b'>') {
        v = &v[..v.len() - 1];
    }
    v
}

pub(crate) fn decode_utf8(value: &[u8], field: &str) -> Result<String> {
    std::str::from_utf8(value)
        .map(|s| s.to_string())
        .map_err(|_| GitError::object_broken(format!("failed to decode {field}")))
}

pub(crate) fn split_once(data: &[u8], sep: u8) -> Option<(&[u8], &[u8])> {
    let pos = data.iter().position(|&b| b == sep)?;
    Some((&data[..pos], &data[pos + 1..]))
}

pub(crate) fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_commit() -> Vec<u8> {
        let tree = "4b825dc642cb6eb9a060e54bf8d69288fbee4904";
        let parent = "e69de29bb2d1d6434b8b29ae775ad8c2e48c5391";
        format!(
            "tree {tree}\nparent {parent}\nauthor A <a@example.com> 1604563164 +0800\ncommitter A <a@example.com> 1604563164 +0800\n\nmessage body\n"
        )
        .into_bytes()
    }

    #[test]
    fn parses_full_commit() {
        let commit = parse_commit(&sample_commit()).unwrap();
        assert_eq!(commit.message, "message body");
        assert_eq!(commit.author_time, 1604563164 + 8 * 3600);
        assert!(matches!(commit.parent, Parents::One(_)));
    }

    #[test]
    fn parses_commit_tree_only() {
        let tree = parse_commit_tree(&sample_commit()).unwrap();
        assert_eq!(
            tree.to_hex(),
            "4b825dc642cb6eb9a060e54bf8d69288fbee4904"
        );
    }

    #[test]
    fn rejects_missing_author() {
        let data = b"tree 4b825dc642cb6eb9a060e54bf8d69288fbee4904\n";
        assert!(parse_commit(data).is_err());
    }

    #[test]
    fn tz_to_delta_handles_negative_offset() {
        assert_eq!(tz_to_delta("-0430").unwrap(), -(4 * 3600 + 30 * 60));
    }

    #[test]
    fn tz_to_delta_handles_bare_digits() {
        assert_eq!(tz_to_delta("0100").unwrap(), 3600);
    }
}
