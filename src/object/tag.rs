//! Annotated tag object parsing: `object`/`type`/`tag`/`tagger`/message.

use crate::error::{GitError, Result};
use crate::object::commit::{decode_utf8, extract_message, split_once, trim_angle_brackets, tz_to_delta};
use crate::object::ObjectId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagObj {
    pub object: ObjectId,
    pub object_type: String,
    pub tag: String,
    pub tagger_name: String,
    pub tagger_email: String,
    /// unix seconds, already shifted by the tagger's recorded timezone.
    pub tagger_time: i64,
    pub message: String,
}

/// The lightweight path: only the `object` line.
pub fn parse_tag_object(data: &[u8]) -> Result<ObjectId> {
    let (row, _) = split_once(data, b'\n')
        .ok_or_else(|| GitError::object_broken("tag object has no newline"))?;
    let (key, obj) = split_once(row, b' ')
        .ok_or_else(|| GitError::object_broken("tag object malformed object line"))?;
    if key != b"object" {
        return Err(GitError::object_broken(format!(
            "object should start with \"object\" not {:?}",
            String::from_utf8_lossy(key)
        )));
    }
    let obj_hex = std::str::from_utf8(obj)
        .map_err(|_| GitError::object_broken("tag object sha1 is not utf-8"))?;
    ObjectId::from_hex(obj_hex)
}

pub fn parse_tag(data: &[u8]) -> Result<TagObj> {
    let (row, remain) = split_once(data, b'\n')
        .ok_or_else(|| GitError::object_broken("tag object has no newline"))?;
    let (key, obj) = split_once(row, b' ')
        .ok_or_else(|| GitError::object_broken("tag object malformed object line"))?;
    if key != b"object" {
        return Err(GitError::object_broken(format!(
            "object should start with \"object\" not {:?}",
            String::from_utf8_lossy(key)
        )));
    }
    let object = ObjectId::from_hex(
        std::str::from_utf8(obj).map_err(|_| GitError::object_broken("tag object sha1 is not utf-8"))?,
    )?;

    let (row, remain) = split_once(remain, b'\n')
        .ok_or_else(|| GitError::object_broken("tag object truncated at type line"))?;
    let (key, typ) = split_once(row, b' ')
        .ok_or_else(|| GitError::object_broken("tag object should have \"type\""))?;
    if key != b"type" {
        return Err(GitError::object_broken(format!(
            "object should have \"type\" not {:?}",
            String::from_utf8_lossy(key)
        )));
    }
    let object_type = decode_utf8(typ, "tag type")?;

    let (row, remain) = split_once(remain, b'\n')
        .ok_or_else(|| GitError::object_broken("tag object truncated at tag line"))?;
    let (key, tag) = split_once(row, b' ')
        .ok_or_else(|| GitError::object_broken("tag object should have \"tag\""))?;
    if key != b"tag" {
        return Err(GitError::object_broken(format!(
            "object should have \"tag\" not {:?}",
            String::from_utf8_lossy(key)
        )));
    }
    let tag = decode_utf8(tag, "tag name")?;

    let (row, remain) = split_once(remain, b'\n')
        .ok_or_else(|| GitError::object_broken("tag object truncated at tagger line"))?;
    if !row.starts_with(b"tagger") {
        return Err(GitError::object_broken("tag object should have \"tagger\""));
    }
    let fields: Vec<&[u8]> = row.split(|&b| b == b' ').collect();
    if fields.len() != 5 {
        return Err(GitError::object_broken(format!(
            "unexpected element count in \"tagger\": {}",
            fields.len()
        )));
    }
    let tagger_name = decode_utf8(fields[1], "tagger name")?;
    let tagger_email = decode_utf8(trim_angle_brackets(fields[2]), "tagger email")?;
    let tagger_time_raw: i64 = std::str::from_utf8(fields[3])
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| GitError::object_broken("tagger time is not an integer"))?;
    let tz = tz_to_delta(
        std::str::from_utf8(fields[4])
            .map_err(|_| GitError::object_broken("tagger timezone is not utf-8"))?,
    )?;
    let tagger_time = tagger_time_raw + tz;

    let message = extract_message(remain)?;

    Ok(TagObj {
        object,
        object_type,
        tag,
        tagger_name,
        tagger_email,
        tagger_time,
        message,
    })
}
