//! Structured errors for the object store and wire-protocol engine.
//!
//! Every failure mode named in the spec's closed set gets its own variant;
//! nothing escapes as an opaque string.

use crate::object::ObjectId;

#[derive(thiserror::Error, Debug)]
pub enum GitError {
    /// A bytestream does not conform to the documented shape of an object.
    #[error("object broken: {reason}")]
    ObjectBroken { reason: String },

    /// Structural inconsistency at pack/idx scope.
    #[error("pack broken: {0}")]
    PackBroken(String),

    /// Requested sha is not present in any pack or loose object.
    #[error("object not found: {sha}")]
    NotFound { sha: ObjectId },

    /// Network or protocol-level failure while talking to a remote.
    #[error("transport error talking to {host}{path}: {message}")]
    Transport {
        host: String,
        path: String,
        message: String,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, GitError>;

impl GitError {
    pub fn object_broken(reason: impl Into<String>) -> Self {
        GitError::ObjectBroken {
            reason: reason.into(),
        }
    }

    pub fn pack_broken(reason: impl Into<String>) -> Self {
        GitError::PackBroken(reason.into())
    }

    pub fn transport(host: impl Into<String>, path: impl Into<String>, message: impl Into<String>) -> Self {
        GitError::Transport {
            host: host.into(),
            path: path.into(),
            message: message.into(),
        }
    }
}
