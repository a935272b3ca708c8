//! Pack stream demultiplexing: once `side-band-64k` is negotiated, every
//! pkt-line in the pack-transfer phase is prefixed with a band byte:
//! `1` pack data, `2` progress text, `3` a fatal server-side error.
//!
//! The teacher's reference implementation treated band 3 like band 2
//! (printed as progress); that's wrong — the server is telling us the
//! fetch failed, and we abort instead of silently assembling a truncated
//! pack.

use crate::error::{GitError, Result};
use crate::wire::pkt::{decode_pkt_line, PktLine};

#[derive(Debug, Default)]
pub struct Demuxer {
    pub pack_data: Vec<u8>,
}

impl Demuxer {
    pub fn new() -> Self {
        Demuxer::default()
    }

    /// Feeds one complete pkt-line payload (already stripped of the
    /// 4-byte length header) through the sideband split.
    pub fn feed_payload(&mut self, payload: &[u8]) -> Result<()> {
        let Some((&band, rest)) = payload.split_first() else {
            return Ok(());
        };
        match band {
            1 => self.pack_data.extend_from_slice(rest),
            2 => {
                tracing::debug!(
                    target: "sideband",
                    message = %String::from_utf8_lossy(rest),
                    "remote progress"
                );
            }
            3 => {
                return Err(GitError::transport(
                    "",
                    "",
                    format!(
                        "remote reported a fatal error: {}",
                        String::from_utf8_lossy(rest)
                    ),
                ));
            }
            other => {
                return Err(GitError::pack_broken(format!(
                    "unknown sideband channel: {other}"
                )));
            }
        }
        Ok(())
    }

    /// Demultiplexes an entire buffer of pkt-lines (stopping at the
    /// closing flush), accumulating band-1 bytes into `pack_data`.
    pub fn feed_stream(&mut self, mut data: &[u8]) -> Result<()> {
        while !data.is_empty() {
            let (line, consumed) = decode_pkt_line(data)?;
            match line {
                PktLine::Flush => break,
                PktLine::Delim => {}
                PktLine::Data(payload) => self.feed_payload(&payload)?,
            }
            data = &data[consumed..];
        }
        Ok(())
    }
}
