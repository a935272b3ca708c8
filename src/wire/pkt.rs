//! pkt-line framing: a 4 lowercase-hex-char length prefix (counting
//! itself), `0000` for flush, `0001` for the v2 delimiter.

use crate::error::{GitError, Result};

pub const FLUSH_PKT: &[u8] = b"0000";
pub const DELIM_PKT: &[u8] = b"0001";
const MAX_PAYLOAD: usize = 65516;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PktLine {
    Flush,
    Delim,
    Data(Vec<u8>),
}

/// Encodes `payload` as a single data pkt-line.
pub fn encode_pkt_line(payload: &[u8]) -> Result<Vec<u8>> {
    if payload.len() > MAX_PAYLOAD {
        return Err(GitError::pack_broken(format!(
            "pkt-line payload too large: {} bytes",
            payload.len()
        )));
    }
    let total_len = payload.len() + 4;
    let mut out = format!("{total_len:04x}").into_bytes();
    out.extend_from_slice(payload);
    Ok(out)
}

pub fn encode_flush() -> Vec<u8> {
    FLUSH_PKT.to_vec()
}

pub fn encode_delim() -> Vec<u8> {
    DELIM_PKT.to_vec()
}

/// Parses one pkt-line out of `data` starting at byte 0. Returns the
/// parsed line and how many bytes it consumed.
pub fn decode_pkt_line(data: &[u8]) -> Result<(PktLine, usize)> {
    if data.len() < 4 {
        return Err(GitError::transport(
            "",
            "",
            "truncated pkt-line length header",
        ));
    }
    let len_hex = std::str::from_utf8(&data[..4])
        .map_err(|_| GitError::transport("", "", "pkt-line length is not ascii"))?;
    let len = usize::from_str_radix(len_hex, 16)
        .map_err(|_| GitError::transport("", "", format!("invalid pkt-line length: {len_hex}")))?;

    match len {
        0 => Ok((PktLine::Flush, 4)),
        1 => Ok((PktLine::Delim, 4)),
        n if n < 4 => Err(GitError::transport(
            "",
            "",
            format!("pkt-line length {n} smaller than header"),
        )),
        n => {
            if data.len() < n {
                return Err(GitError::transport("", "", "truncated pkt-line payload"));
            }
            Ok((PktLine::Data(data[4..n].to_vec()), n))
        }
    }
}

/// Splits a buffer into every complete pkt-line it contains, stopping
/// (without error) at the first incomplete trailing line.
pub fn decode_all_pkt_lines(mut data: &[u8]) -> Result<Vec<PktLine>> {
    let mut lines = Vec::new();
    while !data.is_empty() {
        if data.len() < 4 {
            break;
        }
        match decode_pkt_line(data) {
            Ok((line, consumed)) => {
                lines.push(line);
                data = &data[consumed..];
            }
            Err(_) => break,
        }
    }
    Ok(lines)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_and_decodes_roundtrip() {
        let encoded = encode_pkt_line(b"want deadbeef\n").unwrap();
        let (line, consumed) = decode_pkt_line(&encoded).unwrap();
        assert_eq!(consumed, encoded.len());
        assert_eq!(line, PktLine::Data(b"want deadbeef\n".to_vec()));
    }

    #[test]
    fn decodes_flush_and_delim() {
        assert_eq!(decode_pkt_line(b"0000").unwrap().0, PktLine::Flush);
        assert_eq!(decode_pkt_line(b"0001").unwrap().0, PktLine::Delim);
    }

    #[test]
    fn decode_all_stops_at_incomplete_trailing_line() {
        let mut buf = encode_pkt_line(b"hello").unwrap();
        buf.extend_from_slice(b"0020short");
        let lines = decode_all_pkt_lines(&buf).unwrap();
        assert_eq!(lines.len(), 1);
    }

    #[test]
    fn rejects_oversized_payload() {
        let payload = vec![0u8; MAX_PAYLOAD + 1];
        assert!(encode_pkt_line(&payload).is_err());
    }
}
