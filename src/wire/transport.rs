//! The git:// smart-protocol client: ref discovery plus pack fetch, over
//! a raw unauthenticated TCP connection to `git-daemon` (default port
//! 9418). Supports both the v1 and v2 dialects.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::config::Config;
use crate::error::{GitError, Result};
use crate::object::ObjectId;
use crate::wire::payload::FetchPayload;
use crate::wire::pkt::{decode_pkt_line, encode_delim, encode_flush, encode_pkt_line, PktLine};
use crate::wire::sideband::Demuxer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolVersion {
    V1,
    V2,
}

#[derive(Debug, Clone)]
pub struct ParsedGitUrl {
    pub host: String,
    pub port: u16,
    pub path: String,
}

/// Parses a `git://host[:port]/path` URL. Any other scheme is out of
/// scope (HTTP(S) and SSH transports are not implemented).
pub fn parse_git_url(url: &str) -> Result<ParsedGitUrl> {
    let parsed = url::Url::parse(url)
        .map_err(|e| GitError::transport(url, "", format!("invalid git:// url: {e}")))?;
    if parsed.scheme() != "git" {
        return Err(GitError::transport(
            url,
            "",
            format!("unsupported scheme {:?}, only git:// is supported", parsed.scheme()),
        ));
    }
    let host = parsed
        .host_str()
        .ok_or_else(|| GitError::transport(url, "", "git:// url has no host"))?
        .to_string();
    let port = parsed.port().unwrap_or(9418);
    let path = parsed.path().to_string();
    Ok(ParsedGitUrl { host, port, path })
}

pub struct GitTransport {
    config: Config,
}

impl GitTransport {
    pub fn new(config: Config) -> Self {
        GitTransport { config }
    }

    async fn connect(&self, url: &ParsedGitUrl) -> Result<TcpStream> {
        let addr = format!("{}:{}", url.host, url.port);
        let connect_fut = TcpStream::connect(&addr);
        tokio::time::timeout(Duration::from_millis(self.config.connect_timeout_ms), connect_fut)
            .await
            .map_err(|_| GitError::transport(&url.host, &url.path, "connect timed out"))?
            .map_err(|e| GitError::transport(&url.host, &url.path, format!("connect failed: {e}")))
    }

    /// Always requests v2 (a v1-only `git-daemon` simply ignores the
    /// unknown `version=2` parameter and answers with its usual v1
    /// banner), then inspects the response to see which dialect the
    /// server actually spoke back.
    fn build_handshake(&self, url: &ParsedGitUrl) -> Vec<u8> {
        let request = format!(
            "git-upload-pack {}\0host={}\0\0version=2\0",
            url.path, url.host
        );
        encode_pkt_line(request.as_bytes()).expect("handshake line fits in a pkt-line")
    }

    async fn read_until_flush(&self, stream: &mut TcpStream) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            if ends_in_flush(&buffer) {
                break;
            }
            let n = stream
                .read(&mut chunk)
                .await
                .map_err(|e| GitError::transport("", "", format!("read failed: {e}")))?;
            if n == 0 {
                break;
            }
            buffer.extend_from_slice(&chunk[..n]);
        }
        Ok(buffer)
    }

    /// Opens a connection, sends the handshake, and reads the initial
    /// banner. Returns the dialect the server actually answered with
    /// alongside the raw banner bytes (a v1 ref advertisement, or a v2
    /// capability list) so the caller doesn't need to reparse it.
    async fn open_and_handshake(
        &self,
        parsed: &ParsedGitUrl,
    ) -> Result<(TcpStream, ProtocolVersion, Vec<u8>)> {
        let mut stream = self.connect(parsed).await?;
        let handshake = self.build_handshake(parsed);
        stream
            .write_all(&handshake)
            .await
            .map_err(|e| GitError::transport(&parsed.host, &parsed.path, format!("write failed: {e}")))?;
        let raw = self.read_until_flush(&mut stream).await?;
        let version = if is_v2_capability_banner(&raw) {
            ProtocolVersion::V2
        } else {
            ProtocolVersion::V1
        };
        Ok((stream, version, raw))
    }

    /// Opens a fresh connection, sends the ref-discovery handshake, and
    /// parses the advertised refs, whichever dialect the server answers
    /// with. Capability lines trailing the first `\0` are discarded; only
    /// `refs/...` names are kept.
    pub async fn fetch_refs(&self, url: &str) -> Result<HashMap<ObjectId, String>> {
        let parsed = parse_git_url(url)?;
        let (mut stream, version, raw) = self.open_and_handshake(&parsed).await?;
        match version {
            ProtocolVersion::V1 => parse_ref_advertisement(&raw),
            ProtocolVersion::V2 => self.ls_refs_v2(&mut stream, &parsed).await,
        }
    }

    /// Runs the v2 `command=ls-refs` round trip over an already-connected
    /// stream (the capability advertisement has already been drained by
    /// `open_and_handshake`).
    async fn ls_refs_v2(
        &self,
        stream: &mut TcpStream,
        parsed: &ParsedGitUrl,
    ) -> Result<HashMap<ObjectId, String>> {
        let mut body = encode_pkt_line(b"command=ls-refs\n").expect("fixed-size literal");
        body.extend(encode_delim());
        body.extend(encode_flush());
        stream
            .write_all(&body)
            .await
            .map_err(|e| GitError::transport(&parsed.host, &parsed.path, format!("write failed: {e}")))?;
        let raw = self.read_until_flush(stream).await?;
        parse_ref_advertisement(&raw)
    }

    /// Fetches a pack for the given negotiation `payload`, writing the
    /// reconstructed pack bytes to `output_path` via a temp file plus an
    /// atomic rename so a cancelled or failed fetch never leaves a
    /// truncated pack at the final path. Always opens a new connection
    /// and redrains the initial banner first, matching the documented
    /// (kept) reconnect-per-fetch behavior; the dialect is whatever the
    /// server answers with on that connection.
    pub async fn fetch_pack(
        &self,
        url: &str,
        payload: &FetchPayload,
        output_path: &Path,
    ) -> Result<()> {
        let parsed = parse_git_url(url)?;
        let (mut stream, version, _banner) = self.open_and_handshake(&parsed).await?;

        let body = match version {
            ProtocolVersion::V1 => payload.build_v1(),
            ProtocolVersion::V2 => payload.clone().build_v2(),
        };
        stream
            .write_all(&body)
            .await
            .map_err(|e| GitError::transport(&parsed.host, &parsed.path, format!("write failed: {e}")))?;

        let pack_data = self.read_pack_stream(&mut stream).await?;

        let mut tmp_name = output_path.as_os_str().to_os_string();
        tmp_name.push(".tmp");
        let tmp_path = PathBuf::from(tmp_name);
        tokio::fs::write(&tmp_path, &pack_data)
            .await
            .map_err(GitError::Io)?;
        tokio::fs::rename(&tmp_path, output_path)
            .await
            .map_err(GitError::Io)?;
        Ok(())
    }

    /// Reads the pack-transfer response. When `side-band-64k` wasn't
    /// negotiated, the entire response is raw pack bytes with no pkt-line
    /// framing at all; detected by the literal `PACK` magic at the very
    /// start of the response, since that's never a valid pkt-line length
    /// header. Otherwise every line is sideband-demultiplexed as usual.
    async fn read_pack_stream(&self, stream: &mut TcpStream) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        let mut chunk = [0u8; 8192];

        while buffer.len() < 4 {
            let n = stream
                .read(&mut chunk)
                .await
                .map_err(|e| GitError::transport("", "", format!("read failed: {e}")))?;
            if n == 0 {
                break;
            }
            buffer.extend_from_slice(&chunk[..n]);
        }

        if buffer.starts_with(b"PACK") {
            loop {
                let n = stream
                    .read(&mut chunk)
                    .await
                    .map_err(|e| GitError::transport("", "", format!("read failed: {e}")))?;
                if n == 0 {
                    break;
                }
                buffer.extend_from_slice(&chunk[..n]);
            }
            return Ok(buffer);
        }

        let mut demux = Demuxer::new();
        loop {
            loop {
                match decode_pkt_line(&buffer) {
                    Ok((line, consumed)) => {
                        match line {
                            PktLine::Flush => return Ok(demux.pack_data),
                            PktLine::Delim => {}
                            // v2 frames the pack inside a "packfile" section;
                            // the section name itself isn't sideband data.
                            PktLine::Data(payload) if payload.as_slice() == b"packfile\n" => {}
                            PktLine::Data(payload) => demux.feed_payload(&payload)?,
                        }
                        buffer.drain(..consumed);
                    }
                    Err(_) => break,
                }
            }

            let n = stream
                .read(&mut chunk)
                .await
                .map_err(|e| GitError::transport("", "", format!("read failed: {e}")))?;
            if n == 0 {
                if buffer.is_empty() {
                    return Ok(demux.pack_data);
                }
                return Err(GitError::transport(
                    "",
                    "",
                    "connection closed before a terminating flush pkt-line",
                ));
            }
            buffer.extend_from_slice(&chunk[..n]);
        }
    }
}

fn ends_in_flush(buffer: &[u8]) -> bool {
    buffer.len() >= 4 && &buffer[buffer.len() - 4..] == b"0000"
}

/// A v2 capability advertisement's first (non-service-announcement) line
/// is the literal `version 2`; a v1 ref advertisement's first line is
/// always `<sha> <ref>...`, which never matches that.
fn is_v2_capability_banner(raw: &[u8]) -> bool {
    let mut cursor = raw;
    let mut first = true;
    while !cursor.is_empty() {
        let Ok((line, consumed)) = decode_pkt_line(cursor) else {
            return false;
        };
        cursor = &cursor[consumed..];
        let payload = match line {
            PktLine::Flush | PktLine::Delim => return false,
            PktLine::Data(payload) => payload,
        };
        if first {
            first = false;
            if payload.starts_with(b"#") {
                continue;
            }
        }
        return payload == b"version 2\n";
    }
    false
}

fn parse_ref_advertisement(data: &[u8]) -> Result<HashMap<ObjectId, String>> {
    let mut refs = HashMap::new();
    let mut cursor = data;
    let mut first = true;

    while !cursor.is_empty() {
        let (line, consumed) = decode_pkt_line(cursor)?;
        cursor = &cursor[consumed..];
        let payload = match line {
            PktLine::Flush | PktLine::Delim => break,
            PktLine::Data(payload) => payload,
        };

        let mut text: &[u8] = &payload;
        if first {
            first = false;
            // the service announcement line ("# service=...") has no
            // sha/name shape; skip it rather than trying to parse it.
            if text.starts_with(b"#") {
                continue;
            }
        }
        // strip the trailing capability list after the first NUL.
        if let Some(nul) = text.iter().position(|&b| b == 0) {
            text = &text[..nul];
        }
        let text = String::from_utf8_lossy(text);
        let text = text.trim_end_matches('\n');
        let Some((sha_hex, name)) = text.split_once(' ') else {
            continue;
        };
        if !name.starts_with("refs/") && name != "HEAD" {
            continue;
        }
        if let Ok(sha) = ObjectId::from_hex(sha_hex) {
            refs.insert(sha, name.to_string());
        }
    }

    Ok(refs)
}
