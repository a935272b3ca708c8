//! End-to-end: fetch a pack from an in-process `git-upload-pack` stub over
//! real TCP, then run the pack index generator against what arrived.
//!
//! This exercises the same code path as the incremental-fetch scenario
//! against `git.lyoko.io/AzurLaneAutoScript` (discover refs, negotiate a
//! `have`-based fetch, stream a side-band-multiplexed pack), but against a
//! loopback stub instead of a real host so the suite stays hermetic.

use std::io::Write as _;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use git_core::config::Config;
use git_core::pack::genidx::pack_to_idx;
use git_core::pack::idx::read_idx;
use git_core::wire::payload::FetchPayload;
use git_core::wire::pkt::{encode_flush, encode_pkt_line};
use git_core::wire::transport::GitTransport;
use git_core::ObjectId;

fn zlib_compress(data: &[u8]) -> Vec<u8> {
    let mut encoder = flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

fn blob_entry(content: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    let size = content.len();
    let mut first = (3u8 << 4) | (size as u8 & 0x0F);
    let mut remaining = size >> 4;
    if remaining != 0 {
        first |= 0x80;
    }
    out.push(first);
    while remaining != 0 {
        let mut byte = (remaining & 0x7F) as u8;
        remaining >>= 7;
        if remaining != 0 {
            byte |= 0x80;
        }
        out.push(byte);
    }
    out.extend(zlib_compress(content));
    out
}

fn build_pack(contents: &[&[u8]]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(b"PACK");
    body.extend_from_slice(&2u32.to_be_bytes());
    body.extend_from_slice(&(contents.len() as u32).to_be_bytes());
    for content in contents {
        body.extend(blob_entry(content));
    }
    let mut hasher = sha1_smol::Sha1::new();
    hasher.update(&body);
    body.extend_from_slice(&hasher.digest().bytes());
    body
}

/// Speaks just enough of git-upload-pack v1 to satisfy `GitTransport`:
/// one connection for ref discovery, a second (reconnected, per the kept
/// v1 behavior) for the negotiation + pack stream.
async fn run_upload_pack_stub(listener: TcpListener, head_sha: &str, pack: Vec<u8>) {
    for _ in 0..2 {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = Vec::new();
        let mut buf = [0u8; 1024];
        loop {
            let n = socket.read(&mut buf).await.unwrap();
            request.extend_from_slice(&buf[..n]);
            if request.ends_with(b"\0") || n == 0 {
                break;
            }
        }

        let mut advertisement = Vec::new();
        let first_line = format!("{head_sha} HEAD\0multi_ack side-band-64k ofs-delta\n");
        advertisement.extend(encode_pkt_line(first_line.as_bytes()).unwrap());
        let second_line = format!("{head_sha} refs/heads/master\n");
        advertisement.extend(encode_pkt_line(second_line.as_bytes()).unwrap());
        advertisement.extend(encode_flush());
        socket.write_all(&advertisement).await.unwrap();

        // drain the negotiation body the client sends (want/have/done),
        // ending in a flush we don't need to interpret for this stub.
        let mut negotiation = Vec::new();
        loop {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            negotiation.extend_from_slice(&buf[..n]);
            if negotiation.ends_with(b"0009done\n") || negotiation.ends_with(b"0000") {
                break;
            }
        }
        if negotiation.windows(4).any(|w| w == b"done") {
            let mut sideband_payload = vec![1u8];
            sideband_payload.extend_from_slice(&pack);
            let mut response = encode_pkt_line(&sideband_payload).unwrap();
            response.extend(encode_flush());
            socket.write_all(&response).await.unwrap();
            return;
        }
    }
}

/// Speaks just enough of git-upload-pack v2 to satisfy `GitTransport`:
/// a capability banner, `command=ls-refs` on the first connection, then
/// a reconnect for `command=fetch` whose `packfile` section carries the
/// same sideband framing as v1.
async fn run_upload_pack_v2_stub(listener: TcpListener, head_sha: &str, pack: Vec<u8>) {
    for round in 0..2 {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = Vec::new();
        let mut buf = [0u8; 1024];
        loop {
            let n = socket.read(&mut buf).await.unwrap();
            request.extend_from_slice(&buf[..n]);
            if request.ends_with(b"\0") || n == 0 {
                break;
            }
        }

        let mut banner = Vec::new();
        banner.extend(encode_pkt_line(b"version 2\n").unwrap());
        banner.extend(encode_pkt_line(b"ls-refs=unborn\n").unwrap());
        banner.extend(encode_pkt_line(b"fetch=shallow\n").unwrap());
        banner.extend(encode_flush());
        socket.write_all(&banner).await.unwrap();

        let mut command = Vec::new();
        loop {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            command.extend_from_slice(&buf[..n]);
            if command.ends_with(b"0000") {
                break;
            }
        }

        if round == 0 {
            let mut response = Vec::new();
            let line = format!("{head_sha} refs/heads/master\n");
            response.extend(encode_pkt_line(line.as_bytes()).unwrap());
            response.extend(encode_flush());
            socket.write_all(&response).await.unwrap();
        } else {
            let mut response = encode_pkt_line(b"packfile\n").unwrap();
            let mut sideband_payload = vec![1u8];
            sideband_payload.extend_from_slice(&pack);
            response.extend(encode_pkt_line(&sideband_payload).unwrap());
            response.extend(encode_flush());
            socket.write_all(&response).await.unwrap();
        }
    }
}

#[tokio::test]
async fn fetches_pack_over_loopback_v2_and_indexes_it() {
    let pack = build_pack(&[b"hello v2 world"]);
    let head_sha = "50f49a6350aa584d96dc4efe162cec8ce09a212b";

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let stub = tokio::spawn(run_upload_pack_v2_stub(listener, head_sha, pack.clone()));

    let url = format!("git://{}/demo", addr);
    let transport = GitTransport::new(Config::default());

    let refs = transport.fetch_refs(&url).await.unwrap();
    let oid = ObjectId::from_hex(head_sha).unwrap();
    assert_eq!(refs.get(&oid).map(String::as_str), Some("refs/heads/master"));

    let mut payload = FetchPayload::new();
    payload.add_want(&oid, &[]);
    payload.add_done();

    let tmp = tempfile::tempdir().unwrap();
    let pack_path = tmp.path().join("fetched-v2.pack");
    transport.fetch_pack(&url, &payload, &pack_path).await.unwrap();

    stub.await.unwrap();

    let fetched = std::fs::read(&pack_path).unwrap();
    assert_eq!(fetched, pack);

    let idx = pack_to_idx(&fetched).unwrap();
    let map = read_idx(&idx, fetched.len() as u64).unwrap();
    assert_eq!(map.dict_offset.len(), 1);
}

#[tokio::test]
async fn fetches_pack_over_loopback_and_indexes_it() {
    let pack = build_pack(&[b"hello world", b"a second small blob"]);
    let head_sha = "50f49a6350aa584d96dc4efe162cec8ce09a212b";

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let stub = tokio::spawn(run_upload_pack_stub(listener, head_sha, pack.clone()));

    let url = format!("git://{}/demo", addr);
    let transport = GitTransport::new(Config::default());

    let refs = transport.fetch_refs(&url).await.unwrap();
    let oid = ObjectId::from_hex(head_sha).unwrap();
    assert_eq!(refs.get(&oid).map(String::as_str), Some("refs/heads/master"));

    let mut payload = FetchPayload::new();
    payload.add_want(&oid, &["multi_ack", "side-band-64k"]);
    payload.add_done();

    let tmp = tempfile::tempdir().unwrap();
    let pack_path = tmp.path().join("fetched.pack");
    transport.fetch_pack(&url, &payload, &pack_path).await.unwrap();

    stub.await.unwrap();

    let fetched = std::fs::read(&pack_path).unwrap();
    assert_eq!(fetched, pack);

    let idx = pack_to_idx(&fetched).unwrap();
    let map = read_idx(&idx, fetched.len() as u64).unwrap();
    assert_eq!(map.dict_offset.len(), 2);
}
