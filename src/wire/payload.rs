//! Builds the `want`/`have`/`deepen`/`done` negotiation body sent to
//! `git-upload-pack`, in both v1 (flush-terminated) and v2
//! (`command=fetch` + delimiter-framed) shapes.

use crate::object::ObjectId;
use crate::wire::pkt::{encode_delim, encode_flush, encode_pkt_line};

#[derive(Debug, Clone, Default)]
pub struct FetchPayload {
    wants: Vec<(ObjectId, Vec<String>)>,
    haves: Vec<ObjectId>,
    deepen: Option<u32>,
    delimiter: bool,
    done: bool,
}

impl FetchPayload {
    pub fn new() -> Self {
        FetchPayload::default()
    }

    pub fn add_want(&mut self, sha: &ObjectId, caps: &[&str]) {
        self.wants.push((*sha, caps.iter().map(|s| s.to_string()).collect()));
    }

    pub fn add_have(&mut self, sha: &ObjectId) {
        self.haves.push(*sha);
    }

    pub fn add_deepen(&mut self, n: u32) {
        self.deepen = Some(n);
    }

    pub fn add_done(&mut self) {
        self.done = true;
    }

    /// Marks the `0001` delimiter that v2 framing requires after the
    /// `command=fetch` line.
    pub fn add_delimiter(&mut self) {
        self.delimiter = true;
    }

    /// Builds the negotiation body for whichever protocol version the
    /// caller is speaking; defaults to v1 framing.
    pub fn build(&self) -> Vec<u8> {
        self.build_v1()
    }

    /// Builds the v1 body: `want` lines (capabilities only on the first),
    /// `have` lines, an optional `deepen`, flush, then `done`.
    pub fn build_v1(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for (i, (sha, caps)) in self.wants.iter().enumerate() {
            let line = if i == 0 && !caps.is_empty() {
                format!("want {} {}\n", sha.to_hex(), caps.join(" "))
            } else {
                format!("want {}\n", sha.to_hex())
            };
            out.extend(encode_pkt_line(line.as_bytes()).expect("want line fits in a pkt-line"));
        }
        if let Some(n) = self.deepen {
            out.extend(
                encode_pkt_line(format!("deepen {n}\n").as_bytes())
                    .expect("deepen line fits in a pkt-line"),
            );
        }
        out.extend(encode_flush());
        for sha in &self.haves {
            out.extend(
                encode_pkt_line(format!("have {}\n", sha.to_hex()).as_bytes())
                    .expect("have line fits in a pkt-line"),
            );
        }
        if self.done {
            out.extend(encode_pkt_line(b"done\n").expect("done line fits in a pkt-line"));
        }
        out
    }

    /// Builds the v2 body: `command=fetch` pkt-line, a delimiter, then
    /// the same want/have/deepen/done lines, ending in a flush. v2 framing
    /// always requires the delimiter, so this calls `add_delimiter` itself
    /// rather than assuming the caller already did.
    pub fn build_v2(&mut self) -> Vec<u8> {
        self.add_delimiter();
        let mut out = Vec::new();
        out.extend(encode_pkt_line(b"command=fetch\n").expect("fixed-size literal"));
        if self.delimiter {
            out.extend(encode_delim());
        }
        for (sha, _caps) in &self.wants {
            out.extend(
                encode_pkt_line(format!("want {}\n", sha.to_hex()).as_bytes())
                    .expect("want line fits in a pkt-line"),
            );
        }
        for sha in &self.haves {
            out.extend(
                encode_pkt_line(format!("have {}\n", sha.to_hex()).as_bytes())
                    .expect("have line fits in a pkt-line"),
            );
        }
        if let Some(n) = self.deepen {
            out.extend(
                encode_pkt_line(format!("deepen {n}\n").as_bytes())
                    .expect("deepen line fits in a pkt-line"),
            );
        }
        if self.done {
            out.extend(encode_pkt_line(b"done\n").expect("fixed-size literal"));
        }
        out.extend(encode_flush());
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sha(hex: &str) -> ObjectId {
        ObjectId::from_hex(hex).unwrap()
    }

    #[test]
    fn v1_first_want_carries_capabilities() {
        let mut payload = FetchPayload::new();
        payload.add_want(
            &sha("50f49a6350aa584d96dc4efe162cec8ce09a212b"),
            &["side-band-64k", "ofs-delta"],
        );
        payload.add_done();
        let body = payload.build_v1();
        let text = String::from_utf8_lossy(&body);
        assert!(text.contains("want 50f49a6350aa584d96dc4efe162cec8ce09a212b"));
        assert!(text.contains("side-band-64k"));
        assert!(text.contains("done\n"));
    }

    #[test]
    fn v2_includes_command_and_delimiter() {
        let mut payload = FetchPayload::new();
        payload.add_want(&sha("e69de29bb2d1d6434b8b29ae775ad8c2e48c5391"), &[]);
        payload.add_done();
        let body = payload.build_v2();
        assert!(body.windows(13).any(|w| w == b"command=fetch"));
        assert!(body.windows(4).any(|w| w == b"0001"));
    }

    #[test]
    fn add_delimiter_is_idempotent_with_build_v2() {
        let mut payload = FetchPayload::new();
        payload.add_delimiter();
        payload.add_want(&sha("e69de29bb2d1d6434b8b29ae775ad8c2e48c5391"), &[]);
        let body = payload.build_v2();
        assert_eq!(body.windows(4).filter(|w| *w == b"0001").count(), 1);
    }

    #[test]
    fn have_lines_never_carry_capabilities() {
        let mut payload = FetchPayload::new();
        payload.add_have(&sha("e69de29bb2d1d6434b8b29ae775ad8c2e48c5391"));
        let body = payload.build_v1();
        let text = String::from_utf8_lossy(&body);
        assert!(text.contains("have e69de29bb2d1d6434b8b29ae775ad8c2e48c5391\n"));
    }
}
