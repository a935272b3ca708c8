//! The git:// smart-protocol wire format: pkt-line framing, the fetch
//! negotiation payload builder, the TCP transport, and sideband demuxing.

pub mod payload;
pub mod pkt;
pub mod sideband;
pub mod transport;
