//! Frame Decoding
//!
//! Fixed-offset header parsing over raw link-layer bytes. Decoding is
//! byte-oriented and side-effect free: the decoder reports positions and
//! values, never copies sub-headers, and never touches metrics itself.
//!
//! IPv4 header checksum verification is advisory — a mismatch is reported
//! in [`DecodedFrame::checksum_ok`] and is not a parse error.

use thiserror::Error;
use wirebench_core::{ETHERTYPE_IPV4, ETHERTYPE_IPV6, PROTO_TCP, PROTO_UDP};

/// Ethernet header: two MACs plus the EtherType.
pub const ETHERNET_HEADER_LEN: usize = 14;
/// Minimum IPv4 header (IHL = 5).
pub const IPV4_MIN_HEADER_LEN: usize = 20;
/// Fixed IPv6 header.
pub const IPV6_HEADER_LEN: usize = 40;
/// Minimum TCP header.
pub const TCP_MIN_HEADER_LEN: usize = 20;
/// UDP header.
pub const UDP_HEADER_LEN: usize = 8;

/// Why a frame could not be decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Fewer bytes than an Ethernet header.
    #[error("frame too short for an Ethernet header: {len} bytes")]
    FrameTooShort {
        /// Captured length of the offending frame.
        len: usize,
    },
    /// A declared header extends past the captured bytes.
    #[error("truncated {layer} header")]
    TruncatedHeader {
        /// Layer whose header was cut short.
        layer: &'static str,
    },
    /// IPv4 IHL below the 20-byte minimum.
    #[error("invalid IPv4 header length: {ihl} bytes")]
    InvalidIhl {
        /// Declared header length in bytes.
        ihl: usize,
    },
}

/// Zero-copy view of a decoded frame.
///
/// Offsets reference the original byte slice; no sub-header is owned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedFrame {
    /// EtherType from the Ethernet header.
    pub ethertype: u16,
    /// L4 protocol (IPv4 protocol byte or IPv6 next-header), when the frame
    /// carries an IP payload.
    pub l4_protocol: Option<u8>,
    /// Offset of the L3 header, when present.
    pub l3_offset: Option<usize>,
    /// Offset of the L4 header, when present.
    pub l4_offset: Option<usize>,
    /// Advisory IPv4 header checksum result; `true` when not applicable.
    pub checksum_ok: bool,
}

/// Decode the fixed protocol set from a captured byte slice.
///
/// Frames with an EtherType outside IPv4/IPv6 (ARP and friends) decode
/// successfully with no L4 information.
pub fn decode(data: &[u8]) -> Result<DecodedFrame, DecodeError> {
    if data.len() < ETHERNET_HEADER_LEN {
        return Err(DecodeError::FrameTooShort { len: data.len() });
    }

    let ethertype = u16::from_be_bytes([data[12], data[13]]);
    match ethertype {
        ETHERTYPE_IPV4 => decode_ipv4(data, ethertype),
        ETHERTYPE_IPV6 => decode_ipv6(data, ethertype),
        _ => Ok(DecodedFrame {
            ethertype,
            l4_protocol: None,
            l3_offset: None,
            l4_offset: None,
            checksum_ok: true,
        }),
    }
}

fn decode_ipv4(data: &[u8], ethertype: u16) -> Result<DecodedFrame, DecodeError> {
    let l3 = ETHERNET_HEADER_LEN;
    if data.len() < l3 + IPV4_MIN_HEADER_LEN {
        return Err(DecodeError::TruncatedHeader { layer: "IPv4" });
    }

    let ihl = usize::from(data[l3] & 0x0F) * 4;
    if ihl < IPV4_MIN_HEADER_LEN {
        return Err(DecodeError::InvalidIhl { ihl });
    }
    if l3 + ihl > data.len() {
        return Err(DecodeError::TruncatedHeader { layer: "IPv4" });
    }

    let protocol = data[l3 + 9];
    let l4 = l3 + ihl;
    check_l4_bounds(data, l4, protocol)?;

    Ok(DecodedFrame {
        ethertype,
        l4_protocol: Some(protocol),
        l3_offset: Some(l3),
        l4_offset: Some(l4),
        checksum_ok: ipv4_checksum_ok(&data[l3..l3 + ihl]),
    })
}

fn decode_ipv6(data: &[u8], ethertype: u16) -> Result<DecodedFrame, DecodeError> {
    let l3 = ETHERNET_HEADER_LEN;
    if data.len() < l3 + IPV6_HEADER_LEN {
        return Err(DecodeError::TruncatedHeader { layer: "IPv6" });
    }

    // The fixed next-header byte; extension-header walking is out of scope.
    let next_header = data[l3 + 6];
    let l4 = l3 + IPV6_HEADER_LEN;
    check_l4_bounds(data, l4, next_header)?;

    Ok(DecodedFrame {
        ethertype,
        l4_protocol: Some(next_header),
        l3_offset: Some(l3),
        l4_offset: Some(l4),
        checksum_ok: true,
    })
}

fn check_l4_bounds(data: &[u8], l4_offset: usize, protocol: u8) -> Result<(), DecodeError> {
    let required = match protocol {
        PROTO_TCP => TCP_MIN_HEADER_LEN,
        PROTO_UDP => UDP_HEADER_LEN,
        _ => 0,
    };
    if l4_offset + required > data.len() {
        let layer = if protocol == PROTO_TCP { "TCP" } else { "UDP" };
        return Err(DecodeError::TruncatedHeader { layer });
    }
    Ok(())
}

/// Verify the IPv4 header checksum (RFC 1071 ones-complement sum).
fn ipv4_checksum_ok(header: &[u8]) -> bool {
    let mut sum: u32 = 0;
    for (i, pair) in header.chunks_exact(2).enumerate() {
        if i == 5 {
            continue; // the checksum field itself
        }
        sum += u32::from(u16::from_be_bytes([pair[0], pair[1]]));
    }
    while sum >> 16 != 0 {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }
    let stored = u16::from_be_bytes([header[10], header[11]]);
    !(sum as u16) == stored
}
