//! TSH record format
//!
//! A TSH (time-sequenced header) trace is a flat sequence of fixed-size records. Each
//! record holds a capture timestamp, the capturing interface, the 20-byte IPv4 header without
//! options, and the first 16 bytes of the transport header (ports, sequence and
//! acknowledgment numbers, data offset, flags and window for TCP). There is no file header.
//!
//! All multi-byte fields are big-endian.

use std::fmt;

use nom::number::streaming::{be_u16, be_u24, be_u32, be_u8};
use nom::IResult;
use serde::Serialize;

use crate::error::TshError;
use crate::protocol::IpProtocol;

/// Size of a TSH record, in bytes
pub const TSH_RECORD_LEN: usize = 44;

/// Length of an IPv4 or TCP header without options
pub const MIN_HEADER_LEN: u8 = 20;

pub const MICROS_PER_SEC: u32 = 1_000_000;

/// IP flag: Don't Fragment
pub const IP_DF: u16 = 0x4000;
/// IP flag: More Fragments
pub const IP_MF: u16 = 0x2000;

/// TCP flags, as found in byte 13 of the TCP header
#[derive(Clone, Copy, Default, Eq, PartialEq, Serialize)]
pub struct TcpFlags(pub u8);

impl TcpFlags {
    pub const FIN: u8 = 0x01;
    pub const SYN: u8 = 0x02;
    pub const RST: u8 = 0x04;
    pub const PSH: u8 = 0x08;
    pub const ACK: u8 = 0x10;
    pub const URG: u8 = 0x20;
    pub const ECE: u8 = 0x40;
    pub const CWR: u8 = 0x80;

    #[inline]
    fn has(self, bit: u8) -> bool {
        self.0 & bit != 0
    }
    #[inline]
    pub fn cwr(self) -> bool {
        self.has(Self::CWR)
    }
    #[inline]
    pub fn ece(self) -> bool {
        self.has(Self::ECE)
    }
    #[inline]
    pub fn urg(self) -> bool {
        self.has(Self::URG)
    }
    #[inline]
    pub fn ack(self) -> bool {
        self.has(Self::ACK)
    }
    #[inline]
    pub fn psh(self) -> bool {
        self.has(Self::PSH)
    }
    #[inline]
    pub fn rst(self) -> bool {
        self.has(Self::RST)
    }
    #[inline]
    pub fn syn(self) -> bool {
        self.has(Self::SYN)
    }
    #[inline]
    pub fn fin(self) -> bool {
        self.has(Self::FIN)
    }
}

impl fmt::Debug for TcpFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [&str; 8] = ["CWR", "ECE", "URG", "ACK", "PSH", "RST", "SYN", "FIN"];
        let set: Vec<&str> = NAMES
            .iter()
            .enumerate()
            .filter(|(i, _)| self.0 & (0x80 >> i) != 0)
            .map(|(_, name)| *name)
            .collect();
        write!(f, "TcpFlags({})", set.join("|"))
    }
}

/// One decoded TSH record
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TshRecord {
    /// Capture time, seconds part
    pub seconds: u32,
    /// Number of the capturing interface
    pub interface: u8,
    /// Capture time, microseconds part (24 bits on the wire, always below 1,000,000)
    pub microseconds: u32,
    /// IP version (high nibble) and header length in 32-bit words (low nibble)
    pub version_ihl: u8,
    pub type_of_service: u8,
    /// Length of the IP packet, in bytes
    pub total_length: u16,
    pub identification: u16,
    /// IP flags (3 high bits) and fragment offset
    pub flags_fragment_offset: u16,
    pub ttl: u8,
    pub protocol: IpProtocol,
    pub header_checksum: u16,
    pub source_address: u32,
    pub destination_address: u32,
    pub source_port: u16,
    pub destination_port: u16,
    pub sequence_number: u32,
    pub acknowledgment_number: u32,
    /// TCP data offset in 32-bit words (high nibble) and reserved bits
    pub data_offset_reserved: u8,
    pub tcp_flags: TcpFlags,
    pub window: u16,
}

impl TshRecord {
    #[inline]
    pub fn ip_version(&self) -> u8 {
        self.version_ihl >> 4
    }

    /// IP header length, in bytes
    #[inline]
    pub fn ihl(&self) -> u8 {
        (self.version_ihl & 0x0f) * 4
    }

    /// Differentiated Services code point
    #[inline]
    pub fn dscp(&self) -> u8 {
        self.type_of_service >> 2
    }

    /// Explicit Congestion Notification bits
    #[inline]
    pub fn ecn(&self) -> u8 {
        self.type_of_service & 0b11
    }

    #[inline]
    pub fn dont_fragment(&self) -> bool {
        self.flags_fragment_offset & IP_DF != 0
    }

    #[inline]
    pub fn more_fragments(&self) -> bool {
        self.flags_fragment_offset & IP_MF != 0
    }

    /// TCP header length, in bytes
    #[inline]
    pub fn tcp_header_len(&self) -> u8 {
        (self.data_offset_reserved >> 4) * 4
    }

    /// TCP payload length, in bytes
    ///
    /// Negative for malformed records, where the headers claim more bytes than the packet has.
    pub fn tcp_payload_len(&self) -> i32 {
        i32::from(self.total_length) - i32::from(self.ihl()) - i32::from(self.tcp_header_len())
    }

    #[inline]
    pub fn is_tcp(&self) -> bool {
        self.protocol == IpProtocol::TCP
    }

    /// Capture time in microseconds since the epoch
    #[inline]
    pub fn timestamp_micros(&self) -> u64 {
        u64::from(self.seconds) * u64::from(MICROS_PER_SEC) + u64::from(self.microseconds)
    }

    /// Capture time in seconds since the epoch
    pub fn timestamp(&self) -> f64 {
        f64::from(self.seconds) + f64::from(self.microseconds) / f64::from(MICROS_PER_SEC)
    }
}

/// Read a TSH record
///
/// Input shorter than [`TSH_RECORD_LEN`] returns `Incomplete`. A microsecond field of one
/// second or more is a hard failure, since the timestamp cannot be trusted.
pub fn parse_tsh_record(i: &[u8]) -> IResult<&[u8], TshRecord, TshError> {
    if i.len() < TSH_RECORD_LEN {
        return Err(nom::Err::Incomplete(nom::Needed::new(
            TSH_RECORD_LEN - i.len(),
        )));
    }
    let (i, seconds) = be_u32(i)?;
    let (i, interface) = be_u8(i)?;
    let (i, microseconds) = be_u24(i)?;
    if microseconds >= MICROS_PER_SEC {
        return Err(nom::Err::Failure(TshError::MalformedMicroseconds(
            microseconds,
        )));
    }
    let (i, version_ihl) = be_u8(i)?;
    let (i, type_of_service) = be_u8(i)?;
    let (i, total_length) = be_u16(i)?;
    let (i, identification) = be_u16(i)?;
    let (i, flags_fragment_offset) = be_u16(i)?;
    let (i, ttl) = be_u8(i)?;
    let (i, protocol) = be_u8(i)?;
    let (i, header_checksum) = be_u16(i)?;
    let (i, source_address) = be_u32(i)?;
    let (i, destination_address) = be_u32(i)?;
    let (i, source_port) = be_u16(i)?;
    let (i, destination_port) = be_u16(i)?;
    let (i, sequence_number) = be_u32(i)?;
    let (i, acknowledgment_number) = be_u32(i)?;
    let (i, data_offset_reserved) = be_u8(i)?;
    let (i, tcp_flags) = be_u8(i)?;
    let (i, window) = be_u16(i)?;
    let record = TshRecord {
        seconds,
        interface,
        microseconds,
        version_ihl,
        type_of_service,
        total_length,
        identification,
        flags_fragment_offset,
        ttl,
        protocol: IpProtocol(protocol),
        header_checksum,
        source_address,
        destination_address,
        source_port,
        destination_port,
        sequence_number,
        acknowledgment_number,
        data_offset_reserved,
        tcp_flags: TcpFlags(tcp_flags),
        window,
    };
    Ok((i, record))
}
