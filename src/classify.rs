//! Packet classification
//!
//! Every record is sorted along several independent dimensions: fragmentation flags,
//! DiffServ class, ECN bits and presence of IP options. Each match names a [`Category`] whose
//! packet and byte counters are incremented by the accumulator. TCP records are further
//! decomposed by [`classify_tcp`].

use std::fmt;

use serde::Serialize;

use crate::record::{TshRecord, MIN_HEADER_LEN};

/// Statistic category, counted in packets and bytes
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Category {
    Total,
    DontFragment,
    MoreFragments,
    Ect,
    Ce,
    Normal,
    ClassSelector,
    AfPhb,
    EfPhb,
    NoIpOptions,
    IpOptions,
}

impl Category {
    pub const COUNT: usize = 11;

    /// All categories, in report order
    pub const ALL: [Category; Category::COUNT] = [
        Category::Total,
        Category::DontFragment,
        Category::MoreFragments,
        Category::Ect,
        Category::Ce,
        Category::Normal,
        Category::ClassSelector,
        Category::AfPhb,
        Category::EfPhb,
        Category::NoIpOptions,
        Category::IpOptions,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            Category::Total => "Total",
            Category::DontFragment => "DF",
            Category::MoreFragments => "MF",
            Category::Ect => "ECT",
            Category::Ce => "CE",
            Category::Normal => "Normal",
            Category::ClassSelector => "Class Selector",
            Category::AfPhb => "AF PHB",
            Category::EfPhb => "EF PHB",
            Category::NoIpOptions => "No IP Options",
            Category::IpOptions => "IP Options",
        }
    }

    #[inline]
    pub(crate) const fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A set of categories matched by one packet
#[derive(Clone, Copy, Default, PartialEq, Eq)]
pub struct CategorySet(u16);

impl CategorySet {
    pub const fn empty() -> CategorySet {
        CategorySet(0)
    }

    #[inline]
    pub fn insert(&mut self, category: Category) {
        self.0 |= 1 << category.index();
    }

    #[inline]
    pub fn contains(self, category: Category) -> bool {
        self.0 & (1 << category.index()) != 0
    }

    pub fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Iterate over the members, in report order
    pub fn iter(self) -> impl Iterator<Item = Category> {
        Category::ALL.into_iter().filter(move |c| self.contains(*c))
    }
}

impl fmt::Debug for CategorySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

/// DiffServ class of a code point
///
/// Evaluated in a fixed order, first match wins: 0 is "Normal" even though it is also a
/// multiple of 8. Odd code points and even ones outside the AF and EF ranges have no class.
pub fn diffserv_class(dscp: u8) -> Option<Category> {
    if dscp == 0 {
        return Some(Category::Normal);
    }
    if dscp % 8 == 0 {
        return Some(Category::ClassSelector);
    }
    if dscp % 2 == 0 {
        let half = dscp >> 1;
        if 4 < half && half < 20 {
            return Some(Category::AfPhb);
        }
        if half == 23 {
            return Some(Category::EfPhb);
        }
    }
    None
}

/// Length class of an IP or TCP header
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HeaderClass {
    /// Exactly 20 bytes
    Minimal,
    /// More than 20 bytes
    WithOptions,
    /// Less than 20 bytes, which no valid header has
    Short,
}

pub fn header_class(len: u8) -> HeaderClass {
    match len {
        MIN_HEADER_LEN => HeaderClass::Minimal,
        l if l > MIN_HEADER_LEN => HeaderClass::WithOptions,
        _ => HeaderClass::Short,
    }
}

/// IP-level categories of a record
///
/// `Total` is always present. A short IP header leaves the IP options dimension empty.
pub fn classify_ip(record: &TshRecord) -> CategorySet {
    let mut set = CategorySet::empty();
    set.insert(Category::Total);
    if record.dont_fragment() {
        set.insert(Category::DontFragment);
    }
    if record.more_fragments() {
        set.insert(Category::MoreFragments);
    }
    if let Some(class) = diffserv_class(record.dscp()) {
        set.insert(class);
    }
    let ecn = record.ecn();
    if ecn != 0 {
        set.insert(Category::Ect);
        if ecn == 0b11 {
            set.insert(Category::Ce);
        }
    }
    match header_class(record.ihl()) {
        HeaderClass::Minimal => set.insert(Category::NoIpOptions),
        HeaderClass::WithOptions => set.insert(Category::IpOptions),
        HeaderClass::Short => (),
    }
    set
}

/// What a SYN segment contributes
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SynClass {
    /// SYN/ACK
    pub ack: bool,
    pub with_payload: bool,
    /// The header has no options, so the window is counted in the hard histogram as well
    pub hard_window: bool,
}

/// What an ACK segment contributes
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AckClass {
    /// Option-free header; `pure` when it carries no payload
    Cumulative { pure: bool },
    /// Header with options
    Options,
    /// Header shorter than 20 bytes, counted only in the total
    Short,
}

/// TCP decomposition of a record
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TcpClass {
    pub header_len: u8,
    /// Payload length, as computed from the headers (negative for malformed records)
    pub raw_payload_len: i32,
    pub syn: Option<SynClass>,
    pub ack: Option<AckClass>,
    pub window: u16,
}

impl TcpClass {
    /// Payload length, clamped to zero for malformed records
    pub fn payload_len(&self) -> u32 {
        self.raw_payload_len.max(0) as u32
    }
}

pub fn classify_tcp(record: &TshRecord) -> TcpClass {
    let header_len = record.tcp_header_len();
    let raw_payload_len = record.tcp_payload_len();
    let has_payload = raw_payload_len > 0;
    let flags = record.tcp_flags;
    let syn = if flags.syn() {
        Some(SynClass {
            ack: flags.ack(),
            with_payload: has_payload,
            hard_window: header_len == MIN_HEADER_LEN,
        })
    } else {
        None
    };
    let ack = if flags.ack() {
        Some(match header_class(header_len) {
            HeaderClass::Minimal => AckClass::Cumulative { pure: !has_payload },
            HeaderClass::WithOptions => AckClass::Options,
            HeaderClass::Short => AckClass::Short,
        })
    } else {
        None
    };
    TcpClass {
        header_len,
        raw_payload_len,
        syn,
        ack,
        window: record.window,
    }
}
