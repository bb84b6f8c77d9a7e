//! Trace statistics
//!
//! A [`TraceSummary`] holds the statistics of one trace. Packets are accumulated per
//! interface in [`InterfaceSummary`] values while the trace is read; [`TraceSummary::finalize`]
//! then sums them into the aggregate view. Within each scope there is one [`StatBucket`] for
//! all IP traffic and one per transport protocol, plus TCP-specific counters.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

use crate::classify::{AckClass, Category, CategorySet, TcpClass};
use crate::error::TshError;

/// Default link capacity (OC-3), in bits per second
pub const DEFAULT_LINK_CAPACITY: u64 = 155_520_000;

/// A packet and byte counter pair
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Counter {
    pub packets: u64,
    pub bytes: u64,
}

impl Counter {
    #[inline]
    fn add(&mut self, size: u16) {
        self.packets += 1;
        self.bytes += u64::from(size);
    }

    fn merge(&mut self, other: &Counter) {
        self.packets += other.packets;
        self.bytes += other.bytes;
    }
}

fn merge_histogram<K: Ord + Copy>(into: &mut BTreeMap<K, u64>, from: &BTreeMap<K, u64>) {
    for (k, v) in from {
        *into.entry(*k).or_insert(0) += v;
    }
}

/// Per-category counters and packet size histogram
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StatBucket {
    counters: [Counter; Category::COUNT],
    sizes: BTreeMap<u16, u64>,
}

impl StatBucket {
    /// Count one packet of `size` bytes in `category`
    #[inline]
    pub fn record(&mut self, category: Category, size: u16) {
        self.counters[category.index()].add(size);
    }

    /// Count one packet in all the categories it matched, and in the size histogram
    pub fn record_packet(&mut self, categories: CategorySet, size: u16) {
        for category in categories.iter() {
            self.record(category, size);
        }
        self.record_size(size);
    }

    #[inline]
    fn record_size(&mut self, size: u16) {
        *self.sizes.entry(size).or_insert(0) += 1;
    }

    pub fn counter(&self, category: Category) -> Counter {
        self.counters[category.index()]
    }

    pub fn packets(&self, category: Category) -> u64 {
        self.counters[category.index()].packets
    }

    pub fn bytes(&self, category: Category) -> u64 {
        self.counters[category.index()].bytes
    }

    /// Packet size histogram (size in bytes → count)
    pub fn sizes(&self) -> &BTreeMap<u16, u64> {
        &self.sizes
    }

    /// The counters as `("<Category> Packets", n)` and `("<Category> Bytes", n)` pairs, in
    /// report order
    pub fn counters(&self) -> impl Iterator<Item = (String, u64)> + '_ {
        Category::ALL.into_iter().flat_map(move |c| {
            let counter = self.counter(c);
            [
                (format!("{} Packets", c.name()), counter.packets),
                (format!("{} Bytes", c.name()), counter.bytes),
            ]
        })
    }

    pub fn merge(&mut self, other: &StatBucket) {
        for (mine, theirs) in self.counters.iter_mut().zip(other.counters.iter()) {
            mine.merge(theirs);
        }
        merge_histogram(&mut self.sizes, &other.sizes);
    }
}

impl Serialize for StatBucket {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(2 * Category::COUNT + 1))?;
        for (name, value) in self.counters() {
            map.serialize_entry(&name, &value)?;
        }
        map.serialize_entry("Packet Sizes", &self.sizes)?;
        map.end()
    }
}

/// TCP acknowledgment, SYN and window statistics
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct TcpStats {
    pub total_acks: u64,
    pub cumulative_acks: u64,
    pub pure_acks: u64,
    pub options_acks: u64,
    /// Header length of ACKs with options → count
    pub ack_option_sizes: BTreeMap<u8, u64>,
    /// Header length of SYNs → count
    pub syns: BTreeMap<u8, u64>,
    /// Header length of SYN/ACKs → count
    pub syn_acks: BTreeMap<u8, u64>,
    pub syns_with_payload: u64,
    /// Window advertised by all SYNs → count
    pub rwnd: BTreeMap<u16, u64>,
    /// Window advertised by option-free SYNs → count
    pub awnd: BTreeMap<u16, u64>,
    /// Segments whose timestamp had to be perturbed to be indexed
    pub concurrent_segments: u64,
}

impl TcpStats {
    pub fn record(&mut self, class: &TcpClass) {
        if let Some(syn) = class.syn {
            *self.syns.entry(class.header_len).or_insert(0) += 1;
            if syn.ack {
                *self.syn_acks.entry(class.header_len).or_insert(0) += 1;
            }
            if syn.with_payload {
                self.syns_with_payload += 1;
            }
            *self.rwnd.entry(class.window).or_insert(0) += 1;
            if syn.hard_window {
                *self.awnd.entry(class.window).or_insert(0) += 1;
            }
        }
        if let Some(ack) = class.ack {
            self.total_acks += 1;
            match ack {
                AckClass::Cumulative { pure } => {
                    self.cumulative_acks += 1;
                    if pure {
                        self.pure_acks += 1;
                    }
                }
                AckClass::Options => {
                    self.options_acks += 1;
                    *self.ack_option_sizes.entry(class.header_len).or_insert(0) += 1;
                }
                AckClass::Short => (),
            }
        }
    }

    pub fn merge(&mut self, other: &TcpStats) {
        self.total_acks += other.total_acks;
        self.cumulative_acks += other.cumulative_acks;
        self.pure_acks += other.pure_acks;
        self.options_acks += other.options_acks;
        merge_histogram(&mut self.ack_option_sizes, &other.ack_option_sizes);
        merge_histogram(&mut self.syns, &other.syns);
        merge_histogram(&mut self.syn_acks, &other.syn_acks);
        self.syns_with_payload += other.syns_with_payload;
        merge_histogram(&mut self.rwnd, &other.rwnd);
        merge_histogram(&mut self.awnd, &other.awnd);
        self.concurrent_segments += other.concurrent_segments;
    }
}

/// Statistics of a single interface
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct InterfaceSummary {
    pub interface: u8,
    /// Normalized timestamp of the last packet seen on this interface
    pub ends: f64,
    #[serde(rename = "IP")]
    pub ip: StatBucket,
    /// Protocol name → statistics
    pub transport: BTreeMap<String, StatBucket>,
    #[serde(rename = "TCP")]
    pub tcp: TcpStats,
}

impl InterfaceSummary {
    pub fn new(interface: u8) -> InterfaceSummary {
        InterfaceSummary {
            interface,
            ends: 0.0,
            ip: StatBucket::default(),
            transport: BTreeMap::new(),
            tcp: TcpStats::default(),
        }
    }

    /// Time between the first packet of the trace and the last packet on this interface
    pub fn duration(&self) -> f64 {
        self.ends
    }

    pub fn transport(&self, protocol: &str) -> Option<&StatBucket> {
        self.transport.get(protocol)
    }

    fn transport_mut(&mut self, protocol: &str) -> &mut StatBucket {
        self.transport.entry(protocol.to_owned()).or_default()
    }
}

/// Whether the TCP traffic of a trace flows in one direction only
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub enum Directionality {
    /// Not determined, flow extraction was not requested
    #[default]
    Unknown,
    Unidirectional,
    Bidirectional,
}

/// Statistics of a trace, aggregated over all interfaces
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct TraceSummary {
    pub filename: PathBuf,
    /// Set by the report writer
    pub summary_filename: Option<PathBuf>,
    /// Raw timestamp of the first record, in seconds since the epoch
    pub starts: f64,
    /// Normalized timestamp of the last record
    pub ends: f64,
    pub records: u64,
    /// Interface numbers, sorted
    pub interfaces: Vec<u8>,
    pub unidirectional: Directionality,
    /// Link capacity, in bits per second
    pub link_capacity: u64,
    #[serde(rename = "IP")]
    pub ip: StatBucket,
    pub transport: BTreeMap<String, StatBucket>,
    #[serde(rename = "TCP")]
    pub tcp: TcpStats,
    pub per_interface: BTreeMap<u8, InterfaceSummary>,
}

impl TraceSummary {
    pub fn new<P: AsRef<Path>>(filename: P, records: u64, link_capacity: u64) -> TraceSummary {
        TraceSummary {
            filename: filename.as_ref().to_path_buf(),
            summary_filename: None,
            starts: 0.0,
            ends: 0.0,
            records,
            interfaces: Vec::new(),
            unidirectional: Directionality::Unknown,
            link_capacity,
            ip: StatBucket::default(),
            transport: BTreeMap::new(),
            tcp: TcpStats::default(),
            per_interface: BTreeMap::new(),
        }
    }

    /// Discard all statistics, keeping the file name, record count and link capacity
    pub fn reset(&mut self) {
        *self = TraceSummary::new(&self.filename, self.records, self.link_capacity);
    }

    /// Statistics of an interface, created on first use
    pub fn interface_mut(&mut self, interface: u8) -> &mut InterfaceSummary {
        self.per_interface
            .entry(interface)
            .or_insert_with(|| InterfaceSummary::new(interface))
    }

    /// Count one packet of `size` bytes in `category`, for both the IP bucket and the
    /// transport protocol bucket of `interface`
    pub fn record(&mut self, interface: u8, protocol: &str, category: Category, size: u16) {
        let stats = self.interface_mut(interface);
        stats.ip.record(category, size);
        stats.transport_mut(protocol).record(category, size);
    }

    /// Count one packet in all the categories it matched, and in the size histograms
    pub fn record_packet(
        &mut self,
        interface: u8,
        protocol: &str,
        categories: CategorySet,
        size: u16,
    ) {
        for category in categories.iter() {
            self.record(interface, protocol, category, size);
        }
        let stats = self.interface_mut(interface);
        stats.ip.record_size(size);
        stats.transport_mut(protocol).record_size(size);
    }

    pub fn record_tcp(&mut self, interface: u8, class: &TcpClass) {
        self.interface_mut(interface).tcp.record(class);
    }

    /// Sum the per-interface statistics into the aggregate view, and check that every record
    /// was counted in exactly one transport protocol
    pub fn finalize(&mut self) -> Result<(), TshError> {
        self.ip = StatBucket::default();
        self.transport.clear();
        self.tcp = TcpStats::default();
        for stats in self.per_interface.values() {
            self.ip.merge(&stats.ip);
            for (name, bucket) in &stats.transport {
                self.transport.entry(name.clone()).or_default().merge(bucket);
            }
            self.tcp.merge(&stats.tcp);
        }
        self.interfaces = self.per_interface.keys().copied().collect();
        self.interfaces.sort_unstable();

        let counted: u64 = self
            .transport
            .values()
            .map(|b| b.packets(Category::Total))
            .sum();
        if counted != self.records {
            return Err(TshError::Inconsistent {
                counted,
                records: self.records,
            });
        }
        Ok(())
    }

    pub fn interface_count(&self) -> usize {
        self.interfaces.len()
    }

    pub fn interface(&self, interface: u8) -> Option<&InterfaceSummary> {
        self.per_interface.get(&interface)
    }

    pub fn transport(&self, protocol: &str) -> Option<&StatBucket> {
        self.transport.get(protocol)
    }

    /// Trace duration, in seconds
    pub fn duration(&self) -> f64 {
        self.ends
    }

    /// Mean IP bit rate over the trace duration
    pub fn mean_rate_bps(&self) -> Option<f64> {
        let duration = self.duration();
        if duration <= 0.0 {
            return None;
        }
        Some(self.ip.bytes(Category::Total) as f64 * 8.0 / duration)
    }

    /// Mean bit rate as a fraction of the link capacity
    pub fn utilization(&self) -> Option<f64> {
        if self.link_capacity == 0 {
            return None;
        }
        self.mean_rate_bps()
            .map(|rate| rate / self.link_capacity as f64)
    }
}
