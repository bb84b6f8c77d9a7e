//! Per-flow segment indices
//!
//! When flow extraction is requested, every TCP segment carrying payload is indexed twice:
//! by sender in the [`SenderIndex`], and by timestamp in the [`SegmentIndex`]. Both are keyed
//! by interface first, since traces captured on different links are independent.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use serde::ser::Serializer;
use serde::Serialize;

use crate::error::TshError;
use crate::record::{TshRecord, MICROS_PER_SEC};
use crate::utils::format_address;

/// Number of timestamp collisions after which a segment cannot be indexed
pub const TIMESTAMP_COLLISION_THRESHOLD: usize = 3;

/// Sender of a segment: source and destination addresses and ports
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FlowKey {
    pub source_address: u32,
    pub source_port: u16,
    pub destination_address: u32,
    pub destination_port: u16,
}

impl FlowKey {
    pub fn from_record(record: &TshRecord) -> FlowKey {
        FlowKey {
            source_address: record.source_address,
            source_port: record.source_port,
            destination_address: record.destination_address,
            destination_port: record.destination_port,
        }
    }

    /// The same flow, seen from the other end
    pub fn reverse(self) -> FlowKey {
        FlowKey {
            source_address: self.destination_address,
            source_port: self.destination_port,
            destination_address: self.source_address,
            destination_port: self.source_port,
        }
    }
}

impl fmt::Display for FlowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{} > {}.{}",
            format_address(self.source_address),
            self.source_port,
            format_address(self.destination_address),
            self.destination_port
        )
    }
}

impl Serialize for FlowKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Normalized timestamp of an indexed segment
///
/// The decimal text is the identity of the stamp: when two segments share a timestamp on one
/// interface, the later one gets a `1` digit appended to its text. Since timestamps have
/// microsecond resolution, a perturbed stamp sorts after the original and before the next
/// possible timestamp.
#[derive(Clone, Debug)]
pub struct SegmentStamp {
    text: String,
    value: f64,
}

impl SegmentStamp {
    /// Stamp for a timestamp given in microseconds
    pub fn from_micros(micros: u64) -> SegmentStamp {
        let per_sec = u64::from(MICROS_PER_SEC);
        SegmentStamp {
            text: format!("{}.{:06}", micros / per_sec, micros % per_sec),
            value: micros as f64 / f64::from(MICROS_PER_SEC),
        }
    }

    /// The stamp with a `1` digit appended
    pub fn perturbed(&self) -> SegmentStamp {
        let text = format!("{}1", self.text);
        let value = text.parse().unwrap_or(self.value);
        SegmentStamp { text, value }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Timestamp in seconds
    pub fn value(&self) -> f64 {
        self.value
    }
}

impl PartialEq for SegmentStamp {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for SegmentStamp {}

impl PartialOrd for SegmentStamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SegmentStamp {
    fn cmp(&self, other: &Self) -> Ordering {
        self.value
            .total_cmp(&other.value)
            .then_with(|| self.text.cmp(&other.text))
    }
}

impl fmt::Display for SegmentStamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl Serialize for SegmentStamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.text)
    }
}

/// An indexed TCP segment
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Segment {
    /// Payload length, in bytes
    pub length: u32,
    pub sequence_number: u32,
    /// Set by retransmission analysis, always false when indexed
    pub retransmitted: bool,
}

/// Interface → sender → timestamps of the segments it sent, in trace order
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct SenderIndex(BTreeMap<u8, BTreeMap<FlowKey, Vec<SegmentStamp>>>);

impl SenderIndex {
    /// Append a segment timestamp to the sender's list
    pub fn insert(&mut self, interface: u8, key: FlowKey, stamp: SegmentStamp) {
        self.0
            .entry(interface)
            .or_default()
            .entry(key)
            .or_default()
            .push(stamp);
    }

    pub fn contains(&self, interface: u8, key: &FlowKey) -> bool {
        self.0
            .get(&interface)
            .map_or(false, |flows| flows.contains_key(key))
    }

    pub fn get(&self, interface: u8, key: &FlowKey) -> Option<&[SegmentStamp]> {
        self.0
            .get(&interface)
            .and_then(|flows| flows.get(key))
            .map(Vec::as_slice)
    }

    pub fn interface(&self, interface: u8) -> Option<&BTreeMap<FlowKey, Vec<SegmentStamp>>> {
        self.0.get(&interface)
    }

    pub fn interfaces(&self) -> impl Iterator<Item = u8> + '_ {
        self.0.keys().copied()
    }

    /// Number of senders, over all interfaces
    pub fn flow_count(&self) -> usize {
        self.0.values().map(BTreeMap::len).sum()
    }
}

/// Interface → timestamp → segment
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct SegmentIndex(BTreeMap<u8, BTreeMap<SegmentStamp, Segment>>);

impl SegmentIndex {
    /// Index a segment
    ///
    /// If the stamp is taken on this interface, it is perturbed and retried. Returns the
    /// stamp under which the segment was stored and the number of collisions met, or
    /// `TooManyCollisions` when [`TIMESTAMP_COLLISION_THRESHOLD`] collisions are reached.
    pub fn insert(
        &mut self,
        interface: u8,
        stamp: SegmentStamp,
        segment: Segment,
    ) -> Result<(SegmentStamp, usize), TshError> {
        let segments = self.0.entry(interface).or_default();
        let mut stamp = stamp;
        let mut collisions = 0;
        while segments.contains_key(&stamp) {
            collisions += 1;
            if collisions >= TIMESTAMP_COLLISION_THRESHOLD {
                return Err(TshError::TooManyCollisions {
                    interface,
                    timestamp: stamp.text,
                });
            }
            stamp = stamp.perturbed();
        }
        segments.insert(stamp.clone(), segment);
        Ok((stamp, collisions))
    }

    pub fn get(&self, interface: u8, stamp: &SegmentStamp) -> Option<&Segment> {
        self.0.get(&interface).and_then(|segments| segments.get(stamp))
    }

    pub fn interface(&self, interface: u8) -> Option<&BTreeMap<SegmentStamp, Segment>> {
        self.0.get(&interface)
    }

    /// Flag a segment as retransmitted. Returns false if there is no such segment.
    pub fn mark_retransmitted(&mut self, interface: u8, stamp: &SegmentStamp) -> bool {
        match self
            .0
            .get_mut(&interface)
            .and_then(|segments| segments.get_mut(stamp))
        {
            Some(segment) => {
                segment.retransmitted = true;
                true
            }
            None => false,
        }
    }

    /// Number of segments, over all interfaces
    pub fn len(&self) -> usize {
        self.0.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Indices built by flow extraction
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct FlowIndices {
    pub senders: SenderIndex,
    pub segments: SegmentIndex,
}
