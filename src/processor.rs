//! Trace processing
//!
//! [`TraceProcessor::process_trace`] reads a trace record by record, classifies every packet
//! and accumulates the results in a [`TraceSummary`]. On request it also writes a text dump
//! of the TCP records and builds the per-flow [`FlowIndices`].
//!
//! ```rust
//! use tsh_analyzer::*;
//!
//! # let path = "assets/sample.tsh";
//! let processor = TraceProcessor::with_iana().expect("protocol table");
//! let options = TraceOptions::default();
//! let outcome = processor.process_trace(path, &options).expect("processing failed");
//! let summary = outcome.summary();
//! println!("{} packets", summary.ip.packets(Category::Total));
//! ```

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use log::{debug, trace, warn};

use crate::classify::{classify_ip, classify_tcp, header_class, HeaderClass};
use crate::dump::DumpWriter;
use crate::error::TshError;
use crate::flows::{FlowIndices, FlowKey, Segment, SegmentStamp};
use crate::protocol::ProtocolTable;
use crate::reader::{records_in, TshReader};
use crate::record::{TshRecord, MICROS_PER_SEC};
use crate::summary::{Directionality, TraceSummary, DEFAULT_LINK_CAPACITY};

/// Default capacity of the reader buffer
pub const DEFAULT_BUFFER_CAPACITY: usize = 64 * 1024;

/// Options of a trace processing run
#[derive(Clone, Debug)]
pub struct TraceOptions {
    /// Link capacity, in bits per second
    pub link_capacity: u64,
    /// Write a text dump of the TCP records to this file
    pub dump: Option<PathBuf>,
    /// Build the sender and segment indices. Timestamps must then be monotonic.
    pub flow_extraction: bool,
    pub buffer_capacity: usize,
}

impl Default for TraceOptions {
    fn default() -> Self {
        TraceOptions {
            link_capacity: DEFAULT_LINK_CAPACITY,
            dump: None,
            flow_extraction: false,
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
        }
    }
}

impl TraceOptions {
    pub fn with_link_capacity(mut self, bps: u64) -> Self {
        self.link_capacity = bps;
        self
    }

    pub fn with_dump<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.dump = Some(path.into());
        self
    }

    pub fn with_flow_extraction(mut self, enabled: bool) -> Self {
        self.flow_extraction = enabled;
        self
    }

    pub fn with_buffer_capacity(mut self, capacity: usize) -> Self {
        self.buffer_capacity = capacity;
        self
    }
}

/// Result of a trace processing run
#[derive(Clone, Debug, PartialEq)]
pub enum TraceOutcome {
    /// Statistics only
    Summary(TraceSummary),
    /// Statistics and flow indices, when flow extraction was requested
    WithFlows(TraceSummary, FlowIndices),
}

impl TraceOutcome {
    pub fn summary(&self) -> &TraceSummary {
        match self {
            TraceOutcome::Summary(summary) | TraceOutcome::WithFlows(summary, _) => summary,
        }
    }

    pub fn flows(&self) -> Option<&FlowIndices> {
        match self {
            TraceOutcome::Summary(_) => None,
            TraceOutcome::WithFlows(_, flows) => Some(flows),
        }
    }

    pub fn into_parts(self) -> (TraceSummary, Option<FlowIndices>) {
        match self {
            TraceOutcome::Summary(summary) => (summary, None),
            TraceOutcome::WithFlows(summary, flows) => (summary, Some(flows)),
        }
    }
}

/// Trace processing engine
///
/// Holds the protocol table, which is loaded once and shared by all runs. Each call to
/// [`process_trace`](TraceProcessor::process_trace) starts from empty statistics.
pub struct TraceProcessor {
    protocols: ProtocolTable,
}

impl TraceProcessor {
    pub fn new(protocols: ProtocolTable) -> TraceProcessor {
        TraceProcessor { protocols }
    }

    /// Processor using the bundled IANA protocol table
    pub fn with_iana() -> Result<TraceProcessor, TshError> {
        Ok(TraceProcessor::new(ProtocolTable::iana()?))
    }

    pub fn protocols(&self) -> &ProtocolTable {
        &self.protocols
    }

    /// Process a trace file
    ///
    /// The file size is checked before anything is read. Any error aborts the run, and no
    /// statistics are returned: the input and dump files are closed on all paths.
    pub fn process_trace<P: AsRef<Path>>(
        &self,
        path: P,
        options: &TraceOptions,
    ) -> Result<TraceOutcome, TshError> {
        let path = path.as_ref();
        let records = records_in(path)?;
        let file = File::open(path)?;
        debug!(
            "{}: {} records, link capacity {} bps",
            path.display(),
            records,
            options.link_capacity
        );

        let mut state = TraceState::new(&self.protocols, path, records, options)?;
        let mut reader = TshReader::new(options.buffer_capacity, file);
        loop {
            match reader.next() {
                Ok((offset, record)) => {
                    state.process_record(&record)?;
                    reader.consume(offset);
                }
                Err(TshError::Eof) => break,
                Err(TshError::Incomplete(_)) => reader.refill()?,
                Err(e) => return Err(e),
            }
        }
        drop(reader);
        state.finish()
    }
}

/// State of one processing run
struct TraceState<'a> {
    protocols: &'a ProtocolTable,
    summary: TraceSummary,
    start_micros: Option<u64>,
    dump: Option<DumpWriter<BufWriter<File>>>,
    flows: Option<FlowIndices>,
}

impl<'a> TraceState<'a> {
    fn new(
        protocols: &'a ProtocolTable,
        path: &Path,
        records: u64,
        options: &TraceOptions,
    ) -> Result<TraceState<'a>, TshError> {
        let mut summary = TraceSummary::new(path, records, options.link_capacity);
        let dump = match &options.dump {
            Some(dump_path) => {
                debug!("writing TCP dump to {}", dump_path.display());
                Some(DumpWriter::new(BufWriter::new(File::create(dump_path)?)))
            }
            None => None,
        };
        let flows = if options.flow_extraction {
            summary.unidirectional = Directionality::Unidirectional;
            Some(FlowIndices::default())
        } else {
            None
        };
        Ok(TraceState {
            protocols,
            summary,
            start_micros: None,
            dump,
            flows,
        })
    }

    fn process_record(&mut self, record: &TshRecord) -> Result<(), TshError> {
        trace!("{:?}", record);
        let micros = record.timestamp_micros();
        let start = match self.start_micros {
            Some(start) => start,
            None => {
                self.summary.starts = record.timestamp();
                self.summary.ends = 0.0;
                self.start_micros = Some(micros);
                micros
            }
        };
        let delta = micros as i64 - start as i64;
        let timestamp = delta as f64 / f64::from(MICROS_PER_SEC);
        if timestamp < self.summary.ends {
            if self.flows.is_some() {
                return Err(TshError::NonMonotonicTimestamp {
                    previous: self.summary.ends,
                    current: timestamp,
                });
            }
            warn!(
                "{}: timestamp {:.6} precedes previous timestamp {:.6}",
                self.summary.filename.display(),
                timestamp,
                self.summary.ends
            );
        } else {
            self.summary.ends = timestamp;
        }

        if record.ip_version() != 4 {
            warn!(
                "unexpected IP version {} at {:.6} on interface {}",
                record.ip_version(),
                timestamp,
                record.interface
            );
        }
        if header_class(record.ihl()) == HeaderClass::Short {
            warn!(
                "IP header length {} too short at {:.6} on interface {}",
                record.ihl(),
                timestamp,
                record.interface
            );
        }

        let interface = record.interface;
        let protocols = self.protocols;
        let protocol = protocols.name(record.protocol);
        self.summary
            .record_packet(interface, protocol, classify_ip(record), record.total_length);
        let stats = self.summary.interface_mut(interface);
        if timestamp > stats.ends {
            stats.ends = timestamp;
        }

        if record.is_tcp() {
            self.process_tcp(record, delta, timestamp)?;
        }
        Ok(())
    }

    fn process_tcp(
        &mut self,
        record: &TshRecord,
        delta: i64,
        timestamp: f64,
    ) -> Result<(), TshError> {
        let interface = record.interface;
        let class = classify_tcp(record);
        if class.raw_payload_len < 0 {
            warn!(
                "negative TCP payload length {} at {:.6} on interface {}",
                class.raw_payload_len, timestamp, interface
            );
        }
        if header_class(class.header_len) == HeaderClass::Short {
            warn!(
                "TCP header length {} too short at {:.6} on interface {}",
                class.header_len, timestamp, interface
            );
        }
        self.summary.record_tcp(interface, &class);

        if let Some(dump) = &mut self.dump {
            dump.write_record(timestamp, record)?;
        }

        let payload_len = class.payload_len();
        if payload_len == 0 {
            return Ok(());
        }
        if let Some(flows) = &mut self.flows {
            // timestamps are monotonic here, so delta is not negative
            let stamp = SegmentStamp::from_micros(delta.max(0) as u64);
            let segment = Segment {
                length: payload_len,
                sequence_number: record.sequence_number,
                retransmitted: false,
            };
            let (stamp, collisions) = flows.segments.insert(interface, stamp, segment)?;
            if collisions > 0 {
                warn!(
                    "{} segments at timestamp {:.6} on interface {}, indexed as {}",
                    collisions + 1,
                    timestamp,
                    interface,
                    stamp
                );
                self.summary.interface_mut(interface).tcp.concurrent_segments += 1;
            }

            let key = FlowKey::from_record(record);
            if self.summary.unidirectional == Directionality::Unidirectional
                && flows.senders.contains(interface, &key.reverse())
            {
                debug!(
                    "traffic is bidirectional: {} has a reverse flow on interface {}",
                    key, interface
                );
                self.summary.unidirectional = Directionality::Bidirectional;
            }
            flows.senders.insert(interface, key, stamp);
        }
        Ok(())
    }

    fn finish(mut self) -> Result<TraceOutcome, TshError> {
        if let Some(dump) = self.dump.take() {
            let lines = dump.lines();
            dump.finish()?;
            debug!("wrote {} dump lines", lines);
        }
        self.summary.finalize()?;
        debug!(
            "{}: {} interfaces, {:.6} s",
            self.summary.filename.display(),
            self.summary.interface_count(),
            self.summary.duration()
        );
        match self.flows {
            Some(flows) => {
                debug!(
                    "{} flows, {} segments, {:?}",
                    flows.senders.flow_count(),
                    flows.segments.len(),
                    self.summary.unidirectional
                );
                Ok(TraceOutcome::WithFlows(self.summary, flows))
            }
            None => Ok(TraceOutcome::Summary(self.summary)),
        }
    }
}
