//! # TSH trace parser and statistics
//!
//! This crate reads packet traces in the TSH (time-sequenced header) format and computes
//! aggregate protocol statistics over them.
//!
//! A TSH trace is a headerless sequence of fixed 44-byte records. Each record carries a
//! timestamp, the number of the capturing interface, the IPv4 header and the beginning of
//! the TCP header. Records are decoded with [`parse_tsh_record`], read from files or streams
//! with [`TshReader`], or from memory with [`TshSlice`].
//!
//! # Example: trace statistics
//!
//! [`TraceProcessor`] reads a whole trace, classifies every packet (fragmentation flags,
//! DiffServ class, ECN bits, IP options, TCP acknowledgment and SYN characteristics) and
//! returns a [`TraceSummary`] with per-interface and aggregate counters.
//!
//! ```rust
//! use tsh_analyzer::*;
//!
//! # let path = "assets/sample.tsh";
//! let processor = TraceProcessor::with_iana().expect("protocol table");
//! let options = TraceOptions::default().with_flow_extraction(true);
//! match processor.process_trace(path, &options) {
//!     Ok(outcome) => {
//!         let summary = outcome.summary();
//!         for (name, bucket) in &summary.transport {
//!             println!("{}: {} packets", name, bucket.packets(Category::Total));
//!         }
//!         if let Some(flows) = outcome.flows() {
//!             println!("{} senders", flows.senders.flow_count());
//!         }
//!     }
//!     Err(e) => panic!("error while processing: {}", e),
//! }
//! ```
//!
//! # Example: streaming parser
//!
//! ```rust
//! use tsh_analyzer::*;
//! use std::fs::File;
//!
//! # let path = "assets/sample.tsh";
//! let file = File::open(path).unwrap();
//! let mut reader = TshReader::new(65536, file);
//! let mut tcp = 0;
//! loop {
//!     match reader.next() {
//!         Ok((offset, record)) => {
//!             if record.is_tcp() {
//!                 tcp += 1;
//!             }
//!             reader.consume(offset);
//!         }
//!         Err(TshError::Eof) => break,
//!         Err(TshError::Incomplete(_)) => reader.refill().unwrap(),
//!         Err(e) => panic!("error while reading: {:?}", e),
//!     }
//! }
//! println!("TCP records: {}", tcp);
//! ```

mod error;
mod utils;
pub use error::*;
pub use utils::format_address;

mod protocol;
mod record;
pub use protocol::*;
pub use record::*;

mod capture;
mod reader;
pub use capture::*;
pub use reader::*;

pub mod classify;
pub use classify::{Category, CategorySet};

mod dump;
mod flows;
mod summary;
pub use dump::*;
pub use flows::*;
pub use summary::*;

mod processor;
pub use processor::*;

#[cfg(feature = "serialize")]
mod serialize;
#[cfg(feature = "serialize")]
pub use serialize::*;
