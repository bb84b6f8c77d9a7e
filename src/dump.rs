//! Text dump of TCP records
//!
//! One line per TCP record, in a layout close to the classic `tcpdump` output:
//!
//! ```text
//! 0.120000000 10.0.0.12.1024 > 155.207.0.1.80: S 1000:1000(0) ack 0 win 5840
//! 0.130000000 155.207.0.1.80 > 10.0.0.12.1024: . ack 1001 win 8760
//! ```

use std::io::{self, Write};

use crate::record::TshRecord;
use crate::utils::format_address;

/// Format the dump line of a TCP record (with trailing newline)
///
/// `timestamp` is the normalized timestamp of the record, in seconds.
pub fn format_dump_line(timestamp: f64, record: &TshRecord) -> String {
    let flags = record.tcp_flags;
    let payload_len = record.tcp_payload_len().max(0) as u32;

    let mut flag_str = String::with_capacity(6);
    for (set, c) in [
        (flags.syn(), 'S'),
        (flags.fin(), 'F'),
        (flags.psh(), 'P'),
        (flags.rst(), 'R'),
        (flags.cwr(), 'C'),
        (flags.ece(), 'E'),
    ] {
        if set {
            flag_str.push(c);
        }
    }
    if flag_str.is_empty() {
        flag_str.push('.');
    }

    let mut line = format!(
        "{:.9} {}.{} > {}.{}: {} ",
        timestamp,
        format_address(record.source_address),
        record.source_port,
        format_address(record.destination_address),
        record.destination_port,
        flag_str
    );
    if payload_len > 0 || flags.syn() || flags.fin() || flags.rst() {
        line.push_str(&format!(
            "{}:{}({}) ",
            record.sequence_number,
            record.sequence_number.wrapping_add(payload_len),
            payload_len
        ));
    }
    line.push_str(&format!(
        "ack {} win {}",
        record.acknowledgment_number, record.window
    ));
    if flags.urg() {
        line.push_str(" urg 1");
    }
    line.push('\n');
    line
}

/// Writes dump lines to an output
pub struct DumpWriter<W: Write> {
    out: W,
    lines: u64,
}

impl<W: Write> DumpWriter<W> {
    pub fn new(out: W) -> DumpWriter<W> {
        DumpWriter { out, lines: 0 }
    }

    /// Append the line of a TCP record
    pub fn write_record(&mut self, timestamp: f64, record: &TshRecord) -> io::Result<()> {
        self.out
            .write_all(format_dump_line(timestamp, record).as_bytes())?;
        self.lines += 1;
        Ok(())
    }

    /// Number of lines written so far
    pub fn lines(&self) -> u64 {
        self.lines
    }

    /// Flush and return the output
    pub fn finish(mut self) -> io::Result<W> {
        self.out.flush()?;
        Ok(self.out)
    }
}
