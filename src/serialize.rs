use crate::record::{TshRecord, MICROS_PER_SEC, TSH_RECORD_LEN};
use cookie_factory::bytes::{be_u16, be_u24, be_u32, be_u8};
use cookie_factory::sequence::tuple;
use cookie_factory::{gen, GenError};
use std::io::{self, Write};

/// Common trait for all serialization functions
pub trait ToVec {
    /// Serialize to bytes representation (big-endian).
    /// Check values and fix all fields before serializing.
    fn to_vec(&mut self) -> Result<Vec<u8>, GenError> {
        self.fix();
        self.to_vec_raw()
    }

    /// Check and correct all fields if possible.
    fn fix(&mut self) {}

    /// Serialize to bytes representation (big-endian). Do not check values
    fn to_vec_raw(&self) -> Result<Vec<u8>, GenError>;
}

impl ToVec for TshRecord {
    /// Carry excess microseconds over into the seconds field
    fn fix(&mut self) {
        if self.microseconds >= MICROS_PER_SEC {
            self.seconds = self
                .seconds
                .wrapping_add(self.microseconds / MICROS_PER_SEC);
            self.microseconds %= MICROS_PER_SEC;
        }
    }

    fn to_vec_raw(&self) -> Result<Vec<u8>, GenError> {
        let mut v = Vec::with_capacity(TSH_RECORD_LEN);

        gen(
            tuple((
                be_u32(self.seconds),
                be_u8(self.interface),
                be_u24(self.microseconds & 0x00ff_ffff),
                be_u8(self.version_ihl),
                be_u8(self.type_of_service),
                be_u16(self.total_length),
                be_u16(self.identification),
                be_u16(self.flags_fragment_offset),
                be_u8(self.ttl),
                be_u8(self.protocol.0),
                be_u16(self.header_checksum),
                be_u32(self.source_address),
                be_u32(self.destination_address),
                be_u16(self.source_port),
                be_u16(self.destination_port),
                tuple((
                    be_u32(self.sequence_number),
                    be_u32(self.acknowledgment_number),
                    be_u8(self.data_offset_reserved),
                    be_u8(self.tcp_flags.0),
                    be_u16(self.window),
                )),
            )),
            &mut v,
        )
        .map(|res| res.0.to_vec())
    }
}

/// Writes records to a TSH trace
pub struct TshWriter<W: Write> {
    out: W,
    records: u64,
}

impl<W: Write> TshWriter<W> {
    pub fn new(out: W) -> TshWriter<W> {
        TshWriter { out, records: 0 }
    }

    /// Append a record, fixing its timestamp if needed
    pub fn write_record(&mut self, record: &TshRecord) -> io::Result<()> {
        let mut record = record.clone();
        let bytes = record
            .to_vec()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, format!("{:?}", e)))?;
        self.out.write_all(&bytes)?;
        self.records += 1;
        Ok(())
    }

    pub fn records(&self) -> u64 {
        self.records
    }

    /// Flush and return the output
    pub fn finish(mut self) -> io::Result<W> {
        self.out.flush()?;
        Ok(self.out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::parse_tsh_record;
    use crate::record::tests::RECORD_SYN_ACK;

    #[test]
    fn encode_tsh_record() {
        let (_, record) = parse_tsh_record(RECORD_SYN_ACK).unwrap();
        let bytes = record.to_vec_raw().expect("serialize");
        assert_eq!(bytes, RECORD_SYN_ACK);
    }

    #[test]
    fn fix_microseconds() {
        let (_, mut record) = parse_tsh_record(RECORD_SYN_ACK).unwrap();
        record.microseconds = 2_500_000;
        let seconds = record.seconds;
        let bytes = record.to_vec().expect("serialize");
        assert_eq!(record.seconds, seconds + 2);
        assert_eq!(record.microseconds, 500_000);
        assert_eq!(bytes.len(), TSH_RECORD_LEN);
    }

    #[test]
    fn writer() {
        let (_, record) = parse_tsh_record(RECORD_SYN_ACK).unwrap();
        let mut writer = TshWriter::new(Vec::new());
        writer.write_record(&record).unwrap();
        writer.write_record(&record).unwrap();
        assert_eq!(writer.records(), 2);
        let out = writer.finish().unwrap();
        assert_eq!(out, RECORD_SYN_ACK.repeat(2));
    }
}
