use crate::error::TshError;
use crate::record::{parse_tsh_record, TshRecord, TSH_RECORD_LEN};
use circular::Buffer;
use nom::{Needed, Offset};
use std::fs;
use std::io::Read;
use std::path::Path;

/// Number of records in a TSH file, computed from its size
///
/// A trace has no header, so every byte belongs to a record: a size that is not a multiple of
/// [`TSH_RECORD_LEN`] means the file is corrupt.
pub fn records_in<P: AsRef<Path>>(path: P) -> Result<u64, TshError> {
    let path = path.as_ref();
    let size = fs::metadata(path)?.len();
    if size % TSH_RECORD_LEN as u64 != 0 {
        return Err(TshError::CorruptTrace {
            path: path.to_path_buf(),
            size,
        });
    }
    Ok(size / TSH_RECORD_LEN as u64)
}

/// Parsing iterator over TSH data (streaming version)
///
/// This reader is a streaming parser based on a circular buffer, which means memory usage is
/// constant, and that it can be used to parse huge files. It creates an abstraction over any
/// input providing the `Read` trait, and takes care of managing the circular buffer to provide
/// an iterator-like interface.
///
/// Each call to `next` returns the size of the record and the decoded record. The record is a
/// copy, so it stays valid after `consume` or `refill`, but `consume` must be called before
/// asking for the next one.
///
/// ## Example
///
/// ```rust
/// use tsh_analyzer::*;
/// use std::fs::File;
///
/// # let path = "assets/sample.tsh";
/// let file = File::open(path).unwrap();
/// let mut num_records = 0;
/// let mut reader = TshReader::new(65536, file);
/// loop {
///     match reader.next() {
///         Ok((offset, record)) => {
///             num_records += 1;
///             let _ = record.interface;
///             reader.consume(offset);
///         },
///         Err(TshError::Eof) => break,
///         Err(TshError::Incomplete(_)) => {
///             reader.refill().unwrap();
///         },
///         Err(e) => panic!("error while reading: {:?}", e),
///     }
/// }
/// println!("num_records: {}", num_records);
/// ```
pub struct TshReader<R>
where
    R: Read,
{
    reader: R,
    buffer: Buffer,
    consumed: usize,
    reader_exhausted: bool,
}

impl<R> TshReader<R>
where
    R: Read,
{
    /// Creates a new `TshReader<R>` with the provided buffer capacity.
    ///
    /// Nothing is read until the first `refill`.
    pub fn new(capacity: usize, reader: R) -> TshReader<R> {
        let buffer = Buffer::with_capacity(capacity.max(TSH_RECORD_LEN));
        Self::from_buffer(buffer, reader)
    }

    /// Creates a new `TshReader<R>` using the provided `Buffer`.
    pub fn from_buffer(buffer: Buffer, reader: R) -> TshReader<R> {
        TshReader {
            reader,
            buffer,
            consumed: 0,
            reader_exhausted: false,
        }
    }

    /// Get the next record, if possible. Returns the number of bytes read and the record.
    pub fn next(&mut self) -> Result<(usize, TshRecord), TshError> {
        // Return EOF if
        // 1) all bytes have been read
        // 2) no more data is available
        if self.buffer.available_data() == 0 && self.reader_exhausted {
            return Err(TshError::Eof);
        }
        let data = self.buffer.data();
        match parse_tsh_record(data) {
            Ok((rem, record)) => {
                let offset = data.offset(rem);
                Ok((offset, record))
            }
            Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => Err(e),
            Err(nom::Err::Incomplete(n)) => {
                if self.reader_exhausted {
                    // expected more bytes but reader is EOF, truncated trace?
                    Err(TshError::UnexpectedEof)
                } else {
                    match n {
                        Needed::Size(n) => {
                            if self.buffer.available_data() + usize::from(n)
                                > self.buffer.capacity()
                            {
                                Err(TshError::BufferTooSmall)
                            } else {
                                Err(TshError::Incomplete(n.into()))
                            }
                        }
                        Needed::Unknown => Err(TshError::Incomplete(0)),
                    }
                }
            }
        }
    }

    /// Consume data, and shift buffer if needed.
    pub fn consume(&mut self, offset: usize) {
        self.consumed += offset;
        self.buffer.consume(offset);
    }

    /// Get the number of consumed bytes
    pub fn consumed(&self) -> usize {
        self.consumed
    }

    /// Refill the internal buffer, shifting it if necessary.
    pub fn refill(&mut self) -> Result<(), TshError> {
        self.buffer.shift();
        let space = self.buffer.space();
        // check if available space is empty, so we can distinguish
        // a read() returning 0 because of EOF or because we requested 0
        if space.is_empty() {
            return Ok(());
        }
        let sz = self.reader.read(space).or(Err(TshError::ReadError))?;
        self.reader_exhausted = sz == 0;
        self.buffer.fill(sz);
        Ok(())
    }

    /// Returns true if underlying reader is exhausted
    ///
    /// Note that exhausted reader only means that next `refill` will not
    /// add any data, but there can still be data not consumed in the current buffer.
    pub fn reader_exhausted(&self) -> bool {
        self.reader_exhausted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::tests::RECORD_SYN_ACK;

    fn read_all<R: Read>(mut reader: TshReader<R>) -> Result<Vec<TshRecord>, TshError> {
        let mut records = Vec::new();
        loop {
            match reader.next() {
                Ok((offset, record)) => {
                    records.push(record);
                    reader.consume(offset);
                }
                Err(TshError::Eof) => return Ok(records),
                Err(TshError::Incomplete(_)) => reader.refill()?,
                Err(e) => return Err(e),
            }
        }
    }

    #[test]
    fn read_records() {
        let data: Vec<u8> = RECORD_SYN_ACK.repeat(5);
        // small buffer, so that records straddle refills
        let reader = TshReader::new(50, &data[..]);
        let records = read_all(reader).expect("read failed");
        assert_eq!(records.len(), 5);
        assert!(records.iter().all(|r| r.source_port == 80));
    }

    #[test]
    fn read_empty() {
        let empty: &[u8] = &[];
        let reader = TshReader::new(1024, empty);
        assert_eq!(read_all(reader).unwrap().len(), 0);
    }

    #[test]
    fn read_truncated() {
        let mut data: Vec<u8> = RECORD_SYN_ACK.repeat(2);
        data.truncate(70);
        let reader = TshReader::new(1024, &data[..]);
        assert!(matches!(read_all(reader), Err(TshError::UnexpectedEof)));
    }

    #[test]
    fn consumed_bytes() {
        let data: Vec<u8> = RECORD_SYN_ACK.repeat(2);
        let mut reader = TshReader::new(1024, &data[..]);
        reader.refill().unwrap();
        let (offset, _) = reader.next().unwrap();
        assert_eq!(offset, TSH_RECORD_LEN);
        reader.consume(offset);
        assert_eq!(reader.consumed(), TSH_RECORD_LEN);
    }
}
