use crate::error::TshError;
use crate::record::{parse_tsh_record, TshRecord, TSH_RECORD_LEN};
use nom::combinator::{complete, eof};
use nom::multi::many0;
use nom::sequence::terminated;
use nom::IResult;

/// Parsing iterator over TSH data (requires data to be loaded into memory)
///
/// ```rust
/// use tsh_analyzer::*;
/// use std::fs;
///
/// # let path = "assets/sample.tsh";
/// let buffer = fs::read(path).unwrap();
/// let mut num_records = 0;
/// for record in TshSlice::from_slice(&buffer) {
///     let _record = record.expect("malformed record");
///     num_records += 1;
/// }
/// assert_eq!(num_records, 1000);
/// ```
pub struct TshSlice<'a> {
    // remaining (unparsed) data
    rem: &'a [u8],
}

impl<'a> TshSlice<'a> {
    pub fn from_slice(i: &'a [u8]) -> TshSlice<'a> {
        TshSlice { rem: i }
    }

    /// Number of complete records left
    pub fn remaining(&self) -> usize {
        self.rem.len() / TSH_RECORD_LEN
    }
}

/// Iterator for TshSlice. Returns a result so parsing errors are not
/// silently ignored
impl<'a> Iterator for TshSlice<'a> {
    type Item = Result<TshRecord, TshError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.rem.is_empty() {
            return None;
        }
        let r = match parse_tsh_record(self.rem) {
            Ok((rem, record)) => {
                self.rem = rem;
                Ok(record)
            }
            Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => {
                self.rem = &[];
                Err(e)
            }
            Err(nom::Err::Incomplete(_)) => {
                self.rem = &[];
                Err(TshError::UnexpectedEof)
            }
        };
        Some(r)
    }
}

/// Parse an entire trace
///
/// Note: this requires the file to be fully loaded to memory. Trailing bytes that do not
/// form a complete record are an error.
pub fn parse_tsh(i: &[u8]) -> IResult<&[u8], Vec<TshRecord>, TshError> {
    terminated(many0(complete(parse_tsh_record)), eof)(i)
}
