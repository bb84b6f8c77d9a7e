use std::collections::HashMap;
use std::fs;
use std::path::Path;

use rusticata_macros::newtype_enum;
use serde::Serialize;

use crate::error::TshError;

/// IP protocol number
///
/// The value of the `protocol` field of the IPv4 header. Names for display in reports come
/// from a [`ProtocolTable`]; the constants here are the protocols the classifier needs to
/// recognize.
///
/// See <https://www.iana.org/assignments/protocol-numbers>
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize)]
pub struct IpProtocol(pub u8);

newtype_enum! {
impl display IpProtocol {
    ICMP = 1,
    IGMP = 2,
    TCP = 6,
    UDP = 17,
    GRE = 47,
    ESP = 50,
    SCTP = 132,
}
}

/// Name given to protocol numbers missing from the table
pub const UNKNOWN_PROTOCOL: &str = "Unknown";

static IANA_PROTOCOL_NUMBERS: &str = include_str!("../assets/protocol-numbers.txt");

/// Mapping from protocol number to protocol name
///
/// The table is read from a text resource made of `<decimal-number> <name>` lines. Empty
/// lines and lines starting with `#` are ignored. It is meant to be loaded once and shared by
/// reference afterwards.
#[derive(Clone, Debug)]
pub struct ProtocolTable {
    names: HashMap<u8, String>,
}

impl ProtocolTable {
    /// Parse a protocol table
    ///
    /// A number defined twice is an error, as is a line without a valid number and a name.
    pub fn parse(text: &str) -> Result<ProtocolTable, TshError> {
        let mut names = HashMap::new();
        for (idx, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (number, name) = line
                .split_once(char::is_whitespace)
                .ok_or(TshError::ProtocolTableSyntax(idx + 1))?;
            let number: u8 = number
                .parse()
                .map_err(|_| TshError::ProtocolTableSyntax(idx + 1))?;
            let name = name.trim();
            if name.is_empty() {
                return Err(TshError::ProtocolTableSyntax(idx + 1));
            }
            if names.insert(number, name.to_owned()).is_some() {
                return Err(TshError::DuplicateProtocol(number));
            }
        }
        Ok(ProtocolTable { names })
    }

    /// Load a protocol table from a file
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<ProtocolTable, TshError> {
        let text = fs::read_to_string(path)?;
        ProtocolTable::parse(&text)
    }

    /// The IANA protocol numbers bundled with this crate
    pub fn iana() -> Result<ProtocolTable, TshError> {
        ProtocolTable::parse(IANA_PROTOCOL_NUMBERS)
    }

    /// Name of a protocol, or `"Unknown"` if the number is not in the table
    pub fn name(&self, protocol: IpProtocol) -> &str {
        self.names
            .get(&protocol.0)
            .map(String::as_str)
            .unwrap_or(UNKNOWN_PROTOCOL)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
