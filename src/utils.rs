use std::net::Ipv4Addr;

/// Format an IPv4 address given as a host-order integer in dotted-decimal notation
///
/// ```rust
/// use tsh_analyzer::format_address;
///
/// assert_eq!(format_address(167_772_172), "10.0.0.12");
/// ```
#[inline]
pub fn format_address(address: u32) -> String {
    Ipv4Addr::from(address).to_string()
}

#[cfg(test)]
mod tests {
    use super::format_address;

    #[test]
    fn dotted_decimal() {
        assert_eq!(format_address(167_772_172), "10.0.0.12");
        assert_eq!(format_address(2_614_034_432), "155.207.0.0");
        assert_eq!(format_address(0), "0.0.0.0");
        assert_eq!(format_address(u32::MAX), "255.255.255.255");
    }
}
