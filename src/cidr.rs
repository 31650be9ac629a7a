//! CIDR range math
//!
//! Converts a CIDR literal into the inclusive low/high addresses of the
//! block. The low bound is the address exactly as written in the feed (the
//! GeoLite2 export never sets host bits, but if one were set it would be
//! preserved); the high bound is the address with every host bit forced on.
//! All arithmetic happens in the family's own width, so an IPv4 mask is
//! never smeared across IPv6 leading bytes.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use crate::error::{GeoError, Result};

/// Address family operations needed by the range builder and search.
///
/// Implemented for `Ipv4Addr` and `Ipv6Addr`; their `Ord` is byte-wise
/// big-endian unsigned comparison, which is exactly the ordering the range
/// lists rely on. The two families never share a list.
pub trait RangeAddr:
    Copy + Ord + fmt::Debug + fmt::Display + Send + Sync + 'static
{
    /// Highest representable address of the family; also the provisional
    /// upper bound of a still-open range.
    const MAX: Self;

    /// Next address up, saturating at the family maximum.
    fn plus_one(self) -> Self;

    /// Next address down, saturating at zero.
    fn minus_one(self) -> Self;

    /// Parse a CIDR literal of this family into inclusive bounds.
    ///
    /// A literal of the other family is corrupt data here: a list mixes
    /// byte widths otherwise and its ordering stops meaning anything.
    fn parse_cidr(cidr: &str) -> Result<(Self, Self)>;
}

impl RangeAddr for Ipv4Addr {
    const MAX: Self = Ipv4Addr::new(255, 255, 255, 255);

    fn plus_one(self) -> Self {
        Ipv4Addr::from(u32::from(self).saturating_add(1))
    }

    fn minus_one(self) -> Self {
        Ipv4Addr::from(u32::from(self).saturating_sub(1))
    }

    fn parse_cidr(cidr: &str) -> Result<(Self, Self)> {
        match cidr_range(cidr)? {
            (IpAddr::V4(low), IpAddr::V4(high)) => Ok((low, high)),
            _ => Err(GeoError::Corrupt(format!(
                "address family mismatch: {} in an IPv4 list",
                cidr
            ))),
        }
    }
}

impl RangeAddr for Ipv6Addr {
    const MAX: Self = Ipv6Addr::new(
        0xffff, 0xffff, 0xffff, 0xffff, 0xffff, 0xffff, 0xffff, 0xffff,
    );

    fn plus_one(self) -> Self {
        Ipv6Addr::from(u128::from(self).saturating_add(1))
    }

    fn minus_one(self) -> Self {
        Ipv6Addr::from(u128::from(self).saturating_sub(1))
    }

    fn parse_cidr(cidr: &str) -> Result<(Self, Self)> {
        match cidr_range(cidr)? {
            (IpAddr::V6(low), IpAddr::V6(high)) => Ok((low, high)),
            _ => Err(GeoError::Corrupt(format!(
                "address family mismatch: {} in an IPv6 list",
                cidr
            ))),
        }
    }
}

/// Find the smallest and largest address covered by a CIDR literal.
///
/// Example: `"1.0.0.0/24"` -> `(1.0.0.0, 1.0.0.255)`. Both bounds share
/// the input's family.
pub fn cidr_range(cidr: &str) -> Result<(IpAddr, IpAddr)> {
    let (addr_str, prefix_str) = cidr
        .split_once('/')
        .ok_or_else(|| GeoError::InvalidCidr(cidr.to_string()))?;

    let addr: IpAddr = addr_str
        .parse()
        .map_err(|_| GeoError::InvalidCidr(cidr.to_string()))?;
    let prefix: u8 = prefix_str
        .parse()
        .map_err(|_| GeoError::InvalidCidr(cidr.to_string()))?;

    match addr {
        IpAddr::V4(v4) => {
            if prefix > 32 {
                return Err(GeoError::InvalidCidr(cidr.to_string()));
            }
            let host_bits = match prefix {
                32 => 0,
                p => u32::MAX >> p,
            };
            let high = Ipv4Addr::from(u32::from(v4) | host_bits);
            Ok((IpAddr::V4(v4), IpAddr::V4(high)))
        }
        IpAddr::V6(v6) => {
            if prefix > 128 {
                return Err(GeoError::InvalidCidr(cidr.to_string()));
            }
            let host_bits = match prefix {
                128 => 0,
                p => u128::MAX >> p,
            };
            let high = Ipv6Addr::from(u128::from(v6) | host_bits);
            Ok((IpAddr::V6(v6), IpAddr::V6(high)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_v4_slash_24() {
        let (low, high) = cidr_range("1.0.0.0/24").unwrap();
        assert_eq!(low, "1.0.0.0".parse::<IpAddr>().unwrap());
        assert_eq!(high, "1.0.0.255".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn test_v4_slash_8() {
        let (low, high) = Ipv4Addr::parse_cidr("10.0.0.0/8").unwrap();
        assert_eq!(low, Ipv4Addr::new(10, 0, 0, 0));
        assert_eq!(high, Ipv4Addr::new(10, 255, 255, 255));
    }

    #[test]
    fn test_v4_host_route() {
        let (low, high) = Ipv4Addr::parse_cidr("192.0.2.1/32").unwrap();
        assert_eq!(low, high);
        assert_eq!(low, Ipv4Addr::new(192, 0, 2, 1));
    }

    #[test]
    fn test_v4_whole_space() {
        let (low, high) = Ipv4Addr::parse_cidr("0.0.0.0/0").unwrap();
        assert_eq!(low, Ipv4Addr::new(0, 0, 0, 0));
        assert_eq!(high, Ipv4Addr::MAX);
    }

    #[test]
    fn test_low_keeps_host_bits_as_written() {
        // The feed's address is taken verbatim, never masked down.
        let (low, high) = Ipv4Addr::parse_cidr("10.0.0.5/8").unwrap();
        assert_eq!(low, Ipv4Addr::new(10, 0, 0, 5));
        assert_eq!(high, Ipv4Addr::new(10, 255, 255, 255));
    }

    #[test]
    fn test_v6_block() {
        let (low, high) = Ipv6Addr::parse_cidr("2a04:97c0::/29").unwrap();
        assert_eq!(low, "2a04:97c0::".parse::<Ipv6Addr>().unwrap());
        assert_eq!(
            high,
            "2a04:97c7:ffff:ffff:ffff:ffff:ffff:ffff"
                .parse::<Ipv6Addr>()
                .unwrap()
        );
    }

    #[test]
    fn test_v6_host_route() {
        let (low, high) = Ipv6Addr::parse_cidr("::1/128").unwrap();
        assert_eq!(low, high);
    }

    #[test]
    fn test_low_not_above_high() {
        for cidr in ["0.0.0.0/0", "10.1.2.3/15", "255.255.255.255/32"] {
            let (low, high) = Ipv4Addr::parse_cidr(cidr).unwrap();
            assert!(low <= high, "{}: low must not exceed high", cidr);
        }
    }

    #[test]
    fn test_malformed_literals() {
        assert!(cidr_range("1.0.0.0").is_err());
        assert!(cidr_range("1.0.0.0/33").is_err());
        assert!(cidr_range("::/129").is_err());
        assert!(cidr_range("banana/8").is_err());
        assert!(cidr_range("1.0.0.0/x").is_err());
        assert!(cidr_range("").is_err());
    }

    #[test]
    fn test_family_mismatch_is_corrupt() {
        assert!(matches!(
            Ipv4Addr::parse_cidr("2001:db8::/32"),
            Err(GeoError::Corrupt(_))
        ));
        assert!(matches!(
            Ipv6Addr::parse_cidr("10.0.0.0/8"),
            Err(GeoError::Corrupt(_))
        ));
    }

    #[test]
    fn test_saturating_arithmetic() {
        assert_eq!(Ipv4Addr::MAX.plus_one(), Ipv4Addr::MAX);
        assert_eq!(Ipv4Addr::new(0, 0, 0, 0).minus_one(), Ipv4Addr::new(0, 0, 0, 0));
        assert_eq!(
            Ipv4Addr::new(10, 0, 255, 255).plus_one(),
            Ipv4Addr::new(10, 1, 0, 0)
        );
    }
}
