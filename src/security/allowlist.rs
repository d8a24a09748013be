//! Client IP allowlist guard.
//!
//! The outermost filter: requests from addresses outside the configured
//! CIDR ranges never reach authentication. An empty allowlist means the
//! guard is not installed at all.

use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{Request, StatusCode},
    middleware::Next,
    response::Response,
};

use crate::http::response::json_error;

/// An IP range in CIDR notation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CidrRange {
    network: IpAddr,
    prefix: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CidrParseError {
    #[error("expected address/prefix")]
    MissingPrefix,
    #[error("invalid network address")]
    InvalidAddress,
    #[error("invalid prefix length")]
    InvalidPrefix,
}

impl FromStr for CidrRange {
    type Err = CidrParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (addr, prefix) = s.trim().split_once('/').ok_or(CidrParseError::MissingPrefix)?;
        let network: IpAddr = addr.parse().map_err(|_| CidrParseError::InvalidAddress)?;
        let prefix: u8 = prefix.parse().map_err(|_| CidrParseError::InvalidPrefix)?;
        let max = match network {
            IpAddr::V4(_) => 32,
            IpAddr::V6(_) => 128,
        };
        if prefix > max {
            return Err(CidrParseError::InvalidPrefix);
        }
        Ok(Self { network, prefix })
    }
}

impl CidrRange {
    /// Whether `ip` falls inside this range. Families never match across
    /// v4/v6; mapped addresses are canonicalized by the caller.
    pub fn contains(&self, ip: IpAddr) -> bool {
        match (self.network, ip) {
            (IpAddr::V4(net), IpAddr::V4(ip)) => {
                let shift = 32 - u32::from(self.prefix);
                if shift >= 32 {
                    return true;
                }
                (u32::from(net) >> shift) == (u32::from(ip) >> shift)
            }
            (IpAddr::V6(net), IpAddr::V6(ip)) => {
                let shift = 128 - u32::from(self.prefix);
                if shift >= 128 {
                    return true;
                }
                (u128::from(net) >> shift) == (u128::from(ip) >> shift)
            }
            _ => false,
        }
    }
}

/// Ordered set of CIDR ranges, loaded once at startup.
#[derive(Debug, Clone, Default)]
pub struct Allowlist {
    ranges: Vec<CidrRange>,
}

impl Allowlist {
    /// Parse a list of CIDR strings. First match wins; order carries no
    /// precedence semantics beyond that.
    pub fn parse(cidrs: &[String]) -> Result<Self, CidrParseError> {
        let ranges = cidrs
            .iter()
            .map(|s| s.parse())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { ranges })
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn contains(&self, ip: IpAddr) -> bool {
        let ip = ip.to_canonical();
        self.ranges.iter().any(|r| r.contains(ip))
    }
}

/// Middleware rejecting callers outside the allowlist with 403.
pub async fn allowlist_middleware(
    State(allowlist): State<Arc<Allowlist>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let remote = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0);

    let Some(remote) = remote else {
        return json_error(StatusCode::FORBIDDEN, "forbidden");
    };

    let ip = remote.ip().to_canonical();
    if allowlist.contains(ip) {
        next.run(request).await
    } else {
        tracing::warn!(remote = %remote, "blocked: not in allowlist");
        json_error(
            StatusCode::FORBIDDEN,
            &format!("forbidden: {ip} not in allowlist"),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn parses_and_matches_v4() {
        let range: CidrRange = "10.0.0.0/8".parse().unwrap();
        assert!(range.contains(ip("10.0.0.5")));
        assert!(range.contains(ip("10.255.255.255")));
        assert!(!range.contains(ip("8.8.8.8")));
        assert!(!range.contains(ip("11.0.0.1")));
    }

    #[test]
    fn parses_and_matches_v6() {
        let range: CidrRange = "fd00::/8".parse().unwrap();
        assert!(range.contains(ip("fd12:3456::1")));
        assert!(!range.contains(ip("fe80::1")));
        assert!(!range.contains(ip("10.0.0.5")), "family mismatch");
    }

    #[test]
    fn zero_prefix_matches_everything() {
        let range: CidrRange = "0.0.0.0/0".parse().unwrap();
        assert!(range.contains(ip("203.0.113.7")));
    }

    #[test]
    fn host_route_matches_exactly() {
        let range: CidrRange = "192.168.1.10/32".parse().unwrap();
        assert!(range.contains(ip("192.168.1.10")));
        assert!(!range.contains(ip("192.168.1.11")));
    }

    #[test]
    fn rejects_malformed_input() {
        assert_eq!(
            "10.0.0.0".parse::<CidrRange>(),
            Err(CidrParseError::MissingPrefix)
        );
        assert_eq!(
            "10.0.0.0/33".parse::<CidrRange>(),
            Err(CidrParseError::InvalidPrefix)
        );
        assert_eq!(
            "bogus/8".parse::<CidrRange>(),
            Err(CidrParseError::InvalidAddress)
        );
    }

    #[test]
    fn allowlist_first_match_is_sufficient() {
        let list =
            Allowlist::parse(&["192.168.1.0/24".into(), "10.0.0.0/8".into()]).unwrap();
        assert!(list.contains(ip("10.0.0.5")));
        assert!(list.contains(ip("192.168.1.44")));
        assert!(!list.contains(ip("8.8.8.8")));
    }

    #[test]
    fn canonicalizes_mapped_v4() {
        let list = Allowlist::parse(&["10.0.0.0/8".into()]).unwrap();
        assert!(list.contains(ip("::ffff:10.0.0.5")));
    }
}
