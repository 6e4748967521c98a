//! Routing object model
//!
//! Value types produced by a resolution: a single AS number with the
//! prefixes it originates, and an AS-Set whose membership has already been
//! flattened to AS numbers. Both are plain data, constructed once by a
//! source strategy and queried afterwards; there is no I/O here.

use ipnet::{IpNet, Ipv4Net, Ipv6Net};
use serde::Serialize;
use std::fmt;

/// Error type for containment queries against routing objects
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    /// The query string could not be parsed as a CIDR network
    #[error("not a valid CIDR network: {0}")]
    InvalidNetwork(String),
}

/// A single Autonomous System and the prefixes whose recorded origin it is.
///
/// Prefix lists keep the order the data source returned them in and are
/// never deduplicated. An ASN with no registered routes is represented by
/// empty lists, not by an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AsNumber {
    asn: u32,
    inet: Vec<Ipv4Net>,
    inet6: Vec<Ipv6Net>,
}

impl AsNumber {
    /// Create an AS number from its originated prefix lists
    pub fn new(asn: u32, inet: Vec<Ipv4Net>, inet6: Vec<Ipv6Net>) -> Self {
        Self { asn, inet, inet6 }
    }

    /// The Autonomous System Number
    pub fn asn(&self) -> u32 {
        self.asn
    }

    /// IPv4 prefixes originated by this ASN, in source order
    pub fn inet(&self) -> &[Ipv4Net] {
        &self.inet
    }

    /// IPv6 prefixes originated by this ASN, in source order
    pub fn inet6(&self) -> &[Ipv6Net] {
        &self.inet6
    }

    /// Total number of prefixes across both address families
    pub fn prefix_count(&self) -> usize {
        self.inet.len() + self.inet6.len()
    }

    /// True if this object is the given ASN
    pub fn contains_asn(&self, asn: u32) -> bool {
        self.asn == asn
    }

    /// Check whether the queried network overlaps any originated prefix.
    ///
    /// The query is parsed as a CIDR network (a bare address counts as a
    /// host route). Overlap is symmetric: `10.0.0.0/8` matches a query for
    /// `10.1.0.0/16` and vice versa.
    pub fn contains_net(&self, query: &str) -> Result<bool, QueryError> {
        overlaps_any(&self.inet, &self.inet6, query)
    }
}

impl fmt::Display for AsNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AS{}", self.asn)
    }
}

/// A fully expanded AS-Set.
///
/// `members` holds the flattened membership in depth-first source order;
/// nested sets have already been resolved away by the time an `AsSet`
/// exists. `inet`/`inet6` are the concatenation, in member order, of every
/// member's prefixes. A prefix announced identically by two members appears
/// twice; filter generators downstream rely on seeing every occurrence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AsSet {
    name: String,
    members: Vec<AsNumber>,
    inet: Vec<Ipv4Net>,
    inet6: Vec<Ipv6Net>,
}

impl AsSet {
    /// Aggregate a membership list into a set.
    ///
    /// The name is folded to uppercase, matching whois case-insensitivity.
    /// Aggregation itself cannot fail; an empty membership is the normal
    /// representation of a set name absent from the data source.
    pub fn new(name: &str, members: Vec<AsNumber>) -> Self {
        let mut inet = Vec::new();
        let mut inet6 = Vec::new();

        for member in &members {
            inet.extend_from_slice(member.inet());
            inet6.extend_from_slice(member.inet6());
        }

        Self {
            name: name.to_ascii_uppercase(),
            members,
            inet,
            inet6,
        }
    }

    /// The whois object name, uppercased
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The flattened membership, in expansion order
    pub fn members(&self) -> &[AsNumber] {
        &self.members
    }

    /// Aggregated IPv4 prefixes of all members, in member order
    pub fn inet(&self) -> &[Ipv4Net] {
        &self.inet
    }

    /// Aggregated IPv6 prefixes of all members, in member order
    pub fn inet6(&self) -> &[Ipv6Net] {
        &self.inet6
    }

    /// Number of member AS numbers
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// True if the set expanded to no members
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// True if some member is the given ASN
    pub fn contains_asn(&self, asn: u32) -> bool {
        self.members.iter().any(|m| m.asn() == asn)
    }

    /// Check whether the queried network overlaps any aggregated prefix.
    ///
    /// Same semantics as [`AsNumber::contains_net`].
    pub fn contains_net(&self, query: &str) -> Result<bool, QueryError> {
        overlaps_any(&self.inet, &self.inet6, query)
    }
}

impl fmt::Display for AsSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl<'a> IntoIterator for &'a AsSet {
    type Item = &'a AsNumber;
    type IntoIter = std::slice::Iter<'a, AsNumber>;

    fn into_iter(self) -> Self::IntoIter {
        self.members.iter()
    }
}

/// Parse a query string and test symmetric overlap against the list of the
/// matching address family. CIDR ranges are either nested or disjoint, so
/// overlap reduces to containment in one direction or the other.
fn overlaps_any(inet: &[Ipv4Net], inet6: &[Ipv6Net], query: &str) -> Result<bool, QueryError> {
    let trimmed = query.trim();
    let net: IpNet = trimmed
        .parse()
        .or_else(|_| trimmed.parse::<std::net::IpAddr>().map(IpNet::from))
        .map_err(|_| QueryError::InvalidNetwork(query.to_string()))?;

    Ok(match net {
        IpNet::V4(q) => inet.iter().any(|p| p.contains(&q) || q.contains(p)),
        IpNet::V6(q) => inet6.iter().any(|p| p.contains(&q) || q.contains(p)),
    })
}
