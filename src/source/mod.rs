//! Data-source strategies
//!
//! Everything that knows how to turn an ASN or an AS-Set name into routing
//! objects lives here, behind the [`AsSource`] trait. Three strategies are
//! provided: the RIPE REST API ([`RipeRestSource`]), the bgpq3 helper
//! binary ([`Bgpq3Source`]) and locally cached RIPE database dumps
//! ([`RipeDumpSource`]).

pub mod bgpq3;
pub mod dump;
mod expand;
pub mod rest;

pub use bgpq3::Bgpq3Source;
pub use dump::{DumpIndex, RipeDumpSource};
pub use rest::RipeRestSource;

use crate::model::{AsNumber, AsSet};
use async_trait::async_trait;

/// Errors reaching or interpreting a data source.
///
/// "Not found" is deliberately absent: an ASN without routes or a set name
/// missing from the database resolves to an empty object, because absence
/// in a distributed whois database is routine, not a fault.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// The transport, helper process or file system failed before an
    /// answer was obtained
    #[error("data source unavailable: {0}")]
    Unavailable(String),

    /// The data source answered, but not in the expected shape
    #[error("malformed response from data source: {0}")]
    MalformedResponse(String),

    /// The external helper binary could not be located
    #[error(
        "unable to find the {binary} binary; install it in $PATH, set ${env_var} or pass an explicit path"
    )]
    BinaryNotFound {
        /// Name of the helper binary searched for
        binary: &'static str,
        /// Environment variable that can override the search
        env_var: &'static str,
    },
}

/// A strategy for resolving routing-policy objects into prefix lists.
///
/// Implementations differ in where the data comes from, not in what they
/// return: `resolve_asn` yields the dual-stack prefixes whose recorded
/// origin is that ASN, `resolve_asset` yields the recursively expanded,
/// flattened membership of a named AS-Set.
#[async_trait]
pub trait AsSource: Send + Sync {
    /// Resolve the prefixes originated by a single ASN.
    ///
    /// An ASN with no registered routes yields empty prefix lists.
    async fn resolve_asn(&self, asn: u32) -> Result<AsNumber, SourceError>;

    /// Recursively expand a named AS-Set into its member ASNs.
    ///
    /// A name absent from the data source yields an empty set.
    async fn resolve_asset(&self, name: &str) -> Result<AsSet, SourceError>;
}

/// Parse an ASN literal like `AS64500`, `as64500` or `AS64500 # comment`.
///
/// One rule for every strategy: strip a `#` comment suffix, trim, require a
/// case-insensitive `AS` prefix followed by nothing but ASCII digits.
/// Anything else is not an ASN reference.
pub(crate) fn parse_asn_literal(value: &str) -> Option<u32> {
    let value = match value.split_once('#') {
        Some((head, _)) => head,
        None => value,
    };
    let value = value.trim();

    if value.len() < 2 || !value[..2].eq_ignore_ascii_case("as") {
        return None;
    }
    let digits = &value[2..];
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}
