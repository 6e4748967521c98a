//! expandas - resolve routing-policy objects into routed prefix lists
//!
//! This library expands Autonomous System Numbers and AS-Sets, as stored in
//! RIR whois databases, into the concrete IPv4/IPv6 prefixes they
//! originate. Three interchangeable data-source strategies implement the
//! [`AsSource`] trait: the RIPE REST API, the bgpq3 helper binary, and
//! locally cached RIPE database dumps.
//!
//! # Examples
//!
//! Fully offline resolution against a seeded dump index:
//!
//! ```
//! use expandas::{AsSource, DumpIndex, RipeDumpSource};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), expandas::SourceError> {
//! let mut index = DumpIndex::new();
//! index.add_asset("AS-EXAMPLE");
//! index.add_member("AS-EXAMPLE", "AS64500");
//! index.add_route(64500, "192.0.2.0/24".parse().unwrap());
//!
//! let source = RipeDumpSource::with_index(index);
//! let set = source.resolve_asset("AS-EXAMPLE").await?;
//! assert!(set.contains_asn(64500));
//! assert!(set.contains_net("192.0.2.128/25").unwrap());
//! # Ok(())
//! # }
//! ```

pub mod model;
pub mod source;

// Re-export the engine surface for library users
pub use model::{AsNumber, AsSet, QueryError};
pub use source::{AsSource, Bgpq3Source, DumpIndex, RipeDumpSource, RipeRestSource, SourceError};
