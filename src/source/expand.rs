//! Shared recursive AS-Set expansion
//!
//! The REST and dump strategies walk set membership the same way; only the
//! lookup of direct members and of per-ASN prefixes differs, so that part
//! sits behind [`MemberSource`] and the walk itself is written once.
//! Per-call state (the visit-set and the member accumulator) is threaded
//! through the call frames, never stored on the strategy, so one strategy
//! instance can serve concurrent resolutions.

use super::SourceError;
use crate::model::{AsNumber, AsSet};
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::collections::HashSet;

/// A single reference inside an AS-Set's membership list, tagged by the
/// data source's own metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum MemberRef {
    /// An autonomous-system-number reference, always a leaf
    Asn(u32),
    /// A nested set name, expanded recursively
    Set(String),
}

/// The two lookups a strategy must provide for the shared walker.
#[async_trait]
pub(crate) trait MemberSource: Sync {
    /// The direct (unexpanded) membership list of a named set. Empty when
    /// the set is unknown to the source.
    async fn direct_members(&self, name: &str) -> Result<Vec<MemberRef>, SourceError>;

    /// The prefixes originated by an ASN.
    async fn member_asn(&self, asn: u32) -> Result<AsNumber, SourceError>;
}

/// Depth-first expansion of `name` into a flattened [`AsSet`].
///
/// ASN references are resolved at every occurrence; only nested set names
/// are visit-tracked, because only set-to-set references can cycle. Depth
/// is bounded by the database's actual nesting, not by an artificial limit.
pub(crate) async fn expand_asset<S: MemberSource>(
    source: &S,
    name: &str,
) -> Result<AsSet, SourceError> {
    let mut visited: HashSet<String> = HashSet::new();
    let mut members: Vec<AsNumber> = Vec::new();
    let root = name.to_ascii_uppercase();

    walk(source, &root, &mut visited, &mut members).await?;

    Ok(AsSet::new(name, members))
}

fn walk<'a, S: MemberSource>(
    source: &'a S,
    name: &'a str,
    visited: &'a mut HashSet<String>,
    members: &'a mut Vec<AsNumber>,
) -> BoxFuture<'a, Result<(), SourceError>> {
    Box::pin(async move {
        for reference in source.direct_members(name).await? {
            match reference {
                MemberRef::Asn(asn) => members.push(source.member_asn(asn).await?),
                MemberRef::Set(nested) => {
                    let nested = nested.to_ascii_uppercase();
                    if visited.insert(nested.clone()) {
                        walk(source, &nested, visited, members).await?;
                    }
                }
            }
        }
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ipnet::Ipv4Net;
    use std::collections::HashMap;

    struct FakeSource {
        sets: HashMap<String, Vec<MemberRef>>,
        routes: HashMap<u32, Vec<Ipv4Net>>,
    }

    impl FakeSource {
        fn new() -> Self {
            Self {
                sets: HashMap::new(),
                routes: HashMap::new(),
            }
        }

        fn set(mut self, name: &str, members: Vec<MemberRef>) -> Self {
            self.sets.insert(name.to_string(), members);
            self
        }

        fn route(mut self, asn: u32, prefix: &str) -> Self {
            self.routes.entry(asn).or_default().push(prefix.parse().unwrap());
            self
        }
    }

    #[async_trait]
    impl MemberSource for FakeSource {
        async fn direct_members(&self, name: &str) -> Result<Vec<MemberRef>, SourceError> {
            Ok(self.sets.get(name).cloned().unwrap_or_default())
        }

        async fn member_asn(&self, asn: u32) -> Result<AsNumber, SourceError> {
            let inet = self.routes.get(&asn).cloned().unwrap_or_default();
            Ok(AsNumber::new(asn, inet, vec![]))
        }
    }

    #[tokio::test]
    async fn test_nested_expansion_order() {
        let source = FakeSource::new()
            .set(
                "AS-EXAMPLE",
                vec![MemberRef::Asn(64500), MemberRef::Set("AS-NESTED".into())],
            )
            .set("AS-NESTED", vec![MemberRef::Asn(64501)])
            .route(64500, "192.0.2.0/24")
            .route(64501, "198.51.100.0/24");

        let set = expand_asset(&source, "AS-EXAMPLE").await.unwrap();
        let asns: Vec<u32> = set.members().iter().map(AsNumber::asn).collect();
        assert_eq!(asns, vec![64500, 64501]);
        assert_eq!(
            set.inet(),
            &[
                "192.0.2.0/24".parse::<Ipv4Net>().unwrap(),
                "198.51.100.0/24".parse::<Ipv4Net>().unwrap(),
            ]
        );
    }

    #[tokio::test]
    async fn test_cycle_terminates() {
        let source = FakeSource::new()
            .set(
                "AS-A",
                vec![MemberRef::Asn(64500), MemberRef::Set("AS-B".into())],
            )
            .set(
                "AS-B",
                vec![MemberRef::Asn(64501), MemberRef::Set("AS-A".into())],
            );

        let set = expand_asset(&source, "AS-A").await.unwrap();
        // The root is not pre-seeded into the visit-set, so it is re-entered
        // once through the cycle before the break: each ASN appears once per
        // distinct path.
        let asns: Vec<u32> = set.members().iter().map(AsNumber::asn).collect();
        assert_eq!(asns, vec![64500, 64501, 64500]);
    }

    #[tokio::test]
    async fn test_self_referencing_set() {
        let source = FakeSource::new().set(
            "AS-SELF",
            vec![MemberRef::Set("AS-SELF".into()), MemberRef::Asn(64500)],
        );

        let set = expand_asset(&source, "AS-SELF").await.unwrap();
        let asns: Vec<u32> = set.members().iter().map(AsNumber::asn).collect();
        // First recursion re-enters the root once, then the visit-set stops it
        assert_eq!(asns, vec![64500, 64500]);
    }

    #[tokio::test]
    async fn test_asn_references_are_not_deduplicated() {
        let source = FakeSource::new()
            .set(
                "AS-TWICE",
                vec![MemberRef::Asn(64500), MemberRef::Asn(64500)],
            )
            .route(64500, "192.0.2.0/24");

        let set = expand_asset(&source, "AS-TWICE").await.unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.inet().len(), 2);
    }

    #[tokio::test]
    async fn test_nested_sets_visited_once_case_insensitively() {
        let source = FakeSource::new()
            .set(
                "AS-ROOT",
                vec![
                    MemberRef::Set("as-child".into()),
                    MemberRef::Set("AS-CHILD".into()),
                ],
            )
            .set("AS-CHILD", vec![MemberRef::Asn(64501)]);

        let set = expand_asset(&source, "AS-ROOT").await.unwrap();
        assert_eq!(set.len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_root_expands_to_empty() {
        let source = FakeSource::new();
        let set = expand_asset(&source, "AS-MISSING").await.unwrap();
        assert!(set.is_empty());
        assert_eq!(set.name(), "AS-MISSING");
    }
}
