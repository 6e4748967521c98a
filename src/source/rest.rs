//! RIPE database REST API strategy
//!
//! Talks to the whois REST endpoint (`rest.db.ripe.net` by default) with
//! two query shapes: an inverse `origin` search for the routes of one ASN,
//! and a primary-key lookup of an AS-SET object for its `members`
//! attributes. Membership references carry the database's own
//! `referenced-type` tag, so classification is read, not inferred.

use super::expand::{expand_asset, MemberRef, MemberSource};
use super::{parse_asn_literal, AsSource, SourceError};
use crate::model::{AsNumber, AsSet};
use async_trait::async_trait;
use ipnet::{Ipv4Net, Ipv6Net};
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

const DEFAULT_BASE_URL: &str = "https://rest.db.ripe.net";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Resolve routing objects against the live RIPE REST API.
///
/// Every nested set reference costs one HTTP round trip; expansion is
/// depth-first and cycle-safe. A hung endpoint is bounded only by the
/// per-request timeout.
pub struct RipeRestSource {
    client: reqwest::Client,
    base_url: String,
}

impl RipeRestSource {
    /// Create a source against the default RIPE endpoint
    pub fn new() -> Result<Self, SourceError> {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    /// Create a source against a custom endpoint (test servers, mirrors)
    pub fn with_base_url(base_url: &str) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| SourceError::Unavailable(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn fetch_asn(&self, asn: u32) -> Result<AsNumber, SourceError> {
        let url = format!("{}/search.json", self.base_url);
        debug!("searching routes for AS{asn}");

        let response = self
            .client
            .get(&url)
            .query(&[
                ("query-string", format!("AS{asn}")),
                ("inverse-attribute", "origin".to_string()),
            ])
            .send()
            .await
            .map_err(|e| SourceError::Unavailable(e.to_string()))?;

        if response.status() == StatusCode::NOT_FOUND {
            // No route objects registered for this origin
            return Ok(AsNumber::new(asn, vec![], vec![]));
        }
        if !response.status().is_success() {
            return Err(SourceError::Unavailable(format!(
                "route search for AS{asn} returned {}",
                response.status()
            )));
        }

        let body: WhoisResponse = response
            .json()
            .await
            .map_err(|e| SourceError::MalformedResponse(e.to_string()))?;

        routes_from_response(asn, &body)
    }

    async fn fetch_members(&self, name: &str) -> Result<Vec<MemberRef>, SourceError> {
        let url = format!("{}/RIPE/AS-SET/{}.json", self.base_url, name);
        debug!("fetching as-set object {name}");

        let response = self
            .client
            .get(&url)
            .header("accept", "application/json")
            .send()
            .await
            .map_err(|e| SourceError::Unavailable(e.to_string()))?;

        if response.status() == StatusCode::NOT_FOUND {
            // Object doesn't exist in the database
            return Ok(Vec::new());
        }
        if !response.status().is_success() {
            return Err(SourceError::Unavailable(format!(
                "as-set lookup for {name} returned {}",
                response.status()
            )));
        }

        let body: WhoisResponse = response
            .json()
            .await
            .map_err(|e| SourceError::MalformedResponse(e.to_string()))?;

        member_refs_from_response(&body)
    }
}

#[async_trait]
impl MemberSource for RipeRestSource {
    async fn direct_members(&self, name: &str) -> Result<Vec<MemberRef>, SourceError> {
        self.fetch_members(name).await
    }

    async fn member_asn(&self, asn: u32) -> Result<AsNumber, SourceError> {
        self.fetch_asn(asn).await
    }
}

#[async_trait]
impl AsSource for RipeRestSource {
    async fn resolve_asn(&self, asn: u32) -> Result<AsNumber, SourceError> {
        self.fetch_asn(asn).await
    }

    async fn resolve_asset(&self, name: &str) -> Result<AsSet, SourceError> {
        expand_asset(self, name).await
    }
}

#[derive(Debug, Deserialize)]
struct WhoisResponse {
    #[serde(default)]
    objects: Objects,
}

#[derive(Debug, Default, Deserialize)]
struct Objects {
    #[serde(default)]
    object: Vec<WhoisObject>,
}

#[derive(Debug, Deserialize)]
struct WhoisObject {
    attributes: AttributeList,
}

#[derive(Debug, Deserialize)]
struct AttributeList {
    attribute: Vec<Attribute>,
}

#[derive(Debug, Deserialize)]
struct Attribute {
    name: String,
    value: String,
    #[serde(rename = "referenced-type", default)]
    referenced_type: Option<String>,
}

fn routes_from_response(asn: u32, body: &WhoisResponse) -> Result<AsNumber, SourceError> {
    let mut inet: Vec<Ipv4Net> = Vec::new();
    let mut inet6: Vec<Ipv6Net> = Vec::new();

    for object in &body.objects.object {
        for attr in &object.attributes.attribute {
            match attr.name.as_str() {
                "route" => inet.push(attr.value.trim().parse().map_err(|_| {
                    SourceError::MalformedResponse(format!("bad route value: {}", attr.value))
                })?),
                "route6" => inet6.push(attr.value.trim().parse().map_err(|_| {
                    SourceError::MalformedResponse(format!("bad route6 value: {}", attr.value))
                })?),
                _ => {}
            }
        }
    }

    Ok(AsNumber::new(asn, inet, inet6))
}

fn member_refs_from_response(body: &WhoisResponse) -> Result<Vec<MemberRef>, SourceError> {
    let Some(object) = body.objects.object.first() else {
        return Ok(Vec::new());
    };

    let mut refs = Vec::new();
    for attr in &object.attributes.attribute {
        if attr.name != "members" {
            continue;
        }
        if attr.referenced_type.as_deref() == Some("aut-num") {
            let asn = parse_asn_literal(&attr.value).ok_or_else(|| {
                SourceError::MalformedResponse(format!("bad aut-num reference: {}", attr.value))
            })?;
            refs.push(MemberRef::Asn(asn));
        } else {
            refs.push(MemberRef::Set(attr.value.trim().to_ascii_uppercase()));
        }
    }

    Ok(refs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_routes_from_search_response() {
        let body: WhoisResponse = serde_json::from_str(
            r#"{
                "objects": {
                    "object": [
                        {
                            "attributes": {
                                "attribute": [
                                    {"name": "route", "value": "192.0.2.0/24"},
                                    {"name": "origin", "value": "AS64500"}
                                ]
                            }
                        },
                        {
                            "attributes": {
                                "attribute": [
                                    {"name": "route6", "value": "2001:db8::/32"},
                                    {"name": "origin", "value": "AS64500"}
                                ]
                            }
                        }
                    ]
                }
            }"#,
        )
        .unwrap();

        let asn = routes_from_response(64500, &body).unwrap();
        assert_eq!(asn.inet(), &["192.0.2.0/24".parse::<Ipv4Net>().unwrap()]);
        assert_eq!(asn.inet6(), &["2001:db8::/32".parse::<Ipv6Net>().unwrap()]);
    }

    #[test]
    fn test_bad_route_value_is_malformed() {
        let body: WhoisResponse = serde_json::from_str(
            r#"{
                "objects": {
                    "object": [
                        {
                            "attributes": {
                                "attribute": [{"name": "route", "value": "not-a-prefix"}]
                            }
                        }
                    ]
                }
            }"#,
        )
        .unwrap();

        let err = routes_from_response(64500, &body).unwrap_err();
        assert!(matches!(err, SourceError::MalformedResponse(_)));
    }

    #[test]
    fn test_member_classification_uses_referenced_type() {
        let body: WhoisResponse = serde_json::from_str(
            r#"{
                "objects": {
                    "object": [
                        {
                            "attributes": {
                                "attribute": [
                                    {"name": "as-set", "value": "AS-EXAMPLE"},
                                    {"name": "members", "value": "AS64500", "referenced-type": "aut-num"},
                                    {"name": "members", "value": "as-nested", "referenced-type": "as-set"},
                                    {"name": "mnt-by", "value": "EXAMPLE-MNT"}
                                ]
                            }
                        }
                    ]
                }
            }"#,
        )
        .unwrap();

        let refs = member_refs_from_response(&body).unwrap();
        assert_eq!(
            refs,
            vec![
                MemberRef::Asn(64500),
                MemberRef::Set("AS-NESTED".to_string()),
            ]
        );
    }

    #[test]
    fn test_empty_response_has_no_members() {
        let body: WhoisResponse = serde_json::from_str(r#"{"objects": {"object": []}}"#).unwrap();
        assert!(member_refs_from_response(&body).unwrap().is_empty());

        let body: WhoisResponse = serde_json::from_str("{}").unwrap();
        assert!(member_refs_from_response(&body).unwrap().is_empty());
    }

    #[test]
    fn test_bad_aut_num_reference_is_malformed() {
        let body: WhoisResponse = serde_json::from_str(
            r#"{
                "objects": {
                    "object": [
                        {
                            "attributes": {
                                "attribute": [
                                    {"name": "members", "value": "garbage", "referenced-type": "aut-num"}
                                ]
                            }
                        }
                    ]
                }
            }"#,
        )
        .unwrap();

        assert!(matches!(
            member_refs_from_response(&body),
            Err(SourceError::MalformedResponse(_))
        ));
    }
}
