//! RIPE database dump strategy
//!
//! Downloads the split as-set/route/route6 database dumps, keeps them in a
//! local cache directory for 24 hours, and parses them into in-memory
//! indices. Resolution then runs entirely offline against those indices;
//! the dumps are eventually-consistent snapshots, so names missing from
//! them expand to empty results rather than errors.

use super::expand::{expand_asset, MemberRef, MemberSource};
use super::{parse_asn_literal, AsSource, SourceError};
use crate::model::{AsNumber, AsSet};
use async_trait::async_trait;
use flate2::read::GzDecoder;
use ipnet::{Ipv4Net, Ipv6Net};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};

const DEFAULT_BASE_URL: &str = "https://ftp.ripe.net/ripe/dbase/split";
const ASSET_DUMP: &str = "ripe.db.as-set.gz";
const ROUTE_DUMP: &str = "ripe.db.route.gz";
const ROUTE6_DUMP: &str = "ripe.db.route6.gz";
const MAX_CACHE_AGE: Duration = Duration::from_secs(24 * 60 * 60);

/// In-memory indices built from the database dumps.
///
/// Besides being the parse target, this is a public seam: an index can be
/// seeded programmatically and handed to [`RipeDumpSource::with_index`]
/// for fully offline resolution.
#[derive(Debug, Default)]
pub struct DumpIndex {
    assets: HashMap<String, Vec<MemberRef>>,
    inet: HashMap<u32, Vec<Ipv4Net>>,
    inet6: HashMap<u32, Vec<Ipv6Net>>,
}

impl DumpIndex {
    /// Create an empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a set name, creating it with no members if unseen.
    ///
    /// Names are folded to uppercase for case-insensitive lookup.
    pub fn add_asset(&mut self, name: &str) {
        self.assets.entry(name.to_ascii_uppercase()).or_default();
    }

    /// Record one membership value for a set.
    ///
    /// The value is classified by the ASN-literal rule: `AS` + digits is an
    /// ASN reference, anything else a nested set name. Empty values (from
    /// trailing commas in the dump) are ignored.
    pub fn add_member(&mut self, set: &str, value: &str) {
        let value = value.trim();
        if value.is_empty() {
            return;
        }
        let reference = match parse_asn_literal(value) {
            Some(asn) => MemberRef::Asn(asn),
            None => MemberRef::Set(value.to_ascii_uppercase()),
        };
        self.assets
            .entry(set.to_ascii_uppercase())
            .or_default()
            .push(reference);
    }

    /// Record an IPv4 prefix originated by an ASN
    pub fn add_route(&mut self, asn: u32, prefix: Ipv4Net) {
        self.inet.entry(asn).or_default().push(prefix);
    }

    /// Record an IPv6 prefix originated by an ASN
    pub fn add_route6(&mut self, asn: u32, prefix: Ipv6Net) {
        self.inet6.entry(asn).or_default().push(prefix);
    }

    /// Number of known as-set objects
    pub fn asset_count(&self) -> usize {
        self.assets.len()
    }
}

/// Resolve routing objects from locally cached RIPE database dumps.
///
/// Construction is the expensive part (download and parse of three dumps);
/// every resolution afterwards is a pure in-memory walk. There is no
/// degraded mode: a failed fetch at construction is fatal.
pub struct RipeDumpSource {
    index: DumpIndex,
}

impl RipeDumpSource {
    /// Fetch (or reuse, if younger than 24 hours) the dump files under
    /// `cache_dir` and parse them.
    pub async fn load(cache_dir: impl Into<PathBuf>) -> Result<Self, SourceError> {
        Self::load_from(DEFAULT_BASE_URL, cache_dir).await
    }

    /// Same as [`RipeDumpSource::load`] against a custom base URL
    /// (mirrors, test servers).
    pub async fn load_from(
        base_url: &str,
        cache_dir: impl Into<PathBuf>,
    ) -> Result<Self, SourceError> {
        let cache_dir = cache_dir.into();
        fs::create_dir_all(&cache_dir)
            .map_err(|e| SourceError::Unavailable(format!("cannot create cache dir: {e}")))?;

        let client = reqwest::Client::new();
        for file in [ASSET_DUMP, ROUTE_DUMP, ROUTE6_DUMP] {
            let path = cache_dir.join(file);
            if is_fresh(&path) {
                debug!("using cached {}", path.display());
                continue;
            }
            fetch_dump(&client, base_url, file, &path).await?;
        }

        Ok(Self {
            index: parse_dumps(&cache_dir)?,
        })
    }

    /// Wrap a pre-built index, skipping fetch and parse entirely
    pub fn with_index(index: DumpIndex) -> Self {
        Self { index }
    }

    fn asn_from_index(&self, asn: u32) -> AsNumber {
        AsNumber::new(
            asn,
            self.index.inet.get(&asn).cloned().unwrap_or_default(),
            self.index.inet6.get(&asn).cloned().unwrap_or_default(),
        )
    }
}

#[async_trait]
impl MemberSource for RipeDumpSource {
    async fn direct_members(&self, name: &str) -> Result<Vec<MemberRef>, SourceError> {
        Ok(self.index.assets.get(name).cloned().unwrap_or_default())
    }

    async fn member_asn(&self, asn: u32) -> Result<AsNumber, SourceError> {
        Ok(self.asn_from_index(asn))
    }
}

#[async_trait]
impl AsSource for RipeDumpSource {
    async fn resolve_asn(&self, asn: u32) -> Result<AsNumber, SourceError> {
        Ok(self.asn_from_index(asn))
    }

    async fn resolve_asset(&self, name: &str) -> Result<AsSet, SourceError> {
        expand_asset(self, name).await
    }
}

/// A cached dump younger than 24 hours is reused; delete the file to force
/// a refresh earlier.
fn is_fresh(path: &Path) -> bool {
    let Ok(meta) = fs::metadata(path) else {
        return false;
    };
    let Ok(modified) = meta.modified() else {
        return false;
    };
    SystemTime::now()
        .duration_since(modified)
        .map(|age| age < MAX_CACHE_AGE)
        .unwrap_or(true)
}

async fn fetch_dump(
    client: &reqwest::Client,
    base_url: &str,
    file: &str,
    dest: &Path,
) -> Result<(), SourceError> {
    let url = format!("{}/{}", base_url.trim_end_matches('/'), file);
    info!("downloading {url}");

    let response = client
        .get(&url)
        .send()
        .await
        .map_err(|e| SourceError::Unavailable(e.to_string()))?;

    if !response.status().is_success() {
        return Err(SourceError::Unavailable(format!(
            "download of {url} returned {}",
            response.status()
        )));
    }

    let body = response
        .bytes()
        .await
        .map_err(|e| SourceError::Unavailable(e.to_string()))?;

    fs::write(dest, &body)
        .map_err(|e| SourceError::Unavailable(format!("cannot write {}: {e}", dest.display())))?;

    Ok(())
}

fn parse_dumps(cache_dir: &Path) -> Result<DumpIndex, SourceError> {
    let mut index = DumpIndex::new();

    parse_asset_dump(open_gz(&cache_dir.join(ASSET_DUMP))?, &mut index)
        .map_err(|e| SourceError::Unavailable(format!("{ASSET_DUMP}: {e}")))?;
    parse_route_dump(open_gz(&cache_dir.join(ROUTE_DUMP))?, "route", |asn, prefix| {
        match prefix.parse::<Ipv4Net>() {
            Ok(net) => index.add_route(asn, net),
            Err(_) => warn!("skipping unparsable route {prefix} for AS{asn}"),
        }
    })
    .map_err(|e| SourceError::Unavailable(format!("{ROUTE_DUMP}: {e}")))?;
    parse_route_dump(open_gz(&cache_dir.join(ROUTE6_DUMP))?, "route6", |asn, prefix| {
        match prefix.parse::<Ipv6Net>() {
            Ok(net) => index.add_route6(asn, net),
            Err(_) => warn!("skipping unparsable route6 {prefix} for AS{asn}"),
        }
    })
    .map_err(|e| SourceError::Unavailable(format!("{ROUTE6_DUMP}: {e}")))?;

    debug!(
        "parsed dumps: {} sets, {} v4 origins, {} v6 origins",
        index.assets.len(),
        index.inet.len(),
        index.inet6.len()
    );

    Ok(index)
}

fn open_gz(path: &Path) -> Result<BufReader<GzDecoder<File>>, SourceError> {
    let file = File::open(path)
        .map_err(|e| SourceError::Unavailable(format!("cannot open {}: {e}", path.display())))?;
    Ok(BufReader::new(GzDecoder::new(file)))
}

/// Feed every `key: value` record of a dump to `f`.
///
/// The dumps are ISO-8859-1, so lines are read as bytes and decoded
/// lossily rather than trusting UTF-8.
fn for_each_record<R: BufRead>(mut reader: R, mut f: impl FnMut(&str, &str)) -> io::Result<()> {
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            break;
        }
        let line = String::from_utf8_lossy(&buf);
        if let Some((key, value)) = line.trim().split_once(':') {
            f(key.trim(), value.trim());
        }
    }
    Ok(())
}

/// Build the set-membership index from the as-set dump.
///
/// `as-set:` starts an object; every `members:` line belonging to it may
/// hold one value or a comma-separated list.
fn parse_asset_dump<R: BufRead>(reader: R, index: &mut DumpIndex) -> io::Result<()> {
    let mut current: Option<String> = None;

    for_each_record(reader, |key, value| match key {
        "as-set" => {
            index.add_asset(value);
            current = Some(value.to_string());
        }
        "members" => {
            if let Some(set) = &current {
                for piece in value.split(',') {
                    index.add_member(set, piece);
                }
            }
        }
        _ => {}
    })
}

/// Build a prefix-by-origin index from a route or route6 dump.
///
/// `key` names the prefix attribute (`route`/`route6`); each `origin:`
/// line attributes the remembered prefix to one ASN, with `#` comment
/// suffixes stripped by the shared literal rule.
fn parse_route_dump<R: BufRead>(
    reader: R,
    key: &str,
    mut add: impl FnMut(u32, &str),
) -> io::Result<()> {
    let mut current: Option<String> = None;

    for_each_record(reader, |k, v| {
        if k == key {
            current = Some(v.to_string());
        } else if k == "origin" {
            match (current.as_deref(), parse_asn_literal(v)) {
                (Some(prefix), Some(asn)) => add(asn, prefix),
                (_, None) => warn!("skipping record with unparsable origin: {v}"),
                (None, _) => {}
            }
        }
    })
}
