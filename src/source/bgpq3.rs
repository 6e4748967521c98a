//! bgpq3 helper strategy
//!
//! bgpq3 performs the recursive set expansion and the per-family prefix
//! lookups itself against the whois servers, so this strategy reduces to
//! locating the binary, invoking it with the right flags and parsing its
//! JSON output. Invocations: `bgpq3 -3j -f1 <name>` for a whole-set
//! expansion, `bgpq3 -3j AS<n> -4|-6` per address family.

use super::{AsSource, SourceError};
use crate::model::{AsNumber, AsSet};
use async_trait::async_trait;
use ipnet::{Ipv4Net, Ipv6Net};
use serde_json::Value;
use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tokio::process::Command;
use tracing::debug;

const BINARY_NAME: &str = "bgpq3";
const PATH_ENV: &str = "BGPQ3_PATH";

/// Resolve routing objects by shelling out to the bgpq3 binary.
///
/// Construction fails with [`SourceError::BinaryNotFound`] when no usable
/// binary can be located, before any resolution is attempted.
pub struct Bgpq3Source {
    path: PathBuf,
}

impl Bgpq3Source {
    /// Locate bgpq3 via `$BGPQ3_PATH` or the executable search path
    pub fn new() -> Result<Self, SourceError> {
        Ok(Self {
            path: find_binary(None)?,
        })
    }

    /// Use an explicit binary path, falling back to discovery if it is not
    /// an executable file
    pub fn with_path(path: impl Into<PathBuf>) -> Result<Self, SourceError> {
        Ok(Self {
            path: find_binary(Some(path.into()))?,
        })
    }

    /// The binary this source will invoke
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run bgpq3 and return the entry array under its default `NN` label.
    async fn run(&self, args: &[&str]) -> Result<Value, SourceError> {
        debug!("running {} {}", self.path.display(), args.join(" "));

        let output = Command::new(&self.path)
            .args(args)
            .output()
            .await
            .map_err(|e| {
                SourceError::Unavailable(format!("failed to run {}: {e}", self.path.display()))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SourceError::Unavailable(format!(
                "{} {} failed ({}): {}",
                BINARY_NAME,
                args.join(" "),
                output.status,
                stderr.trim()
            )));
        }

        let body: Value = serde_json::from_slice(&output.stdout)
            .map_err(|e| SourceError::MalformedResponse(format!("bgpq3 output: {e}")))?;

        body.get("NN")
            .cloned()
            .ok_or_else(|| SourceError::MalformedResponse("bgpq3 output missing NN key".into()))
    }
}

#[async_trait]
impl AsSource for Bgpq3Source {
    async fn resolve_asn(&self, asn: u32) -> Result<AsNumber, SourceError> {
        let object = format!("AS{asn}");

        let v4 = self.run(&["-3j", &object, "-4"]).await?;
        let inet: Vec<Ipv4Net> = prefixes_from_entries(&v4)?;

        let v6 = self.run(&["-3j", &object, "-6"]).await?;
        let inet6: Vec<Ipv6Net> = prefixes_from_entries(&v6)?;

        Ok(AsNumber::new(asn, inet, inet6))
    }

    async fn resolve_asset(&self, name: &str) -> Result<AsSet, SourceError> {
        // bgpq3 has already flattened the membership tree here; no
        // visit-set is needed on our side
        let entries = self.run(&["-3j", "-f1", name]).await?;
        let asns = asns_from_entries(&entries)?;

        let mut members = Vec::with_capacity(asns.len());
        for asn in asns {
            members.push(self.resolve_asn(asn).await?);
        }

        Ok(AsSet::new(name, members))
    }
}

/// Binary discovery: explicit path, then `$BGPQ3_PATH`, then every
/// directory on `$PATH`. Each step is consulted only when the previous one
/// yielded nothing usable.
fn find_binary(supplied: Option<PathBuf>) -> Result<PathBuf, SourceError> {
    if let Some(path) = supplied {
        if is_executable(&path) {
            return Ok(path);
        }
    }

    if let Some(path) = env::var_os(PATH_ENV).map(PathBuf::from) {
        if is_executable(&path) {
            return Ok(path);
        }
    }

    if let Some(search_path) = env::var_os("PATH") {
        for dir in env::split_paths(&search_path) {
            let candidate = dir.join(BINARY_NAME);
            if is_executable(&candidate) {
                return Ok(candidate);
            }
        }
    }

    Err(SourceError::BinaryNotFound {
        binary: BINARY_NAME,
        env_var: PATH_ENV,
    })
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Parse one per-family output entry list: objects with a `prefix` field.
fn prefixes_from_entries<T>(entries: &Value) -> Result<Vec<T>, SourceError>
where
    T: FromStr,
{
    let Some(array) = entries.as_array() else {
        return Err(SourceError::MalformedResponse(
            "bgpq3 prefix output is not an array".into(),
        ));
    };

    array
        .iter()
        .map(|entry| {
            let prefix = entry
                .get("prefix")
                .and_then(Value::as_str)
                .ok_or_else(|| {
                    SourceError::MalformedResponse(format!("entry without prefix: {entry}"))
                })?;
            prefix
                .parse()
                .map_err(|_| SourceError::MalformedResponse(format!("bad prefix: {prefix}")))
        })
        .collect()
}

/// Parse a set-expansion entry list: plain ASN integers.
fn asns_from_entries(entries: &Value) -> Result<Vec<u32>, SourceError> {
    let Some(array) = entries.as_array() else {
        return Err(SourceError::MalformedResponse(
            "bgpq3 set output is not an array".into(),
        ));
    };

    array
        .iter()
        .map(|entry| {
            entry
                .as_u64()
                .and_then(|n| u32::try_from(n).ok())
                .ok_or_else(|| {
                    SourceError::MalformedResponse(format!("entry is not an ASN: {entry}"))
                })
        })
        .collect()
}
