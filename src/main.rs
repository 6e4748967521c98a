//! expandas - expand AS-Sets and ASNs into routed prefix lists.
//!
//! This is the command-line interface for the expandas library.

use anyhow::{bail, Context, Result};
use clap::Parser;
use expandas::{AsSource, Bgpq3Source, RipeDumpSource, RipeRestSource};
use ipnet::{Ipv4Net, Ipv6Net};
use serde::Serialize;
use std::path::PathBuf;

/// Command-line arguments for the expansion tool.
#[derive(Parser, Debug)]
#[clap(author, version, about = "Expand AS-Sets and ASNs into routed prefix lists", long_about = None)]
struct Args {
    /// AS-Set name to expand (e.g. AS-EXAMPLE)
    #[clap(short = 'a', long = "as-set", conflicts_with = "asn")]
    as_set: Option<String>,

    /// Single AS number to resolve (e.g. 64500)
    #[clap(short = 'A', long)]
    asn: Option<u32>,

    /// Data source to resolve against
    #[clap(short = 'l', long = "source", value_enum, default_value_t = SourceArg::Rest)]
    source: SourceArg,

    /// Address families to include in plain output
    #[clap(short = 'O', long, value_enum, default_value_t = OutputArg::All)]
    output: OutputArg,

    /// Emit the resolved object as JSON instead of a prefix list
    #[clap(long)]
    json: bool,

    /// Write output to a file instead of stdout
    #[clap(short = 'o', long = "output-file")]
    output_file: Option<PathBuf>,

    /// Explicit path to the bgpq3 binary (bgpq3 source only)
    #[clap(long)]
    bgpq3_path: Option<PathBuf>,

    /// Cache directory for database dumps (dump source only)
    #[clap(long)]
    cache_dir: Option<PathBuf>,

    /// Enable verbose logging (use -vv for trace)
    #[clap(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum SourceArg {
    /// Live RIPE REST API
    Rest,
    /// Locally cached RIPE database dumps
    Dump,
    /// The bgpq3 helper binary
    Bgpq3,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum OutputArg {
    All,
    Ipv4,
    Ipv6,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    if args.as_set.is_none() && args.asn.is_none() {
        bail!("an AS-Set (-a) or an AS number (-A) must be provided");
    }

    let source = build_source(&args).await?;

    let rendered = if let Some(name) = args.as_set.as_deref() {
        let set = source.resolve_asset(name).await?;
        render(&set, set.inet(), set.inet6(), &args)?
    } else {
        // Checked above: exactly one of the two targets is present
        let asn = args.asn.unwrap_or_default();
        let number = source.resolve_asn(asn).await?;
        render(&number, number.inet(), number.inet6(), &args)?
    };

    match &args.output_file {
        Some(path) => std::fs::write(path, rendered.as_bytes())
            .with_context(|| format!("cannot write {}", path.display()))?,
        None => println!("{rendered}"),
    }

    Ok(())
}

async fn build_source(args: &Args) -> Result<Box<dyn AsSource>> {
    Ok(match args.source {
        SourceArg::Rest => Box::new(RipeRestSource::new()?),
        SourceArg::Bgpq3 => match &args.bgpq3_path {
            Some(path) => Box::new(Bgpq3Source::with_path(path)?),
            None => Box::new(Bgpq3Source::new()?),
        },
        SourceArg::Dump => {
            let cache_dir = args
                .cache_dir
                .clone()
                .unwrap_or_else(|| std::env::temp_dir().join("expandas"));
            Box::new(RipeDumpSource::load(cache_dir).await?)
        }
    })
}

/// Serialize the resolved object, either as pretty JSON or as a plain
/// one-prefix-per-line list filtered by address family.
fn render<T: Serialize>(
    object: &T,
    inet: &[Ipv4Net],
    inet6: &[Ipv6Net],
    args: &Args,
) -> Result<String> {
    if args.json {
        return serde_json::to_string_pretty(object).context("cannot serialize result");
    }

    let mut lines: Vec<String> = Vec::new();
    if matches!(args.output, OutputArg::All | OutputArg::Ipv4) {
        lines.extend(inet.iter().map(ToString::to_string));
    }
    if matches!(args.output, OutputArg::All | OutputArg::Ipv6) {
        lines.extend(inet6.iter().map(ToString::to_string));
    }

    Ok(lines.join("\n"))
}

fn init_tracing(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info,expandas=debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();
}
