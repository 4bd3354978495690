use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use dnssec_chain::config::{ChainConfig, Upstream};
use dnssec_chain::dns::enums::DNSResourceType;
use dnssec_chain::dnssec::{
    BootstrapError, ChainResolver, DnsSecError, PinnedRoot, Resolution, RootKeyCache,
    SecurityStatus, TrustAnchorBootstrap,
};
use dnssec_chain::error::{ConfigError, FetchError, QueryError};
use dnssec_chain::transport::{DohExchange, HttpFetcher, QueryExchange, UdpExchange};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

/// Resolve a name and authenticate the answer through the DNSSEC chain of trust
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Name to resolve
    name: String,

    /// Record type to query
    #[arg(short = 't', long = "type", default_value = "A")]
    rtype: DNSResourceType,

    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the configured upstream (doh or udp)
    #[arg(short, long)]
    upstream: Option<Upstream>,

    /// Print the result as JSON
    #[arg(long)]
    json: bool,

    /// Log verification steps
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(&args).await {
        Ok(resolution) => {
            print_resolution(&args, &resolution);
            ExitCode::SUCCESS
        }
        Err(e) => {
            match e.status() {
                Some(status) => error!("{}: {}", status, e),
                None => error!("{}", e),
            }
            if args.json {
                println!("{}", json!({ "name": args.name, "error": e.to_string(), "status": e.status() }));
            }
            ExitCode::FAILURE
        }
    }
}

#[derive(Error, Debug)]
enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Bootstrap(#[from] BootstrapError),

    #[error(transparent)]
    Resolve(#[from] DnsSecError),
}

impl RunError {
    /// Security status of a failed resolution; setup failures have none.
    fn status(&self) -> Option<SecurityStatus> {
        match self {
            Self::Resolve(e) => e.status(),
            _ => None,
        }
    }
}

async fn run(args: &Args) -> Result<Resolution, RunError> {
    let mut config = match &args.config {
        Some(path) => ChainConfig::from_toml_file(path),
        None => ChainConfig::from_env(),
    }?;
    if let Some(upstream) = args.upstream {
        config.upstream = upstream;
        config.validate()?;
    }
    debug!("Configuration: {:?}", config);

    let exchange: Arc<dyn QueryExchange> = match config.upstream {
        Upstream::Doh => Arc::new(DohExchange::new(
            config.doh_servers.clone(),
            config.query_timeout,
        )?),
        Upstream::Udp => Arc::new(UdpExchange::new(
            config.udp_servers.clone(),
            config.query_timeout,
        )),
    };

    let pinned_root = match &config.root_ca_path {
        Some(path) => PinnedRoot::from_file(path),
        None => PinnedRoot::embedded(),
    }?;

    let bootstrap = TrustAnchorBootstrap::new(
        Arc::new(HttpFetcher::new(config.query_timeout)?),
        exchange.clone(),
        pinned_root,
    )
    .with_cache(RootKeyCache::global())
    .with_urls(&config.root_anchors_url, &config.root_anchors_signature_url)
    .with_payload_size(config.edns_payload_size);

    let root_keys = bootstrap.root_keys().await?;
    info!("Bootstrapped {} root keys", root_keys.len());

    let resolver = ChainResolver::builder()
        .trust_anchors(root_keys)
        .exchange(exchange)
        .max_depth(config.max_chain_depth)
        .payload_size(config.edns_payload_size)
        .build()?;

    Ok(resolver.resolve(&args.name, args.rtype).await?)
}

fn print_resolution(args: &Args, resolution: &Resolution) {
    let records: Vec<_> = resolution
        .response
        .answers
        .iter()
        .filter(|r| r.rtype != DNSResourceType::RRSIG)
        .collect();

    if args.json {
        let records: Vec<_> = records
            .iter()
            .map(|r| {
                json!({
                    "name": r.name(),
                    "type": r.rtype.to_string(),
                    "ttl": r.ttl,
                    "rdata": hex::encode(&r.rdata),
                })
            })
            .collect();
        println!(
            "{}",
            json!({
                "name": args.name,
                "type": args.rtype.to_string(),
                "status": resolution.status,
                "records": records,
            })
        );
        return;
    }

    println!("{} {}: {}", args.name, args.rtype, resolution.status);
    for record in records {
        println!("{}", record);
    }
}
