use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::dnssec::chain::DEFAULT_MAX_DEPTH;
use crate::dnssec::query::DNSSEC_UDP_SIZE;
use crate::dnssec::trust_anchor::{ROOT_ANCHORS_SIGNATURE_URL, ROOT_ANCHORS_URL};
use crate::error::ConfigError;
use crate::transport::{DEFAULT_DOH_SERVERS, DEFAULT_UDP_SERVERS};

/// Longest accepted per-query timeout
const MAX_QUERY_TIMEOUT: Duration = Duration::from_secs(300);

/// Deepest delegation chain a name can have (127 labels)
const MAX_CHAIN_DEPTH: usize = 127;

/// Which query collaborator the binary builds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Upstream {
    #[default]
    Doh,
    Udp,
}

impl FromStr for Upstream {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "doh" | "https" => Ok(Upstream::Doh),
            "udp" | "dns" => Ok(Upstream::Udp),
            other => Err(ConfigError::InvalidValue {
                field: "upstream",
                reason: format!("expected doh or udp, got {}", other),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChainConfig {
    /// Query collaborator used for chain resolution
    pub upstream: Upstream,

    /// DNS-over-HTTPS endpoints, tried in order
    pub doh_servers: Vec<String>,

    /// Plain DNS servers, tried in order
    pub udp_servers: Vec<SocketAddr>,

    /// Timeout for a single upstream query
    pub query_timeout: Duration,

    /// EDNS0 UDP payload size advertised in queries
    pub edns_payload_size: u16,

    /// Maximum number of zones authenticated for one name
    pub max_chain_depth: usize,

    pub root_anchors_url: String,
    pub root_anchors_signature_url: String,

    /// PEM file with the CA that signs the trust-anchor document (None = embedded)
    pub root_ca_path: Option<PathBuf>,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            upstream: Upstream::Doh,
            doh_servers: DEFAULT_DOH_SERVERS.iter().map(|s| s.to_string()).collect(),
            udp_servers: DEFAULT_UDP_SERVERS.to_vec(),
            query_timeout: Duration::from_secs(5),
            edns_payload_size: DNSSEC_UDP_SIZE,
            max_chain_depth: DEFAULT_MAX_DEPTH,
            root_anchors_url: ROOT_ANCHORS_URL.to_string(),
            root_anchors_signature_url: ROOT_ANCHORS_SIGNATURE_URL.to_string(),
            root_ca_path: None,
        }
    }
}

/// On-disk form; every key is optional and falls back to the defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    upstream: Option<Upstream>,
    doh_servers: Option<Vec<String>>,
    udp_servers: Option<Vec<SocketAddr>>,
    /// seconds
    query_timeout: Option<u64>,
    edns_payload_size: Option<u16>,
    max_chain_depth: Option<usize>,
    root_anchors_url: Option<String>,
    root_anchors_signature_url: Option<String>,
    root_ca_path: Option<PathBuf>,
}

impl ChainConfig {
    /// Create a ChainConfig from `DNSSEC_CHAIN_*` environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML file, then apply environment overrides on top of it.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let mut config = Self::from_toml_str(&text)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile = toml::from_str(text)?;
        let defaults = Self::default();

        let config = Self {
            upstream: file.upstream.unwrap_or(defaults.upstream),
            doh_servers: file.doh_servers.unwrap_or(defaults.doh_servers),
            udp_servers: file.udp_servers.unwrap_or(defaults.udp_servers),
            query_timeout: file
                .query_timeout
                .map(Duration::from_secs)
                .unwrap_or(defaults.query_timeout),
            edns_payload_size: file.edns_payload_size.unwrap_or(defaults.edns_payload_size),
            max_chain_depth: file.max_chain_depth.unwrap_or(defaults.max_chain_depth),
            root_anchors_url: file.root_anchors_url.unwrap_or(defaults.root_anchors_url),
            root_anchors_signature_url: file
                .root_anchors_signature_url
                .unwrap_or(defaults.root_anchors_signature_url),
            root_ca_path: file.root_ca_path,
        };
        config.validate()?;
        Ok(config)
    }

    /// Override fields from `DNSSEC_CHAIN_*` variables resolved by `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(upstream) = lookup("DNSSEC_CHAIN_UPSTREAM") {
            self.upstream = upstream.parse()?;
        }

        if let Some(servers) = lookup("DNSSEC_CHAIN_DOH_SERVERS") {
            self.doh_servers = split_list(&servers).map(|s| s.to_string()).collect();
        }

        if let Some(servers) = lookup("DNSSEC_CHAIN_UDP_SERVERS") {
            self.udp_servers = split_list(&servers)
                .map(|s| {
                    s.parse::<SocketAddr>().map_err(|_| ConfigError::InvalidValue {
                        field: "udp_servers",
                        reason: format!("not a socket address: {}", s),
                    })
                })
                .collect::<Result<_, _>>()?;
        }

        if let Some(timeout) = lookup("DNSSEC_CHAIN_QUERY_TIMEOUT") {
            let secs = parse_number::<u64>("query_timeout", &timeout)?;
            self.query_timeout = Duration::from_secs(secs);
        }

        if let Some(size) = lookup("DNSSEC_CHAIN_EDNS_PAYLOAD") {
            self.edns_payload_size = parse_number("edns_payload_size", &size)?;
        }

        if let Some(depth) = lookup("DNSSEC_CHAIN_MAX_DEPTH") {
            self.max_chain_depth = parse_number("max_chain_depth", &depth)?;
        }

        if let Some(url) = lookup("DNSSEC_CHAIN_ANCHORS_URL") {
            self.root_anchors_url = url;
        }

        if let Some(url) = lookup("DNSSEC_CHAIN_ANCHORS_SIGNATURE_URL") {
            self.root_anchors_signature_url = url;
        }

        if let Some(path) = lookup("DNSSEC_CHAIN_ROOT_CA") {
            self.root_ca_path = (!path.trim().is_empty()).then(|| PathBuf::from(path.trim()));
        }

        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.upstream {
            Upstream::Doh if self.doh_servers.is_empty() => {
                return Err(invalid("doh_servers", "no DNS-over-HTTPS servers configured"));
            }
            Upstream::Udp if self.udp_servers.is_empty() => {
                return Err(invalid("udp_servers", "no DNS servers configured"));
            }
            _ => {}
        }

        if self.query_timeout.is_zero() {
            return Err(invalid("query_timeout", "must be greater than 0"));
        }
        if self.query_timeout > MAX_QUERY_TIMEOUT {
            return Err(invalid("query_timeout", "too large (max 300 seconds)"));
        }

        if self.edns_payload_size < DNSSEC_UDP_SIZE {
            return Err(invalid(
                "edns_payload_size",
                format!("must be at least {}", DNSSEC_UDP_SIZE),
            ));
        }

        if !(1..=MAX_CHAIN_DEPTH).contains(&self.max_chain_depth) {
            return Err(invalid(
                "max_chain_depth",
                format!("must be between 1 and {}", MAX_CHAIN_DEPTH),
            ));
        }

        if self.root_anchors_url.is_empty() || self.root_anchors_signature_url.is_empty() {
            return Err(invalid("root_anchors_url", "anchor URLs must not be empty"));
        }

        Ok(())
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        field,
        reason: reason.into(),
    }
}

fn split_list(value: &str) -> impl Iterator<Item = &str> {
    value.split(',').map(str::trim).filter(|s| !s.is_empty())
}

fn parse_number<T: FromStr>(field: &'static str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse::<T>()
        .map_err(|_| invalid(field, format!("not a number: {}", value)))
}
