//! DNS-over-HTTPS client (RFC 8484, POST with wire-format bodies)

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use tracing::{debug, trace, warn};

use super::QueryExchange;
use crate::dns::DNSPacket;
use crate::error::QueryError;

const DNS_MESSAGE: &str = "application/dns-message";

/// Tries each configured server in order and returns the first answer.
#[derive(Debug, Clone)]
pub struct DohExchange {
    client: reqwest::Client,
    servers: Vec<String>,
    timeout: Duration,
}

impl DohExchange {
    pub fn new(servers: Vec<String>, timeout: Duration) -> Result<Self, QueryError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("dnssec-chain/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| QueryError::Http {
                server: String::new(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            client,
            servers,
            timeout,
        })
    }

    async fn post(&self, server: &str, body: Vec<u8>) -> Result<DNSPacket, QueryError> {
        let response = self
            .client
            .post(server)
            .header(CONTENT_TYPE, DNS_MESSAGE)
            .header(ACCEPT, DNS_MESSAGE)
            .body(body)
            .send()
            .await
            .map_err(|e| self.request_error(server, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(QueryError::HttpStatus {
                server: server.to_string(),
                status: status.as_u16(),
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| self.request_error(server, e))?;
        trace!("Received {} bytes from {}", bytes.len(), server);

        Ok(DNSPacket::parse(&bytes)?)
    }

    fn request_error(&self, server: &str, err: reqwest::Error) -> QueryError {
        if err.is_timeout() {
            QueryError::Timeout(self.timeout)
        } else {
            QueryError::Http {
                server: server.to_string(),
                reason: err.to_string(),
            }
        }
    }
}

#[async_trait]
impl QueryExchange for DohExchange {
    async fn exchange(&self, query: &DNSPacket) -> Result<DNSPacket, QueryError> {
        let body = query.serialize()?;
        let mut last_error = None;

        for server in &self.servers {
            match self.post(server, body.clone()).await {
                Ok(response) => {
                    debug!(
                        "DoH answer from {}: rcode={}, answers={}",
                        server,
                        response.header.rcode,
                        response.answers.len()
                    );
                    return Ok(response);
                }
                Err(e) => {
                    warn!("DoH query to {} failed: {}", server, e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or(QueryError::NoServers))
    }
}
