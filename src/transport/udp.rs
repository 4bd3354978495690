//! Plain DNS over UDP, retried over TCP when the answer is truncated.

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};
use tokio::time::timeout;
use tracing::{debug, trace, warn};

use super::QueryExchange;
use crate::dns::DNSPacket;
use crate::error::{DnsError, QueryError};

const MAX_UDP_RESPONSE: usize = 65535;

#[derive(Debug, Clone)]
pub struct UdpExchange {
    servers: Vec<SocketAddr>,
    timeout: Duration,
}

impl UdpExchange {
    pub fn new(servers: Vec<SocketAddr>, timeout: Duration) -> Self {
        Self { servers, timeout }
    }

    async fn query_server(
        &self,
        query_bytes: &[u8],
        query_id: u16,
        server: SocketAddr,
    ) -> Result<DNSPacket, QueryError> {
        let query_future = async {
            let response = self.send_udp_query(query_bytes, server).await?;
            check_id(&response, query_id)?;
            if response.header.tc {
                debug!("UDP response from {} truncated, retrying with TCP", server);
                let response = self.send_tcp_query(query_bytes, server).await?;
                check_id(&response, query_id)?;
                return Ok(response);
            }
            Ok::<_, QueryError>(response)
        };

        timeout(self.timeout, query_future)
            .await
            .map_err(|_| QueryError::Timeout(self.timeout))?
    }

    async fn send_udp_query(
        &self,
        query_bytes: &[u8],
        server: SocketAddr,
    ) -> Result<DNSPacket, QueryError> {
        let bind_addr = if server.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
        let socket = UdpSocket::bind(bind_addr).await?;
        socket.connect(server).await?;
        socket.send(query_bytes).await?;

        let mut buf = vec![0u8; MAX_UDP_RESPONSE];
        let len = socket.recv(&mut buf).await?;
        trace!("Raw UDP response ({} bytes) from {}", len, server);

        Ok(DNSPacket::parse(&buf[..len])?)
    }

    async fn send_tcp_query(
        &self,
        query_bytes: &[u8],
        server: SocketAddr,
    ) -> Result<DNSPacket, QueryError> {
        let mut stream = TcpStream::connect(server).await?;

        let query_len = u16::try_from(query_bytes.len()).map_err(|_| {
            DnsError::InvalidPacket(format!("query of {} bytes exceeds TCP framing", query_bytes.len()))
        })?;
        stream.write_all(&query_len.to_be_bytes()).await?;
        stream.write_all(query_bytes).await?;
        stream.flush().await?;

        let mut len_buf = [0u8; 2];
        stream.read_exact(&mut len_buf).await?;
        let response_len = u16::from_be_bytes(len_buf) as usize;
        if response_len < crate::dns::HEADER_LEN {
            return Err(DnsError::BufferTooSmall {
                need: crate::dns::HEADER_LEN,
                have: response_len,
            }
            .into());
        }

        let mut buf = vec![0u8; response_len];
        stream.read_exact(&mut buf).await?;
        trace!("Raw TCP response ({} bytes) from {}", response_len, server);

        Ok(DNSPacket::parse(&buf)?)
    }
}

fn check_id(response: &DNSPacket, expected: u16) -> Result<(), QueryError> {
    if response.header.id != expected {
        return Err(QueryError::IdMismatch {
            expected,
            got: response.header.id,
        });
    }
    if !response.header.qr {
        return Err(DnsError::InvalidPacket("answer does not have QR set".to_string()).into());
    }
    Ok(())
}

#[async_trait]
impl QueryExchange for UdpExchange {
    async fn exchange(&self, query: &DNSPacket) -> Result<DNSPacket, QueryError> {
        let query_bytes = query.serialize()?;
        let mut last_error = None;

        for &server in &self.servers {
            match self.query_server(&query_bytes, query.header.id, server).await {
                Ok(response) => return Ok(response),
                Err(e) => {
                    warn!("Query to {} failed: {}", server, e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or(QueryError::NoServers))
    }
}
