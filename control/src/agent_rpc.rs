use anyhow::{Context, Result};
use reqwest::Client;
use serde::Serialize;
use std::net::IpAddr;
use tracing::debug;

use crate::envelope::{Envelope, CODE_SUCCESS};

/// Why a call to an agent came back without a success envelope.
#[derive(Debug, thiserror::Error)]
pub enum AgentCallError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("failed to parse response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("agent at {url} returned error {code}: {message}")]
    Remote {
        url: String,
        code: u32,
        message: String,
    },
}

/// HTTP client for the controller-to-agent direction. Agents reply with the
/// shared envelope; any non-zero code is surfaced as `Remote`.
pub struct AgentClient {
    http: Client,
}

impl AgentClient {
    pub fn new() -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { http })
    }

    pub async fn post<B: Serialize>(
        &self,
        address: &str,
        port: u16,
        path: &str,
        body: &B,
    ) -> Result<Envelope, AgentCallError> {
        let url = agent_url(address, port, path);
        debug!("POST {}", url);

        let resp = self
            .http
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|source| AgentCallError::Transport {
                url: url.clone(),
                source,
            })?
            .error_for_status()
            .map_err(|source| AgentCallError::Transport {
                url: url.clone(),
                source,
            })?;

        decode_envelope(resp, url).await
    }

    /// POST without a body, for the path-parameterized lifecycle endpoints.
    pub async fn post_empty(
        &self,
        address: &str,
        port: u16,
        path: &str,
    ) -> Result<Envelope, AgentCallError> {
        let url = agent_url(address, port, path);
        debug!("POST {}", url);

        let resp = self
            .http
            .post(&url)
            .send()
            .await
            .map_err(|source| AgentCallError::Transport {
                url: url.clone(),
                source,
            })?
            .error_for_status()
            .map_err(|source| AgentCallError::Transport {
                url: url.clone(),
                source,
            })?;

        decode_envelope(resp, url).await
    }

    pub async fn get(
        &self,
        address: &str,
        port: u16,
        path: &str,
    ) -> Result<Envelope, AgentCallError> {
        let url = agent_url(address, port, path);
        debug!("GET {}", url);

        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|source| AgentCallError::Transport {
                url: url.clone(),
                source,
            })?
            .error_for_status()
            .map_err(|source| AgentCallError::Transport {
                url: url.clone(),
                source,
            })?;

        decode_envelope(resp, url).await
    }
}

async fn decode_envelope(resp: reqwest::Response, url: String) -> Result<Envelope, AgentCallError> {
    let envelope = resp
        .json::<Envelope>()
        .await
        .map_err(|source| AgentCallError::Decode {
            url: url.clone(),
            source,
        })?;

    if envelope.code != CODE_SUCCESS {
        return Err(AgentCallError::Remote {
            url,
            code: envelope.code,
            message: envelope.message,
        });
    }

    Ok(envelope)
}

/// Builds `http://<host>:<port>/api/v1/<path>` from a stored server address.
/// Bare IPv6 addresses get bracketed; an address that already carries a port
/// wins over the stored one.
fn agent_url(address: &str, port: u16, path: &str) -> String {
    let host = match address.parse::<IpAddr>() {
        Ok(IpAddr::V6(_)) => format!("[{address}]:{port}"),
        Ok(IpAddr::V4(_)) => format!("{address}:{port}"),
        Err(_) if address.contains(':') => address.to_string(),
        Err(_) => format!("{address}:{port}"),
    };

    format!("http://{host}/api/v1/{path}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ipv4_address_gets_port() {
        assert_eq!(
            agent_url("10.0.0.5", 10750, "application"),
            "http://10.0.0.5:10750/api/v1/application"
        );
    }

    #[test]
    fn test_bare_ipv6_is_bracketed() {
        assert_eq!(
            agent_url("2001:db8::1", 10750, "server/info"),
            "http://[2001:db8::1]:10750/api/v1/server/info"
        );
    }

    #[test]
    fn test_address_with_port_passes_through() {
        assert_eq!(
            agent_url("10.0.0.5:9000", 10750, "application"),
            "http://10.0.0.5:9000/api/v1/application"
        );
        assert_eq!(
            agent_url("[2001:db8::1]:9000", 10750, "application"),
            "http://[2001:db8::1]:9000/api/v1/application"
        );
    }

    #[test]
    fn test_hostname_gets_port() {
        assert_eq!(
            agent_url("agent-3.internal", 10750, "application/delete/42"),
            "http://agent-3.internal:10750/api/v1/application/delete/42"
        );
    }
}
