//! Connection settings for an XBMC instance

use std::borrow::Cow;
use std::time::Duration;

use jsonrpc_client::ConnectionConfig;

use crate::error::{Result, XbmcError};

/// Where an XBMC instance listens and how long to wait for it
///
/// The schema is fetched over HTTP; requests and notifications use the
/// persistent TCP transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XbmcConfig {
    pub host: String,

    /// Web server port serving the schema
    /// Default: 8080
    pub http_port: u16,

    /// JSON-RPC TCP port
    /// Default: 9090
    pub tcp_port: u16,

    /// Default: 5 seconds
    pub connect_timeout: Duration,

    /// Deadline for writing a request and for its correlated reply
    /// Default: 10 seconds
    pub request_timeout: Duration,

    /// Deadline for the schema download
    /// Default: 10 seconds
    pub discovery_timeout: Duration,
}

impl Default for XbmcConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            http_port: 8080,
            tcp_port: 9090,
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(10),
            discovery_timeout: Duration::from_secs(10),
        }
    }
}

impl XbmcConfig {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Default::default()
        }
    }

    /// Defaults overridden by `XBMC_HOST`, `XBMC_HTTP_PORT` and `XBMC_TCP_PORT`
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        if let Ok(host) = std::env::var("XBMC_HOST") {
            config.host = host;
        }
        if let Some(port) = port_from_env("XBMC_HTTP_PORT")? {
            config.http_port = port;
        }
        if let Some(port) = port_from_env("XBMC_TCP_PORT")? {
            config.tcp_port = port;
        }
        Ok(config)
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_ports(mut self, http_port: u16, tcp_port: u16) -> Self {
        self.http_port = http_port;
        self.tcp_port = tcp_port;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_discovery_timeout(mut self, timeout: Duration) -> Self {
        self.discovery_timeout = timeout;
        self
    }

    /// `http://{host}:{http_port}/jsonrpc`
    pub fn discovery_url(&self) -> String {
        format!("http://{}:{}/jsonrpc", self.address_host(), self.http_port)
    }

    /// `{host}:{tcp_port}`
    pub fn tcp_address(&self) -> String {
        format!("{}:{}", self.address_host(), self.tcp_port)
    }

    /// Host as it appears before `:port`; IPv6 literals get brackets
    fn address_host(&self) -> Cow<'_, str> {
        if self.host.contains(':') && !self.host.starts_with('[') {
            Cow::Owned(format!("[{}]", self.host))
        } else {
            Cow::Borrowed(&self.host)
        }
    }

    pub fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig {
            connect_timeout: self.connect_timeout,
            request_timeout: self.request_timeout,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.host.is_empty() {
            return Err(XbmcError::Config("Host must not be empty".to_string()));
        }
        if self.request_timeout == Duration::ZERO {
            return Err(XbmcError::Config(
                "Request timeout must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

fn port_from_env(var: &str) -> Result<Option<u16>> {
    match std::env::var(var) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| XbmcError::Config(format!("{var}={raw:?}: {e}"))),
        Err(_) => Ok(None),
    }
}
