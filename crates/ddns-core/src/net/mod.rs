// # HTTP clients
//
// Builds the three long-lived clients an updater needs: one public address
// lookup client per family and one push client shared by every provider.
//
// ## Local address binding
//
// A lookup client may be pinned to a local source address. The address is
// resolved once, at construction. Every lookup first goes out through a
// client bound to it; if that connection attempt fails, the same lookup is
// retried once through an unbound client.
//
// ## Proxies
//
// A configured proxy applies to every request of that client. Without one,
// system proxy settings are ignored.

use crate::error::{Error, Result};
use crate::traits::{AddressSource, IpVersion};

use async_trait::async_trait;
use std::net::{IpAddr, SocketAddr, ToSocketAddrs};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// Settings for one public address lookup client
#[derive(Debug, Clone)]
pub struct AddressClientConfig {
    /// Lookup service URL (plain-text response)
    pub url: String,

    /// Optional proxy URL
    pub proxy: Option<String>,

    /// Optional local source address (IP, IP:port or host name)
    pub local_addr: Option<String>,

    /// Request timeout
    pub timeout: Duration,
}

/// Build a public address lookup client for `version`
pub fn build_address_client(
    version: IpVersion,
    config: &AddressClientConfig,
) -> Result<HttpAddressSource> {
    let url = Url::parse(&config.url).map_err(|e| {
        Error::config(format!(
            "invalid url about public {} address provider {:?}: {}",
            version, config.url, e
        ))
    })?;

    let unbound = client_builder(config.proxy.as_deref(), config.timeout)?
        .build()
        .map_err(|e| Error::config(format!("failed to build {} client: {}", version, e)))?;

    let bound = match config.local_addr.as_deref() {
        Some(local) => {
            let local = resolve_local_address(version, local)?;
            let client = client_builder(config.proxy.as_deref(), config.timeout)?
                .local_address(local)
                .build()
                .map_err(|e| {
                    Error::config(format!("failed to build bound {} client: {}", version, e))
                })?;
            Some((local, client))
        }
        None => None,
    };

    Ok(HttpAddressSource {
        version,
        url,
        bound,
        unbound,
    })
}

/// Build the push client shared by all providers and families
pub fn build_push_client(proxy: Option<&str>, timeout: Duration) -> Result<reqwest::Client> {
    client_builder(proxy, timeout)?
        .build()
        .map_err(|e| Error::config(format!("failed to build push client: {}", e)))
}

fn client_builder(proxy: Option<&str>, timeout: Duration) -> Result<reqwest::ClientBuilder> {
    let builder = reqwest::Client::builder().timeout(timeout);
    match proxy {
        Some(proxy) => {
            let invalid =
                |e: &dyn std::fmt::Display| Error::config(format!("invalid proxy url {:?}: {}", proxy, e));
            let url = Url::parse(proxy).map_err(|e| invalid(&e))?;
            let proxy = reqwest::Proxy::all(url).map_err(|e| invalid(&e))?;
            Ok(builder.proxy(proxy))
        }
        None => Ok(builder.no_proxy()),
    }
}

/// Resolve a configured local address to an IP of the requested family
///
/// Accepts an IP literal, a socket address (the port is ignored, the OS
/// picks one per connection) or a host name.
pub fn resolve_local_address(version: IpVersion, local: &str) -> Result<IpAddr> {
    let invalid = |reason: String| {
        Error::config(format!(
            "invalid local {} address {:?}: {}",
            version, local, reason
        ))
    };

    let candidates: Vec<IpAddr> = if let Ok(ip) = local.parse::<IpAddr>() {
        vec![ip]
    } else if let Ok(addr) = local.parse::<SocketAddr>() {
        vec![addr.ip()]
    } else {
        let resolved = if local.contains(':') {
            local.to_socket_addrs()
        } else {
            (local, 0).to_socket_addrs()
        };
        resolved
            .map_err(|e| invalid(e.to_string()))?
            .map(|addr| addr.ip())
            .collect()
    };

    candidates
        .into_iter()
        .find(|ip| version.matches(ip))
        .ok_or_else(|| invalid(format!("no {} address found", version)))
}

/// Public address lookup over HTTP
pub struct HttpAddressSource {
    version: IpVersion,
    url: Url,
    bound: Option<(IpAddr, reqwest::Client)>,
    unbound: reqwest::Client,
}

impl std::fmt::Debug for HttpAddressSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpAddressSource")
            .field("version", &self.version)
            .field("url", &self.url.as_str())
            .field("local_addr", &self.local_address())
            .finish()
    }
}

impl HttpAddressSource {
    /// Lookup service URL
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Local source address lookups try first, if any
    pub fn local_address(&self) -> Option<IpAddr> {
        self.bound.as_ref().map(|(local, _)| *local)
    }

    async fn read_address(&self, response: reqwest::Response) -> Result<String> {
        let status = response.status();
        if !status.is_success() {
            return Err(Error::lookup(self.version, format!("HTTP status {}", status)));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| Error::lookup(self.version, format!("failed to read response: {}", e)))?;
        let text = String::from_utf8_lossy(&body);
        let text = text.trim();

        let ip: IpAddr = text
            .parse()
            .map_err(|_| Error::lookup(self.version, format!("invalid address {:?}", text)))?;
        if !self.version.matches(&ip) {
            return Err(Error::lookup(
                self.version,
                format!("expected {} address, got {}", self.version, ip),
            ));
        }

        Ok(ip.to_string())
    }
}

#[async_trait]
impl AddressSource for HttpAddressSource {
    async fn current(&self) -> Result<String> {
        if let Some((local, bound)) = &self.bound {
            match bound.get(self.url.clone()).send().await {
                Ok(response) => return self.read_address(response).await,
                Err(e) if e.is_connect() => {
                    warn!(
                        version = %self.version,
                        local = %local,
                        "Bound connection failed, retrying without local address: {}",
                        e
                    );
                }
                Err(e) => return Err(Error::lookup(self.version, e.to_string())),
            }
        }

        let response = self
            .unbound
            .get(self.url.clone())
            .send()
            .await
            .map_err(|e| Error::lookup(self.version, e.to_string()))?;
        let ip = self.read_address(response).await?;
        debug!(version = %self.version, "Resolved through unbound client");
        Ok(ip)
    }

    fn version(&self) -> IpVersion {
        self.version
    }
}

/// Log the effective client setup once at construction
pub(crate) fn log_address_client(source: &HttpAddressSource, config: &AddressClientConfig) {
    info!(
        version = %source.version,
        url = %source.url,
        proxy = config.proxy.as_deref().unwrap_or("none"),
        local = ?source.local_address(),
        "Public address lookup configured"
    );
}
