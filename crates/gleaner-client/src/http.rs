use std::net::IpAddr;
use std::time::Duration;

use gleaner_core::config::ExtractorConfig;
use gleaner_core::error::ScrapingError;
use gleaner_core::traits::Fetcher;
use reqwest::{Client, Response, redirect};
use url::{Host, Url};

/// Largest response body read into memory, pages and images alike.
pub const DEFAULT_MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// reqwest-backed [`Fetcher`] for the fallback tiers and image downloads.
///
/// Targets resolving to internal addresses are refused unless
/// [`allow_private_urls`](Self::allow_private_urls) was called.
#[derive(Clone)]
pub struct ReqwestFetcher {
    client: Client,
    timeout_secs: u64,
    max_body_bytes: usize,
    block_private: bool,
}

impl ReqwestFetcher {
    pub fn new(config: &ExtractorConfig) -> Result<Self, ScrapingError> {
        Self::build(&config.user_agent, config.request_timeout, config.max_redirects)
    }

    pub fn build(
        user_agent: &str,
        timeout: Duration,
        max_redirects: usize,
    ) -> Result<Self, ScrapingError> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .redirect(redirect::Policy::limited(max_redirects))
            .build()
            .map_err(|e| ScrapingError::ConfigError(format!("HTTP client: {e}")))?;

        Ok(Self {
            client,
            timeout_secs: timeout.as_secs(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            block_private: true,
        })
    }

    pub fn with_max_body_bytes(mut self, limit: usize) -> Self {
        self.max_body_bytes = limit;
        self
    }

    /// Permit loopback and private targets, as the CLI does.
    pub fn allow_private_urls(mut self) -> Self {
        self.block_private = false;
        self
    }

    async fn get(&self, url: &str) -> Result<Response, ScrapingError> {
        if self.block_private {
            guard_target(url).await?;
        }

        let response = self.client.get(url).send().await.map_err(|e| match e {
            e if e.is_timeout() => ScrapingError::NetworkFailure(format!(
                "{url} did not answer within {}s",
                self.timeout_secs
            )),
            e if e.is_redirect() => ScrapingError::HttpError(format!("Redirect limit hit for {url}")),
            e => ScrapingError::NetworkFailure(format!("{url}: {e}")),
        })?;

        match response.status() {
            status if status.is_success() => Ok(response),
            status => Err(ScrapingError::HttpError(format!(
                "HTTP {} for {url}",
                status.as_u16()
            ))),
        }
    }
}

impl ReqwestFetcher {
    /// Read the body chunk by chunk, refusing anything over the size limit.
    async fn read_body(&self, mut response: Response, url: &str) -> Result<Vec<u8>, ScrapingError> {
        let limit = self.max_body_bytes;
        let too_large = || ScrapingError::HttpError(format!("Body of {url} exceeds {limit} bytes"));

        if response.content_length().is_some_and(|len| len > limit as u64) {
            return Err(too_large());
        }
        let mut body = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| ScrapingError::NetworkFailure(format!("Body of {url} cut short: {e}")))?
        {
            if body.len() + chunk.len() > limit {
                return Err(too_large());
            }
            body.extend_from_slice(&chunk);
        }
        Ok(body)
    }
}

impl Fetcher for ReqwestFetcher {
    async fn fetch(&self, url: &str) -> Result<String, ScrapingError> {
        let response = self.get(url).await?;
        let body = self.read_body(response, url).await?;
        Ok(String::from_utf8_lossy(&body).into_owned())
    }

    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, ScrapingError> {
        let image = async {
            let response = self.get(url).await?;
            self.read_body(response, url).await
        };
        image.await.map_err(|e| ScrapingError::ImageFetch(e.to_string()))
    }
}

/// Why an address is off limits, or `None` if it is publicly routable.
fn blocked_range(ip: IpAddr) -> Option<&'static str> {
    match ip {
        IpAddr::V4(v4) => {
            let [a, b, ..] = v4.octets();
            if v4.is_loopback() {
                Some("loopback")
            } else if v4.is_private() {
                Some("private")
            } else if v4.is_link_local() {
                Some("link-local")
            } else if a == 100 && (64..128).contains(&b) {
                Some("carrier-grade NAT")
            } else if v4.is_unspecified() || v4.is_broadcast() || v4.is_documentation() {
                Some("reserved")
            } else {
                None
            }
        }
        IpAddr::V6(v6) => {
            if let Some(v4) = v6.to_ipv4_mapped() {
                return blocked_range(IpAddr::V4(v4));
            }
            let head = v6.segments()[0];
            if v6.is_loopback() {
                Some("loopback")
            } else if v6.is_unspecified() {
                Some("reserved")
            } else if head & 0xFFC0 == 0xFE80 {
                Some("link-local")
            } else if head & 0xFE00 == 0xFC00 {
                Some("unique-local")
            } else {
                None
            }
        }
    }
}

/// Refuse targets that would let a caller reach internal services.
///
/// The URL must be http(s) and every address its host resolves to must be
/// publicly routable. IP literals skip the DNS lookup.
pub(crate) async fn guard_target(url: &str) -> Result<(), ScrapingError> {
    let parsed =
        Url::parse(url).map_err(|e| ScrapingError::HttpError(format!("Invalid URL {url}: {e}")))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ScrapingError::HttpError(format!(
            "Refusing {} URL {url}",
            parsed.scheme()
        )));
    }

    let addrs: Vec<IpAddr> = match parsed.host() {
        Some(Host::Ipv4(v4)) => vec![IpAddr::V4(v4)],
        Some(Host::Ipv6(v6)) => vec![IpAddr::V6(v6)],
        Some(Host::Domain(domain)) => {
            let port = parsed.port_or_known_default().unwrap_or(80);
            tokio::net::lookup_host((domain, port))
                .await
                .map_err(|e| ScrapingError::NetworkFailure(format!("Cannot resolve {domain}: {e}")))?
                .map(|addr| addr.ip())
                .collect()
        }
        None => return Err(ScrapingError::HttpError(format!("No host in {url}"))),
    };

    if addrs.is_empty() {
        return Err(ScrapingError::NetworkFailure(format!("No addresses for {url}")));
    }
    for ip in addrs {
        if let Some(range) = blocked_range(ip) {
            tracing::warn!(url, %ip, range, "Blocked request to internal address");
            return Err(ScrapingError::HttpError(format!(
                "Refusing {url}: {ip} is a {range} address"
            )));
        }
    }
    Ok(())
}
