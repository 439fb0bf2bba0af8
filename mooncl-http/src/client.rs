//! Client for the listing API's ranking and detail endpoints.
//!
//! Routes, relative to the configured base URL:
//!
//! - `GET api/v1/nfts/ranking?sort_by=&limit=&offset=` - one ranking page
//! - `GET api/v1/nfts/detail/{token_id}` - one token
//!
//! With a network configured, both routes gain a segment:
//! `api/v1/{network}/nfts/...`.
//!
//! Without a base URL every request fails fast with
//! [`FetchError::MissingBaseUrl`].

use std::time::Duration;

use mooncl::config::AppConfig;
use mooncl::listing::{DetailSource, NftDetail, RankedItem, RankingQuery, RankingSource};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use url::Url;

#[cfg(feature = "telemetry")]
use tracing::instrument;

use crate::error::FetchError;

/// Client for the listing API.
#[derive(Clone, Debug)]
pub struct NftApiClient {
    /// Base URL, always ending in `/`.
    base_url: Option<Url>,
    /// Optional chain segment of the routes.
    network: Option<String>,
    /// Shared Reqwest HTTP client
    client: Client,
    /// Optional request timeout
    timeout: Option<Duration>,
}

/// Error body of the listing API.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
}

impl NftApiClient {
    /// Creates a client for `base_url`. Without one, every request fails with
    /// [`FetchError::MissingBaseUrl`].
    #[must_use]
    pub fn new(base_url: Option<Url>) -> Self {
        Self {
            base_url: base_url.map(with_trailing_slash),
            network: None,
            client: Client::new(),
            timeout: None,
        }
    }

    /// Creates a client from the `MOONCL_API_*` settings.
    #[must_use]
    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.api_base.clone()).with_network(config.api_network.clone())
    }

    /// Routes requests through the chain-specific `api/v1/{network}/...` variant.
    #[must_use]
    pub fn with_network(mut self, network: Option<String>) -> Self {
        self.network = network.filter(|network| !network.is_empty());
        self
    }

    /// Sets a timeout for all future requests.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Uses `client` instead of a default one.
    #[must_use]
    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    /// Returns the base URL used by this client.
    pub const fn base_url(&self) -> Option<&Url> {
        self.base_url.as_ref()
    }

    /// Returns the configured timeout, if any.
    pub const fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    fn endpoint(&self, route: &str, context: &'static str) -> Result<Url, FetchError> {
        let base = self.base_url.as_ref().ok_or(FetchError::MissingBaseUrl)?;
        let path = match &self.network {
            Some(network) => format!("api/v1/{network}/nfts/{route}"),
            None => format!("api/v1/nfts/{route}"),
        };
        base.join(&path)
            .map_err(|source| FetchError::UrlParse { context, source })
    }

    /// Full URL of a ranking request.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::MissingBaseUrl`] or [`FetchError::UrlParse`].
    pub fn ranking_url(&self, query: &RankingQuery) -> Result<Url, FetchError> {
        let mut url = self.endpoint("ranking", "Failed to construct ranking URL")?;
        let pairs = query.to_pairs();
        if !pairs.is_empty() {
            url.query_pairs_mut().extend_pairs(pairs);
        }
        Ok(url)
    }

    /// Full URL of a detail request.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::MissingBaseUrl`] or [`FetchError::UrlParse`].
    pub fn detail_url(&self, token_id: u64) -> Result<Url, FetchError> {
        self.endpoint(
            &format!("detail/{token_id}"),
            "Failed to construct detail URL",
        )
    }

    /// Sends a `GET .../nfts/ranking` request.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError`] if the request fails or the server answers with an error.
    #[cfg_attr(
        feature = "telemetry",
        instrument(name = "mooncl.api.ranking", skip_all, fields(sort_by = ?query.sort_by, offset = ?query.offset), err)
    )]
    pub async fn ranking(&self, query: RankingQuery) -> Result<Vec<RankedItem>, FetchError> {
        let url = self.ranking_url(&query)?;
        self.get_json(url, "GET /nfts/ranking").await
    }

    /// Sends a `GET .../nfts/detail/{token_id}` request.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::NotFound`] for unknown tokens and another
    /// [`FetchError`] if the request fails.
    #[cfg_attr(
        feature = "telemetry",
        instrument(name = "mooncl.api.detail", skip(self), err)
    )]
    pub async fn detail(&self, token_id: u64) -> Result<NftDetail, FetchError> {
        let url = self.detail_url(token_id)?;
        self.get_json(url, "GET /nfts/detail").await
    }

    /// GET helper handling timeout application and error mapping.
    ///
    /// `context` is a human-readable identifier used in error messages (e.g. `"GET /nfts/ranking"`).
    async fn get_json<R>(&self, url: Url, context: &'static str) -> Result<R, FetchError>
    where
        R: serde::de::DeserializeOwned,
    {
        let mut req = self.client.get(url);
        if let Some(timeout) = self.timeout {
            req = req.timeout(timeout);
        }
        let http_response = req
            .send()
            .await
            .map_err(|e| FetchError::Http { context, source: e })?;

        let status = http_response.status();
        if status.is_success() {
            return http_response
                .json::<R>()
                .await
                .map_err(|e| FetchError::JsonDeserialization { context, source: e });
        }
        if status == StatusCode::NOT_FOUND {
            return Err(FetchError::NotFound);
        }
        let body = http_response
            .text()
            .await
            .map_err(|e| FetchError::ResponseBodyRead { context, source: e })?;
        Err(FetchError::Status {
            context,
            status,
            message: error_message(status, &body),
        })
    }
}

/// The server's `message` field, or `HTTP <code>`.
fn error_message(status: StatusCode, body: &str) -> String {
    serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|body| body.message)
        .filter(|message| !message.is_empty())
        .unwrap_or_else(|| format!("HTTP {}", status.as_u16()))
}

fn with_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

/// Converts a string URL into a `NftApiClient`.
impl TryFrom<&str> for NftApiClient {
    type Error = FetchError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let url = Url::parse(value).map_err(|e| FetchError::UrlParse {
            context: "Failed to parse base url",
            source: e,
        })?;
        Ok(Self::new(Some(url)))
    }
}

impl RankingSource for NftApiClient {
    type Error = FetchError;

    async fn ranking(&self, query: RankingQuery) -> Result<Vec<RankedItem>, FetchError> {
        Self::ranking(self, query).await
    }
}

impl DetailSource for NftApiClient {
    type Error = FetchError;

    async fn detail(&self, token_id: u64) -> Result<NftDetail, FetchError> {
        Self::detail(self, token_id).await
    }
}
