//! An HTTP client that fetches feature definitions from the Unleash server.
use std::{sync::Arc, time::Duration};

use reqwest::{header::AUTHORIZATION, Url};

use crate::{features::FeatureSet, ClientConfig, Error, Result};

/// Source of feature definitions.
///
/// [`HttpFetcher`] is used by default. Fetch failures ([`Error::Network`], [`Error::Decode`]) are
/// eligible for failover.
pub trait FeatureFetcher: Send + Sync {
    fn fetch(&self) -> Result<FeatureSet>;
}

impl<T: FeatureFetcher + ?Sized> FeatureFetcher for Arc<T> {
    fn fetch(&self) -> Result<FeatureSet> {
        (**self).fetch()
    }
}

impl<T: FeatureFetcher + ?Sized> FeatureFetcher for Box<T> {
    fn fetch(&self) -> Result<FeatureSet> {
        (**self).fetch()
    }
}

/// Fetches the feature set with a blocking GET against the configured features endpoint.
pub struct HttpFetcher {
    // Client holds a connection pool internally, so we're reusing the client between requests.
    client: reqwest::blocking::Client,
    url: Url,
    api_key: Option<String>,
    app_name: Option<String>,
    instance_id: Option<String>,
}

impl HttpFetcher {
    /// Default timeout for a single features request.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

    /// Create a fetcher for the endpoint and credentials in `config`.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidEndpoint`] if `features_endpoint` is not a valid URL.
    /// - [`Error::Network`] if the HTTP client cannot be initialized.
    pub fn new(config: &ClientConfig) -> Result<HttpFetcher> {
        let url = Url::parse(&config.features_endpoint).map_err(Error::InvalidEndpoint)?;

        let client = reqwest::blocking::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        Ok(HttpFetcher {
            client,
            url,
            api_key: config.api_key.clone(),
            app_name: config.app_name.clone(),
            instance_id: config.instance_id.clone(),
        })
    }
}

impl FeatureFetcher for HttpFetcher {
    fn fetch(&self) -> Result<FeatureSet> {
        log::debug!(target: "unleash", url:display = self.url; "fetching features");

        let mut request = self.client.get(self.url.clone());
        if let Some(api_key) = &self.api_key {
            request = request.header(AUTHORIZATION, api_key);
        }
        if let Some(app_name) = &self.app_name {
            request = request.header("UNLEASH-APPNAME", app_name);
        }
        if let Some(instance_id) = &self.instance_id {
            request = request.header("UNLEASH-INSTANCEID", instance_id);
        }

        let response = request
            .send()
            .inspect_err(|err| {
                log::warn!(target: "unleash", "error while fetching features: {:?}", err);
            })?
            .error_for_status()
            .inspect_err(|err| {
                log::warn!(target: "unleash", "received non-success response while fetching features: {:?}", err.status());
            })?;

        let body = response.text()?;
        let set: FeatureSet = serde_json::from_str(&body).inspect_err(|err| {
            log::warn!(target: "unleash", "failed to parse features response body: {:?}", err);
        })?;

        log::debug!(target: "unleash", count = set.features.len(); "successfully fetched features");

        Ok(set)
    }
}

impl std::fmt::Debug for HttpFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpFetcher")
            .field("url", &self.url.as_str())
            .field("app_name", &self.app_name)
            .field("instance_id", &self.instance_id)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::HttpFetcher;
    use crate::{ClientConfig, Error};

    #[test]
    fn rejects_invalid_endpoint() {
        let err = HttpFetcher::new(&ClientConfig::new("not a url")).unwrap_err();
        assert!(matches!(err, Error::InvalidEndpoint(_)));
    }

    #[test]
    fn accepts_valid_endpoint() {
        let config = ClientConfig::new("http://localhost:4242/api/client/features")
            .api_key("token")
            .app_name("demo");
        let fetcher = HttpFetcher::new(&config).unwrap();

        assert_eq!(
            fetcher.url.as_str(),
            "http://localhost:4242/api/client/features"
        );
        assert_eq!(fetcher.api_key.as_deref(), Some("token"));
    }
}
