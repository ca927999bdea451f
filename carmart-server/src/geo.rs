use std::{net::IpAddr, sync::Arc};

use anyhow::Context;
use async_trait::async_trait;
use axum::http::{header::HeaderName, HeaderMap};
use carmart_api::{CountryCode, GeoLocator};

/// Looks up the country of an IP through an HTTP service answering with a
/// bare country code, such as `https://ipapi.co/{ip}/country/`
pub struct HttpGeoLocator {
    client: reqwest::Client,
    url: String,
}

impl HttpGeoLocator {
    /// `url` must contain an `{ip}` placeholder
    pub fn new(url: String) -> anyhow::Result<HttpGeoLocator> {
        anyhow::ensure!(
            url.contains("{ip}"),
            "geolocation url {url:?} has no {{ip}} placeholder"
        );
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(2))
            .build()
            .context("building geolocation http client")?;
        Ok(HttpGeoLocator { client, url })
    }
}

fn is_public(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(ip) => {
            !(ip.is_loopback() || ip.is_private() || ip.is_link_local() || ip.is_unspecified())
        }
        IpAddr::V6(ip) => !(ip.is_loopback() || ip.is_unspecified()),
    }
}

#[async_trait]
impl GeoLocator for HttpGeoLocator {
    async fn locate(&self, ip: IpAddr) -> anyhow::Result<Option<CountryCode>> {
        if !is_public(ip) {
            return Ok(None);
        }
        let url = self.url.replace("{ip}", &ip.to_string());
        let body = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("querying geolocation service for {ip}"))?
            .error_for_status()
            .with_context(|| format!("geolocation service refused {ip}"))?
            .text()
            .await
            .context("reading geolocation response")?;
        Ok(CountryCode::new(body.trim()).ok())
    }
}

/// Everything the server knows to guess where a visitor is
#[derive(Clone, Default)]
pub struct Geo {
    /// Header set by a fronting proxy or CDN, eg. `cf-ipcountry`
    header: Option<HeaderName>,
    locator: Option<Arc<dyn GeoLocator>>,
}

impl Geo {
    pub fn new(header: Option<HeaderName>, locator: Option<Arc<dyn GeoLocator>>) -> Geo {
        Geo { header, locator }
    }

    /// Geolocation failures are not fatal, the visitor just falls back to other sources
    pub async fn locate(&self, headers: &HeaderMap, ip: Option<IpAddr>) -> Option<CountryCode> {
        if let Some(h) = &self.header {
            let code = headers
                .get(h)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| CountryCode::new(v.trim()).ok());
            if code.is_some() {
                return code;
            }
        }
        match (&self.locator, ip) {
            (Some(locator), Some(ip)) => match locator.locate(ip).await {
                Ok(c) => c,
                Err(err) => {
                    tracing::warn!(?err, %ip, "geolocation failed");
                    None
                }
            },
            _ => None,
        }
    }
}
