//! HTTP layer: posts SOAP envelopes to the `/sdk` endpoint.

use crate::error::{VsphereError, VsphereResult};

use async_trait::async_trait;
use log::{debug, trace, warn};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use url::Url;

/// Anything that can carry one SOAP request/response exchange.
#[async_trait]
pub trait SoapTransport: Send + Sync {
    /// Post `envelope` and return the response body.
    ///
    /// A SOAP fault is a valid response body; only failures to get a body
    /// at all are errors.
    async fn send(&self, envelope: &str) -> VsphereResult<String>;
}

/// Options for [`HttpTransport`].
#[derive(Debug, Clone)]
pub struct HttpOptions {
    pub timeout: Duration,
    /// Skip TLS certificate verification (self-signed ESXi certificates)
    pub insecure: bool,
    /// API version sent in the `SOAPAction` header
    pub api_version: String,
}

impl Default for HttpOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            insecure: false,
            api_version: "7.0".to_string(),
        }
    }
}

/// `reqwest`-backed transport. The session cookie
/// (`vmware_soap_session`) is kept by the client's cookie store, so a
/// transport instance is one server session.
pub struct HttpTransport {
    client: Client,
    endpoint: Url,
    soap_action: HeaderValue,
    request_counter: AtomicU64,
}

impl HttpTransport {
    pub fn new(endpoint: &str, options: &HttpOptions) -> VsphereResult<Self> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| VsphereError::invalid_argument(format!("Invalid SDK URL '{endpoint}': {e}")))?;

        let client = Client::builder()
            .cookie_store(true)
            .danger_accept_invalid_certs(options.insecure)
            .timeout(options.timeout)
            .build()
            .map_err(|e| VsphereError::transport(format!("Failed to build HTTP client: {e}")))?;

        let soap_action = HeaderValue::from_str(&format!("urn:vim25/{}", options.api_version))
            .map_err(|e| VsphereError::invalid_argument(format!("Invalid API version: {e}")))?;

        Ok(Self {
            client,
            endpoint,
            soap_action,
            request_counter: AtomicU64::new(0),
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl SoapTransport for HttpTransport {
    async fn send(&self, envelope: &str) -> VsphereResult<String> {
        let req_id = self.request_counter.fetch_add(1, Ordering::Relaxed) + 1;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/xml; charset=utf-8"));
        headers.insert("SOAPAction", self.soap_action.clone());

        debug!("SOAP request #{req_id} to {} ({} bytes)", self.endpoint, envelope.len());
        trace!("SOAP request #{req_id} body:\n{envelope}");

        let resp = self
            .client
            .post(self.endpoint.clone())
            .headers(headers)
            .body(envelope.to_string())
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await?;
        trace!("SOAP response #{req_id}: status={status}, body length={}", body.len());

        check_status(status, body)
    }
}

/// Faults travel as HTTP 500 with an envelope; hand those to the codec.
fn check_status(status: StatusCode, body: String) -> VsphereResult<String> {
    if status.is_success() {
        return Ok(body);
    }
    if status == StatusCode::INTERNAL_SERVER_ERROR && body.contains("Fault") {
        return Ok(body);
    }
    warn!("SOAP endpoint returned HTTP {}", status.as_u16());
    Err(VsphereError::transport(format!(
        "HTTP {} from SOAP endpoint",
        status.as_u16()
    )))
}
