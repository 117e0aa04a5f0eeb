//! # HTTP Back End
//!
//! [`BackEndApi`] over the back end's REST interface, built on `reqwest`.
//!
//! ## Request Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       HttpBackEnd request                               │
//! │                                                                         │
//! │  endpoint(base_url, path) ──► Authorization: Basic ... ──► send         │
//! │                                                              │          │
//! │                  ┌───────────────────────────────────────────┤          │
//! │                  ▼                     ▼                     ▼          │
//! │            no response            non-2xx status         2xx body       │
//! │       ConnectionFailed/Timeout    BackEndStatus(N)    parse JSON or     │
//! │                                                       BackEndEmpty...   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Connect and request timeouts come from `[network]` in the config.

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine as _;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use tracing::{debug, warn};
use url::Url;

use crate::config::{DeviceConfig, NetworkSettings, PushConfig};
use crate::error::{PushError, PushResult};
use crate::protocol::{
    AnalyticsRequest, GeofenceResponse, RegistrationRequest, RegistrationResponse,
    ANALYTICS_PATH, GEOFENCES_PATH, REGISTRATION_PATH,
};
use crate::transport::{BackEndApi, Credentials, RegistrationKind};
use pushwire_core::{Event, RegistrationParameters, TagSet};

const JSON: &str = "application/json";

// =============================================================================
// Request Helpers
// =============================================================================

/// `Basic` authorization value for the platform credentials.
pub fn basic_auth_header(platform_uuid: &str, platform_secret: &str) -> String {
    let token = BASE64_STANDARD.encode(format!("{}:{}", platform_uuid, platform_secret));
    format!("Basic {}", token)
}

/// Joins `path` onto the base server URL.
///
/// The base is treated as a directory whether or not it ends in `/`, so
/// `https://host/api` and `https://host/api/` resolve the same way.
pub fn endpoint(base: &Url, path: &str) -> PushResult<Url> {
    let mut base = base.clone();
    if !base.path().ends_with('/') {
        let directory = format!("{}/", base.path());
        base.set_path(&directory);
    }
    Ok(base.join(path)?)
}

/// `{base}/v1/registration/{device_id}` with the id percent-encoded.
pub fn device_endpoint(base: &Url, device_id: &str) -> PushResult<Url> {
    let mut url = endpoint(base, REGISTRATION_PATH)?;
    url.path_segments_mut()
        .map_err(|_| PushError::InvalidUrl(format!("cannot append to {}", base)))?
        .push(device_id);
    Ok(url)
}

fn check_status(status: StatusCode) -> PushResult<()> {
    if status.is_success() {
        Ok(())
    } else {
        Err(PushError::BackEndStatus(status.as_u16()))
    }
}

/// Extracts the device id from a registration response body.
pub fn parse_device_uuid(body: &str) -> PushResult<String> {
    if body.trim().is_empty() {
        return Err(PushError::BackEndEmptyResponse);
    }
    let response: RegistrationResponse = serde_json::from_str(body)?;
    match response.device_uuid {
        Some(id) if !id.trim().is_empty() => Ok(id),
        _ => Err(PushError::MissingDeviceUuid),
    }
}

/// Parses a geofence response body.
pub fn parse_geofence_response(body: &str) -> PushResult<GeofenceResponse> {
    if body.trim().is_empty() {
        return Err(PushError::BackEndEmptyResponse);
    }
    Ok(serde_json::from_str(body)?)
}

fn to_json<T: serde::Serialize + ?Sized>(value: &T) -> PushResult<String> {
    serde_json::to_string(value).map_err(|e| PushError::SerializationFailed(e.to_string()))
}

// =============================================================================
// HTTP Back End
// =============================================================================

/// REST client for the application back end.
///
/// ## Example
/// ```rust,ignore
/// let back_end = HttpBackEnd::from_config(&config)?;
/// let device_id = back_end
///     .register_device(&relay_id, &RegistrationKind::New, &params, &TagSet::new())
///     .await?;
/// ```
pub struct HttpBackEnd {
    client: reqwest::Client,
    device: DeviceConfig,
    request_timeout_secs: u64,
}

impl HttpBackEnd {
    /// Creates a client with the given timeouts and device description.
    pub fn new(network: &NetworkSettings, device: DeviceConfig) -> PushResult<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(network.connect_timeout_secs))
            .timeout(Duration::from_secs(network.request_timeout_secs))
            .build()?;

        Ok(HttpBackEnd {
            client,
            device,
            request_timeout_secs: network.request_timeout_secs,
        })
    }

    pub fn from_config(config: &PushConfig) -> PushResult<Self> {
        Self::new(&config.network, config.device.clone())
    }

    fn transport_error(&self, err: reqwest::Error) -> PushError {
        if err.is_timeout() {
            PushError::Timeout(self.request_timeout_secs)
        } else {
            PushError::from(err)
        }
    }

    /// Sends one authenticated request and returns the response body.
    async fn execute(
        &self,
        method: Method,
        url: Url,
        credentials: &Credentials,
        body: Option<String>,
    ) -> PushResult<String> {
        debug!(%method, %url, "Back-end request");

        let mut request = self
            .client
            .request(method.clone(), url.clone())
            .header(
                AUTHORIZATION,
                basic_auth_header(&credentials.platform_uuid, &credentials.platform_secret),
            )
            .header(ACCEPT, JSON);
        if let Some(body) = body {
            request = request.header(CONTENT_TYPE, JSON).body(body);
        }

        let response = request.send().await.map_err(|e| self.transport_error(e))?;
        let status = response.status();
        if let Err(e) = check_status(status) {
            warn!(%method, %url, status = status.as_u16(), "Back-end request rejected");
            return Err(e);
        }

        response.text().await.map_err(|e| self.transport_error(e))
    }
}

#[async_trait]
impl BackEndApi for HttpBackEnd {
    async fn register_device(
        &self,
        relay_device_id: &str,
        kind: &RegistrationKind,
        params: &RegistrationParameters,
        previous_tags: &TagSet,
    ) -> PushResult<String> {
        let credentials = Credentials::from_params(params)?;
        let (method, url, is_new) = match kind {
            RegistrationKind::New => (
                Method::POST,
                endpoint(&credentials.base_url, REGISTRATION_PATH)?,
                true,
            ),
            RegistrationKind::Update { previous_device_id } => (
                Method::PUT,
                device_endpoint(&credentials.base_url, previous_device_id)?,
                false,
            ),
        };

        let request =
            RegistrationRequest::new(relay_device_id, params, previous_tags, &self.device, is_new);
        let body = self
            .execute(method, url, &credentials, Some(to_json(&request)?))
            .await?;

        parse_device_uuid(&body)
    }

    async fn unregister_device(&self, device_id: &str, credentials: &Credentials) -> PushResult<()> {
        let url = device_endpoint(&credentials.base_url, device_id)?;
        self.execute(Method::DELETE, url, credentials, None).await?;
        Ok(())
    }

    async fn send_events(&self, events: &[Event], credentials: &Credentials) -> PushResult<()> {
        let url = endpoint(&credentials.base_url, ANALYTICS_PATH)?;
        let body = to_json(&AnalyticsRequest { events })?;
        self.execute(Method::POST, url, credentials, Some(body)).await?;
        Ok(())
    }

    async fn fetch_geofences(
        &self,
        timestamp: i64,
        credentials: &Credentials,
    ) -> PushResult<GeofenceResponse> {
        let mut url = endpoint(&credentials.base_url, GEOFENCES_PATH)?;
        url.query_pairs_mut()
            .append_pair("timestamp", &timestamp.to_string());

        let body = self.execute(Method::GET, url, credentials, None).await?;
        parse_geofence_response(&body)
    }
}
