//! Volume Gateway Client
//!
//! Typed HTTP client for the `/v1` routes. Errors the gateway embeds in a
//! response body, and non-success statuses, surface as [`Error::Remote`].

use crate::api::rest::{
    DriverStatusResponse, OPT_CONFIG_LABEL, OPT_LABEL, OPT_NAME, OPT_VOLUME_ID,
};
use crate::domain::requests::{
    ApiErrorResponse, SnapCreateRequest, SnapCreateResponse, VolumeActionParam,
    VolumeCreateRequest, VolumeCreateResponse, VolumeResponse, VolumeSetRequest,
    VolumeSetResponse,
};
use crate::domain::volume::{
    ActiveRequests, Alerts, Source, Stats, Volume, VolumeId, VolumeLocator, VolumeSpec,
};
use crate::error::{Error, ErrorKind, Result};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Client for a volume gateway
#[derive(Debug, Clone)]
pub struct VolumeClient {
    base_url: String,
    http: Client,
}

impl VolumeClient {
    /// Client for the gateway at `base_url`, e.g. `http://127.0.0.1:9005`
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("volume-gateway/", env!("CARGO_PKG_VERSION")))
            .timeout(DEFAULT_TIMEOUT)
            .build()?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1{}", self.base_url, path)
    }

    fn volume_url(&self, route: &str, id: &VolumeId) -> String {
        self.url(&format!("/volumes{}/{}", route, urlencoding::encode(id.as_str())))
    }

    // =========================================================================
    // Volumes
    // =========================================================================

    pub async fn create(
        &self,
        locator: VolumeLocator,
        source: Option<Source>,
        spec: VolumeSpec,
    ) -> Result<VolumeId> {
        let request = VolumeCreateRequest {
            locator,
            source,
            spec,
        };
        let response: VolumeCreateResponse =
            send(self.http.post(self.url("/volumes")).json(&request)).await?;
        embedded(response.response)?;
        Ok(VolumeId::from(response.id))
    }

    /// Apply a compound update and return the updated record
    pub async fn update(&self, id: &VolumeId, request: &VolumeSetRequest) -> Result<Volume> {
        let response: VolumeSetResponse =
            send(self.http.put(self.volume_url("", id)).json(request)).await?;
        embedded(response.response)?;
        response
            .volume
            .ok_or_else(|| Error::Internal("gateway returned no volume".into()))
    }

    pub async fn set(
        &self,
        id: &VolumeId,
        locator: Option<VolumeLocator>,
        spec: Option<VolumeSpec>,
    ) -> Result<Volume> {
        let request = VolumeSetRequest {
            locator,
            spec,
            action: None,
        };
        self.update(id, &request).await
    }

    pub async fn mount(&self, id: &VolumeId, path: &str) -> Result<Volume> {
        self.update(id, &VolumeSetRequest::mount(path)).await
    }

    pub async fn unmount(&self, id: &VolumeId, path: &str) -> Result<Volume> {
        self.update(id, &VolumeSetRequest::unmount(path)).await
    }

    pub async fn attach(&self, id: &VolumeId) -> Result<Volume> {
        self.update(id, &VolumeSetRequest::attach(VolumeActionParam::On))
            .await
    }

    pub async fn detach(&self, id: &VolumeId) -> Result<Volume> {
        self.update(id, &VolumeSetRequest::attach(VolumeActionParam::Off))
            .await
    }

    pub async fn inspect(&self, id: &VolumeId) -> Result<Vec<Volume>> {
        send(self.http.get(self.volume_url("", id))).await
    }

    pub async fn delete(&self, id: &VolumeId) -> Result<()> {
        let response: VolumeResponse = send(self.http.delete(self.volume_url("", id))).await?;
        embedded(response)
    }

    /// Enumerate by name substring, locator labels and config labels
    pub async fn enumerate(
        &self,
        locator: &VolumeLocator,
        config_labels: &BTreeMap<String, String>,
    ) -> Result<Vec<Volume>> {
        let mut query: Vec<(&str, String)> = Vec::new();
        if !locator.name.is_empty() {
            query.push((OPT_NAME, locator.name.clone()));
        }
        if !locator.volume_labels.is_empty() {
            query.push((OPT_LABEL, serde_json::to_string(&locator.volume_labels)?));
        }
        if !config_labels.is_empty() {
            query.push((OPT_CONFIG_LABEL, serde_json::to_string(config_labels)?));
        }
        send(self.http.get(self.url("/volumes")).query(&query)).await
    }

    /// Records for exactly `ids`
    pub async fn enumerate_ids(&self, ids: &[VolumeId]) -> Result<Vec<Volume>> {
        let query: Vec<(&str, &str)> = ids.iter().map(|id| (OPT_VOLUME_ID, id.as_str())).collect();
        send(self.http.get(self.url("/volumes")).query(&query)).await
    }

    pub async fn stats(&self, id: &VolumeId) -> Result<Stats> {
        send(self.http.get(self.volume_url("/stats", id))).await
    }

    pub async fn alerts(&self, id: &VolumeId) -> Result<Alerts> {
        send(self.http.get(self.volume_url("/alerts", id))).await
    }

    pub async fn requests(&self, id: &VolumeId) -> Result<ActiveRequests> {
        send(self.http.get(self.volume_url("/requests", id))).await
    }

    // =========================================================================
    // Snapshots
    // =========================================================================

    pub async fn snapshot(
        &self,
        id: &VolumeId,
        readonly: bool,
        locator: VolumeLocator,
    ) -> Result<VolumeId> {
        let request = SnapCreateRequest {
            id: id.clone(),
            readonly,
            locator,
        };
        let response: SnapCreateResponse =
            send(self.http.post(self.url("/snapshot")).json(&request)).await?;
        let created = response.volume_create_response;
        embedded(created.response)?;
        Ok(VolumeId::from(created.id))
    }

    pub async fn snap_enumerate(
        &self,
        ids: &[VolumeId],
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<Volume>> {
        let mut query: Vec<(&str, String)> = ids
            .iter()
            .map(|id| (OPT_VOLUME_ID, id.to_string()))
            .collect();
        if !labels.is_empty() {
            query.push((OPT_LABEL, serde_json::to_string(labels)?));
        }
        send(self.http.get(self.url("/snapshot")).query(&query)).await
    }

    pub async fn status(&self) -> Result<DriverStatusResponse> {
        send(self.http.get(self.url("/status"))).await
    }
}

/// Send a request and decode a success body, mapping failures to `Remote`
async fn send<T: DeserializeOwned>(request: RequestBuilder) -> Result<T> {
    let response = request.send().await?;
    let status = response.status();
    debug!(url = %response.url(), status = status.as_u16(), "gateway response");

    if status.is_success() {
        return Ok(response.json().await?);
    }

    let status = status.as_u16();
    let body = response.text().await?;
    let (kind, message) = match serde_json::from_str::<ApiErrorResponse>(&body) {
        Ok(e) => (
            e.error.parse().unwrap_or_else(|_| ErrorKind::from_status(status)),
            e.message,
        ),
        Err(_) => (ErrorKind::from_status(status), body),
    };
    Err(Error::Remote {
        status,
        kind,
        message,
    })
}

/// Turn an error embedded in a 200 body into `Remote`
fn embedded(response: VolumeResponse) -> Result<()> {
    if response.is_ok() {
        return Ok(());
    }
    Err(Error::Remote {
        status: StatusCode::OK.as_u16(),
        kind: response.error_kind.parse().unwrap_or(ErrorKind::Internal),
        message: response.error,
    })
}
