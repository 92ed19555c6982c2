//! HTTP client for the control plane REST API.

use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use loadfleet_core::api::{
    BootstrapResponse, EntryPointResponse, ErrorResponse, PoolResponse, ReconcileResponse,
    ScaleRequest, StatusResponse, TerminateResponse, WorkerResponse,
};

use crate::error::ClientError;

/// HTTP client for REST API endpoints.
pub struct HttpClient {
    inner: reqwest::Client,
    base_url: String,
}

impl HttpClient {
    /// Create a new HTTP client.
    pub fn new(base_url: &str) -> Self {
        Self {
            inner: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Check if the control plane is healthy.
    pub async fn health(&self) -> Result<bool, ClientError> {
        let url = format!("{}/health", self.base_url);
        debug!(url = %url, "Checking health");

        let response = self.inner.get(&url).send().await?;
        Ok(response.status().is_success())
    }

    pub async fn status(&self) -> Result<StatusResponse, ClientError> {
        self.get_json("/v1/status").await
    }

    pub async fn workers(&self) -> Result<Vec<WorkerResponse>, ClientError> {
        self.get_json("/v1/workers").await
    }

    /// The oldest running worker, or `None` while nothing is running yet.
    pub async fn entry_point(&self) -> Result<Option<EntryPointResponse>, ClientError> {
        match self.get_json("/v1/entry-point").await {
            Ok(entry) => Ok(Some(entry)),
            Err(ClientError::Api { status: 503, .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn bootstrap(&self) -> Result<BootstrapResponse, ClientError> {
        self.get_json("/v1/bootstrap").await
    }

    /// Run one observe + reconcile cycle now.
    pub async fn reconcile(&self) -> Result<ReconcileResponse, ClientError> {
        self.send_json(Method::POST, "/v1/reconcile", None::<&()>)
            .await
    }

    /// Set the desired pool size.
    pub async fn scale(&self, desired_count: u32) -> Result<PoolResponse, ClientError> {
        self.send_json(
            Method::PUT,
            "/v1/pool",
            Some(&ScaleRequest { desired_count }),
        )
        .await
    }

    pub async fn terminate(&self, worker_id: &str) -> Result<TerminateResponse, ClientError> {
        let path = format!("/v1/workers/{worker_id}/terminate");
        self.send_json(Method::POST, &path, None::<&()>).await
    }

    /// Get JSON from an endpoint.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        self.send_json(Method::GET, path, None::<&()>).await
    }

    /// Send a request with an optional JSON body and decode the JSON reply.
    pub async fn send_json<B, T>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<T, ClientError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        debug!(method = %method, url = %url, "Sending request");

        let mut request: RequestBuilder = self.inner.request(method, &url);
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request.send().await?;

        decode(response, path).await
    }
}

async fn decode<T: DeserializeOwned>(response: Response, path: &str) -> Result<T, ClientError> {
    let status = response.status();
    if status.is_success() {
        return response
            .json()
            .await
            .map_err(|e| ClientError::Serialization(e.to_string()));
    }

    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorResponse>(&text)
        .map(|e| e.error)
        .unwrap_or(text);

    if status == StatusCode::NOT_FOUND {
        return Err(ClientError::NotFound(format!("{path}: {message}")));
    }
    Err(ClientError::Api {
        status: status.as_u16(),
        message,
    })
}
