//! HTTP transport for the Tessera CMS API
//!
//! All repository traffic funnels through [`Transport::send`], which attaches
//! the API key header, resolves `:orgId`/`:instanceId` path placeholders and
//! maps non-success responses to [`Error::Server`].

use crate::error::{Error, Result};
use crate::types::ApiKey;
use reqwest::{header, Client, Method, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

const REQUEST_TIMEOUT_SECS: u64 = 30;

/// One API request, path relative to the instance root
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub path: String,
    pub method: Method,
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            method: Method::GET,
            body: None,
        }
    }

    pub fn post(path: impl Into<String>, body: &impl Serialize) -> Result<Self> {
        Ok(Self {
            path: path.into(),
            method: Method::POST,
            body: Some(serde_json::to_value(body)?),
        })
    }

    pub fn put(path: impl Into<String>, body: &impl Serialize) -> Result<Self> {
        Ok(Self {
            path: path.into(),
            method: Method::PUT,
            body: Some(serde_json::to_value(body)?),
        })
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            method: Method::DELETE,
            body: None,
        }
    }

    pub fn delete_with_body(path: impl Into<String>, body: &impl Serialize) -> Result<Self> {
        Ok(Self {
            path: path.into(),
            method: Method::DELETE,
            body: Some(serde_json::to_value(body)?),
        })
    }
}

/// Authenticated HTTP transport bound to one org/instance pair
pub struct Transport {
    origin: String,
    org_id: String,
    instance_id: String,
    api_key: ApiKey,
    client: Client,
}

impl Transport {
    pub fn new(origin: &str, org_id: &str, instance_id: &str, api_key: ApiKey) -> Result<Self> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            header::HeaderValue::from_str(&format!("ApiKey {}.{}", api_key.id, api_key.secret))
                .map_err(|_| {
                    Error::validation("apiKey", "credentials contain invalid header characters")
                })?,
        );

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            origin: origin.trim_end_matches('/').to_string(),
            org_id: org_id.to_string(),
            instance_id: instance_id.to_string(),
            api_key,
            client,
        })
    }

    /// Substitute the `:orgId` and `:instanceId` placeholders
    pub fn resolve_path(&self, path: &str) -> String {
        path.replace(":orgId", &self.org_id)
            .replace(":instanceId", &self.instance_id)
    }

    /// Absolute URL for an instance-relative path
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.origin, self.resolve_path(path))
    }

    /// `id.secret` form of the key, for URLs that embed credentials
    pub fn api_key_query(&self) -> String {
        format!("{}.{}", self.api_key.id, self.api_key.secret)
    }

    /// WebSocket endpoint carrying the API key as a query token
    pub fn socket_url(&self) -> String {
        let ws_origin = if let Some(rest) = self.origin.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = self.origin.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            format!("wss://{}", self.origin)
        };
        format!(
            "{}/api/v1/socket?token={}",
            ws_origin,
            urlencoding::encode(&format!("apikey_{}.{}", self.api_key.id, self.api_key.secret))
        )
    }

    /// Send a request and deserialize the JSON response body
    pub async fn send<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T> {
        let response = self.dispatch(request).await?;
        Ok(response.json().await?)
    }

    /// Send a request and return the raw response bytes
    pub async fn send_bytes(&self, request: ApiRequest) -> Result<Vec<u8>> {
        let response = self.dispatch(request).await?;
        Ok(response.bytes().await?.to_vec())
    }

    /// Upload a multipart form, e.g. a media file body
    pub async fn send_multipart<T: DeserializeOwned>(
        &self,
        path: &str,
        form: reqwest::multipart::Form,
    ) -> Result<T> {
        let response = self
            .client
            .post(self.url(path))
            .multipart(form)
            .send()
            .await?;
        let response = Self::handle_status(response).await?;
        Ok(response.json().await?)
    }

    async fn dispatch(&self, request: ApiRequest) -> Result<Response> {
        let mut builder = self.client.request(request.method, self.url(&request.path));
        if let Some(body) = request.body {
            builder = builder
                .header(header::CONTENT_TYPE, "application/json")
                .json(&body);
        }
        let response = builder.send().await?;
        Self::handle_status(response).await
    }

    async fn handle_status(response: Response) -> Result<Response> {
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(Error::Server { status, message });
        }
        Ok(response)
    }
}
