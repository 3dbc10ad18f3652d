//! REST client for the analysis API
//!
//! Every call returns `ClientResult`: transport failures are
//! `ClientError::Network`, non-2xx responses `ClientError::Http` and bodies
//! that do not decode `ClientError::Parse`.

use crate::resources::ResourceKind;
use agentview_core::{
    AnalysisSession, ClientConfig, ClientError, ClientResult, StartAnalysisRequest,
    StartAnalysisResponse,
};
use agentview_realtime::SessionSource;
use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use url::Url;

/// HTTP client bound to one API base URL
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base: Url,
}

impl ApiClient {
    /// Create a client from configuration
    ///
    /// # Errors
    /// - `ClientError::Config` if the configuration is invalid
    pub fn new(config: &ClientConfig) -> ClientResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ClientError::Config(format!("http client: {e}")))?;
        Self::with_http_client(config, http)
    }

    /// Create a client around an existing `reqwest::Client`
    ///
    /// # Errors
    /// - `ClientError::Config` if the configuration is invalid
    pub fn with_http_client(config: &ClientConfig, http: reqwest::Client) -> ClientResult<Self> {
        config.validate()?;
        let base = Url::parse(config.api_base_url.trim_end_matches('/'))
            .map_err(|e| ClientError::Config(format!("api_base_url: {e}")))?;
        if base.cannot_be_a_base() {
            return Err(ClientError::Config(format!(
                "api_base_url cannot be a base: {base}"
            )));
        }
        Ok(Self { http, base })
    }

    /// API base URL
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// URL of an endpoint below the base
    #[must_use]
    pub fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// `POST /analysis/start`
    ///
    /// # Errors
    /// - Any `ClientError` from the request
    pub async fn start_analysis(&self, request: &StartAnalysisRequest) -> ClientResult<StartAnalysisResponse> {
        let response = self
            .send(self.request(Method::POST, &["analysis", "start"]).json(request))
            .await?;
        let started: StartAnalysisResponse = decode(response).await?;
        tracing::info!(analysis = %started.analysis_id, company = %request.company_id, "analysis started");
        Ok(started)
    }

    /// `GET /analysis/{id}/status`
    ///
    /// # Errors
    /// - Any `ClientError` from the request
    pub async fn analysis_status(&self, analysis_id: &str) -> ClientResult<AnalysisSession> {
        let response = self
            .send(self.request(Method::GET, &["analysis", analysis_id, "status"]))
            .await?;
        let mut session: AnalysisSession = decode(response).await?;
        if session.id.is_empty() {
            session.id = analysis_id.to_string();
        }
        Ok(session)
    }

    /// `GET /analysis/{id}/result`
    ///
    /// # Errors
    /// - Any `ClientError` from the request
    pub async fn analysis_result(&self, analysis_id: &str) -> ClientResult<Value> {
        let response = self
            .send(self.request(Method::GET, &["analysis", analysis_id, "result"]))
            .await?;
        decode(response).await
    }

    /// `GET /{kind}`
    ///
    /// # Errors
    /// - Any `ClientError` from the request
    pub async fn list<T: DeserializeOwned>(&self, kind: ResourceKind) -> ClientResult<Vec<T>> {
        let response = self.send(self.request(Method::GET, &[kind.as_str()])).await?;
        decode(response).await
    }

    /// `GET /{kind}/{id}`
    ///
    /// # Errors
    /// - Any `ClientError` from the request
    pub async fn get<T: DeserializeOwned>(&self, kind: ResourceKind, id: &str) -> ClientResult<T> {
        let response = self
            .send(self.request(Method::GET, &[kind.as_str(), id]))
            .await?;
        decode(response).await
    }

    /// `POST /{kind}`
    ///
    /// # Errors
    /// - Any `ClientError` from the request
    pub async fn create<B, T>(&self, kind: ResourceKind, body: &B) -> ClientResult<T>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let response = self
            .send(self.request(Method::POST, &[kind.as_str()]).json(body))
            .await?;
        decode(response).await
    }

    /// `PUT /{kind}/{id}`
    ///
    /// # Errors
    /// - Any `ClientError` from the request
    pub async fn update<B, T>(&self, kind: ResourceKind, id: &str, body: &B) -> ClientResult<T>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let response = self
            .send(self.request(Method::PUT, &[kind.as_str(), id]).json(body))
            .await?;
        decode(response).await
    }

    /// `DELETE /{kind}/{id}`
    ///
    /// # Errors
    /// - Any `ClientError` from the request
    pub async fn delete(&self, kind: ResourceKind, id: &str) -> ClientResult<()> {
        self.send(self.request(Method::DELETE, &[kind.as_str(), id]))
            .await
            .map(drop)
    }

    fn request(&self, method: Method, segments: &[&str]) -> RequestBuilder {
        self.http.request(method, self.endpoint(segments))
    }

    async fn send(&self, request: RequestBuilder) -> ClientResult<Response> {
        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        tracing::debug!(url = %response.url(), %status, "api response");
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(ClientError::http(status.as_u16(), error_detail(&body)))
    }
}

#[async_trait]
impl SessionSource for ApiClient {
    async fn status(&self, session_id: &str) -> ClientResult<AnalysisSession> {
        self.analysis_status(session_id).await
    }

    async fn result(&self, session_id: &str) -> ClientResult<Value> {
        self.analysis_result(session_id).await
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> ClientResult<T> {
    let body = response.text().await.map_err(transport_error)?;
    Ok(serde_json::from_str(&body)?)
}

fn transport_error(err: reqwest::Error) -> ClientError {
    if err.is_decode() {
        ClientError::Parse(err.to_string())
    } else {
        ClientError::Network(err.to_string())
    }
}

/// Structured detail of an error body
///
/// The `detail` field of a JSON object (strings verbatim, anything else
/// serialized), otherwise the trimmed body text.
fn error_detail(body: &str) -> Option<String> {
    let body = body.trim();
    if body.is_empty() {
        return None;
    }
    match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(map)) => match map.get("detail") {
            Some(Value::String(detail)) => Some(detail.clone()),
            Some(detail) => Some(detail.to_string()),
            None => Some(body.to_string()),
        },
        _ => Some(body.to_string()),
    }
}
