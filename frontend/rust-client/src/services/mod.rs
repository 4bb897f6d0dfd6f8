use reqwest::{header, Client, Method};
use serde::{de::DeserializeOwned, Serialize};
use std::sync::{Arc, RwLock};
use uuid::Uuid;

use crate::config::Config;
use crate::error::{ClientError, Result};
use crate::metrics::track_request;

pub mod codebattle_service;
pub mod interview_service;
pub mod review_service;

pub use codebattle_service::{CodeBattleApi, CodeBattleService};
pub use interview_service::InterviewService;
pub use review_service::{ReviewApi, ReviewService};

pub const TRACE_ID_HEADER: &str = "x-trace-id";

/// Shared REST client: base URL, bearer token and the underlying `reqwest`
/// connection pool. Cheap to clone.
#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    base_url: String,
    token: Arc<RwLock<Option<String>>>,
}

impl ApiClient {
    pub fn new(config: &Config) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.request_timeout())
            .cookie_store(true)
            .build()?;

        Ok(Self {
            http,
            base_url: config.rest_base(),
            token: Arc::new(RwLock::new(config.access_token.clone())),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn set_token(&self, token: impl Into<String>) {
        if let Ok(mut guard) = self.token.write() {
            *guard = Some(token.into());
        }
    }

    pub fn clear_token(&self) {
        if let Ok(mut guard) = self.token.write() {
            *guard = None;
        }
    }

    pub fn token(&self) -> Option<String> {
        self.token.read().ok().and_then(|guard| guard.clone())
    }

    pub(crate) async fn get<T: DeserializeOwned>(&self, endpoint: &str, path: &str) -> Result<T> {
        let bytes = self
            .execute::<(), ()>(Method::GET, endpoint, path, None, None)
            .await?;
        decode(&bytes)
    }

    pub(crate) async fn get_with_query<T, Q>(&self, endpoint: &str, path: &str, query: &Q) -> Result<T>
    where
        T: DeserializeOwned,
        Q: Serialize + ?Sized,
    {
        let bytes = self
            .execute::<(), Q>(Method::GET, endpoint, path, None, Some(query))
            .await?;
        decode(&bytes)
    }

    pub(crate) async fn post<T, B>(&self, endpoint: &str, path: &str, body: &B) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let bytes = self
            .execute::<B, ()>(Method::POST, endpoint, path, Some(body), None)
            .await?;
        decode(&bytes)
    }

    pub(crate) async fn put<T, B>(&self, endpoint: &str, path: &str, body: &B) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let bytes = self
            .execute::<B, ()>(Method::PUT, endpoint, path, Some(body), None)
            .await?;
        decode(&bytes)
    }

    /// POST whose response body is returned undecoded (audio payloads).
    pub(crate) async fn post_raw<B>(&self, endpoint: &str, path: &str, body: &B) -> Result<Vec<u8>>
    where
        B: Serialize + ?Sized,
    {
        self.execute::<B, ()>(Method::POST, endpoint, path, Some(body), None)
            .await
    }

    pub(crate) async fn delete(&self, endpoint: &str, path: &str) -> Result<()> {
        self.execute::<(), ()>(Method::DELETE, endpoint, path, None, None)
            .await
            .map(|_| ())
    }

    async fn execute<B, Q>(
        &self,
        method: Method,
        endpoint: &str,
        path: &str,
        body: Option<&B>,
        query: Option<&Q>,
    ) -> Result<Vec<u8>>
    where
        B: Serialize + ?Sized,
        Q: Serialize + ?Sized,
    {
        let url = format!("{}{}", self.base_url, path);
        let trace_id = Uuid::new_v4().to_string();
        let method_label = method.as_str().to_string();

        tracing::debug!("{} {} trace_id={}", method_label, url, trace_id);

        let mut request = self
            .http
            .request(method, &url)
            .header(TRACE_ID_HEADER, &trace_id)
            .header(header::ACCEPT, "application/json");

        if let Some(token) = self.token() {
            request = request.bearer_auth(token);
        }
        if let Some(query) = query {
            request = request.query(query);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        track_request(&method_label, endpoint, async {
            let response = request.send().await?;
            let status = response.status();
            let bytes = response.bytes().await?;

            if !status.is_success() {
                let body = String::from_utf8_lossy(&bytes);
                tracing::error!(
                    "{} {} failed with {} trace_id={}",
                    method_label,
                    url,
                    status,
                    trace_id
                );
                return Err(ClientError::from_response_body(status.as_u16(), &body));
            }

            Ok(bytes.to_vec())
        })
        .await
    }
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    // Empty 2xx bodies decode as JSON null so `()` and `Option<T>` work
    let slice: &[u8] = if bytes.iter().all(|b| b.is_ascii_whitespace()) {
        b"null"
    } else {
        bytes
    };
    Ok(serde_json::from_slice(slice)?)
}
