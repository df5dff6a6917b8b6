//! Thin client for the operator HTTP API.

use reqwest::StatusCode;
use serde::Serialize;
use serde::de::DeserializeOwned;

use sentinel_api::dto::response::ApiResponse;
use sentinel_api::error::ApiErrorResponse;
use sentinel_core::error::{AppError, ErrorKind};

/// Calls `/api/*` on a running server and unwraps the response envelope.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    /// Client for the server at `base_url`, e.g. `http://127.0.0.1:8000`.
    pub fn new(base_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// `GET {base}/api{path}`.
    pub async fn get<T>(&self, path: &str) -> Result<T, AppError>
    where
        T: Serialize + DeserializeOwned,
    {
        let response = self
            .http
            .get(self.url(path))
            .send()
            .await
            .map_err(|e| AppError::transport(format!("Request failed: {e}")))?;
        Self::unwrap(response).await
    }

    /// `POST {base}/api{path}` with a JSON body.
    pub async fn post<B, T>(&self, path: &str, body: &B) -> Result<T, AppError>
    where
        B: Serialize + ?Sized,
        T: Serialize + DeserializeOwned,
    {
        let response = self
            .http
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .map_err(|e| AppError::transport(format!("Request failed: {e}")))?;
        Self::unwrap(response).await
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api{}", self.base_url, path)
    }

    async fn unwrap<T>(response: reqwest::Response) -> Result<T, AppError>
    where
        T: Serialize + DeserializeOwned,
    {
        let status = response.status();
        if status.is_success() {
            let envelope: ApiResponse<T> = response
                .json()
                .await
                .map_err(|e| AppError::new(ErrorKind::Serialization, format!("Bad response: {e}")))?;
            return Ok(envelope.data);
        }

        let kind = kind_of(status);
        match response.json::<ApiErrorResponse>().await {
            Ok(body) => Err(AppError::new(kind, format!("{}: {}", body.error, body.message))),
            Err(_) => Err(AppError::new(kind, format!("Server returned {status}"))),
        }
    }
}

fn kind_of(status: StatusCode) -> ErrorKind {
    match status {
        StatusCode::BAD_REQUEST => ErrorKind::Validation,
        StatusCode::UNAUTHORIZED => ErrorKind::Authentication,
        StatusCode::FORBIDDEN => ErrorKind::Authorization,
        StatusCode::NOT_FOUND => ErrorKind::NotFound,
        StatusCode::CONFLICT => ErrorKind::Conflict,
        StatusCode::SERVICE_UNAVAILABLE => ErrorKind::ServiceUnavailable,
        _ => ErrorKind::Internal,
    }
}
