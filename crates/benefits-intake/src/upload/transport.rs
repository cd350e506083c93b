use std::time::Duration;

use reqwest::blocking::multipart::{Form, Part};
use reqwest::blocking::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use super::{UploadFile, UploadSession};
use crate::error::UploadError;

const API_KEY_HEADER: &str = "apikey";
const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";
const DEFAULT_UPLOAD_PATH: &str = "/uploads";

/// One multipart upload.
#[derive(Debug)]
pub struct TransportRequest<'a> {
    pub location: &'a str,
    pub file: &'a UploadFile,
    pub metadata_json: &'a str,
    pub attachments: &'a [UploadFile],
    pub idempotency_key: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

impl TransportResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Raw wire access to an upload backend.
pub trait UploadTransport: Send + Sync {
    fn open_session(&self) -> Result<UploadSession, UploadError>;

    fn upload(&self, request: &TransportRequest<'_>) -> Result<TransportResponse, UploadError>;
}

#[derive(Debug, Deserialize)]
struct SessionEnvelope {
    data: SessionData,
}

#[derive(Debug, Deserialize)]
struct SessionData {
    id: String,
    attributes: SessionAttributes,
}

#[derive(Debug, Deserialize)]
struct SessionAttributes {
    location: String,
}

/// Blocking HTTP transport.
///
/// With a `session_path` the backend hands out the tracking id and a
/// pre-signed location that receives a `PUT`. Without one the tracking id is
/// generated locally and the package is `POST`ed to `upload_path`.
pub struct HttpTransport {
    client: Client,
    base_url: String,
    session_path: Option<String>,
    upload_path: String,
    api_key: Option<SecretString>,
}

impl HttpTransport {
    pub fn new(
        base_url: impl Into<String>,
        session_path: Option<String>,
        upload_path: Option<String>,
        api_key: Option<SecretString>,
        timeout: Duration,
    ) -> Result<Self, UploadError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(15))
            .timeout(timeout)
            .build()
            .map_err(|e| UploadError::Transport(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            session_path,
            upload_path: upload_path.unwrap_or_else(|| DEFAULT_UPLOAD_PATH.to_string()),
            api_key,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn with_api_key(
        &self,
        request: reqwest::blocking::RequestBuilder,
    ) -> reqwest::blocking::RequestBuilder {
        match &self.api_key {
            Some(key) => request.header(API_KEY_HEADER, key.expose_secret()),
            None => request,
        }
    }

    fn file_part(file: &UploadFile) -> Result<Part, UploadError> {
        let bytes = std::fs::read(&file.path).map_err(|e| UploadError::ReadFile {
            path: file.path.clone(),
            source: e,
        })?;
        Part::bytes(bytes)
            .file_name(file.file_name.clone())
            .mime_str(&file.content_type())
            .map_err(map_reqwest_error)
    }
}

fn map_reqwest_error(e: reqwest::Error) -> UploadError {
    if e.is_timeout() {
        UploadError::Timeout(e.to_string())
    } else {
        UploadError::Transport(e.to_string())
    }
}

impl UploadTransport for HttpTransport {
    fn open_session(&self) -> Result<UploadSession, UploadError> {
        let Some(session_path) = &self.session_path else {
            return Ok(UploadSession {
                tracking_id: uuid::Uuid::new_v4().to_string(),
                location: self.url(&self.upload_path),
            });
        };

        let response = self
            .with_api_key(self.client.post(self.url(session_path)))
            .send()
            .map_err(map_reqwest_error)?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let body = response.text().unwrap_or_default();
            return Err(UploadError::Rejected {
                provider: "session",
                status,
                body: crate::sanitize::body_excerpt(&body),
            });
        }

        let envelope: SessionEnvelope = response.json().map_err(map_reqwest_error)?;
        Ok(UploadSession {
            tracking_id: envelope.data.id,
            location: envelope.data.attributes.location,
        })
    }

    fn upload(&self, request: &TransportRequest<'_>) -> Result<TransportResponse, UploadError> {
        let mut form = Form::new()
            .text("metadata", request.metadata_json.to_string())
            .part("content", Self::file_part(request.file)?);
        for (i, attachment) in request.attachments.iter().enumerate() {
            form = form.part(format!("attachment{}", i + 1), Self::file_part(attachment)?);
        }

        let builder = if self.session_path.is_some() {
            self.client.put(request.location)
        } else {
            self.client.post(request.location)
        };

        let response = self
            .with_api_key(builder)
            .header(IDEMPOTENCY_HEADER, request.idempotency_key)
            .multipart(form)
            .send()
            .map_err(map_reqwest_error)?;

        let status = response.status().as_u16();
        let body = response.text().map_err(map_reqwest_error)?;
        Ok(TransportResponse { status, body })
    }
}
