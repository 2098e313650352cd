//! Requests the core hands to the shell through `crux_http`.
//!
//! `crux_http` panics on URLs it cannot parse, so every request is built
//! from a [`ValidatedUrl`] and checked here before it becomes an effect.

use crux_http::Http;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

pub const MAX_URL_LENGTH: usize = 2048;
pub const MAX_REQUEST_BODY_SIZE: usize = 1024 * 1024;

/// What the shell handed back for one request.
pub type HttpOutcome = crux_http::Result<crux_http::Response<Vec<u8>>>;

#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum RequestError {
    #[error("invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("request body too large: {size} bytes exceeds maximum of {max} bytes")]
    BodyTooLarge { size: usize, max: usize },

    #[error("{method} requests cannot have a body")]
    BodyNotAllowed { method: String },

    #[error("serialization error: {message}")]
    Serialization { message: String },
}

/// Absolute http(s) URL without embedded credentials.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ValidatedUrl {
    url: String,
    host: String,
}

impl ValidatedUrl {
    pub fn new(url: impl Into<String>) -> Result<Self, RequestError> {
        let url = url.into();
        let invalid = |reason: &str| RequestError::InvalidUrl {
            url: shorten(&url),
            reason: reason.to_string(),
        };

        if url.trim().is_empty() {
            return Err(invalid("URL cannot be empty"));
        }
        if url.len() > MAX_URL_LENGTH {
            return Err(invalid("URL is too long"));
        }
        let parsed = Url::parse(&url).map_err(|e| invalid(&e.to_string()))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(invalid("only http and https are allowed"));
        }
        if !parsed.username().is_empty() || parsed.password().is_some() {
            return Err(invalid("credentials in URL are not allowed"));
        }
        let host = parsed
            .host_str()
            .ok_or_else(|| invalid("URL must have a host"))?
            .to_lowercase();

        Ok(Self {
            url: parsed.to_string(),
            host,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.url
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Path plus query, e.g. `/api/saved_locations?page=2`.
    pub fn path_and_query(&self) -> String {
        match Url::parse(&self.url) {
            Ok(parsed) => match parsed.query() {
                Some(q) => format!("{}?{}", parsed.path(), q),
                None => parsed.path().to_string(),
            },
            Err(_) => self.url.clone(),
        }
    }
}

fn shorten(url: &str) -> String {
    const KEEP: usize = 100;
    if url.len() <= KEEP {
        return url.to_string();
    }
    let cut = (0..=KEEP).rev().find(|i| url.is_char_boundary(*i)).unwrap_or(0);
    format!("{}...", &url[..cut])
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HttpMethod {
    Get,
    Post,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }

    pub fn has_request_body(&self) -> bool {
        matches!(self, HttpMethod::Post | HttpMethod::Patch)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContentType {
    Json,
    /// Hydra/JSON-LD documents; used when creating resources.
    JsonLd,
    /// RFC 7396 partial updates.
    MergePatch,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Json => "application/json",
            ContentType::JsonLd => "application/ld+json",
            ContentType::MergePatch => "application/merge-patch+json",
        }
    }
}

/// A backend request, checked before it is handed to the shell. Every
/// request asks for `application/ld+json`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiRequest {
    method: HttpMethod,
    url: ValidatedUrl,
    body: Option<(ContentType, Vec<u8>)>,
}

impl ApiRequest {
    pub fn new(method: HttpMethod, url: ValidatedUrl) -> Self {
        Self {
            method,
            url,
            body: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Result<Self, RequestError> {
        Ok(Self::new(HttpMethod::Get, ValidatedUrl::new(url)?))
    }

    pub fn post(url: impl Into<String>) -> Result<Self, RequestError> {
        Ok(Self::new(HttpMethod::Post, ValidatedUrl::new(url)?))
    }

    pub fn patch(url: impl Into<String>) -> Result<Self, RequestError> {
        Ok(Self::new(HttpMethod::Patch, ValidatedUrl::new(url)?))
    }

    pub fn delete(url: impl Into<String>) -> Result<Self, RequestError> {
        Ok(Self::new(HttpMethod::Delete, ValidatedUrl::new(url)?))
    }

    /// Serializes `value` as the body, sent with `content_type`.
    pub fn with_json_as<T: Serialize>(
        mut self,
        value: &T,
        content_type: ContentType,
    ) -> Result<Self, RequestError> {
        if !self.method.has_request_body() {
            return Err(RequestError::BodyNotAllowed {
                method: self.method.as_str().to_string(),
            });
        }

        let body = serde_json::to_vec(value).map_err(|e| RequestError::Serialization {
            message: e.to_string(),
        })?;
        if body.len() > MAX_REQUEST_BODY_SIZE {
            return Err(RequestError::BodyTooLarge {
                size: body.len(),
                max: MAX_REQUEST_BODY_SIZE,
            });
        }

        self.body = Some((content_type, body));
        Ok(self)
    }

    pub fn method(&self) -> HttpMethod {
        self.method
    }

    pub fn url(&self) -> &ValidatedUrl {
        &self.url
    }

    pub fn content_type(&self) -> Option<ContentType> {
        self.body.as_ref().map(|(ct, _)| *ct)
    }

    pub fn body(&self) -> Option<&[u8]> {
        self.body.as_ref().map(|(_, b)| b.as_slice())
    }

    pub fn body_json(&self) -> Option<serde_json::Value> {
        self.body().and_then(|b| serde_json::from_slice(b).ok())
    }

    /// Emits the request as an `Http` effect.
    pub fn send<Ev, F>(self, http: &Http<Ev>, make_event: F)
    where
        Ev: Send + 'static,
        F: FnOnce(HttpOutcome) -> Ev + Send + 'static,
    {
        let url = self.url.as_str();
        let builder = match self.method {
            HttpMethod::Get => http.get(url),
            HttpMethod::Post => http.post(url),
            HttpMethod::Patch => http.patch(url),
            HttpMethod::Delete => http.delete(url),
        }
        .header("Accept", ContentType::JsonLd.as_str());

        let builder = match self.body {
            Some((content_type, body)) => builder
                .body_bytes(body)
                .header("Content-Type", content_type.as_str()),
            None => builder,
        };

        builder.send(make_event);
    }
}
