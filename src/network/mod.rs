//! Request and response descriptors plus the network seam
//!
//! The fetch strategy only ever talks to the network through the [`Network`]
//! trait, so tests can swap in a scripted implementation and the binary can
//! use [`HttpNetwork`].

mod http;

pub use http::HttpNetwork;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Method, Url};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Status used for synthesized offline responses
pub const FALLBACK_STATUS: u16 = 503;

/// Body of synthesized offline responses
pub const FALLBACK_BODY: &str = "Service unavailable: you appear to be offline.";

/// Errors that can occur when fetching from the network
#[derive(Debug, Error)]
pub enum NetworkError {
    /// No response could be obtained (DNS, connect, TLS, ...)
    #[error("request to {url} failed: {reason}")]
    RequestFailed { url: String, reason: String },

    /// The network did not answer within the configured timeout
    #[error("request to {0} timed out")]
    Timeout(String),

    /// Headers arrived but the body could not be read
    #[error("failed to read body from {url}: {reason}")]
    Body { url: String, reason: String },
}

/// What kind of resource a request is for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Destination {
    /// Top-level navigation
    Document,
    Script,
    Style,
    Image,
    Font,
    Manifest,
    /// fetch()/XHR and anything else without a destination
    #[default]
    Empty,
}

impl FromStr for Destination {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "document" | "doc" => Ok(Self::Document),
            "script" => Ok(Self::Script),
            "style" => Ok(Self::Style),
            "image" => Ok(Self::Image),
            "font" => Ok(Self::Font),
            "manifest" => Ok(Self::Manifest),
            "" | "empty" => Ok(Self::Empty),
            other => Err(format!(
                "unknown destination '{}'. Valid: document, script, style, image, font, manifest, empty",
                other
            )),
        }
    }
}

/// An intercepted request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: Method,
    pub url: Url,
    pub destination: Destination,
}

impl Request {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            destination: Destination::Empty,
        }
    }

    /// A GET request with no particular destination
    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    /// A top-level navigation to `url`
    pub fn navigate(url: Url) -> Self {
        Self::get(url).with_destination(Destination::Document)
    }

    pub fn with_destination(mut self, destination: Destination) -> Self {
        self.destination = destination;
        self
    }

    /// Whether the request targets the same origin as `origin`
    pub fn is_same_origin(&self, origin: &Url) -> bool {
        self.url.origin() == origin.origin()
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}

/// How a response was obtained, mirroring the platform's response types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseKind {
    /// Same-origin response
    Basic,
    /// Cross-origin response with readable body
    Cors,
    /// Network-level error response
    Error,
}

/// A response as seen by the caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    /// Header values are kept as raw bytes; they need not be UTF-8
    pub headers: Vec<(String, Vec<u8>)>,
    /// Cloning is cheap; the same bytes can be returned and persisted
    pub body: Bytes,
    pub kind: ResponseKind,
}

impl Response {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
            kind: ResponseKind::Basic,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_kind(mut self, kind: ResponseKind) -> Self {
        self.kind = kind;
        self
    }

    /// Synthesized response for when neither the store nor the network can answer
    pub fn fallback() -> Self {
        Self::new(FALLBACK_STATUS, FALLBACK_BODY)
            .with_header("content-type", "text/plain; charset=utf-8")
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Only successful, non-error responses are ever written to the store
    pub fn is_cacheable(&self) -> bool {
        self.is_success() && self.kind != ResponseKind::Error
    }

    /// Case-insensitive header lookup, raw value
    pub fn header_bytes(&self, name: &str) -> Option<&[u8]> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_slice())
    }

    /// Case-insensitive header lookup; `None` if absent or not UTF-8
    pub fn header(&self, name: &str) -> Option<&str> {
        self.header_bytes(name)
            .and_then(|v| std::str::from_utf8(v).ok())
    }
}

/// Anything that can turn a request into a response
#[async_trait]
pub trait Network: Send + Sync {
    /// Performs the request. Non-2xx statuses are still `Ok`; only a missing
    /// response is an error.
    async fn fetch(&self, request: &Request) -> Result<Response, NetworkError>;
}
