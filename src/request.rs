//! Request construction and body buffering.
//!
//! A [`RequestBuilder`] is called once per outer attempt. The engine then
//! buffers the body into a [`ReplayableRequest`] so the transport retry loop
//! can rebuild an identical request for every sub-attempt.

use crate::error::{DeliveryError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE, USER_AGENT};
use reqwest::{Body, Method, Request, Url};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

/// Default `User-Agent` sent by [`JsonRequestBuilder`].
pub const DEFAULT_USER_AGENT: &str = concat!("webhook-courier/", env!("CARGO_PKG_VERSION"));

/// Produces the request for one delivery attempt.
///
/// Implementations must be re-callable: the orchestrator invokes `build`
/// once per outer attempt and expects an equivalent request each time.
/// Builders that do slow work should watch `cancel` and return
/// [`DeliveryError::Cancelled`] once it fires.
#[async_trait]
pub trait RequestBuilder: Send + Sync {
    async fn build(&self, cancel: &CancellationToken, url: &str) -> Result<Request>;
}

/// Builds `POST` requests carrying a JSON body.
#[derive(Debug, Clone)]
pub struct JsonRequestBuilder {
    payload: Bytes,
    user_agent: HeaderValue,
}

impl JsonRequestBuilder {
    /// Wrap an already-encoded JSON payload.
    ///
    /// Returns [`DeliveryError::EmptyPayload`] for an empty payload.
    pub fn new(payload: impl Into<Bytes>) -> Result<Self> {
        let payload = payload.into();
        if payload.is_empty() {
            return Err(DeliveryError::EmptyPayload);
        }
        Ok(Self {
            payload,
            user_agent: HeaderValue::from_static(DEFAULT_USER_AGENT),
        })
    }

    /// Serialize `value` to JSON and wrap it.
    pub fn from_value<T: Serialize + ?Sized>(value: &T) -> Result<Self> {
        Self::new(serde_json::to_vec(value)?)
    }

    /// Override the `User-Agent` header.
    pub fn with_user_agent(mut self, user_agent: &str) -> Result<Self> {
        self.user_agent = HeaderValue::from_str(user_agent).map_err(|e| {
            DeliveryError::InvalidConfig(format!("invalid user agent '{}': {}", user_agent, e))
        })?;
        Ok(self)
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }
}

#[async_trait]
impl RequestBuilder for JsonRequestBuilder {
    async fn build(&self, _cancel: &CancellationToken, url: &str) -> Result<Request> {
        let mut request = Request::new(Method::POST, parse_url(url)?);
        let headers = request.headers_mut();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(USER_AGENT, self.user_agent.clone());
        *request.body_mut() = Some(Body::from(self.payload.clone()));
        Ok(request)
    }
}

pub(crate) fn parse_url(url: &str) -> Result<Url> {
    Url::parse(url).map_err(|e| DeliveryError::InvalidUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })
}

/// A request whose body has been fully buffered.
///
/// [`ReplayableRequest::to_request`] returns a fresh [`Request`] each call,
/// so a body consumed by a failed send never leaks into the next one.
#[derive(Debug, Clone)]
pub struct ReplayableRequest {
    method: Method,
    url: Url,
    headers: HeaderMap,
    body: Bytes,
}

impl ReplayableRequest {
    /// Buffer `request`'s body and drop the original.
    ///
    /// Fails with [`DeliveryError::BodyNotReplayable`] for streaming bodies.
    pub fn from_request(request: Request) -> Result<Self> {
        let body = match request.body() {
            None => Bytes::new(),
            Some(body) => body
                .as_bytes()
                .map(Bytes::copy_from_slice)
                .ok_or(DeliveryError::BodyNotReplayable)?,
        };
        Ok(Self {
            method: request.method().clone(),
            url: request.url().clone(),
            headers: request.headers().clone(),
            body,
        })
    }

    /// Build a new request with the buffered method, URL, headers, and body.
    pub fn to_request(&self) -> Request {
        let mut request = Request::new(self.method.clone(), self.url.clone());
        *request.headers_mut() = self.headers.clone();
        *request.body_mut() = Some(Body::from(self.body.clone()));
        request
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }
}
