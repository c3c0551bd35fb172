//! Request and response descriptions handed to the cache

use http::{HeaderMap, Method, Request, Response, StatusCode};
use url::Url;

use crate::error::Result;

/// What the cache needs to know about a request
#[derive(Debug, Clone)]
pub struct RequestIdentity {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
}

impl RequestIdentity {
    pub fn new(method: Method, url: Url, headers: HeaderMap) -> Self {
        Self {
            method,
            url,
            headers,
        }
    }

    /// GET request for `url` without headers.
    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url, HeaderMap::new())
    }

    /// Parses `url` into a GET request without headers.
    pub fn parse_get(url: &str) -> Result<Self> {
        Ok(Self::get(Url::parse(url)?))
    }

    /// Extracts the identity of an `http::Request`, whose URI must be absolute.
    pub fn from_request<B>(request: &Request<B>) -> Result<Self> {
        let url = Url::parse(&request.uri().to_string())?;
        Ok(Self::new(
            request.method().clone(),
            url,
            request.headers().clone(),
        ))
    }
}

/// What the cache needs to know about a response
#[derive(Debug, Clone)]
pub struct ResponseMeta {
    pub status: StatusCode,
    pub headers: HeaderMap,
}

impl ResponseMeta {
    pub fn new(status: StatusCode, headers: HeaderMap) -> Self {
        Self { status, headers }
    }

    pub fn from_response<B>(response: &Response<B>) -> Self {
        Self::new(response.status(), response.headers().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_identity_from_http_request() {
        let request = Request::builder()
            .method(Method::GET)
            .uri("https://example.com/path?q=1")
            .header("accept", "text/plain")
            .body(())
            .unwrap();
        let identity = RequestIdentity::from_request(&request).unwrap();
        assert_eq!(identity.url.as_str(), "https://example.com/path?q=1");
        assert_eq!(identity.headers["accept"], "text/plain");
    }

    #[test]
    fn relative_request_uri_is_rejected() {
        let request = Request::builder().uri("/path").body(()).unwrap();
        assert!(RequestIdentity::from_request(&request).is_err());
        assert!(RequestIdentity::parse_get("not a url").is_err());
    }

    #[test]
    fn response_meta_from_http_response() {
        let response = Response::builder()
            .status(404)
            .header("etag", "\"v1\"")
            .body(())
            .unwrap();
        let meta = ResponseMeta::from_response(&response);
        assert_eq!(meta.status, StatusCode::NOT_FOUND);
        assert_eq!(meta.headers["etag"], "\"v1\"");
    }
}
