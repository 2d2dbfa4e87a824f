//! The POST request and the received response as plain data.
//!
//! # Design
//! [`HttpRequest`] validates the URL and turns into a `hyper` request; the
//! HTTP/1.1 wire format, body framing and interim responses are handled by
//! hyper's client connection. [`HttpResponse`] is the fully collected result,
//! detached from any hyper types so it can be cloned, compared and logged.

use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{self, HeaderMap};
use hyper::{Method, Request, StatusCode};
use url::Url;

use crate::error::{Error, Result};

const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// An HTTPS POST described as plain data.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub url: Url,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpRequest {
    /// Validate `url` and wrap `body`. Only absolute `https` URLs with a
    /// host are accepted.
    pub fn post(url: &str, body: impl Into<Vec<u8>>) -> Result<Self> {
        let url = Url::parse(url).map_err(|e| Error::InvalidRequest(format!("{url:?}: {e}")))?;
        if url.scheme() != "https" {
            return Err(Error::InvalidRequest(format!(
                "scheme must be https, got {}",
                url.scheme()
            )));
        }
        if url.host().is_none() {
            return Err(Error::InvalidRequest(format!("{url} has no host")));
        }
        Ok(Self {
            url,
            headers: Vec::new(),
            body: body.into(),
        })
    }

    pub fn with_headers(mut self, headers: &[(String, String)]) -> Self {
        self.headers.extend_from_slice(headers);
        self
    }

    /// Host name or IP literal without brackets, for DNS and SNI.
    pub fn host(&self) -> &str {
        let host = self.url.host_str().unwrap_or_default();
        host.trim_start_matches('[').trim_end_matches(']')
    }

    pub fn port(&self) -> u16 {
        self.url.port_or_known_default().unwrap_or(443)
    }

    /// Origin-form request target: path plus query.
    fn target(&self) -> String {
        match self.url.query() {
            Some(query) => format!("{}?{query}", self.url.path()),
            None => self.url.path().to_string(),
        }
    }

    /// `Host` header value; the port appears only when the URL names one.
    fn authority(&self) -> String {
        let host = self.url.host_str().unwrap_or_default();
        match self.url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        }
    }

    /// Build the hyper request sent on a fresh connection that is closed
    /// after the response.
    pub fn to_hyper(&self) -> Result<Request<Full<Bytes>>> {
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri(self.target())
            .header(header::HOST, self.authority())
            .header(header::USER_AGENT, USER_AGENT)
            .header(header::ACCEPT, "*/*")
            .header(header::CONTENT_LENGTH, self.body.len().to_string())
            .header(header::CONNECTION, "close");
        for (name, value) in &self.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        builder
            .body(Full::new(Bytes::copy_from_slice(&self.body)))
            .map_err(|e| Error::InvalidRequest(format!("cannot build request: {e}")))
    }
}

/// A fully received HTTP response described as plain data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub(crate) fn from_parts(status: StatusCode, headers: &HeaderMap, body: Bytes) -> Self {
        Self {
            status: status.as_u16(),
            headers: headers
                .iter()
                .map(|(name, value)| {
                    (
                        name.as_str().to_string(),
                        String::from_utf8_lossy(value.as_bytes()).into_owned(),
                    )
                })
                .collect(),
            body: body.to_vec(),
        }
    }

    /// First header value with a case-insensitive name match.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyper::header::HeaderValue;

    #[test]
    fn post_rejects_http_scheme() {
        let err = HttpRequest::post("http://host/path", Vec::new()).unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));
    }

    #[test]
    fn post_rejects_relative_url() {
        let err = HttpRequest::post("/sendmail", Vec::new()).unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));
    }

    #[test]
    fn post_defaults_port_443() {
        let req = HttpRequest::post("https://example.com", Vec::new()).unwrap();
        assert_eq!(req.port(), 443);
        assert_eq!(req.host(), "example.com");
    }

    #[test]
    fn ipv6_host_is_unbracketed() {
        let req = HttpRequest::post("https://[::1]:8443/x", Vec::new()).unwrap();
        assert_eq!(req.host(), "::1");
        assert_eq!(req.port(), 8443);
    }

    #[test]
    fn hyper_request_carries_target_headers_and_length() {
        let req = HttpRequest::post("https://127.0.0.1:44325/sendmail?x=1", b"{}".to_vec())
            .unwrap()
            .with_headers(&[("Content-Type".to_string(), "application/json".to_string())])
            .to_hyper()
            .unwrap();

        assert_eq!(req.method(), Method::POST);
        assert_eq!(req.uri(), "/sendmail?x=1");
        let headers = req.headers();
        assert_eq!(headers[header::HOST], "127.0.0.1:44325");
        assert_eq!(headers[header::CONTENT_LENGTH], "2");
        assert_eq!(headers[header::CONNECTION], "close");
        assert_eq!(headers[header::CONTENT_TYPE], "application/json");
    }

    #[test]
    fn host_header_omits_default_port() {
        let req = HttpRequest::post("https://example.com/", Vec::new())
            .unwrap()
            .to_hyper()
            .unwrap();
        assert_eq!(req.headers()[header::HOST], "example.com");
        assert_eq!(req.headers()[header::CONTENT_LENGTH], "0");
    }

    #[test]
    fn unencodable_header_is_invalid_request() {
        let err = HttpRequest::post("https://example.com/", Vec::new())
            .unwrap()
            .with_headers(&[("bad name".to_string(), "v".to_string())])
            .to_hyper()
            .unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));
    }

    #[test]
    fn response_header_lookup_ignores_case() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        let resp = HttpResponse::from_parts(StatusCode::NOT_FOUND, &headers, Bytes::from("nope"));

        assert_eq!(resp.status, 404);
        assert_eq!(resp.header("Content-Type"), Some("text/plain"));
        assert_eq!(resp.header("x-missing"), None);
        assert_eq!(resp.body, b"nope");
    }
}
