//! Transport results and the captured [`ResponseRecord`].

use crate::error::TransportError;
use crate::wire::HeaderMap;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Timing breakdown of one exchange
///
/// Only `total` is guaranteed. Sub-timings are filled in when the transport
/// can measure them.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timing {
    /// Time from dispatch to completion
    pub total: Duration,
    /// DNS lookup
    pub dns: Option<Duration>,
    /// TCP connect
    pub connect: Option<Duration>,
    /// TLS handshake
    pub secure: Option<Duration>,
    /// Writing the request
    pub request: Option<Duration>,
    /// Reading the response
    pub response: Option<Duration>,
}

impl Timing {
    /// Timing with only the total set
    #[must_use]
    pub const fn total(total: Duration) -> Self {
        Self {
            total,
            dns: None,
            connect: None,
            secure: None,
            request: None,
            response: None,
        }
    }
}

/// What the transport received from the server
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportResponse {
    /// HTTP status code
    pub status: u16,
    /// Raw response headers; repeated names are kept
    pub headers: Vec<(String, String)>,
    /// Response body
    pub body: Vec<u8>,
    /// Transport-measured timing, if available
    pub timing: Option<Timing>,
}

impl TransportResponse {
    /// A response with the given status and body and no headers
    #[must_use]
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
            timing: None,
        }
    }

    /// Add a header
    #[must_use]
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    /// Attach transport timing
    #[must_use]
    pub fn with_timing(mut self, timing: Timing) -> Self {
        self.timing = Some(timing);
        self
    }
}

/// Outcome of a transport call
pub type TransportResult = Result<TransportResponse, TransportError>;

/// A cookie set by the server
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cookie {
    /// Cookie name
    pub name: String,
    /// Cookie value
    pub value: String,
    /// `Domain` attribute
    pub domain: Option<String>,
    /// `Path` attribute
    pub path: Option<String>,
    /// `Expires` attribute, unparsed
    pub expires: Option<String>,
    /// `Secure` flag
    pub secure: bool,
    /// `HttpOnly` flag
    pub http_only: bool,
}

impl Cookie {
    /// Parse one `Set-Cookie` header value
    ///
    /// Returns `None` when the value has no `name=value` pair.
    #[must_use]
    pub fn parse(header: &str) -> Option<Self> {
        let mut parts = header.split(';');
        let (name, value) = parts.next()?.split_once('=')?;
        let name = name.trim();
        if name.is_empty() {
            return None;
        }

        let mut cookie = Self {
            name: name.to_string(),
            value: value.trim().trim_matches('"').to_string(),
            domain: None,
            path: None,
            expires: None,
            secure: false,
            http_only: false,
        };

        for attribute in parts {
            let (key, val) = match attribute.split_once('=') {
                Some((key, val)) => (key.trim(), Some(val.trim().to_string())),
                None => (attribute.trim(), None),
            };
            match key.to_ascii_lowercase().as_str() {
                "domain" => cookie.domain = val,
                "path" => cookie.path = val,
                "expires" => cookie.expires = val,
                "secure" => cookie.secure = true,
                "httponly" => cookie.http_only = true,
                _ => {},
            }
        }

        Some(cookie)
    }
}

/// Captured outcome of executing a wire request
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseRecord {
    /// `true` when the transport delivered a response (any HTTP status)
    pub success: bool,
    /// HTTP status, or a negative code for transport errors
    pub status_code: i32,
    /// Transport error, when `success` is false
    pub error: Option<TransportError>,
    /// Response headers, deduplicated
    pub headers: HeaderMap,
    /// Response body
    pub body: Vec<u8>,
    /// Body size in bytes
    pub size: usize,
    /// Timing breakdown
    pub timing: Timing,
    /// Cookies from every `Set-Cookie` header
    pub cookies: Vec<Cookie>,
}

impl ResponseRecord {
    /// Build a record from a transport outcome
    ///
    /// `elapsed` is used as the total time when the transport did not
    /// measure timing itself.
    #[must_use]
    pub fn from_transport(result: TransportResult, elapsed: Duration) -> Self {
        match result {
            Ok(response) => {
                let cookies = response
                    .headers
                    .iter()
                    .filter(|(key, _)| key.eq_ignore_ascii_case("set-cookie"))
                    .filter_map(|(_, value)| Cookie::parse(value))
                    .collect();
                let size = response.body.len();
                Self {
                    success: true,
                    status_code: i32::from(response.status),
                    error: None,
                    headers: response.headers.into_iter().collect(),
                    body: response.body,
                    size,
                    timing: response.timing.unwrap_or_else(|| Timing::total(elapsed)),
                    cookies,
                }
            },
            Err(error) => Self {
                success: false,
                status_code: error.status_code(),
                error: Some(error),
                headers: HeaderMap::new(),
                body: Vec::new(),
                size: 0,
                timing: Timing::total(elapsed),
                cookies: Vec::new(),
            },
        }
    }

    /// Body decoded as UTF-8, lossily
    #[must_use]
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn successful_response_records_size_and_status() {
        let response = TransportResponse::new(200, "{}").with_header("Content-Type", "application/json");
        let record = ResponseRecord::from_transport(Ok(response), Duration::from_millis(12));

        assert!(record.success);
        assert_eq!(record.status_code, 200);
        assert_eq!(record.size, 2);
        assert_eq!(record.timing.total, Duration::from_millis(12));
        assert_eq!(record.headers.get("content-type"), Some("application/json"));
        assert!(record.error.is_none());
    }

    #[test]
    fn transport_timing_takes_precedence() {
        let timing = Timing {
            dns: Some(Duration::from_millis(1)),
            ..Timing::total(Duration::from_millis(40))
        };
        let response = TransportResponse::new(204, "").with_timing(timing.clone());
        let record = ResponseRecord::from_transport(Ok(response), Duration::from_millis(99));
        assert_eq!(record.timing, timing);
    }

    #[test]
    fn transport_error_is_a_failed_record() {
        let record = ResponseRecord::from_transport(
            Err(TransportError::Network("connection refused".into())),
            Duration::ZERO,
        );
        assert!(!record.success);
        assert_eq!(record.status_code, -1);
        assert_eq!(record.size, 0);
        assert!(record.body.is_empty());
    }

    #[test]
    fn cookies_survive_header_deduplication() {
        let response = TransportResponse::new(200, "")
            .with_header("Set-Cookie", "session=abc; Path=/; HttpOnly")
            .with_header("set-cookie", "theme=\"dark\"; Domain=example.com; Secure");
        let record = ResponseRecord::from_transport(Ok(response), Duration::ZERO);

        assert_eq!(record.headers.len(), 1);
        assert_eq!(record.cookies.len(), 2);
        assert_eq!(record.cookies[0].name, "session");
        assert_eq!(record.cookies[0].path.as_deref(), Some("/"));
        assert!(record.cookies[0].http_only);
        assert_eq!(record.cookies[1].value, "dark");
        assert_eq!(record.cookies[1].domain.as_deref(), Some("example.com"));
        assert!(record.cookies[1].secure);
    }

    #[test]
    fn malformed_cookie_is_skipped() {
        assert!(Cookie::parse("no-equals-sign").is_none());
        assert!(Cookie::parse("=value").is_none());
    }
}
