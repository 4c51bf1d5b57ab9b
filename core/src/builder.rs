//! Turning a [`RequestSpec`] into a [`WireRequest`].
//!
//! Everything here is pure: the builder reads the spec, never mutates it, and
//! reports every failure as a [`BuilderError`]. The only non-determinism is
//! the random `multipart/form-data` boundary.
//!
//! # Body encodings
//!
//! | tag | encoding | content type |
//! |---|---|---|
//! | `none` | empty | none |
//! | `json` / `xml` / `raw` | UTF-8 text | declared `Content-Type` header |
//! | `form` | `multipart/form-data` parts | `multipart/form-data; boundary=...` |
//! | `multipart` | `key=value` pairs concatenated without delimiter | declared header |
//! | `binary` | first file, else image, as-is | declared header, else attachment type |
//!
//! Both field-based encodings write into a byte buffer, so attachment bytes
//! that are not valid UTF-8 pass through unchanged.

use crate::error::BuilderError;
use crate::request::{Body, BodyField, Project, RequestSpec};
use crate::wire::{HeaderMap, WireRequest};
use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use rand::Rng;
use rand::distributions::Alphanumeric;
use url::Url;

/// Characters escaped inside a query key or value
///
/// `+` is deliberately absent: it stays literal unless the request declares
/// a form-urlencoded content type.
const QUERY_COMPONENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'&')
    .add(b'<')
    .add(b'=')
    .add(b'>')
    .add(b'[')
    .add(b'\\')
    .add(b']')
    .add(b'^')
    .add(b'`')
    .add(b'{')
    .add(b'|')
    .add(b'}');

const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";
const BOUNDARY_PREFIX: &str = "courier-boundary-";
const BOUNDARY_RANDOM_LEN: usize = 24;

/// An encoded body and the content type it should be sent with
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EncodedBody {
    /// Encoded bytes
    pub bytes: Vec<u8>,
    /// Content type, if the encoding or the caller defines one
    pub content_type: Option<String>,
}

/// Pure request builder
///
/// # Example
///
/// ```
/// use courier_core::builder::RequestBuilder;
/// use courier_core::request::{HttpMethod, Param, Project, RequestSpec};
///
/// let spec = RequestSpec::new("req-1", "ws-1", HttpMethod::get(), "example.com/search")
///     .with_param(Param::new("q", "rust"));
/// let wire = RequestBuilder::default()
///     .build(&spec, Some(&Project::new("ws-1")))
///     .unwrap();
/// assert_eq!(wire.url.as_str(), "http://example.com/search?q=rust");
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestBuilder {
    default_scheme: String,
}

impl Default for RequestBuilder {
    fn default() -> Self {
        Self {
            default_scheme: "http".to_string(),
        }
    }
}

impl RequestBuilder {
    /// Builder using `scheme` for URLs written without one
    #[must_use]
    pub fn with_default_scheme(scheme: impl Into<String>) -> Self {
        let scheme = scheme.into();
        Self {
            default_scheme: scheme.trim_end_matches("://").to_ascii_lowercase(),
        }
    }

    /// Scheme prepended to scheme-less URLs
    #[must_use]
    pub fn default_scheme(&self) -> &str {
        &self.default_scheme
    }

    /// Build the complete wire request
    ///
    /// # Errors
    ///
    /// - [`BuilderError::MissingProject`] when `project` is `None`
    /// - [`BuilderError::UnsupportedMethod`] when the project does not accept the method
    /// - [`BuilderError::InvalidUrl`] when the URL cannot be made absolute
    /// - [`BuilderError::NoBody`] when the body has nothing to send
    pub fn build(
        &self,
        spec: &RequestSpec,
        project: Option<&Project>,
    ) -> Result<WireRequest, BuilderError> {
        let project = project.ok_or_else(|| BuilderError::MissingProject {
            workspace_id: spec.workspace_id.to_string(),
        })?;
        if !project.allows(&spec.method) {
            return Err(BuilderError::UnsupportedMethod {
                method: spec.method.to_string(),
            });
        }

        let mut url = self.resolve_url(spec)?;
        let mut headers = self.build_headers(spec);

        let added = self.build_query(spec);
        let query = match (url.query().filter(|q| !q.is_empty()), added.is_empty()) {
            (Some(existing), false) => Some(format!("{existing}&{added}")),
            (Some(existing), true) => Some(existing.to_string()),
            (None, false) => Some(added),
            (None, true) => None,
        };
        if let Some(query) = query {
            let query = escape_plus_for_form_urlencoded(&headers, query);
            url.set_query(Some(&query));
        }

        let body = self.build_body(spec)?;
        if let Some(content_type) = &body.content_type {
            headers.insert("Content-Type", content_type.clone());
        }

        tracing::trace!(
            request_id = %spec.id,
            method = %spec.method,
            url = %url,
            body_len = body.bytes.len(),
            "Built wire request"
        );

        Ok(WireRequest {
            url,
            method: spec.method.clone(),
            headers,
            body: body.bytes,
            content_type: body.content_type,
        })
    }

    /// Resolve the spec's URL into an absolute URL
    ///
    /// A URL that starts with neither `http://` nor `https://` gets the
    /// default scheme prepended before parsing.
    ///
    /// # Errors
    ///
    /// Returns [`BuilderError::InvalidUrl`] if the result does not parse or
    /// has no host.
    pub fn resolve_url(&self, spec: &RequestSpec) -> Result<Url, BuilderError> {
        let raw = spec.url.trim();
        let invalid = || BuilderError::InvalidUrl {
            url: spec.url.clone(),
        };

        let candidate = if has_http_scheme(raw) {
            raw.to_string()
        } else {
            format!("{}://{raw}", self.default_scheme)
        };

        let url = Url::parse(&candidate).map_err(|_| invalid())?;
        if url.cannot_be_a_base() || !url.has_host() {
            return Err(invalid());
        }
        Ok(url)
    }

    /// Encoded query string built from enabled params, in spec order
    ///
    /// Repeated keys are kept. Returns an empty string when no param is enabled.
    #[must_use]
    pub fn build_query(&self, spec: &RequestSpec) -> String {
        spec.enabled_params()
            .map(|param| {
                format!(
                    "{}={}",
                    utf8_percent_encode(&param.key, QUERY_COMPONENT),
                    utf8_percent_encode(&param.value, QUERY_COMPONENT)
                )
            })
            .collect::<Vec<_>>()
            .join("&")
    }

    /// Header map built from enabled headers; later duplicates win
    #[must_use]
    pub fn build_headers(&self, spec: &RequestSpec) -> HeaderMap {
        spec.enabled_headers()
            .filter(|header| !header.key.trim().is_empty())
            .map(|header| (header.key.trim(), header.value.as_str()))
            .collect()
    }

    /// Encode the body according to its tag
    ///
    /// # Errors
    ///
    /// Returns [`BuilderError::NoBody`] for a binary body without attachment.
    pub fn build_body(&self, spec: &RequestSpec) -> Result<EncodedBody, BuilderError> {
        let declared = declared_content_type(spec);
        match &spec.body {
            Body::None => Ok(EncodedBody::default()),
            Body::Json(text) | Body::Xml(text) | Body::Raw(text) => Ok(EncodedBody {
                bytes: text.as_bytes().to_vec(),
                content_type: declared,
            }),
            Body::Form(fields) => {
                let (bytes, boundary) = encode_form_data(fields);
                Ok(EncodedBody {
                    bytes,
                    content_type: Some(format!("multipart/form-data; boundary={boundary}")),
                })
            },
            Body::Multipart(fields) => Ok(EncodedBody {
                bytes: encode_concatenated_pairs(fields),
                content_type: declared,
            }),
            Body::Binary(binary) => {
                let attachment = binary.attachment().ok_or(BuilderError::NoBody)?;
                Ok(EncodedBody {
                    bytes: attachment.data.clone(),
                    content_type: declared.or_else(|| Some(attachment.content_type.clone())),
                })
            },
        }
    }
}

/// Percent-encode literal `+` in `query` when the headers declare a
/// form-urlencoded body, so `+` is not read back as a space
#[must_use]
pub fn escape_plus_for_form_urlencoded(headers: &HeaderMap, query: String) -> String {
    let form_urlencoded = headers
        .iter()
        .any(|(key, value)| key.eq_ignore_ascii_case("content-type") && value == FORM_URLENCODED);
    if form_urlencoded {
        query.replace('+', "%2B")
    } else {
        query
    }
}

/// Encode enabled fields as a `multipart/form-data` body
///
/// Returns the body and the boundary used. The boundary is random and
/// regenerated until it occurs in no part.
#[must_use]
pub fn encode_form_data(fields: &[BodyField]) -> (Vec<u8>, String) {
    let parts: Vec<(String, &[u8])> = fields
        .iter()
        .filter(|field| field.enabled)
        .map(|field| {
            let name = escape_quoted(&field.key);
            match field.attachment() {
                Some(attachment) => (
                    format!(
                        "Content-Disposition: form-data; name=\"{name}\"; filename=\"{}\"\r\nContent-Type: {}\r\n",
                        escape_quoted(&attachment.file_name),
                        attachment.content_type
                    ),
                    attachment.data.as_slice(),
                ),
                None => (
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n"),
                    field.value.as_bytes(),
                ),
            }
        })
        .collect();

    let boundary = loop {
        let candidate = generate_boundary();
        let collides = parts.iter().any(|(headers, content)| {
            contains_subslice(headers.as_bytes(), candidate.as_bytes())
                || contains_subslice(content, candidate.as_bytes())
        });
        if !collides {
            break candidate;
        }
        tracing::debug!("Form boundary collided with part content, regenerating");
    };

    let mut body = Vec::new();
    for (headers, content) in &parts {
        body.extend_from_slice(b"--");
        body.extend_from_slice(boundary.as_bytes());
        body.extend_from_slice(b"\r\n");
        body.extend_from_slice(headers.as_bytes());
        body.extend_from_slice(b"\r\n");
        body.extend_from_slice(content);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(b"--");
    body.extend_from_slice(boundary.as_bytes());
    body.extend_from_slice(b"--\r\n");

    (body, boundary)
}

/// Encode enabled fields as `key=value` pairs with no delimiter between them
///
/// File fields contribute their attachment's raw bytes.
#[must_use]
pub fn encode_concatenated_pairs(fields: &[BodyField]) -> Vec<u8> {
    let mut body = Vec::new();
    for field in fields.iter().filter(|field| field.enabled) {
        body.extend_from_slice(field.key.as_bytes());
        body.push(b'=');
        match field.attachment() {
            Some(attachment) => body.extend_from_slice(&attachment.data),
            None => body.extend_from_slice(field.value.as_bytes()),
        }
    }
    body
}

fn has_http_scheme(url: &str) -> bool {
    let lower = url.get(..8).unwrap_or(url).to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Last enabled `Content-Type` header the caller declared
fn declared_content_type(spec: &RequestSpec) -> Option<String> {
    spec.enabled_headers()
        .filter(|header| header.key.trim().eq_ignore_ascii_case("content-type"))
        .last()
        .map(|header| header.value.clone())
}

fn generate_boundary() -> String {
    let random: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(BOUNDARY_RANDOM_LEN)
        .map(char::from)
        .collect();
    format!("{BOUNDARY_PREFIX}{random}")
}

fn escape_quoted(value: &str) -> String {
    value
        .replace('"', "%22")
        .replace('\r', "%0D")
        .replace('\n', "%0A")
}

fn contains_subslice(haystack: &[u8], needle: &[u8]) -> bool {
    !needle.is_empty() && haystack.windows(needle.len()).any(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{Attachment, BinaryBody, HttpMethod, Param};
    use proptest::prelude::*;

    fn spec(url: &str) -> RequestSpec {
        RequestSpec::new("req-1", "ws-1", HttpMethod::get(), url)
    }

    fn project() -> Project {
        Project::new("ws-1")
    }

    #[allow(clippy::expect_used)] // Panics: Test will fail if the body has no boundary
    fn boundary_of(content_type: Option<&str>) -> String {
        content_type
            .and_then(|ct| ct.strip_prefix("multipart/form-data; boundary="))
            .expect("form body should declare a boundary")
            .to_string()
    }

    fn count(haystack: &[u8], needle: &[u8]) -> usize {
        haystack.windows(needle.len()).filter(|w| *w == needle).count()
    }

    mod url_resolution {
        use super::*;

        #[test]
        fn prepends_default_scheme() {
            let url = RequestBuilder::default().resolve_url(&spec("example.com/api"));
            assert!(matches!(url, Ok(ref u) if u.as_str().starts_with("http://example.com/api")));
        }

        #[test]
        fn keeps_existing_scheme() {
            let url = RequestBuilder::default().resolve_url(&spec("https://example.com/api"));
            assert_eq!(url.map(String::from), Ok("https://example.com/api".to_string()));
        }

        #[test]
        fn scheme_check_ignores_case() {
            let url = RequestBuilder::default().resolve_url(&spec("HTTPS://Example.com/api"));
            assert_eq!(url.map(String::from), Ok("https://example.com/api".to_string()));
        }

        #[test]
        fn honours_configured_scheme() {
            let builder = RequestBuilder::with_default_scheme("https://");
            let url = builder.resolve_url(&spec("  example.com  "));
            assert_eq!(url.map(String::from), Ok("https://example.com/".to_string()));
        }

        #[test]
        fn rejects_urls_without_host() {
            let builder = RequestBuilder::default();
            for raw in ["", "   ", "http://", "http:// spaced host"] {
                assert_eq!(
                    builder.resolve_url(&spec(raw)),
                    Err(BuilderError::InvalidUrl { url: raw.to_string() }),
                    "{raw:?} should be rejected"
                );
            }
        }
    }

    mod query {
        use super::*;

        #[test]
        fn keeps_order_and_duplicates_and_skips_disabled() {
            let spec = spec("example.com")
                .with_param(Param::new("b", "2"))
                .with_param(Param::disabled("x", "hidden"))
                .with_param(Param::new("a", "1"))
                .with_param(Param::new("b", "3"));
            assert_eq!(RequestBuilder::default().build_query(&spec), "b=2&a=1&b=3");
        }

        #[test]
        fn encodes_separators_but_not_plus() {
            let spec = spec("example.com").with_param(Param::new("q", "a b&c=d+e"));
            assert_eq!(RequestBuilder::default().build_query(&spec), "q=a%20b%26c%3Dd+e");
        }

        #[test]
        fn plus_is_escaped_for_form_urlencoded_requests() {
            let spec = spec("example.com")
                .with_header(Param::new("Content-Type", "application/x-www-form-urlencoded"))
                .with_param(Param::new("q", "a+b"));
            let wire = RequestBuilder::default().build(&spec, Some(&project()));
            let query = wire.map(|w| w.url.query().map(str::to_string));

            assert_eq!(query, Ok(Some("q=a%2Bb".to_string())));
        }

        #[test]
        fn plus_stays_literal_otherwise() {
            let spec = spec("example.com").with_param(Param::new("q", "a+b"));
            let wire = RequestBuilder::default().build(&spec, Some(&project()));
            let query = wire.map(|w| w.url.query().map(str::to_string));

            assert_eq!(query, Ok(Some("q=a+b".to_string())));
        }

        #[test]
        fn content_type_key_match_is_case_insensitive() {
            let headers: HeaderMap = vec![("CONTENT-TYPE", FORM_URLENCODED)].into_iter().collect();
            assert_eq!(escape_plus_for_form_urlencoded(&headers, "a+b".into()), "a%2Bb");
        }

        #[test]
        fn params_are_appended_to_existing_query() {
            let spec = spec("example.com/items?page=2").with_param(Param::new("sort", "asc"));
            let wire = RequestBuilder::default().build(&spec, Some(&project()));
            assert_eq!(
                wire.map(|w| w.url.to_string()),
                Ok("http://example.com/items?page=2&sort=asc".to_string())
            );
        }

        #[test]
        fn no_params_leaves_url_untouched() {
            let wire = RequestBuilder::default().build(&spec("example.com/a"), Some(&project()));
            assert_eq!(wire.map(|w| w.url.to_string()), Ok("http://example.com/a".to_string()));
        }
    }

    mod headers {
        use super::*;

        #[test]
        fn enabled_headers_last_write_wins() {
            let spec = spec("example.com")
                .with_header(Param::new("Accept", "text/plain"))
                .with_header(Param::disabled("X-Debug", "1"))
                .with_header(Param::new("accept", "application/json"));
            let headers = RequestBuilder::default().build_headers(&spec);

            assert_eq!(headers.len(), 1);
            assert_eq!(headers.get("Accept"), Some("application/json"));
        }

        #[test]
        fn blank_keys_are_skipped() {
            let spec = spec("example.com").with_header(Param::new("  ", "orphan"));
            assert!(RequestBuilder::default().build_headers(&spec).is_empty());
        }
    }

    mod body {
        use super::*;

        #[test]
        fn none_is_empty() {
            let body = RequestBuilder::default().build_body(&spec("example.com"));
            assert_eq!(body, Ok(EncodedBody::default()));
        }

        #[test]
        fn text_bodies_use_declared_content_type() {
            let spec = spec("example.com")
                .with_header(Param::new("Content-Type", "application/json"))
                .with_body(Body::Json("{\"a\":1}".into()));
            let body = RequestBuilder::default().build_body(&spec);
            assert_eq!(
                body,
                Ok(EncodedBody {
                    bytes: b"{\"a\":1}".to_vec(),
                    content_type: Some("application/json".into()),
                })
            );
        }

        #[test]
        fn text_body_without_declared_type_has_none() {
            let spec = spec("example.com").with_body(Body::Xml("<a/>".into()));
            let body = RequestBuilder::default().build_body(&spec);
            assert_eq!(body.map(|b| b.content_type), Ok(None));
        }

        #[test]
        #[allow(clippy::expect_used)] // Panics: Test will fail if the body does not build
        fn form_emits_one_part_per_enabled_field() {
            let spec = spec("example.com").with_body(Body::Form(vec![
                BodyField::text("a", "1"),
                BodyField::text("b", "2"),
                BodyField::text("c", "3").disable(),
            ]));
            let body = RequestBuilder::default().build_body(&spec).expect("form body should build");
            let boundary = boundary_of(body.content_type.as_deref());
            let opening = format!("--{boundary}\r\n");

            assert_eq!(count(&body.bytes, opening.as_bytes()), 2);
            assert!(body.bytes.ends_with(format!("--{boundary}--\r\n").as_bytes()));
            assert_eq!(count(&body.bytes, b"Content-Disposition"), 2);
            assert!(!["1", "2", "3"].iter().any(|v| v.contains(&boundary)));

            let text = String::from_utf8_lossy(&body.bytes);
            assert!(text.contains("Content-Disposition: form-data; name=\"a\"\r\n\r\n1\r\n"));
            assert!(text.contains("Content-Disposition: form-data; name=\"b\"\r\n\r\n2\r\n"));
            assert!(!text.contains("name=\"c\""));
        }

        #[test]
        fn form_file_part_carries_filename_type_and_raw_bytes() {
            let raw = vec![0xff, 0x00, 0xfe, b'\r', b'\n', 0x80];
            let fields = vec![BodyField::file(
                "upload",
                Attachment::new("blob.bin", "application/octet-stream", raw.clone()),
            )];
            let (bytes, _) = encode_form_data(&fields);

            let header = b"Content-Disposition: form-data; name=\"upload\"; filename=\"blob.bin\"\r\nContent-Type: application/octet-stream\r\n\r\n";
            let start = bytes
                .windows(header.len())
                .position(|w| w == header)
                .map(|p| p + header.len());
            assert_eq!(start.map(|s| &bytes[s..s + raw.len()]), Some(raw.as_slice()));
        }

        #[test]
        fn form_uses_image_when_no_file_attached() {
            let mut field = BodyField::file("pic", Attachment::new("unused", "x/y", vec![]));
            field.files.clear();
            field.image = Some(Attachment::new("cat.png", "image/png", vec![1, 2, 3]));
            let (bytes, _) = encode_form_data(&[field]);
            let text = String::from_utf8_lossy(&bytes);
            assert!(text.contains("filename=\"cat.png\"\r\nContent-Type: image/png"));
        }

        #[test]
        fn form_escapes_quotes_in_names() {
            let (bytes, _) = encode_form_data(&[BodyField::text("we\"ird", "v")]);
            assert!(String::from_utf8_lossy(&bytes).contains("name=\"we%22ird\""));
        }

        #[test]
        fn form_content_type_overrides_declared_header() {
            let spec = spec("example.com")
                .with_header(Param::new("content-type", "text/plain"))
                .with_body(Body::Form(vec![BodyField::text("a", "1")]));
            let wire = RequestBuilder::default().build(&spec, Some(&project()));
            let content_type = wire.map(|w| w.headers.get("Content-Type").map(str::to_string));

            assert!(matches!(
                content_type,
                Ok(Some(ref ct)) if ct.starts_with("multipart/form-data; boundary=")
            ));
        }

        #[test]
        fn multipart_concatenates_without_delimiters() {
            let fields = vec![
                BodyField::text("a", "1"),
                BodyField::text("skip", "x").disable(),
                BodyField::text("b", "2"),
            ];
            assert_eq!(encode_concatenated_pairs(&fields), b"a=1b=2".to_vec());
        }

        #[test]
        fn multipart_keeps_attachment_bytes_intact() {
            let fields = vec![
                BodyField::text("k", "v"),
                BodyField::file("f", Attachment::new("x", "application/octet-stream", vec![0xc3, 0x28])),
            ];
            assert_eq!(encode_concatenated_pairs(&fields), vec![b'k', b'=', b'v', b'f', b'=', 0xc3, 0x28]);
        }

        #[test]
        fn binary_sends_first_file() {
            let spec = spec("example.com").with_body(Body::Binary(BinaryBody {
                files: vec![
                    Attachment::new("a.bin", "application/pdf", vec![1]),
                    Attachment::new("b.bin", "text/plain", vec![2]),
                ],
                image: Some(Attachment::new("c.png", "image/png", vec![3])),
            }));
            let body = RequestBuilder::default().build_body(&spec);
            assert_eq!(
                body,
                Ok(EncodedBody {
                    bytes: vec![1],
                    content_type: Some("application/pdf".into()),
                })
            );
        }

        #[test]
        fn binary_falls_back_to_image() {
            let spec = spec("example.com").with_body(Body::Binary(BinaryBody {
                files: vec![],
                image: Some(Attachment::new("c.png", "image/png", vec![3])),
            }));
            let body = RequestBuilder::default().build_body(&spec);
            assert_eq!(body.map(|b| b.bytes), Ok(vec![3]));
        }

        #[test]
        fn binary_without_attachment_is_no_body() {
            let spec = spec("example.com").with_body(Body::Binary(BinaryBody::default()));
            assert_eq!(RequestBuilder::default().build_body(&spec), Err(BuilderError::NoBody));
        }
    }

    mod build {
        use super::*;

        #[test]
        fn missing_project_fails() {
            let result = RequestBuilder::default().build(&spec("example.com"), None);
            assert_eq!(
                result,
                Err(BuilderError::MissingProject {
                    workspace_id: "ws-1".into()
                })
            );
        }

        #[test]
        fn unsupported_method_fails() {
            let mut spec = spec("example.com");
            spec.method = HttpMethod::new("BREW");
            let result = RequestBuilder::default().build(&spec, Some(&project()));
            assert_eq!(
                result,
                Err(BuilderError::UnsupportedMethod {
                    method: "BREW".into()
                })
            );
        }

        #[test]
        fn build_never_mutates_the_spec() {
            let spec = spec("example.com")
                .with_header(Param::new("Content-Type", FORM_URLENCODED))
                .with_param(Param::new("q", "a+b"))
                .with_body(Body::Form(vec![BodyField::text("a", "1")]));
            let before = spec.clone();
            let _ = RequestBuilder::default().build(&spec, Some(&project()));
            assert_eq!(spec, before);
        }

        #[test]
        #[allow(clippy::expect_used)] // Panics: Test will fail if the request does not build
        fn wire_request_carries_method_headers_and_body() {
            let spec = RequestSpec::new("req-1", "ws-1", HttpMethod::post(), "api.example.com/v1/items")
                .with_header(Param::new("Authorization", "Bearer t"))
                .with_header(Param::new("Content-Type", "application/json"))
                .with_body(Body::Json("[]".into()));
            let wire = RequestBuilder::default()
                .build(&spec, Some(&project()))
                .expect("request should build");

            assert_eq!(wire.method, HttpMethod::post());
            assert_eq!(wire.url.as_str(), "http://api.example.com/v1/items");
            assert_eq!(wire.headers.get("authorization"), Some("Bearer t"));
            assert_eq!(wire.content_type.as_deref(), Some("application/json"));
            assert_eq!(wire.body, b"[]".to_vec());
        }
    }

    proptest! {
        #[test]
        fn boundary_never_occurs_in_field_values(values in prop::collection::vec(".{0,64}", 1..8)) {
            let fields: Vec<_> = values
                .iter()
                .enumerate()
                .map(|(i, v)| BodyField::text(format!("f{i}"), v.clone()))
                .collect();
            let (bytes, boundary) = encode_form_data(&fields);

            prop_assert!(values.iter().all(|v| !v.contains(&boundary)));
            prop_assert_eq!(count(&bytes, format!("--{boundary}\r\n").as_bytes()), fields.len());
        }

        #[test]
        fn query_has_one_item_per_enabled_param(
            params in prop::collection::vec(("[a-z]{1,8}", "[ -~]{0,16}", any::<bool>()), 0..10)
        ) {
            let mut spec = spec("example.com");
            for (key, value, enabled) in &params {
                spec.params.push(Param { key: key.clone(), value: value.clone(), enabled: *enabled });
            }
            let query = RequestBuilder::default().build_query(&spec);
            let expected = params.iter().filter(|(_, _, enabled)| *enabled).count();
            let items = if query.is_empty() { 0 } else { query.split('&').count() };
            prop_assert_eq!(items, expected);
        }
    }
}
