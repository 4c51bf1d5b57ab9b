//! User-authored request descriptions.
//!
//! A [`RequestSpec`] is the snapshot the storage collaborator hands to the
//! engine. It is never mutated by the engine: template resolution produces a
//! new spec, and the builder only reads from it.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create an identifier from any string-like value
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Borrow the identifier as a string slice
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self::new(id)
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }
    };
}

string_id!(
    /// Identifier of a stored request
    RequestId
);
string_id!(
    /// Identifier of the workspace (project) owning a request
    WorkspaceId
);
string_id!(
    /// Identifier of a selectable variable environment
    EnvironmentId
);
string_id!(
    /// Identifier of a persisted history entry
    HistoryId
);

/// HTTP method name as authored by the user
///
/// Stored upper-cased. Projects may declare custom method names, so this is
/// an open string rather than a closed enum.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct HttpMethod(String);

impl HttpMethod {
    /// `GET`
    #[must_use]
    pub fn get() -> Self {
        Self::new("GET")
    }

    /// `POST`
    #[must_use]
    pub fn post() -> Self {
        Self::new("POST")
    }

    /// Create a method, normalizing to upper case
    #[must_use]
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(name.as_ref().trim().to_ascii_uppercase())
    }

    /// The method name
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for HttpMethod {
    fn from(name: String) -> Self {
        Self::new(name)
    }
}

impl From<HttpMethod> for String {
    fn from(method: HttpMethod) -> Self {
        method.0
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A header or query parameter row
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Param {
    /// Parameter name
    pub key: String,
    /// Parameter value (may contain unresolved template tokens)
    pub value: String,
    /// Disabled rows are kept for editing but never sent
    pub enabled: bool,
}

impl Param {
    /// An enabled parameter
    #[must_use]
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            enabled: true,
        }
    }

    /// A disabled parameter
    #[must_use]
    pub fn disabled(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            enabled: false,
            ..Self::new(key, value)
        }
    }
}

/// Header row
pub type HeaderParam = Param;

/// Query string row
pub type QueryParam = Param;

/// A file or image attached to a body field or a binary body
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    /// File name sent in `Content-Disposition`
    pub file_name: String,
    /// MIME type of the data
    pub content_type: String,
    /// Raw bytes, never re-encoded
    pub data: Vec<u8>,
}

impl Attachment {
    /// Create an attachment
    #[must_use]
    pub fn new(
        file_name: impl Into<String>,
        content_type: impl Into<String>,
        data: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: content_type.into(),
            data: data.into(),
        }
    }
}

/// Whether a body field carries text or a file
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    /// Plain text value
    #[default]
    Text,
    /// File upload; bytes come from the field's attachments
    File,
}

/// One row of a form or multipart body
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BodyField {
    /// Field name
    pub key: String,
    /// Text value (for file fields, used only when no attachment exists)
    pub value: String,
    /// Disabled rows are never encoded
    pub enabled: bool,
    /// Text or file
    pub kind: FieldKind,
    /// Attached files, first one wins
    #[serde(default)]
    pub files: Vec<Attachment>,
    /// Attached image, used when no file is attached
    #[serde(default)]
    pub image: Option<Attachment>,
}

impl BodyField {
    /// An enabled text field
    #[must_use]
    pub fn text(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            enabled: true,
            kind: FieldKind::Text,
            files: Vec::new(),
            image: None,
        }
    }

    /// An enabled file field with a single attachment
    #[must_use]
    pub fn file(key: impl Into<String>, attachment: Attachment) -> Self {
        Self {
            value: attachment.file_name.clone(),
            kind: FieldKind::File,
            files: vec![attachment],
            ..Self::text(key, String::new())
        }
    }

    /// Same field with the enabled flag cleared
    #[must_use]
    pub fn disable(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// The attachment this field uploads: first file, else the image
    #[must_use]
    pub fn attachment(&self) -> Option<&Attachment> {
        if self.kind != FieldKind::File {
            return None;
        }
        self.files.first().or(self.image.as_ref())
    }
}

/// Attachment source of a binary body
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinaryBody {
    /// Attached files, first one wins
    #[serde(default)]
    pub files: Vec<Attachment>,
    /// Attached image, used when no file is attached
    #[serde(default)]
    pub image: Option<Attachment>,
}

impl BinaryBody {
    /// The attachment to send: first file, else the image
    #[must_use]
    pub fn attachment(&self) -> Option<&Attachment> {
        self.files.first().or(self.image.as_ref())
    }
}

/// Request body, tagged by encoding
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "content", rename_all = "lowercase")]
pub enum Body {
    /// No body
    #[default]
    None,
    /// JSON text
    Json(String),
    /// XML text
    Xml(String),
    /// Arbitrary text
    Raw(String),
    /// Encoded as `multipart/form-data`
    Form(Vec<BodyField>),
    /// Encoded as a flat `key=value` concatenation
    Multipart(Vec<BodyField>),
    /// A single attachment sent as-is
    Binary(BinaryBody),
}

/// Snapshot of a user-authored request
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestSpec {
    /// Stable request identifier (the registry key)
    pub id: RequestId,
    /// Owning workspace
    pub workspace_id: WorkspaceId,
    /// Target URL, possibly without scheme and with template tokens
    pub url: String,
    /// HTTP method
    pub method: HttpMethod,
    /// Header rows in authoring order
    #[serde(default)]
    pub headers: Vec<HeaderParam>,
    /// Query rows in authoring order
    #[serde(default)]
    pub params: Vec<QueryParam>,
    /// Request body
    #[serde(default)]
    pub body: Body,
    /// Selected variable environment, if any
    #[serde(default)]
    pub environment_id: Option<EnvironmentId>,
}

impl RequestSpec {
    /// Create a spec with no headers, params, or body
    #[must_use]
    pub fn new(
        id: impl Into<RequestId>,
        workspace_id: impl Into<WorkspaceId>,
        method: HttpMethod,
        url: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            workspace_id: workspace_id.into(),
            url: url.into(),
            method,
            headers: Vec::new(),
            params: Vec::new(),
            body: Body::None,
            environment_id: None,
        }
    }

    /// Add a header row
    #[must_use]
    pub fn with_header(mut self, header: HeaderParam) -> Self {
        self.headers.push(header);
        self
    }

    /// Add a query row
    #[must_use]
    pub fn with_param(mut self, param: QueryParam) -> Self {
        self.params.push(param);
        self
    }

    /// Set the body
    #[must_use]
    pub fn with_body(mut self, body: Body) -> Self {
        self.body = body;
        self
    }

    /// Select a variable environment
    #[must_use]
    pub fn with_environment(mut self, environment_id: impl Into<EnvironmentId>) -> Self {
        self.environment_id = Some(environment_id.into());
        self
    }

    /// Enabled header rows, in order
    pub fn enabled_headers(&self) -> impl Iterator<Item = &HeaderParam> {
        self.headers.iter().filter(|h| h.enabled)
    }

    /// Enabled query rows, in order
    pub fn enabled_params(&self) -> impl Iterator<Item = &QueryParam> {
        self.params.iter().filter(|p| p.enabled)
    }
}

/// Workspace metadata the builder needs from storage
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    /// Workspace identifier
    pub workspace_id: WorkspaceId,
    /// Method names valid in this workspace; empty accepts any method
    #[serde(default)]
    pub methods: Vec<HttpMethod>,
}

impl Project {
    /// A project accepting the standard methods
    #[must_use]
    pub fn new(workspace_id: impl Into<WorkspaceId>) -> Self {
        Self {
            workspace_id: workspace_id.into(),
            methods: ["GET", "POST", "PUT", "PATCH", "DELETE", "HEAD", "OPTIONS"]
                .into_iter()
                .map(HttpMethod::new)
                .collect(),
        }
    }

    /// Whether the project accepts the given method
    #[must_use]
    pub fn allows(&self, method: &HttpMethod) -> bool {
        self.methods.is_empty() || self.methods.iter().any(|m| m == method)
    }
}
