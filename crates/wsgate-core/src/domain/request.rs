//! The parsed HTTP request that asked for a protocol upgrade.
//!
//! Header names are stored lowercased so lookups are case-insensitive, which
//! is what HTTP/1.1 requires for `Upgrade` and `Sec-WebSocket-Version`.

use std::collections::HashMap;

/// An HTTP upgrade request as seen by the admission core.
///
/// The transport builds one of these per incoming request.  Any bytes it
/// already read past the end of the request head travel along in
/// [`head`](Self::head) so the chosen protocol implementation can consume
/// them before reading from the socket again.
///
/// # Example
///
/// ```rust
/// use wsgate_core::UpgradeRequest;
///
/// let req = UpgradeRequest::new("GET", "/chat?room=1")
///     .with_header("Upgrade", "websocket")
///     .with_header("Sec-WebSocket-Version", "13");
///
/// assert_eq!(req.header("upgrade"), Some("websocket"));
/// assert_eq!(req.path(), "/chat");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpgradeRequest {
    method: String,
    url: String,
    /// Lowercased header name → value.
    headers: HashMap<String, String>,
    head: Vec<u8>,
}

impl UpgradeRequest {
    /// Creates a request with no headers and an empty head.
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            headers: HashMap::new(),
            head: Vec::new(),
        }
    }

    /// Adds a header, replacing any previous value for the same name.
    pub fn with_header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.insert_header(name, value);
        self
    }

    /// Inserts a header in place.  Names are compared case-insensitively.
    pub fn insert_header(&mut self, name: impl AsRef<str>, value: impl Into<String>) {
        self.headers
            .insert(name.as_ref().to_ascii_lowercase(), value.into());
    }

    /// The request method, e.g. `"GET"`.
    pub fn method(&self) -> &str {
        &self.method
    }

    /// The raw request target as it appeared on the request line.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Looks up a header value by name (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Iterates over all headers as `(lowercased name, value)` pairs.
    pub fn headers(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Bytes already consumed from the socket after the request head.
    pub fn head(&self) -> &[u8] {
        &self.head
    }

    /// Attaches the initial data fragment read before the upgrade decision.
    pub fn set_head(&mut self, head: Vec<u8>) {
        self.head = head;
    }

    /// Removes and returns the initial data fragment.
    pub fn take_head(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.head)
    }

    /// Returns the path component of the request target.
    ///
    /// Accepts both origin-form (`/chat?x=1`) and absolute-form
    /// (`http://host/chat`) targets.  The query string and fragment are
    /// dropped.  An absolute-form target without a path yields `"/"`.
    pub fn path(&self) -> &str {
        request_path(&self.url)
    }
}

/// Extracts the path component from a request target.
///
/// A target is absolute-form only when it does not start with `/` and its
/// `://` comes before any `/`, `?` or `#`.  Everything else is origin-form,
/// so a URL inside the query string never changes the path.
pub fn request_path(target: &str) -> &str {
    let (rest, absolute) = match absolute_form_remainder(target) {
        Some(after_authority) => (after_authority, true),
        None => (target, false),
    };

    let end = rest.find(|c: char| c == '?' || c == '#').unwrap_or(rest.len());
    let path = &rest[..end];

    if path.is_empty() && absolute {
        "/"
    } else {
        path
    }
}

/// For `scheme://authority/rest`, returns `/rest` (possibly empty).
fn absolute_form_remainder(target: &str) -> Option<&str> {
    if target.starts_with('/') {
        return None;
    }
    let delimiter = target
        .find(|c: char| c == '/' || c == '?' || c == '#')
        .unwrap_or(target.len());
    let scheme_end = target.find("://").filter(|&pos| pos < delimiter)?;

    let after_scheme = &target[scheme_end + 3..];
    let authority_end = after_scheme
        .find(|c: char| c == '/' || c == '?' || c == '#')
        .unwrap_or(after_scheme.len());
    Some(&after_scheme[authority_end..])
}
