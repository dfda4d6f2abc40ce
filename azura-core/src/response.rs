// Outbound response with caching and download helpers

use crate::error::{Error, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub const CACHE_ONE_MINUTE: u64 = 60;
pub const CACHE_ONE_HOUR: u64 = 3600;
pub const CACHE_ONE_DAY: u64 = 86400;
pub const CACHE_ONE_MONTH: u64 = 2_592_000;
pub const CACHE_ONE_YEAR: u64 = 31_536_000;

const DEFAULT_CONTENT_TYPE: &str = "text/html; charset=UTF-8";

/// 9999-12-31T23:59:59Z, the latest instant an HTTP date can express.
const MAX_HTTP_DATE_SECS: u64 = 253_402_300_799;

/// Response payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body {
    Bytes(Vec<u8>),
    /// Streamed from disk by the server.
    File(PathBuf),
}

impl Default for Body {
    fn default() -> Self {
        Body::Bytes(Vec::new())
    }
}

/// HTTP response.
///
/// Header names keep the case they were set with; lookups are
/// case-insensitive.
#[derive(Debug, Clone)]
pub struct Response {
    status: u16,
    headers: Vec<(String, String)>,
    body: Body,
    version: String,
}

impl Default for Response {
    fn default() -> Self {
        Self {
            status: 200,
            headers: vec![("Content-Type".to_string(), DEFAULT_CONTENT_TYPE.to_string())],
            body: Body::default(),
            version: "1.1".to_string(),
        }
    }
}

impl Response {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    pub fn html(body: impl Into<String>) -> Self {
        Self::new().write(body.into())
    }

    pub fn text(body: impl Into<String>) -> Self {
        Self::new()
            .with_header("Content-Type", "text/plain; charset=UTF-8")
            .write(body.into())
    }

    pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<Self> {
        let body = serde_json::to_vec(value)?;
        Ok(Self::new()
            .with_header("Content-Type", "application/json")
            .with_body(Body::Bytes(body)))
    }

    /// Redirect; `status` is usually 301 or 302.
    pub fn redirect(location: &str, status: u16) -> Self {
        Self::new()
            .with_status(status)
            .with_header("Location", location)
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Set a header, replacing any existing values.
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        self.headers.push((name.to_string(), value.into()));
        self
    }

    /// Append a header value, keeping existing ones (for `Set-Cookie`).
    pub fn with_added_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    pub fn without_header(mut self, name: &str) -> Self {
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        self
    }

    pub fn with_body(mut self, body: Body) -> Self {
        self.body = body;
        self
    }

    /// Append to an in-memory body; replaces a file body.
    pub fn write(mut self, data: impl AsRef<[u8]>) -> Self {
        match &mut self.body {
            Body::Bytes(bytes) => bytes.extend_from_slice(data.as_ref()),
            Body::File(_) => self.body = Body::Bytes(data.as_ref().to_vec()),
        }
        self
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// First value of a header.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn header_values(&self, name: &str) -> Vec<&str> {
        self.headers
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
            .collect()
    }

    pub fn has_header(&self, name: &str) -> bool {
        self.header(name).is_some()
    }

    pub fn body(&self) -> &Body {
        &self.body
    }

    /// In-memory body bytes; empty for file bodies.
    pub fn body_bytes(&self) -> &[u8] {
        match &self.body {
            Body::Bytes(bytes) => bytes,
            Body::File(_) => &[],
        }
    }

    pub fn body_string(&self) -> String {
        String::from_utf8_lossy(self.body_bytes()).into_owned()
    }

    pub fn is_redirect(&self) -> bool {
        matches!(self.status, 301 | 302 | 303 | 307 | 308)
    }

    /// Headers that stop browsers and proxies from caching.
    pub fn with_no_cache(self) -> Self {
        self.with_header("Pragma", "no-cache")
            .with_header("Expires", httpdate::fmt_http_date(UNIX_EPOCH))
            .with_header("Cache-Control", "private, no-cache, no-store")
            .with_header("X-Accel-Expires", "0")
    }

    /// Headers allowing public caching for one month.
    pub fn with_default_cache_lifetime(self) -> Self {
        self.with_cache_lifetime(CACHE_ONE_MONTH)
    }

    /// Headers allowing public caching for `seconds`. `Expires` is clamped to
    /// the last representable HTTP date.
    pub fn with_cache_lifetime(self, seconds: u64) -> Self {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        let expires = UNIX_EPOCH
            + Duration::from_secs(now.saturating_add(seconds).min(MAX_HTTP_DATE_SECS));
        self.with_header("Pragma", "")
            .with_header("Expires", httpdate::fmt_http_date(expires))
            .with_header(
                "Cache-Control",
                format!("public, must-revalidate, max-age={}", seconds),
            )
            .with_header("X-Accel-Expires", seconds.to_string())
    }

    /// Whether the cache headers allow caching.
    pub fn has_cache_lifetime(&self) -> bool {
        if let Some(pragma) = self.header("Pragma") {
            return !pragma.contains("no-cache");
        }
        self.header("Cache-Control")
            .is_some_and(|control| !control.contains("no-cache"))
    }

    /// Serve a file from disk as a download, named after the file unless
    /// `file_name` is given.
    pub fn render_file(self, path: impl AsRef<Path>, file_name: Option<&str>) -> Result<Self> {
        let path = path.as_ref();
        let metadata = std::fs::metadata(path)?;
        if !metadata.is_file() {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} is not a file", path.display()),
            )));
        }
        let mime = mime_guess::from_path(path).first_or_octet_stream();
        let file_name = match file_name {
            Some(name) => name.to_string(),
            None => path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default(),
        };

        Ok(self
            .download_headers(mime.essence_str(), &file_name)
            .with_header("Content-Length", metadata.len().to_string())
            .with_body(Body::File(path.to_path_buf())))
    }

    /// Serve in-memory data as a download.
    pub fn render_string_as_file(
        self,
        data: impl Into<Vec<u8>>,
        content_type: &str,
        file_name: Option<&str>,
    ) -> Self {
        let data = data.into();
        let response = self
            .with_header("Pragma", "public")
            .with_header("Expires", "0")
            .with_header("Cache-Control", "must-revalidate, post-check=0, pre-check=0")
            .with_header("Content-Type", content_type)
            .with_header("Content-Length", data.len().to_string());

        let response = match file_name {
            Some(name) => {
                response.with_header("Content-Disposition", format!("attachment; filename={}", name))
            }
            None => response,
        };
        response.with_body(Body::Bytes(data))
    }

    fn download_headers(self, content_type: &str, file_name: &str) -> Self {
        self.with_header("Pragma", "public")
            .with_header("Expires", "0")
            .with_header("Cache-Control", "must-revalidate, post-check=0, pre-check=0")
            .with_header("Content-Type", content_type)
            .with_header(
                "Content-Disposition",
                format!("attachment; filename={}", file_name),
            )
    }
}
