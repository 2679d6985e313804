use crate::campaign_api::types::ClientError;
use serde_json::Value;
use std::fmt;

/// HTTP methods used against the API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Patch,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }

    /// Whether the method changes backend state
    pub fn is_mutating(&self) -> bool {
        !matches!(self, Method::Get)
    }

    fn to_reqwest(self) -> reqwest::Method {
        match self {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Patch => reqwest::Method::PATCH,
            Method::Delete => reqwest::Method::DELETE,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request body
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    /// `application/x-www-form-urlencoded`
    Form(Vec<(String, String)>),
    /// `application/json`
    Json(Value),
}

/// A single HTTP call
///
/// `url` may be absolute, or relative to `base_uri` when one is set.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub url: String,
    pub body: Option<RequestBody>,
    pub headers: Vec<(String, String)>,
    pub base_uri: Option<String>,
}

impl Request {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            body: None,
            headers: Vec::new(),
            base_uri: None,
        }
    }

    pub fn with_body(mut self, body: RequestBody) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_base_uri(mut self, base_uri: impl Into<String>) -> Self {
        self.base_uri = Some(base_uri.into());
        self
    }

    /// Absolute URL of this request
    pub fn full_url(&self) -> String {
        if is_absolute(&self.url) {
            return self.url.clone();
        }
        match &self.base_uri {
            Some(base) => format!(
                "{}/{}",
                base.trim_end_matches('/'),
                self.url.trim_start_matches('/')
            ),
            None => self.url.clone(),
        }
    }

    /// Wire-like rendering of the request for diagnostics
    ///
    /// Header values whose name is `Authorization` or `X-Api-Key` are masked,
    /// as are the `client_secret` and `jwt_token` form fields.
    pub fn raw(&self) -> String {
        let mut raw = format!("{} {}\n", self.method, self.full_url());
        for (name, value) in &self.headers {
            let shown = if is_sensitive(name) { "***" } else { value.as_str() };
            raw.push_str(&format!("{}: {}\n", name, shown));
        }
        raw.push('\n');
        match &self.body {
            Some(RequestBody::Json(value)) => raw.push_str(&value.to_string()),
            Some(RequestBody::Form(fields)) => {
                let rendered: Vec<String> = fields
                    .iter()
                    .map(|(k, v)| {
                        let shown = if is_sensitive(k) { "***" } else { v.as_str() };
                        format!("{}={}", k, shown)
                    })
                    .collect();
                raw.push_str(&rendered.join("&"));
            }
            None => {}
        }
        raw
    }
}

fn is_sensitive(name: &str) -> bool {
    matches!(
        name.to_ascii_lowercase().as_str(),
        "authorization" | "x-api-key" | "client_secret" | "jwt_token"
    )
}

/// Whether `url` carries its own scheme
pub fn is_absolute(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

/// Response of a single HTTP call
#[derive(Debug, Clone, PartialEq)]
pub struct RawResponse {
    pub status: u16,
    pub reason: String,
    pub body: String,
}

impl RawResponse {
    /// Decode the body as JSON, falling back to `{code, message}`
    pub fn decode(&self) -> Value {
        serde_json::from_str(&self.body).unwrap_or_else(|_| {
            serde_json::json!({
                "code": self.status,
                "message": self.reason,
            })
        })
    }
}

/// Single-shot HTTP transport
///
/// One call in, one response out. No retries, no pooling policy beyond the
/// `reqwest` defaults.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    capture: bool,
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpTransport {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            capture: false,
        }
    }

    /// Log the raw rendering of every request at debug level
    pub fn with_capture(mut self, capture: bool) -> Self {
        self.capture = capture;
        self
    }

    /// Send one request
    pub async fn send(&self, request: &Request) -> Result<RawResponse, ClientError> {
        let url = request.full_url();
        tracing::debug!("{} {}", request.method, url);
        if self.capture {
            tracing::debug!("Raw request:\n{}", request.raw());
        }

        let mut builder = self.client.request(request.method.to_reqwest(), &url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        builder = match &request.body {
            Some(RequestBody::Form(fields)) => builder.form(fields),
            Some(RequestBody::Json(value)) => builder.json(value),
            None => builder,
        };

        let response = builder.send().await.map_err(|e| {
            tracing::error!("{} {} failed: {}", request.method, url, e);
            ClientError::from(e)
        })?;

        let status = response.status();
        let reason = status.canonical_reason().unwrap_or("Unknown").to_string();
        let body = response.text().await.map_err(|e| {
            tracing::error!("Failed to read response body from {}: {}", url, e);
            ClientError::from(e)
        })?;

        tracing::debug!("Received HTTP {} from {}", status.as_u16(), url);

        Ok(RawResponse {
            status: status.as_u16(),
            reason,
            body,
        })
    }
}
