use futures::future::BoxFuture;
use reqwest::Method;
use serde_json::Value as JsonValue;
use url::Url;

use crate::types::diagnostics::Diagnostic;

/// One fully rendered data source call: the engine renders URL and body from
/// templates, the transport owns everything else (auth, retries, base URLs).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransportRequest {
    pub url: String,
    pub method: Method,
    pub body: Option<JsonValue>,
}

impl TransportRequest {
    pub fn get(url: &str) -> TransportRequest {
        TransportRequest { url: url.to_string(), method: Method::GET, body: None }
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn with_body(mut self, body: JsonValue) -> Self {
        self.body = Some(body);
        self
    }

    pub fn writes_body(&self) -> bool {
        matches!(self.method, Method::POST | Method::PUT | Method::PATCH)
    }
}

/// Host-facing seam for remote data source calls. The engine only renders
/// requests and parses responses; credentials never cross this boundary.
pub trait DataSourceTransport: Send + Sync {
    fn execute(&self, request: TransportRequest) -> BoxFuture<'_, Result<JsonValue, Diagnostic>>;
}

/// Cache key for a data source response: the request URL with the
/// `api-version` query parameter stripped, since two calls differing only by
/// api-version are considered the same lookup. Unparseable URLs key as-is.
pub fn response_cache_key(url: &str) -> String {
    let Ok(mut parsed) = Url::parse(url) else {
        return url.to_string();
    };
    let retained: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(name, _)| !name.eq_ignore_ascii_case("api-version"))
        .map(|(name, value)| (name.into_owned(), value.into_owned()))
        .collect();
    if retained.is_empty() {
        parsed.set_query(None);
    } else {
        parsed.query_pairs_mut().clear().extend_pairs(retained);
    }
    parsed.to_string()
}

/// Default [DataSourceTransport] over a plain `reqwest` client. Hosts that
/// need authenticated calls wrap or replace it.
#[derive(Clone, Debug, Default)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> HttpTransport {
        HttpTransport { client: reqwest::Client::new() }
    }
}

impl DataSourceTransport for HttpTransport {
    fn execute(&self, request: TransportRequest) -> BoxFuture<'_, Result<JsonValue, Diagnostic>> {
        let client = self.client.clone();
        Box::pin(async move {
            let mut req_builder = client.request(request.method.clone(), &request.url);
            if let Some(body) = &request.body {
                req_builder = req_builder.json(body);
            }
            let res = req_builder.send().await.map_err(|e| {
                Diagnostic::error_from_string(format!("unable to send http request - {e}"))
            })?;
            let status = res.status();
            if !status.is_success() {
                return Err(Diagnostic::error_from_string(format!(
                    "http request to {} failed with status {}",
                    request.url, status
                )));
            }
            res.json::<JsonValue>().await.map_err(|e| {
                Diagnostic::error_from_string(format!("failed to parse response as json: {e}"))
            })
        })
    }
}
