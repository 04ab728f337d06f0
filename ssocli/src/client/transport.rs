use async_trait::async_trait;
use hyper::header::{HeaderName, HeaderValue, LOCATION, SET_COOKIE};
use hyper::{Body, Client, Method, Request};
use hyper_tls::HttpsConnector;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, instrument, trace};
use url::Url;

use super::cookies::CookieJar;
use super::error::{SsoError, SsoResult};

/// One outgoing request. The whole jar travels with it; only cookies scoped to `url` are sent.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub cookies: CookieJar,
    pub body: Option<String>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>, cookies: CookieJar) -> Self {
        Self {
            method: Method::GET,
            url: url.into(),
            headers: Vec::new(),
            cookies,
            body: None,
        }
    }

    pub fn post(url: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            method: Method::POST,
            url: url.into(),
            headers: Vec::new(),
            cookies: CookieJar::new(),
            body: Some(body.into()),
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn headers(mut self, headers: &[(String, String)]) -> Self {
        self.headers.extend_from_slice(headers);
        self
    }
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl HttpResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn set_cookies(&self) -> impl Iterator<Item = &str> {
        self.headers
            .iter()
            .filter(|(n, _)| n.eq_ignore_ascii_case(SET_COOKIE.as_str()))
            .map(|(_, v)| v.as_str())
    }

    pub fn redirect_location(&self) -> Option<&str> {
        if (300..400).contains(&self.status) {
            self.header(LOCATION.as_str())
        } else {
            None
        }
    }
}

/// Sends single HTTP requests. Redirects are not followed here.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> SsoResult<HttpResponse>;
}

/// Default transport over hyper with a per-request timeout
#[derive(Clone)]
pub struct HyperTransport {
    http_client: Client<HttpsConnector<hyper::client::HttpConnector>>,
    timeout: Duration,
}

impl HyperTransport {
    pub fn new(timeout: Duration) -> Self {
        let https = HttpsConnector::new();
        let http_client = Client::builder().build::<_, Body>(https);
        Self {
            http_client,
            timeout,
        }
    }

    fn build(request: HttpRequest) -> SsoResult<Request<Body>> {
        let url = Url::parse(&request.url)
            .map_err(|e| SsoError::transport(format!("invalid URL {}: {}", request.url, e)))?;
        let mut builder = Request::builder()
            .method(request.method)
            .uri(request.url.as_str());

        for (name, value) in &request.headers {
            let name = HeaderName::from_str(name)
                .map_err(|e| SsoError::transport(format!("invalid header {}: {}", name, e)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| SsoError::transport(format!("invalid value for {}: {}", name, e)))?;
            builder = builder.header(name, value);
        }
        if let Some(cookie) = request.cookies.header_for(&url) {
            builder = builder.header(hyper::header::COOKIE, cookie);
        }

        let body = match request.body {
            Some(body) => Body::from(body),
            None => Body::empty(),
        };
        Ok(builder.body(body)?)
    }
}

#[async_trait]
impl HttpTransport for HyperTransport {
    #[instrument(skip_all, fields(method = %request.method))]
    async fn send(&self, request: HttpRequest) -> SsoResult<HttpResponse> {
        let url = request.url.clone();
        let request = Self::build(request)?;

        let exchange = async {
            let response = self.http_client.request(request).await?;
            let status = response.status().as_u16();

            // Keep duplicates, a login response sets several cookies
            let mut headers: Vec<(String, String)> = Vec::new();
            for (name, value) in response.headers().iter() {
                if let Ok(value_str) = value.to_str() {
                    headers.push((name.to_string(), value_str.to_string()));
                }
            }

            let body_bytes = hyper::body::to_bytes(response.into_body()).await?;
            Ok::<_, SsoError>(HttpResponse {
                status,
                headers,
                body: String::from_utf8_lossy(&body_bytes).into_owned(),
            })
        };

        let response = tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| {
                SsoError::transport(format!("request to {} timed out after {:?}", url, self.timeout))
            })??;

        debug!("Received status {} from {}", response.status, url);
        trace!("Response body: {}", response.body);
        Ok(response)
    }
}
