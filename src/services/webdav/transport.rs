use std::io::SeekFrom;
use std::time::Duration;

use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, LOCATION, WWW_AUTHENTICATE};
use reqwest::redirect::{Attempt, Policy};
use reqwest::{Client, ClientBuilder, Method, StatusCode, Url};
use tokio::io::AsyncSeekExt;
use tokio_util::io::ReaderStream;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::common::build_user_agent;
use super::error::{DavError, Result};

/// Redirect hops the transport follows on its own before giving up
pub const MAX_REDIRECTS: usize = 10;

#[derive(Debug, Clone)]
pub struct TransportOptions {
    /// Deadline of a metadata request; for body transfers, the longest
    /// the connection may stay idle
    pub timeout: Duration,
    pub connect_timeout: Duration,
    pub accept_invalid_certs: bool,
    pub user_agent: String,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            accept_invalid_certs: false,
            user_agent: build_user_agent(),
        }
    }
}

/// HTTP plumbing shared by every request of a client.
///
/// Holds two clients over the same settings: one follows redirects (up to
/// [`MAX_REDIRECTS`]) and one never does. A request whose
/// `inhibit_redirect` flag is set always goes through the second, so the
/// authentication layer gets to see the redirect response itself.
///
/// `GET` and `PUT` move whole files, so they are only bounded by the idle
/// read timeout. Every other verb must also finish within `timeout`.
#[derive(Clone)]
pub struct Transport {
    follow: Client,
    inhibit: Client,
    timeout: Duration,
    cancel: CancellationToken,
}

impl Transport {
    pub fn new(options: &TransportOptions) -> Result<Self> {
        let follow = Self::builder(options)
            .redirect(Policy::custom(limit_redirects))
            .build()?;
        let inhibit = Self::builder(options).redirect(Policy::none()).build()?;

        Ok(Self {
            follow,
            inhibit,
            timeout: options.timeout,
            cancel: CancellationToken::new(),
        })
    }

    fn builder(options: &TransportOptions) -> ClientBuilder {
        Client::builder()
            .read_timeout(options.timeout)
            .connect_timeout(options.connect_timeout)
            .user_agent(options.user_agent.clone())
            .danger_accept_invalid_certs(options.accept_invalid_certs)
    }

    /// Same connection pools, different cancellation token
    pub fn with_cancellation(&self, cancel: CancellationToken) -> Self {
        Self {
            follow: self.follow.clone(),
            inhibit: self.inhibit.clone(),
            timeout: self.timeout,
            cancel,
        }
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Sends one request and waits for the response head, racing the
    /// cancellation token.
    pub async fn execute(&self, rq: DavRequest, body: Option<reqwest::Body>) -> Result<reqwest::Response> {
        let client = if rq.inhibit_redirect { &self.inhibit } else { &self.follow };

        let bounded = has_deadline(&rq.method);
        let mut builder = client.request(rq.method, rq.url).headers(rq.headers);
        if bounded {
            builder = builder.timeout(self.timeout);
        }
        if let Some(body) = body {
            builder = builder.body(body);
        }

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(DavError::Cancelled),
            result = builder.send() => result.map_err(from_reqwest),
        }
    }

    /// Plain GET that follows redirects, used by out-of-band handshakes
    pub async fn get(&self, url: Url, headers: HeaderMap) -> Result<reqwest::Response> {
        let mut rq = DavRequest::new(Method::GET, url);
        rq.headers = headers;
        self.execute(rq, None).await
    }
}

/// Whether a request must complete within the total deadline. File
/// transfers may run as long as data keeps flowing.
pub fn has_deadline(method: &Method) -> bool {
    *method != Method::GET && *method != Method::PUT
}

fn limit_redirects(attempt: Attempt<'_>) -> reqwest::redirect::Action {
    if attempt.previous().len() >= MAX_REDIRECTS {
        attempt.error("stopped after 10 redirects")
    } else {
        attempt.follow()
    }
}

fn from_reqwest(err: reqwest::Error) -> DavError {
    if err.is_redirect() {
        DavError::TooManyRedirects
    } else {
        DavError::Http(err)
    }
}

/// A request under construction: authenticators and call sites edit the
/// headers and the redirect flag before the transport sends it.
#[derive(Debug, Clone)]
pub struct DavRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub inhibit_redirect: bool,
}

impl DavRequest {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            inhibit_redirect: false,
        }
    }

    pub fn set_header(&mut self, name: HeaderName, value: &str) -> Result<()> {
        self.headers.insert(name, HeaderValue::from_str(value)?);
        Ok(())
    }

    pub fn set_static_header(&mut self, name: &'static str, value: &'static str) {
        self.headers
            .insert(HeaderName::from_static(name), HeaderValue::from_static(value));
    }
}

/// Status, headers and final URL of a response, detached from its body
#[derive(Debug, Clone)]
pub struct ResponseHead {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub url: Url,
}

impl ResponseHead {
    pub fn new(status: StatusCode, url: Url) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            url,
        }
    }

    pub fn of(rs: &reqwest::Response) -> Self {
        Self {
            status: rs.status(),
            headers: rs.headers().clone(),
            url: rs.url().clone(),
        }
    }

    /// First value of `name`, if it is present and readable as text
    pub fn header(&self, name: impl reqwest::header::AsHeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn location(&self) -> Option<&str> {
        self.header(LOCATION)
    }

    /// Whether a non-empty `WWW-Authenticate` header is present
    pub fn has_challenge(&self) -> bool {
        self.header(WWW_AUTHENTICATE).is_some_and(|v| !v.is_empty())
    }

    /// Every `WWW-Authenticate` value, in header order
    pub fn challenges(&self) -> Vec<String> {
        self.headers
            .get_all(WWW_AUTHENTICATE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Copy of this head where `WWW-Authenticate` holds only `challenge`
    pub fn with_challenge(&self, challenge: &str) -> Self {
        let mut head = self.clone();
        head.headers.remove(WWW_AUTHENTICATE);
        if let Ok(value) = HeaderValue::from_str(challenge) {
            head.headers.insert(WWW_AUTHENTICATE, value);
        }
        head
    }
}

/// Payload of a request
#[derive(Debug)]
pub enum RequestBody {
    Empty,
    Bytes(Bytes),
    /// A seekable file and its length; rewound before every send
    File { file: tokio::fs::File, len: u64 },
}

impl RequestBody {
    pub fn content_length(&self) -> Option<u64> {
        match self {
            RequestBody::Empty => None,
            RequestBody::Bytes(bytes) => Some(bytes.len() as u64),
            RequestBody::File { len, .. } => Some(*len),
        }
    }
}

impl From<&'static str> for RequestBody {
    fn from(value: &'static str) -> Self {
        RequestBody::Bytes(Bytes::from_static(value.as_bytes()))
    }
}

impl From<Bytes> for RequestBody {
    fn from(value: Bytes) -> Self {
        RequestBody::Bytes(value)
    }
}

impl From<Vec<u8>> for RequestBody {
    fn from(value: Vec<u8>) -> Self {
        RequestBody::Bytes(Bytes::from(value))
    }
}

/// Hands out a fresh copy of the request body for every attempt of the
/// retry loop.
#[derive(Debug)]
pub struct ReplayBody {
    body: RequestBody,
    sends: usize,
}

impl ReplayBody {
    pub fn new(body: RequestBody) -> Self {
        Self { body, sends: 0 }
    }

    pub async fn open(&mut self) -> Result<Option<reqwest::Body>> {
        self.sends += 1;
        match &mut self.body {
            RequestBody::Empty => Ok(None),
            RequestBody::Bytes(bytes) => Ok(Some(reqwest::Body::from(bytes.clone()))),
            RequestBody::File { file, len } => {
                file.seek(SeekFrom::Start(0)).await?;
                if self.sends > 1 {
                    debug!("Replaying {} byte file body (send #{})", len, self.sends);
                }
                let handle = file.try_clone().await?;
                Ok(Some(reqwest::Body::wrap_stream(ReaderStream::new(handle))))
            }
        }
    }
}
