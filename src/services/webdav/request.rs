use reqwest::header::{HeaderValue, CONTENT_LENGTH};
use reqwest::{Method, Response, StatusCode};
use tracing::debug;

use super::auth::Verdict;
use super::client::WebDavClient;
use super::common::PROPFIND_TEMPLATE;
use super::error::{DavError, Result};
use super::transport::{DavRequest, RequestBody, ResponseHead};
use super::xml::{parse_multistatus, MultiStatusResponse};

/// Authorize/verify round trips allowed for one logical request
pub const MAX_ROUND_TRIPS: usize = 10;

pub(crate) fn dav_method(name: &'static str) -> Result<Method> {
    Method::from_bytes(name.as_bytes()).map_err(|_| DavError::Config(format!("invalid method {name}")))
}

impl WebDavClient {
    /// Runs one logical request through the authenticate/verify loop and
    /// returns the first response the authenticator accepts. `intercept`
    /// customizes each attempt after authorization.
    pub(crate) async fn req<F>(&self, method: Method, path: &str, body: RequestBody, intercept: F) -> Result<Response>
    where
        F: Fn(&mut DavRequest),
    {
        let url = self.resource_url(path)?;
        let (mut auth, mut body) = self.authorizer.new_authenticator(body);

        for attempt in 1..=MAX_ROUND_TRIPS {
            if self.transport.is_cancelled() {
                return Err(DavError::Cancelled);
            }

            let mut rq = DavRequest::new(method.clone(), url.clone());
            for (name, value) in &self.headers {
                rq.headers.append(name.clone(), value.clone());
            }
            auth.authorize(&mut rq, path)?;
            intercept(&mut rq);

            let inhibit = rq.inhibit_redirect;
            let rs = self.transport.execute(rq, body.open().await?).await?;
            let head = ResponseHead::of(&rs);
            debug!(
                "📡 {} {} -> {} (auth: {}, attempt {}, redirects {})",
                method,
                url,
                head.status.as_u16(),
                auth.current().name(),
                attempt,
                if inhibit { "inhibited" } else { "followed" }
            );

            match auth.verify(&self.transport, &head, path).await? {
                Verdict::Done => return Ok(rs),
                Verdict::Redo => drop(rs),
            }
        }

        Err(DavError::RetryLimit(MAX_ROUND_TRIPS))
    }

    /// PROPFIND with depth 0 (`self_only`) or 1; each `<response>` record
    /// is handed to `on_response` as it is decoded.
    pub(crate) async fn propfind<F>(&self, path: &str, self_only: bool, on_response: F) -> Result<()>
    where
        F: FnMut(MultiStatusResponse) -> Result<()>,
    {
        let depth = if self_only { "0" } else { "1" };
        let rs = self
            .req(dav_method("PROPFIND")?, path, RequestBody::from(PROPFIND_TEMPLATE), |rq| {
                rq.set_static_header("depth", depth);
                rq.set_static_header("content-type", "application/xml;charset=UTF-8");
                rq.set_static_header("accept", "application/xml,text/xml");
                rq.set_static_header("accept-charset", "utf-8");
            })
            .await?;

        if rs.status() != StatusCode::MULTI_STATUS {
            return Err(DavError::status("PROPFIND", path, rs.status().as_u16()));
        }

        let body = rs.bytes().await?;
        parse_multistatus(&body, on_response)
    }

    /// PUT with an explicit Content-Length; returns the final status
    pub(crate) async fn put(&self, path: &str, body: RequestBody) -> Result<StatusCode> {
        let length = body.content_length();
        let rs = self
            .req(Method::PUT, path, body, |rq| {
                if let Some(length) = length {
                    rq.headers.insert(CONTENT_LENGTH, HeaderValue::from(length));
                }
            })
            .await?;
        Ok(rs.status())
    }
}
