use std::fmt;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, COOKIE, SET_COOKIE, WWW_AUTHENTICATE};
use reqwest::{StatusCode, Url};
use tracing::debug;

use crate::services::webdav::common::query_escape;
use crate::services::webdav::error::{DavError, Result};
use crate::services::webdav::transport::{DavRequest, ResponseHead, Transport};

use super::Verdict;

const AUTHENTICATION_INFO: HeaderName = HeaderName::from_static("authentication-info");

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassportCookie {
    pub name: String,
    pub value: String,
}

/// Microsoft Passport1.4 (OneDrive-style) cookie authentication.
///
/// Construction performs the sign-in handshake against the login server
/// named by the challenge's `Location`. Requests then carry the session
/// cookies; a redirect that repeats the challenge refreshes them.
pub struct PassportAuth {
    user: String,
    password: String,
    cookies: Vec<PassportCookie>,
    inhibit_redirect: bool,
}

impl Clone for PassportAuth {
    fn clone(&self) -> Self {
        Self {
            user: self.user.clone(),
            password: self.password.clone(),
            cookies: self.cookies.clone(),
            inhibit_redirect: true,
        }
    }
}

impl fmt::Debug for PassportAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PassportAuth")
            .field("user", &self.user)
            .field("cookies", &self.cookies.len())
            .field("inhibit_redirect", &self.inhibit_redirect)
            .finish_non_exhaustive()
    }
}

impl PassportAuth {
    pub async fn new(
        transport: &Transport,
        user: impl Into<String>,
        password: impl Into<String>,
        partner_url: &str,
        challenge: &ResponseHead,
    ) -> Result<Self> {
        let mut auth = Self::with_cookies(user, password, Vec::new());
        auth.gen_cookies(transport, partner_url, challenge).await?;
        Ok(auth)
    }

    pub fn with_cookies(user: impl Into<String>, password: impl Into<String>, cookies: Vec<PassportCookie>) -> Self {
        Self {
            user: user.into(),
            password: password.into(),
            cookies,
            inhibit_redirect: true,
        }
    }

    pub fn cookies(&self) -> &[PassportCookie] {
        &self.cookies
    }

    /// Redirects are suppressed on every request except the one right
    /// after a challenge-free redirect, which is allowed to follow it.
    pub fn authorize(&mut self, rq: &mut DavRequest) -> Result<()> {
        if self.inhibit_redirect {
            rq.inhibit_redirect = true;
        } else {
            self.inhibit_redirect = true;
        }

        if self.cookies.is_empty() {
            return Ok(());
        }

        let mut cookie = self
            .cookies
            .iter()
            .map(|c| format!("{}={}", c.name, c.value))
            .collect::<Vec<_>>()
            .join("; ");
        if let Some(existing) = rq.headers.get(COOKIE).and_then(|v| v.to_str().ok()) {
            cookie = format!("{}; {}", existing, cookie);
        }
        rq.set_header(COOKIE, &cookie)
    }

    pub async fn verify(&mut self, transport: &Transport, rs: &ResponseHead, path: &str) -> Result<Verdict> {
        match rs.status {
            StatusCode::MOVED_PERMANENTLY
            | StatusCode::FOUND
            | StatusCode::TEMPORARY_REDIRECT
            | StatusCode::PERMANENT_REDIRECT => {
                if rs.has_challenge() {
                    debug!("🔄 Passport challenge repeated for {}, refreshing cookies", path);
                    self.gen_cookies(transport, rs.url.as_str(), rs).await?;
                } else {
                    self.inhibit_redirect = false;
                }
                Ok(Verdict::Redo)
            }
            StatusCode::UNAUTHORIZED => Err(DavError::status("Authorize", path, rs.status.as_u16())),
            _ => Ok(Verdict::Done),
        }
    }

    async fn gen_cookies(&mut self, transport: &Transport, partner_url: &str, challenge: &ResponseHead) -> Result<()> {
        let location = challenge
            .location()
            .ok_or_else(|| DavError::Challenge("passport challenge without Location".to_string()))?;
        let mut auth_server = Url::parse(location)?;
        auth_server.set_path("/login2.srf");
        auth_server.set_query(None);
        auth_server.set_fragment(None);

        let www_authenticate = challenge.header(WWW_AUTHENTICATE).unwrap_or_default();
        let server_challenge = www_authenticate
            .split(' ')
            .nth(1)
            .ok_or_else(|| DavError::Challenge(format!("passport challenge without parameters: {www_authenticate}")))?;

        let sign_in = format!(
            "Passport1.4 sign-in={},pwd={},OrgVerb=GET,OrgUrl={},{}",
            query_escape(&self.user),
            query_escape(&self.password),
            partner_url,
            server_challenge
        );
        debug!("🔐 Passport sign-in at {}", auth_server);
        let rs = transport.get(auth_server, authorization(&sign_in)?).await?;
        if rs.status() != StatusCode::OK {
            return Err(DavError::status("Authorize", "/", rs.status().as_u16()));
        }

        let info = rs
            .headers()
            .get(AUTHENTICATION_INFO)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        let token = info
            .split(',')
            .find(|part| part.starts_with("from-PP='"))
            .ok_or_else(|| DavError::status("Authorize", "/", StatusCode::UNAUTHORIZED.as_u16()))?
            .to_string();

        let partner = Url::parse(partner_url)?;
        let rs = transport
            .get(partner, authorization(&format!("Passport1.4 {}", token))?)
            .await?;
        if rs.status() != StatusCode::OK && rs.status() != StatusCode::FOUND {
            return Err(DavError::status("Authorize", "/", rs.status().as_u16()));
        }

        self.cookies = rs
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .filter_map(parse_set_cookie)
            .collect();
        debug!("🍪 Passport handshake stored {} cookies", self.cookies.len());
        Ok(())
    }
}

fn authorization(value: &str) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.insert(AUTHORIZATION, HeaderValue::from_str(value)?);
    Ok(headers)
}

fn parse_set_cookie(raw: &str) -> Option<PassportCookie> {
    let pair = raw.split(';').next()?;
    let (name, value) = pair.split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Some(PassportCookie {
        name: name.to_string(),
        value: value.trim().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::Method;

    fn url() -> Url {
        Url::parse("https://dav.example.com/docs/").expect("valid url")
    }

    fn signed_in() -> PassportAuth {
        PassportAuth::with_cookies(
            "user@example.com",
            "pw",
            vec![
                PassportCookie { name: "MSPAuth".into(), value: "abc".into() },
                PassportCookie { name: "MSPProf".into(), value: "def".into() },
            ],
        )
    }

    fn transport() -> Transport {
        Transport::new(&Default::default()).expect("transport")
    }

    #[test]
    fn test_parse_set_cookie() {
        assert_eq!(
            parse_set_cookie("MSPAuth=abc; path=/; secure"),
            Some(PassportCookie { name: "MSPAuth".into(), value: "abc".into() })
        );
        assert_eq!(parse_set_cookie("garbage"), None);
    }

    #[test]
    fn test_authorize_attaches_cookies_and_inhibits() {
        let mut auth = signed_in();
        let mut rq = DavRequest::new(Method::GET, url());
        auth.authorize(&mut rq).expect("authorize");
        assert!(rq.inhibit_redirect);
        assert_eq!(
            rq.headers.get(COOKIE).and_then(|v| v.to_str().ok()),
            Some("MSPAuth=abc; MSPProf=def")
        );
    }

    #[test]
    fn test_authorize_keeps_existing_cookies() {
        let mut auth = signed_in();
        let mut rq = DavRequest::new(Method::GET, url());
        rq.set_header(COOKIE, "lang=en").expect("header");
        auth.authorize(&mut rq).expect("authorize");
        assert_eq!(
            rq.headers.get(COOKIE).and_then(|v| v.to_str().ok()),
            Some("lang=en; MSPAuth=abc; MSPProf=def")
        );
    }

    #[tokio::test]
    async fn test_plain_redirect_lets_next_request_follow() {
        let mut auth = signed_in();
        let mut redirect = ResponseHead::new(StatusCode::FOUND, url());
        redirect
            .headers
            .insert(reqwest::header::LOCATION, HeaderValue::from_static("https://dav.example.com/other/"));

        let verdict = auth.verify(&transport(), &redirect, "/docs/").await.expect("verdict");
        assert_eq!(verdict, Verdict::Redo);

        let mut following = DavRequest::new(Method::GET, url());
        auth.authorize(&mut following).expect("authorize");
        assert!(!following.inhibit_redirect);

        let mut after = DavRequest::new(Method::GET, url());
        auth.authorize(&mut after).expect("authorize");
        assert!(after.inhibit_redirect);
    }

    #[tokio::test]
    async fn test_verify_outcomes() {
        let mut auth = signed_in();
        let ok = ResponseHead::new(StatusCode::OK, url());
        assert_eq!(auth.verify(&transport(), &ok, "/").await.expect("verdict"), Verdict::Done);

        let denied = ResponseHead::new(StatusCode::UNAUTHORIZED, url());
        let err = auth.verify(&transport(), &denied, "/docs/").await.expect_err("401 fails");
        assert_eq!(err.status_code(), Some(401));
    }

    #[test]
    fn test_clone_resets_inhibit_flag() {
        let mut auth = signed_in();
        auth.inhibit_redirect = false;
        let copy = auth.clone();
        assert!(copy.inhibit_redirect);
        assert_eq!(copy.cookies(), auth.cookies());
    }
}
