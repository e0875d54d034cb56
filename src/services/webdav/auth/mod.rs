//! Pluggable HTTP authentication for the WebDAV client.
//!
//! An [`Authorizer`] owns the registered schemes and the authenticator
//! currently believed to work for the server. Every request gets an
//! [`AuthShim`] holding a private copy of that authenticator; when the
//! server's answer shows the copy is wrong, the shim asks the authorizer to
//! pick a new one from the response's challenges and the request is sent
//! again.

pub mod basic;
pub mod digest;
pub mod negotiate;
pub mod passport;
pub mod sentinel;

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use tracing::{debug, info, warn};

use super::error::{DavError, Result};
use super::transport::{DavRequest, ReplayBody, RequestBody, ResponseHead, Transport};

pub use basic::BasicAuth;
pub use digest::{DigestAlgorithm, DigestAuth};
pub use negotiate::NegotiatedAuth;
pub use passport::{PassportAuth, PassportCookie};
pub use sentinel::{NoAuth, NullAuth};

/// Outcome of checking a response against the authenticator that signed
/// the request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// The response stands
    Done,
    /// Discard the response and send the request again
    Redo,
}

#[derive(Debug, Clone)]
pub enum Authenticator {
    Null(NullAuth),
    NoAuth(NoAuth),
    Basic(BasicAuth),
    Digest(DigestAuth),
    Passport(PassportAuth),
    Negotiated(NegotiatedAuth),
}

impl Default for Authenticator {
    fn default() -> Self {
        Authenticator::Null(NullAuth)
    }
}

impl Authenticator {
    pub fn name(&self) -> &'static str {
        match self {
            Authenticator::Null(_) => "Null",
            Authenticator::NoAuth(_) => "NoAuth",
            Authenticator::Basic(_) => "Basic",
            Authenticator::Digest(_) => "Digest",
            Authenticator::Passport(_) => "Passport1.4",
            Authenticator::Negotiated(_) => "Negotiated",
        }
    }

    /// Adds credentials (and redirect policy) to an outgoing request
    pub fn authorize(&mut self, rq: &mut DavRequest, path: &str) -> Result<()> {
        match self {
            Authenticator::Null(auth) => {
                auth.authorize(rq);
                Ok(())
            }
            Authenticator::NoAuth(_) => Ok(()),
            Authenticator::Basic(auth) => auth.authorize(rq),
            Authenticator::Digest(auth) => auth.authorize(rq),
            Authenticator::Passport(auth) => auth.authorize(rq),
            Authenticator::Negotiated(auth) => auth.authorize(rq, path),
        }
    }

    /// Judges a response. `Err(DavError::AuthChanged)` asks the caller to
    /// select a different authenticator.
    pub fn verify<'a>(
        &'a mut self,
        transport: &'a Transport,
        rs: &'a ResponseHead,
        path: &'a str,
    ) -> BoxFuture<'a, Result<Verdict>> {
        async move {
            match self {
                Authenticator::Null(auth) => auth.verify(),
                Authenticator::NoAuth(auth) => auth.verify(rs),
                Authenticator::Basic(auth) => auth.verify(rs, path),
                Authenticator::Digest(auth) => auth.verify(rs, path),
                Authenticator::Passport(auth) => auth.verify(transport, rs, path).await,
                Authenticator::Negotiated(auth) => auth.verify(transport, rs, path).await,
            }
        }
        .boxed()
    }
}

/// Builds an authenticator from a response narrowed to one challenge
pub type AuthFactory =
    Arc<dyn Fn(Transport, ResponseHead, String) -> BoxFuture<'static, Result<Authenticator>> + Send + Sync>;

pub fn auth_factory<F, Fut>(create: F) -> AuthFactory
where
    F: Fn(Transport, ResponseHead, String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Authenticator>> + Send + 'static,
{
    Arc::new(move |transport, rs, path| create(transport, rs, path).boxed())
}

/// Shared slot for the authenticator new requests start from
#[derive(Debug, Clone, Default)]
pub struct DefaultAuth(Arc<Mutex<Authenticator>>);

impl DefaultAuth {
    pub fn new(auth: Authenticator) -> Self {
        Self(Arc::new(Mutex::new(auth)))
    }

    pub fn snapshot(&self) -> Authenticator {
        self.lock().clone()
    }

    /// Installs `auth`; the previous occupant is dropped
    pub fn replace(&self, auth: Authenticator) {
        *self.lock() = auth;
    }

    fn lock(&self) -> MutexGuard<'_, Authenticator> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

struct SchemeFactory {
    key: String,
    create: AuthFactory,
}

enum Mode {
    Negotiating {
        factories: Vec<SchemeFactory>,
        default: DefaultAuth,
    },
    Preemptive(Authenticator),
}

pub struct Authorizer {
    mode: Mode,
}

impl Authorizer {
    /// A negotiating authorizer with no schemes registered
    pub fn new() -> Self {
        Self {
            mode: Mode::Negotiating {
                factories: Vec::new(),
                default: DefaultAuth::default(),
            },
        }
    }

    /// Negotiates between Basic, Digest and Passport1.4 using one set of
    /// credentials
    pub fn auto(login: &str, secret: &str) -> Self {
        let mut factories = Vec::new();

        let (user, password) = (login.to_string(), secret.to_string());
        factories.push(SchemeFactory {
            key: "basic".to_string(),
            create: auth_factory(move |_, _, _| {
                let auth = BasicAuth::new(user.clone(), password.clone());
                async move { Ok(Authenticator::Basic(auth)) }
            }),
        });

        let (user, password) = (login.to_string(), secret.to_string());
        factories.push(SchemeFactory {
            key: "digest".to_string(),
            create: auth_factory(move |_, rs, _| {
                let auth = DigestAuth::from_challenge(&user, &password, &rs);
                async move { auth.map(Authenticator::Digest) }
            }),
        });

        let (user, password) = (login.to_string(), secret.to_string());
        factories.push(SchemeFactory {
            key: "passport1.4".to_string(),
            create: auth_factory(move |transport, rs, _| {
                let (user, password) = (user.clone(), password.clone());
                async move {
                    let partner_url = rs.url.to_string();
                    PassportAuth::new(&transport, user, password, &partner_url, &rs)
                        .await
                        .map(Authenticator::Passport)
                }
            }),
        });

        Self {
            mode: Mode::Negotiating {
                factories,
                default: DefaultAuth::default(),
            },
        }
    }

    /// Always uses `auth`, never negotiates
    pub fn preemptive(auth: Authenticator) -> Self {
        Self {
            mode: Mode::Preemptive(auth),
        }
    }

    /// Registers a factory for challenges whose lowercase text contains
    /// `scheme` (itself lowercased).
    pub fn add_authenticator(&mut self, scheme: &str, create: AuthFactory) -> Result<()> {
        let key = scheme.to_lowercase();
        match &mut self.mode {
            Mode::Preemptive(_) => Err(DavError::PreemptiveAuthorizer),
            Mode::Negotiating { factories, .. } => {
                if factories.iter().any(|f| f.key == key) {
                    return Err(DavError::DuplicateScheme(key));
                }
                factories.push(SchemeFactory { key, create });
                Ok(())
            }
        }
    }

    pub fn schemes(&self) -> Vec<&str> {
        match &self.mode {
            Mode::Negotiating { factories, .. } => factories.iter().map(|f| f.key.as_str()).collect(),
            Mode::Preemptive(_) => Vec::new(),
        }
    }

    /// The authenticator the next request will start from
    pub fn current(&self) -> Authenticator {
        match &self.mode {
            Mode::Negotiating { default, .. } => default.snapshot(),
            Mode::Preemptive(auth) => auth.clone(),
        }
    }

    /// Per-request authentication state plus a replayable body
    pub fn new_authenticator(self: &Arc<Self>, body: RequestBody) -> (AuthShim, ReplayBody) {
        let shim = AuthShim {
            auth: self.current(),
            authorizer: Arc::clone(self),
        };
        (shim, ReplayBody::new(body))
    }

    async fn select(&self, transport: &Transport, rs: &ResponseHead, path: &str) -> Result<Authenticator> {
        let Mode::Negotiating { factories, default } = &self.mode else {
            return Err(DavError::status("NoAuthenticator", path, rs.status.as_u16()));
        };

        let challenges = rs.challenges();
        let auth = if challenges.is_empty() {
            Authenticator::NoAuth(NoAuth)
        } else {
            let mut used = vec![false; factories.len()];
            let mut candidates = Vec::new();

            for challenge in &challenges {
                let lowered = challenge.to_lowercase();
                for (idx, factory) in factories.iter().enumerate() {
                    if used[idx] || !lowered.contains(&factory.key) {
                        continue;
                    }
                    let narrowed = rs.with_challenge(challenge);
                    match (factory.create)(transport.clone(), narrowed, path.to_string()).await {
                        Ok(auth) => {
                            debug!("Challenge '{}' matched {} for {}", challenge, auth.name(), path);
                            used[idx] = true;
                            candidates.push(auth);
                        }
                        Err(err) => {
                            warn!("⚠️ Could not build {} authenticator for {}: {}", factory.key, path, err);
                        }
                    }
                }
            }

            match candidates.len() {
                0 => return Err(DavError::status("NoAuthenticator", path, rs.status.as_u16())),
                1 => candidates.swap_remove(0),
                _ => Authenticator::Negotiated(NegotiatedAuth::new(candidates, default.clone())),
            }
        };

        default.replace(auth.clone());
        Ok(auth)
    }
}

impl Default for Authorizer {
    fn default() -> Self {
        Self::new()
    }
}

/// Request-scoped wrapper that swaps its authenticator when the server
/// asks for a different scheme.
pub struct AuthShim {
    auth: Authenticator,
    authorizer: Arc<Authorizer>,
}

impl AuthShim {
    pub fn current(&self) -> &Authenticator {
        &self.auth
    }

    pub fn authorize(&mut self, rq: &mut DavRequest, path: &str) -> Result<()> {
        self.auth.authorize(rq, path)
    }

    pub async fn verify(&mut self, transport: &Transport, rs: &ResponseHead, path: &str) -> Result<Verdict> {
        match self.auth.verify(transport, rs, path).await {
            Err(DavError::AuthChanged) => {
                let next = self.authorizer.select(transport, rs, path).await?;
                info!("🔐 Switching authentication for {}: {} -> {}", path, self.auth.name(), next.name());
                self.auth = next;
                Ok(Verdict::Redo)
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{HeaderValue, WWW_AUTHENTICATE};
    use reqwest::{StatusCode, Url};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn url() -> Url {
        Url::parse("http://dav.example.com/").expect("valid url")
    }

    fn transport() -> Transport {
        Transport::new(&Default::default()).expect("transport")
    }

    fn challenged(values: &[&'static str]) -> ResponseHead {
        let mut rs = ResponseHead::new(StatusCode::UNAUTHORIZED, url());
        for value in values {
            rs.headers.append(WWW_AUTHENTICATE, HeaderValue::from_static(value));
        }
        rs
    }

    fn counting_basic(calls: Arc<AtomicUsize>) -> AuthFactory {
        auth_factory(move |_, _, _| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(Authenticator::Basic(BasicAuth::new("u", "p"))) }
        })
    }

    #[test]
    fn test_duplicate_scheme_is_rejected() {
        let mut authorizer = Authorizer::new();
        let calls = Arc::new(AtomicUsize::new(0));
        authorizer.add_authenticator("Basic", counting_basic(calls.clone())).expect("first");
        let err = authorizer
            .add_authenticator("basic", counting_basic(calls))
            .expect_err("duplicate");
        assert!(matches!(err, DavError::DuplicateScheme(scheme) if scheme == "basic"));
    }

    #[test]
    fn test_preemptive_refuses_registration() {
        let mut authorizer = Authorizer::preemptive(Authenticator::Basic(BasicAuth::new("u", "p")));
        let err = authorizer
            .add_authenticator("digest", counting_basic(Arc::new(AtomicUsize::new(0))))
            .expect_err("preemptive");
        assert!(matches!(err, DavError::PreemptiveAuthorizer));
        assert_eq!(authorizer.current().name(), "Basic");
    }

    #[test]
    fn test_auto_registers_three_schemes() {
        let authorizer = Authorizer::auto("user", "pw");
        assert_eq!(authorizer.schemes(), vec!["basic", "digest", "passport1.4"]);
        assert_eq!(authorizer.current().name(), "Null");
    }

    #[tokio::test]
    async fn test_no_challenge_selects_no_auth() {
        let authorizer = Authorizer::auto("user", "pw");
        let ok = ResponseHead::new(StatusCode::OK, url());
        let auth = authorizer.select(&transport(), &ok, "/").await.expect("select");
        assert_eq!(auth.name(), "NoAuth");
        assert_eq!(authorizer.current().name(), "NoAuth");
    }

    #[tokio::test]
    async fn test_single_match_is_used_directly() {
        let authorizer = Authorizer::auto("user", "pw");
        let rs = challenged(&["Basic realm=\"dav\""]);
        let auth = authorizer.select(&transport(), &rs, "/").await.expect("select");
        assert_eq!(auth.name(), "Basic");
        assert_eq!(authorizer.current().name(), "Basic");
    }

    #[tokio::test]
    async fn test_multiple_matches_negotiate_in_header_order() {
        let authorizer = Authorizer::auto("user", "pw");
        let rs = challenged(&["Digest realm=\"dav\", nonce=\"abc\"", "Basic realm=\"dav\""]);
        match authorizer.select(&transport(), &rs, "/").await.expect("select") {
            Authenticator::Negotiated(negotiated) => {
                assert_eq!(negotiated.candidates(), vec!["Digest", "Basic"]);
            }
            other => panic!("expected negotiation, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unknown_scheme_has_no_authenticator() {
        let authorizer = Authorizer::auto("user", "pw");
        let rs = challenged(&["Bearer realm=\"dav\""]);
        let err = authorizer.select(&transport(), &rs, "/x").await.expect_err("no match");
        assert_eq!(err.to_string(), "NoAuthenticator /x: 401");
    }

    #[tokio::test]
    async fn test_failing_factory_is_skipped() {
        let authorizer = Authorizer::auto("user", "pw");
        // digest without a nonce cannot be built
        let rs = challenged(&["Digest realm=\"dav\"", "Basic realm=\"dav\""]);
        let auth = authorizer.select(&transport(), &rs, "/").await.expect("select");
        assert_eq!(auth.name(), "Basic");
    }

    #[tokio::test]
    async fn test_factory_used_once_per_selection() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut authorizer = Authorizer::new();
        authorizer.add_authenticator("basic", counting_basic(calls.clone())).expect("register");
        let rs = challenged(&["Basic realm=\"a\"", "Basic realm=\"b\""]);
        let auth = authorizer.select(&transport(), &rs, "/").await.expect("select");
        assert_eq!(auth.name(), "Basic");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_shim_swaps_on_auth_changed() {
        let authorizer = Arc::new(Authorizer::auto("user", "pw"));
        let (mut shim, _body) = authorizer.new_authenticator(RequestBody::Empty);
        assert_eq!(shim.current().name(), "Null");

        let rs = challenged(&["Basic realm=\"dav\""]);
        let verdict = shim.verify(&transport(), &rs, "/").await.expect("verdict");
        assert_eq!(verdict, Verdict::Redo);
        assert_eq!(shim.current().name(), "Basic");

        let (fresh, _body) = authorizer.new_authenticator(RequestBody::Empty);
        assert_eq!(fresh.current().name(), "Basic");
    }

    #[tokio::test]
    async fn test_preemptive_shim_reports_status() {
        let authorizer = Arc::new(Authorizer::preemptive(Authenticator::NoAuth(NoAuth)));
        let (mut shim, _body) = authorizer.new_authenticator(RequestBody::Empty);
        let rs = challenged(&["Basic realm=\"dav\""]);
        let err = shim.verify(&transport(), &rs, "/p").await.expect_err("cannot renegotiate");
        assert_eq!(err.to_string(), "NoAuthenticator /p: 401");
    }
}
