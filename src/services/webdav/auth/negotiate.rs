use std::fmt;

use tracing::{debug, info};

use crate::services::webdav::error::{DavError, Result};
use crate::services::webdav::transport::{DavRequest, ResponseHead, Transport};

use super::{Authenticator, DefaultAuth, Verdict};

/// Tries several candidate authenticators in order until one passes
/// verification, then installs the winner as the authorizer's default.
#[derive(Clone)]
pub struct NegotiatedAuth {
    auths: Vec<Authenticator>,
    default: DefaultAuth,
}

impl fmt::Debug for NegotiatedAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NegotiatedAuth")
            .field("candidates", &self.candidates())
            .finish()
    }
}

impl NegotiatedAuth {
    pub fn new(auths: Vec<Authenticator>, default: DefaultAuth) -> Self {
        Self { auths, default }
    }

    pub fn candidates(&self) -> Vec<&'static str> {
        self.auths.iter().map(Authenticator::name).collect()
    }

    pub fn authorize(&mut self, rq: &mut DavRequest, path: &str) -> Result<()> {
        match self.auths.first_mut() {
            Some(first) => first.authorize(rq, path),
            None => Err(DavError::status("NoAuthenticator", path, 400)),
        }
    }

    pub async fn verify(&mut self, transport: &Transport, rs: &ResponseHead, path: &str) -> Result<Verdict> {
        let Some(first) = self.auths.first_mut() else {
            return Err(DavError::status("NoAuthenticator", path, 400));
        };

        let outcome = first.verify(transport, rs, path).await;
        match outcome {
            Err(err) => {
                if self.auths.len() > 1 {
                    debug!("Discarding {} for {}: {}", self.auths[0].name(), path, err);
                    self.auths.remove(0);
                    Ok(Verdict::Redo)
                } else {
                    debug!("Last candidate {} failed for {}: {}", self.auths[0].name(), path, err);
                    Err(DavError::status("NoAuthenticator", path, rs.status.as_u16()))
                }
            }
            Ok(Verdict::Redo) => Ok(Verdict::Redo),
            Ok(Verdict::Done) => {
                let winner = self.auths.remove(0);
                info!("🔐 Negotiated {} authentication for {}", winner.name(), path);
                self.default.replace(winner);
                Ok(Verdict::Done)
            }
        }
    }
}
