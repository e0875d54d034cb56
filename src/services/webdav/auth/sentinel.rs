use crate::services::webdav::error::{DavError, Result};
use crate::services::webdav::transport::{DavRequest, ResponseHead};

use super::Verdict;

/// Placeholder held before the first response has been seen. It sends the
/// request bare, without following redirects, and always asks to be
/// replaced.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullAuth;

impl NullAuth {
    pub fn authorize(&self, rq: &mut DavRequest) {
        rq.inhibit_redirect = true;
    }

    pub fn verify(&self) -> Result<Verdict> {
        Err(DavError::AuthChanged)
    }
}

/// Chosen when the server answered without any challenge. Stays in place
/// until a challenge shows up.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAuth;

impl NoAuth {
    pub fn verify(&self, rs: &ResponseHead) -> Result<Verdict> {
        if rs.has_challenge() {
            Err(DavError::AuthChanged)
        } else {
            Ok(Verdict::Done)
        }
    }
}
