use std::fmt;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::header::AUTHORIZATION;
use reqwest::StatusCode;

use crate::services::webdav::error::{DavError, Result};
use crate::services::webdav::transport::{DavRequest, ResponseHead};

use super::Verdict;

#[derive(Clone)]
pub struct BasicAuth {
    user: String,
    password: String,
}

impl fmt::Debug for BasicAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicAuth")
            .field("user", &self.user)
            .field("password", &"***")
            .finish()
    }
}

impl BasicAuth {
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            password: password.into(),
        }
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn header_value(&self) -> String {
        let credentials = format!("{}:{}", self.user, self.password);
        format!("Basic {}", STANDARD.encode(credentials))
    }

    pub fn authorize(&self, rq: &mut DavRequest) -> Result<()> {
        rq.set_header(AUTHORIZATION, &self.header_value())
    }

    pub fn verify(&self, rs: &ResponseHead, path: &str) -> Result<Verdict> {
        if rs.status == StatusCode::UNAUTHORIZED {
            return Err(DavError::status("Authorize", path, rs.status.as_u16()));
        }
        Ok(Verdict::Done)
    }
}
