use std::collections::HashMap;
use std::fmt;

use reqwest::header::{AUTHORIZATION, WWW_AUTHENTICATE};
use reqwest::StatusCode;
use sha2::{Digest as _, Sha256};
use uuid::Uuid;

use crate::services::webdav::error::{DavError, Result};
use crate::services::webdav::transport::{DavRequest, ResponseHead};

use super::Verdict;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestAlgorithm {
    Md5,
    Md5Sess,
    Sha256,
    Sha256Sess,
}

impl DigestAlgorithm {
    fn parse(value: &str) -> Result<Self> {
        match value.to_ascii_uppercase().as_str() {
            "" | "MD5" => Ok(Self::Md5),
            "MD5-SESS" => Ok(Self::Md5Sess),
            "SHA-256" => Ok(Self::Sha256),
            "SHA-256-SESS" => Ok(Self::Sha256Sess),
            other => Err(DavError::Challenge(format!("unsupported digest algorithm {other}"))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Md5 => "MD5",
            Self::Md5Sess => "MD5-sess",
            Self::Sha256 => "SHA-256",
            Self::Sha256Sess => "SHA-256-sess",
        }
    }

    fn is_session(&self) -> bool {
        matches!(self, Self::Md5Sess | Self::Sha256Sess)
    }

    fn hash(&self, data: &str) -> String {
        match self {
            Self::Md5 | Self::Md5Sess => format!("{:x}", md5::compute(data.as_bytes())),
            Self::Sha256 | Self::Sha256Sess => format!("{:x}", Sha256::digest(data.as_bytes())),
        }
    }
}

/// HTTP Digest access authentication (RFC 7616), `qop=auth` or legacy
/// no-qop mode.
#[derive(Clone)]
pub struct DigestAuth {
    user: String,
    password: String,
    realm: String,
    nonce: String,
    opaque: Option<String>,
    algorithm: DigestAlgorithm,
    qop: Option<String>,
    nc: u32,
}

impl fmt::Debug for DigestAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DigestAuth")
            .field("user", &self.user)
            .field("realm", &self.realm)
            .field("algorithm", &self.algorithm)
            .field("qop", &self.qop)
            .field("nc", &self.nc)
            .finish_non_exhaustive()
    }
}

impl DigestAuth {
    /// Builds from the `WWW-Authenticate` header of `challenge`
    pub fn from_challenge(user: &str, password: &str, challenge: &ResponseHead) -> Result<Self> {
        let header = challenge
            .header(WWW_AUTHENTICATE)
            .ok_or_else(|| DavError::Challenge("missing WWW-Authenticate header".to_string()))?;
        Self::parse(user, password, header)
    }

    pub fn parse(user: &str, password: &str, header: &str) -> Result<Self> {
        let start = header
            .to_ascii_lowercase()
            .find("digest")
            .ok_or_else(|| DavError::Challenge(format!("not a digest challenge: {header}")))?;
        let params = parse_params(&header[start + "digest".len()..]);

        let nonce = params
            .get("nonce")
            .cloned()
            .ok_or_else(|| DavError::Challenge("digest challenge without nonce".to_string()))?;
        let algorithm = DigestAlgorithm::parse(params.get("algorithm").map(String::as_str).unwrap_or(""))?;

        let qop = match params.get("qop") {
            None => None,
            Some(offered) => {
                if offered.split(',').any(|q| q.trim().eq_ignore_ascii_case("auth")) {
                    Some("auth".to_string())
                } else {
                    return Err(DavError::Challenge(format!("unsupported digest qop {offered}")));
                }
            }
        };

        Ok(Self {
            user: user.to_string(),
            password: password.to_string(),
            realm: params.get("realm").cloned().unwrap_or_default(),
            nonce,
            opaque: params.get("opaque").cloned(),
            algorithm,
            qop,
            nc: 0,
        })
    }

    pub fn algorithm(&self) -> DigestAlgorithm {
        self.algorithm
    }

    pub fn authorize(&mut self, rq: &mut DavRequest) -> Result<()> {
        self.nc += 1;
        let uri = match rq.url.query() {
            Some(query) => format!("{}?{}", rq.url.path(), query),
            None => rq.url.path().to_string(),
        };
        let cnonce = Uuid::new_v4().simple().to_string();
        let value = self.header_value(rq.method.as_str(), &uri, &cnonce);
        rq.set_header(AUTHORIZATION, &value)
    }

    pub fn verify(&self, rs: &ResponseHead, path: &str) -> Result<Verdict> {
        if rs.status == StatusCode::UNAUTHORIZED {
            return Err(DavError::status("Authorize", path, rs.status.as_u16()));
        }
        Ok(Verdict::Done)
    }

    fn header_value(&self, method: &str, uri: &str, cnonce: &str) -> String {
        let alg = self.algorithm;
        let mut ha1 = alg.hash(&format!("{}:{}:{}", self.user, self.realm, self.password));
        if alg.is_session() {
            ha1 = alg.hash(&format!("{}:{}:{}", ha1, self.nonce, cnonce));
        }
        let ha2 = alg.hash(&format!("{}:{}", method, uri));
        let nc = format!("{:08x}", self.nc);

        let response = match &self.qop {
            Some(qop) => alg.hash(&format!("{}:{}:{}:{}:{}:{}", ha1, self.nonce, nc, cnonce, qop, ha2)),
            None => alg.hash(&format!("{}:{}:{}", ha1, self.nonce, ha2)),
        };

        let mut value = format!(
            r#"Digest username="{}", realm="{}", nonce="{}", uri="{}", response="{}", algorithm={}"#,
            self.user,
            self.realm,
            self.nonce,
            uri,
            response,
            alg.name()
        );
        if let Some(opaque) = &self.opaque {
            value.push_str(&format!(r#", opaque="{}""#, opaque));
        }
        if let Some(qop) = &self.qop {
            value.push_str(&format!(r#", qop={}, nc={}, cnonce="{}""#, qop, nc, cnonce));
        }
        value
    }
}

/// Splits `k1="v, 1", k2=v2` into a lowercase-keyed map, honouring quotes
fn parse_params(input: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();
    let mut rest = input.trim_start();

    while !rest.is_empty() {
        let Some(eq) = rest.find('=') else { break };
        let key = rest[..eq].trim().trim_start_matches(',').trim().to_ascii_lowercase();
        rest = rest[eq + 1..].trim_start();

        let value;
        if let Some(quoted) = rest.strip_prefix('"') {
            let end = quoted.find('"').unwrap_or(quoted.len());
            value = quoted[..end].to_string();
            rest = quoted.get(end + 1..).unwrap_or("");
        } else {
            let end = rest.find(',').unwrap_or(rest.len());
            value = rest[..end].trim().to_string();
            rest = &rest[end..];
        }

        if !key.is_empty() {
            params.insert(key, value);
        }
        rest = rest.trim_start().trim_start_matches(',').trim_start();
    }

    params
}
