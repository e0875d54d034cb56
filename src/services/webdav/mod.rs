// WebDAV client core: transport, authentication, multistatus parsing and
// the file operations built on them

pub mod auth;
pub mod client;
pub mod common;
pub mod error;
pub mod request;
pub mod transport;
pub mod xml;

// Re-export main types for convenience
pub use auth::{
    auth_factory, AuthFactory, AuthShim, Authenticator, Authorizer, BasicAuth, DigestAuth, NegotiatedAuth,
    NoAuth, NullAuth, PassportAuth, Verdict,
};
pub use client::{DavReader, WebDavClient};
pub use error::{DavError, Result};
pub use request::MAX_ROUND_TRIPS;
pub use transport::{DavRequest, RequestBody, ResponseHead, Transport, TransportOptions, MAX_REDIRECTS};
pub use xml::{parse_multistatus, MultiStatusResponse, PropStat};
