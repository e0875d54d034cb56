pub mod config;
pub mod models;
pub mod services;
pub mod storage;

pub use config::DavConfig;
pub use models::DavFile;
pub use services::webdav::{Authorizer, DavError, WebDavClient};
pub use storage::{StorageBackend, WebDavBackend};
