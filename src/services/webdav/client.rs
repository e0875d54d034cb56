use std::io::{self, SeekFrom};
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use futures_util::{stream, StreamExt, TryStreamExt};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode, Url};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeekExt};
use tokio_util::io::StreamReader;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::DavConfig;
use crate::models::DavFile;

use super::auth::Authorizer;
use super::common::{base_name, fix_slash, fix_slashes, join, parent_dir, parse_i64, path_escape, path_unescape, split_path_to_hierarchy};
use super::error::{DavError, Result};
use super::request::dav_method;
use super::transport::{RequestBody, Transport, TransportOptions};
use super::xml::PropStat;

/// Readable body of a GET
pub type DavReader = Pin<Box<dyn AsyncRead + Send>>;

/// A WebDAV account: root URL, default headers, authentication state and
/// the HTTP transport. Cloning is cheap and clones share the negotiated
/// authenticator.
#[derive(Clone)]
pub struct WebDavClient {
    pub(crate) root: Url,
    pub(crate) headers: HeaderMap,
    pub(crate) transport: Transport,
    pub(crate) authorizer: Arc<Authorizer>,
}

impl WebDavClient {
    /// Client that negotiates Basic, Digest or Passport1.4 with `user` and
    /// `password`
    pub fn new(uri: &str, user: &str, password: &str) -> Result<Self> {
        Self::with_authorizer(uri, Authorizer::auto(user, password), &TransportOptions::default())
    }

    pub fn with_authorizer(uri: &str, authorizer: Authorizer, options: &TransportOptions) -> Result<Self> {
        let root = Url::parse(&fix_slash(uri))?;
        if root.scheme() != "http" && root.scheme() != "https" {
            return Err(DavError::Config(format!("unsupported scheme '{}' in {}", root.scheme(), uri)));
        }

        Ok(Self {
            root,
            headers: HeaderMap::new(),
            transport: Transport::new(options)?,
            authorizer: Arc::new(authorizer),
        })
    }

    pub fn from_config(config: &DavConfig) -> Result<Self> {
        config.validate()?;
        Self::with_authorizer(
            &config.server_url()?,
            Authorizer::auto(&config.username, &config.password),
            &config.transport_options(),
        )
    }

    pub fn root(&self) -> &Url {
        &self.root
    }

    pub fn authorizer(&self) -> &Arc<Authorizer> {
        &self.authorizer
    }

    /// Adds a header sent with every request
    pub fn set_header(&mut self, name: &str, value: &str) -> Result<()> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| DavError::Config(format!("invalid header name '{}'", name)))?;
        self.headers.append(name, HeaderValue::from_str(value)?);
        Ok(())
    }

    /// Copy of this client whose requests abort once `cancel` fires
    pub fn with_cancellation(&self, cancel: CancellationToken) -> Self {
        Self {
            transport: self.transport.with_cancellation(cancel),
            ..self.clone()
        }
    }

    /// Absolute URL of `path`, escaped segment by segment below the root
    pub fn resource_url(&self, path: &str) -> Result<Url> {
        let mut url = self.root.clone();
        url.set_path(&join(self.root.path(), &path_escape(path)));
        Ok(url)
    }

    /// Probes the server with a depth-0 OPTIONS
    pub async fn connect(&self) -> Result<()> {
        let rs = self
            .req(Method::OPTIONS, "/", RequestBody::Empty, |rq| rq.set_static_header("depth", "0"))
            .await
            .map_err(|e| e.at("Connect", "/"))?;

        match rs.status() {
            StatusCode::OK | StatusCode::NO_CONTENT => {
                info!("✅ Connected to WebDAV server {}", self.root);
                Ok(())
            }
            status => Err(DavError::status("Connect", "/", status.as_u16())),
        }
    }

    /// Lists the direct children of the collection at `path`
    pub async fn read_dir(&self, path: &str) -> Result<Vec<DavFile>> {
        let path = fix_slashes(path);
        let mut files = Vec::new();
        let mut skip_self = true;

        self.propfind(&path, false, |response| {
            if skip_self {
                skip_self = false;
                return match response.props("200") {
                    Some(props) if props.is_collection => Ok(()),
                    _ => Err(DavError::NotADirectory(path.clone())),
                };
            }

            if let Some(props) = response.props("200") {
                files.push(listing_entry(&path, &response.href, props));
            }
            Ok(())
        })
        .await
        .map_err(|e| e.at("ReadDir", &path))?;

        debug!("📂 {} entries in {}", files.len(), path);
        Ok(files)
    }

    pub async fn stat(&self, path: &str) -> Result<DavFile> {
        let mut found = None;

        self.propfind(path, true, |response| {
            if found.is_none() {
                if let Some(props) = response.props("200") {
                    found = Some(stat_entry(path, &response.href, props));
                }
            }
            Ok(())
        })
        .await
        .map_err(|e| e.at("Stat", path))?;

        found.ok_or_else(|| DavError::status("Stat", path, StatusCode::NOT_FOUND.as_u16()))
    }

    /// Creates every missing collection above `path`. A path ending in `/`
    /// names a directory and is created as well.
    pub async fn mkdir_all(&self, path: &str) -> Result<()> {
        let parent = parent_dir(path);
        if parent == "." || parent == "/" {
            return Ok(());
        }

        for dir in split_path_to_hierarchy(&parent) {
            if dir == "/" || dir == "." {
                continue;
            }

            match self.stat(&dir).await {
                Ok(existing) if existing.is_dir => continue,
                Ok(_) => {}
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => debug!("Stat {} before MKCOL: {}", dir, e),
            }

            let rs = self
                .req(dav_method("MKCOL")?, &dir, RequestBody::Empty, |_| {})
                .await
                .map_err(|e| e.at("MkdirAll", &dir))?;
            match rs.status() {
                StatusCode::OK | StatusCode::CREATED => debug!("📁 Created collection {}", dir),
                status => return Err(DavError::status("MkdirAll", dir, status.as_u16())),
            }
        }

        Ok(())
    }

    /// Deletes `path` and everything under it. A missing path is not an
    /// error.
    pub async fn remove_all(&self, path: &str) -> Result<()> {
        let rs = self
            .req(Method::DELETE, path, RequestBody::Empty, |_| {})
            .await
            .map_err(|e| e.at("RemoveAll", path))?;

        match rs.status() {
            StatusCode::OK | StatusCode::NO_CONTENT | StatusCode::NOT_FOUND => Ok(()),
            status => Err(DavError::status("RemoveAll", path, status.as_u16())),
        }
    }

    /// Body of `path`. Once the client's token fires, the next read fails
    /// with `ErrorKind::Interrupted`.
    pub async fn read_stream(&self, path: &str) -> Result<DavReader> {
        let rs = self
            .req(Method::GET, path, RequestBody::Empty, |_| {})
            .await
            .map_err(|e| e.at("ReadStream", path))?;

        if rs.status() != StatusCode::OK {
            return Err(DavError::status("ReadStream", path, rs.status().as_u16()));
        }

        let token = self.transport.cancellation_token().clone();
        let body = rs
            .bytes_stream()
            .map_err(io::Error::other)
            .take_until(token.clone().cancelled_owned())
            .chain(stream::once(async move { token.is_cancelled() }).filter_map(|cancelled| async move {
                cancelled.then(|| Err::<Bytes, _>(io::Error::new(io::ErrorKind::Interrupted, DavError::Cancelled)))
            }));
        Ok(Box::pin(StreamReader::new(body)))
    }

    /// Uploads everything `stream` yields. The payload is buffered in
    /// memory so the PUT carries a definite length and can be replayed.
    pub async fn write_stream<R>(&self, path: &str, mut stream: R) -> Result<()>
    where
        R: AsyncRead + Unpin + Send,
    {
        self.mkdir_all(path).await?;

        let mut buffer = Vec::with_capacity(1024 * 1024);
        stream
            .read_to_end(&mut buffer)
            .await
            .map_err(|e| DavError::from(e).at("WriteStream", path))?;

        self.finish_write(path, RequestBody::from(buffer)).await
    }

    /// Uploads a seekable file without buffering it
    pub async fn write_file(&self, path: &str, mut file: tokio::fs::File) -> Result<()> {
        self.mkdir_all(path).await?;

        let len = file
            .seek(SeekFrom::End(0))
            .await
            .map_err(|e| DavError::from(e).at("WriteStream", path))?;
        file.seek(SeekFrom::Start(0))
            .await
            .map_err(|e| DavError::from(e).at("WriteStream", path))?;

        self.finish_write(path, RequestBody::File { file, len }).await
    }

    pub async fn write_bytes(&self, path: &str, data: impl Into<Bytes>) -> Result<()> {
        self.mkdir_all(path).await?;
        self.finish_write(path, RequestBody::Bytes(data.into())).await
    }

    async fn finish_write(&self, path: &str, body: RequestBody) -> Result<()> {
        let length = body.content_length().unwrap_or(0);
        let status = self.put(path, body).await.map_err(|e| e.at("WriteStream", path))?;

        match status {
            StatusCode::OK | StatusCode::CREATED | StatusCode::NO_CONTENT => {
                debug!("📤 Uploaded {} bytes to {}", length, path);
                Ok(())
            }
            status => Err(DavError::status("WriteStream", path, status.as_u16())),
        }
    }
}

/// Child entry of a listing: named after the href, collections get a
/// trailing separator and no size
fn listing_entry(dir: &str, href: &str, props: &PropStat) -> DavFile {
    let name = path_unescape(href)
        .map(|decoded| base_name(&decoded))
        .filter(|name| !name.is_empty() && name != "/" && name != ".")
        .unwrap_or_else(|| props.display_name.clone());

    let mut file = DavFile {
        path: format!("{}{}", dir, name),
        name,
        content_type: props.content_type.clone(),
        size: 0,
        modified: DavFile::parse_modified(&props.last_modified),
        etag: props.etag.clone(),
        is_dir: props.is_collection,
    };

    if file.is_dir {
        file.path.push('/');
    } else {
        file.size = parse_i64(&props.content_length);
    }
    file
}

/// Entry for a depth-0 PROPFIND: named after the display name when the
/// server sends one. Collections get a trailing separator.
fn stat_entry(path: &str, href: &str, props: &PropStat) -> DavFile {
    let name = if props.display_name.is_empty() {
        path_unescape(href)
            .map(|decoded| base_name(&decoded))
            .unwrap_or_else(|| base_name(path))
    } else {
        props.display_name.clone()
    };

    let mut path = path.to_string();
    if props.is_collection && !path.ends_with('/') {
        path.push('/');
    }

    DavFile {
        path,
        name,
        content_type: props.content_type.clone(),
        size: if props.is_collection { 0 } else { parse_i64(&props.content_length) },
        modified: DavFile::parse_modified(&props.last_modified),
        etag: props.etag.clone(),
        is_dir: props.is_collection,
    }
}
