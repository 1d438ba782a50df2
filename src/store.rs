//! Where the navigation document lives.
//!
//! [`SharePointStore`] talks to the SharePoint REST API of one site;
//! [`FsStore`] keeps documents under a local directory.

use std::cell::OnceCell;
use std::io::Write as _;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use url::Url;

use crate::config::{Credentials, SiteConfig};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("build http client")]
    Client(#[source] reqwest::Error),
    #[error("{method} {endpoint}")]
    Request {
        method: &'static str,
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("token request rejected ({status}): {message}")]
    Auth { status: u16, message: String },
    #[error("{method} {endpoint} rejected ({status}): {message}")]
    Rejected {
        method: &'static str,
        endpoint: String,
        status: u16,
        message: String,
    },
    #[error("stored document is not valid JSON")]
    InvalidDocument(#[source] serde_json::Error),
    #[error("serialize document")]
    Serialize(#[source] serde_json::Error),
    #[error("invalid document identifier: {0}")]
    InvalidIdentifier(String),
    #[error("{op} {path}")]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub trait DocumentStore {
    /// Fetches a document. `Ok(None)` means there is nothing stored yet.
    fn load(&self, identifier: &str) -> Result<Option<Value>, StoreError>;

    fn save(&self, identifier: &str, document: &Value) -> Result<(), StoreError>;

    /// Human-readable location of `identifier`, for logs.
    fn describe(&self, identifier: &str) -> String;
}

/// Pretty JSON with a trailing newline. Non-ASCII text is written as-is.
pub fn render_document(document: &Value) -> Result<String, StoreError> {
    let mut out = serde_json::to_string_pretty(document).map_err(StoreError::Serialize)?;
    out.push('\n');
    Ok(out)
}

/// An empty body or a JSON `null` counts as "no document".
pub fn parse_document(raw: &str) -> Result<Option<Value>, StoreError> {
    let raw = raw.trim_start_matches('\u{feff}');
    if raw.trim().is_empty() {
        return Ok(None);
    }
    match serde_json::from_str(raw).map_err(StoreError::InvalidDocument)? {
        Value::Null => Ok(None),
        value => Ok(Some(value)),
    }
}

/// Atomically replaces `path` with the rendered document.
pub fn write_document(path: &Path, document: &Value) -> Result<(), StoreError> {
    let rendered = render_document(document)?;

    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent).map_err(|source| StoreError::Io {
        op: "create dir",
        path: parent.to_owned(),
        source,
    })?;

    let io_err = |op: &'static str| {
        move |source: std::io::Error| StoreError::Io {
            op,
            path: path.to_owned(),
            source,
        }
    };
    let mut file = tempfile::NamedTempFile::new_in(parent).map_err(io_err("create temp file"))?;
    file.write_all(rendered.as_bytes())
        .map_err(io_err("write"))?;
    file.persist(path)
        .map_err(|err| err.error)
        .map_err(io_err("persist"))?;
    Ok(())
}

pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, identifier: &str) -> Result<PathBuf, StoreError> {
        let mut path = self.root.clone();
        for component in Path::new(identifier).components() {
            match component {
                Component::Normal(segment) => path.push(segment),
                Component::CurDir | Component::RootDir => {}
                Component::ParentDir | Component::Prefix(_) => {
                    return Err(StoreError::InvalidIdentifier(identifier.to_owned()));
                }
            }
        }
        if path == self.root {
            return Err(StoreError::InvalidIdentifier(identifier.to_owned()));
        }
        Ok(path)
    }
}

impl DocumentStore for FsStore {
    fn load(&self, identifier: &str) -> Result<Option<Value>, StoreError> {
        let path = self.path_for(identifier)?;
        if !path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(&path).map_err(|source| StoreError::Io {
            op: "read",
            path: path.clone(),
            source,
        })?;
        parse_document(&raw)
    }

    fn save(&self, identifier: &str, document: &Value) -> Result<(), StoreError> {
        write_document(&self.path_for(identifier)?, document)
    }

    fn describe(&self, identifier: &str) -> String {
        match self.path_for(identifier) {
            Ok(path) => path.display().to_string(),
            Err(_) => identifier.to_owned(),
        }
    }
}

pub struct SharePointStore {
    client: reqwest::blocking::Client,
    config: SiteConfig,
    token: OnceCell<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

impl SharePointStore {
    pub fn new(config: SiteConfig) -> Result<Self, StoreError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(StoreError::Client)?;
        Ok(Self {
            client,
            config,
            token: OnceCell::new(),
        })
    }

    #[must_use]
    pub fn default_identifier(&self) -> &str {
        &self.config.file_path
    }

    fn access_token(&self) -> Result<String, StoreError> {
        if let Some(token) = self.token.get() {
            return Ok(token.clone());
        }

        let token = match &self.config.credentials {
            Credentials::AccessToken(token) => token.clone(),
            Credentials::ClientSecret {
                token_url,
                client_id,
                client_secret,
                scope,
            } => self.request_token(token_url, client_id, client_secret, scope)?,
        };
        let _ = self.token.set(token.clone());
        Ok(token)
    }

    fn request_token(
        &self,
        token_url: &Url,
        client_id: &str,
        client_secret: &str,
        scope: &str,
    ) -> Result<String, StoreError> {
        tracing::debug!(endpoint = %token_url, "request access token");
        let response = self
            .client
            .post(token_url.clone())
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", client_id),
                ("client_secret", client_secret),
                ("scope", scope),
            ])
            .send()
            .map_err(|source| StoreError::Request {
                method: "POST",
                endpoint: token_url.to_string(),
                source,
            })?;

        let status = response.status();
        let raw = response.text().map_err(|source| StoreError::Request {
            method: "POST",
            endpoint: token_url.to_string(),
            source,
        })?;
        if !status.is_success() {
            return Err(StoreError::Auth {
                status: status.as_u16(),
                message: parse_error_message(&raw).unwrap_or(raw),
            });
        }

        let token: TokenResponse = serde_json::from_str(&raw).map_err(|_| StoreError::Auth {
            status: status.as_u16(),
            message: "token response has no access_token".to_owned(),
        })?;
        Ok(token.access_token)
    }
}

impl DocumentStore for SharePointStore {
    fn load(&self, identifier: &str) -> Result<Option<Value>, StoreError> {
        let endpoint = file_endpoint(&self.config.site_url, identifier);
        let token = self.access_token()?;

        tracing::debug!(%endpoint, "download navigation config");
        let request_err = |source: reqwest::Error| StoreError::Request {
            method: "GET",
            endpoint: endpoint.clone(),
            source,
        };
        let response = self
            .client
            .get(&endpoint)
            .bearer_auth(&token)
            .send()
            .map_err(request_err)?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let raw = response.text().map_err(request_err)?;
        if !status.is_success() {
            return Err(StoreError::Rejected {
                method: "GET",
                endpoint: endpoint.clone(),
                status: status.as_u16(),
                message: parse_error_message(&raw).unwrap_or(raw),
            });
        }
        parse_document(&raw)
    }

    fn save(&self, identifier: &str, document: &Value) -> Result<(), StoreError> {
        let endpoint = upload_endpoint(&self.config.site_url, identifier);
        let body = render_document(document)?;
        let token = self.access_token()?;

        tracing::debug!(%endpoint, bytes = body.len(), "upload navigation config");
        let request_err = |source: reqwest::Error| StoreError::Request {
            method: "POST",
            endpoint: endpoint.clone(),
            source,
        };
        let response = self
            .client
            .post(&endpoint)
            .bearer_auth(&token)
            .header(ACCEPT, "application/json;odata=verbose")
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .map_err(request_err)?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let raw = response.text().map_err(request_err)?;
        Err(StoreError::Rejected {
            method: "POST",
            endpoint: endpoint.clone(),
            status: status.as_u16(),
            message: parse_error_message(&raw).unwrap_or(raw),
        })
    }

    fn describe(&self, identifier: &str) -> String {
        format!(
            "{}{}",
            origin(&self.config.site_url),
            server_relative_path(&self.config.site_url, identifier)
        )
    }
}

fn origin(site_url: &Url) -> String {
    site_url.origin().ascii_serialization()
}

fn site_base(site_url: &Url) -> &str {
    site_url.as_str().trim_end_matches('/')
}

/// Site-relative identifiers are anchored at the site's own path;
/// identifiers starting with `/` are already server-relative.
#[must_use]
pub fn server_relative_path(site_url: &Url, identifier: &str) -> String {
    if identifier.starts_with('/') {
        return identifier.to_owned();
    }
    let site_path = site_url.path().trim_end_matches('/');
    format!("{site_path}/{identifier}")
}

fn odata_literal(value: &str) -> String {
    value.replace('\'', "''")
}

#[must_use]
pub fn file_endpoint(site_url: &Url, identifier: &str) -> String {
    format!(
        "{}/_api/web/GetFileByServerRelativeUrl('{}')/$value",
        site_base(site_url),
        odata_literal(&server_relative_path(site_url, identifier))
    )
}

#[must_use]
pub fn upload_endpoint(site_url: &Url, identifier: &str) -> String {
    let full = server_relative_path(site_url, identifier);
    let (folder, name) = full.rsplit_once('/').unwrap_or(("", full.as_str()));
    format!(
        "{}/_api/web/GetFolderByServerRelativeUrl('{}')/Files/add(url='{}',overwrite=true)",
        site_base(site_url),
        odata_literal(folder),
        odata_literal(name)
    )
}

/// Pulls a message out of SharePoint (OData) or identity-platform error bodies.
fn parse_error_message(raw_json: &str) -> Option<String> {
    let value: Value = serde_json::from_str(raw_json).ok()?;
    if let Some(description) = value.get("error_description").and_then(Value::as_str) {
        return Some(description.to_owned());
    }
    let error = value.get("error").or_else(|| value.get("odata.error"))?;
    let message = error.get("message")?;
    message
        .as_str()
        .or_else(|| message.get("value").and_then(Value::as_str))
        .map(str::to_owned)
}
