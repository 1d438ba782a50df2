//! Site settings: YAML file, then environment, then command-line overrides.

use std::path::Path;

use anyhow::Context as _;
use serde::Deserialize;
use url::Url;

pub const DEFAULT_FILE_PATH: &str = "SiteAssets/monarchSidebarNavConfig.json";
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

pub const ENV_SITE_URL: &str = "SHAREPOINT_SITE_URL";
pub const ENV_FILE_PATH: &str = "SHAREPOINT_FILE_PATH";
pub const ENV_CLIENT_ID: &str = "SHAREPOINT_CLIENT_ID";
pub const ENV_CLIENT_SECRET: &str = "SHAREPOINT_CLIENT_SECRET";
pub const ENV_TENANT_ID: &str = "SHAREPOINT_TENANT_ID";
pub const ENV_TOKEN_URL: &str = "SHAREPOINT_TOKEN_URL";
pub const ENV_ACCESS_TOKEN: &str = "SHAREPOINT_ACCESS_TOKEN";
pub const ENV_TENANT_HOST: &str = "SHAREPOINT_TENANT_HOST";

/// Unvalidated settings. Every field is optional until [`SiteSettings::resolve`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SiteSettings {
    pub site_url: Option<String>,
    pub file_path: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub tenant_id: Option<String>,
    pub token_url: Option<String>,
    pub access_token: Option<String>,
    pub tenant_host: Option<String>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credentials {
    /// A pre-issued bearer token.
    AccessToken(String),
    /// OAuth2 client-credentials grant.
    ClientSecret {
        token_url: Url,
        client_id: String,
        client_secret: String,
        scope: String,
    },
}

/// Validated settings for the SharePoint document store.
#[derive(Debug, Clone)]
pub struct SiteConfig {
    pub site_url: Url,
    pub file_path: String,
    pub credentials: Credentials,
    pub timeout_secs: u64,
}

impl SiteSettings {
    /// Reads the optional YAML file, then layers the process environment on top.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let base = match path {
            Some(path) => Self::from_yaml_file(path)?,
            None => Self::default(),
        };
        Ok(base.with_env(|key| std::env::var(key).ok()))
    }

    pub fn from_yaml_file(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read settings file: {}", path.display()))?;
        serde_yaml::from_str(&raw)
            .with_context(|| format!("parse settings file: {}", path.display()))
    }

    /// Overrides fields with non-blank values returned by `lookup`.
    #[must_use]
    pub fn with_env(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let overlay = [
            (ENV_SITE_URL, &mut self.site_url),
            (ENV_FILE_PATH, &mut self.file_path),
            (ENV_CLIENT_ID, &mut self.client_id),
            (ENV_CLIENT_SECRET, &mut self.client_secret),
            (ENV_TENANT_ID, &mut self.tenant_id),
            (ENV_TOKEN_URL, &mut self.token_url),
            (ENV_ACCESS_TOKEN, &mut self.access_token),
            (ENV_TENANT_HOST, &mut self.tenant_host),
        ];
        for (key, slot) in overlay {
            if let Some(value) = get(key) {
                *slot = Some(value);
            }
        }
        self
    }

    /// The host substring that marks a link as internal: the explicit
    /// `tenant_host`, else the host of `site_url`.
    #[must_use]
    pub fn tenant_marker(&self) -> Option<String> {
        if let Some(host) = self.tenant_host.as_deref().map(str::trim)
            && !host.is_empty()
        {
            return Some(host.to_owned());
        }
        let site = self.site_url.as_deref()?;
        Url::parse(site.trim())
            .ok()?
            .host_str()
            .map(str::to_owned)
    }

    #[must_use]
    pub fn file_path(&self) -> String {
        self.file_path
            .as_deref()
            .map(|p| p.trim().trim_matches('/'))
            .filter(|p| !p.is_empty())
            .unwrap_or(DEFAULT_FILE_PATH)
            .to_owned()
    }

    pub fn resolve(&self) -> anyhow::Result<SiteConfig> {
        let mut missing = Vec::new();
        if blank(&self.site_url) {
            missing.push(ENV_SITE_URL);
        }
        if blank(&self.access_token) {
            if blank(&self.client_id) {
                missing.push(ENV_CLIENT_ID);
            }
            if blank(&self.client_secret) {
                missing.push(ENV_CLIENT_SECRET);
            }
            if blank(&self.token_url) && blank(&self.tenant_id) {
                missing.push(ENV_TENANT_ID);
            }
        }
        if !missing.is_empty() {
            anyhow::bail!(
                "missing SharePoint settings: set {} (or pass --dry-run)",
                missing.join(", ")
            );
        }

        let site_url = self.site_url.as_deref().unwrap_or_default().trim();
        let mut site_url =
            Url::parse(site_url).with_context(|| format!("parse site url: {site_url}"))?;
        if !matches!(site_url.scheme(), "http" | "https") {
            anyhow::bail!("site url must be http/https: {site_url}");
        }
        let host = site_url
            .host_str()
            .ok_or_else(|| anyhow::anyhow!("site url must have host: {site_url}"))?
            .to_owned();
        let trimmed_path = site_url.path().trim_end_matches('/').to_owned();
        site_url.set_path(&trimmed_path);
        site_url.set_query(None);
        site_url.set_fragment(None);

        let credentials = match (&self.access_token, &self.client_id, &self.client_secret) {
            (Some(token), _, _) if !token.trim().is_empty() => {
                Credentials::AccessToken(token.trim().to_owned())
            }
            (_, Some(client_id), Some(client_secret)) => Credentials::ClientSecret {
                token_url: self.token_endpoint()?,
                client_id: client_id.trim().to_owned(),
                client_secret: client_secret.clone(),
                scope: format!("https://{host}/.default"),
            },
            _ => anyhow::bail!("incomplete SharePoint credentials"),
        };

        Ok(SiteConfig {
            site_url,
            file_path: self.file_path(),
            credentials,
            timeout_secs: self.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS),
        })
    }

    fn token_endpoint(&self) -> anyhow::Result<Url> {
        let raw = match (&self.token_url, &self.tenant_id) {
            (Some(url), _) if !url.trim().is_empty() => url.trim().to_owned(),
            (_, Some(tenant)) => format!(
                "https://login.microsoftonline.com/{}/oauth2/v2.0/token",
                tenant.trim()
            ),
            _ => anyhow::bail!("missing token endpoint: set {ENV_TOKEN_URL} or {ENV_TENANT_ID}"),
        };
        Url::parse(&raw).with_context(|| format!("parse token url: {raw}"))
    }
}

fn blank(value: &Option<String>) -> bool {
    value.as_deref().is_none_or(|v| v.trim().is_empty())
}
