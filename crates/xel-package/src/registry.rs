//! Package registry client
//!
//! Endpoints, relative to the configured base URI:
//!
//! - `packages/name/<name>` - package descriptor
//! - `versions/pkg/<package id>?limit=&offset=` - one page of versions
//! - `tarballs/ver/<version id>?limit=&offset=` - tarball descriptors
//!
//! [`HttpRegistry`] talks to a live registry. [`DirectoryRegistry`] serves the
//! same documents from a local mirror directory (`file://` base URIs).

use crate::{PackageError, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use xel_config::GlobalConfig;

/// Page size used when listing versions
pub const VERSION_PAGE_SIZE: usize = 100;

/// `GET packages/name/<name>`
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct PackageInfo {
    pub id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub author: String,
    #[serde(default, rename = "isDeprecated")]
    pub is_deprecated: bool,
    #[serde(default, rename = "deprecatedReason")]
    pub deprecated_reason: String,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct SemverTriplet {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct VersionInfo {
    pub id: u64,
    pub semver: SemverTriplet,
    pub version: String,
    #[serde(default)]
    pub xel: String,
    #[serde(default)]
    pub engine: String,
}

/// `GET versions/pkg/<id>`
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct VersionPage {
    #[serde(default)]
    pub versions: Vec<VersionInfo>,
    #[serde(default)]
    pub total: usize,
    #[serde(default)]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Integrity {
    pub algorithm: String,
    pub hash: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct TarballInfo {
    pub url: String,
    pub integrity: Integrity,
    #[serde(default)]
    pub size_bytes: u64,
}

/// `GET tarballs/ver/<version id>`
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct TarballPage {
    #[serde(default)]
    pub tarballs: Vec<TarballInfo>,
    #[serde(default)]
    pub total: usize,
}

/// Registry operations used by the acquirer
pub trait RegistryApi: Send + Sync {
    fn package(&self, name: &str) -> Result<PackageInfo>;

    fn versions(&self, package_id: u64, limit: usize, offset: usize) -> Result<VersionPage>;

    fn tarballs(&self, version_id: u64, limit: usize, offset: usize) -> Result<TarballPage>;

    /// Stream the body at `url` into `out`, returning the number of bytes written
    fn download(&self, url: &str, out: &mut dyn Write) -> Result<u64>;

    /// Every version of a package, following pagination
    fn all_versions(&self, package_id: u64) -> Result<Vec<VersionInfo>> {
        let mut versions = Vec::new();
        loop {
            let page = self.versions(package_id, VERSION_PAGE_SIZE, versions.len())?;
            let fetched = page.versions.len();
            versions.extend(page.versions);
            if fetched == 0 || fetched < VERSION_PAGE_SIZE || versions.len() >= page.total {
                return Ok(versions);
            }
        }
    }
}

/// Pick the registry implementation for the configured base URI
pub fn registry_from_config(config: &GlobalConfig) -> Result<Box<dyn RegistryApi>> {
    let base = config.registry_base();
    if let Some(path) = base.strip_prefix("file://") {
        Ok(Box::new(DirectoryRegistry::new(path)))
    } else {
        Ok(Box::new(HttpRegistry::new(base, config.network_timeout())?))
    }
}

/// Registry served over HTTP(S)
pub struct HttpRegistry {
    base: String,
    client: reqwest::blocking::Client,
}

impl HttpRegistry {
    pub fn new(base: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("xel/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PackageError::Network(e.to_string()))?;
        let mut base = base.into();
        if !base.ends_with('/') {
            base.push('/');
        }
        Ok(Self { base, client })
    }

    fn get(&self, url: &str) -> Result<reqwest::blocking::Response> {
        tracing::debug!(url, "GET");
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| request_error(url, e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(PackageError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response)
    }

    fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let body = self
            .get(url)?
            .text()
            .map_err(|e| request_error(url, e))?;
        Ok(serde_json::from_str(&body)?)
    }
}

fn request_error(url: &str, error: reqwest::Error) -> PackageError {
    if error.is_timeout() {
        PackageError::Timeout {
            operation: format!("request to {}", url),
        }
    } else {
        PackageError::Network(format!("{}: {}", url, error))
    }
}

impl RegistryApi for HttpRegistry {
    fn package(&self, name: &str) -> Result<PackageInfo> {
        self.get_json(&format!("{}packages/name/{}", self.base, name))
    }

    fn versions(&self, package_id: u64, limit: usize, offset: usize) -> Result<VersionPage> {
        self.get_json(&format!(
            "{}versions/pkg/{}?limit={}&offset={}",
            self.base, package_id, limit, offset
        ))
    }

    fn tarballs(&self, version_id: u64, limit: usize, offset: usize) -> Result<TarballPage> {
        self.get_json(&format!(
            "{}tarballs/ver/{}?limit={}&offset={}",
            self.base, version_id, limit, offset
        ))
    }

    fn download(&self, url: &str, out: &mut dyn Write) -> Result<u64> {
        let mut response = self.get(url)?;
        response.copy_to(out).map_err(|e| request_error(url, e))
    }
}

/// Registry mirrored on disk.
///
/// `packages/name/<name>.json`, `versions/pkg/<id>.json` and
/// `tarballs/ver/<id>.json` hold the endpoint documents; pagination
/// parameters are ignored. Tarball URLs may be `file://` URLs or paths
/// relative to the mirror root.
pub struct DirectoryRegistry {
    root: PathBuf,
}

impl DirectoryRegistry {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn read_json<T: DeserializeOwned>(&self, relative: &str) -> Result<T> {
        let path = self.root.join(relative);
        tracing::debug!(path = %path.display(), "reading registry document");
        let content = std::fs::read_to_string(&path).map_err(|e| not_found(&path, e))?;
        Ok(serde_json::from_str(&content)?)
    }

    fn resolve_url(&self, url: &str) -> PathBuf {
        match url.strip_prefix("file://") {
            Some(path) => PathBuf::from(path),
            None => self.root.join(url),
        }
    }
}

fn not_found(path: &Path, error: io::Error) -> PackageError {
    if error.kind() == io::ErrorKind::NotFound {
        PackageError::HttpStatus {
            url: format!("file://{}", path.display()),
            status: 404,
        }
    } else {
        PackageError::Io(error)
    }
}

impl RegistryApi for DirectoryRegistry {
    fn package(&self, name: &str) -> Result<PackageInfo> {
        self.read_json(&format!("packages/name/{}.json", name))
    }

    fn versions(&self, package_id: u64, _limit: usize, offset: usize) -> Result<VersionPage> {
        if offset > 0 {
            return Ok(VersionPage {
                versions: Vec::new(),
                total: offset,
                limit: 0,
                offset,
            });
        }
        self.read_json(&format!("versions/pkg/{}.json", package_id))
    }

    fn tarballs(&self, version_id: u64, _limit: usize, _offset: usize) -> Result<TarballPage> {
        self.read_json(&format!("tarballs/ver/{}.json", version_id))
    }

    fn download(&self, url: &str, out: &mut dyn Write) -> Result<u64> {
        let path = self.resolve_url(url);
        let mut file = File::open(&path).map_err(|e| not_found(&path, e))?;
        Ok(io::copy(&mut file, out)?)
    }
}
