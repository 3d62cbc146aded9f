//! Git package sources (`git+<url>`)
//!
//! Tags named `v<semver>` are release candidates. Each candidate satisfying
//! the constraint is cloned into the module path and accepted only if its
//! manifest declares exactly the tag's version and the running runtime and
//! engine satisfy its requirements.

use crate::compat::RuntimeVersions;
use crate::constraint::{parse_version, Constraint};
use crate::layout::{install_dir, remove_dir_quietly};
use crate::{read_manifest, PackageError, Result};
use semver::Version;
use std::ffi::OsStr;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use xel_config::{ProjectManifest, MANIFEST_FILE};

/// Prefix marking a git package source
pub const GIT_PREFIX: &str = "git+";

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Git operations needed to fetch a package
pub trait GitBackend: Send + Sync {
    /// Every tag of the repository at `url`
    fn list_tags(&self, url: &str) -> Result<Vec<String>>;

    /// Shallow clone of a single tag into `dest`
    fn clone_tag(&self, url: &str, tag: &str, dest: &Path) -> Result<()>;
}

/// [`GitBackend`] driving the `git` executable, with every invocation killed
/// after a timeout
#[derive(Debug, Clone)]
pub struct GitCli {
    program: PathBuf,
    timeout: Duration,
}

impl GitCli {
    pub fn new(timeout: Duration) -> Self {
        Self {
            program: PathBuf::from("git"),
            timeout,
        }
    }

    /// Use a specific git executable
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    fn run<S: AsRef<OsStr>>(&self, args: &[S]) -> Result<String> {
        let shown = args
            .iter()
            .map(|a| a.as_ref().to_string_lossy())
            .collect::<Vec<_>>()
            .join(" ");
        tracing::debug!(args = %shown, "running git");

        let mut child = Command::new(&self.program)
            .args(args)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| PackageError::Git {
                args: shown.clone(),
                stderr: e.to_string(),
            })?;

        // Drain both pipes on their own threads so a chatty child cannot block.
        let stdout = child.stdout.take().map(drain);
        let stderr = child.stderr.take().map(drain);

        let deadline = Instant::now() + self.timeout;
        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if Instant::now() >= deadline {
                let _ = child.kill();
                let _ = child.wait();
                return Err(PackageError::Timeout {
                    operation: format!("git {}", shown),
                });
            }
            thread::sleep(POLL_INTERVAL);
        };

        let stdout = stdout.map(join_output).unwrap_or_default();
        let stderr = stderr.map(join_output).unwrap_or_default();
        if !status.success() {
            return Err(PackageError::Git {
                args: shown,
                stderr: stderr.trim().to_string(),
            });
        }
        Ok(stdout)
    }
}

fn drain<R: Read + Send + 'static>(mut pipe: R) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut buffer = Vec::new();
        let _ = pipe.read_to_end(&mut buffer);
        String::from_utf8_lossy(&buffer).into_owned()
    })
}

fn join_output(handle: thread::JoinHandle<String>) -> String {
    handle.join().unwrap_or_default()
}

impl GitBackend for GitCli {
    fn list_tags(&self, url: &str) -> Result<Vec<String>> {
        let temp = tempfile::Builder::new().prefix("xel-module-").tempdir()?;
        let repo = temp.path().as_os_str();

        self.run(&[
            OsStr::new("clone"),
            OsStr::new("--quiet"),
            OsStr::new("--depth"),
            OsStr::new("1"),
            OsStr::new("--no-checkout"),
            OsStr::new(url),
            repo,
        ])?;
        self.run(&[
            OsStr::new("-C"),
            repo,
            OsStr::new("fetch"),
            OsStr::new("--quiet"),
            OsStr::new("--depth"),
            OsStr::new("1"),
            OsStr::new("--tags"),
            OsStr::new("origin"),
        ])?;
        let listing = self.run(&[OsStr::new("-C"), repo, OsStr::new("tag"), OsStr::new("--list")])?;

        Ok(listing
            .lines()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect())
    }

    fn clone_tag(&self, url: &str, tag: &str, dest: &Path) -> Result<()> {
        self.run(&[
            OsStr::new("clone"),
            OsStr::new("--quiet"),
            OsStr::new("--depth"),
            OsStr::new("1"),
            OsStr::new("--single-branch"),
            OsStr::new("--no-tags"),
            OsStr::new("--branch"),
            OsStr::new(tag),
            OsStr::new(url),
            dest.as_os_str(),
        ])?;
        Ok(())
    }
}

/// A git package accepted by [`acquire_git`]
#[derive(Debug)]
pub(crate) struct GitPackage {
    pub version: Version,
    pub manifest_path: PathBuf,
    pub manifest: ProjectManifest,
}

/// Release tags (`v<semver>`), highest first
pub(crate) fn release_tags(tags: &[String]) -> Vec<(Version, String)> {
    let mut releases: Vec<(Version, String)> = tags
        .iter()
        .filter_map(|tag| {
            let rest = tag.strip_prefix('v')?;
            match parse_version(rest) {
                Ok(version) => Some((version, tag.clone())),
                Err(_) => {
                    tracing::debug!(tag = %tag, "ignoring non-semver tag");
                    None
                }
            }
        })
        .collect();
    releases.sort_by(|a, b| b.0.cmp(&a.0));
    releases.dedup_by(|a, b| a.0 == b.0);
    releases
}

/// Fetch the highest acceptable release of the repository at `url`
pub(crate) fn acquire_git(
    backend: &dyn GitBackend,
    url: &str,
    constraint: &Constraint,
    module_path: &Path,
    versions: &RuntimeVersions,
) -> Result<GitPackage> {
    let releases = release_tags(&backend.list_tags(url)?);
    if releases.is_empty() {
        return Err(PackageError::NoSemverTags(url.to_string()));
    }

    for (version, tag) in releases.iter().filter(|(v, _)| constraint.matches(v)) {
        let dest = install_dir(module_path, url, &version.to_string());
        if dest.exists() {
            remove_dir_quietly(&dest);
        }
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }

        match accept_candidate(backend, url, tag, version, &dest, versions) {
            Ok(package) => {
                tracing::info!(url, version = %version, "fetched git package");
                return Ok(package);
            }
            Err(err) => {
                tracing::warn!(url, tag = %tag, error = %err, "skipping release candidate");
                remove_dir_quietly(&dest);
            }
        }
    }

    Err(PackageError::NoSatisfyingVersion {
        name: format!("{}{}", GIT_PREFIX, url),
        constraint: constraint.to_string(),
    })
}

fn accept_candidate(
    backend: &dyn GitBackend,
    url: &str,
    tag: &str,
    version: &Version,
    dest: &Path,
    versions: &RuntimeVersions,
) -> Result<GitPackage> {
    backend.clone_tag(url, tag, dest)?;

    let manifest_path = dest.join(MANIFEST_FILE);
    let manifest = read_manifest(&manifest_path)?;
    if manifest.version != version.to_string() {
        return Err(PackageError::VersionSpoof {
            tag: version.to_string(),
            manifest: manifest.version,
        });
    }
    versions.check(&manifest)?;

    Ok(GitPackage {
        version: version.clone(),
        manifest_path,
        manifest,
    })
}
