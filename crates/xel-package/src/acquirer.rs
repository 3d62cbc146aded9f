//! Package acquisition
//!
//! Fetches a package that is not installed locally. Sources are tried in
//! this order:
//!
//! 1. a lockfile pin: the pinned URL is downloaded again and verified
//!    against the pinned hash; the requested constraint is not consulted
//! 2. `git+<url>`: the highest acceptable release tag
//! 3. the registry: the highest version satisfying the constraint, whose
//!    tarball is verified, extracted and pinned in the lockfile
//!
//! Nothing unverified is ever left in the module path: the install
//! directory is removed whenever extraction or manifest validation fails.

use crate::compat::RuntimeVersions;
use crate::constraint::{parse_version, Constraint};
use crate::git::{acquire_git, GitBackend, GitCli, GIT_PREFIX};
use crate::integrity::{verify_file, HashAlgorithm};
use crate::layout::{install_dir, remove_dir_quietly};
use crate::lockfile::{LockedSource, Lockfile};
use crate::registry::{registry_from_config, RegistryApi, VersionInfo};
use crate::resolver::ResolvedPackage;
use crate::tarball::extract_tar_gz;
use crate::{read_manifest, PackageError, Result};
use semver::Version;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use xel_config::{GlobalConfig, ProjectManifest, MANIFEST_FILE};

/// Where an acquired package came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquisitionSource {
    Locked,
    Git,
    Registry,
}

/// A freshly installed package
#[derive(Debug, Clone)]
pub struct Acquired {
    pub name: String,
    pub version: Version,
    pub manifest_path: PathBuf,
    pub manifest: Arc<ProjectManifest>,
    pub source: AcquisitionSource,
}

impl Acquired {
    pub fn into_resolved(self) -> ResolvedPackage {
        ResolvedPackage {
            name: self.name,
            version: self.version,
            manifest_path: self.manifest_path,
            manifest: self.manifest,
        }
    }
}

/// Fetches packages into the first module path
pub struct PackageAcquirer {
    module_path: PathBuf,
    registry: Box<dyn RegistryApi>,
    git: Box<dyn GitBackend>,
    versions: RuntimeVersions,
}

impl PackageAcquirer {
    pub fn new(
        module_path: impl Into<PathBuf>,
        registry: Box<dyn RegistryApi>,
        git: Box<dyn GitBackend>,
        versions: RuntimeVersions,
    ) -> Self {
        Self {
            module_path: module_path.into(),
            registry,
            git,
            versions,
        }
    }

    /// Acquirer using the configured registry and the `git` executable
    pub fn from_config(config: &GlobalConfig, versions: RuntimeVersions) -> Result<Self> {
        Ok(Self::new(
            config.install_root()?,
            registry_from_config(config)?,
            Box::new(GitCli::new(config.network_timeout())),
            versions,
        ))
    }

    pub fn module_path(&self) -> &Path {
        &self.module_path
    }

    pub fn runtime_versions(&self) -> &RuntimeVersions {
        &self.versions
    }

    /// Fetch `name`, pinning registry packages in `lockfile`
    pub fn acquire(&self, name: &str, constraint: &str, lockfile: &mut Lockfile) -> Result<Acquired> {
        if let Some(pin) = lockfile.get(name).cloned() {
            tracing::debug!(name, version = %pin.version, "re-acquiring pinned package");
            return self.acquire_locked(name, &pin);
        }

        let parsed = Constraint::parse(constraint)?;
        if let Some(url) = name.strip_prefix(GIT_PREFIX) {
            let package = acquire_git(
                self.git.as_ref(),
                url,
                &parsed,
                &self.module_path,
                &self.versions,
            )?;
            return Ok(Acquired {
                name: name.to_string(),
                version: package.version,
                manifest_path: package.manifest_path,
                manifest: Arc::new(package.manifest),
                source: AcquisitionSource::Git,
            });
        }

        let (acquired, pin) = self.acquire_registry(name, &parsed)?;
        lockfile.set(name, pin);
        Ok(acquired)
    }

    fn acquire_locked(&self, name: &str, pin: &LockedSource) -> Result<Acquired> {
        let version = parse_version(&pin.version)?;
        let (manifest_path, manifest) =
            self.install_tarball(name, &pin.version, &pin.url, &pin.algorithm, &pin.hash)?;
        Ok(Acquired {
            name: name.to_string(),
            version,
            manifest_path,
            manifest: Arc::new(manifest),
            source: AcquisitionSource::Locked,
        })
    }

    fn acquire_registry(&self, name: &str, constraint: &Constraint) -> Result<(Acquired, LockedSource)> {
        let package = self.registry.package(name)?;
        if package.is_deprecated {
            tracing::warn!(name, reason = %package.deprecated_reason, "package is deprecated");
        }

        let mut versions = self.registry.all_versions(package.id)?;
        versions.sort_by(|a, b| b.semver.cmp(&a.semver));
        let (version, info) = highest_matching(&versions, constraint).ok_or_else(|| {
            PackageError::NoSatisfyingVersion {
                name: name.to_string(),
                constraint: constraint.to_string(),
            }
        })?;

        let tarball = self
            .registry
            .tarballs(info.id, 1, 0)?
            .tarballs
            .into_iter()
            .next()
            .ok_or_else(|| PackageError::NoTarball {
                name: name.to_string(),
                version: info.version.clone(),
            })?;

        let (manifest_path, manifest) = self.install_tarball(
            name,
            &info.version,
            &tarball.url,
            &tarball.integrity.algorithm,
            &tarball.integrity.hash,
        )?;
        tracing::info!(name, version = %version, "installed package from registry");

        let pin = LockedSource {
            algorithm: tarball.integrity.algorithm,
            hash: tarball.integrity.hash,
            url: tarball.url,
            version: info.version.clone(),
        };
        let acquired = Acquired {
            name: name.to_string(),
            version,
            manifest_path,
            manifest: Arc::new(manifest),
            source: AcquisitionSource::Registry,
        };
        Ok((acquired, pin))
    }

    /// Download, verify and extract a tarball into the install directory of
    /// `name@version`, replacing any previous contents
    pub fn install_tarball(
        &self,
        name: &str,
        version: &str,
        url: &str,
        algorithm: &str,
        hash: &str,
    ) -> Result<(PathBuf, ProjectManifest)> {
        algorithm.parse::<HashAlgorithm>()?;

        let temp = tempfile::Builder::new().prefix("xel-module-").tempdir()?;
        let archive = temp.path().join("tarball.tar.gz");
        let written = {
            let mut file = File::create(&archive)?;
            let written = self.registry.download(url, &mut file)?;
            file.flush()?;
            written
        };
        if written == 0 {
            return Err(PackageError::EmptyTarball);
        }
        verify_file(&archive, algorithm, hash)?;

        let dest = install_dir(&self.module_path, name, version);
        if dest.exists() {
            fs::remove_dir_all(&dest)?;
        }
        fs::create_dir_all(&dest)?;

        let result = extract_tar_gz(&archive, &dest).and_then(|()| {
            let manifest_path = dest.join(MANIFEST_FILE);
            let manifest = read_manifest(&manifest_path)?;
            // The directory is named after `version`; the catalog trusts only matching manifests.
            if parse_version(&manifest.version)? != parse_version(version)? {
                return Err(PackageError::VersionSpoof {
                    tag: version.to_string(),
                    manifest: manifest.version,
                });
            }
            Ok((manifest_path, manifest))
        });
        if result.is_err() {
            remove_dir_quietly(&dest);
        }
        result
    }
}

fn highest_matching<'a>(
    versions: &'a [VersionInfo],
    constraint: &Constraint,
) -> Option<(Version, &'a VersionInfo)> {
    versions.iter().find_map(|info| match parse_version(&info.version) {
        Ok(version) if constraint.matches(&version) => Some((version, info)),
        Ok(_) => None,
        Err(err) => {
            tracing::warn!(version = %info.version, error = %err, "ignoring unparsable registry version");
            None
        }
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::git::tests::FakeGit;
    use crate::integrity::HashAlgorithm;
    use crate::layout::package_dir;
    use crate::registry::{Integrity, PackageInfo, SemverTriplet, TarballInfo, TarballPage, VersionPage};
    use crate::tarball::tests::build_tarball;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// In-memory registry serving one tarball per published version
    #[derive(Default)]
    pub(crate) struct FakeRegistry {
        packages: HashMap<String, u64>,
        versions: HashMap<u64, Vec<VersionInfo>>,
        tarballs: HashMap<u64, TarballInfo>,
        files: HashMap<String, Vec<u8>>,
        pub requests: Mutex<Vec<String>>,
    }

    impl FakeRegistry {
        /// Publish `name@version` with the given archive bytes and advertised sha256
        pub(crate) fn publish_with_hash(&mut self, name: &str, version: &str, bytes: Vec<u8>, hash: String) {
            let next_id = self.packages.len() as u64 + 1;
            let package_id = *self.packages.entry(name.to_string()).or_insert(next_id);
            let parsed = parse_version(version).unwrap();
            let version_id = package_id * 1000 + self.tarballs.len() as u64;
            let url = format!("https://cdn.test/{}-{}.tar.gz", name, version);

            self.versions.entry(package_id).or_default().push(VersionInfo {
                id: version_id,
                semver: SemverTriplet {
                    major: parsed.major,
                    minor: parsed.minor,
                    patch: parsed.patch,
                },
                version: version.to_string(),
                xel: String::new(),
                engine: String::new(),
            });
            self.tarballs.insert(
                version_id,
                TarballInfo {
                    url: url.clone(),
                    integrity: Integrity {
                        algorithm: "sha256".to_string(),
                        hash,
                    },
                    size_bytes: bytes.len() as u64,
                },
            );
            self.files.insert(url, bytes);
        }

        /// Publish a package whose manifest declares `deps`
        pub(crate) fn publish(&mut self, name: &str, version: &str, deps: &[(&str, &str)]) {
            let deps: HashMap<&str, &str> = deps.iter().copied().collect();
            let manifest = serde_json::json!({
                "name": name,
                "version": version,
                "main": "lib.xel",
                "deps": deps,
            })
            .to_string();
            let bytes = build_tarball(&[("xel.json", &manifest), ("lib.xel", name)]);
            let hash = HashAlgorithm::Sha256.digest_bytes(&bytes);
            self.publish_with_hash(name, version, bytes, hash);
        }

        pub(crate) fn requests(&self) -> Vec<String> {
            self.requests.lock().unwrap().clone()
        }

        fn record(&self, request: String) {
            self.requests.lock().unwrap().push(request);
        }
    }

    impl RegistryApi for FakeRegistry {
        fn package(&self, name: &str) -> Result<PackageInfo> {
            self.record(format!("package {}", name));
            let id = *self.packages.get(name).ok_or_else(|| PackageError::HttpStatus {
                url: name.to_string(),
                status: 404,
            })?;
            Ok(PackageInfo {
                id,
                name: name.to_string(),
                description: String::new(),
                author: String::new(),
                is_deprecated: false,
                deprecated_reason: String::new(),
            })
        }

        fn versions(&self, package_id: u64, limit: usize, offset: usize) -> Result<VersionPage> {
            let all = self.versions.get(&package_id).cloned().unwrap_or_default();
            let total = all.len();
            Ok(VersionPage {
                versions: all.into_iter().skip(offset).take(limit).collect(),
                total,
                limit,
                offset,
            })
        }

        fn tarballs(&self, version_id: u64, _limit: usize, _offset: usize) -> Result<TarballPage> {
            Ok(TarballPage {
                tarballs: self.tarballs.get(&version_id).cloned().into_iter().collect(),
                total: 1,
            })
        }

        fn download(&self, url: &str, out: &mut dyn Write) -> Result<u64> {
            self.record(format!("download {}", url));
            let bytes = self.files.get(url).ok_or_else(|| PackageError::HttpStatus {
                url: url.to_string(),
                status: 404,
            })?;
            out.write_all(bytes)?;
            Ok(bytes.len() as u64)
        }
    }

    fn acquirer(module_path: &Path, registry: FakeRegistry) -> PackageAcquirer {
        PackageAcquirer::new(
            module_path,
            Box::new(registry),
            Box::new(FakeGit::new(&[])),
            RuntimeVersions::development(),
        )
    }

    #[test]
    fn test_registry_picks_highest_match_and_pins_it() {
        let temp = TempDir::new().unwrap();
        let mut registry = FakeRegistry::default();
        registry.publish("foo", "1.0.0", &[]);
        registry.publish("foo", "1.2.0", &[]);
        registry.publish("foo", "2.0.0", &[]);

        let acquirer = acquirer(temp.path(), registry);
        let mut lockfile = Lockfile::new();
        let acquired = acquirer.acquire("foo", "^1.0.0", &mut lockfile).unwrap();

        assert_eq!(acquired.version, Version::new(1, 2, 0));
        assert_eq!(acquired.source, AcquisitionSource::Registry);
        assert_eq!(acquired.manifest_path, install_dir(temp.path(), "foo", "1.2.0").join(MANIFEST_FILE));

        let pin = lockfile.get("foo").unwrap();
        assert_eq!(pin.version, "1.2.0");
        assert_eq!(pin.url, "https://cdn.test/foo-1.2.0.tar.gz");
        assert_eq!(pin.algorithm, "sha256");
    }

    #[test]
    fn test_hash_mismatch_leaves_nothing_behind() {
        let temp = TempDir::new().unwrap();
        let mut registry = FakeRegistry::default();
        let bytes = build_tarball(&[("xel.json", r#"{"name": "foo", "version": "1.0.0"}"#)]);
        registry.publish_with_hash("foo", "1.0.0", bytes, "abc123".to_string());

        let acquirer = acquirer(temp.path(), registry);
        let mut lockfile = Lockfile::new();
        let err = acquirer.acquire("foo", "*", &mut lockfile).unwrap_err();

        assert!(matches!(err, PackageError::IntegrityMismatch { ref expected, .. } if expected == "abc123"));
        assert!(!package_dir(temp.path(), "foo").exists());
        assert!(lockfile.is_empty());
    }

    #[test]
    fn test_empty_tarball_rejected() {
        let temp = TempDir::new().unwrap();
        let mut registry = FakeRegistry::default();
        let hash = HashAlgorithm::Sha256.digest_bytes(b"");
        registry.publish_with_hash("foo", "1.0.0", Vec::new(), hash);

        let err = acquirer(temp.path(), registry)
            .acquire("foo", "*", &mut Lockfile::new())
            .unwrap_err();
        assert!(matches!(err, PackageError::EmptyTarball));
    }

    #[test]
    fn test_tarball_without_manifest_is_removed() {
        let temp = TempDir::new().unwrap();
        let mut registry = FakeRegistry::default();
        let bytes = build_tarball(&[("lib.xel", "1")]);
        let hash = HashAlgorithm::Sha256.digest_bytes(&bytes);
        registry.publish_with_hash("foo", "1.0.0", bytes, hash);

        let err = acquirer(temp.path(), registry)
            .acquire("foo", "*", &mut Lockfile::new())
            .unwrap_err();
        assert!(matches!(err, PackageError::ManifestNotFound(_)));
        assert!(!install_dir(temp.path(), "foo", "1.0.0").exists());
    }

    #[test]
    fn test_tarball_with_other_version_is_rejected() {
        let temp = TempDir::new().unwrap();
        let mut registry = FakeRegistry::default();
        let bytes = build_tarball(&[("xel.json", r#"{"name": "foo", "version": "9.9.9"}"#)]);
        let hash = HashAlgorithm::Sha256.digest_bytes(&bytes);
        registry.publish_with_hash("foo", "1.0.0", bytes, hash);

        let mut lockfile = Lockfile::new();
        let err = acquirer(temp.path(), registry)
            .acquire("foo", "*", &mut lockfile)
            .unwrap_err();
        assert!(matches!(
            err,
            PackageError::VersionSpoof { ref tag, ref manifest } if tag == "1.0.0" && manifest == "9.9.9"
        ));
        assert!(!install_dir(temp.path(), "foo", "1.0.0").exists());
        assert!(lockfile.is_empty());
    }

    #[test]
    fn test_pinned_package_ignores_requested_constraint() {
        let temp = TempDir::new().unwrap();
        let mut registry = FakeRegistry::default();
        registry.publish("foo", "1.0.0", &[]);
        registry.publish("foo", "2.0.0", &[]);

        let acquirer = acquirer(temp.path(), registry);
        let mut lockfile = Lockfile::new();
        acquirer.acquire("foo", "1.0.0", &mut lockfile).unwrap();
        let pinned = lockfile.clone();

        let again = acquirer.acquire("foo", "^2.0.0", &mut lockfile).unwrap();
        assert_eq!(again.version, Version::new(1, 0, 0));
        assert_eq!(again.source, AcquisitionSource::Locked);
        assert_eq!(lockfile, pinned);
    }

    #[test]
    fn test_pinned_download_verified_against_pin() {
        let temp = TempDir::new().unwrap();
        let mut registry = FakeRegistry::default();
        registry.publish("foo", "1.0.0", &[]);

        let acquirer = acquirer(temp.path(), registry);
        let mut lockfile = Lockfile::new();
        lockfile.set(
            "foo",
            LockedSource {
                algorithm: "sha256".to_string(),
                hash: "0".repeat(64),
                url: "https://cdn.test/foo-1.0.0.tar.gz".to_string(),
                version: "1.0.0".to_string(),
            },
        );

        let err = acquirer.acquire("foo", "*", &mut lockfile).unwrap_err();
        assert!(matches!(err, PackageError::IntegrityMismatch { .. }));
    }

    #[test]
    fn test_git_source_is_not_pinned() {
        let temp = TempDir::new().unwrap();
        let acquirer = PackageAcquirer::new(
            temp.path(),
            Box::new(FakeRegistry::default()),
            Box::new(FakeGit::new(&[(
                "v0.3.0",
                r#"{"name": "remote", "version": "0.3.0", "main": "lib.xel"}"#,
            )])),
            RuntimeVersions::development(),
        );

        let mut lockfile = Lockfile::new();
        let acquired = acquirer
            .acquire("git+https://example.com/remote.git", "*", &mut lockfile)
            .unwrap();
        assert_eq!(acquired.source, AcquisitionSource::Git);
        assert_eq!(acquired.manifest.name, "remote");
        assert!(lockfile.is_empty());
    }

    #[test]
    fn test_unknown_package() {
        let temp = TempDir::new().unwrap();
        let err = acquirer(temp.path(), FakeRegistry::default())
            .acquire("nope", "*", &mut Lockfile::new())
            .unwrap_err();
        assert!(matches!(err, PackageError::HttpStatus { status: 404, .. }));
    }
}
