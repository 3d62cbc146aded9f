use flate2::write::GzEncoder;
use flate2::Compression;
use semver::Version;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use xel_package::{
    layout, lockfile_path_for, DirectoryRegistry, GitCli, Lockfile, PackageAcquirer, PackageError,
    PackageManager, PackageSpec, RuntimeVersions, VersionCatalog, VersionResolver,
};

/// On-disk registry mirror served through `DirectoryRegistry`
struct Mirror {
    root: PathBuf,
    next_version_id: u64,
    packages: Vec<(String, u64, Vec<serde_json::Value>)>,
}

impl Mirror {
    fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            next_version_id: 100,
            packages: Vec::new(),
        }
    }

    fn publish(&mut self, name: &str, version: &str, deps: &[(&str, &str)]) {
        let deps: serde_json::Map<String, serde_json::Value> = deps
            .iter()
            .map(|(n, c)| (n.to_string(), serde_json::Value::from(*c)))
            .collect();
        let manifest = serde_json::json!({
            "name": name,
            "version": version,
            "main": "main.xel",
            "deps": deps,
        });
        let bytes = tarball(&[
            ("xel.json", &manifest.to_string()),
            ("main.xel", &format!("// {}", name)),
        ]);

        let version_id = self.next_version_id;
        self.next_version_id += 1;
        let file = format!("files/{}-{}.tar.gz", name, version);
        fs::create_dir_all(self.root.join("files")).unwrap();
        fs::write(self.root.join(&file), &bytes).unwrap();

        let hash: String = Sha256::digest(&bytes).iter().map(|b| format!("{:02x}", b)).collect();
        write_json(
            &self.root.join(format!("tarballs/ver/{}.json", version_id)),
            serde_json::json!({
                "tarballs": [{"url": file, "integrity": {"algorithm": "sha256", "hash": hash}}],
                "total": 1
            }),
        );

        let parsed = Version::parse(version).unwrap();
        let entry = serde_json::json!({
            "id": version_id,
            "semver": {"major": parsed.major, "minor": parsed.minor, "patch": parsed.patch},
            "version": version,
        });
        let package_id = self.packages.len() as u64 + 1;
        match self.packages.iter_mut().find(|(n, _, _)| n == name) {
            Some((_, _, versions)) => versions.push(entry),
            None => self.packages.push((name.to_string(), package_id, vec![entry])),
        }
        self.write_indexes();
    }

    fn write_indexes(&self) {
        for (name, id, versions) in &self.packages {
            write_json(
                &self.root.join(format!("packages/name/{}.json", name)),
                serde_json::json!({"id": id, "name": name}),
            );
            write_json(
                &self.root.join(format!("versions/pkg/{}.json", id)),
                serde_json::json!({"versions": versions, "total": versions.len()}),
            );
        }
    }
}

fn write_json(path: &Path, value: serde_json::Value) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, value.to_string()).unwrap();
}

fn tarball(files: &[(&str, &str)]) -> Vec<u8> {
    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
    for (path, contents) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(0o644);
        builder.append_data(&mut header, path, contents.as_bytes()).unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}

fn manager(modules: &Path, mirror: &Path) -> PackageManager {
    let acquirer = PackageAcquirer::new(
        modules,
        Box::new(DirectoryRegistry::new(mirror)),
        Box::new(GitCli::new(std::time::Duration::from_secs(5))),
        RuntimeVersions::development(),
    );
    PackageManager::new(
        VersionResolver::new(VersionCatalog::new(vec![modules.to_path_buf()])),
        acquirer,
    )
}

mod registry_installs {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_add_then_resolve_locally() {
        let temp = TempDir::new().unwrap();
        let modules = temp.path().join("modules");
        let mut mirror = Mirror::new(&temp.path().join("mirror"));
        mirror.publish("colors", "1.0.0", &[]);
        mirror.publish("colors", "1.4.2", &[]);
        mirror.publish("colors", "2.0.0", &[]);

        let manager = manager(&modules, &mirror.root);
        let lock = temp.path().join("xel.lock");
        let mut session = manager.session();
        let outcome = session
            .add(&PackageSpec::parse("colors@^1.0.0").unwrap(), Some(&lock), None)
            .unwrap();
        session.finish().unwrap();

        assert_eq!(outcome.version, Version::new(1, 4, 2));
        let resolved = manager.resolver().resolve("colors", "^1.0.0").unwrap();
        assert_eq!(resolved.manifest_path, outcome.manifest_path);
        assert_eq!(
            fs::read_to_string(resolved.entry_point()).unwrap(),
            "// colors"
        );

        let pins = Lockfile::load(&lock).unwrap();
        let pin = pins.get("colors").unwrap();
        assert_eq!(pin.version, "1.4.2");
        assert_eq!(pin.url, "files/colors-1.4.2.tar.gz");
    }

    #[test]
    fn test_locked_version_survives_newer_release() {
        let temp = TempDir::new().unwrap();
        let modules = temp.path().join("modules");
        let mut mirror = Mirror::new(&temp.path().join("mirror"));
        mirror.publish("colors", "1.0.0", &[]);

        let lock = temp.path().join("xel.lock");
        manager(&modules, &mirror.root)
            .ensure("colors", "*", &lock)
            .unwrap();

        // Wipe the install and publish something newer; the pin still wins.
        fs::remove_dir_all(&modules).unwrap();
        mirror.publish("colors", "1.1.0", &[]);
        let resolved = manager(&modules, &mirror.root)
            .ensure("colors", "*", &lock)
            .unwrap();
        assert_eq!(resolved.version, Version::new(1, 0, 0));
    }

    #[test]
    fn test_transitive_lockfiles_are_per_package() {
        let temp = TempDir::new().unwrap();
        let modules = temp.path().join("modules");
        let mut mirror = Mirror::new(&temp.path().join("mirror"));
        mirror.publish("web", "0.3.0", &[("http", "~1.2.0")]);
        mirror.publish("http", "1.2.5", &[("bytes", "*")]);
        mirror.publish("http", "1.3.0", &[]);
        mirror.publish("bytes", "0.9.0", &[]);

        let manager = manager(&modules, &mirror.root);
        let lock = temp.path().join("xel.lock");
        let mut session = manager.session();
        let outcome = session
            .add(&PackageSpec::parse("web").unwrap(), Some(&lock), None)
            .unwrap();
        session.finish().unwrap();

        let http = &outcome.dependencies[0];
        assert_eq!(http.version, Version::new(1, 2, 5));
        assert_eq!(http.dependencies[0].name, "bytes");

        let web_lock = lockfile_path_for(&outcome.manifest_path);
        let http_lock = lockfile_path_for(&http.manifest_path);
        assert_eq!(Lockfile::load(&web_lock).unwrap().get("http").unwrap().version, "1.2.5");
        assert_eq!(Lockfile::load(&http_lock).unwrap().get("bytes").unwrap().version, "0.9.0");
        assert_eq!(Lockfile::load(&lock).unwrap().len(), 1);
    }

    #[test]
    fn test_unsatisfiable_constraint() {
        let temp = TempDir::new().unwrap();
        let mut mirror = Mirror::new(&temp.path().join("mirror"));
        mirror.publish("colors", "1.0.0", &[]);

        let err = manager(&temp.path().join("modules"), &mirror.root)
            .ensure("colors", "^3.0.0", &temp.path().join("xel.lock"))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Cannot resolve any module named `colors` with version constraint `^3.0.0`"
        );
    }
}

mod tampering {
    use super::*;

    #[test]
    fn test_tampered_tarball_is_rejected() {
        let temp = TempDir::new().unwrap();
        let modules = temp.path().join("modules");
        let mut mirror = Mirror::new(&temp.path().join("mirror"));
        mirror.publish("colors", "1.0.0", &[]);
        let archive = mirror.root.join("files/colors-1.0.0.tar.gz");
        let mut bytes = fs::read(&archive).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        fs::write(&archive, bytes).unwrap();

        let err = manager(&modules, &mirror.root)
            .ensure("colors", "*", &temp.path().join("xel.lock"))
            .unwrap_err();
        assert!(matches!(err, PackageError::IntegrityMismatch { .. }));
        assert!(!layout::install_dir(&modules, "colors", "1.0.0").exists());
    }
}
