//! Configuration loading and manifest discovery tests

use pretty_assertions::assert_eq;
use rstest::rstest;
use std::fs;
use std::path::Path;
use tempfile::TempDir;
use xel_config::{ConfigLoader, GlobalConfig, ManifestLocator, ProjectManifest, MANIFEST_FILE};

fn create_manifest(dir: &Path, content: &str) -> std::path::PathBuf {
    let manifest_path = dir.join(MANIFEST_FILE);
    fs::write(&manifest_path, content).unwrap();
    manifest_path
}

// ============================================================================
// Global Config Tests
// ============================================================================

#[test]
fn test_default_config_round_trips_through_disk() {
    let temp_dir = TempDir::new().unwrap();
    let loader = ConfigLoader::with_home(temp_dir.path());

    let first = loader.load().unwrap();
    let second = loader.load().unwrap();
    assert_eq!(first, second);

    let on_disk = GlobalConfig::load_from_file(&loader.config_path().unwrap()).unwrap();
    assert_eq!(on_disk, first);
}

#[test]
fn test_config_written_with_pascal_case_keys() {
    let temp_dir = TempDir::new().unwrap();
    ConfigLoader::with_home(temp_dir.path()).load().unwrap();

    let raw = fs::read_to_string(temp_dir.path().join("config.json")).unwrap();
    for key in [
        "DefaultTemplate",
        "ModulePaths",
        "PackageRegistryURI",
        "AllowInstallScripts",
    ] {
        assert!(raw.contains(key), "missing key {key} in {raw}");
    }
}

#[test]
fn test_empty_module_paths_rejected() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(
        temp_dir.path().join("config.json"),
        r#"{"ModulePaths": []}"#,
    )
    .unwrap();

    assert!(ConfigLoader::with_home(temp_dir.path()).load().is_err());
}

#[test]
fn test_ensure_home_layout_creates_templates_dir() {
    let temp_dir = TempDir::new().unwrap();
    let home = temp_dir.path().join("xel-home");

    let created = ConfigLoader::with_home(&home).ensure_home_layout().unwrap();
    assert_eq!(created, home);
    assert!(home.join("templates").is_dir());
}

// ============================================================================
// Manifest Discovery Tests
// ============================================================================

#[rstest]
#[case("")]
#[case("src")]
#[case("src/lib/nested")]
fn test_locate_from_any_depth(#[case] relative: &str) {
    let temp_dir = TempDir::new().unwrap();
    create_manifest(
        temp_dir.path(),
        r#"{"name": "parent-project", "version": "1.0.0", "main": "main.xel"}"#,
    );
    let start = temp_dir.path().join(relative);
    fs::create_dir_all(&start).unwrap();

    let locator = ManifestLocator::new();
    let found = locator.locate_from(&start).unwrap().unwrap();
    assert_eq!(found.manifest.name, "parent-project");
    assert_eq!(found.root(), temp_dir.path());
}

#[test]
fn test_nearest_manifest_wins() {
    let temp_dir = TempDir::new().unwrap();
    create_manifest(temp_dir.path(), r#"{"name": "outer"}"#);
    let inner = temp_dir.path().join("packages/inner");
    fs::create_dir_all(&inner).unwrap();
    create_manifest(&inner, r#"{"name": "inner"}"#);

    let locator = ManifestLocator::new();
    assert_eq!(
        locator.locate_from(&inner).unwrap().unwrap().manifest.name,
        "inner"
    );
    assert_eq!(
        locator
            .locate_from(temp_dir.path())
            .unwrap()
            .unwrap()
            .manifest
            .name,
        "outer"
    );
}

#[test]
fn test_invalidate_picks_up_rewritten_manifest() {
    let temp_dir = TempDir::new().unwrap();
    let path = create_manifest(temp_dir.path(), r#"{"name": "app"}"#);

    let locator = ManifestLocator::new();
    let found = locator.locate_from(temp_dir.path()).unwrap().unwrap();
    assert!(found.manifest.deps.is_none());

    let mut manifest = ProjectManifest::from_file(&path).unwrap();
    manifest.set_dependency("http", "^1.0.0");
    manifest.write_to_file(&path).unwrap();
    locator.invalidate(temp_dir.path());

    let found = locator.locate_from(temp_dir.path()).unwrap().unwrap();
    assert_eq!(found.manifest.dependency("http"), Some("^1.0.0"));
}
