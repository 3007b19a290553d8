//! Locating optional sample files.
//!
//! Real CMI scenes are large, so they live outside the repository. Tests
//! look for them in `TEST_DATA_DIR` first, then in the `testdata/`
//! directories of the crates that read them.

use std::path::PathBuf;

/// Workspace root, two levels above this crate's manifest.
pub fn workspace_root() -> PathBuf {
    let manifest_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    manifest_dir
        .ancestors()
        .nth(2)
        .map(|p| p.to_path_buf())
        .unwrap_or(manifest_dir)
}

/// Directories searched by [`find_test_file`], in order.
pub fn testdata_dirs() -> Vec<PathBuf> {
    let root = workspace_root();
    let mut dirs: Vec<PathBuf> = std::env::var_os("TEST_DATA_DIR").map(PathBuf::from).into_iter().collect();
    dirs.extend([
        root.join("crates/netcdf-parser/testdata"),
        root.join("services/compositor/testdata"),
        root.join("testdata"),
    ]);
    dirs
}

/// First existing `name` in the test data directories.
pub fn find_test_file(name: &str) -> Option<PathBuf> {
    testdata_dirs()
        .into_iter()
        .map(|dir| dir.join(name))
        .find(|path| path.exists())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workspace_root_holds_manifest() {
        assert!(workspace_root().join("Cargo.toml").exists());
        assert!(workspace_root().join("crates/test-utils").is_dir());
    }

    #[test]
    fn test_missing_file_is_none() {
        assert!(find_test_file("no-such-scene-9f3a.nc").is_none());
    }

    #[test]
    fn test_search_order_ends_at_root() {
        let dirs = testdata_dirs();
        assert_eq!(dirs.last(), Some(&workspace_root().join("testdata")));
    }
}
