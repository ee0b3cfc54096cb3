// Cache path utilities.
// Locates the durable snapshot file under the platform cache directory.

use std::path::PathBuf;

use directories::ProjectDirs;

/// Get the base cache directory (~/.cache/contribs on Linux).
pub fn cache_dir() -> Option<PathBuf> {
    ProjectDirs::from("", "", "contribs").map(|dirs| dirs.cache_dir().to_path_buf())
}

/// Path to the durable rollup snapshot.
pub fn snapshot_path() -> Option<PathBuf> {
    cache_dir().map(|dir| dir.join("snapshot.json"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_path() {
        // Path construction only; nothing is created on disk
        if let Some(path) = snapshot_path() {
            assert!(path.ends_with("contribs/snapshot.json"));
        }
    }
}
