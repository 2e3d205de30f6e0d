//! Container exit status resolution.
//!
//! The exit supervisor writes the init process's exit code to a file in the
//! bundle directory once it terminates. Reading it never waits: callers poll
//! until a code shows up.

use std::path::Path;

/// Name of the exit code artifact inside a bundle directory.
pub const EXIT_CODE_FILE: &str = "exitcode";

/// Exit code of the container whose bundle lives in `bundle_dir`.
///
/// Returns `None` while the artifact is missing, unreadable or malformed.
pub async fn resolve_exit_code(bundle_dir: &Path) -> Option<i32> {
    let contents = tokio::fs::read_to_string(bundle_dir.join(EXIT_CODE_FILE))
        .await
        .ok()?;
    parse_exit_code(&contents)
}

fn parse_exit_code(contents: &str) -> Option<i32> {
    contents.trim().parse::<i32>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_artifact_is_unknown() {
        let dir = TempDir::new().unwrap();
        assert_eq!(resolve_exit_code(dir.path()).await, None);
    }

    #[tokio::test]
    async fn test_missing_bundle_dir_is_unknown() {
        let dir = TempDir::new().unwrap();
        assert_eq!(resolve_exit_code(&dir.path().join("gone")).await, None);
    }

    #[tokio::test]
    async fn test_numeric_artifact() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(EXIT_CODE_FILE), "55").unwrap();
        assert_eq!(resolve_exit_code(dir.path()).await, Some(55));
    }

    #[tokio::test]
    async fn test_non_numeric_artifact_is_unknown() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(EXIT_CODE_FILE), "potato").unwrap();
        assert_eq!(resolve_exit_code(dir.path()).await, None);
    }

    #[test]
    fn test_parse_exit_code() {
        assert_eq!(parse_exit_code("0"), Some(0));
        assert_eq!(parse_exit_code("137\n"), Some(137));
        assert_eq!(parse_exit_code("-1"), Some(-1));
        assert_eq!(parse_exit_code(""), None);
        assert_eq!(parse_exit_code("99999999999"), None);
    }
}
