use anyhow::{Context, Result};
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Replace `path` with `content` without exposing a half-written file.
///
/// The data goes to a sibling temp file that is fsynced and then renamed over
/// the target, so readers see either the old or the new content.
pub fn atomic_write(path: &Path, content: &[u8], mode: u32) -> Result<()> {
    if let Some(parent) = path.parent() {
        ensure_directory_exists(parent)?;
    }

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .with_context(|| format!("Not a file path: {}", path.display()))?;
    let temp_path = path.with_file_name(format!(".{}.{}.tmp", file_name, std::process::id()));

    {
        let mut file = File::create(&temp_path)
            .with_context(|| format!("Failed to create temporary file: {}", temp_path.display()))?;

        file.write_all(content)
            .with_context(|| format!("Failed to write temporary file: {}", temp_path.display()))?;

        file.sync_all().context("Failed to sync file to disk")?;
    }

    set_file_permissions(&temp_path, mode)?;

    std::fs::rename(&temp_path, path).with_context(|| {
        format!("Failed to move {} into place at {}", temp_path.display(), path.display())
    })?;

    Ok(())
}

/// Create `path` and its parents if missing
pub fn ensure_directory_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)
            .with_context(|| format!("Failed to create directory: {}", path.display()))?;
        set_file_permissions(path, 0o755)?;
    }

    Ok(())
}

/// Delete a file, treating "already gone" as success
pub fn remove_file_if_exists(path: &Path) -> Result<bool> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e).with_context(|| format!("Failed to delete: {}", path.display())),
    }
}

/// Set Unix permission bits (no-op elsewhere)
pub fn set_file_permissions(path: &Path, mode: u32) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;

        std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
            .with_context(|| format!("Failed to set permissions for: {}", path.display()))?;
    }

    #[cfg(not(unix))]
    {
        let _ = (path, mode);
    }

    Ok(())
}

/// Whether the process runs with root privileges
pub fn is_root() -> bool {
    #[cfg(unix)]
    {
        unsafe { libc::geteuid() == 0 }
    }

    #[cfg(not(unix))]
    {
        false
    }
}

/// Fail unless running as root
pub fn ensure_admin_privileges() -> Result<()> {
    #[cfg(unix)]
    {
        if !is_root() {
            let euid = unsafe { libc::geteuid() };
            anyhow::bail!(
                "This command must be run as root or with sudo. Current EUID: {}",
                euid
            );
        }
        Ok(())
    }

    #[cfg(not(unix))]
    {
        anyhow::bail!("Device enforcement is only supported on Unix-like systems")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn atomic_write_creates_file_with_content() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");

        atomic_write(&path, b"{\"a\":1}", 0o600).unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"{\"a\":1}");
    }

    #[test]
    fn atomic_write_replaces_existing_content() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");

        atomic_write(&path, b"old content that is longer", 0o600).unwrap();
        atomic_write(&path, b"new", 0o600).unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"new");
    }

    #[test]
    fn atomic_write_creates_nested_directories() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a").join("b").join("file.txt");

        atomic_write(&path, b"nested", 0o644).unwrap();

        assert!(path.exists());
    }

    #[test]
    fn atomic_write_leaves_no_temp_files() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("file.txt");

        atomic_write(&path, b"content", 0o644).unwrap();

        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn atomic_write_applies_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let path = dir.path().join("secret.conf");

        atomic_write(&path, b"token", 0o600).unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn remove_file_if_exists_is_idempotent() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("marker");
        std::fs::write(&path, b"").unwrap();

        assert!(remove_file_if_exists(&path).unwrap());
        assert!(!remove_file_if_exists(&path).unwrap());
    }
}
