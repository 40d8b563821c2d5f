use std::io::Read;
use std::path::{Path, PathBuf};

const BINARY_SNIFF_BYTES: u64 = 1024;

/// Resolves `path` against `base` unless it is already absolute.
pub fn resolve_path(base: impl AsRef<Path>, path: impl AsRef<Path>) -> PathBuf {
    let path = path.as_ref();
    if path.is_absolute() {
        return path.to_path_buf();
    }
    base.as_ref().join(path)
}

/// A file counts as binary when its first KiB contains a NUL byte.
/// Unreadable files are reported as text so the caller surfaces the read error.
pub fn is_binary_file(path: impl AsRef<Path>) -> bool {
    let Ok(file) = std::fs::File::open(path) else {
        return false;
    };

    let mut chunk = Vec::with_capacity(BINARY_SNIFF_BYTES as usize);
    if file.take(BINARY_SNIFF_BYTES).read_to_end(&mut chunk).is_err() {
        return false;
    }
    chunk.contains(&0)
}

pub fn display_path_rel_to_cwd(path: &str, cwd: Option<&Path>) -> String {
    let Some(cwd) = cwd else {
        return path.to_string();
    };

    match Path::new(path).strip_prefix(cwd) {
        Ok(rel) if rel.as_os_str().is_empty() => ".".to_string(),
        Ok(rel) => rel.display().to_string(),
        Err(_) => path.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn resolve_relative_and_absolute() {
        assert_eq!(resolve_path("/work", "src/lib.rs"), PathBuf::from("/work/src/lib.rs"));
        assert_eq!(resolve_path("/work", "/etc/hosts"), PathBuf::from("/etc/hosts"));
    }

    #[test]
    fn detects_nul_bytes() {
        let dir = TempDir::new().unwrap();
        let text = dir.path().join("a.txt");
        let binary = dir.path().join("a.bin");
        std::fs::write(&text, "hello\n").unwrap();
        std::fs::write(&binary, [0x7f, b'E', b'L', b'F', 0x00, 0x01]).unwrap();

        assert!(!is_binary_file(&text));
        assert!(is_binary_file(&binary));
        assert!(!is_binary_file(dir.path().join("missing")));
    }

    #[test]
    fn display_relative_to_cwd() {
        let cwd = Path::new("/work");
        assert_eq!(display_path_rel_to_cwd("/work/src/main.rs", Some(cwd)), "src/main.rs");
        assert_eq!(display_path_rel_to_cwd("/work", Some(cwd)), ".");
        assert_eq!(display_path_rel_to_cwd("/tmp/x", Some(cwd)), "/tmp/x");
        assert_eq!(display_path_rel_to_cwd("notes.md", None), "notes.md");
    }
}
