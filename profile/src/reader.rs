//! Line-oriented configuration file reading
//!
//! Profile and user configuration files share one format: one entry per
//! line, `#` comments, blank lines ignored. Portage-style layouts may also
//! split a file into a directory of fragments, read in sorted order.

use crate::{Error, Result};
use std::path::{Path, PathBuf};

/// Iterate over meaningful lines, with comments and whitespace stripped
pub fn read_lines(content: &str) -> impl Iterator<Item = &str> {
    content.lines().filter_map(|line| {
        let line = match line.find(" #").or_else(|| line.find("\t#")) {
            Some(idx) => &line[..idx],
            None => line,
        };
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            None
        } else {
            Some(line)
        }
    })
}

/// How directory-form configuration files are treated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectoryMode {
    /// A directory where a file is expected is an error
    Reject,
    /// Directory fragments are concatenated in sorted order
    Fragments,
}

/// Read a file or a directory of fragments.
///
/// Returns `None` when the path does not exist.
pub fn read_config_path(path: &Path, mode: DirectoryMode) -> Result<Option<String>> {
    if !path.exists() {
        return Ok(None);
    }
    if !path.is_dir() {
        return Ok(Some(std::fs::read_to_string(path)?));
    }
    if mode == DirectoryMode::Reject {
        return Err(Error::Invalid(format!(
            "{} is a directory, which this profile format does not allow",
            path.display()
        )));
    }

    let mut fragments: Vec<PathBuf> = std::fs::read_dir(path)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            let name = p.file_name().and_then(|s| s.to_str()).unwrap_or("");
            p.is_file() && !name.starts_with('.') && !name.ends_with('~')
        })
        .collect();
    fragments.sort();

    let mut content = String::new();
    for fragment in fragments {
        content.push_str(&std::fs::read_to_string(&fragment)?);
        if !content.ends_with('\n') {
            content.push('\n');
        }
    }
    Ok(Some(content))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_read_lines() {
        let content = "# header\n\nsys-apps/foo\n  dev-util/bar x -y  # trailing\n";
        let lines: Vec<_> = read_lines(content).collect();
        assert_eq!(lines, vec!["sys-apps/foo", "dev-util/bar x -y"]);
    }

    #[test]
    fn test_read_missing_path() {
        let dir = TempDir::new().unwrap();
        let got = read_config_path(&dir.path().join("package.mask"), DirectoryMode::Reject).unwrap();
        assert!(got.is_none());
    }

    #[test]
    fn test_directory_fragments() {
        let dir = TempDir::new().unwrap();
        let mask_dir = dir.path().join("package.mask");
        std::fs::create_dir(&mask_dir).unwrap();
        std::fs::write(mask_dir.join("10-b"), "dev-util/b").unwrap();
        std::fs::write(mask_dir.join("00-a"), "dev-util/a\n").unwrap();
        std::fs::write(mask_dir.join(".hidden"), "dev-util/hidden\n").unwrap();

        let content = read_config_path(&mask_dir, DirectoryMode::Fragments)
            .unwrap()
            .unwrap();
        assert_eq!(read_lines(&content).collect::<Vec<_>>(), vec!["dev-util/a", "dev-util/b"]);

        assert!(read_config_path(&mask_dir, DirectoryMode::Reject).is_err());
    }
}
