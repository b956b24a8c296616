//! Package archive extraction.
//!
//! The build engine ships its auxiliary files as a zip archive next to the
//! compressed image. The coordinator unpacks it so every contained file can
//! be uploaded individually.

use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

/// Errors during package extraction.
#[derive(Debug, Error)]
pub enum ArchiveError {
  #[error("io error: {0}")]
  Io(#[from] std::io::Error),

  #[error("zip error: {0}")]
  Zip(#[from] zip::result::ZipError),

  /// Entry path escapes the destination directory.
  #[error("unsafe zip entry name: {0}")]
  UnsafeEntry(String),
}

/// Extract the package archive into `dest`.
///
/// Returns the extracted file paths sorted by name. Directories inside the
/// archive are created but not returned.
pub fn extract_package(archive_path: &Path, dest: &Path) -> Result<Vec<PathBuf>, ArchiveError> {
  fs::create_dir_all(dest)?;

  let file = File::open(archive_path)?;
  let mut archive = zip::ZipArchive::new(BufReader::new(file))?;

  let mut extracted = Vec::new();
  for index in 0..archive.len() {
    let mut entry = archive.by_index(index)?;

    let Some(relative) = entry.enclosed_name() else {
      return Err(ArchiveError::UnsafeEntry(entry.name().to_string()));
    };
    let dest_path = dest.join(relative);

    if entry.is_dir() {
      fs::create_dir_all(&dest_path)?;
      continue;
    }

    if let Some(parent) = dest_path.parent() {
      fs::create_dir_all(parent)?;
    }

    let mut out = File::create(&dest_path)?;
    io::copy(&mut entry, &mut out)?;

    #[cfg(unix)]
    {
      use std::os::unix::fs::PermissionsExt;
      if let Some(mode) = entry.unix_mode() {
        fs::set_permissions(&dest_path, fs::Permissions::from_mode(mode))?;
      }
    }

    extracted.push(dest_path);
  }

  extracted.sort();
  debug!(archive = %archive_path.display(), count = extracted.len(), "extracted package archive");
  Ok(extracted)
}

#[cfg(test)]
mod tests {
  use std::io::Write;

  use tempfile::TempDir;
  use zip::write::SimpleFileOptions;

  use super::*;

  fn write_test_zip(path: &Path, entries: &[(&str, &str)]) {
    let mut writer = zip::ZipWriter::new(File::create(path).unwrap());
    for (name, content) in entries {
      writer.start_file(*name, SimpleFileOptions::default()).unwrap();
      writer.write_all(content.as_bytes()).unwrap();
    }
    writer.finish().unwrap();
  }

  #[test]
  fn extracts_files_sorted_by_name() {
    let temp = TempDir::new().unwrap();
    let archive = temp.path().join("package.zip");
    write_test_zip(&archive, &[("image.def", "Bootstrap: docker"), ("VERSION", "1.0")]);

    let dest = temp.path().join("build");
    let files = extract_package(&archive, &dest).unwrap();

    assert_eq!(files, vec![dest.join("VERSION"), dest.join("image.def")]);
    assert_eq!(fs::read_to_string(dest.join("VERSION")).unwrap(), "1.0");
  }

  #[test]
  fn extracts_nested_entries() {
    let temp = TempDir::new().unwrap();
    let archive = temp.path().join("package.zip");
    write_test_zip(&archive, &[("meta/labels.json", "{}")]);

    let dest = temp.path().join("build");
    let files = extract_package(&archive, &dest).unwrap();

    assert_eq!(files, vec![dest.join("meta/labels.json")]);
  }

  #[test]
  fn missing_archive_is_an_error() {
    let temp = TempDir::new().unwrap();
    let result = extract_package(&temp.path().join("nope.zip"), &temp.path().join("build"));
    assert!(matches!(result, Err(ArchiveError::Io(_))));
  }
}
