//! Filesystem helpers for assembling artifact trees.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;
use walkdir::WalkDir;

#[derive(Debug, Error)]
pub enum FsError {
  #[error("failed to walk {path}: {source}")]
  Walk {
    path: PathBuf,
    #[source]
    source: walkdir::Error,
  },

  #[error("failed to read directory {path}: {source}")]
  ReadDir {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to create directory {path}: {source}")]
  CreateDir {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to copy {from} to {to}: {source}")]
  Copy {
    from: PathBuf,
    to: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to remove {path}: {source}")]
  Remove {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
}

fn create_dir(path: &Path) -> Result<(), FsError> {
  fs::create_dir_all(path).map_err(|source| FsError::CreateDir {
    path: path.to_path_buf(),
    source,
  })
}

/// Copy `src` recursively into `dest`, creating `dest` as needed.
///
/// Symlinks are skipped. Existing files at the destination are overwritten.
/// Returns the number of regular files copied.
pub fn copy_dir(src: &Path, dest: &Path) -> Result<usize, FsError> {
  create_dir(dest)?;

  let mut copied = 0;
  for entry in WalkDir::new(src).sort_by_file_name() {
    let entry = entry.map_err(|source| FsError::Walk {
      path: src.to_path_buf(),
      source,
    })?;

    let Ok(rel_path) = entry.path().strip_prefix(src) else {
      continue;
    };
    if rel_path.as_os_str().is_empty() {
      continue;
    }

    let target = dest.join(rel_path);
    let file_type = entry.file_type();
    if file_type.is_symlink() {
      debug!(path = %entry.path().display(), "skipping symlink");
    } else if file_type.is_dir() {
      create_dir(&target)?;
    } else if file_type.is_file() {
      if let Some(parent) = target.parent() {
        create_dir(parent)?;
      }
      fs::copy(entry.path(), &target).map_err(|source| FsError::Copy {
        from: entry.path().to_path_buf(),
        to: target.clone(),
        source,
      })?;
      copied += 1;
    }
  }

  Ok(copied)
}

/// Remove a directory tree. Returns `false` if it did not exist.
pub fn remove_dir_if_exists(path: &Path) -> Result<bool, FsError> {
  match fs::remove_dir_all(path) {
    Ok(()) => Ok(true),
    Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
    Err(source) => Err(FsError::Remove {
      path: path.to_path_buf(),
      source,
    }),
  }
}

/// List the immediate subdirectories of `path`, sorted by name.
///
/// A missing directory yields an empty list.
pub fn list_subdirs(path: &Path) -> Result<Vec<(String, PathBuf)>, FsError> {
  let entries = match fs::read_dir(path) {
    Ok(entries) => entries,
    Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
    Err(source) => {
      return Err(FsError::ReadDir {
        path: path.to_path_buf(),
        source,
      });
    }
  };

  let mut dirs = Vec::new();
  for entry in entries.flatten() {
    let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
    if !is_dir {
      continue;
    }
    if let Some(name) = entry.file_name().to_str() {
      dirs.push((name.to_string(), entry.path()));
    }
  }
  dirs.sort();
  Ok(dirs)
}
