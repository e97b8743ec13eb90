//! File-backed resource store.
//!
//! # Storage Layout
//!
//! ```text
//! {base_path}/
//! ├── .lock               # held exclusively for every write
//! ├── KeptnProject/
//! │   └── <name>.json     # one Record per file
//! └── KeptnService/
//!     └── <name>.json
//! ```
//!
//! Names that are not safe file names are stored under a hashed stem. Each
//! write goes to its own temporary file and is renamed into place. Version
//! checks and writes hold an advisory lock on `.lock`, so several processes
//! (a `watch` loop next to a one-off `sync`) can share one directory.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::util::hash::hash_bytes;

use super::types::{Kind, ObjectKey, Record, StoreError};
use super::{ResourceStore, owned_closure};

const LOCK_FILENAME: &str = ".lock";

#[derive(Debug)]
pub struct FileStore {
  base_path: PathBuf,
}

impl FileStore {
  pub fn new(base_path: PathBuf) -> Self {
    Self { base_path }
  }

  fn lock(&self) -> Result<WriteLock, StoreError> {
    WriteLock::acquire(&self.base_path)
  }

  fn kind_dir(&self, kind: Kind) -> PathBuf {
    self.base_path.join(kind.as_str())
  }

  fn record_path(&self, kind: Kind, name: &str) -> PathBuf {
    self.kind_dir(kind).join(format!("{}.json", file_stem(name)))
  }

  fn read_record(&self, path: &Path) -> Result<Option<Record>, StoreError> {
    let content = match fs::read_to_string(path) {
      Ok(content) => content,
      Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
      Err(source) => {
        return Err(StoreError::Read {
          path: path.to_path_buf(),
          source,
        });
      }
    };
    let record = serde_json::from_str(&content).map_err(|source| StoreError::Parse {
      path: path.to_path_buf(),
      source,
    })?;
    Ok(Some(record))
  }

  fn write_record(&self, record: &Record) -> Result<(), StoreError> {
    let dir = self.kind_dir(record.kind);
    fs::create_dir_all(&dir).map_err(|source| StoreError::CreateDir {
      path: dir.clone(),
      source,
    })?;

    let path = self.record_path(record.kind, &record.name);
    let content = serde_json::to_string_pretty(record).map_err(|source| StoreError::Encode {
      key: record.key(),
      source,
    })?;
    let mut temp = NamedTempFile::new_in(&dir).map_err(|source| StoreError::Write {
      path: dir.clone(),
      source,
    })?;
    temp.write_all(content.as_bytes()).map_err(|source| StoreError::Write {
      path: temp.path().to_path_buf(),
      source,
    })?;
    temp
      .persist(&path)
      .map_err(|e| StoreError::Write { path, source: e.error })?;
    Ok(())
  }

  fn remove_record(&self, key: &ObjectKey) -> Result<(), StoreError> {
    let path = self.record_path(key.kind, &key.name);
    match fs::remove_file(&path) {
      Ok(()) => Ok(()),
      Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
      Err(source) => Err(StoreError::Write { path, source }),
    }
  }

  fn all_records(&self) -> Result<Vec<Record>, StoreError> {
    let mut records = Vec::new();
    for kind in Kind::ALL {
      records.extend(self.list(kind)?);
    }
    Ok(records)
  }
}

/// Exclusive lock on the store's `.lock` file, released on drop.
struct WriteLock {
  _file: File,
}

impl WriteLock {
  fn acquire(base_path: &Path) -> Result<Self, StoreError> {
    fs::create_dir_all(base_path).map_err(|source| StoreError::CreateDir {
      path: base_path.to_path_buf(),
      source,
    })?;
    let path = base_path.join(LOCK_FILENAME);
    let file = OpenOptions::new()
      .read(true)
      .write(true)
      .create(true)
      .truncate(false)
      .open(&path)
      .map_err(|source| StoreError::Lock {
        path: path.clone(),
        source,
      })?;
    lock_exclusive(&file).map_err(|source| StoreError::Lock { path, source })?;
    Ok(Self { _file: file })
  }
}

#[cfg(unix)]
fn lock_exclusive(file: &File) -> io::Result<()> {
  use rustix::fs::{FlockOperation, flock};
  use std::os::unix::io::AsFd;

  flock(file.as_fd(), FlockOperation::LockExclusive).map_err(|e| io::Error::from_raw_os_error(e.raw_os_error()))
}

#[cfg(windows)]
fn lock_exclusive(file: &File) -> io::Result<()> {
  use std::os::windows::io::AsRawHandle;
  use windows_sys::Win32::Foundation::HANDLE;
  use windows_sys::Win32::Storage::FileSystem::{LOCKFILE_EXCLUSIVE_LOCK, LockFileEx};

  let handle = file.as_raw_handle() as HANDLE;
  // SAFETY: a zeroed OVERLAPPED is valid and the handle is owned by `file`.
  let result = unsafe {
    let mut overlapped = std::mem::zeroed();
    LockFileEx(handle, LOCKFILE_EXCLUSIVE_LOCK, 0, 1, 0, &mut overlapped)
  };
  if result == 0 {
    Err(io::Error::last_os_error())
  } else {
    Ok(())
  }
}

/// Record names are usually DNS-style labels; anything else is hashed.
fn file_stem(name: &str) -> String {
  let safe = !name.is_empty()
    && !name.starts_with('.')
    && name
      .chars()
      .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
  if safe {
    name.to_string()
  } else {
    format!("h-{}", &hash_bytes(name.as_bytes()).0[..32])
  }
}

impl ResourceStore for FileStore {
  fn get(&self, kind: Kind, name: &str) -> Result<Option<Record>, StoreError> {
    self.read_record(&self.record_path(kind, name))
  }

  fn list(&self, kind: Kind) -> Result<Vec<Record>, StoreError> {
    let dir = self.kind_dir(kind);
    let entries = match fs::read_dir(&dir) {
      Ok(entries) => entries,
      Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
      Err(source) => return Err(StoreError::Read { path: dir, source }),
    };

    let mut records = Vec::new();
    for entry in entries.flatten() {
      let path = entry.path();
      if path.extension().and_then(|e| e.to_str()) != Some("json") {
        continue;
      }
      if let Some(record) = self.read_record(&path)? {
        records.push(record);
      }
    }
    records.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(records)
  }

  fn create(&self, mut record: Record) -> Result<Record, StoreError> {
    let _guard = self.lock()?;
    if self.get(record.kind, &record.name)?.is_some() {
      return Err(StoreError::AlreadyExists { key: record.key() });
    }
    record.resource_version = 1;
    self.write_record(&record)?;
    Ok(record)
  }

  fn update(&self, mut record: Record) -> Result<Record, StoreError> {
    let _guard = self.lock()?;
    let Some(current) = self.get(record.kind, &record.name)? else {
      return Err(StoreError::NotFound { key: record.key() });
    };
    if current.resource_version != record.resource_version {
      return Err(StoreError::Conflict {
        key: record.key(),
        expected: record.resource_version,
        actual: current.resource_version,
      });
    }
    record.resource_version += 1;
    self.write_record(&record)?;
    Ok(record)
  }

  fn delete(&self, kind: Kind, name: &str) -> Result<bool, StoreError> {
    let _guard = self.lock()?;
    let root = ObjectKey::new(kind, name);
    if self.get(kind, name)?.is_none() {
      return Ok(false);
    }
    let all = self.all_records()?;
    for key in owned_closure(&all, &root) {
      self.remove_record(&key)?;
    }
    self.remove_record(&root)?;
    Ok(true)
  }
}
