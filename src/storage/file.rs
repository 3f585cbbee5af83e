//! File-backed storage backend.
//!
//! One file per key, sharded by key hash, with a magic/version header and a
//! crc32 trailer. The directory is held exclusively via a lock file so two
//! processes never interleave writes.

use super::KeyValueStorage;
use crate::error::{CoreError, Result};
use fs2::FileExt;
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

/// Magic bytes for entry files.
const ENTRY_MAGIC: &[u8; 4] = b"KVS\0";

/// Current entry format version.
const ENTRY_VERSION: u8 = 1;

/// Durable key-value storage rooted at a directory.
pub struct FileStorage {
    path: PathBuf,
    _lock_file: File,
}

impl FileStorage {
    /// Open or create storage at the given directory.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        fs::create_dir_all(&path)?;

        let lock_file = File::create(path.join("LOCK"))?;
        lock_file
            .try_lock_exclusive()
            .map_err(|_| CoreError::Locked)?;

        Ok(Self {
            path,
            _lock_file: lock_file,
        })
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        let digest = Sha256::digest(key.as_bytes());
        let hex = hex::encode(digest);
        self.path.join(&hex[0..2]).join(format!("{}.kv", hex))
    }
}

impl KeyValueStorage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let entry_path = self.entry_path(key);
        if !entry_path.exists() {
            return Ok(None);
        }

        let mut file = File::open(&entry_path)?;

        let mut magic = [0u8; 4];
        file.read_exact(&mut magic)?;
        if &magic != ENTRY_MAGIC {
            return Err(CoreError::InvalidFormat("Invalid entry magic".into()));
        }

        let mut version = [0u8; 1];
        file.read_exact(&mut version)?;
        if version[0] != ENTRY_VERSION {
            return Err(CoreError::InvalidFormat(format!(
                "Unsupported entry version: {}",
                version[0]
            )));
        }

        // Key echo, kept for debugging a sharded tree by hand.
        let mut key_len_bytes = [0u8; 2];
        file.read_exact(&mut key_len_bytes)?;
        let key_len = u16::from_le_bytes(key_len_bytes) as usize;
        let mut key_bytes = vec![0u8; key_len];
        file.read_exact(&mut key_bytes)?;

        let mut value_len_bytes = [0u8; 8];
        file.read_exact(&mut value_len_bytes)?;
        let value_len = u64::from_le_bytes(value_len_bytes) as usize;

        let mut value = vec![0u8; value_len];
        file.read_exact(&mut value)?;

        let mut checksum_bytes = [0u8; 4];
        file.read_exact(&mut checksum_bytes)?;
        let stored_checksum = u32::from_le_bytes(checksum_bytes);
        let computed_checksum = crc32fast::hash(&value);

        if stored_checksum != computed_checksum {
            return Err(CoreError::ChecksumMismatch {
                expected: stored_checksum,
                got: computed_checksum,
            });
        }

        Ok(Some(value))
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        let entry_path = self.entry_path(key);
        if let Some(shard_dir) = entry_path.parent() {
            fs::create_dir_all(shard_dir)?;
        }

        let mut file = File::create(&entry_path)?;

        file.write_all(ENTRY_MAGIC)?;
        file.write_all(&[ENTRY_VERSION])?;

        let key_bytes = key.as_bytes();
        let key_len = key_bytes.len() as u16;
        file.write_all(&key_len.to_le_bytes())?;
        file.write_all(key_bytes)?;

        let value_len = value.len() as u64;
        file.write_all(&value_len.to_le_bytes())?;
        file.write_all(value)?;

        let checksum = crc32fast::hash(value);
        file.write_all(&checksum.to_le_bytes())?;

        file.sync_all()?;

        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let entry_path = self.entry_path(key);
        match fs::remove_file(&entry_path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
