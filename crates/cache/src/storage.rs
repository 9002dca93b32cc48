//! Persistent cache tier
//!
//! One file per key under the cache directory, named by the SHA-256 of the
//! full key. Each file is a single bincode frame carrying a magic number,
//! the schema version, entry metadata, a CRC32C of the stored payload, and
//! the payload itself (zstd-compressed at or above the configured
//! threshold). Corrupt or stale-schema files read as misses and are
//! removed by the caller.

use crate::entry::EntryMetadata;
use crate::errors::{CacheError, Result};
use crate::key::key_file_name;
use crc32c::crc32c;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

/// Magic number for cache files: "OINS"
const CACHE_MAGIC: u32 = 0x4F49_4E53;

/// Current persistent format version
pub const SCHEMA_VERSION: u16 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct FileFrame {
    magic: u32,
    schema_version: u16,
    meta: EntryMetadata,
    payload_crc: u32,
    payload: Vec<u8>,
}

/// Disk-backed tier
pub struct DiskTier {
    root: PathBuf,
    compression_threshold: usize,
    compression_level: i32,
}

impl DiskTier {
    pub fn new(root: PathBuf, compression_threshold: usize, compression_level: i32) -> Result<Self> {
        std::fs::create_dir_all(&root).map_err(|e| CacheError::Io {
            path: root.clone(),
            operation: "create cache directory",
            source: e,
        })?;
        Ok(Self {
            root,
            compression_threshold,
            compression_level,
        })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(key_file_name(key))
    }

    /// Write an entry, compressing large payloads. The metadata's
    /// `compressed` and `size_bytes` fields are set to match what lands on
    /// disk.
    pub async fn write(&self, mut meta: EntryMetadata, payload: &[u8]) -> Result<()> {
        let key = meta.key.clone();
        let compress = payload.len() >= self.compression_threshold;

        let stored: Vec<u8> = if compress {
            zstd::stream::encode_all(payload, self.compression_level).map_err(|e| {
                CacheError::Io {
                    path: self.path_for(&key),
                    operation: "compress payload",
                    source: e,
                }
            })?
        } else {
            payload.to_vec()
        };

        meta.compressed = compress;
        meta.size_bytes = stored.len() as u64;
        meta.schema_version = SCHEMA_VERSION;

        let frame = FileFrame {
            magic: CACHE_MAGIC,
            schema_version: SCHEMA_VERSION,
            payload_crc: crc32c(&stored),
            meta,
            payload: stored,
        };

        let bytes = bincode::serialize(&frame).map_err(|e| CacheError::Serialization {
            key: key.clone(),
            operation: "encode",
            source: e,
        })?;

        // Write to a temp file then rename so readers never see a torn file
        let path = self.path_for(&key);
        let temp = path.with_extension("tmp");
        fs::write(&temp, &bytes).await.map_err(|e| CacheError::Io {
            path: temp.clone(),
            operation: "write cache file",
            source: e,
        })?;
        fs::rename(&temp, &path).await.map_err(|e| CacheError::Io {
            path: path.clone(),
            operation: "rename cache file",
            source: e,
        })?;

        tracing::debug!(key = %key, compressed = compress, bytes = bytes.len(), "wrote persistent cache entry");
        Ok(())
    }

    /// Read an entry back, returning the metadata and the decompressed
    /// payload. `Ok(None)` means the key has never been stored.
    pub async fn read(&self, key: &str) -> Result<Option<(EntryMetadata, Vec<u8>)>> {
        let path = self.path_for(key);
        let bytes = match fs::read(&path).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(CacheError::Io {
                    path,
                    operation: "read cache file",
                    source: e,
                });
            }
        };

        let (meta, payload) = Self::decode_frame(key, &bytes)?;
        Ok(Some((meta, payload)))
    }

    fn decode_frame(key: &str, bytes: &[u8]) -> Result<(EntryMetadata, Vec<u8>)> {
        let frame: FileFrame =
            bincode::deserialize(bytes).map_err(|e| CacheError::Serialization {
                key: key.to_string(),
                operation: "decode",
                source: e,
            })?;

        if frame.magic != CACHE_MAGIC {
            return Err(CacheError::Corruption {
                key: key.to_string(),
                reason: format!(
                    "invalid magic number: expected {CACHE_MAGIC:08x}, got {:08x}",
                    frame.magic
                ),
            });
        }
        if frame.schema_version != SCHEMA_VERSION {
            return Err(CacheError::Corruption {
                key: key.to_string(),
                reason: format!("unsupported schema version {}", frame.schema_version),
            });
        }
        let actual_crc = crc32c(&frame.payload);
        if actual_crc != frame.payload_crc {
            return Err(CacheError::Corruption {
                key: key.to_string(),
                reason: format!(
                    "payload CRC mismatch: expected {:08x}, got {actual_crc:08x}",
                    frame.payload_crc
                ),
            });
        }

        let payload = if frame.meta.compressed {
            zstd::stream::decode_all(frame.payload.as_slice()).map_err(|e| {
                CacheError::Corruption {
                    key: key.to_string(),
                    reason: format!("decompression failed: {e}"),
                }
            })?
        } else {
            frame.payload
        };

        Ok((frame.meta, payload))
    }

    pub async fn remove(&self, key: &str) -> Result<bool> {
        self.remove_path(&self.path_for(key)).await
    }

    async fn remove_path(&self, path: &Path) -> Result<bool> {
        match fs::remove_file(path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(CacheError::Io {
                path: path.to_path_buf(),
                operation: "remove cache file",
                source: e,
            }),
        }
    }

    pub async fn clear(&self) -> Result<()> {
        for (path, _) in self.scan().await? {
            let _ = self.remove_path(&path).await;
        }
        Ok(())
    }

    /// Read the metadata of every entry in the tier. Unreadable files are
    /// deleted on the spot rather than failing the scan.
    pub async fn scan(&self) -> Result<Vec<(PathBuf, EntryMetadata)>> {
        let mut dir = fs::read_dir(&self.root).await.map_err(|e| CacheError::Io {
            path: self.root.clone(),
            operation: "read cache directory",
            source: e,
        })?;

        let mut entries = Vec::new();
        while let Some(item) = dir.next_entry().await.map_err(|e| CacheError::Io {
            path: self.root.clone(),
            operation: "read cache directory",
            source: e,
        })? {
            let path = item.path();
            if path.extension().and_then(|e| e.to_str()) != Some("bin") {
                continue;
            }
            let bytes = match fs::read(&path).await {
                Ok(b) => b,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping unreadable cache file");
                    continue;
                }
            };
            match Self::decode_frame("", &bytes) {
                Ok((meta, _)) => entries.push((path, meta)),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "removing corrupt cache file");
                    let _ = self.remove_path(&path).await;
                }
            }
        }
        Ok(entries)
    }

    /// Remove every entry whose metadata matches the predicate, returning
    /// how many were removed.
    pub async fn invalidate_where<F>(&self, predicate: F) -> Result<usize>
    where
        F: Fn(&EntryMetadata) -> bool,
    {
        let mut removed = 0;
        for (path, meta) in self.scan().await? {
            if predicate(&meta) && self.remove_path(&path).await? {
                removed += 1;
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    fn tier(dir: &TempDir, threshold: usize) -> DiskTier {
        DiskTier::new(dir.path().to_path_buf(), threshold, 3).unwrap()
    }

    #[tokio::test]
    async fn roundtrips_small_payloads_uncompressed() {
        let dir = TempDir::new().unwrap();
        let tier = tier(&dir, 1024);
        let meta = EntryMetadata::new("k1", Duration::from_secs(60), None);

        tier.write(meta, b"hello").await.unwrap();
        let (meta, payload) = tier.read("k1").await.unwrap().unwrap();
        assert_eq!(payload, b"hello");
        assert!(!meta.compressed);
    }

    #[tokio::test]
    async fn compresses_payloads_over_the_threshold() {
        let dir = TempDir::new().unwrap();
        let tier = tier(&dir, 16);
        let meta = EntryMetadata::new("k2", Duration::from_secs(60), None);
        let payload = vec![b'A'; 10_000];

        tier.write(meta, &payload).await.unwrap();
        let (meta, read_back) = tier.read("k2").await.unwrap().unwrap();
        assert!(meta.compressed);
        assert!(meta.size_bytes < payload.len() as u64);
        assert_eq!(read_back, payload);
    }

    #[tokio::test]
    async fn detects_payload_corruption() {
        let dir = TempDir::new().unwrap();
        let tier = tier(&dir, 1024);
        let meta = EntryMetadata::new("k3", Duration::from_secs(60), None);
        tier.write(meta, b"some payload worth checking").await.unwrap();

        // Flip a byte near the end of the file, inside the payload
        let path = dir.path().join(key_file_name("k3"));
        let mut bytes = std::fs::read(&path).unwrap();
        let last = bytes.len() - 3;
        bytes[last] ^= 0xFF;
        std::fs::write(&path, bytes).unwrap();

        match tier.read("k3").await {
            Err(CacheError::Corruption { .. }) | Err(CacheError::Serialization { .. }) => {}
            other => panic!("expected corruption error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_keys_read_as_none() {
        let dir = TempDir::new().unwrap();
        let tier = tier(&dir, 1024);
        assert!(tier.read("never-written").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn invalidate_where_matches_metadata() {
        let dir = TempDir::new().unwrap();
        let tier = tier(&dir, 1024);
        let mut meta = EntryMetadata::new("a", Duration::from_secs(60), Some("abc123".into()));
        tier.write(meta, b"1").await.unwrap();
        meta = EntryMetadata::new("b", Duration::from_secs(60), Some("def456".into()));
        tier.write(meta, b"2").await.unwrap();

        let removed = tier
            .invalidate_where(|m| m.git_hash.as_deref() == Some("abc123"))
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert!(tier.read("a").await.unwrap().is_none());
        assert!(tier.read("b").await.unwrap().is_some());
    }
}
