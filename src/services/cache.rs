//! Response caching service for repeated `get_data` requests
//!
//! Responses are stored one file per request digest and expire after the
//! configured TTL. A namespace names the data the responses were collected
//! from; entries written under one namespace are never served to another.

use crate::config::Settings;
use crate::types::{CacheWarning, CostrollError, GetDataResponse, Result};
use directories::BaseDirs;
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::PathBuf;

#[derive(Debug, Serialize, Deserialize)]
pub struct CachedResponse {
    pub cache_key: String,
    pub fetched_at: i64,
    pub response: GetDataResponse,
}

pub struct ResponseCacheService {
    cache_dir: PathBuf,
    ttl_secs: i64,
    namespace: String,
}

impl ResponseCacheService {
    /// Cache under `settings.cache_dir`, or `~/.costroll/cache`
    pub fn new(settings: &Settings) -> Result<Self> {
        let cache_dir = match &settings.cache_dir {
            Some(dir) => dir.clone(),
            None => BaseDirs::new()
                .ok_or_else(|| CostrollError::Cache("Cannot determine home directory".into()))?
                .home_dir()
                .join(".costroll")
                .join("cache"),
        };
        fs::create_dir_all(&cache_dir)?;
        Ok(Self {
            cache_dir,
            ttl_secs: settings.cache_ttl_secs,
            namespace: String::new(),
        })
    }

    pub fn with_cache_dir(cache_dir: PathBuf, ttl_secs: i64) -> Self {
        Self {
            cache_dir,
            ttl_secs,
            namespace: String::new(),
        }
    }

    /// Scope entries to the collaborators that produced them
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Request digest mixed with the namespace
    fn entry_key(&self, cache_key: &str) -> String {
        if self.namespace.is_empty() {
            return cache_key.to_string();
        }
        let scoped = format!("namespace={}\nrequest={}", self.namespace, cache_key);
        hex::encode(Sha256::digest(scoped.as_bytes()))
    }

    pub fn cache_path(&self, cache_key: &str) -> PathBuf {
        self.cache_dir
            .join(format!("billing_{}.json", self.entry_key(cache_key)))
    }

    /// Load a fresh response for `cache_key`.
    /// Missing or expired entries are a plain miss; unreadable ones also
    /// return a warning. Uses a shared file lock for concurrent read safety.
    pub fn load(&self, cache_key: &str) -> (Option<GetDataResponse>, Option<CacheWarning>) {
        let path = self.cache_path(cache_key);
        if !path.exists() {
            return (None, None);
        }

        let file = match File::open(&path) {
            Ok(f) => f,
            Err(e) => {
                return (
                    None,
                    Some(CacheWarning::LoadFailed(format!(
                        "Failed to open cache: {}",
                        e
                    ))),
                );
            }
        };

        if let Err(e) = file.lock_shared() {
            return (
                None,
                Some(CacheWarning::LoadFailed(format!(
                    "Failed to acquire read lock: {}",
                    e
                ))),
            );
        }

        let mut content = String::new();
        let mut reader = std::io::BufReader::new(&file);
        let read = reader.read_to_string(&mut content);
        let _ = file.unlock();
        if let Err(e) = read {
            return (
                None,
                Some(CacheWarning::LoadFailed(format!(
                    "Failed to read cache: {}",
                    e
                ))),
            );
        }

        let cached: CachedResponse = match serde_json::from_str(&content) {
            Ok(c) => c,
            Err(e) => {
                return (
                    None,
                    Some(CacheWarning::Corrupted(format!(
                        "Corrupted cache file: {}",
                        e
                    ))),
                );
            }
        };

        let age = chrono::Utc::now().timestamp() - cached.fetched_at;
        if cached.cache_key != self.entry_key(cache_key) || age >= self.ttl_secs {
            return (None, None);
        }
        (Some(cached.response), None)
    }

    /// Save using atomic write (temp file + rename) with exclusive lock.
    pub fn save(&self, cache_key: &str, response: &GetDataResponse) -> Result<()> {
        self.save_at(cache_key, response, chrono::Utc::now().timestamp())
    }

    fn save_at(&self, cache_key: &str, response: &GetDataResponse, fetched_at: i64) -> Result<()> {
        fs::create_dir_all(&self.cache_dir)?;

        let cached = CachedResponse {
            cache_key: self.entry_key(cache_key),
            fetched_at,
            response: response.clone(),
        };

        let content = serde_json::to_string_pretty(&cached)
            .map_err(|e| CostrollError::Cache(format!("Serialization failed: {}", e)))?;

        let path = self.cache_path(cache_key);
        let temp_path = path.with_extension("json.tmp");

        {
            let mut file = File::create(&temp_path)
                .map_err(|e| CostrollError::Cache(format!("Failed to create temp file: {}", e)))?;
            file.write_all(content.as_bytes())
                .map_err(|e| CostrollError::Cache(format!("Failed to write temp file: {}", e)))?;
            file.sync_all()
                .map_err(|e| CostrollError::Cache(format!("Failed to sync temp file: {}", e)))?;
        }

        let target = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        target
            .lock_exclusive()
            .map_err(|e| CostrollError::Cache(format!("Failed to acquire write lock: {}", e)))?;

        fs::rename(&temp_path, &path)
            .map_err(|e| CostrollError::Cache(format!("Failed to rename temp file: {}", e)))?;

        let _ = target.unlock();
        Ok(())
    }

    /// Remove every cached response; returns how many were deleted
    pub fn clear(&self) -> Result<usize> {
        let pattern = self.cache_dir.join("billing_*.json");
        let mut removed = 0;
        for path in glob::glob(&pattern.to_string_lossy())
            .map_err(|e| CostrollError::Cache(format!("Invalid cache path: {}", e)))?
            .filter_map(|p| p.ok())
        {
            fs::remove_file(&path)?;
            removed += 1;
        }
        Ok(removed)
    }
}
