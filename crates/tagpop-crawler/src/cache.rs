//! Two tier page cache: a bounded in-memory LRU in front of JSON files.
//!
//! Entries are keyed by the SHA-256 of their scope and identity parts and stored under
//! `{dir}/{scope}/{key}.json`. Disk hits are promoted to memory, expired
//! entries are dropped from both tiers when read. Every failure of the disk
//! tier is logged and reported as a miss, the cache never fails a crawl.

use std::fmt;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use lru::LruCache;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use tagpop_extract::text::normalize;

use crate::config::{CacheConfig, CacheTtl};

const MAX_TTL_SECS: u64 = 10 * 365 * 24 * 3600;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheScope {
    Categories,
    Years,
    Sets,
    Cards,
    CardDetails,
}

impl CacheScope {
    pub const ALL: [CacheScope; 5] = [
        Self::Categories,
        Self::Years,
        Self::Sets,
        Self::Cards,
        Self::CardDetails,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Categories => "categories",
            Self::Years => "years",
            Self::Sets => "sets",
            Self::Cards => "cards",
            Self::CardDetails => "card_details",
        }
    }

    fn ttl(&self, ttl: &CacheTtl) -> u64 {
        match self {
            Self::Categories => ttl.categories,
            Self::Years => ttl.years,
            Self::Sets => ttl.sets,
            Self::Cards => ttl.cards,
            Self::CardDetails => ttl.card_details,
        }
    }
}

impl fmt::Display for CacheScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CacheScope {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|scope| scope.as_str() == s)
            .ok_or_else(|| anyhow::anyhow!("Unknown cache scope {s}"))
    }
}

/// Logical identity of a cached page, independent of its URL.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheKey {
    pub sport: Option<String>,
    pub year: Option<String>,
    pub set_title: Option<String>,
    pub card_name: Option<String>,
    pub card_number: Option<String>,
}

impl CacheKey {
    pub fn index() -> Self {
        Self::default()
    }

    pub fn sport(sport: &str) -> Self {
        Self {
            sport: Some(sport.to_string()),
            ..Default::default()
        }
    }

    pub fn year(sport: &str, year: &str) -> Self {
        Self {
            year: Some(year.to_string()),
            ..Self::sport(sport)
        }
    }

    pub fn set(sport: &str, year: &str, set_title: &str) -> Self {
        Self {
            set_title: Some(set_title.to_string()),
            ..Self::year(sport, year)
        }
    }

    pub fn card(
        sport: &str,
        year: &str,
        set_title: &str,
        card_name: &str,
        card_number: Option<&str>,
    ) -> Self {
        Self {
            card_name: Some(card_name.to_string()),
            card_number: card_number.map(str::to_string),
            ..Self::set(sport, year, set_title)
        }
    }

    fn digest(&self, scope: CacheScope) -> String {
        let mut hasher = Sha256::new();
        hasher.update(scope.as_str().as_bytes());
        for part in [
            &self.sport,
            &self.year,
            &self.set_title,
            &self.card_name,
            &self.card_number,
        ] {
            hasher.update([0x1f]);
            if let Some(part) = part {
                hasher.update(normalize(part).to_lowercase().as_bytes());
            }
        }
        hasher
            .finalize()
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Entry {
    scope: CacheScope,
    key: CacheKey,
    cached_at: DateTime<Utc>,
    /// Seconds
    ttl: u64,
    value: String,
}

impl Entry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        let ttl = Duration::seconds(self.ttl.min(MAX_TTL_SECS) as i64);
        self.cached_at + ttl <= now
    }
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub enabled: bool,
    pub memory_entries: usize,
    pub disk_entries: usize,
    pub disk_bytes: u64,
    pub expired_entries: usize,
    pub hits: u64,
    pub misses: u64,
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.enabled {
            return f.write_str("cache disabled");
        }
        write!(
            f,
            "{} in memory, {} on disk ({} bytes, {} expired), {} hits, {} misses",
            self.memory_entries,
            self.disk_entries,
            self.disk_bytes,
            self.expired_entries,
            self.hits,
            self.misses
        )
    }
}

pub struct TieredCache {
    enabled: bool,
    dir: PathBuf,
    ttl: CacheTtl,
    memory: Mutex<LruCache<String, Entry>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl TieredCache {
    pub fn new(config: &CacheConfig) -> Self {
        let capacity = NonZeroUsize::new(config.memory_capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            enabled: config.enabled,
            dir: config.dir.clone(),
            ttl: config.ttl.clone(),
            memory: Mutex::new(LruCache::new(capacity)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn disabled() -> Self {
        Self::new(&CacheConfig {
            enabled: false,
            ..Default::default()
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Returns the cached page of `key` when present and still valid.
    pub async fn get(&self, scope: CacheScope, key: &CacheKey) -> Option<String> {
        if !self.enabled {
            return None;
        }
        let digest = key.digest(scope);
        let now = Utc::now();

        let in_memory = self.lock_memory().get(&digest).cloned();
        if let Some(entry) = in_memory {
            if !entry.is_expired(now) {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Some(entry.value);
            }
            self.lock_memory().pop(&digest);
        }

        let path = self.entry_path(scope, &digest);
        match read_entry(&path).await {
            Some(entry) if !entry.is_expired(now) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                let value = entry.value.clone();
                self.lock_memory().put(digest, entry);
                Some(value)
            }
            Some(_) => {
                log::trace!("Cache entry {scope}/{digest} expired");
                remove_file(&path).await;
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Stores `value` for the time to live configured for `scope`.
    pub async fn set(&self, scope: CacheScope, key: &CacheKey, value: &str) {
        self.set_with_ttl(scope, key, value, scope.ttl(&self.ttl))
            .await
    }

    pub async fn set_with_ttl(&self, scope: CacheScope, key: &CacheKey, value: &str, ttl: u64) {
        if !self.enabled {
            return;
        }
        let digest = key.digest(scope);
        let entry = Entry {
            scope,
            key: key.clone(),
            cached_at: Utc::now(),
            ttl,
            value: value.to_string(),
        };

        let path = self.entry_path(scope, &digest);
        if let Err(e) = write_entry(&path, &entry).await {
            log::warn!("Couldn't write cache entry {}: {e:#}", path.display());
        }
        self.lock_memory().put(digest, entry);
    }

    pub async fn invalidate(&self, scope: CacheScope, key: &CacheKey) {
        let digest = key.digest(scope);
        self.lock_memory().pop(&digest);
        remove_file(&self.entry_path(scope, &digest)).await;
    }

    /// Removes every entry of `scope`, returning how many files were deleted.
    pub async fn clear_scope(&self, scope: CacheScope) -> usize {
        self.forget_where(|entry| entry.scope == scope);
        self.remove_where(&[scope], |_| true).await
    }

    /// Removes every entry stored for `sport`.
    pub async fn clear_sport(&self, sport: &str) -> usize {
        let of_sport = |entry: &Entry| {
            entry
                .key
                .sport
                .as_deref()
                .is_some_and(|s| s.eq_ignore_ascii_case(sport))
        };
        self.forget_where(of_sport);
        self.remove_where(&CacheScope::ALL, of_sport).await
    }

    pub async fn clear_all(&self) -> usize {
        self.lock_memory().clear();
        self.remove_where(&CacheScope::ALL, |_| true).await
    }

    /// Drops expired entries from both tiers.
    pub async fn cleanup_expired(&self) -> usize {
        let now = Utc::now();
        self.forget_where(|entry| entry.is_expired(now));
        self.remove_where(&CacheScope::ALL, |entry| entry.is_expired(now))
            .await
    }

    pub async fn stats(&self) -> CacheStats {
        let mut stats = CacheStats {
            enabled: self.enabled,
            memory_entries: self.lock_memory().len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            ..Default::default()
        };
        if !self.enabled {
            return stats;
        }

        let now = Utc::now();
        for scope in CacheScope::ALL {
            for path in self.scope_files(scope).await {
                if let Ok(meta) = tokio::fs::metadata(&path).await {
                    stats.disk_bytes += meta.len();
                }
                stats.disk_entries += 1;
                if read_entry(&path).await.map_or(true, |e| e.is_expired(now)) {
                    stats.expired_entries += 1;
                }
            }
        }
        stats
    }

    fn forget_where<F>(&self, pred: F)
    where
        F: Fn(&Entry) -> bool,
    {
        let mut memory = self.lock_memory();
        let keys = memory
            .iter()
            .filter(|(_, entry)| pred(entry))
            .map(|(key, _)| key.clone())
            .collect::<Vec<_>>();
        for key in keys {
            memory.pop(&key);
        }
    }

    async fn remove_where<F>(&self, scopes: &[CacheScope], pred: F) -> usize
    where
        F: Fn(&Entry) -> bool,
    {
        let mut removed = 0;
        for &scope in scopes {
            for path in self.scope_files(scope).await {
                // Unreadable entries are garbage either way
                let remove = read_entry(&path).await.map_or(true, |e| pred(&e));
                if remove && tokio::fs::remove_file(&path).await.is_ok() {
                    removed += 1;
                }
            }
        }
        log::debug!("Removed {removed} cache entries");
        removed
    }

    async fn scope_files(&self, scope: CacheScope) -> Vec<PathBuf> {
        let mut files = vec![];
        let Ok(mut dir) = tokio::fs::read_dir(self.dir.join(scope.as_str())).await else {
            return files;
        };
        while let Ok(Some(entry)) = dir.next_entry().await {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                files.push(path);
            }
        }
        files
    }

    fn entry_path(&self, scope: CacheScope, digest: &str) -> PathBuf {
        self.dir.join(scope.as_str()).join(format!("{digest}.json"))
    }

    fn lock_memory(&self) -> std::sync::MutexGuard<'_, LruCache<String, Entry>> {
        self.memory.lock().unwrap_or_else(|e| e.into_inner())
    }
}

async fn read_entry(path: &Path) -> Option<Entry> {
    let raw = tokio::fs::read(path).await.ok()?;
    match serde_json::from_slice(&raw) {
        Ok(entry) => Some(entry),
        Err(e) => {
            log::debug!("Ignoring corrupt cache entry {}: {e}", path.display());
            None
        }
    }
}

async fn write_entry(path: &Path, entry: &Entry) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, serde_json::to_vec(entry)?).await?;
    Ok(())
}

async fn remove_file(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            log::debug!("Couldn't remove cache entry {}: {e}", path.display());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn baseball() -> CacheKey {
        CacheKey::sport("Baseball")
    }

    fn cache_in(dir: &Path) -> TieredCache {
        TieredCache::new(&CacheConfig {
            dir: dir.to_path_buf(),
            memory_capacity: 2,
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn disk_hits_survive_a_new_instance() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(dir.path());
        assert_eq!(cache.get(CacheScope::Years, &baseball()).await, None);
        cache.set(CacheScope::Years, &baseball(), "<table/>").await;
        assert_eq!(
            cache.get(CacheScope::Years, &baseball()).await.as_deref(),
            Some("<table/>")
        );

        let reopened = cache_in(dir.path());
        assert_eq!(
            reopened.get(CacheScope::Years, &baseball()).await.as_deref(),
            Some("<table/>")
        );
        let stats = reopened.stats().await;
        assert_eq!(stats.memory_entries, 1);
        assert_eq!(stats.hits, 1);
    }

    #[tokio::test]
    async fn keys_are_scoped_and_normalized() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(dir.path());
        let key = CacheKey::set("Baseball", "1989", "Upper Deck");
        cache.set(CacheScope::Sets, &key, "cards").await;

        assert_eq!(cache.get(CacheScope::Cards, &key).await, None);
        let same = CacheKey::set("baseball", "1989", "upper  deck");
        assert_eq!(cache.get(CacheScope::Sets, &same).await.as_deref(), Some("cards"));
        let other = CacheKey::set("Baseball", "1990", "Upper Deck");
        assert_eq!(cache.get(CacheScope::Sets, &other).await, None);
    }

    #[tokio::test]
    async fn expired_entries_are_misses() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(dir.path());
        let key = CacheKey::card("Baseball", "1989", "Donruss", "Gary Carter", Some("53"));

        cache.set_with_ttl(CacheScope::CardDetails, &key, "grades", 0).await;
        assert_eq!(cache.get(CacheScope::CardDetails, &key).await, None);
        assert_eq!(cache.stats().await.disk_entries, 0);
    }

    #[tokio::test]
    async fn cleanup_only_drops_expired() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(dir.path());
        let stale = CacheKey::year("Baseball", "1989");
        let fresh = CacheKey::year("Baseball", "1990");

        cache.set_with_ttl(CacheScope::Sets, &stale, "stale", 0).await;
        cache.set(CacheScope::Sets, &fresh, "fresh").await;
        assert_eq!(cache.cleanup_expired().await, 1);
        assert_eq!(
            cache.get(CacheScope::Sets, &fresh).await.as_deref(),
            Some("fresh")
        );
    }

    #[tokio::test]
    async fn clear_by_sport_and_scope() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(dir.path());
        let hockey = CacheKey::year("Hockey", "1990");
        cache.set(CacheScope::Years, &baseball(), "1").await;
        cache
            .set(CacheScope::Sets, &CacheKey::year("Baseball", "1989"), "2")
            .await;
        cache.set(CacheScope::Sets, &hockey, "3").await;

        assert_eq!(cache.clear_sport("baseball").await, 2);
        assert_eq!(cache.get(CacheScope::Sets, &hockey).await.as_deref(), Some("3"));
        assert_eq!(cache.clear_scope(CacheScope::Sets).await, 1);
        assert_eq!(cache.get(CacheScope::Sets, &hockey).await, None);
        assert_eq!(cache.stats().await.disk_entries, 0);
    }

    #[tokio::test]
    async fn disabled_cache_stores_nothing() {
        let cache = TieredCache::disabled();
        cache.set(CacheScope::Years, &baseball(), "x").await;
        assert_eq!(cache.get(CacheScope::Years, &baseball()).await, None);
        assert!(!cache.stats().await.enabled);
    }

    #[test]
    fn scope_names_round_trip() {
        for scope in CacheScope::ALL {
            assert_eq!(scope.as_str().parse::<CacheScope>().unwrap(), scope);
        }
        assert!("pages".parse::<CacheScope>().is_err());
    }
}
