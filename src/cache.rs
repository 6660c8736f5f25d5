//! Stubs of expensive stage outputs, stored as JSON next to each other in one directory.

use std::fmt;
use std::fs;
use std::path::PathBuf;

use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::config::CacheConfig;
use crate::error::Error;

/// Bumped whenever a cached payload changes shape.
pub const CACHE_VERSION: u32 = 1;

/// Key of a cache entry: the stage kind plus a SHA-256 over everything the result depends on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    kind: String,
    digest: String,
}

impl Fingerprint {
    pub fn new<C: Serialize>(kind: &str, video: &str, config: &C) -> Result<Self, Error> {
        let config = serde_json::to_vec(config)?;

        let mut hasher = Sha256::new();
        hasher.update(kind.as_bytes());
        hasher.update([0u8]);
        hasher.update(CACHE_VERSION.to_le_bytes());
        hasher.update(video.as_bytes());
        hasher.update([0u8]);
        hasher.update(&config);

        Ok(Self {
            kind: kind.to_string(),
            digest: format!("{:x}", hasher.finalize()),
        })
    }

    #[inline]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    #[inline]
    pub fn digest(&self) -> &str {
        &self.digest
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.kind, self.digest)
    }
}

#[derive(Debug, Clone)]
pub struct StubCache {
    dir: PathBuf,
    read: bool,
    write: bool,
}

impl StubCache {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self {
            dir: dir.into(),
            read: true,
            write: true,
        }
    }

    /// `None` when no stub directory is configured.
    pub fn from_config(config: &CacheConfig) -> Option<Self> {
        config.dir.as_ref().map(|dir| Self {
            dir: dir.clone(),
            read: config.read,
            write: config.write,
        })
    }

    pub fn path(&self, fp: &Fingerprint) -> PathBuf {
        self.dir.join(format!("{}.json", fp))
    }

    /// Stored value, or `None` on a miss. Unreadable stubs count as a miss.
    pub fn load<T: DeserializeOwned>(&self, fp: &Fingerprint) -> Result<Option<T>, Error> {
        if !self.read {
            return Ok(None);
        }

        let path = self.path(fp);
        let raw = match fs::read(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };

        match serde_json::from_slice(&raw) {
            Ok(value) => Ok(Some(value)),
            Err(err) => {
                warn!(path = %path.display(), %err, "ignoring unreadable stub");
                Ok(None)
            }
        }
    }

    pub fn store<T: Serialize>(&self, fp: &Fingerprint, value: &T) -> Result<(), Error> {
        if !self.write {
            return Ok(());
        }

        fs::create_dir_all(&self.dir)?;

        let path = self.path(fp);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec(value)?)?;
        fs::rename(&tmp, &path)?;

        debug!(path = %path.display(), "stub written");
        Ok(())
    }

    /// Returns a hit verbatim, otherwise computes, stores and returns the value.
    pub fn get_or_compute<T, F>(&self, fp: &Fingerprint, compute: F) -> Result<T, Error>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Result<T, Error>,
    {
        if let Some(value) = self.load(fp)? {
            info!(kind = fp.kind(), "loaded from stub");
            return Ok(value);
        }

        let value = compute()?;
        self.store(fp, &value)?;

        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn fingerprint_depends_on_every_input() {
        let base = Fingerprint::new("tracks", "match.mp4", &[1, 2, 3]).unwrap();

        assert_eq!(base, Fingerprint::new("tracks", "match.mp4", &[1, 2, 3]).unwrap());
        assert_ne!(base, Fingerprint::new("camera_motion", "match.mp4", &[1, 2, 3]).unwrap());
        assert_ne!(base, Fingerprint::new("tracks", "other.mp4", &[1, 2, 3]).unwrap());
        assert_ne!(base, Fingerprint::new("tracks", "match.mp4", &[1, 2, 4]).unwrap());

        assert_eq!(base.digest().len(), 64);
        assert!(base.to_string().starts_with("tracks-"));
    }

    #[test]
    fn computes_once_then_hits() {
        let dir = tempfile::tempdir().unwrap();
        let cache = StubCache::new(dir.path().join("stubs"));
        let fp = Fingerprint::new("tracks", "a", &0).unwrap();
        let calls = Cell::new(0);

        let compute = || {
            calls.set(calls.get() + 1);
            Ok(vec![1.5f32, 2.5])
        };

        assert_eq!(cache.get_or_compute(&fp, compute).unwrap(), vec![1.5, 2.5]);
        assert_eq!(cache.get_or_compute(&fp, compute).unwrap(), vec![1.5, 2.5]);
        assert_eq!(calls.get(), 1);
        assert!(cache.path(&fp).exists());
    }

    #[test]
    fn read_and_write_switches() {
        let dir = tempfile::tempdir().unwrap();
        let fp = Fingerprint::new("camera_motion", "a", &0).unwrap();

        let no_write = StubCache {
            write: false,
            ..StubCache::new(dir.path())
        };
        no_write.get_or_compute(&fp, || Ok(1u32)).unwrap();
        assert!(!no_write.path(&fp).exists());

        StubCache::new(dir.path()).store(&fp, &7u32).unwrap();

        let no_read = StubCache {
            read: false,
            ..StubCache::new(dir.path())
        };
        assert_eq!(no_read.get_or_compute(&fp, || Ok(3u32)).unwrap(), 3);
        assert_eq!(StubCache::new(dir.path()).load::<u32>(&fp).unwrap(), Some(3));
    }

    #[test]
    fn corrupt_stub_is_recomputed() {
        let dir = tempfile::tempdir().unwrap();
        let cache = StubCache::new(dir.path());
        let fp = Fingerprint::new("tracks", "a", &0).unwrap();

        fs::write(cache.path(&fp), b"{ not json").unwrap();
        assert_eq!(cache.get_or_compute(&fp, || Ok(5u8)).unwrap(), 5);
    }

    #[test]
    fn disabled_without_dir() {
        assert!(StubCache::from_config(&CacheConfig::default()).is_none());
    }
}
