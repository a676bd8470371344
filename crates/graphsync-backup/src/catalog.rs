//! Backup naming, discovery and checksums.
//!
//! Backups live flat or nested under a backup directory:
//! ```text
//! {dir}/
//!   kb_2026-03-01_12-00-00.nq.gz
//!   kb_2026-03-01_12-00-00.nq.gz.blake3
//!   kb_2026-03-01_12-00-00.nq.gz.offsets.json
//! ```
//!
//! A backup is addressed by its file name; the sidecars follow it.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;

use crate::{BackupError, Result};

pub const BACKUP_SUFFIX: &str = ".nq.gz";
pub const CHECKSUM_SUFFIX: &str = ".blake3";
pub const OFFSETS_SUFFIX: &str = ".offsets.json";
pub const DEFAULT_DIR: &str = "./backups";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";
const TIMESTAMP_LEN: usize = 19;

/// One backup file found on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupEntry {
    pub name: String,
    /// Sanitised store name.
    pub store: String,
    pub created_at: DateTime<Utc>,
    pub size: u64,
    pub path: PathBuf,
}

/// File-system safe form of a store name: leading `/` dropped, the rest
/// turned into `_`.
pub fn sanitise(store: &str) -> String {
    store.strip_prefix('/').unwrap_or(store).replace('/', "_")
}

pub fn file_name(store: &str, at: DateTime<Utc>) -> String {
    format!("{}_{}{BACKUP_SUFFIX}", sanitise(store), at.format(TIMESTAMP_FORMAT))
}

pub fn checksum_path(backup: &Path) -> PathBuf {
    sidecar(backup, CHECKSUM_SUFFIX)
}

pub fn offsets_path(backup: &Path) -> PathBuf {
    sidecar(backup, OFFSETS_SUFFIX)
}

fn sidecar(backup: &Path, suffix: &str) -> PathBuf {
    let mut name = backup.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

/// Newest backup of `store` under `dir`, if any.
pub fn latest(dir: &Path, store: &str) -> Result<Option<BackupEntry>> {
    let wanted = sanitise(store);
    Ok(list(dir)?.into_iter().find(|e| e.store == wanted))
}

/// Split a backup file name into store and timestamp.
fn parse_name(name: &str) -> Option<(String, DateTime<Utc>)> {
    let stem = name.strip_suffix(BACKUP_SUFFIX)?;
    let split = stem.len().checked_sub(TIMESTAMP_LEN + 1)?;
    if !stem.is_char_boundary(split) {
        return None;
    }
    let (store, stamp) = stem.split_at(split);
    let stamp = stamp.strip_prefix('_')?;
    let at = NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT).ok()?;
    Some((store.to_string(), at.and_utc()))
}

/// Use the configured directory if it can be created, otherwise the
/// default.
pub fn resolve_dir(configured: Option<&Path>) -> PathBuf {
    if let Some(dir) = configured {
        match fs::create_dir_all(dir) {
            Ok(()) => return dir.to_path_buf(),
            Err(e) => tracing::warn!(
                dir = %dir.display(),
                error = %e,
                fallback = DEFAULT_DIR,
                "Backup directory unusable"
            ),
        }
    }
    let fallback = PathBuf::from(DEFAULT_DIR);
    if let Err(e) = fs::create_dir_all(&fallback) {
        tracing::error!(dir = %fallback.display(), error = %e, "Cannot create backup directory");
    }
    fallback
}

/// All backups under `dir`, newest first.
pub fn list(dir: &Path) -> Result<Vec<BackupEntry>> {
    let mut entries = Vec::new();
    collect_recursive(dir, &mut entries)?;
    entries.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.name.cmp(&b.name)));
    Ok(entries)
}

fn collect_recursive(dir: &Path, out: &mut Vec<BackupEntry>) -> Result<()> {
    if !dir.is_dir() {
        return Ok(());
    }
    for entry in fs::read_dir(dir)?.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_recursive(&path, out)?;
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if let Some((store, created_at)) = parse_name(name) {
            out.push(BackupEntry {
                name: name.to_string(),
                store,
                created_at,
                size: entry.metadata()?.len(),
                path: path.clone(),
            });
        }
    }
    Ok(())
}

/// The backup called `name` under `dir`.
pub fn find(dir: &Path, name: &str) -> Result<BackupEntry> {
    list(dir)?
        .into_iter()
        .find(|e| e.name == name)
        .ok_or_else(|| BackupError::NotFound(name.to_string()))
}

/// Remove a backup and its sidecars.
pub fn delete(dir: &Path, name: &str) -> Result<BackupEntry> {
    let entry = find(dir, name)?;
    fs::remove_file(&entry.path)?;
    for sidecar in [checksum_path(&entry.path), offsets_path(&entry.path)] {
        match fs::remove_file(&sidecar) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
    }
    tracing::info!(backup = %entry.name, path = %entry.path.display(), "Backup deleted");
    Ok(entry)
}

/// Delete all but the newest `keep` backups of `store`. Returns the names
/// removed.
pub fn prune(dir: &Path, store: &str, keep: usize) -> Result<Vec<String>> {
    let wanted = sanitise(store);
    let stale: Vec<BackupEntry> = list(dir)?
        .into_iter()
        .filter(|e| e.store == wanted)
        .skip(keep)
        .collect();
    let mut removed = Vec::with_capacity(stale.len());
    for entry in stale {
        removed.push(delete(dir, &entry.name)?.name);
    }
    Ok(removed)
}

/// What is known about one backup without restoring it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupDetails {
    #[serde(flatten)]
    pub entry: BackupEntry,
    /// Recorded checksum, when the sidecar exists.
    pub checksum: Option<String>,
    /// Whether the file still matches it.
    pub verified: Option<bool>,
    /// Consumer offsets recorded with the backup.
    pub offsets: BTreeMap<String, u64>,
}

pub fn details(dir: &Path, name: &str) -> Result<BackupDetails> {
    let entry = find(dir, name)?;
    let checksum = match fs::read_to_string(checksum_path(&entry.path)) {
        Ok(text) => Some(text.trim().to_string()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => None,
        Err(e) => return Err(e.into()),
    };
    let verified = match &checksum {
        Some(expected) => Some(file_checksum(&entry.path)? == *expected),
        None => None,
    };
    let offsets = match fs::read(offsets_path(&entry.path)) {
        Ok(bytes) => serde_json::from_slice(&bytes)?,
        Err(e) if e.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
        Err(e) => return Err(e.into()),
    };
    Ok(BackupDetails {
        entry,
        checksum,
        verified,
        offsets,
    })
}

/// Hex BLAKE3 of a file's bytes.
pub fn file_checksum(path: &Path) -> Result<String> {
    let mut hasher = blake3::Hasher::new();
    io::copy(&mut fs::File::open(path)?, &mut hasher)?;
    Ok(hasher.finalize().to_hex().to_string())
}

/// Compare a backup against its checksum sidecar.
pub fn verify(path: &Path) -> Result<bool> {
    let sidecar = checksum_path(path);
    let expected = match fs::read_to_string(&sidecar) {
        Ok(text) => text,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(BackupError::MissingChecksum(path.to_path_buf()))
        }
        Err(e) => return Err(e.into()),
    };
    let ok = file_checksum(path)? == expected.trim();
    if !ok {
        tracing::warn!(path = %path.display(), "Backup checksum mismatch");
    }
    Ok(ok)
}
