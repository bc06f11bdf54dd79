//! Tamper-evident result store
//!
//! Results persist as one `results.json` blob (plaintext or encrypted)
//! plus an optional `results.json.sig` detached signature. Every write
//! rewrites the whole file; a single server process (or an externally
//! serialized chain of `--once` processes) must own a data directory at
//! a time, there is no internal locking.

pub mod crypto;

use std::fs;
use std::path::{Path, PathBuf};

use crate::record::ScanRecord;
use crate::{EngineError, Result};
use crypto::{IntegritySigner, StoreCipher};

const RESULTS_FILE: &str = "results.json";
const SIG_SUFFIX: &str = ".sig";

/// Ordered sequence of scan results on disk, oldest first
pub struct ResultStore {
    dir: PathBuf,
    cipher: Option<StoreCipher>,
    signer: Option<IntegritySigner>,
}

impl ResultStore {
    pub fn new<P: AsRef<Path>>(
        dir: P,
        encrypt_key: Option<&str>,
        integrity_key: Option<&str>,
    ) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            cipher: encrypt_key.map(StoreCipher::new),
            signer: integrity_key.map(IntegritySigner::new),
        }
    }

    fn results_path(&self) -> PathBuf {
        self.dir.join(RESULTS_FILE)
    }

    fn sig_path(&self) -> PathBuf {
        self.dir.join(format!("{}{}", RESULTS_FILE, SIG_SUFFIX))
    }

    /// Load the stored sequence.
    ///
    /// Fails closed: a missing file yields an empty sequence, and so
    /// does any integrity mismatch, decrypt failure or parse failure.
    /// The caller never sees partially-correct or unverified data.
    pub fn load(&self) -> Vec<ScanRecord> {
        let path = self.results_path();
        let raw = match fs::read(&path) {
            Ok(raw) => raw,
            Err(_) => return Vec::new(),
        };

        if let Some(signer) = &self.signer {
            let signature = match fs::read_to_string(self.sig_path()) {
                Ok(signature) => signature,
                Err(_) => {
                    log::warn!("integrity key configured but sidecar missing, discarding store");
                    return Vec::new();
                }
            };
            if !signer.verify(&raw, &signature) {
                log::warn!("results signature mismatch, discarding store");
                return Vec::new();
            }
        }

        let plaintext = match &self.cipher {
            Some(cipher) => match cipher.decrypt(&raw) {
                Ok(plaintext) => plaintext,
                Err(e) => {
                    log::warn!("results decrypt failed, discarding store: {}", e);
                    return Vec::new();
                }
            },
            None => raw,
        };

        match serde_json::from_slice(&plaintext) {
            Ok(records) => records,
            Err(e) => {
                log::warn!("results file unparseable, discarding store: {}", e);
                Vec::new()
            }
        }
    }

    /// Serialize and write the full sequence, refreshing the sidecar
    /// signature (or removing a stale one) and restricting permissions
    /// to owner-only
    pub fn save(&self, records: &[ScanRecord]) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .map_err(|e| EngineError::Storage(format!("create data dir: {}", e)))?;

        let mut bytes = serde_json::to_vec(records)?;
        if let Some(cipher) = &self.cipher {
            bytes = cipher.encrypt(&bytes)?;
        }

        match &self.signer {
            Some(signer) => {
                fs::write(self.sig_path(), signer.sign(&bytes))
                    .map_err(|e| EngineError::Storage(format!("write sidecar: {}", e)))?;
            }
            None => {
                let _ = fs::remove_file(self.sig_path());
            }
        }

        let path = self.results_path();
        fs::write(&path, &bytes)
            .map_err(|e| EngineError::Storage(format!("write results: {}", e)))?;
        restrict_permissions(&path)?;
        if self.signer.is_some() {
            restrict_permissions(&self.sig_path())?;
        }

        Ok(())
    }

    /// Load-all, add one, save-all. Returns the new sequence.
    pub fn append(&self, record: ScanRecord) -> Result<Vec<ScanRecord>> {
        let mut records = self.load();
        records.push(record);
        self.save(&records)?;
        Ok(records)
    }

    /// Keep only the most recent `limit` entries, in original relative
    /// order. Returns the remaining count.
    pub fn purge(&self, limit: usize) -> Result<usize> {
        let mut records = self.load();
        if records.len() > limit {
            records.drain(0..records.len() - limit);
            self.save(&records)?;
        }
        Ok(records.len())
    }

    /// Entries whose `tags` contains `tag`, in original order; when
    /// `limit > 0` only the most recent `limit` matches survive
    pub fn search(&self, tag: &str, limit: usize) -> Vec<ScanRecord> {
        let mut matches: Vec<ScanRecord> = self
            .load()
            .into_iter()
            .filter(|r| r.has_tag(tag))
            .collect();
        if limit > 0 && matches.len() > limit {
            matches.drain(0..matches.len() - limit);
        }
        matches
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))
        .map_err(|e| EngineError::Storage(format!("chmod {}: {}", path.display(), e)))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<()> {
    Ok(())
}
