//! Authorization gate: alias whitelist and endpoint hygiene checks
//!
//! Every request names an alias; only whitelisted aliases ever reach a
//! handler. The registry is loaded once at startup and is default-deny
//! for anything not listed.

use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::Path;

/// Aliases shipped as the built-in whitelist
pub const DEFAULT_ALIASES: &[&str] = &[
    "scan",
    "report",
    "results",
    "search",
    "purge",
    "chat",
    "plan",
    "modules",
    "params",
    "explore",
    "train",
    "train_cve",
    "train_success",
    "operator",
    "stats",
];

#[derive(Debug, Deserialize)]
struct AliasFile {
    #[serde(default)]
    aliases: Vec<String>,
}

/// Immutable set of approved alias strings
#[derive(Debug, Clone)]
pub struct AliasRegistry {
    aliases: HashSet<String>,
}

impl AliasRegistry {
    /// Registry with the built-in alias set
    pub fn default_approved() -> Self {
        Self {
            aliases: DEFAULT_ALIASES.iter().map(|a| a.to_string()).collect(),
        }
    }

    /// Load the whitelist from a JSON file of shape `{"aliases": [...]}`.
    ///
    /// A missing or unparseable file yields an empty registry: nothing
    /// is approved until the operator ships a valid whitelist.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Self {
        let aliases = match fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<AliasFile>(&content) {
                Ok(file) => file.aliases.into_iter().collect(),
                Err(e) => {
                    log::warn!(
                        "alias file {} unparseable, denying all: {}",
                        path.as_ref().display(),
                        e
                    );
                    HashSet::new()
                }
            },
            Err(_) => {
                log::warn!(
                    "alias file {} missing, denying all",
                    path.as_ref().display()
                );
                HashSet::new()
            }
        };
        Self { aliases }
    }

    /// Membership test against the whitelist
    pub fn is_approved(&self, alias: &str) -> bool {
        self.aliases.contains(alias)
    }

    pub fn len(&self) -> usize {
        self.aliases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty()
    }
}

/// Verify a bound UNIX endpoint is actually a socket and is not
/// group/world-writable. A defense against local multi-tenant hosts
/// where another user could swap or widen the endpoint.
#[cfg(unix)]
pub fn check_endpoint_permissions<P: AsRef<Path>>(path: P) -> bool {
    use std::os::unix::fs::FileTypeExt;
    use std::os::unix::fs::PermissionsExt;

    let metadata = match fs::metadata(&path) {
        Ok(metadata) => metadata,
        Err(_) => return false,
    };

    if !metadata.file_type().is_socket() {
        return false;
    }

    metadata.permissions().mode() & 0o022 == 0
}
