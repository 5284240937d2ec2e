//! Credential extraction from the Slack desktop client.
//!
//! The desktop app keeps one workspace token per signed-in team inside its
//! Chromium LevelDB storage, and the session cookie in a Chromium cookie
//! database. Neither is guaranteed to be intact - stores get compacted,
//! locked and corrupted while the app runs - so everything below the
//! directory-presence check is tolerant: a store that cannot be read
//! contributes zero tokens and a skip reason instead of failing the pass.

mod cookies;
mod fields;

pub use cookies::recover_cookie;
pub use fields::{FieldExtractor, RawTokenInfo};

use crate::credentials::WorkspaceCredentials;
use crate::error::{Error, Result};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Store-file extensions that classify a directory as a LevelDB store.
const STORE_EXTENSIONS: &[&str] = &["ldb", "log"];

/// Sentinel file LevelDB keeps at the store root.
const STORE_SENTINEL: &str = "CURRENT";

/// Outcome of scanning one classified store directory.
#[derive(Debug)]
pub enum StoreOutcome {
    /// Store opened and scanned; carries how many fresh tokens it yielded.
    Scanned { tokens: usize },
    /// Store could not be read; carries why. Never aborts the pass.
    Skipped { reason: String },
}

/// Everything one extraction pass produced.
#[derive(Debug)]
pub struct Extraction {
    /// One entry per distinct token, all sharing the recovered cookie.
    pub credentials: Vec<WorkspaceCredentials>,
    /// Per-store outcomes, for callers that want to know why a store
    /// yielded nothing.
    pub outcomes: Vec<(PathBuf, StoreOutcome)>,
    /// The session cookie, empty when none was recoverable.
    pub cookie: String,
}

/// Scans the desktop client's app-data directory for tokens and the session
/// cookie. Construction fixes the platform; extraction is a single pass.
pub struct TokenExtractor {
    store_dir: PathBuf,
    fields: FieldExtractor,
}

impl TokenExtractor {
    /// Extractor for a platform identifier. Unknown identifiers fail here;
    /// no extraction is attempted for them.
    pub fn new(platform: &str) -> Result<Self> {
        Ok(Self {
            store_dir: store_dir_for(platform)?,
            fields: FieldExtractor::new(),
        })
    }

    /// Extractor for the running platform.
    pub fn for_current_platform() -> Result<Self> {
        Self::new(std::env::consts::OS)
    }

    /// Extractor rooted at an explicit directory (tests, portable installs).
    pub fn with_store_dir(store_dir: PathBuf) -> Self {
        Self {
            store_dir,
            fields: FieldExtractor::new(),
        }
    }

    /// The app-data directory this extractor scans.
    pub fn store_dir(&self) -> &Path {
        &self.store_dir
    }

    /// One extraction pass: classify store directories under `storage`,
    /// scan each independently, recover the cookie, fold into credentials.
    /// Only a missing app-data directory is fatal.
    pub fn extract(&self) -> Result<Extraction> {
        if !self.store_dir.exists() {
            return Err(Error::SourceDirectoryNotFound(self.store_dir.clone()));
        }

        let mut stores = Vec::new();
        collect_store_dirs(&self.store_dir.join("storage"), &mut stores);
        debug!("classified {} store directories", stores.len());

        let cookie = recover_cookie(&self.store_dir);

        let mut outcomes = Vec::new();
        let mut infos: Vec<RawTokenInfo> = Vec::new();
        let mut seen = HashSet::new();

        for store in stores {
            match self.scan_store(&store) {
                Ok(found) => {
                    let mut fresh = 0;
                    for info in found {
                        if seen.insert(info.token.clone()) {
                            infos.push(info);
                            fresh += 1;
                        }
                    }
                    outcomes.push((store, StoreOutcome::Scanned { tokens: fresh }));
                }
                Err(e) => {
                    warn!("skipping store {}: {}", store.display(), e);
                    outcomes.push((
                        store,
                        StoreOutcome::Skipped {
                            reason: e.to_string(),
                        },
                    ));
                }
            }
        }

        let credentials = infos
            .into_iter()
            .map(|info| WorkspaceCredentials {
                workspace_id: info.team_id,
                workspace_name: info.team_name,
                token: info.token,
                cookie: cookie.clone(),
            })
            .collect();

        Ok(Extraction {
            credentials,
            outcomes,
            cookie,
        })
    }

    /// Scan one LevelDB directory. Store files are read raw and decoded
    /// lossily - a token fragment survives even when the store as a whole
    /// would not open cleanly. Handles are scoped to each read and released
    /// on every exit path; unreadable files contribute nothing.
    fn scan_store(&self, dir: &Path) -> std::io::Result<Vec<RawTokenInfo>> {
        let mut found = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            if !is_store_file(&path) {
                continue;
            }
            let bytes = match std::fs::read(&path) {
                Ok(b) => b,
                Err(e) => {
                    debug!("unreadable store file {}: {}", path.display(), e);
                    continue;
                }
            };
            let text = String::from_utf8_lossy(&bytes);
            found.extend(self.fields.extract(&text));
        }
        Ok(found)
    }
}

/// Well-known app-data path per platform identifier. Both the Rust OS names
/// and the Electron-style identifiers are accepted.
fn store_dir_for(platform: &str) -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| Error::SourceDirectoryNotFound(PathBuf::from("~")))?;
    match platform {
        "macos" | "darwin" => Ok(home.join("Library/Application Support/Slack")),
        "linux" => Ok(home.join(".config/Slack")),
        "windows" | "win32" => {
            let appdata = std::env::var_os("APPDATA")
                .map(PathBuf::from)
                .unwrap_or_else(|| home.join("AppData").join("Roaming"));
            Ok(appdata.join("Slack"))
        }
        other => Err(Error::UnsupportedPlatform(other.to_string())),
    }
}

/// Recursively collect directories that look like LevelDB stores. The check
/// is heuristic and best-effort: one store-extension file or a CURRENT
/// sentinel is enough; a fully valid store is never required. Unreadable
/// directories are silently passed over.
fn collect_store_dirs(root: &Path, out: &mut Vec<PathBuf>) {
    let entries = match std::fs::read_dir(root) {
        Ok(e) => e,
        Err(_) => return,
    };

    let mut is_store = false;
    let mut subdirs = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            subdirs.push(path);
        } else if is_store_file(&path)
            || path.file_name().is_some_and(|n| n == STORE_SENTINEL)
        {
            is_store = true;
        }
    }

    if is_store {
        out.push(root.to_path_buf());
    }
    for sub in subdirs {
        collect_store_dirs(&sub, out);
    }
}

fn is_store_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| STORE_EXTENSIONS.contains(&ext))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_supported_platform_paths() {
        let home = dirs::home_dir().unwrap();
        assert_eq!(
            store_dir_for("macos").unwrap(),
            home.join("Library/Application Support/Slack")
        );
        assert_eq!(
            store_dir_for("darwin").unwrap(),
            home.join("Library/Application Support/Slack")
        );
        assert_eq!(store_dir_for("linux").unwrap(), home.join(".config/Slack"));
        // Windows resolves through APPDATA or the well-known roaming dir;
        // either way it ends in Slack.
        assert!(store_dir_for("windows").unwrap().ends_with("Slack"));
        assert!(store_dir_for("win32").unwrap().ends_with("Slack"));
    }

    #[test]
    fn test_unsupported_platform_fails_construction() {
        assert!(matches!(
            TokenExtractor::new("freebsd"),
            Err(Error::UnsupportedPlatform(_))
        ));
        assert!(matches!(
            TokenExtractor::new(""),
            Err(Error::UnsupportedPlatform(_))
        ));
    }

    #[test]
    fn test_missing_root_is_fatal() {
        let dir = TempDir::new().unwrap();
        let extractor = TokenExtractor::with_store_dir(dir.path().join("does-not-exist"));
        assert!(matches!(
            extractor.extract(),
            Err(Error::SourceDirectoryNotFound(_))
        ));
    }

    #[test]
    fn test_classification_heuristics() {
        let dir = TempDir::new().unwrap();
        let storage = dir.path().join("storage");

        // Sentinel only.
        std::fs::create_dir_all(storage.join("a")).unwrap();
        std::fs::write(storage.join("a").join("CURRENT"), b"MANIFEST-000001").unwrap();
        // Log file only, nested deeper.
        std::fs::create_dir_all(storage.join("b").join("leveldb")).unwrap();
        std::fs::write(storage.join("b").join("leveldb").join("000003.log"), b"").unwrap();
        // Neither: not a store.
        std::fs::create_dir_all(storage.join("c")).unwrap();
        std::fs::write(storage.join("c").join("readme.txt"), b"hi").unwrap();

        let mut stores = Vec::new();
        collect_store_dirs(&storage, &mut stores);
        stores.sort();

        assert_eq!(
            stores,
            vec![storage.join("a"), storage.join("b").join("leveldb")]
        );
    }

    #[test]
    fn test_empty_tree_extracts_nothing() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("storage")).unwrap();

        let extractor = TokenExtractor::with_store_dir(dir.path().to_path_buf());
        let extraction = extractor.extract().unwrap();
        assert!(extraction.credentials.is_empty());
        assert!(extraction.outcomes.is_empty());
        assert_eq!(extraction.cookie, "");
    }

    #[test]
    fn test_tokens_deduplicated_across_stores() {
        let dir = TempDir::new().unwrap();
        let storage = dir.path().join("storage");
        for name in ["one", "two"] {
            let store = storage.join(name);
            std::fs::create_dir_all(&store).unwrap();
            std::fs::write(
                store.join("000001.ldb"),
                br#"{"team_id":"T1","team_name":"Acme","token":"xoxc-same-token"}"#,
            )
            .unwrap();
        }

        let extractor = TokenExtractor::with_store_dir(dir.path().to_path_buf());
        let extraction = extractor.extract().unwrap();
        assert_eq!(extraction.credentials.len(), 1);
        assert_eq!(extraction.credentials[0].workspace_id, "T1");

        let scanned: Vec<usize> = extraction
            .outcomes
            .iter()
            .map(|(_, o)| match o {
                StoreOutcome::Scanned { tokens } => *tokens,
                StoreOutcome::Skipped { .. } => panic!("no store should be skipped"),
            })
            .collect();
        assert_eq!(scanned.iter().sum::<usize>(), 1);
    }

    #[test]
    fn test_unscannable_store_yields_io_error() {
        let dir = TempDir::new().unwrap();
        let not_a_dir = dir.path().join("store");
        std::fs::write(&not_a_dir, b"flat file where a store dir should be").unwrap();

        // The error is what extract() folds into a Skipped outcome.
        let extractor = TokenExtractor::with_store_dir(dir.path().to_path_buf());
        assert!(extractor.scan_store(&not_a_dir).is_err());
    }

    #[test]
    fn test_binary_noise_around_token_is_tolerated() {
        let dir = TempDir::new().unwrap();
        let store = dir.path().join("storage").join("leveldb");
        std::fs::create_dir_all(&store).unwrap();

        // LevelDB block framing: raw bytes around the interesting fragment.
        let mut blob = vec![0x00, 0x01, 0xff, 0xfe];
        blob.extend_from_slice(br#"x"team_id":"T77","team_name":"Wild","token":"xoxc-wild-1""#);
        blob.extend_from_slice(&[0xde, 0xad, 0xbe, 0xef]);
        std::fs::write(store.join("000042.log"), &blob).unwrap();

        let extractor = TokenExtractor::with_store_dir(dir.path().to_path_buf());
        let extraction = extractor.extract().unwrap();
        assert_eq!(extraction.credentials.len(), 1);
        assert_eq!(extraction.credentials[0].token, "xoxc-wild-1");
        assert_eq!(extraction.credentials[0].workspace_name, "Wild");
    }
}
