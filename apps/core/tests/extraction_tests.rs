//! End-to-end extraction tests against a synthetic Slack app-data tree.
//!
//! Builds the directory shapes the desktop client actually produces
//! (LevelDB stores under `storage`, a Chromium cookie database at the root)
//! and runs a full extraction pass over them.

use std::path::Path;

use rusqlite::Connection;
use slacktap_core::extractor::StoreOutcome;
use slacktap_core::TokenExtractor;
use tempfile::TempDir;

/// Lay down one LevelDB-shaped store directory with the given value blob.
fn write_store(storage: &Path, name: &str, blob: &[u8]) {
    let store = storage.join(name);
    std::fs::create_dir_all(&store).unwrap();
    std::fs::write(store.join("CURRENT"), b"MANIFEST-000001\n").unwrap();
    std::fs::write(store.join("000005.ldb"), blob).unwrap();
}

/// Lay down a Chromium-style cookie database.
fn write_cookie_db(path: &Path, value: &str, encrypted: &[u8]) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    let conn = Connection::open(path).unwrap();
    conn.execute(
        "CREATE TABLE cookies (
            name TEXT,
            host_key TEXT,
            value TEXT,
            encrypted_value BLOB,
            last_access_utc INTEGER
        )",
        [],
    )
    .unwrap();
    conn.execute(
        "INSERT INTO cookies VALUES ('d', '.slack.com', ?1, ?2, 1700000000)",
        rusqlite::params![value, encrypted],
    )
    .unwrap();
}

#[test]
fn full_pass_pairs_every_token_with_the_shared_cookie() {
    let dir = TempDir::new().unwrap();
    let storage = dir.path().join("storage");

    write_store(
        &storage,
        "slack-storage/leveldb",
        br#"{"T100":{"team_id":"T100","team_name":"Acme","token":"xoxc-100-aaa"}}"#,
    );
    write_store(
        &storage,
        "other/leveldb",
        br#"noise..."team_id":"T200","domain":"beta-corp","token":"xoxc-200-bbb"...more"#,
    );
    write_cookie_db(&dir.path().join("Cookies"), "xoxd-session-1", b"");

    let extraction = TokenExtractor::with_store_dir(dir.path().to_path_buf())
        .extract()
        .unwrap();

    assert_eq!(extraction.cookie, "xoxd-session-1");
    assert_eq!(extraction.credentials.len(), 2);

    let acme = extraction
        .credentials
        .iter()
        .find(|c| c.workspace_id == "T100")
        .unwrap();
    assert_eq!(acme.workspace_name, "Acme");
    assert_eq!(acme.token, "xoxc-100-aaa");
    assert_eq!(acme.cookie, "xoxd-session-1");

    // team_name absent: the domain fragment fills in.
    let beta = extraction
        .credentials
        .iter()
        .find(|c| c.workspace_id == "T200")
        .unwrap();
    assert_eq!(beta.workspace_name, "beta-corp");
    assert_eq!(beta.cookie, "xoxd-session-1");

    // Every credential passes the prefix invariants.
    assert!(extraction.credentials.iter().all(|c| c.is_valid()));
}

#[test]
fn encrypted_cookie_still_yields_tokens() {
    let dir = TempDir::new().unwrap();
    let storage = dir.path().join("storage");

    write_store(
        &storage,
        "leveldb",
        br#""team_id":"T1","team_name":"Solo","token":"xoxc-1-solo""#,
    );
    // Chromium v10-encrypted cookie: out of scope, reported absent.
    write_cookie_db(
        &dir.path().join("Network").join("Cookies"),
        "",
        b"v10\x00\x01\x02ciphertext",
    );

    let extraction = TokenExtractor::with_store_dir(dir.path().to_path_buf())
        .extract()
        .unwrap();

    assert_eq!(extraction.cookie, "");
    assert_eq!(extraction.credentials.len(), 1);
    assert_eq!(extraction.credentials[0].cookie, "");
    assert!(extraction.credentials[0].is_valid());
}

#[test]
fn damaged_stores_never_abort_the_pass() {
    let dir = TempDir::new().unwrap();
    let storage = dir.path().join("storage");

    write_store(
        &storage,
        "good",
        br#""team_id":"T1","team_name":"Good","token":"xoxc-good""#,
    );

    // An unreadable sibling directory disappears from the walk instead of
    // failing it.
    #[cfg(unix)]
    let bad = {
        use std::os::unix::fs::PermissionsExt;
        let bad = storage.join("bad");
        std::fs::create_dir_all(&bad).unwrap();
        std::fs::write(bad.join("CURRENT"), b"MANIFEST-000001\n").unwrap();
        std::fs::set_permissions(&bad, std::fs::Permissions::from_mode(0o000)).unwrap();
        bad
    };

    // A classified store whose only store file is a dangling symlink
    // contributes zero tokens, not an error.
    #[cfg(unix)]
    {
        let hollow = storage.join("hollow");
        std::fs::create_dir_all(&hollow).unwrap();
        std::os::unix::fs::symlink(storage.join("nowhere"), hollow.join("000001.ldb")).unwrap();
    }

    let extraction = TokenExtractor::with_store_dir(dir.path().to_path_buf())
        .extract()
        .unwrap();

    // Restore so TempDir can clean up.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&bad, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    assert_eq!(extraction.credentials.len(), 1);
    assert_eq!(extraction.credentials[0].token, "xoxc-good");

    #[cfg(unix)]
    assert!(extraction.outcomes.iter().any(|(path, outcome)| {
        path.ends_with("hollow") && matches!(outcome, StoreOutcome::Scanned { tokens: 0 })
    }));
}

#[test]
fn tree_without_stores_returns_empty_without_error() {
    let dir = TempDir::new().unwrap();
    std::fs::create_dir_all(dir.path().join("storage").join("no-store-here")).unwrap();
    std::fs::write(
        dir.path().join("storage").join("no-store-here").join("x.txt"),
        b"not a store",
    )
    .unwrap();

    let extraction = TokenExtractor::with_store_dir(dir.path().to_path_buf())
        .extract()
        .unwrap();
    assert!(extraction.credentials.is_empty());
    assert!(extraction.outcomes.is_empty());
}
