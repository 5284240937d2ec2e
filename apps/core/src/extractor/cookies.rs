//! Session cookie recovery from the desktop client's cookie database.
//!
//! The client keeps its cookies in a Chromium SQLite database, either at the
//! app-data root or under the browser-profile-style `Network/` subdirectory.
//! Only a plaintext-readable `d` cookie is recovered; values behind OS-level
//! encryption (Chromium v10/v11, Windows DPAPI) are out of scope and yield
//! no cookie.

use crate::credentials::COOKIE_PREFIX;
use rusqlite::{Connection, OpenFlags};
use std::path::Path;
use tracing::debug;

/// Cookie database locations relative to the app-data dir, tried in order.
const COOKIE_DB_PATHS: &[&str] = &["Cookies", "Network/Cookies"];

/// Prefixes marking an OS-encrypted cookie value: Chromium v10/v11 and the
/// Windows DPAPI blob header.
const ENCRYPTION_MARKERS: &[&[u8]] = &[b"v10", b"v11", &[0x01, 0x00, 0x00, 0x00]];

/// The most recently used `d` session cookie for the Slack domain, or an
/// empty string when no readable cookie exists. Database and row failures
/// are absorbed; this never fails the extraction pass.
pub fn recover_cookie(store_dir: &Path) -> String {
    for rel in COOKIE_DB_PATHS {
        let db_path = store_dir.join(rel);
        if !db_path.exists() {
            continue;
        }
        match read_cookie_db(&db_path) {
            Ok(Some(cookie)) => return cookie,
            Ok(None) => debug!("no readable session cookie in {}", db_path.display()),
            Err(e) => debug!("cookie db {} unreadable: {}", db_path.display(), e),
        }
    }
    String::new()
}

/// Open read-only, take the most recently accessed matching row, close.
fn read_cookie_db(db_path: &Path) -> rusqlite::Result<Option<String>> {
    let conn = Connection::open_with_flags(
        db_path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;

    let mut stmt = conn.prepare(
        "SELECT value, encrypted_value FROM cookies
         WHERE name = 'd' AND host_key LIKE '%slack.com'
         ORDER BY last_access_utc DESC
         LIMIT 1",
    )?;

    let row = stmt.query_row([], |row| {
        let value: String = row.get(0)?;
        let encrypted: Vec<u8> = row.get(1)?;
        Ok((value, encrypted))
    });

    let (value, encrypted) = match row {
        Ok(r) => r,
        Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(None),
        Err(e) => return Err(e),
    };

    // The plaintext column wins when it already carries the session prefix.
    if value.starts_with(COOKIE_PREFIX) {
        return Ok(Some(value));
    }

    // Encrypted column: a recognized encryption marker means decryption is
    // out of scope; raw bytes that already look like a session cookie are
    // taken as plaintext.
    if ENCRYPTION_MARKERS.iter().any(|m| encrypted.starts_with(m)) {
        return Ok(None);
    }
    if encrypted.starts_with(COOKIE_PREFIX.as_bytes()) {
        if let Ok(s) = String::from_utf8(encrypted) {
            return Ok(Some(s));
        }
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_cookie_db(path: &Path, rows: &[(&str, &str, &str, &[u8], i64)]) {
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
        for (name, host, value, encrypted, accessed) in rows {
            conn.execute(
                "INSERT INTO cookies (name, host_key, value, encrypted_value, last_access_utc)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![name, host, value, encrypted, accessed],
            )
            .unwrap();
        }
    }

    #[test]
    fn test_plaintext_cookie_recovered() {
        let dir = TempDir::new().unwrap();
        create_cookie_db(
            &dir.path().join("Cookies"),
            &[("d", ".slack.com", "xoxd-plain", b"", 100)],
        );
        assert_eq!(recover_cookie(dir.path()), "xoxd-plain");
    }

    #[test]
    fn test_most_recent_row_wins() {
        let dir = TempDir::new().unwrap();
        create_cookie_db(
            &dir.path().join("Cookies"),
            &[
                ("d", ".slack.com", "xoxd-old", b"", 100),
                ("d", ".slack.com", "xoxd-new", b"", 200),
            ],
        );
        assert_eq!(recover_cookie(dir.path()), "xoxd-new");
    }

    #[test]
    fn test_encrypted_marker_yields_no_cookie() {
        let dir = TempDir::new().unwrap();
        create_cookie_db(
            &dir.path().join("Cookies"),
            &[("d", ".slack.com", "", b"v10\x12\x34garbage", 100)],
        );
        assert_eq!(recover_cookie(dir.path()), "");
    }

    #[test]
    fn test_dpapi_marker_yields_no_cookie() {
        let dir = TempDir::new().unwrap();
        create_cookie_db(
            &dir.path().join("Cookies"),
            &[("d", ".slack.com", "", &[0x01, 0x00, 0x00, 0x00, 0xde, 0xad], 100)],
        );
        assert_eq!(recover_cookie(dir.path()), "");
    }

    #[test]
    fn test_unmarked_raw_bytes_with_prefix_are_plaintext() {
        let dir = TempDir::new().unwrap();
        create_cookie_db(
            &dir.path().join("Cookies"),
            &[("d", ".slack.com", "", b"xoxd-raw-but-fine", 100)],
        );
        assert_eq!(recover_cookie(dir.path()), "xoxd-raw-but-fine");
    }

    #[test]
    fn test_nested_network_path_is_tried() {
        let dir = TempDir::new().unwrap();
        create_cookie_db(
            &dir.path().join("Network").join("Cookies"),
            &[("d", ".slack.com", "xoxd-nested", b"", 100)],
        );
        assert_eq!(recover_cookie(dir.path()), "xoxd-nested");
    }

    #[test]
    fn test_missing_db_is_empty_cookie() {
        let dir = TempDir::new().unwrap();
        assert_eq!(recover_cookie(dir.path()), "");
    }

    #[test]
    fn test_other_domains_and_names_ignored() {
        let dir = TempDir::new().unwrap();
        create_cookie_db(
            &dir.path().join("Cookies"),
            &[
                ("d", ".example.com", "xoxd-wrong-domain", b"", 300),
                ("b", ".slack.com", "xoxd-wrong-name", b"", 300),
            ],
        );
        assert_eq!(recover_cookie(dir.path()), "");
    }

    #[test]
    fn test_corrupt_db_is_absorbed() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("Cookies"), b"not a sqlite database").unwrap();
        assert_eq!(recover_cookie(dir.path()), "");
    }
}
