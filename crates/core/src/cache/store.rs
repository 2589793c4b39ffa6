//! Named response caches.
//!
//! A cache maps an exact URL key to the most recently stored response.
//! Opening a cache that doesn't exist creates it; deleting a cache removes
//! all of its entries.

use super::connection::CacheDb;
use crate::Error;
use crate::http::{Headers, Response, ResponseSource};
use serde::{Deserialize, Serialize};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite::{self, OptionalExtension};

/// A stored response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub url: String,
    pub status: u16,
    pub headers: Headers,
    pub body: Vec<u8>,
    pub stored_at: String,
}

impl CacheEntry {
    /// Rebuild the response this entry was stored from.
    pub fn to_response(&self) -> Response {
        Response {
            status: self.status,
            headers: self.headers.clone(),
            body: self.body.clone(),
            source: ResponseSource::Cache,
        }
    }
}

/// Handle to one named cache.
#[derive(Clone, Debug)]
pub struct CacheHandle {
    db: CacheDb,
    name: String,
}

type EntryRow = (String, u16, String, Vec<u8>, String);

fn entry_from_row(row: EntryRow) -> Result<CacheEntry, Error> {
    let (url, status, headers_json, body, stored_at) = row;
    Ok(CacheEntry { url, status, headers: serde_json::from_str(&headers_json)?, body, stored_at })
}

fn select_entry(conn: &rusqlite::Connection, cache: &str, url: &str) -> Result<Option<CacheEntry>, Error> {
    let row: Option<EntryRow> = conn
        .query_row(
            "SELECT url, status, headers_json, body, stored_at
             FROM cache_entries WHERE cache_name = ?1 AND url = ?2",
            params![cache, url],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?)),
        )
        .optional()?;

    row.map(entry_from_row).transpose()
}

impl CacheDb {
    /// Open a named cache, creating it if needed.
    pub async fn open_cache(&self, name: &str) -> Result<CacheHandle, Error> {
        let cache_name = name.to_string();
        let now = chrono::Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT OR IGNORE INTO caches (name, created_at) VALUES (?1, ?2)",
                    params![cache_name, now],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)?;

        Ok(CacheHandle { db: self.clone(), name: name.to_string() })
    }

    /// Check whether a cache with this name exists.
    pub async fn has_cache(&self, name: &str) -> Result<bool, Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let exists =
                    conn.query_row("SELECT EXISTS(SELECT 1 FROM caches WHERE name = ?1)", params![name], |row| {
                        row.get(0)
                    })?;
                Ok(exists)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete a cache and every entry in it.
    ///
    /// Returns false if no cache had this name.
    pub async fn delete_cache(&self, name: &str) -> Result<bool, Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let deleted = conn.execute("DELETE FROM caches WHERE name = ?1", params![name])?;
                Ok(deleted > 0)
            })
            .await
            .map_err(Error::from)
    }

    /// All cache names, sorted.
    pub async fn cache_names(&self) -> Result<Vec<String>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare("SELECT name FROM caches ORDER BY name")?;
                let names = stmt
                    .query_map([], |row| row.get(0))?
                    .collect::<Result<Vec<String>, _>>()?;
                Ok(names)
            })
            .await
            .map_err(Error::from)
    }

    /// Look a URL up in several caches, returning the first hit in order.
    pub async fn match_any(&self, names: &[&str], url: &str) -> Result<Option<CacheEntry>, Error> {
        let names: Vec<String> = names.iter().map(|n| n.to_string()).collect();
        let url = url.to_string();
        self.conn
            .call(move |conn| -> Result<Option<CacheEntry>, Error> {
                for name in &names {
                    if let Some(entry) = select_entry(conn, name, &url)? {
                        return Ok(Some(entry));
                    }
                }
                Ok(None)
            })
            .await
            .map_err(Error::from)
    }
}

impl CacheHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Exact-URL lookup.
    pub async fn match_url(&self, url: &str) -> Result<Option<CacheEntry>, Error> {
        let name = self.name.clone();
        let url = url.to_string();
        self.db
            .conn
            .call(move |conn| select_entry(conn, &name, &url))
            .await
            .map_err(Error::from)
    }

    /// Store a response under `url`, replacing any previous entry.
    pub async fn put(&self, url: &str, response: &Response) -> Result<(), Error> {
        let name = self.name.clone();
        let url = url.to_string();
        let status = response.status;
        let headers_json = serde_json::to_string(&response.headers)?;
        let body = response.body.clone();
        let now = chrono::Utc::now().to_rfc3339();

        self.db
            .conn
            .call(move |conn| -> Result<(), Error> {
                // A handle may outlive a delete_cache; recreate the parent row.
                conn.execute(
                    "INSERT OR IGNORE INTO caches (name, created_at) VALUES (?1, ?2)",
                    params![name, now],
                )?;
                conn.execute(
                    "INSERT INTO cache_entries (cache_name, url, status, headers_json, body, stored_at)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                    ON CONFLICT(cache_name, url) DO UPDATE SET
                        status = excluded.status,
                        headers_json = excluded.headers_json,
                        body = excluded.body,
                        stored_at = excluded.stored_at",
                    params![name, url, status, headers_json, body, now],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)?;

        tracing::debug!(cache = %self.name, "stored response");
        Ok(())
    }

    /// Remove one entry. Returns false if it wasn't cached.
    pub async fn delete(&self, url: &str) -> Result<bool, Error> {
        let name = self.name.clone();
        let url = url.to_string();
        self.db
            .conn
            .call(move |conn| -> Result<bool, Error> {
                let deleted =
                    conn.execute("DELETE FROM cache_entries WHERE cache_name = ?1 AND url = ?2", params![name, url])?;
                Ok(deleted > 0)
            })
            .await
            .map_err(Error::from)
    }

    /// Cached URLs, sorted.
    pub async fn keys(&self) -> Result<Vec<String>, Error> {
        let name = self.name.clone();
        self.db
            .conn
            .call(move |conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare("SELECT url FROM cache_entries WHERE cache_name = ?1 ORDER BY url")?;
                let keys = stmt
                    .query_map(params![name], |row| row.get(0))?
                    .collect::<Result<Vec<String>, _>>()?;
                Ok(keys)
            })
            .await
            .map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn json_response(body: &str) -> Response {
        Response::new(200, body).with_header("Content-Type", "application/json")
    }

    #[tokio::test]
    async fn test_open_creates_cache() {
        let db = CacheDb::open_in_memory().await.unwrap();
        assert!(!db.has_cache("crisis-resources-v2").await.unwrap());

        let cache = db.open_cache("crisis-resources-v2").await.unwrap();
        assert_eq!(cache.name(), "crisis-resources-v2");
        assert!(db.has_cache("crisis-resources-v2").await.unwrap());
    }

    #[tokio::test]
    async fn test_put_and_match() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let cache = db.open_cache("crisis-resources-v2").await.unwrap();

        cache.put("/emergency-contacts.json", &json_response(r#"{"contacts":[]}"#)).await.unwrap();

        let entry = cache.match_url("/emergency-contacts.json").await.unwrap().unwrap();
        assert_eq!(entry.status, 200);
        assert_eq!(entry.body, br#"{"contacts":[]}"#);
        assert_eq!(entry.headers.get("content-type").map(String::as_str), Some("application/json"));

        let response = entry.to_response();
        assert_eq!(response.source, ResponseSource::Cache);
    }

    #[tokio::test]
    async fn test_match_is_exact() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let cache = db.open_cache("static-resources-v2").await.unwrap();
        cache.put("/app.js", &Response::new(200, "x")).await.unwrap();

        assert!(cache.match_url("/app.js?v=2").await.unwrap().is_none());
        assert!(cache.match_url("/app").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_put_overwrites() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let cache = db.open_cache("runtime-v2").await.unwrap();

        cache.put("/", &Response::new(200, "old")).await.unwrap();
        cache.put("/", &Response::new(200, "new")).await.unwrap();

        let entry = cache.match_url("/").await.unwrap().unwrap();
        assert_eq!(entry.body, b"new");
        assert_eq!(cache.keys().await.unwrap(), vec!["/".to_string()]);
    }

    #[tokio::test]
    async fn test_delete_cache_drops_entries() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let cache = db.open_cache("crisis-resources-v1").await.unwrap();
        cache.put("/offline-crisis.html", &Response::new(200, "<html>")).await.unwrap();

        assert!(db.delete_cache("crisis-resources-v1").await.unwrap());
        assert!(!db.delete_cache("crisis-resources-v1").await.unwrap());

        let reopened = db.open_cache("crisis-resources-v1").await.unwrap();
        assert!(reopened.match_url("/offline-crisis.html").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_caches_are_isolated() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let a = db.open_cache("a").await.unwrap();
        let b = db.open_cache("b").await.unwrap();
        a.put("/x", &Response::new(200, "a")).await.unwrap();

        assert!(b.match_url("/x").await.unwrap().is_none());
        assert_eq!(db.cache_names().await.unwrap(), vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn test_match_any_respects_order() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let first = db.open_cache("first").await.unwrap();
        let second = db.open_cache("second").await.unwrap();
        first.put("/shared", &Response::new(200, "first")).await.unwrap();
        second.put("/shared", &Response::new(200, "second")).await.unwrap();
        second.put("/only-second", &Response::new(200, "second")).await.unwrap();

        let hit = db.match_any(&["first", "second"], "/shared").await.unwrap().unwrap();
        assert_eq!(hit.body, b"first");

        let hit = db.match_any(&["first", "second"], "/only-second").await.unwrap().unwrap();
        assert_eq!(hit.body, b"second");

        assert!(db.match_any(&["first"], "/only-second").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_entry() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let cache = db.open_cache("runtime-v2").await.unwrap();
        cache.put("/a", &Response::new(200, "a")).await.unwrap();

        assert!(cache.delete("/a").await.unwrap());
        assert!(!cache.delete("/a").await.unwrap());
    }

    #[tokio::test]
    async fn test_entries_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("worker.sqlite");

        {
            let db = CacheDb::open(&path).await.unwrap();
            let cache = db.open_cache("crisis-resources-v2").await.unwrap();
            cache.put("/crisis-resources.json", &json_response("[]")).await.unwrap();
        }

        let db = CacheDb::open(&path).await.unwrap();
        let cache = db.open_cache("crisis-resources-v2").await.unwrap();
        assert!(cache.match_url("/crisis-resources.json").await.unwrap().is_some());
    }
}
