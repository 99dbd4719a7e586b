//! SQLite persistence layer.
//!
//! Owns every persisted entity: users, catalog items ("magnets"), the
//! append-only event log, and per-admin conversation state. WAL mode with one
//! logical writer; higher layers read at the top of handling one interaction
//! and write at the bottom, never holding rows across events.

use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::BotError;

/// Event kinds written to the append-only log.
pub const EVENT_START: &str = "start";
pub const EVENT_SUBSCRIBED: &str = "subscribed";
pub const EVENT_MAGNET_SENT: &str = "magnet_sent";

const SCHEMA: &str = "
PRAGMA journal_mode=WAL;
PRAGMA synchronous=NORMAL;

CREATE TABLE IF NOT EXISTS users (
  user_id INTEGER PRIMARY KEY,
  first_seen INTEGER,
  last_seen INTEGER,
  is_subscribed INTEGER DEFAULT 0,
  is_admin INTEGER DEFAULT 0,
  pending_ref TEXT
);

CREATE TABLE IF NOT EXISTS magnets (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  title TEXT NOT NULL,
  description TEXT,
  type TEXT NOT NULL,
  attachment TEXT,
  url TEXT,
  ref_code TEXT UNIQUE,
  is_active INTEGER DEFAULT 1,
  created_at INTEGER,
  updated_at INTEGER
);

CREATE TABLE IF NOT EXISTS events (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  user_id INTEGER NOT NULL,
  event_type TEXT NOT NULL,
  magnet_id INTEGER,
  ts INTEGER
);

CREATE TABLE IF NOT EXISTS admin_states (
  user_id INTEGER PRIMARY KEY,
  state TEXT,
  data TEXT,
  updated_at INTEGER
);
";

/// A known bot user. Created on first interaction, never deleted.
#[derive(Debug, Clone)]
pub struct User {
    pub user_id: i64,
    pub first_seen: i64,
    pub last_seen: i64,
    pub is_subscribed: bool,
    pub is_admin: bool,
    pub pending_ref: Option<String>,
}

/// Delivery kind of a catalog item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MagnetKind {
    Doc,
    Url,
}

impl MagnetKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Doc => "DOC",
            Self::Url => "URL",
        }
    }

    /// Anything that is not a URL kind is treated as a document.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        if s.eq_ignore_ascii_case("URL") {
            Self::Url
        } else {
            Self::Doc
        }
    }
}

/// One catalog item ("magnet").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Magnet {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub kind: MagnetKind,
    pub attachment: Option<String>,
    pub url: Option<String>,
    /// Globally unique, immutable referral code.
    pub ref_code: String,
    pub is_active: bool,
}

/// Fields for a magnet being created.
#[derive(Debug, Clone)]
pub struct NewMagnet {
    pub title: String,
    pub description: String,
    pub kind: MagnetKind,
    pub attachment: Option<String>,
    pub url: Option<String>,
    pub ref_code: String,
}

/// Persisted workflow state row: workflow name plus opaque scratch JSON.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminStateRow {
    pub user_id: i64,
    pub state: String,
    pub data: String,
}

/// Aggregates derived from the event log.
#[derive(Debug, Clone, Copy, Default)]
pub struct Stats {
    pub starts_total: i64,
    pub starts_unique: i64,
    pub subscribed_unique: i64,
}

#[derive(Debug, Clone)]
pub struct MagnetStat {
    pub id: i64,
    pub title: String,
    pub downloads: i64,
}

pub struct Db {
    conn: Mutex<Connection>,
}

impl Db {
    /// Open (or create) the database at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or the schema cannot be
    /// applied. This is the one failure allowed to abort process startup.
    pub fn open(path: &str) -> Result<Self, BotError> {
        Self::init(Connection::open(path)?)
    }

    /// In-memory database, used by hermetic tests.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema cannot be applied.
    pub fn open_in_memory() -> Result<Self, BotError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, BotError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create the user on first sight; refresh `last_seen` and the admin flag
    /// on every interaction.
    ///
    /// # Errors
    ///
    /// Returns an error on any SQLite failure.
    pub fn upsert_user(&self, user_id: i64, is_admin: bool) -> Result<(), BotError> {
        let now = Utc::now().timestamp();
        self.conn().execute(
            "INSERT INTO users(user_id, first_seen, last_seen, is_admin) VALUES(?1, ?2, ?2, ?3)
             ON CONFLICT(user_id) DO UPDATE SET last_seen=excluded.last_seen, is_admin=excluded.is_admin",
            params![user_id, now, is_admin],
        )?;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns an error on any SQLite failure.
    pub fn get_user(&self, user_id: i64) -> Result<Option<User>, BotError> {
        let user = self
            .conn()
            .query_row(
                "SELECT user_id, first_seen, last_seen, is_subscribed, is_admin, pending_ref
                 FROM users WHERE user_id=?1",
                params![user_id],
                |row| {
                    Ok(User {
                        user_id: row.get(0)?,
                        first_seen: row.get(1)?,
                        last_seen: row.get(2)?,
                        is_subscribed: row.get(3)?,
                        is_admin: row.get(4)?,
                        pending_ref: row.get(5)?,
                    })
                },
            )
            .optional()?;
        Ok(user)
    }

    /// # Errors
    ///
    /// Returns an error on any SQLite failure.
    pub fn set_subscribed(&self, user_id: i64, subscribed: bool) -> Result<(), BotError> {
        self.conn().execute(
            "UPDATE users SET is_subscribed=?1 WHERE user_id=?2",
            params![subscribed, user_id],
        )?;
        Ok(())
    }

    /// Record or clear the user's pending referral code.
    ///
    /// # Errors
    ///
    /// Returns an error on any SQLite failure.
    pub fn set_pending_ref(&self, user_id: i64, ref_code: Option<&str>) -> Result<(), BotError> {
        self.conn().execute(
            "UPDATE users SET pending_ref=?1 WHERE user_id=?2",
            params![ref_code, user_id],
        )?;
        Ok(())
    }

    /// Append one fact to the event log.
    ///
    /// # Errors
    ///
    /// Returns an error on any SQLite failure.
    pub fn log_event(
        &self,
        user_id: i64,
        event_type: &str,
        magnet_id: Option<i64>,
    ) -> Result<(), BotError> {
        let now = Utc::now().timestamp();
        self.conn().execute(
            "INSERT INTO events(user_id, event_type, magnet_id, ts) VALUES(?1, ?2, ?3, ?4)",
            params![user_id, event_type, magnet_id, now],
        )?;
        Ok(())
    }

    /// Insert a new magnet and return its id.
    ///
    /// # Errors
    ///
    /// Returns an error on any SQLite failure, including a referral-code
    /// uniqueness violation.
    pub fn create_magnet(&self, m: &NewMagnet) -> Result<i64, BotError> {
        let now = Utc::now().timestamp();
        let conn = self.conn();
        conn.execute(
            "INSERT INTO magnets(title, description, type, attachment, url, ref_code, is_active, created_at, updated_at)
             VALUES(?1, ?2, ?3, ?4, ?5, ?6, 1, ?7, ?7)",
            params![m.title, m.description, m.kind.as_str(), m.attachment, m.url, m.ref_code, now],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Persist the full magnet record (single-field edits re-read first).
    ///
    /// # Errors
    ///
    /// Returns an error on any SQLite failure.
    pub fn update_magnet(&self, m: &Magnet) -> Result<(), BotError> {
        let now = Utc::now().timestamp();
        self.conn().execute(
            "UPDATE magnets SET title=?1, description=?2, type=?3, attachment=?4, url=?5,
             ref_code=?6, is_active=?7, updated_at=?8 WHERE id=?9",
            params![
                m.title,
                m.description,
                m.kind.as_str(),
                m.attachment,
                m.url,
                m.ref_code,
                m.is_active,
                now,
                m.id
            ],
        )?;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns an error on any SQLite failure.
    pub fn delete_magnet(&self, id: i64) -> Result<(), BotError> {
        self.conn()
            .execute("DELETE FROM magnets WHERE id=?1", params![id])?;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns an error on any SQLite failure.
    pub fn get_magnet(&self, id: i64) -> Result<Option<Magnet>, BotError> {
        let magnet = self
            .conn()
            .query_row(
                "SELECT id, title, description, type, attachment, url, ref_code, is_active
                 FROM magnets WHERE id=?1",
                params![id],
                read_magnet,
            )
            .optional()?;
        Ok(magnet)
    }

    /// # Errors
    ///
    /// Returns an error on any SQLite failure.
    pub fn get_magnet_by_ref(&self, ref_code: &str) -> Result<Option<Magnet>, BotError> {
        let magnet = self
            .conn()
            .query_row(
                "SELECT id, title, description, type, attachment, url, ref_code, is_active
                 FROM magnets WHERE ref_code=?1",
                params![ref_code],
                read_magnet,
            )
            .optional()?;
        Ok(magnet)
    }

    /// Newest-first page of magnets.
    ///
    /// # Errors
    ///
    /// Returns an error on any SQLite failure.
    pub fn list_magnets(
        &self,
        only_active: bool,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<Magnet>, BotError> {
        let sql = if only_active {
            "SELECT id, title, description, type, attachment, url, ref_code, is_active
             FROM magnets WHERE is_active=1 ORDER BY id DESC LIMIT ?1 OFFSET ?2"
        } else {
            "SELECT id, title, description, type, attachment, url, ref_code, is_active
             FROM magnets ORDER BY id DESC LIMIT ?1 OFFSET ?2"
        };
        let conn = self.conn();
        let mut stmt = conn.prepare(sql)?;
        let magnets = stmt
            .query_map(params![limit, offset], read_magnet)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(magnets)
    }

    /// # Errors
    ///
    /// Returns an error on any SQLite failure.
    pub fn count_magnets(&self, only_active: bool) -> Result<i64, BotError> {
        let sql = if only_active {
            "SELECT COUNT(*) FROM magnets WHERE is_active=1"
        } else {
            "SELECT COUNT(*) FROM magnets"
        };
        Ok(self.conn().query_row(sql, [], |row| row.get(0))?)
    }

    /// # Errors
    ///
    /// Returns an error on any SQLite failure.
    pub fn get_admin_state(&self, user_id: i64) -> Result<Option<AdminStateRow>, BotError> {
        let row = self
            .conn()
            .query_row(
                "SELECT state, data FROM admin_states WHERE user_id=?1",
                params![user_id],
                |row| {
                    Ok(AdminStateRow {
                        user_id,
                        state: row.get::<_, Option<String>>(0)?.unwrap_or_default(),
                        data: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    /// Overwrite the user's workflow state (one active workflow per user).
    ///
    /// # Errors
    ///
    /// Returns an error on any SQLite failure.
    pub fn set_admin_state(&self, user_id: i64, state: &str, data: &str) -> Result<(), BotError> {
        let now = Utc::now().timestamp();
        self.conn().execute(
            "INSERT INTO admin_states(user_id, state, data, updated_at) VALUES(?1, ?2, ?3, ?4)
             ON CONFLICT(user_id) DO UPDATE SET state=excluded.state, data=excluded.data, updated_at=excluded.updated_at",
            params![user_id, state, data, now],
        )?;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns an error on any SQLite failure.
    pub fn clear_admin_state(&self, user_id: i64) -> Result<(), BotError> {
        self.conn()
            .execute("DELETE FROM admin_states WHERE user_id=?1", params![user_id])?;
        Ok(())
    }

    /// Every known user id, for broadcast fan-out.
    ///
    /// # Errors
    ///
    /// Returns an error on any SQLite failure.
    pub fn list_all_users(&self) -> Result<Vec<i64>, BotError> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT user_id FROM users")?;
        let users = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(users)
    }

    /// # Errors
    ///
    /// Returns an error on any SQLite failure.
    pub fn get_stats(&self) -> Result<Stats, BotError> {
        Ok(Stats {
            starts_total: self.count_events(EVENT_START, false)?,
            starts_unique: self.count_events(EVENT_START, true)?,
            subscribed_unique: self.count_events(EVENT_SUBSCRIBED, true)?,
        })
    }

    fn count_events(&self, event_type: &str, distinct_users: bool) -> Result<i64, BotError> {
        let sql = if distinct_users {
            "SELECT COUNT(DISTINCT user_id) FROM events WHERE event_type=?1"
        } else {
            "SELECT COUNT(*) FROM events WHERE event_type=?1"
        };
        Ok(self
            .conn()
            .query_row(sql, params![event_type], |row| row.get(0))?)
    }

    /// Per-magnet download counts. The outer join keeps magnets with zero
    /// sends; `magnet_sent` entries for deleted magnets simply drop out.
    ///
    /// # Errors
    ///
    /// Returns an error on any SQLite failure.
    pub fn get_magnet_stats(&self) -> Result<Vec<MagnetStat>, BotError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT m.id, m.title, COUNT(e.id) AS downloads
             FROM magnets m LEFT JOIN events e ON e.magnet_id=m.id AND e.event_type='magnet_sent'
             GROUP BY m.id, m.title ORDER BY downloads DESC",
        )?;
        let stats = stmt
            .query_map([], |row| {
                Ok(MagnetStat {
                    id: row.get(0)?,
                    title: row.get(1)?,
                    downloads: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(stats)
    }
}

fn read_magnet(row: &Row<'_>) -> rusqlite::Result<Magnet> {
    Ok(Magnet {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
        kind: MagnetKind::parse(&row.get::<_, String>(3)?),
        attachment: row.get(4)?,
        url: row.get(5)?,
        ref_code: row.get::<_, Option<String>>(6)?.unwrap_or_default(),
        is_active: row.get(7)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db() -> Db {
        Db::open_in_memory().expect("in-memory db")
    }

    fn new_magnet(title: &str, ref_code: &str) -> NewMagnet {
        NewMagnet {
            title: title.to_string(),
            description: String::new(),
            kind: MagnetKind::Url,
            attachment: None,
            url: Some("https://example.com".to_string()),
            ref_code: ref_code.to_string(),
        }
    }

    #[test]
    fn upsert_user_keeps_first_seen() {
        let db = db();
        db.upsert_user(1, false).expect("insert");
        let first = db.get_user(1).expect("query").expect("user exists");
        db.upsert_user(1, true).expect("update");
        let second = db.get_user(1).expect("query").expect("user exists");
        assert_eq!(first.first_seen, second.first_seen);
        assert!(second.is_admin);
    }

    #[test]
    fn pending_ref_roundtrip() {
        let db = db();
        db.upsert_user(1, false).expect("insert");
        db.set_pending_ref(1, Some("m1abc")).expect("set");
        let user = db.get_user(1).expect("query").expect("user");
        assert_eq!(user.pending_ref.as_deref(), Some("m1abc"));
        db.set_pending_ref(1, None).expect("clear");
        let user = db.get_user(1).expect("query").expect("user");
        assert!(user.pending_ref.is_none());
    }

    #[test]
    fn magnet_crud() {
        let db = db();
        let id = db.create_magnet(&new_magnet("Guide", "r1")).expect("create");
        let mut m = db.get_magnet(id).expect("query").expect("magnet");
        assert_eq!(m.title, "Guide");
        assert!(m.is_active);

        m.is_active = false;
        db.update_magnet(&m).expect("update");
        assert_eq!(db.count_magnets(true).expect("count"), 0);
        assert_eq!(db.count_magnets(false).expect("count"), 1);

        db.delete_magnet(id).expect("delete");
        assert!(db.get_magnet(id).expect("query").is_none());
    }

    #[test]
    fn ref_code_unique_constraint() {
        let db = db();
        db.create_magnet(&new_magnet("a", "same")).expect("first");
        let dup = db.create_magnet(&new_magnet("b", "same"));
        assert!(matches!(dup, Err(BotError::Storage(_))));
    }

    #[test]
    fn lookup_by_ref_code() {
        let db = db();
        let id = db.create_magnet(&new_magnet("Guide", "r9")).expect("create");
        let m = db.get_magnet_by_ref("r9").expect("query").expect("magnet");
        assert_eq!(m.id, id);
        assert!(db.get_magnet_by_ref("missing").expect("query").is_none());
    }

    #[test]
    fn listing_is_newest_first_and_paged() {
        let db = db();
        for i in 0..5 {
            db.create_magnet(&new_magnet(&format!("m{i}"), &format!("r{i}")))
                .expect("create");
        }
        let page = db.list_magnets(true, 0, 2).expect("list");
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].title, "m4");
        let page = db.list_magnets(true, 4, 2).expect("list");
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].title, "m0");
    }

    #[test]
    fn admin_state_roundtrip() {
        let db = db();
        assert!(db.get_admin_state(1).expect("query").is_none());
        db.set_admin_state(1, "ADMIN_ADD_TITLE", "{}").expect("set");
        let row = db.get_admin_state(1).expect("query").expect("row");
        assert_eq!(row.state, "ADMIN_ADD_TITLE");
        assert_eq!(row.data, "{}");

        db.set_admin_state(1, "ADMIN_ADD_DESC", "{\"title\":\"x\"}")
            .expect("overwrite");
        let row = db.get_admin_state(1).expect("query").expect("row");
        assert_eq!(row.state, "ADMIN_ADD_DESC");

        db.clear_admin_state(1).expect("clear");
        assert!(db.get_admin_state(1).expect("query").is_none());
    }

    #[test]
    fn stats_tolerate_deleted_magnets() {
        let db = db();
        db.log_event(1, EVENT_START, None).expect("log");
        db.log_event(1, EVENT_START, None).expect("log");
        db.log_event(2, EVENT_START, None).expect("log");
        db.log_event(1, EVENT_SUBSCRIBED, None).expect("log");

        let id = db.create_magnet(&new_magnet("Guide", "r1")).expect("create");
        db.log_event(1, EVENT_MAGNET_SENT, Some(id)).expect("log");
        // A send logged against a magnet that is later deleted must not
        // break the aggregation.
        db.log_event(1, EVENT_MAGNET_SENT, Some(9999)).expect("log");

        let stats = db.get_stats().expect("stats");
        assert_eq!(stats.starts_total, 3);
        assert_eq!(stats.starts_unique, 2);
        assert_eq!(stats.subscribed_unique, 1);

        let per_magnet = db.get_magnet_stats().expect("magnet stats");
        assert_eq!(per_magnet.len(), 1);
        assert_eq!(per_magnet[0].downloads, 1);
    }

    #[test]
    fn opens_on_disk_database() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("bot.db");
        let db = Db::open(path.to_str().expect("utf-8 path")).expect("open");
        db.upsert_user(1, false).expect("insert");
        assert!(db.get_user(1).expect("query").is_some());
    }
}
