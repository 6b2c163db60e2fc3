//! SQLite-based store implementation

use adwatch_api::{Ad, AdCategory, AdStatus};
use adwatch_util::{AdId, Amount, SessionId, UserId, WindowActivity};
use chrono::{DateTime, Local, NaiveDate, TimeZone};
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::{
    AuditEvent, CatalogSync, Completion, CompletionOutcome, EarningRecord, Store, StoreError,
    StoreResult, WatchSession,
};

/// How long a writer waits on a locked database before reporting a conflict
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const DAY_FORMAT: &str = "%Y-%m-%d";

const AD_COLUMNS: &str = "id, title, category, reward_units, duration_secs, max_show, status, note";

/// SQLite-based store
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a store at the given path
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        debug!(path = %path.display(), journal_mode = %mode, "Opened store");

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory store (for testing)
    pub fn in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn conn(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Database("connection lock poisoned".into()))
    }

    fn init_schema(&self) -> StoreResult<()> {
        let conn = self.conn()?;

        conn.execute_batch(
            r#"
            -- Audit log (append-only)
            CREATE TABLE IF NOT EXISTS audit_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp_ms INTEGER NOT NULL,
                event_json TEXT NOT NULL
            );

            -- Ad catalog, seeded from config
            CREATE TABLE IF NOT EXISTS ads (
                id INTEGER PRIMARY KEY,
                title TEXT NOT NULL,
                category TEXT NOT NULL,
                reward_units INTEGER NOT NULL,
                duration_secs INTEGER NOT NULL,
                max_show INTEGER NOT NULL DEFAULT 1,
                status TEXT NOT NULL,
                note TEXT
            );

            -- Watch sessions (durable mode)
            CREATE TABLE IF NOT EXISTS watch_sessions (
                session_id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                ad_id INTEGER NOT NULL,
                started_at_ms INTEGER NOT NULL,
                is_completed INTEGER NOT NULL DEFAULT 0,
                completed_at_ms INTEGER
            );

            -- View history (append-only)
            CREATE TABLE IF NOT EXISTS ad_views (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL,
                ad_id INTEGER NOT NULL,
                viewed_at_ms INTEGER NOT NULL,
                earned_units INTEGER NOT NULL
            );

            -- Earnings ledger
            CREATE TABLE IF NOT EXISTS user_earnings (
                user_id TEXT PRIMARY KEY,
                total_earned_units INTEGER NOT NULL DEFAULT 0,
                today_earned_units INTEGER NOT NULL DEFAULT 0,
                last_updated TEXT NOT NULL
            );

            -- Indexes
            CREATE UNIQUE INDEX IF NOT EXISTS idx_sessions_open
                ON watch_sessions(user_id, ad_id) WHERE is_completed = 0;
            CREATE INDEX IF NOT EXISTS idx_views_user_ad ON ad_views(user_id, ad_id, viewed_at_ms);
            CREATE INDEX IF NOT EXISTS idx_views_user_time ON ad_views(user_id, viewed_at_ms);
            CREATE INDEX IF NOT EXISTS idx_audit_timestamp ON audit_log(timestamp_ms);
            "#,
        )?;

        debug!("Store schema initialized");
        Ok(())
    }
}

fn to_millis(dt: DateTime<Local>) -> i64 {
    dt.timestamp_millis()
}

fn from_millis(ms: i64) -> StoreResult<DateTime<Local>> {
    Local
        .timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| StoreError::Serialization(format!("invalid timestamp {}", ms)))
}

fn format_day(day: NaiveDate) -> String {
    day.format(DAY_FORMAT).to_string()
}

fn parse_day(s: &str) -> StoreResult<NaiveDate> {
    NaiveDate::parse_from_str(s, DAY_FORMAT)
        .map_err(|e| StoreError::Serialization(format!("invalid date '{}': {}", s, e)))
}

struct AdRow {
    id: i64,
    title: String,
    category: String,
    reward_units: i64,
    duration_secs: u32,
    max_show: u32,
    status: String,
    note: Option<String>,
}

impl AdRow {
    fn read(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            title: row.get(1)?,
            category: row.get(2)?,
            reward_units: row.get(3)?,
            duration_secs: row.get(4)?,
            max_show: row.get(5)?,
            status: row.get(6)?,
            note: row.get(7)?,
        })
    }

    fn into_ad(self) -> StoreResult<Ad> {
        let category = self
            .category
            .parse::<AdCategory>()
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        let status = self
            .status
            .parse::<AdStatus>()
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        Ok(Ad {
            id: AdId::new(self.id),
            title: self.title,
            category,
            reward: Amount::from_units(self.reward_units),
            duration_secs: self.duration_secs,
            max_show: self.max_show,
            status,
            note: self.note,
        })
    }
}

fn query_last_view(
    conn: &Connection,
    user_id: &UserId,
    ad_id: AdId,
    since: DateTime<Local>,
) -> StoreResult<Option<DateTime<Local>>> {
    let ms: Option<i64> = conn.query_row(
        "SELECT MAX(viewed_at_ms) FROM ad_views WHERE user_id = ?1 AND ad_id = ?2 AND viewed_at_ms >= ?3",
        params![user_id.as_str(), ad_id.get(), to_millis(since)],
        |row| row.get(0),
    )?;

    ms.map(from_millis).transpose()
}

fn query_window_activity(
    conn: &Connection,
    user_id: &UserId,
    since: DateTime<Local>,
) -> StoreResult<WindowActivity> {
    let (count, oldest_ms): (u32, Option<i64>) = conn.query_row(
        "SELECT COUNT(*), MIN(viewed_at_ms) FROM ad_views WHERE user_id = ?1 AND viewed_at_ms >= ?2",
        params![user_id.as_str(), to_millis(since)],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;

    Ok(WindowActivity {
        count,
        oldest: oldest_ms.map(from_millis).transpose()?,
    })
}

/// Increment both totals. `today` restarts only when the credit's date is
/// later than the stored one; a credit dated earlier (clock stepped back)
/// adds to the current day.
fn credit_in(
    conn: &Connection,
    user_id: &UserId,
    amount: Amount,
    day: NaiveDate,
) -> StoreResult<EarningRecord> {
    let (total, today, last_updated): (i64, i64, String) = conn.query_row(
        r#"
        INSERT INTO user_earnings (user_id, total_earned_units, today_earned_units, last_updated)
        VALUES (?1, ?2, ?2, ?3)
        ON CONFLICT(user_id)
        DO UPDATE SET
            total_earned_units = total_earned_units + excluded.total_earned_units,
            today_earned_units = CASE
                WHEN excluded.last_updated > last_updated
                THEN excluded.today_earned_units
                ELSE today_earned_units + excluded.today_earned_units
            END,
            last_updated = MAX(last_updated, excluded.last_updated)
        RETURNING total_earned_units, today_earned_units, last_updated
        "#,
        params![user_id.as_str(), amount.units(), format_day(day)],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
    )?;

    debug!(user_id = %user_id, added = %amount, total_units = total, "Ledger credited");

    Ok(EarningRecord {
        user_id: user_id.clone(),
        total_earned: Amount::from_units(total),
        today_earned: Amount::from_units(today),
        last_updated: parse_day(&last_updated)?,
    })
}

impl Store for SqliteStore {
    fn append_audit(&self, mut event: AuditEvent) -> StoreResult<()> {
        let conn = self.conn()?;
        let event_json = serde_json::to_string(&event.event)?;

        conn.execute(
            "INSERT INTO audit_log (timestamp_ms, event_json) VALUES (?1, ?2)",
            params![to_millis(event.timestamp), event_json],
        )?;

        event.id = conn.last_insert_rowid();
        debug!(event_id = event.id, "Audit event appended");

        Ok(())
    }

    fn get_recent_audits(&self, limit: usize) -> StoreResult<Vec<AuditEvent>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(
            "SELECT id, timestamp_ms, event_json FROM audit_log ORDER BY id DESC LIMIT ?1",
        )?;

        let rows = stmt.query_map([limit as i64], |row| {
            let id: i64 = row.get(0)?;
            let timestamp_ms: i64 = row.get(1)?;
            let event_json: String = row.get(2)?;
            Ok((id, timestamp_ms, event_json))
        })?;

        let mut events = Vec::new();
        for row in rows {
            let (id, timestamp_ms, event_json) = row?;
            events.push(AuditEvent {
                id,
                timestamp: from_millis(timestamp_ms)?,
                event: serde_json::from_str(&event_json)?,
            });
        }

        Ok(events)
    }

    fn sync_catalog(&self, ads: &[Ad]) -> StoreResult<CatalogSync> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        for ad in ads {
            tx.execute(
                r#"
                INSERT INTO ads (id, title, category, reward_units, duration_secs, max_show, status, note)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                ON CONFLICT(id)
                DO UPDATE SET
                    title = excluded.title,
                    category = excluded.category,
                    reward_units = excluded.reward_units,
                    duration_secs = excluded.duration_secs,
                    max_show = excluded.max_show,
                    status = excluded.status,
                    note = excluded.note
                "#,
                params![
                    ad.id.get(),
                    ad.title,
                    ad.category.as_str(),
                    ad.reward.units(),
                    ad.duration_secs,
                    ad.max_show,
                    ad.status.as_str(),
                    ad.note,
                ],
            )?;
        }

        let configured: HashSet<i64> = ads.iter().map(|a| a.id.get()).collect();
        let stale: Vec<i64> = {
            let mut stmt = tx.prepare("SELECT id FROM ads WHERE status = ?1")?;
            let ids = stmt.query_map([AdStatus::Active.as_str()], |row| row.get(0))?;
            let mut stale = Vec::new();
            for id in ids {
                let id: i64 = id?;
                if !configured.contains(&id) {
                    stale.push(id);
                }
            }
            stale
        };

        for id in &stale {
            tx.execute(
                "UPDATE ads SET status = ?1 WHERE id = ?2",
                params![AdStatus::Inactive.as_str(), id],
            )?;
        }

        tx.commit()?;

        info!(
            upserted = ads.len(),
            deactivated = stale.len(),
            "Catalog synced"
        );

        Ok(CatalogSync {
            upserted: ads.len(),
            deactivated: stale.len(),
        })
    }

    fn get_ad(&self, id: AdId) -> StoreResult<Option<Ad>> {
        let conn = self.conn()?;

        let row = conn
            .query_row(
                &format!("SELECT {} FROM ads WHERE id = ?1", AD_COLUMNS),
                [id.get()],
                AdRow::read,
            )
            .optional()?;

        row.map(AdRow::into_ad).transpose()
    }

    fn list_active_ads(&self) -> StoreResult<Vec<Ad>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM ads WHERE status = ?1 ORDER BY id",
            AD_COLUMNS
        ))?;
        let rows = stmt.query_map([AdStatus::Active.as_str()], AdRow::read)?;

        let mut ads = Vec::new();
        for row in rows {
            ads.push(row?.into_ad()?);
        }

        Ok(ads)
    }

    fn open_session(&self, session: &WatchSession) -> StoreResult<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let replaced = tx.execute(
            "DELETE FROM watch_sessions WHERE user_id = ?1 AND ad_id = ?2 AND is_completed = 0",
            params![session.user_id.as_str(), session.ad_id.get()],
        )?;

        tx.execute(
            r#"
            INSERT INTO watch_sessions (session_id, user_id, ad_id, started_at_ms, is_completed)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                session.session_id.to_string(),
                session.user_id.as_str(),
                session.ad_id.get(),
                to_millis(session.started_at),
                session.is_completed,
            ],
        )?;

        tx.commit()?;

        debug!(
            session_id = %session.session_id,
            user_id = %session.user_id,
            ad_id = %session.ad_id,
            replaced,
            "Watch session opened"
        );
        Ok(())
    }

    fn find_open_session(
        &self,
        user_id: &UserId,
        ad_id: AdId,
    ) -> StoreResult<Option<WatchSession>> {
        let conn = self.conn()?;

        let row: Option<(String, i64)> = conn
            .query_row(
                r#"
                SELECT session_id, started_at_ms FROM watch_sessions
                WHERE user_id = ?1 AND ad_id = ?2 AND is_completed = 0
                "#,
                params![user_id.as_str(), ad_id.get()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let Some((session_id, started_at_ms)) = row else {
            return Ok(None);
        };

        let session_id = session_id
            .parse::<SessionId>()
            .map_err(|e| StoreError::Serialization(format!("invalid session id: {}", e)))?;

        Ok(Some(WatchSession {
            session_id,
            user_id: user_id.clone(),
            ad_id,
            started_at: from_millis(started_at_ms)?,
            is_completed: false,
        }))
    }

    fn last_view_since(
        &self,
        user_id: &UserId,
        ad_id: AdId,
        since: DateTime<Local>,
    ) -> StoreResult<Option<DateTime<Local>>> {
        let conn = self.conn()?;
        query_last_view(&conn, user_id, ad_id, since)
    }

    fn window_activity(
        &self,
        user_id: &UserId,
        since: DateTime<Local>,
    ) -> StoreResult<WindowActivity> {
        let conn = self.conn()?;
        query_window_activity(&conn, user_id, since)
    }

    fn viewed_ad_ids_since(
        &self,
        user_id: &UserId,
        since: DateTime<Local>,
    ) -> StoreResult<HashSet<AdId>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(
            "SELECT DISTINCT ad_id FROM ad_views WHERE user_id = ?1 AND viewed_at_ms >= ?2",
        )?;
        let rows = stmt.query_map(params![user_id.as_str(), to_millis(since)], |row| {
            row.get::<_, i64>(0)
        })?;

        let mut ids = HashSet::new();
        for row in rows {
            ids.insert(AdId::new(row?));
        }

        Ok(ids)
    }

    fn record_completion(&self, completion: &Completion) -> StoreResult<CompletionOutcome> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        if let Some(session_id) = &completion.session_id {
            let closed = tx.execute(
                r#"
                UPDATE watch_sessions SET is_completed = 1, completed_at_ms = ?1
                WHERE session_id = ?2 AND is_completed = 0
                "#,
                params![to_millis(completion.viewed_at), session_id.to_string()],
            )?;

            if closed == 0 {
                debug!(session_id = %session_id, "Session already closed");
                return Ok(CompletionOutcome::SessionGone);
            }
        }

        if let Some(last_viewed_at) = query_last_view(
            &tx,
            &completion.user_id,
            completion.ad_id,
            completion.cooldown_since,
        )? {
            debug!(
                user_id = %completion.user_id,
                ad_id = %completion.ad_id,
                "View already credited inside cooldown"
            );
            return Ok(CompletionOutcome::AlreadyCredited { last_viewed_at });
        }

        let activity =
            query_window_activity(&tx, &completion.user_id, completion.rate_limit_since)?;
        if activity.count >= completion.rate_limit_max {
            debug!(
                user_id = %completion.user_id,
                count = activity.count,
                "Rate limit reached inside transaction"
            );
            return Ok(CompletionOutcome::RateLimited(activity));
        }

        tx.execute(
            r#"
            INSERT INTO ad_views (user_id, ad_id, viewed_at_ms, earned_units)
            VALUES (?1, ?2, ?3, ?4)
            "#,
            params![
                completion.user_id.as_str(),
                completion.ad_id.get(),
                to_millis(completion.viewed_at),
                completion.amount.units(),
            ],
        )?;

        let record = credit_in(
            &tx,
            &completion.user_id,
            completion.amount,
            completion.viewed_at.date_naive(),
        )?;

        tx.commit()?;
        Ok(CompletionOutcome::Credited(record))
    }

    fn get_earnings(&self, user_id: &UserId) -> StoreResult<Option<EarningRecord>> {
        let conn = self.conn()?;

        let row: Option<(i64, i64, String)> = conn
            .query_row(
                r#"
                SELECT total_earned_units, today_earned_units, last_updated
                FROM user_earnings WHERE user_id = ?1
                "#,
                [user_id.as_str()],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;

        row.map(|(total, today, last_updated)| {
            Ok(EarningRecord {
                user_id: user_id.clone(),
                total_earned: Amount::from_units(total),
                today_earned: Amount::from_units(today),
                last_updated: parse_day(&last_updated)?,
            })
        })
        .transpose()
    }

    fn is_healthy(&self) -> bool {
        match self.conn.lock() {
            Ok(conn) => conn.query_row("SELECT 1", [], |_| Ok(())).is_ok(),
            Err(_) => {
                warn!("Store lock poisoned");
                false
            }
        }
    }
}
