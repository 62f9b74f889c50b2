//! SQLite persistence for sessions, parameters, history, and match results.
//!
//! Uses `rusqlite` in synchronous mode behind a mutex; lock scopes are kept
//! short and never span an LLM call. WAL mode is enabled for concurrent
//! reads. Every multi-row mutation runs in a transaction so readers observe
//! session state atomically.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::scoring::LenderMatch;

use super::errors::AdvisorError;
use super::types::{
    AgentType, EmploymentStatus, LoanParameters, LoanPurpose, MessageRole, ParameterField,
    ParameterTracking, Session, SessionSnapshot, SessionStatus, StoredMessage,
};

/// Hard session lifetime.
const SESSION_TTL_HOURS: i64 = 24;

// ─── SessionStore ───────────────────────────────────────────────────────────

/// SQLite database handle for the advisor core.
pub struct SessionStore {
    conn: Connection,
}

impl SessionStore {
    /// Open (or create) the store at the given path.
    ///
    /// Pass `":memory:"` for an in-memory database (tests).
    pub fn open(path: &str) -> Result<Self, AdvisorError> {
        let conn = Connection::open(path)?;

        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;

        let store = Self { conn };
        store.create_tables()?;
        Ok(store)
    }

    /// Create all required tables if they don't exist.
    fn create_tables(&self) -> Result<(), AdvisorError> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                created_at TEXT NOT NULL,
                last_activity TEXT NOT NULL,
                expires_at TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'active',
                user_agent TEXT,
                ip_address TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_sessions_expiry
                ON sessions(expires_at);

            CREATE TABLE IF NOT EXISTS loan_parameters (
                session_id TEXT PRIMARY KEY
                    REFERENCES sessions(id) ON DELETE CASCADE,
                loan_amount INTEGER,
                annual_income INTEGER,
                employment_status TEXT,
                credit_score INTEGER,
                loan_purpose TEXT,
                debt_to_income_ratio REAL,
                employment_duration INTEGER
            );

            CREATE TABLE IF NOT EXISTS parameter_tracking (
                session_id TEXT PRIMARY KEY
                    REFERENCES sessions(id) ON DELETE CASCADE,
                loan_amount_collected INTEGER NOT NULL DEFAULT 0,
                annual_income_collected INTEGER NOT NULL DEFAULT 0,
                employment_status_collected INTEGER NOT NULL DEFAULT 0,
                credit_score_collected INTEGER NOT NULL DEFAULT 0,
                loan_purpose_collected INTEGER NOT NULL DEFAULT 0,
                completion_percent INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS conversation_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL
                    REFERENCES sessions(id) ON DELETE CASCADE,
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                agent_type TEXT,
                metadata TEXT,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_history_session
                ON conversation_history(session_id, id);

            CREATE TABLE IF NOT EXISTS match_results (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL
                    REFERENCES sessions(id) ON DELETE CASCADE,
                lender_id INTEGER NOT NULL,
                lender_name TEXT NOT NULL,
                interest_rate REAL NOT NULL,
                eligibility_score INTEGER NOT NULL,
                affordability_score INTEGER NOT NULL,
                specialisation_score INTEGER NOT NULL,
                final_score INTEGER NOT NULL,
                confidence INTEGER NOT NULL,
                reasons TEXT NOT NULL,
                warnings TEXT NOT NULL,
                rank INTEGER NOT NULL,
                calculated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_matches_session
                ON match_results(session_id, final_score DESC);
            ",
        )?;
        Ok(())
    }

    /// Cheap liveness probe for the health endpoint.
    pub fn ping(&self) -> bool {
        self.conn
            .query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
            .is_ok()
    }

    // ─── Sessions ───────────────────────────────────────────────────────

    /// Allocate a fresh session with empty parameter and tracking rows.
    pub fn open_session(
        &self,
        user_agent: Option<&str>,
        ip_address: Option<&str>,
    ) -> Result<Session, AdvisorError> {
        let now = Utc::now();
        let session = Session {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            last_activity: now,
            expires_at: now + Duration::hours(SESSION_TTL_HOURS),
            status: SessionStatus::Active,
            user_agent: user_agent.map(String::from),
            ip_address: ip_address.map(String::from),
        };

        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO sessions
             (id, created_at, last_activity, expires_at, status, user_agent, ip_address)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                session.id,
                session.created_at.to_rfc3339(),
                session.last_activity.to_rfc3339(),
                session.expires_at.to_rfc3339(),
                session.status.as_str(),
                session.user_agent,
                session.ip_address,
            ],
        )?;
        tx.execute(
            "INSERT INTO loan_parameters (session_id) VALUES (?1)",
            params![session.id],
        )?;
        tx.execute(
            "INSERT INTO parameter_tracking (session_id) VALUES (?1)",
            params![session.id],
        )?;
        tx.commit()?;

        Ok(session)
    }

    /// Get session metadata by id, without the usability check.
    pub fn get_session(&self, session_id: &str) -> Result<Option<Session>, AdvisorError> {
        let result = self
            .conn
            .query_row(
                "SELECT id, created_at, last_activity, expires_at, status,
                        user_agent, ip_address
                 FROM sessions WHERE id = ?1",
                params![session_id],
                row_to_session,
            )
            .optional()?;
        Ok(result)
    }

    /// Get a session and enforce the usability invariant:
    /// active status AND not yet past expiry.
    pub fn require_usable(&self, session_id: &str) -> Result<Session, AdvisorError> {
        let session =
            self.get_session(session_id)?
                .ok_or_else(|| AdvisorError::SessionNotFound {
                    session_id: session_id.to_string(),
                })?;
        if !session.is_usable(Utc::now()) {
            return Err(AdvisorError::SessionExpired {
                session_id: session_id.to_string(),
            });
        }
        Ok(session)
    }

    /// Load the full snapshot a turn operates on.
    pub fn load(&self, session_id: &str) -> Result<SessionSnapshot, AdvisorError> {
        let session = self.require_usable(session_id)?;
        Ok(SessionSnapshot {
            parameters: self.get_parameters(session_id)?,
            tracking: self.get_tracking(session_id)?,
            history: self.get_history(session_id)?,
            session,
        })
    }

    /// Update the session's last-activity timestamp.
    pub fn touch(&self, session_id: &str) -> Result<(), AdvisorError> {
        self.conn.execute(
            "UPDATE sessions SET last_activity = ?2 WHERE id = ?1",
            params![session_id, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// Mark a session completed. Terminal: the session accepts no more turns.
    pub fn close(&self, session_id: &str) -> Result<(), AdvisorError> {
        let updated = self.conn.execute(
            "UPDATE sessions SET status = 'completed' WHERE id = ?1",
            params![session_id],
        )?;
        if updated == 0 {
            return Err(AdvisorError::SessionNotFound {
                session_id: session_id.to_string(),
            });
        }
        Ok(())
    }

    /// Flip every active session past its expiry to expired.
    /// Returns the number of sessions swept.
    pub fn sweep_expired(&self) -> Result<usize, AdvisorError> {
        let swept = self.conn.execute(
            "UPDATE sessions SET status = 'expired'
             WHERE status = 'active' AND expires_at <= ?1",
            params![Utc::now().to_rfc3339()],
        )?;
        Ok(swept)
    }

    /// Delete a session; parameter, tracking, history, and match rows
    /// cascade with it.
    pub fn delete_session(&self, session_id: &str) -> Result<(), AdvisorError> {
        self.conn
            .execute("DELETE FROM sessions WHERE id = ?1", params![session_id])?;
        Ok(())
    }

    // ─── Parameters & Tracking ──────────────────────────────────────────

    /// Read the collected parameters for a session.
    pub fn get_parameters(&self, session_id: &str) -> Result<LoanParameters, AdvisorError> {
        self.conn
            .query_row(
                "SELECT loan_amount, annual_income, employment_status, credit_score,
                        loan_purpose, debt_to_income_ratio, employment_duration
                 FROM loan_parameters WHERE session_id = ?1",
                params![session_id],
                |row| {
                    Ok(LoanParameters {
                        loan_amount: row.get(0)?,
                        annual_income: row.get(1)?,
                        employment_status: row
                            .get::<_, Option<String>>(2)?
                            .as_deref()
                            .and_then(EmploymentStatus::parse),
                        credit_score: row.get(3)?,
                        loan_purpose: row
                            .get::<_, Option<String>>(4)?
                            .as_deref()
                            .and_then(LoanPurpose::parse),
                        debt_to_income_ratio: row.get(5)?,
                        employment_duration: row.get(6)?,
                    })
                },
            )
            .optional()?
            .ok_or_else(|| AdvisorError::SessionNotFound {
                session_id: session_id.to_string(),
            })
    }

    /// Read the tracking row for a session.
    pub fn get_tracking(&self, session_id: &str) -> Result<ParameterTracking, AdvisorError> {
        self.conn
            .query_row(
                "SELECT loan_amount_collected, annual_income_collected,
                        employment_status_collected, credit_score_collected,
                        loan_purpose_collected, completion_percent
                 FROM parameter_tracking WHERE session_id = ?1",
                params![session_id],
                |row| {
                    Ok(ParameterTracking {
                        loan_amount_collected: row.get::<_, i64>(0)? != 0,
                        annual_income_collected: row.get::<_, i64>(1)? != 0,
                        employment_status_collected: row.get::<_, i64>(2)? != 0,
                        credit_score_collected: row.get::<_, i64>(3)? != 0,
                        loan_purpose_collected: row.get::<_, i64>(4)? != 0,
                        completion_percent: row.get::<_, i64>(5)? as u8,
                    })
                },
            )
            .optional()?
            .ok_or_else(|| AdvisorError::SessionNotFound {
                session_id: session_id.to_string(),
            })
    }

    /// Persist one validated parameter value and its tracking update in a
    /// single transaction. The tracker owns validation — this method only
    /// guarantees atomicity of value + boolean + percent.
    pub fn write_parameter(
        &self,
        session_id: &str,
        field: ParameterField,
        value: &dyn rusqlite::ToSql,
    ) -> Result<ParameterTracking, AdvisorError> {
        let tx = self.conn.unchecked_transaction()?;

        // Column names come from the ParameterField enum, never from input.
        let sql = format!(
            "UPDATE loan_parameters SET {} = ?1 WHERE session_id = ?2",
            field.column()
        );
        let args: [&dyn rusqlite::ToSql; 2] = [value, &session_id];
        let updated = tx.execute(&sql, &args[..])?;
        if updated == 0 {
            return Err(AdvisorError::SessionNotFound {
                session_id: session_id.to_string(),
            });
        }

        if field.is_required() {
            tx.execute(
                &format!(
                    "UPDATE parameter_tracking SET {}_collected = 1 WHERE session_id = ?1",
                    field.column()
                ),
                params![session_id],
            )?;
            // Recompute the derived percent from the booleans inside the
            // same transaction so the pair is always consistent.
            tx.execute(
                "UPDATE parameter_tracking SET completion_percent = 20 * (
                     loan_amount_collected + annual_income_collected +
                     employment_status_collected + credit_score_collected +
                     loan_purpose_collected
                 ) WHERE session_id = ?1",
                params![session_id],
            )?;
        }

        tx.commit()?;
        self.get_tracking(session_id)
    }

    // ─── Conversation History ───────────────────────────────────────────

    /// Append a message. History is append-only and strictly ordered; the
    /// session's last-activity timestamp moves with every append.
    pub fn append_message(
        &self,
        session_id: &str,
        role: MessageRole,
        content: &str,
        agent_type: Option<AgentType>,
        metadata: Option<&serde_json::Value>,
    ) -> Result<StoredMessage, AdvisorError> {
        let now = Utc::now();
        let metadata_json = metadata.map(|m| m.to_string());

        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO conversation_history
             (session_id, role, content, agent_type, metadata, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                session_id,
                role.as_str(),
                content,
                agent_type.map(|a| a.as_str()),
                metadata_json,
                now.to_rfc3339(),
            ],
        )?;
        let id = tx.last_insert_rowid();
        tx.execute(
            "UPDATE sessions SET last_activity = ?2 WHERE id = ?1",
            params![session_id, now.to_rfc3339()],
        )?;
        tx.commit()?;

        Ok(StoredMessage {
            id,
            session_id: session_id.to_string(),
            role,
            content: content.to_string(),
            agent_type,
            metadata: metadata.cloned(),
            created_at: now,
        })
    }

    /// Get all messages for a session, ordered by id (chronological).
    pub fn get_history(&self, session_id: &str) -> Result<Vec<StoredMessage>, AdvisorError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, session_id, role, content, agent_type, metadata, created_at
             FROM conversation_history
             WHERE session_id = ?1
             ORDER BY id ASC",
        )?;

        let rows = stmt.query_map(params![session_id], row_to_message)?;
        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }
        Ok(messages)
    }

    /// Get the N most recent messages, oldest first.
    pub fn get_recent_messages(
        &self,
        session_id: &str,
        limit: usize,
    ) -> Result<Vec<StoredMessage>, AdvisorError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, session_id, role, content, agent_type, metadata, created_at
             FROM conversation_history
             WHERE session_id = ?1
             ORDER BY id DESC
             LIMIT ?2",
        )?;

        let rows = stmt.query_map(params![session_id, limit as i64], row_to_message)?;
        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }
        messages.reverse();
        Ok(messages)
    }

    /// Count messages in a session.
    pub fn message_count(&self, session_id: &str) -> Result<usize, AdvisorError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM conversation_history WHERE session_id = ?1",
            params![session_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    // ─── Match Results ──────────────────────────────────────────────────

    /// Replace the persisted ranking for a session in one transaction.
    pub fn replace_matches(
        &self,
        session_id: &str,
        matches: &[LenderMatch],
    ) -> Result<DateTime<Utc>, AdvisorError> {
        let calculated_at = Utc::now();

        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "DELETE FROM match_results WHERE session_id = ?1",
            params![session_id],
        )?;
        for m in matches {
            tx.execute(
                "INSERT INTO match_results
                 (session_id, lender_id, lender_name, interest_rate,
                  eligibility_score, affordability_score, specialisation_score,
                  final_score, confidence, reasons, warnings, rank, calculated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                params![
                    session_id,
                    m.lender_id,
                    m.lender_name,
                    m.interest_rate,
                    m.eligibility_score,
                    m.affordability_score,
                    m.specialisation_score,
                    m.final_score,
                    m.confidence,
                    serde_json::to_string(&m.reasons)?,
                    serde_json::to_string(&m.warnings)?,
                    m.rank,
                    calculated_at.to_rfc3339(),
                ],
            )?;
        }
        tx.commit()?;

        Ok(calculated_at)
    }

    /// Read the last persisted ranking, ordered by rank.
    pub fn get_matches(
        &self,
        session_id: &str,
    ) -> Result<Option<(Vec<LenderMatch>, DateTime<Utc>)>, AdvisorError> {
        let mut stmt = self.conn.prepare(
            "SELECT lender_id, lender_name, interest_rate, eligibility_score,
                    affordability_score, specialisation_score, final_score,
                    confidence, reasons, warnings, rank, calculated_at
             FROM match_results
             WHERE session_id = ?1
             ORDER BY rank ASC",
        )?;

        let rows = stmt.query_map(params![session_id], |row| {
            Ok((
                LenderMatch {
                    lender_id: row.get(0)?,
                    lender_name: row.get(1)?,
                    interest_rate: row.get(2)?,
                    eligibility_score: row.get(3)?,
                    affordability_score: row.get(4)?,
                    specialisation_score: row.get(5)?,
                    final_score: row.get(6)?,
                    confidence: row.get(7)?,
                    reasons: parse_json_array(row.get::<_, String>(8)?),
                    warnings: parse_json_array(row.get::<_, String>(9)?),
                    rank: row.get(10)?,
                },
                row.get::<_, String>(11)?,
            ))
        })?;

        let mut matches = Vec::new();
        let mut calculated_at: Option<DateTime<Utc>> = None;
        for row in rows {
            let (m, ts) = row?;
            calculated_at = Some(parse_timestamp(&ts));
            matches.push(m);
        }

        Ok(calculated_at.map(|ts| (matches, ts)))
    }
}

// ─── Per-Session Turn Serialisation ─────────────────────────────────────────

/// Prune the lock registry once it grows past this many entries.
const LOCK_PRUNE_THRESHOLD: usize = 1024;

/// Logical per-session mutexes. A turn holds the guard around its store
/// read/write batches and drops it before every LLM call, so turns for the
/// same session cannot interleave parameter writes while turns for different
/// sessions run fully in parallel.
#[derive(Default)]
pub struct SessionLocks {
    locks: std::sync::Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl SessionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock for one session.
    pub async fn acquire(&self, session_id: &str) -> tokio::sync::OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            if map.len() > LOCK_PRUNE_THRESHOLD {
                map.retain(|_, l| Arc::strong_count(l) > 1);
            }
            Arc::clone(map.entry(session_id.to_string()).or_default())
        };
        lock.lock_owned().await
    }
}

// ─── Helpers ────────────────────────────────────────────────────────────────

fn row_to_session(row: &rusqlite::Row<'_>) -> rusqlite::Result<Session> {
    Ok(Session {
        id: row.get(0)?,
        created_at: parse_timestamp(&row.get::<_, String>(1)?),
        last_activity: parse_timestamp(&row.get::<_, String>(2)?),
        expires_at: parse_timestamp(&row.get::<_, String>(3)?),
        status: SessionStatus::parse(&row.get::<_, String>(4)?)
            .unwrap_or(SessionStatus::Expired),
        user_agent: row.get(5)?,
        ip_address: row.get(6)?,
    })
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoredMessage> {
    Ok(StoredMessage {
        id: row.get(0)?,
        session_id: row.get(1)?,
        role: MessageRole::parse(&row.get::<_, String>(2)?).unwrap_or(MessageRole::Bot),
        content: row.get(3)?,
        agent_type: row
            .get::<_, Option<String>>(4)?
            .as_deref()
            .and_then(AgentType::parse),
        metadata: row
            .get::<_, Option<String>>(5)?
            .and_then(|s| serde_json::from_str(&s).ok()),
        created_at: parse_timestamp(&row.get::<_, String>(6)?),
    })
}

/// Parse a stored RFC 3339 timestamp. Rows are only written by this module,
/// so a parse failure means corruption; fall back to the epoch rather than
/// panicking mid-query.
fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| DateTime::<Utc>::MIN_UTC)
}

/// Parse a JSON string array, defaulting to empty.
fn parse_json_array(json: String) -> Vec<String> {
    serde_json::from_str(&json).unwrap_or_default()
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn test_store() -> SessionStore {
        SessionStore::open(":memory:").unwrap()
    }

    fn sample_match(rank: u32, final_score: i64) -> LenderMatch {
        LenderMatch {
            lender_id: rank as i64,
            lender_name: format!("Lender {rank}"),
            interest_rate: 9.0,
            eligibility_score: 100,
            affordability_score: 50,
            specialisation_score: 60,
            final_score,
            confidence: 90,
            reasons: vec!["meets all eligibility criteria".into()],
            warnings: vec![],
            rank,
        }
    }

    #[test]
    fn test_open_session_creates_all_rows() {
        let store = test_store();
        let session = store.open_session(Some("test-agent"), Some("127.0.0.1")).unwrap();

        assert_eq!(session.status, SessionStatus::Active);
        assert_eq!(
            session.expires_at - session.created_at,
            Duration::hours(24)
        );

        let snapshot = store.load(&session.id).unwrap();
        assert_eq!(snapshot.parameters, LoanParameters::default());
        assert_eq!(snapshot.tracking.completion_percent, 0);
        assert!(snapshot.history.is_empty());
    }

    #[test]
    fn test_load_unknown_session() {
        let store = test_store();
        let err = store.load("no-such-id").unwrap_err();
        assert!(matches!(err, AdvisorError::SessionNotFound { .. }));
    }

    #[test]
    fn test_closed_session_rejects_turns() {
        let store = test_store();
        let session = store.open_session(None, None).unwrap();
        store.close(&session.id).unwrap();

        let err = store.load(&session.id).unwrap_err();
        assert!(matches!(err, AdvisorError::SessionExpired { .. }));
    }

    #[test]
    fn test_expired_session_never_accepts_writes_again() {
        let store = test_store();
        let session = store.open_session(None, None).unwrap();

        // Force the expiry into the past, then sweep.
        store
            .conn
            .execute(
                "UPDATE sessions SET expires_at = ?2 WHERE id = ?1",
                params![session.id, (Utc::now() - Duration::hours(1)).to_rfc3339()],
            )
            .unwrap();
        let swept = store.sweep_expired().unwrap();
        assert_eq!(swept, 1);

        let err = store.load(&session.id).unwrap_err();
        assert!(matches!(err, AdvisorError::SessionExpired { .. }));
        assert_eq!(
            store.get_session(&session.id).unwrap().unwrap().status,
            SessionStatus::Expired
        );
    }

    #[test]
    fn test_sweep_ignores_live_sessions() {
        let store = test_store();
        store.open_session(None, None).unwrap();
        assert_eq!(store.sweep_expired().unwrap(), 0);
    }

    #[test]
    fn test_history_is_ordered_and_append_only() {
        let store = test_store();
        let session = store.open_session(None, None).unwrap();

        for i in 0..5 {
            let role = if i % 2 == 0 { MessageRole::User } else { MessageRole::Bot };
            store
                .append_message(&session.id, role, &format!("message {i}"), None, None)
                .unwrap();
        }

        let history = store.get_history(&session.id).unwrap();
        assert_eq!(history.len(), 5);
        for window in history.windows(2) {
            assert!(window[0].id < window[1].id);
        }
        assert_eq!(history[0].role, MessageRole::User);
        assert_eq!(history[0].content, "message 0");
    }

    #[test]
    fn test_append_message_stores_metadata() {
        let store = test_store();
        let session = store.open_session(None, None).unwrap();

        let metadata = serde_json::json!({"action": "continue", "completionPercent": 40});
        let stored = store
            .append_message(
                &session.id,
                MessageRole::Bot,
                "reply",
                Some(AgentType::Conv),
                Some(&metadata),
            )
            .unwrap();
        assert_eq!(stored.agent_type, Some(AgentType::Conv));

        let history = store.get_history(&session.id).unwrap();
        assert_eq!(history[0].metadata.as_ref().unwrap()["action"], "continue");
    }

    #[test]
    fn test_recent_messages_window() {
        let store = test_store();
        let session = store.open_session(None, None).unwrap();
        for i in 0..10 {
            store
                .append_message(&session.id, MessageRole::User, &format!("m{i}"), None, None)
                .unwrap();
        }

        let recent = store.get_recent_messages(&session.id, 3).unwrap();
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].content, "m7");
        assert_eq!(recent[2].content, "m9");
    }

    #[test]
    fn test_write_parameter_updates_value_and_tracking_together() {
        let store = test_store();
        let session = store.open_session(None, None).unwrap();

        let tracking = store
            .write_parameter(&session.id, ParameterField::LoanAmount, &2_000_000i64)
            .unwrap();
        assert!(tracking.loan_amount_collected);
        assert_eq!(tracking.completion_percent, 20);

        let params = store.get_parameters(&session.id).unwrap();
        assert_eq!(params.loan_amount, Some(2_000_000));
    }

    #[test]
    fn test_optional_parameter_does_not_move_completion() {
        let store = test_store();
        let session = store.open_session(None, None).unwrap();

        let tracking = store
            .write_parameter(&session.id, ParameterField::DebtToIncomeRatio, &0.3f64)
            .unwrap();
        assert_eq!(tracking.completion_percent, 0);
        let params = store.get_parameters(&session.id).unwrap();
        assert_eq!(params.debt_to_income_ratio, Some(0.3));
    }

    #[test]
    fn test_completion_percent_tracks_boolean_count() {
        let store = test_store();
        let session = store.open_session(None, None).unwrap();

        store
            .write_parameter(&session.id, ParameterField::LoanAmount, &500_000i64)
            .unwrap();
        store
            .write_parameter(&session.id, ParameterField::AnnualIncome, &1_200_000i64)
            .unwrap();
        store
            .write_parameter(&session.id, ParameterField::EmploymentStatus, &"salaried")
            .unwrap();
        store
            .write_parameter(&session.id, ParameterField::CreditScore, &720i64)
            .unwrap();
        let tracking = store
            .write_parameter(&session.id, ParameterField::LoanPurpose, &"education")
            .unwrap();

        assert_eq!(tracking.completion_percent, 100);
        assert!(tracking.is_complete());
    }

    #[test]
    fn test_replace_matches_is_atomic_swap() {
        let store = test_store();
        let session = store.open_session(None, None).unwrap();

        store
            .replace_matches(&session.id, &[sample_match(1, 90), sample_match(2, 80)])
            .unwrap();
        store
            .replace_matches(&session.id, &[sample_match(1, 70)])
            .unwrap();

        let (matches, _ts) = store.get_matches(&session.id).unwrap().unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].final_score, 70);
        assert_eq!(
            matches[0].reasons,
            vec!["meets all eligibility criteria".to_string()]
        );
    }

    #[test]
    fn test_no_matches_returns_none() {
        let store = test_store();
        let session = store.open_session(None, None).unwrap();
        assert!(store.get_matches(&session.id).unwrap().is_none());
    }

    #[test]
    fn test_delete_cascades_to_scoped_rows() {
        let store = test_store();
        let session = store.open_session(None, None).unwrap();
        store
            .append_message(&session.id, MessageRole::User, "hi", None, None)
            .unwrap();
        store
            .replace_matches(&session.id, &[sample_match(1, 90)])
            .unwrap();

        store.delete_session(&session.id).unwrap();

        assert!(store.get_session(&session.id).unwrap().is_none());
        assert!(store.get_history(&session.id).unwrap().is_empty());
        assert!(store.get_matches(&session.id).unwrap().is_none());
        assert!(store.get_parameters(&session.id).is_err());
    }

    #[tokio::test]
    async fn test_session_locks_serialise_same_key() {
        let locks = Arc::new(SessionLocks::new());

        let guard = locks.acquire("s1").await;
        // A second acquire on the same key must block until the guard drops.
        let locks2 = Arc::clone(&locks);
        let handle = tokio::spawn(async move {
            let _g = locks2.acquire("s1").await;
        });
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!handle.is_finished());

        drop(guard);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_session_locks_independent_keys() {
        let locks = SessionLocks::new();
        let _g1 = locks.acquire("s1").await;
        // Different key — must not block.
        let _g2 = locks.acquire("s2").await;
    }
}
