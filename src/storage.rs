//! SQLite storage layer for stackrate.
//!
//! Provides the shared database used by the web server and the maintenance
//! tooling. Handles schema creation, CRUD for all entity types, natural-key
//! upserts for reference data, and the transactional vote-toggle primitive.

use std::collections::HashSet;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum StorageError {
    Sqlite(rusqlite::Error),
    NotFound(String),
    AlreadyExists(String),
    InvalidInput(String),
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::Sqlite(e) => write!(f, "sqlite error: {e}"),
            StorageError::NotFound(msg) => write!(f, "not found: {msg}"),
            StorageError::AlreadyExists(msg) => write!(f, "already exists: {msg}"),
            StorageError::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
        }
    }
}

impl std::error::Error for StorageError {}

impl From<rusqlite::Error> for StorageError {
    fn from(e: rusqlite::Error) -> Self {
        StorageError::Sqlite(e)
    }
}

/// True when the error is any constraint violation. Used where a collision
/// just means "this already exists" and the table carries no other
/// constraints that could fire.
fn is_constraint_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(f, _) if f.code == ErrorCode::ConstraintViolation
    )
}

/// True only for UNIQUE / PRIMARY KEY violations. The vote toggle depends on
/// this distinction: a unique collision on the voter row means "already
/// voted", while a foreign-key or check failure on the same insert is a real
/// error and must never flip the vote state or touch the counter.
fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(f, _)
            if f.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                || f.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
    )
}

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// User row. Authentication lives upstream; this table only anchors
/// ownership and vote identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRow {
    pub id: i64,
    pub username: String,
    pub is_admin: bool,
    pub created_at: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupplementRow {
    pub id: i64,
    pub name: String,
    pub category: String,
    pub dosage_unit: Option<String>,
    pub created_at: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionRow {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrandRow {
    pub id: i64,
    pub name: String,
}

/// Rating row. `brands` is the legacy denormalized comma-joined brand text;
/// `upvote_count` is a cache of the user_upvotes rows pointing at this
/// rating, maintained by the toggle and repairable via
/// [`Storage::recount_upvotes`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RatingRow {
    pub id: i64,
    pub user_id: i64,
    pub supplement_id: i64,
    pub score: i64,
    pub comment: Option<String>,
    pub dosage: Option<String>,
    pub dosage_frequency: Option<i64>,
    pub frequency_unit: Option<String>,
    pub brands: Option<String>,
    pub upvote_count: u32,
    pub is_edited: bool,
    pub created_at: u64,
    pub updated_at: u64,
}

/// Fields for creating a rating. Condition links are given as condition ids
/// per role.
#[derive(Debug, Clone, Default)]
pub struct NewRating {
    pub user_id: i64,
    pub supplement_id: i64,
    pub score: i64,
    pub comment: Option<String>,
    pub dosage: Option<String>,
    pub dosage_frequency: Option<i64>,
    pub frequency_unit: Option<String>,
    pub brands: Option<String>,
    pub purposes: Vec<i64>,
    pub benefits: Vec<i64>,
    pub side_effects: Vec<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentRow {
    pub id: i64,
    pub rating_id: Option<i64>,
    pub parent_comment_id: Option<i64>,
    pub user_id: i64,
    pub content: String,
    pub upvote_count: u32,
    pub is_edited: bool,
    pub created_at: u64,
}

/// The role a condition plays on a rating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionRole {
    Purpose,
    Benefit,
    SideEffect,
}

impl ConditionRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConditionRole::Purpose => "purpose",
            ConditionRole::Benefit => "benefit",
            ConditionRole::SideEffect => "side_effect",
        }
    }
}

/// Vote target: a rating or a comment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteTarget {
    Rating(i64),
    Comment(i64),
}

impl VoteTarget {
    fn table(&self) -> &'static str {
        match self {
            VoteTarget::Rating(_) => "ratings",
            VoteTarget::Comment(_) => "comments",
        }
    }

    fn vote_column(&self) -> &'static str {
        match self {
            VoteTarget::Rating(_) => "rating_id",
            VoteTarget::Comment(_) => "comment_id",
        }
    }

    pub fn id(&self) -> i64 {
        match self {
            VoteTarget::Rating(id) | VoteTarget::Comment(id) => *id,
        }
    }
}

/// Reference entity kind for bulk ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Supplement,
    Condition,
    Brand,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Supplement => "supplement",
            EntityKind::Condition => "condition",
            EntityKind::Brand => "brand",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "supplement" | "supplements" => Some(EntityKind::Supplement),
            "condition" | "conditions" => Some(EntityKind::Condition),
            "brand" | "brands" => Some(EntityKind::Brand),
            _ => None,
        }
    }
}

/// One validated row handed to the batch upserter. `row` is the 1-based
/// index over the data rows of the source table, carried through into error
/// reports.
#[derive(Debug, Clone)]
pub struct ReferenceRecord {
    pub row: usize,
    pub name: String,
    pub category: Option<String>,
    pub dosage_unit: Option<String>,
}

/// Outcome of a batch upsert: counts plus per-row store errors.
#[derive(Debug, Clone, Default)]
pub struct BatchResult {
    pub created: u32,
    pub updated: u32,
    pub errors: Vec<(usize, String)>,
}

// ---------------------------------------------------------------------------
// Storage handle
// ---------------------------------------------------------------------------

/// Main storage handle wrapping a SQLite connection.
pub struct Storage {
    conn: Connection,
}

impl Storage {
    /// Open or create a database at the given path. Creates schema if needed.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        let storage = Self { conn };
        storage.create_schema()?;
        Ok(storage)
    }

    /// Create an in-memory database, used by the test suites.
    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        let storage = Self { conn };
        storage.create_schema()?;
        Ok(storage)
    }

    fn create_schema(&self) -> Result<(), StorageError> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS users (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                username    TEXT NOT NULL UNIQUE,
                is_admin    INTEGER NOT NULL DEFAULT 0,
                created_at  INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS supplements (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                name        TEXT NOT NULL,
                category    TEXT NOT NULL DEFAULT 'General',
                dosage_unit TEXT,
                created_at  INTEGER NOT NULL,
                UNIQUE (name, category)
            );

            CREATE TABLE IF NOT EXISTS conditions (
                id      INTEGER PRIMARY KEY AUTOINCREMENT,
                name    TEXT NOT NULL UNIQUE
            );

            CREATE TABLE IF NOT EXISTS brands (
                id      INTEGER PRIMARY KEY AUTOINCREMENT,
                name    TEXT NOT NULL UNIQUE
            );

            CREATE TABLE IF NOT EXISTS ratings (
                id               INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id          INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                supplement_id    INTEGER NOT NULL REFERENCES supplements(id) ON DELETE CASCADE,
                score            INTEGER NOT NULL CHECK (score BETWEEN 1 AND 5),
                comment          TEXT,
                dosage           TEXT,
                dosage_frequency INTEGER,
                frequency_unit   TEXT,
                brands           TEXT,
                upvote_count     INTEGER NOT NULL DEFAULT 0,
                is_edited        INTEGER NOT NULL DEFAULT 0,
                created_at       INTEGER NOT NULL,
                updated_at       INTEGER NOT NULL,
                UNIQUE (user_id, supplement_id)
            );

            CREATE INDEX IF NOT EXISTS idx_ratings_supplement
                ON ratings(supplement_id);

            CREATE TABLE IF NOT EXISTS rating_conditions (
                rating_id    INTEGER NOT NULL REFERENCES ratings(id) ON DELETE CASCADE,
                condition_id INTEGER NOT NULL REFERENCES conditions(id) ON DELETE CASCADE,
                role         TEXT NOT NULL CHECK (role IN ('purpose', 'benefit', 'side_effect')),
                PRIMARY KEY (rating_id, condition_id, role)
            );

            CREATE INDEX IF NOT EXISTS idx_rating_conditions_condition
                ON rating_conditions(condition_id, role);

            CREATE TABLE IF NOT EXISTS comments (
                id                INTEGER PRIMARY KEY AUTOINCREMENT,
                rating_id         INTEGER REFERENCES ratings(id) ON DELETE CASCADE,
                parent_comment_id INTEGER REFERENCES comments(id) ON DELETE CASCADE,
                user_id           INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                content           TEXT NOT NULL,
                upvote_count      INTEGER NOT NULL DEFAULT 0,
                is_edited         INTEGER NOT NULL DEFAULT 0,
                created_at        INTEGER NOT NULL,
                CHECK ((rating_id IS NULL) != (parent_comment_id IS NULL))
            );

            CREATE INDEX IF NOT EXISTS idx_comments_rating
                ON comments(rating_id);
            CREATE INDEX IF NOT EXISTS idx_comments_parent
                ON comments(parent_comment_id);

            -- The unique indexes on (user_id, rating_id) and
            -- (user_id, comment_id) are the concurrency gate for the vote
            -- toggle: the insert either lands or collides, and the collision
            -- tells us the vote already existed.
            CREATE TABLE IF NOT EXISTS user_upvotes (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id     INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                rating_id   INTEGER REFERENCES ratings(id) ON DELETE CASCADE,
                comment_id  INTEGER REFERENCES comments(id) ON DELETE CASCADE,
                created_at  INTEGER NOT NULL,
                CHECK ((rating_id IS NULL) != (comment_id IS NULL)),
                UNIQUE (user_id, rating_id),
                UNIQUE (user_id, comment_id)
            );
            ",
        )?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Users
    // -----------------------------------------------------------------------

    pub fn create_user(&self, username: &str, is_admin: bool) -> Result<i64, StorageError> {
        let res = self.conn.execute(
            "INSERT INTO users (username, is_admin, created_at) VALUES (?1, ?2, ?3)",
            params![username, is_admin, now_secs() as i64],
        );
        match res {
            Ok(_) => Ok(self.conn.last_insert_rowid()),
            Err(e) if is_constraint_violation(&e) => {
                Err(StorageError::AlreadyExists(format!("user '{username}'")))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn get_user(&self, id: i64) -> Result<Option<UserRow>, StorageError> {
        let row = self
            .conn
            .query_row(
                "SELECT id, username, is_admin, created_at FROM users WHERE id = ?1",
                params![id],
                |row| {
                    Ok(UserRow {
                        id: row.get(0)?,
                        username: row.get(1)?,
                        is_admin: row.get::<_, i64>(2)? != 0,
                        created_at: row.get::<_, i64>(3)? as u64,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    // -----------------------------------------------------------------------
    // Supplements
    // -----------------------------------------------------------------------

    pub fn create_supplement(
        &self,
        name: &str,
        category: &str,
        dosage_unit: Option<&str>,
    ) -> Result<i64, StorageError> {
        let res = self.conn.execute(
            "INSERT INTO supplements (name, category, dosage_unit, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![name, category, dosage_unit, now_secs() as i64],
        );
        match res {
            Ok(_) => Ok(self.conn.last_insert_rowid()),
            Err(e) if is_constraint_violation(&e) => Err(StorageError::AlreadyExists(format!(
                "supplement '{name}' in category '{category}'"
            ))),
            Err(e) => Err(e.into()),
        }
    }

    pub fn get_supplement(&self, id: i64) -> Result<Option<SupplementRow>, StorageError> {
        let row = self
            .conn
            .query_row(
                "SELECT id, name, category, dosage_unit, created_at
                 FROM supplements WHERE id = ?1",
                params![id],
                |row| {
                    Ok(SupplementRow {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        category: row.get(2)?,
                        dosage_unit: row.get(3)?,
                        created_at: row.get::<_, i64>(4)? as u64,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    /// Unfiltered aggregate for a single supplement: (average score, rating
    /// count). The average is `None` when the supplement has no ratings.
    pub fn supplement_aggregate(&self, id: i64) -> Result<(Option<f64>, u32), StorageError> {
        let (avg, count): (Option<f64>, i64) = self.conn.query_row(
            "SELECT AVG(CAST(score AS REAL)), COUNT(id)
             FROM ratings WHERE supplement_id = ?1",
            params![id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok((avg.map(|a| (a * 100.0).round() / 100.0), count as u32))
    }

    // -----------------------------------------------------------------------
    // Conditions and brands
    // -----------------------------------------------------------------------

    pub fn create_condition(&self, name: &str) -> Result<i64, StorageError> {
        let res = self
            .conn
            .execute("INSERT INTO conditions (name) VALUES (?1)", params![name]);
        match res {
            Ok(_) => Ok(self.conn.last_insert_rowid()),
            Err(e) if is_constraint_violation(&e) => {
                Err(StorageError::AlreadyExists(format!("condition '{name}'")))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn list_conditions(&self) -> Result<Vec<ConditionRow>, StorageError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name FROM conditions ORDER BY name")?;
        let rows = stmt.query_map([], |row| {
            Ok(ConditionRow {
                id: row.get(0)?,
                name: row.get(1)?,
            })
        })?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    pub fn create_brand(&self, name: &str) -> Result<i64, StorageError> {
        let res = self
            .conn
            .execute("INSERT INTO brands (name) VALUES (?1)", params![name]);
        match res {
            Ok(_) => Ok(self.conn.last_insert_rowid()),
            Err(e) if is_constraint_violation(&e) => {
                Err(StorageError::AlreadyExists(format!("brand '{name}'")))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn list_brands(&self) -> Result<Vec<BrandRow>, StorageError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name FROM brands ORDER BY name")?;
        let rows = stmt.query_map([], |row| {
            Ok(BrandRow {
                id: row.get(0)?,
                name: row.get(1)?,
            })
        })?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    /// Rename a brand and rewrite the denormalized brand text on every rating
    /// that references it, in one transaction. Matching against the rating
    /// text is token-wise (split on commas, trimmed, case-insensitive) so a
    /// brand whose name is a substring of another is not touched.
    pub fn rename_brand(&self, old_name: &str, new_name: &str) -> Result<u32, StorageError> {
        let tx = self.conn.unchecked_transaction()?;

        let affected = tx.execute(
            "UPDATE brands SET name = ?1 WHERE name = ?2",
            params![new_name, old_name],
        );
        match affected {
            Ok(0) => return Err(StorageError::NotFound(format!("brand '{old_name}'"))),
            Ok(_) => {}
            Err(e) if is_constraint_violation(&e) => {
                return Err(StorageError::AlreadyExists(format!("brand '{new_name}'")))
            }
            Err(e) => return Err(e.into()),
        }

        let mut rewritten = 0u32;
        {
            let mut stmt = tx.prepare(
                "SELECT id, brands FROM ratings
                 WHERE brands IS NOT NULL AND LOWER(brands) LIKE '%' || LOWER(?1) || '%'",
            )?;
            let rows = stmt.query_map(params![old_name], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
            })?;
            let mut updates = Vec::new();
            for row in rows {
                let (id, text) = row?;
                let tokens: Vec<String> = text
                    .split(',')
                    .map(|t| {
                        let t = t.trim();
                        if t.eq_ignore_ascii_case(old_name) {
                            new_name.to_string()
                        } else {
                            t.to_string()
                        }
                    })
                    .collect();
                let joined = tokens.join(", ");
                if joined != text {
                    updates.push((id, joined));
                }
            }
            for (id, joined) in updates {
                tx.execute(
                    "UPDATE ratings SET brands = ?1 WHERE id = ?2",
                    params![joined, id],
                )?;
                rewritten += 1;
            }
        }

        tx.commit()?;
        Ok(rewritten)
    }

    // -----------------------------------------------------------------------
    // Bulk reference upsert
    // -----------------------------------------------------------------------

    /// Upsert a batch of validated reference records keyed on their natural
    /// key, all inside one transaction. Each record runs under a savepoint so
    /// a per-row constraint failure (e.g. a race with a concurrent ingest)
    /// is recorded against that row and rolled back without aborting the
    /// batch. The commit covers exactly the rows that did not error.
    pub fn upsert_reference_batch(
        &self,
        kind: EntityKind,
        records: &[ReferenceRecord],
    ) -> Result<BatchResult, StorageError> {
        let mut tx = self.conn.unchecked_transaction()?;
        let mut result = BatchResult::default();

        for rec in records {
            let sp = tx.savepoint()?;
            let outcome = match kind {
                EntityKind::Supplement => upsert_supplement_record(&sp, rec),
                EntityKind::Condition => upsert_named_record(&sp, "conditions", rec),
                EntityKind::Brand => upsert_named_record(&sp, "brands", rec),
            };
            match outcome {
                Ok(true) => {
                    sp.commit()?;
                    result.created += 1;
                }
                Ok(false) => {
                    sp.commit()?;
                    result.updated += 1;
                }
                Err(e) => {
                    // Savepoint rolls back on drop; the row leaves no trace.
                    drop(sp);
                    result.errors.push((rec.row, e.to_string()));
                }
            }
        }

        tx.commit()?;
        Ok(result)
    }

    // -----------------------------------------------------------------------
    // Ratings
    // -----------------------------------------------------------------------

    /// Create a rating together with its condition links. The explicit
    /// existing-rating check enforces at most one rating per
    /// (user, supplement) pair ahead of the unique index, so callers get a
    /// clean AlreadyExists instead of a bare constraint error.
    pub fn create_rating(&self, new: &NewRating) -> Result<i64, StorageError> {
        if !(1..=5).contains(&new.score) {
            return Err(StorageError::InvalidInput(format!(
                "score must be between 1 and 5, got {}",
                new.score
            )));
        }

        let tx = self.conn.unchecked_transaction()?;

        let existing: Option<i64> = tx
            .query_row(
                "SELECT id FROM ratings WHERE user_id = ?1 AND supplement_id = ?2",
                params![new.user_id, new.supplement_id],
                |row| row.get(0),
            )
            .optional()?;
        if existing.is_some() {
            return Err(StorageError::AlreadyExists(
                "rating for this supplement by this user".to_string(),
            ));
        }

        let now = now_secs() as i64;
        tx.execute(
            "INSERT INTO ratings
             (user_id, supplement_id, score, comment, dosage, dosage_frequency,
              frequency_unit, brands, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)",
            params![
                new.user_id,
                new.supplement_id,
                new.score,
                new.comment,
                new.dosage,
                new.dosage_frequency,
                new.frequency_unit,
                new.brands,
                now,
            ],
        )?;
        let rating_id = tx.last_insert_rowid();

        let roles = [
            (ConditionRole::Purpose, &new.purposes),
            (ConditionRole::Benefit, &new.benefits),
            (ConditionRole::SideEffect, &new.side_effects),
        ];
        for (role, ids) in roles {
            for condition_id in ids {
                tx.execute(
                    "INSERT OR IGNORE INTO rating_conditions (rating_id, condition_id, role)
                     VALUES (?1, ?2, ?3)",
                    params![rating_id, condition_id, role.as_str()],
                )?;
            }
        }

        tx.commit()?;
        Ok(rating_id)
    }

    pub fn get_rating(&self, id: i64) -> Result<Option<RatingRow>, StorageError> {
        let row = self
            .conn
            .query_row(
                "SELECT id, user_id, supplement_id, score, comment, dosage,
                        dosage_frequency, frequency_unit, brands, upvote_count,
                        is_edited, created_at, updated_at
                 FROM ratings WHERE id = ?1",
                params![id],
                rating_from_row,
            )
            .optional()?;
        Ok(row)
    }

    pub fn list_ratings_for_supplement(
        &self,
        supplement_id: i64,
    ) -> Result<Vec<RatingRow>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, user_id, supplement_id, score, comment, dosage,
                    dosage_frequency, frequency_unit, brands, upvote_count,
                    is_edited, created_at, updated_at
             FROM ratings WHERE supplement_id = ?1 ORDER BY created_at DESC, id DESC",
        )?;
        let rows = stmt.query_map(params![supplement_id], rating_from_row)?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    /// Update a rating's content fields and mark it edited.
    pub fn update_rating(
        &self,
        id: i64,
        score: i64,
        comment: Option<&str>,
        brands: Option<&str>,
    ) -> Result<(), StorageError> {
        if !(1..=5).contains(&score) {
            return Err(StorageError::InvalidInput(format!(
                "score must be between 1 and 5, got {score}"
            )));
        }
        let affected = self.conn.execute(
            "UPDATE ratings
             SET score = ?1, comment = ?2, brands = ?3, is_edited = 1, updated_at = ?4
             WHERE id = ?5",
            params![score, comment, brands, now_secs() as i64, id],
        )?;
        if affected == 0 {
            return Err(StorageError::NotFound(format!("rating {id}")));
        }
        Ok(())
    }

    /// Condition names linked to a rating in the given role.
    pub fn rating_condition_names(
        &self,
        rating_id: i64,
        role: ConditionRole,
    ) -> Result<Vec<String>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT c.name FROM rating_conditions rc
             JOIN conditions c ON c.id = rc.condition_id
             WHERE rc.rating_id = ?1 AND rc.role = ?2
             ORDER BY c.name",
        )?;
        let rows = stmt.query_map(params![rating_id, role.as_str()], |row| row.get(0))?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    // -----------------------------------------------------------------------
    // Comments
    // -----------------------------------------------------------------------

    /// Create a comment. Exactly one of `rating_id` / `parent_comment_id`
    /// must be set: a comment hangs either directly off a rating or off
    /// another comment in the reply tree.
    pub fn create_comment(
        &self,
        user_id: i64,
        rating_id: Option<i64>,
        parent_comment_id: Option<i64>,
        content: &str,
    ) -> Result<i64, StorageError> {
        match (rating_id, parent_comment_id) {
            (Some(_), None) | (None, Some(_)) => {}
            _ => {
                return Err(StorageError::InvalidInput(
                    "comment must reference exactly one of rating or parent comment".to_string(),
                ))
            }
        }
        let res = self.conn.execute(
            "INSERT INTO comments (rating_id, parent_comment_id, user_id, content, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                rating_id,
                parent_comment_id,
                user_id,
                content,
                now_secs() as i64
            ],
        );
        match res {
            Ok(_) => Ok(self.conn.last_insert_rowid()),
            Err(e) if is_constraint_violation(&e) => Err(StorageError::NotFound(
                "referenced rating or parent comment".to_string(),
            )),
            Err(e) => Err(e.into()),
        }
    }

    pub fn get_comment(&self, id: i64) -> Result<Option<CommentRow>, StorageError> {
        let row = self
            .conn
            .query_row(
                "SELECT id, rating_id, parent_comment_id, user_id, content,
                        upvote_count, is_edited, created_at
                 FROM comments WHERE id = ?1",
                params![id],
                comment_from_row,
            )
            .optional()?;
        Ok(row)
    }

    /// Comments attached directly to a rating, oldest first.
    pub fn list_comments_for_rating(&self, rating_id: i64) -> Result<Vec<CommentRow>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, rating_id, parent_comment_id, user_id, content,
                    upvote_count, is_edited, created_at
             FROM comments WHERE rating_id = ?1 ORDER BY created_at, id",
        )?;
        let rows = stmt.query_map(params![rating_id], comment_from_row)?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    /// Direct replies to a comment, oldest first.
    pub fn list_replies(&self, parent_comment_id: i64) -> Result<Vec<CommentRow>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, rating_id, parent_comment_id, user_id, content,
                    upvote_count, is_edited, created_at
             FROM comments WHERE parent_comment_id = ?1 ORDER BY created_at, id",
        )?;
        let rows = stmt.query_map(params![parent_comment_id], comment_from_row)?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    /// Resolve the rating a comment is ultimately about by walking parent
    /// links to the nearest ancestor with a direct rating reference. The
    /// visited set guards against a corrupted cycle in the tree, which the
    /// schema does not prevent.
    pub fn resolve_root_rating(&self, comment_id: i64) -> Result<Option<i64>, StorageError> {
        let mut visited = HashSet::new();
        let mut current = comment_id;
        loop {
            if !visited.insert(current) {
                return Ok(None);
            }
            let comment = match self.get_comment(current)? {
                Some(c) => c,
                None => return Ok(None),
            };
            if let Some(rating_id) = comment.rating_id {
                return Ok(Some(rating_id));
            }
            match comment.parent_comment_id {
                Some(parent) => current = parent,
                None => return Ok(None),
            }
        }
    }

    /// Update a comment's content and mark it edited.
    pub fn update_comment(&self, id: i64, content: &str) -> Result<(), StorageError> {
        let affected = self.conn.execute(
            "UPDATE comments SET content = ?1, is_edited = 1 WHERE id = ?2",
            params![content, id],
        )?;
        if affected == 0 {
            return Err(StorageError::NotFound(format!("comment {id}")));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Vote toggle primitives
    // -----------------------------------------------------------------------

    /// Flip a user's vote on a target inside one transaction. The insert into
    /// `user_upvotes` is the sole arbiter of "already voted": if it lands the
    /// counter is atomically incremented, if it collides with the unique
    /// index the existing row is deleted and the counter decremented (never
    /// below zero, in case the counter and the voter rows have drifted).
    ///
    /// Returns whether the vote was added and the resulting counter value.
    /// Ownership checks live in [`crate::votes`]; this is the raw state flip.
    pub fn toggle_upvote(
        &self,
        user_id: i64,
        target: VoteTarget,
    ) -> Result<(bool, u32), StorageError> {
        let tx = self.conn.unchecked_transaction()?;
        let table = target.table();
        let col = target.vote_column();
        let target_id = target.id();

        let insert = tx.execute(
            &format!(
                "INSERT INTO user_upvotes (user_id, {col}, created_at) VALUES (?1, ?2, ?3)"
            ),
            params![user_id, target_id, now_secs() as i64],
        );

        let added = match insert {
            Ok(_) => {
                // Atomic relative increment; never read-modify-write.
                tx.execute(
                    &format!("UPDATE {table} SET upvote_count = upvote_count + 1 WHERE id = ?1"),
                    params![target_id],
                )?;
                true
            }
            Err(e) if is_unique_violation(&e) => {
                tx.execute(
                    &format!("DELETE FROM user_upvotes WHERE user_id = ?1 AND {col} = ?2"),
                    params![user_id, target_id],
                )?;
                // Clamped at zero so a drifted counter cannot go negative.
                tx.execute(
                    &format!(
                        "UPDATE {table} SET upvote_count = upvote_count - 1
                         WHERE id = ?1 AND upvote_count > 0"
                    ),
                    params![target_id],
                )?;
                false
            }
            Err(e) => return Err(e.into()),
        };

        let count: i64 = tx.query_row(
            &format!("SELECT upvote_count FROM {table} WHERE id = ?1"),
            params![target_id],
            |row| row.get(0),
        )?;

        tx.commit()?;
        Ok((added, count as u32))
    }

    /// Does this user currently have a vote recorded on the target?
    pub fn has_upvote(&self, user_id: i64, target: VoteTarget) -> Result<bool, StorageError> {
        let col = target.vote_column();
        let count: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM user_upvotes WHERE user_id = ?1 AND {col} = ?2"),
            params![user_id, target.id()],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Force a target's counter to an arbitrary value. Maintenance/test hook
    /// for exercising drift between the counter and the voter rows.
    pub fn set_upvote_count(&self, target: VoteTarget, count: u32) -> Result<(), StorageError> {
        let affected = self.conn.execute(
            &format!("UPDATE {} SET upvote_count = ?1 WHERE id = ?2", target.table()),
            params![count, target.id()],
        )?;
        if affected == 0 {
            return Err(StorageError::NotFound(format!(
                "{} {}",
                target.table(),
                target.id()
            )));
        }
        Ok(())
    }

    /// Re-derive every upvote counter from the voter rows, in one
    /// transaction. Returns how many counters were corrected. The counters
    /// are caches; this is the explicit repair path for drift.
    pub fn recount_upvotes(&self) -> Result<u32, StorageError> {
        let tx = self.conn.unchecked_transaction()?;
        let ratings = tx.execute(
            "UPDATE ratings SET upvote_count =
                 (SELECT COUNT(*) FROM user_upvotes WHERE rating_id = ratings.id)
             WHERE upvote_count !=
                 (SELECT COUNT(*) FROM user_upvotes WHERE rating_id = ratings.id)",
            [],
        )?;
        let comments = tx.execute(
            "UPDATE comments SET upvote_count =
                 (SELECT COUNT(*) FROM user_upvotes WHERE comment_id = comments.id)
             WHERE upvote_count !=
                 (SELECT COUNT(*) FROM user_upvotes WHERE comment_id = comments.id)",
            [],
        )?;
        tx.commit()?;
        Ok((ratings + comments) as u32)
    }

    /// Shared connection access for the ranking engine's read queries.
    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ---------------------------------------------------------------------------
// Row mapping and upsert helpers
// ---------------------------------------------------------------------------

fn rating_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RatingRow> {
    Ok(RatingRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        supplement_id: row.get(2)?,
        score: row.get(3)?,
        comment: row.get(4)?,
        dosage: row.get(5)?,
        dosage_frequency: row.get(6)?,
        frequency_unit: row.get(7)?,
        brands: row.get(8)?,
        upvote_count: row.get::<_, i64>(9)? as u32,
        is_edited: row.get::<_, i64>(10)? != 0,
        created_at: row.get::<_, i64>(11)? as u64,
        updated_at: row.get::<_, i64>(12)? as u64,
    })
}

fn comment_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<CommentRow> {
    Ok(CommentRow {
        id: row.get(0)?,
        rating_id: row.get(1)?,
        parent_comment_id: row.get(2)?,
        user_id: row.get(3)?,
        content: row.get(4)?,
        upvote_count: row.get::<_, i64>(5)? as u32,
        is_edited: row.get::<_, i64>(6)? != 0,
        created_at: row.get::<_, i64>(7)? as u64,
    })
}

/// Upsert one supplement record keyed on (name, category). Returns true when
/// the row was created, false when an existing row was updated.
fn upsert_supplement_record(
    conn: &Connection,
    rec: &ReferenceRecord,
) -> Result<bool, rusqlite::Error> {
    let category = rec.category.as_deref().unwrap_or("General");
    let existing: Option<i64> = conn
        .query_row(
            "SELECT id FROM supplements WHERE name = ?1 AND category = ?2",
            params![rec.name, category],
            |row| row.get(0),
        )
        .optional()?;
    match existing {
        Some(id) => {
            conn.execute(
                "UPDATE supplements SET dosage_unit = ?1 WHERE id = ?2",
                params![rec.dosage_unit, id],
            )?;
            Ok(false)
        }
        None => {
            conn.execute(
                "INSERT INTO supplements (name, category, dosage_unit, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![rec.name, category, rec.dosage_unit, now_secs() as i64],
            )?;
            Ok(true)
        }
    }
}

/// Upsert one name-keyed record (conditions, brands). The name is the whole
/// natural key, so a match means the row already holds the batch's values.
fn upsert_named_record(
    conn: &Connection,
    table: &str,
    rec: &ReferenceRecord,
) -> Result<bool, rusqlite::Error> {
    let existing: Option<i64> = conn
        .query_row(
            &format!("SELECT id FROM {table} WHERE name = ?1"),
            params![rec.name],
            |row| row.get(0),
        )
        .optional()?;
    match existing {
        Some(_) => Ok(false),
        None => {
            conn.execute(
                &format!("INSERT INTO {table} (name) VALUES (?1)"),
                params![rec.name],
            )?;
            Ok(true)
        }
    }
}

/// Current time as seconds since UNIX epoch.
pub fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
