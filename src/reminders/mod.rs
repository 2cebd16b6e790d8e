use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use diesel_async::pooled_connection::bb8::{Pool, PooledConnection};
use diesel_async::pooled_connection::AsyncDieselConnectionManager;
use diesel_async::sync_connection_wrapper::SyncConnectionWrapper;
use diesel_async::RunQueryDsl;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use serde::Serialize;

use crate::error::{NanatechError, Result};
use crate::interfaces::store::ReminderBackend;
use crate::recurrence::{RecurrenceData, RecurrencePattern, RecurrenceRule};

mod schema;
use schema::reminders;

const MIGRATIONS: EmbeddedMigrations = embed_migrations!();
const DEFAULT_TITLE: &str = "Reminder";

type SqliteAsyncConn = SyncConnectionWrapper<SqliteConnection>;
type SqlitePool = Pool<SqliteAsyncConn>;
type SqlitePooledConn<'a> = PooledConnection<'a, SqliteAsyncConn>;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reminder {
    pub id: i32,
    pub user_id: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub occurrence_time: Option<DateTime<Utc>>,
    pub is_completed: bool,
    pub is_recurring: bool,
    pub recurrence_pattern: RecurrencePattern,
    pub recurrence_data: Option<RecurrenceData>,
    pub recurrence_end: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Reminder {
    /// The title shown to the user; blank titles fall back to a generic label.
    pub fn display_title(&self) -> &str {
        self.title
            .as_deref()
            .map(str::trim)
            .filter(|title| !title.is_empty())
            .unwrap_or(DEFAULT_TITLE)
    }

    pub fn alert_tag(&self) -> String {
        format!("reminder-{}", self.id)
    }

    pub fn recurrence_rule(&self) -> RecurrenceRule {
        RecurrenceRule::new(self.recurrence_pattern, self.recurrence_data.clone())
    }
}

/// Fields a caller supplies when creating a reminder.
#[derive(Debug, Clone, Default)]
pub struct NewReminderInput {
    pub title: Option<String>,
    pub description: Option<String>,
    pub occurrence_time: Option<DateTime<Utc>>,
    pub is_recurring: bool,
    pub recurrence_pattern: RecurrencePattern,
    pub recurrence_data: Option<RecurrenceData>,
    pub recurrence_end: Option<DateTime<Utc>>,
}

impl NewReminderInput {
    pub fn one_shot(title: &str, at: DateTime<Utc>) -> Self {
        Self {
            title: Some(title.to_string()),
            occurrence_time: Some(at),
            ..Self::default()
        }
    }

    pub fn recurring(title: &str, at: DateTime<Utc>, pattern: RecurrencePattern) -> Self {
        Self {
            title: Some(title.to_string()),
            occurrence_time: Some(at),
            is_recurring: !pattern.is_none(),
            recurrence_pattern: pattern,
            ..Self::default()
        }
    }

    pub fn until(mut self, end: DateTime<Utc>) -> Self {
        self.recurrence_end = Some(end);
        self
    }

    pub fn with_data(mut self, data: RecurrenceData) -> Self {
        self.recurrence_data = Some(data);
        self
    }
}

#[derive(Queryable)]
struct ReminderRow {
    id: i32,
    user_id: String,
    title: Option<String>,
    description: Option<String>,
    occurrence_time: Option<i64>,
    is_completed: bool,
    is_recurring: bool,
    recurrence_pattern: String,
    recurrence_data: Option<String>,
    recurrence_end: Option<i64>,
    created_at: i64,
}

#[derive(Insertable)]
#[diesel(table_name = reminders)]
struct NewReminderRow<'a> {
    user_id: &'a str,
    title: Option<&'a str>,
    description: Option<&'a str>,
    occurrence_time: Option<i64>,
    is_completed: bool,
    is_recurring: bool,
    recurrence_pattern: &'a str,
    recurrence_data: Option<String>,
    recurrence_end: Option<i64>,
    created_at: i64,
}

pub struct ReminderStore {
    pool: SqlitePool,
}

impl ReminderStore {
    pub async fn new(sqlite_path: impl AsRef<str>) -> Result<Self> {
        let sqlite_path = sqlite_path.as_ref();
        crate::db::ensure_parent_dir(sqlite_path)?;
        run_migrations(sqlite_path).await?;

        let manager = AsyncDieselConnectionManager::<SqliteAsyncConn>::new(sqlite_path);
        let pool: SqlitePool = Pool::builder()
            .build(manager)
            .await
            .map_err(|e| NanatechError::Store(e.to_string()))?;
        Ok(Self { pool })
    }

    pub async fn create_reminder(
        &self,
        user_id: &str,
        input: &NewReminderInput,
    ) -> Result<Reminder> {
        let recurrence_data = input
            .recurrence_data
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| NanatechError::Serialization(e.to_string()))?;
        let new = NewReminderRow {
            user_id,
            title: input.title.as_deref(),
            description: input.description.as_deref(),
            occurrence_time: input.occurrence_time.map(|at| at.timestamp()),
            is_completed: false,
            is_recurring: input.is_recurring,
            recurrence_pattern: input.recurrence_pattern.as_str(),
            recurrence_data,
            recurrence_end: input.recurrence_end.map(|end| end.timestamp()),
            created_at: Utc::now().timestamp(),
        };

        let mut conn = self.conn().await?;
        diesel::insert_into(reminders::table)
            .values(&new)
            .execute(&mut conn)
            .await
            .map_err(|e| NanatechError::Store(e.to_string()))?;

        let row: ReminderRow = reminders::table
            .filter(reminders::user_id.eq(user_id))
            .order(reminders::id.desc())
            .first(&mut conn)
            .await
            .map_err(|e| NanatechError::Store(e.to_string()))?;
        Ok(map_row(row))
    }

    pub async fn get_reminder(&self, user_id: &str, id: i32) -> Result<Option<Reminder>> {
        let mut conn = self.conn().await?;
        let row = reminders::table
            .filter(reminders::user_id.eq(user_id))
            .filter(reminders::id.eq(id))
            .first::<ReminderRow>(&mut conn)
            .await
            .optional()
            .map_err(|e| NanatechError::Store(e.to_string()))?;
        Ok(row.map(map_row))
    }

    pub async fn list_reminders(
        &self,
        user_id: &str,
        status: ReminderStatus,
        limit: usize,
    ) -> Result<Vec<Reminder>> {
        let mut conn = self.conn().await?;
        let mut query = reminders::table
            .filter(reminders::user_id.eq(user_id))
            .into_boxed();

        match status {
            ReminderStatus::Open => {
                query = query.filter(reminders::is_completed.eq(false));
            }
            ReminderStatus::Completed => {
                query = query.filter(reminders::is_completed.eq(true));
            }
            ReminderStatus::All => {}
        }

        if limit > 0 {
            query = query.limit(limit as i64);
        }

        let rows: Vec<ReminderRow> = query
            .order((reminders::occurrence_time.asc(), reminders::id.asc()))
            .load(&mut conn)
            .await
            .map_err(|e| NanatechError::Store(e.to_string()))?;
        Ok(rows.into_iter().map(map_row).collect())
    }

    pub async fn complete_reminder(&self, user_id: &str, id: i32) -> Result<bool> {
        let mut conn = self.conn().await?;
        let updated = diesel::update(
            reminders::table
                .filter(reminders::user_id.eq(user_id))
                .filter(reminders::id.eq(id)),
        )
        .set(reminders::is_completed.eq(true))
        .execute(&mut conn)
        .await
        .map_err(|e| NanatechError::Store(e.to_string()))?;
        Ok(updated > 0)
    }

    pub async fn delete_reminder(&self, user_id: &str, id: i32) -> Result<bool> {
        let mut conn = self.conn().await?;
        let deleted = diesel::delete(
            reminders::table
                .filter(reminders::user_id.eq(user_id))
                .filter(reminders::id.eq(id)),
        )
        .execute(&mut conn)
        .await
        .map_err(|e| NanatechError::Store(e.to_string()))?;
        Ok(deleted > 0)
    }

    async fn conn(&self) -> Result<SqlitePooledConn<'_>> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| NanatechError::Store(e.to_string()))?;
        crate::db::apply_connection_pragmas_async(&mut conn).await?;
        Ok(conn)
    }
}

#[async_trait]
impl ReminderBackend for ReminderStore {
    async fn due_reminders(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
        advance_notice: TimeDelta,
    ) -> Result<Vec<Reminder>> {
        let cutoff = now
            .checked_add_signed(advance_notice)
            .unwrap_or(now)
            .timestamp();
        let mut conn = self.conn().await?;
        let rows: Vec<ReminderRow> = reminders::table
            .filter(reminders::user_id.eq(user_id))
            .filter(reminders::is_completed.eq(false))
            .filter(reminders::occurrence_time.is_not_null())
            .filter(reminders::occurrence_time.le(cutoff))
            .order((reminders::occurrence_time.asc(), reminders::id.asc()))
            .load(&mut conn)
            .await
            .map_err(|e| NanatechError::Store(e.to_string()))?;
        Ok(rows.into_iter().map(map_row).collect())
    }

    async fn reschedule(&self, user_id: &str, id: i32, next: DateTime<Utc>) -> Result<bool> {
        let mut conn = self.conn().await?;
        let updated = diesel::update(
            reminders::table
                .filter(reminders::user_id.eq(user_id))
                .filter(reminders::id.eq(id))
                .filter(reminders::is_completed.eq(false)),
        )
        .set(reminders::occurrence_time.eq(Some(next.timestamp())))
        .execute(&mut conn)
        .await
        .map_err(|e| NanatechError::Store(e.to_string()))?;
        Ok(updated > 0)
    }

    async fn mark_completed(&self, user_id: &str, id: i32) -> Result<bool> {
        self.complete_reminder(user_id, id).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReminderStatus {
    Open,
    Completed,
    All,
}

impl ReminderStatus {
    pub fn from_option(value: Option<&str>) -> Self {
        value
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(ReminderStatus::Open)
    }
}

impl std::str::FromStr for ReminderStatus {
    type Err = ();

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match value {
            "completed" => ReminderStatus::Completed,
            "all" => ReminderStatus::All,
            _ => ReminderStatus::Open,
        })
    }
}

fn map_row(row: ReminderRow) -> Reminder {
    let recurrence_data = row.recurrence_data.as_deref().and_then(|raw| {
        serde_json::from_str::<RecurrenceData>(raw)
            .map_err(|err| {
                tracing::warn!(reminder_id = row.id, error = %err, "Ignoring malformed recurrence data");
            })
            .ok()
    });
    Reminder {
        id: row.id,
        user_id: row.user_id,
        title: row.title,
        description: row.description,
        occurrence_time: row.occurrence_time.and_then(from_unix),
        is_completed: row.is_completed,
        is_recurring: row.is_recurring,
        recurrence_pattern: row.recurrence_pattern.parse().unwrap_or_default(),
        recurrence_data,
        recurrence_end: row.recurrence_end.and_then(from_unix),
        created_at: from_unix(row.created_at).unwrap_or_default(),
    }
}

fn from_unix(seconds: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(seconds, 0)
}

async fn run_migrations(database_url: &str) -> Result<()> {
    let database_url = database_url.to_string();
    tokio::task::spawn_blocking(move || {
        let mut conn = crate::db::open_connection_sync(&database_url)?;
        conn.run_pending_migrations(MIGRATIONS)
            .map_err(|e| NanatechError::Store(e.to_string()))?;
        Ok::<_, NanatechError>(())
    })
    .await
    .map_err(|e| NanatechError::Runtime(e.to_string()))??;
    Ok(())
}
