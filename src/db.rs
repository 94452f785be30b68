use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use sqlx::{Pool, QueryBuilder, Sqlite};
use tracing::{info, instrument};

use crate::auth::hash_password;
use crate::error::AppError;
use crate::models::{EntryPatch, EntryRow, Kid, NewEntry, UserRecord};

/// Base join used by every entry read path: entries with the kid's name and
/// the recording user's username. The `WHERE 1=1` anchor lets filter clauses
/// append uniformly.
const ENTRY_SELECT: &str = "SELECT \
        be.id, be.kid_id, be.user_id, be.event_date, be.\"trigger\", \
        be.behaviour, be.intensity, be.duration_minutes, be.resolution, \
        be.outcome, be.notes, be.created_at, \
        k.name AS kid_name, u.username \
     FROM behaviour_entries be \
     JOIN kids k ON be.kid_id = k.id \
     JOIN users u ON be.user_id = u.id \
     WHERE 1=1";

/// Optional filters for listing/exporting entries. Built from query-string
/// input by [`EntryFilter::parse`]; dates are whole days, widened so the
/// `from`..`to` range is inclusive at both ends.
#[derive(Debug, Default, Clone)]
pub struct EntryFilter {
    pub kid_id: Option<i64>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl EntryFilter {
    pub fn parse(
        kid_id: Option<i64>,
        from: Option<&str>,
        to: Option<&str>,
    ) -> Result<Self, AppError> {
        let from = from.map(parse_date).transpose()?.map(day_start);
        let to = to.map(parse_date).transpose()?.map(day_end);

        Ok(Self { kid_id, from, to })
    }
}

fn parse_date(s: &str) -> Result<NaiveDate, AppError> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|_| AppError::BadRequest(format!("Invalid date '{}', expected YYYY-MM-DD", s)))
}

fn day_start(date: NaiveDate) -> DateTime<Utc> {
    DateTime::from_naive_utc_and_offset(date.and_time(NaiveTime::MIN), Utc)
}

fn day_end(date: NaiveDate) -> DateTime<Utc> {
    day_start(date) + Duration::days(1) - Duration::seconds(1)
}

/// Assemble the filtered entry query. Clauses are appended in a fixed order
/// (kid, from, to) with their values pushed as binds in the same order, so
/// only structural SQL ever reaches the query text.
pub fn filtered_entry_query(filter: &EntryFilter) -> QueryBuilder<'static, Sqlite> {
    let mut query = QueryBuilder::new(ENTRY_SELECT);

    if let Some(kid_id) = filter.kid_id {
        query.push(" AND be.kid_id = ");
        query.push_bind(kid_id);
    }

    if let Some(from) = filter.from {
        query.push(" AND be.event_date >= ");
        query.push_bind(from);
    }

    if let Some(to) = filter.to {
        query.push(" AND be.event_date <= ");
        query.push_bind(to);
    }

    query.push(" ORDER BY be.event_date DESC");
    query
}

#[instrument(skip(pool))]
pub async fn list_entries(
    pool: &Pool<Sqlite>,
    filter: &EntryFilter,
) -> Result<Vec<EntryRow>, AppError> {
    info!("Listing behaviour entries");
    let mut query = filtered_entry_query(filter);
    let rows = query
        .build_query_as::<EntryRow>()
        .fetch_all(pool)
        .await?;

    Ok(rows)
}

#[instrument(skip(pool))]
pub async fn get_entry(pool: &Pool<Sqlite>, id: i64) -> Result<EntryRow, AppError> {
    let sql = format!("{} AND be.id = ?", ENTRY_SELECT);
    let row = sqlx::query_as::<_, EntryRow>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;

    match row {
        Some(entry) => Ok(entry),
        _ => Err(AppError::NotFound(format!("Entry {} not found", id))),
    }
}

#[instrument(skip(pool, entry))]
pub async fn create_entry(
    pool: &Pool<Sqlite>,
    user_id: i64,
    entry: &NewEntry,
) -> Result<EntryRow, AppError> {
    info!(kid_id = entry.kid_id, "Creating behaviour entry");

    let event_date = entry.event_date.unwrap_or_else(Utc::now);
    let created_at = Utc::now();

    let res = sqlx::query(
        "INSERT INTO behaviour_entries \
            (kid_id, user_id, event_date, \"trigger\", behaviour, intensity, \
             duration_minutes, resolution, outcome, notes, created_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(entry.kid_id)
    .bind(user_id)
    .bind(event_date)
    .bind(&entry.trigger)
    .bind(&entry.behaviour)
    .bind(&entry.intensity)
    .bind(entry.duration_minutes)
    .bind(&entry.resolution)
    .bind(&entry.outcome)
    .bind(&entry.notes)
    .bind(created_at)
    .execute(pool)
    .await?;

    get_entry(pool, res.last_insert_rowid()).await
}

/// Partial update: `None` fields keep their stored value via COALESCE.
#[instrument(skip(pool, patch))]
pub async fn update_entry(
    pool: &Pool<Sqlite>,
    id: i64,
    patch: &EntryPatch,
) -> Result<EntryRow, AppError> {
    info!("Updating behaviour entry");

    let res = sqlx::query(
        "UPDATE behaviour_entries SET \
            event_date = COALESCE(?, event_date), \
            \"trigger\" = COALESCE(?, \"trigger\"), \
            behaviour = COALESCE(?, behaviour), \
            intensity = COALESCE(?, intensity), \
            duration_minutes = COALESCE(?, duration_minutes), \
            resolution = COALESCE(?, resolution), \
            outcome = COALESCE(?, outcome), \
            notes = COALESCE(?, notes) \
         WHERE id = ?",
    )
    .bind(patch.event_date)
    .bind(&patch.trigger)
    .bind(&patch.behaviour)
    .bind(&patch.intensity)
    .bind(patch.duration_minutes)
    .bind(&patch.resolution)
    .bind(&patch.outcome)
    .bind(&patch.notes)
    .bind(id)
    .execute(pool)
    .await?;

    if res.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("Entry {} not found", id)));
    }

    get_entry(pool, id).await
}

#[instrument(skip(pool))]
pub async fn delete_entry(pool: &Pool<Sqlite>, id: i64) -> Result<(), AppError> {
    info!("Deleting behaviour entry");

    let res = sqlx::query("DELETE FROM behaviour_entries WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;

    if res.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("Entry {} not found", id)));
    }

    Ok(())
}

#[instrument(skip(pool))]
pub async fn get_kids(pool: &Pool<Sqlite>) -> Result<Vec<Kid>, AppError> {
    let kids = sqlx::query_as::<_, Kid>("SELECT id, name FROM kids ORDER BY id")
        .fetch_all(pool)
        .await?;

    Ok(kids)
}

#[instrument(skip(pool))]
pub async fn create_kid(pool: &Pool<Sqlite>, name: &str) -> Result<i64, AppError> {
    info!("Creating kid");

    let res = sqlx::query("INSERT INTO kids (name) VALUES (?)")
        .bind(name)
        .execute(pool)
        .await?;

    Ok(res.last_insert_rowid())
}

#[instrument(skip(pool))]
pub async fn find_user_by_username(
    pool: &Pool<Sqlite>,
    username: &str,
) -> Result<Option<UserRecord>, AppError> {
    let row = sqlx::query_as::<_, UserRecord>(
        "SELECT id, username, password, role FROM users WHERE username = ?",
    )
    .bind(username)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Provisioning seam: users are normally created outside this service, but
/// operational tooling and tests need a way in.
#[instrument(skip_all, fields(username, role))]
pub async fn create_user(
    pool: &Pool<Sqlite>,
    username: &str,
    password: &str,
    role: &str,
) -> Result<i64, AppError> {
    info!("Creating new user");

    let existing = find_user_by_username(pool, username).await?;
    if existing.is_some() {
        return Err(AppError::BadRequest(format!(
            "Username '{}' already exists",
            username
        )));
    }

    let hashed_password = hash_password(password)?;

    let res = sqlx::query("INSERT INTO users (username, password, role) VALUES (?, ?, ?)")
        .bind(username)
        .bind(hashed_password)
        .bind(role)
        .execute(pool)
        .await?;

    Ok(res.last_insert_rowid())
}
