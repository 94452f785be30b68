use chrono::{DateTime, Utc};
use rocket::FromForm;
use rocket::State;
use rocket::http::{CookieJar, Status};
use rocket::response::status::{Created, Custom};
use rocket::serde::{Deserialize, Serialize, json::Json};
use serde_json::{Value, json};
use sqlx::{Pool, Sqlite};
use tracing::info;
use validator::Validate;

use crate::auth::{Session, clear_session_cookie, issue_token, session_cookie, verify_password};
use crate::backup::{SqlDump, spawn_dump};
use crate::config::AppConfig;
use crate::db::{
    EntryFilter, create_entry, delete_entry, find_user_by_username, get_kids, list_entries,
    update_entry,
};
use crate::error::AppError;
use crate::export::{Download, ExportFormat, render_csv, render_pdf};
use crate::models::{EntryPatch, EntryRow, Kid, NewEntry, Role};

#[derive(Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1))]
    username: String,
    #[validate(length(min = 1))]
    password: String,
}

#[derive(Serialize, Deserialize)]
pub struct SessionUser {
    pub id: i64,
    pub username: String,
    pub role: Role,
}

#[derive(Serialize, Deserialize)]
pub struct LoginResponse {
    pub success: bool,
    pub user: SessionUser,
}

#[derive(Serialize, Deserialize)]
pub struct SuccessResponse {
    pub success: bool,
}

#[derive(Serialize, Deserialize)]
pub struct KidsResponse {
    pub kids: Vec<Kid>,
}

#[derive(Serialize, Deserialize)]
pub struct EntriesResponse {
    pub entries: Vec<EntryRow>,
}

#[derive(Serialize, Deserialize)]
pub struct EntryResponse {
    pub entry: EntryRow,
}

#[post("/login", data = "<login>")]
pub async fn api_login(
    login: Json<LoginRequest>,
    cookies: &CookieJar<'_>,
    db: &State<Pool<Sqlite>>,
    config: &State<AppConfig>,
) -> Result<Json<LoginResponse>, AppError> {
    login
        .validate()
        .map_err(|_| AppError::BadRequest("Username and password are required".to_string()))?;

    info!(username = %login.username, "Login attempt");

    let user = find_user_by_username(db, &login.username)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Invalid credentials".to_string()))?;

    if !verify_password(&login.password, &user.password) {
        return Err(AppError::Unauthorized("Invalid credentials".to_string()));
    }

    let role = user
        .role()
        .map_err(|e| AppError::Internal(format!("Corrupt role for user {}: {}", user.id, e)))?;

    let session = Session::new(user.id, &user.username, role);
    let token = issue_token(&session, &config.session_secret)?;
    cookies.add(session_cookie(token, config.production));

    info!(username = %user.username, role = %role, "Login successful");

    Ok(Json(LoginResponse {
        success: true,
        user: SessionUser {
            id: user.id,
            username: user.username,
            role,
        },
    }))
}

#[delete("/login")]
pub fn api_logout(cookies: &CookieJar<'_>) -> Json<SuccessResponse> {
    clear_session_cookie(cookies);
    Json(SuccessResponse { success: true })
}

#[get("/kids")]
pub async fn api_get_kids(
    _session: Session,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<KidsResponse>, AppError> {
    let kids = get_kids(db).await?;
    Ok(Json(KidsResponse { kids }))
}

#[derive(FromForm)]
pub struct EntryFilterParams {
    kid_id: Option<i64>,
    from: Option<String>,
    to: Option<String>,
}

impl EntryFilterParams {
    fn to_filter(&self) -> Result<EntryFilter, AppError> {
        EntryFilter::parse(self.kid_id, self.from.as_deref(), self.to.as_deref())
    }
}

#[get("/entries?<params..>")]
pub async fn api_list_entries(
    params: EntryFilterParams,
    _session: Session,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<EntriesResponse>, AppError> {
    let filter = params.to_filter()?;
    let entries = list_entries(db, &filter).await?;
    Ok(Json(EntriesResponse { entries }))
}

#[derive(Deserialize)]
pub struct CreateEntryRequest {
    kid_id: Option<i64>,
    event_date: Option<DateTime<Utc>>,
    trigger: Option<String>,
    behaviour: Option<String>,
    intensity: Option<String>,
    duration_minutes: Option<i64>,
    resolution: Option<String>,
    outcome: Option<String>,
    notes: Option<String>,
}

fn check_duration(duration_minutes: Option<i64>) -> Result<(), AppError> {
    match duration_minutes {
        Some(d) if d < 0 => Err(AppError::BadRequest(
            "duration_minutes must be non-negative".to_string(),
        )),
        _ => Ok(()),
    }
}

#[post("/entries", data = "<entry>")]
pub async fn api_create_entry(
    entry: Json<CreateEntryRequest>,
    session: Session,
    db: &State<Pool<Sqlite>>,
) -> Result<Created<Json<EntryResponse>>, AppError> {
    let kid_id = entry
        .kid_id
        .ok_or_else(|| AppError::BadRequest("kid_id is required".to_string()))?;
    check_duration(entry.duration_minutes)?;

    let new_entry = NewEntry {
        kid_id,
        event_date: entry.event_date,
        trigger: entry.trigger.clone(),
        behaviour: entry.behaviour.clone(),
        intensity: entry.intensity.clone(),
        duration_minutes: entry.duration_minutes,
        resolution: entry.resolution.clone(),
        outcome: entry.outcome.clone(),
        notes: entry.notes.clone(),
    };

    let row = create_entry(db, session.id, &new_entry).await?;
    let location = format!("/api/entries/{}", row.id);

    Ok(Created::new(location).body(Json(EntryResponse { entry: row })))
}

#[derive(Deserialize)]
pub struct UpdateEntryRequest {
    event_date: Option<DateTime<Utc>>,
    trigger: Option<String>,
    behaviour: Option<String>,
    intensity: Option<String>,
    duration_minutes: Option<i64>,
    resolution: Option<String>,
    outcome: Option<String>,
    notes: Option<String>,
}

/// Partial update of only the supplied fields. Administrator-only; the
/// target row keeps its kid and recording user.
#[put("/entries/<id>", data = "<update>")]
pub async fn api_update_entry(
    id: i64,
    update: Json<UpdateEntryRequest>,
    session: Session,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<EntryResponse>, AppError> {
    session.require_admin()?;
    check_duration(update.duration_minutes)?;

    let patch = EntryPatch {
        event_date: update.event_date,
        trigger: update.trigger.clone(),
        behaviour: update.behaviour.clone(),
        intensity: update.intensity.clone(),
        duration_minutes: update.duration_minutes,
        resolution: update.resolution.clone(),
        outcome: update.outcome.clone(),
        notes: update.notes.clone(),
    };

    let row = update_entry(db, id, &patch).await?;
    Ok(Json(EntryResponse { entry: row }))
}

#[delete("/entries/<id>")]
pub async fn api_delete_entry(
    id: i64,
    session: Session,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<SuccessResponse>, AppError> {
    session.require_admin()?;
    delete_entry(db, id).await?;
    Ok(Json(SuccessResponse { success: true }))
}

#[get("/entries/export?<format>&<params..>")]
pub async fn api_export_entries(
    format: Option<String>,
    params: EntryFilterParams,
    _session: Session,
    db: &State<Pool<Sqlite>>,
) -> Result<Download, AppError> {
    let format = ExportFormat::parse(format.as_deref())?;
    let filter = params.to_filter()?;
    let entries = list_entries(db, &filter).await?;

    let stamp = Utc::now().format("%Y-%m-%d");

    match format {
        ExportFormat::Csv => Ok(Download {
            content_type: rocket::http::ContentType::CSV,
            filename: format!("behaviour-entries-{}.csv", stamp),
            bytes: render_csv(&entries)?.into_bytes(),
        }),
        ExportFormat::Pdf => Ok(Download {
            content_type: rocket::http::ContentType::PDF,
            filename: format!("behaviour-entries-{}.pdf", stamp),
            bytes: render_pdf(&entries)?,
        }),
    }
}

#[get("/backup")]
pub async fn api_backup(
    session: Session,
    config: &State<AppConfig>,
) -> Result<SqlDump, AppError> {
    session.require_admin()?;
    spawn_dump(&config.database_url)
}

#[get("/health")]
pub fn health() -> &'static str {
    "OK"
}

#[catch(400)]
pub fn bad_request() -> Custom<Json<Value>> {
    Custom(Status::BadRequest, Json(json!({ "error": "Bad request" })))
}

#[catch(401)]
pub fn unauthorized() -> Custom<Json<Value>> {
    Custom(Status::Unauthorized, Json(json!({ "error": "Unauthorized" })))
}

#[catch(403)]
pub fn forbidden() -> Custom<Json<Value>> {
    Custom(Status::Forbidden, Json(json!({ "error": "Forbidden" })))
}

#[catch(404)]
pub fn not_found() -> Custom<Json<Value>> {
    Custom(Status::NotFound, Json(json!({ "error": "Not found" })))
}

// Rocket reports unparseable bodies as 422; clients get the documented 400.
#[catch(422)]
pub fn unprocessable() -> Custom<Json<Value>> {
    Custom(Status::BadRequest, Json(json!({ "error": "Bad request" })))
}

#[catch(500)]
pub fn internal_error() -> Custom<Json<Value>> {
    Custom(
        Status::InternalServerError,
        Json(json!({ "error": "Internal server error" })),
    )
}
