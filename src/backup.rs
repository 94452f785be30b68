use chrono::Utc;
use rocket::futures::Stream;
use rocket::http::ContentType;
use rocket::response::stream::ByteStream;
use std::pin::Pin;
use std::process::Stdio;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStdout, Command};
use tracing::{error, info, instrument};

use crate::error::AppError;

/// Resolve the file path out of a SQLite connection string. In-memory
/// databases have nothing to hand to the dump tool.
pub fn parse_sqlite_path(database_url: &str) -> Result<String, AppError> {
    let rest = database_url
        .strip_prefix("sqlite://")
        .or_else(|| database_url.strip_prefix("sqlite:"))
        .unwrap_or(database_url);

    let path = rest.split('?').next().unwrap_or_default();

    if path.is_empty() || path == ":memory:" {
        return Err(AppError::Internal(format!(
            "Cannot dump database '{}': not a file-backed database",
            database_url
        )));
    }

    Ok(path.to_string())
}

/// A streamed `.dump` of the database, delivered as an SQL file download.
pub struct SqlDump {
    pub filename: String,
    pub stream: ByteStream<Pin<Box<dyn Stream<Item = Vec<u8>> + Send>>>,
}

impl<'r> rocket::response::Responder<'r, 'r> for SqlDump {
    fn respond_to(self, req: &'r rocket::Request<'_>) -> rocket::response::Result<'r> {
        let mut response = self.stream.respond_to(req)?;
        response.set_header(ContentType::new("application", "sql"));
        response.set_raw_header(
            "Content-Disposition",
            format!("attachment; filename=\"{}\"", self.filename),
        );
        Ok(response)
    }
}

/// Spawn `sqlite3 <db> .dump` and stream its stdout. A non-zero exit after
/// the stream drains is logged; by then the response status is already on
/// the wire, which matches the documented backup model.
#[instrument(skip(database_url))]
pub fn spawn_dump(database_url: &str) -> Result<SqlDump, AppError> {
    let path = parse_sqlite_path(database_url)?;

    info!(path = %path, "Starting database dump");

    let mut child = Command::new("sqlite3")
        .arg(&path)
        .arg(".dump")
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| AppError::Internal(format!("Failed to launch sqlite3: {}", e)))?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| AppError::Internal("Dump subprocess has no stdout".to_string()))?;

    let filename = format!("behaviour_journal_backup_{}.sql", Utc::now().format("%Y-%m-%d"));

    let stream = rocket::futures::stream::unfold(
        DumpState {
            stdout,
            child: Some(child),
        },
        |mut state| async move {
            let mut buf = vec![0u8; 8192];
            match state.stdout.read(&mut buf).await {
                Ok(0) => {
                    state.reap().await;
                    None
                }
                Ok(n) => {
                    buf.truncate(n);
                    Some((buf, state))
                }
                Err(e) => {
                    error!(error = %e, "Failed to read dump output");
                    state.reap().await;
                    None
                }
            }
        },
    );

    Ok(SqlDump {
        filename,
        stream: ByteStream(Box::pin(stream) as Pin<Box<dyn Stream<Item = Vec<u8>> + Send>>),
    })
}

struct DumpState {
    stdout: ChildStdout,
    child: Option<Child>,
}

impl DumpState {
    async fn reap(&mut self) {
        if let Some(mut child) = self.child.take() {
            match child.wait().await {
                Ok(status) if !status.success() => {
                    error!(code = ?status.code(), "sqlite3 dump exited with failure")
                }
                Err(e) => error!(error = %e, "Failed to wait for sqlite3 dump"),
                _ => info!("Database dump completed"),
            }
        }
    }
}
