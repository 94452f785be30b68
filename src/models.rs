use anyhow::Error;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    User,
}

impl Role {
    pub fn as_str(&self) -> &str {
        match self {
            Role::Admin => "admin",
            Role::User => "user",
        }
    }

    pub fn from_str(s: &str) -> Result<Self, Error> {
        match s {
            "admin" => Ok(Role::Admin),
            "user" => Ok(Role::User),
            _ => Err(Error::msg(format!("Unknown role: {}", s))),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A user row as stored, including the bcrypt hash. Never serialized to
/// clients; `api::SessionUser` is the outward shape.
#[derive(sqlx::FromRow, Clone)]
pub struct UserRecord {
    pub id: i64,
    pub username: String,
    pub password: String,
    pub role: String,
}

impl UserRecord {
    pub fn role(&self) -> Result<Role, Error> {
        Role::from_str(&self.role)
    }
}

#[derive(sqlx::FromRow, Serialize, Deserialize, Clone)]
pub struct Kid {
    pub id: i64,
    pub name: String,
}

/// A behaviour entry joined with the kid's name and the recording user's
/// username, the shape every list/export path works with.
#[derive(sqlx::FromRow, Serialize, Deserialize, Clone)]
pub struct EntryRow {
    pub id: i64,
    pub kid_id: i64,
    pub user_id: i64,
    pub event_date: DateTime<Utc>,
    pub trigger: Option<String>,
    pub behaviour: Option<String>,
    pub intensity: Option<String>,
    pub duration_minutes: Option<i64>,
    pub resolution: Option<String>,
    pub outcome: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub kid_name: String,
    pub username: String,
}

/// Field values for a new behaviour entry. `event_date` is stamped by the
/// caller before insert when the client omitted it.
#[derive(Clone, Default)]
pub struct NewEntry {
    pub kid_id: i64,
    pub event_date: Option<DateTime<Utc>>,
    pub trigger: Option<String>,
    pub behaviour: Option<String>,
    pub intensity: Option<String>,
    pub duration_minutes: Option<i64>,
    pub resolution: Option<String>,
    pub outcome: Option<String>,
    pub notes: Option<String>,
}

/// Partial update of an entry; `None` fields keep their stored value.
#[derive(Clone, Default)]
pub struct EntryPatch {
    pub event_date: Option<DateTime<Utc>>,
    pub trigger: Option<String>,
    pub behaviour: Option<String>,
    pub intensity: Option<String>,
    pub duration_minutes: Option<i64>,
    pub resolution: Option<String>,
    pub outcome: Option<String>,
    pub notes: Option<String>,
}
