pub mod test_utils {
    use crate::config::AppConfig;
    use crate::db::{create_entry, create_kid, create_user};
    use crate::error::AppError;
    use crate::init_rocket;
    use crate::models::{NewEntry, Role};
    use chrono::{DateTime, Utc};
    use rocket::http::{ContentType, Cookie, Status};
    use rocket::local::asynchronous::Client;
    use serde_json::json;
    use sqlx::{Pool, Sqlite, SqlitePool};
    use std::collections::HashMap;
    use std::sync::Once;

    static INIT: Once = Once::new();
    pub static STANDARD_PASSWORD: &str = "password123";
    pub static TEST_SECRET: &str = "integration-test-secret";

    #[derive(Default)]
    pub struct TestDbBuilder {
        users: Vec<TestUser>,
        kids: Vec<String>,
        entries: Vec<TestEntry>,
    }

    pub struct TestUser {
        pub username: String,
        pub role: Role,
        pub password: String,
    }

    pub struct TestEntry {
        pub kid_name: String,
        pub username: String,
        pub entry: NewEntry,
    }

    impl TestDbBuilder {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn admin(mut self, username: &str) -> Self {
            self.users.push(TestUser {
                username: username.to_string(),
                role: Role::Admin,
                password: STANDARD_PASSWORD.to_string(),
            });
            self
        }

        pub fn user(mut self, username: &str) -> Self {
            self.users.push(TestUser {
                username: username.to_string(),
                role: Role::User,
                password: STANDARD_PASSWORD.to_string(),
            });
            self
        }

        pub fn user_with_password(mut self, username: &str, role: Role, password: &str) -> Self {
            self.users.push(TestUser {
                username: username.to_string(),
                role,
                password: password.to_string(),
            });
            self
        }

        pub fn kid(mut self, name: &str) -> Self {
            self.kids.push(name.to_string());
            self
        }

        pub fn entry(mut self, kid_name: &str, username: &str, entry: NewEntry) -> Self {
            self.entries.push(TestEntry {
                kid_name: kid_name.to_string(),
                username: username.to_string(),
                entry,
            });
            self
        }

        pub async fn build(self) -> Result<TestDb, AppError> {
            INIT.call_once(|| {
                let _ = tracing_subscriber::fmt()
                    .with_test_writer()
                    .with_env_filter("info")
                    .try_init();
            });

            let pool = SqlitePool::connect("sqlite::memory:").await?;

            sqlx::migrate!("./migrations").run(&pool).await?;

            let mut user_id_map: HashMap<String, i64> = HashMap::new();
            let mut kid_id_map: HashMap<String, i64> = HashMap::new();
            let mut entry_ids: Vec<i64> = Vec::new();

            for user in &self.users {
                let user_id =
                    create_user(&pool, &user.username, &user.password, user.role.as_str()).await?;
                user_id_map.insert(user.username.clone(), user_id);
            }

            for name in &self.kids {
                let kid_id = create_kid(&pool, name).await?;
                kid_id_map.insert(name.clone(), kid_id);
            }

            for te in &self.entries {
                let entry = NewEntry {
                    kid_id: kid_id_map[&te.kid_name],
                    ..te.entry.clone()
                };
                let row = create_entry(&pool, user_id_map[&te.username], &entry).await?;
                entry_ids.push(row.id);
            }

            Ok(TestDb {
                pool,
                user_id_map,
                kid_id_map,
                entry_ids,
            })
        }
    }

    pub struct TestDb {
        pub pool: Pool<Sqlite>,
        pub user_id_map: HashMap<String, i64>,
        pub kid_id_map: HashMap<String, i64>,
        pub entry_ids: Vec<i64>,
    }

    impl TestDb {
        pub fn user_id(&self, username: &str) -> Option<i64> {
            self.user_id_map.get(username).copied()
        }

        pub fn kid_id(&self, name: &str) -> Option<i64> {
            self.kid_id_map.get(name).copied()
        }
    }

    pub fn at(rfc3339: &str) -> DateTime<Utc> {
        rfc3339.parse().expect("Invalid test timestamp")
    }

    pub async fn create_standard_test_db() -> TestDb {
        TestDbBuilder::new()
            .admin("admin_user")
            .user("plain_user")
            .kid("Alice")
            .kid("Ben")
            .entry(
                "Alice",
                "plain_user",
                NewEntry {
                    event_date: Some(at("2024-01-05T10:00:00Z")),
                    trigger: Some("Transition to homework".to_string()),
                    behaviour: Some("Shouting".to_string()),
                    intensity: Some("Moderate".to_string()),
                    duration_minutes: Some(15),
                    notes: Some("Calmed down after a break".to_string()),
                    ..NewEntry::default()
                },
            )
            .entry(
                "Ben",
                "admin_user",
                NewEntry {
                    event_date: Some(at("2024-01-10T08:30:00Z")),
                    behaviour: Some("Refusing breakfast".to_string()),
                    ..NewEntry::default()
                },
            )
            .build()
            .await
            .expect("Failed to build standard test database")
    }

    pub async fn setup_test_client(test_db: TestDb) -> (Client, TestDb) {
        let config = AppConfig {
            database_url: "sqlite::memory:".to_string(),
            session_secret: TEST_SECRET.to_string(),
            production: false,
        };

        let client = Client::tracked(init_rocket(test_db.pool.clone(), config))
            .await
            .expect("Failed to build test client");

        (client, test_db)
    }

    pub async fn login_test_user(
        client: &Client,
        username: &str,
        password: &str,
    ) -> Vec<Cookie<'static>> {
        let response = client
            .post("/api/login")
            .header(ContentType::JSON)
            .body(json!({ "username": username, "password": password }).to_string())
            .dispatch()
            .await;

        assert_eq!(response.status(), Status::Ok, "Login failed for {}", username);

        response
            .cookies()
            .iter()
            .map(|c| c.clone().into_owned())
            .collect()
    }
}
