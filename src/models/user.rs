use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{MySql, MySqlPool, QueryBuilder};
use std::fmt;
use std::str::FromStr;

use crate::errors::{AppError, AppResult};
use crate::models::resource::Resource;
use crate::models::review::Review;
use crate::schemas::user_schema::UserUpdateRequestSchema;
use crate::utils::api_features::{Column, ColumnKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    User,
    Guide,
    LeadGuide,
    Admin,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Guide => "guide",
            Role::LeadGuide => "lead-guide",
            Role::Admin => "admin",
        }
    }
}

impl FromStr for Role {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "guide" => Ok(Role::Guide),
            "lead-guide" => Ok(Role::LeadGuide),
            "admin" => Ok(Role::Admin),
            other => Err(AppError::bad_request(format!("Invalid role: {}", other))),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(sqlx::FromRow, Debug, Clone)]
pub struct UserRow {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub photo: String,
    pub role: String,
    pub password_changed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub photo: String,
    pub role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password_changed_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    pub created_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = AppError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let role = row
            .role
            .parse()
            .map_err(|_| AppError::internal(format!("user {} has unknown role {:?}", row.id, row.role)))?;
        Ok(User {
            id: row.id,
            name: row.name,
            email: row.email,
            photo: row.photo,
            role,
            password_changed_at: row.password_changed_at,
            created_at: row.created_at,
        })
    }
}

/// A user about to be inserted; the password is already hashed.
#[derive(Debug)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub photo: Option<String>,
}

const USER_SELECT: &str = "id, name, email, photo, role, password_changed_at, created_at";

impl User {
    pub fn first_name(&self) -> &str {
        self.name.split_whitespace().next().unwrap_or(&self.name)
    }

    /// True when the password changed after a token issued at `iat` (unix seconds).
    pub fn changed_password_after(&self, iat: i64) -> bool {
        match self.password_changed_at {
            Some(changed) => iat < changed.timestamp(),
            None => false,
        }
    }

    pub async fn create(db: &MySqlPool, new_user: NewUser) -> AppResult<User> {
        let result = sqlx::query(
            r#"
            INSERT INTO users (name, email, password, role, photo)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&new_user.name)
        .bind(&new_user.email)
        .bind(&new_user.password_hash)
        .bind(new_user.role.as_str())
        .bind(new_user.photo.as_deref().unwrap_or("default.jpg"))
        .execute(db)
        .await?;

        let id = result.last_insert_id() as i64;
        User::find_by_id(db, id).await?.ok_or_else(AppError::no_document)
    }

    pub async fn find_active_by_email(db: &MySqlPool, email: &str) -> AppResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {} FROM users WHERE email = ? AND active = TRUE",
            USER_SELECT
        ))
        .bind(email)
        .fetch_optional(db)
        .await?;
        row.map(User::try_from).transpose()
    }

    /// Stored bcrypt hash, for login and password changes only.
    pub async fn password_hash(db: &MySqlPool, id: i64) -> AppResult<Option<String>> {
        let hash = sqlx::query_scalar::<_, String>("SELECT password FROM users WHERE id = ? AND active = TRUE")
            .bind(id)
            .fetch_optional(db)
            .await?;
        Ok(hash)
    }

    /// Replaces the password hash, clears any reset token and records the change time.
    /// The timestamp is backdated one second so a token issued right after still validates.
    pub async fn set_password(db: &MySqlPool, id: i64, password_hash: &str) -> AppResult<()> {
        let changed_at = Utc::now() - Duration::seconds(1);
        sqlx::query(
            r#"
            UPDATE users
            SET password = ?, password_changed_at = ?, password_reset_token = NULL, password_reset_expires = NULL
            WHERE id = ?
            "#,
        )
        .bind(password_hash)
        .bind(changed_at)
        .bind(id)
        .execute(db)
        .await?;
        Ok(())
    }

    pub async fn set_reset_token(
        db: &MySqlPool,
        id: i64,
        token_hash: Option<&str>,
        expires: Option<DateTime<Utc>>,
    ) -> AppResult<()> {
        sqlx::query("UPDATE users SET password_reset_token = ?, password_reset_expires = ? WHERE id = ?")
            .bind(token_hash)
            .bind(expires)
            .bind(id)
            .execute(db)
            .await?;
        Ok(())
    }

    pub async fn find_by_reset_token(db: &MySqlPool, token_hash: &str) -> AppResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {} FROM users WHERE password_reset_token = ? AND password_reset_expires > ? AND active = TRUE",
            USER_SELECT
        ))
        .bind(token_hash)
        .bind(Utc::now())
        .fetch_optional(db)
        .await?;
        row.map(User::try_from).transpose()
    }

    pub async fn deactivate(db: &MySqlPool, id: i64) -> AppResult<()> {
        sqlx::query("UPDATE users SET active = FALSE WHERE id = ?")
            .bind(id)
            .execute(db)
            .await?;
        Ok(())
    }

    /// Updates the self-service profile fields. `None` leaves a field untouched.
    pub async fn update_profile(
        db: &MySqlPool,
        id: i64,
        name: Option<&str>,
        email: Option<&str>,
        photo: Option<&str>,
    ) -> AppResult<User> {
        let mut qb = QueryBuilder::<MySql>::new("UPDATE users SET ");
        let mut set = qb.separated(", ");
        set.push("id = id");
        if let Some(name) = name {
            set.push("name = ").push_bind_unseparated(name.to_string());
        }
        if let Some(email) = email {
            set.push("email = ").push_bind_unseparated(email.trim().to_lowercase());
        }
        if let Some(photo) = photo {
            set.push("photo = ").push_bind_unseparated(photo.to_string());
        }
        qb.push(" WHERE id = ").push_bind(id).push(" AND active = TRUE");
        qb.build().execute(db).await?;

        User::find_by_id(db, id).await?.ok_or_else(AppError::no_document)
    }

    /// Active users by id, in no particular order.
    pub async fn find_many_by_ids(db: &MySqlPool, ids: &[i64]) -> AppResult<Vec<User>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut qb = QueryBuilder::<MySql>::new(format!(
            "SELECT {} FROM users WHERE active = TRUE AND id IN ",
            USER_SELECT
        ));
        crate::models::resource::push_id_list(&mut qb, ids);
        let rows = qb.build_query_as::<UserRow>().fetch_all(db).await?;
        rows.into_iter().map(User::try_from).collect()
    }
}

#[async_trait]
impl Resource for User {
    type Row = UserRow;
    type Update = UserUpdateRequestSchema;

    const TABLE: &'static str = "users";
    const SELECT: &'static str = USER_SELECT;
    const COLUMNS: &'static [Column] = &[
        Column::new("id", "id", ColumnKind::Integer),
        Column::new("name", "name", ColumnKind::Text),
        Column::new("email", "email", ColumnKind::Text),
        Column::new("role", "role", ColumnKind::Text),
        Column::new("createdAt", "created_at", ColumnKind::Timestamp),
    ];
    const SCOPE: Option<&'static str> = Some("active = TRUE");

    async fn hydrate(_db: &MySqlPool, rows: Vec<UserRow>) -> AppResult<Vec<User>> {
        rows.into_iter().map(User::try_from).collect()
    }

    async fn apply_update(db: &MySqlPool, id: i64, payload: UserUpdateRequestSchema) -> AppResult<bool> {
        let mut qb = QueryBuilder::<MySql>::new("UPDATE users SET ");
        let mut set = qb.separated(", ");
        set.push("id = id");
        if let Some(name) = payload.name {
            set.push("name = ").push_bind_unseparated(name.trim().to_string());
        }
        if let Some(email) = payload.email {
            set.push("email = ").push_bind_unseparated(email.trim().to_lowercase());
        }
        if let Some(photo) = payload.photo {
            set.push("photo = ").push_bind_unseparated(photo);
        }
        if let Some(role) = payload.role {
            set.push("role = ").push_bind_unseparated(role.as_str());
        }
        qb.push(" WHERE id = ").push_bind(id).push(" AND active = TRUE");
        qb.build().execute(db).await?;

        // MySQL reports zero affected rows for no-op updates, so check existence separately.
        let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM users WHERE id = ? AND active = TRUE")
            .bind(id)
            .fetch_optional(db)
            .await?;
        Ok(exists.is_some())
    }

    /// Hard delete. The user's reviews go with it, so the affected tours get their ratings recomputed.
    async fn remove(db: &MySqlPool, id: i64) -> AppResult<bool> {
        let mut tx = db.begin().await?;
        let tour_ids: Vec<i64> = sqlx::query_scalar("SELECT DISTINCT tour_id FROM reviews WHERE user_id = ?")
            .bind(id)
            .fetch_all(&mut *tx)
            .await?;

        let result = sqlx::query("DELETE FROM users WHERE id = ? AND active = TRUE")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Ok(false);
        }

        for tour_id in tour_ids {
            Review::calc_average_ratings(&mut *tx, tour_id).await?;
        }
        tx.commit().await?;
        Ok(true)
    }
}
