use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{MySql, MySqlPool, QueryBuilder};

use crate::errors::{AppError, AppResult};
use crate::models::resource::{Creatable, Resource, push_id_list, unique_ids};
use crate::models::user::User;
use crate::schemas::booking_schema::{BookingCreateSchema, BookingUpdateSchema};
use crate::utils::api_features::{Column, ColumnKind};

const BOOKING_SELECT: &str = "id, tour_id, user_id, price, paid, created_at";

#[derive(sqlx::FromRow, Debug, Clone)]
pub struct BookingRow {
    pub id: i64,
    pub tour_id: i64,
    pub user_id: i64,
    pub price: f64,
    pub paid: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Debug, Clone, Serialize)]
pub struct BookedTour {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    pub id: i64,
    pub tour: Option<BookedTour>,
    pub user: Option<User>,
    pub price: f64,
    pub paid: bool,
    pub created_at: DateTime<Utc>,
}

impl Booking {
    /// Records a completed checkout. The customer is looked up by email.
    pub async fn create_from_checkout(db: &MySqlPool, tour_id: i64, customer_email: &str, price: f64) -> AppResult<i64> {
        let user = User::find_active_by_email(db, &customer_email.trim().to_lowercase())
            .await?
            .ok_or_else(|| AppError::not_found(format!("No user found with email {}", customer_email)))?;

        let result = sqlx::query("INSERT INTO bookings (tour_id, user_id, price, paid) VALUES (?, ?, ?, TRUE)")
            .bind(tour_id)
            .bind(user.id)
            .bind(price)
            .execute(db)
            .await?;
        let id = result.last_insert_id() as i64;
        tracing::info!(booking_id = id, tour_id, user_id = user.id, price, "booking created from checkout");
        Ok(id)
    }

    /// Distinct ids of the tours a user has booked.
    pub async fn tour_ids_for_user(db: &MySqlPool, user_id: i64) -> AppResult<Vec<i64>> {
        let ids: Vec<i64> = sqlx::query_scalar("SELECT DISTINCT tour_id FROM bookings WHERE user_id = ?")
            .bind(user_id)
            .fetch_all(db)
            .await?;
        Ok(ids)
    }
}

#[async_trait]
impl Resource for Booking {
    type Row = BookingRow;
    type Update = BookingUpdateSchema;

    const TABLE: &'static str = "bookings";
    const SELECT: &'static str = BOOKING_SELECT;
    const COLUMNS: &'static [Column] = &[
        Column::new("id", "id", ColumnKind::Integer),
        Column::new("tour", "tour_id", ColumnKind::Integer),
        Column::new("user", "user_id", ColumnKind::Integer),
        Column::new("price", "price", ColumnKind::Number),
        Column::new("paid", "paid", ColumnKind::Bool),
        Column::new("createdAt", "created_at", ColumnKind::Timestamp),
    ];

    async fn hydrate(db: &MySqlPool, rows: Vec<BookingRow>) -> AppResult<Vec<Booking>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let tour_ids = unique_ids(rows.iter().map(|r| r.tour_id));
        let mut qb = QueryBuilder::<MySql>::new("SELECT id, name FROM tours WHERE secret_tour = FALSE AND id IN ");
        push_id_list(&mut qb, &tour_ids);
        let tours: HashMap<i64, BookedTour> = qb
            .build_query_as::<BookedTour>()
            .fetch_all(db)
            .await?
            .into_iter()
            .map(|t| (t.id, t))
            .collect();

        let user_ids = unique_ids(rows.iter().map(|r| r.user_id));
        let users: HashMap<i64, User> = User::find_many_by_ids(db, &user_ids)
            .await?
            .into_iter()
            .map(|u| (u.id, u))
            .collect();

        Ok(rows
            .into_iter()
            .map(|row| Booking {
                id: row.id,
                tour: tours.get(&row.tour_id).cloned(),
                user: users.get(&row.user_id).cloned(),
                price: row.price,
                paid: row.paid,
                created_at: row.created_at,
            })
            .collect())
    }

    async fn apply_update(db: &MySqlPool, id: i64, payload: BookingUpdateSchema) -> AppResult<bool> {
        let mut qb = QueryBuilder::<MySql>::new("UPDATE bookings SET ");
        let mut set = qb.separated(", ");
        set.push("id = id");
        if let Some(tour) = payload.tour {
            set.push("tour_id = ").push_bind_unseparated(tour);
        }
        if let Some(user) = payload.user {
            set.push("user_id = ").push_bind_unseparated(user);
        }
        if let Some(price) = payload.price {
            set.push("price = ").push_bind_unseparated(price);
        }
        if let Some(paid) = payload.paid {
            set.push("paid = ").push_bind_unseparated(paid);
        }
        qb.push(" WHERE id = ").push_bind(id);
        qb.build().execute(db).await?;

        let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM bookings WHERE id = ?")
            .bind(id)
            .fetch_optional(db)
            .await?;
        Ok(exists.is_some())
    }
}

#[async_trait]
impl Creatable for Booking {
    type Create = BookingCreateSchema;

    async fn insert(db: &MySqlPool, payload: BookingCreateSchema) -> AppResult<i64> {
        let missing = |what: &str| AppError::bad_request(format!("Booking must belong to a {}!", what));
        let result = sqlx::query("INSERT INTO bookings (tour_id, user_id, price, paid) VALUES (?, ?, ?, ?)")
            .bind(payload.tour.ok_or_else(|| missing("Tour"))?)
            .bind(payload.user.ok_or_else(|| missing("User"))?)
            .bind(payload.price.ok_or_else(|| AppError::bad_request("Booking must have a price"))?)
            .bind(payload.paid.unwrap_or(true))
            .execute(db)
            .await?;
        Ok(result.last_insert_id() as i64)
    }
}
