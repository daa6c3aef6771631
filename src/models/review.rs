use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{MySql, MySqlConnection, MySqlPool, QueryBuilder};

use crate::errors::{AppError, AppResult};
use crate::models::resource::{Creatable, Resource, push_id_list, unique_ids};
use crate::models::tour::Tour;
use crate::schemas::review_schema::{ReviewCreateSchema, ReviewUpdateSchema};
use crate::utils::api_features::{Column, ColumnKind};

const REVIEW_SELECT: &str = "id, review, rating, tour_id, user_id, created_at";

#[derive(sqlx::FromRow, Debug, Clone)]
pub struct ReviewRow {
    pub id: i64,
    pub review: String,
    pub rating: Option<i32>,
    pub tour_id: i64,
    pub user_id: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Debug, Clone, Serialize)]
pub struct ReviewAuthor {
    pub id: i64,
    pub name: String,
    pub photo: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    pub id: i64,
    pub review: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub tour: i64,
    /// `None` once the author deactivated their account.
    pub user: Option<ReviewAuthor>,
}

/// Count and mean of a tour's ratings as stored on the tour.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RatingSummary {
    pub quantity: i64,
    pub average: f64,
}

impl RatingSummary {
    pub const EMPTY: RatingSummary = RatingSummary {
        quantity: 0,
        average: 4.5,
    };

    /// `rated` counts reviews carrying a rating; unrated reviews still count towards quantity.
    pub fn from_totals(count: i64, rated: i64, sum: i64) -> Self {
        if count == 0 {
            return Self::EMPTY;
        }
        let average = if rated > 0 {
            sum as f64 / rated as f64
        } else {
            Self::EMPTY.average
        };
        RatingSummary { quantity: count, average }
    }
}

impl Review {
    /// Recomputes the tour's rating summary from its reviews on the given connection,
    /// so callers run it inside the transaction that changed the reviews.
    pub async fn calc_average_ratings(conn: &mut MySqlConnection, tour_id: i64) -> AppResult<RatingSummary> {
        let (count, rated, sum): (i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT COUNT(*), COUNT(rating), CAST(COALESCE(SUM(rating), 0) AS SIGNED)
            FROM reviews
            WHERE tour_id = ?
            "#,
        )
        .bind(tour_id)
        .fetch_one(&mut *conn)
        .await?;

        let summary = RatingSummary::from_totals(count, rated, sum);
        Tour::set_ratings(conn, tour_id, summary.quantity, summary.average).await?;
        tracing::debug!(tour_id, quantity = summary.quantity, average = summary.average, "ratings recalculated");
        Ok(summary)
    }

    pub async fn find_for_tour(db: &MySqlPool, tour_id: i64) -> AppResult<Vec<Review>> {
        let rows = sqlx::query_as::<_, ReviewRow>(&format!(
            "SELECT {} FROM reviews WHERE tour_id = ? ORDER BY created_at DESC, id ASC",
            REVIEW_SELECT
        ))
        .bind(tour_id)
        .fetch_all(db)
        .await?;
        Review::hydrate(db, rows).await
    }

    async fn tour_of(conn: &mut MySqlConnection, id: i64) -> AppResult<Option<i64>> {
        let tour_id: Option<i64> = sqlx::query_scalar("SELECT tour_id FROM reviews WHERE id = ? FOR UPDATE")
            .bind(id)
            .fetch_optional(conn)
            .await?;
        Ok(tour_id)
    }
}

#[async_trait]
impl Resource for Review {
    type Row = ReviewRow;
    type Update = ReviewUpdateSchema;

    const TABLE: &'static str = "reviews";
    const SELECT: &'static str = REVIEW_SELECT;
    const COLUMNS: &'static [Column] = &[
        Column::new("id", "id", ColumnKind::Integer),
        Column::new("review", "review", ColumnKind::Text),
        Column::new("rating", "rating", ColumnKind::Integer),
        Column::new("tour", "tour_id", ColumnKind::Integer),
        Column::new("user", "user_id", ColumnKind::Integer),
        Column::new("createdAt", "created_at", ColumnKind::Timestamp),
    ];

    async fn hydrate(db: &MySqlPool, rows: Vec<ReviewRow>) -> AppResult<Vec<Review>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let user_ids = unique_ids(rows.iter().map(|r| r.user_id));
        let mut qb = QueryBuilder::<MySql>::new("SELECT id, name, photo FROM users WHERE active = TRUE AND id IN ");
        push_id_list(&mut qb, &user_ids);
        let authors: HashMap<i64, ReviewAuthor> = qb
            .build_query_as::<ReviewAuthor>()
            .fetch_all(db)
            .await?
            .into_iter()
            .map(|a| (a.id, a))
            .collect();

        Ok(rows
            .into_iter()
            .map(|row| Review {
                id: row.id,
                review: row.review,
                rating: row.rating,
                created_at: row.created_at,
                tour: row.tour_id,
                user: authors.get(&row.user_id).cloned(),
            })
            .collect())
    }

    async fn apply_update(db: &MySqlPool, id: i64, payload: ReviewUpdateSchema) -> AppResult<bool> {
        let mut tx = db.begin().await?;
        let Some(tour_id) = Review::tour_of(&mut *tx, id).await? else {
            return Ok(false);
        };

        let mut qb = QueryBuilder::<MySql>::new("UPDATE reviews SET ");
        let mut set = qb.separated(", ");
        set.push("id = id");
        if let Some(review) = payload.review {
            set.push("review = ").push_bind_unseparated(review);
        }
        if let Some(rating) = payload.rating {
            set.push("rating = ").push_bind_unseparated(rating);
        }
        qb.push(" WHERE id = ").push_bind(id);
        qb.build().execute(&mut *tx).await?;

        Review::calc_average_ratings(&mut *tx, tour_id).await?;
        tx.commit().await?;
        Ok(true)
    }

    async fn remove(db: &MySqlPool, id: i64) -> AppResult<bool> {
        let mut tx = db.begin().await?;
        let Some(tour_id) = Review::tour_of(&mut *tx, id).await? else {
            return Ok(false);
        };
        sqlx::query("DELETE FROM reviews WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        Review::calc_average_ratings(&mut *tx, tour_id).await?;
        tx.commit().await?;
        Ok(true)
    }
}

#[async_trait]
impl Creatable for Review {
    type Create = ReviewCreateSchema;

    async fn insert(db: &MySqlPool, payload: ReviewCreateSchema) -> AppResult<i64> {
        let tour_id = payload
            .tour
            .ok_or_else(|| AppError::bad_request("Review must belong to a tour"))?;
        let user_id = payload
            .user
            .ok_or_else(|| AppError::bad_request("Review must belong to a user"))?;

        let mut tx = db.begin().await?;
        let visible: Option<i64> = sqlx::query_scalar("SELECT id FROM tours WHERE id = ? AND secret_tour = FALSE")
            .bind(tour_id)
            .fetch_optional(&mut *tx)
            .await?;
        if visible.is_none() {
            return Err(AppError::not_found("No tour found with that ID"));
        }

        let result = sqlx::query("INSERT INTO reviews (review, rating, tour_id, user_id) VALUES (?, ?, ?, ?)")
            .bind(payload.review.unwrap_or_default().trim())
            .bind(payload.rating)
            .bind(tour_id)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        let id = result.last_insert_id() as i64;

        Review::calc_average_ratings(&mut *tx, tour_id).await?;
        tx.commit().await?;
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_resets_without_reviews() {
        assert_eq!(RatingSummary::from_totals(0, 0, 0), RatingSummary::EMPTY);
    }

    #[test]
    fn summary_averages_rated_reviews() {
        let summary = RatingSummary::from_totals(3, 3, 14);
        assert_eq!(summary.quantity, 3);
        assert!((summary.average - 14.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn unrated_reviews_count_but_do_not_average() {
        let summary = RatingSummary::from_totals(2, 1, 4);
        assert_eq!(summary.quantity, 2);
        assert_eq!(summary.average, 4.0);
    }

    #[test]
    fn missing_author_serializes_as_null() {
        let review = Review {
            id: 1,
            review: "Amazing".into(),
            rating: Some(5),
            created_at: Utc::now(),
            tour: 2,
            user: None,
        };
        let json = serde_json::to_value(review).unwrap();
        assert!(json["user"].is_null());
        assert_eq!(json["tour"], 2);
        assert!(json.get("createdAt").is_some());
    }
}
