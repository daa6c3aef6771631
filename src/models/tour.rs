use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use sqlx::types::Json;
use sqlx::{MySql, MySqlConnection, MySqlPool, QueryBuilder};

use crate::errors::{AppError, AppResult};
use crate::models::resource::{Creatable, Resource, push_id_list, unique_ids};
use crate::models::review::Review;
use crate::schemas::tour_schema::{GeoPoint, TourCreateSchema, TourUpdateSchema, check_discount};
use crate::utils::api_features::{Column, ColumnKind};

const METERS_PER_MILE: f64 = 1609.344;
const MILES_PER_METER: f64 = 0.000621371;
const KM_PER_METER: f64 = 0.001;

const TOUR_SELECT: &str = "id, name, slug, duration, max_group_size, difficulty, ratings_average, \
     ratings_quantity, price, price_discount, summary, description, image_cover, images, secret_tour, \
     start_lng, start_lat, start_address, start_description, created_at";

#[derive(sqlx::FromRow, Debug, Clone)]
pub struct TourRow {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub duration: i32,
    pub max_group_size: i32,
    pub difficulty: String,
    pub ratings_average: f64,
    pub ratings_quantity: i32,
    pub price: f64,
    pub price_discount: Option<f64>,
    pub summary: String,
    pub description: Option<String>,
    pub image_cover: String,
    pub images: Json<Vec<String>>,
    pub secret_tour: bool,
    pub start_lng: Option<f64>,
    pub start_lat: Option<f64>,
    pub start_address: Option<String>,
    pub start_description: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A populated guide. Password metadata never leaves the users table here.
#[derive(sqlx::FromRow, Debug, Clone, Serialize)]
pub struct Guide {
    #[serde(skip)]
    pub tour_id: i64,
    pub id: i64,
    pub name: String,
    pub email: String,
    pub photo: String,
    pub role: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Tour {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub duration: i32,
    pub max_group_size: i32,
    pub difficulty: String,
    pub ratings_average: f64,
    pub ratings_quantity: i32,
    pub price: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_discount: Option<f64>,
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub image_cover: String,
    pub images: Vec<String>,
    pub start_dates: Vec<DateTime<Utc>>,
    pub secret_tour: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_location: Option<GeoPoint>,
    pub locations: Vec<GeoPoint>,
    pub guides: Vec<Guide>,
    pub duration_weeks: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reviews: Option<Vec<Review>>,
    #[serde(skip)]
    pub created_at: DateTime<Utc>,
}

impl Tour {
    fn from_row(row: TourRow) -> Self {
        let start_location = match (row.start_lng, row.start_lat) {
            (Some(lng), Some(lat)) => Some(GeoPoint {
                address: row.start_address,
                description: row.start_description,
                ..GeoPoint::new(lng, lat)
            }),
            _ => None,
        };
        Tour {
            id: row.id,
            name: row.name,
            slug: row.slug,
            duration: row.duration,
            max_group_size: row.max_group_size,
            difficulty: row.difficulty,
            ratings_average: row.ratings_average,
            ratings_quantity: row.ratings_quantity,
            price: row.price,
            price_discount: row.price_discount,
            summary: row.summary,
            description: row.description,
            image_cover: row.image_cover,
            images: row.images.0,
            start_dates: Vec::new(),
            secret_tour: row.secret_tour,
            start_location,
            locations: Vec::new(),
            guides: Vec::new(),
            duration_weeks: f64::from(row.duration) / 7.0,
            reviews: None,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow, Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TourStats {
    pub difficulty: String,
    pub num_tours: i64,
    pub num_ratings: i64,
    pub avg_rating: f64,
    pub avg_price: f64,
    pub min_price: f64,
    pub max_price: f64,
}

#[derive(sqlx::FromRow, Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyPlan {
    pub month: i64,
    pub num_tour_starts: i64,
    pub tours: Json<Vec<String>>,
}

#[derive(sqlx::FromRow, Debug, Clone, Serialize)]
pub struct TourDistance {
    pub id: i64,
    pub name: String,
    pub distance: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistanceUnit {
    Miles,
    Kilometers,
}

impl DistanceUnit {
    /// `mi` selects miles; anything else is kilometres.
    pub fn parse(raw: &str) -> Self {
        if raw == "mi" {
            DistanceUnit::Miles
        } else {
            DistanceUnit::Kilometers
        }
    }

    pub fn to_meters(self, distance: f64) -> f64 {
        match self {
            DistanceUnit::Miles => distance * METERS_PER_MILE,
            DistanceUnit::Kilometers => distance * 1000.0,
        }
    }

    pub fn multiplier(self) -> f64 {
        match self {
            DistanceUnit::Miles => MILES_PER_METER,
            DistanceUnit::Kilometers => KM_PER_METER,
        }
    }
}

/// Parses `lat,lng` path segments.
pub fn parse_latlng(raw: &str) -> AppResult<(f64, f64)> {
    let invalid = || AppError::bad_request("Please provide latitude and longitude in the format lat,lng.");
    let (lat, lng) = raw.split_once(',').ok_or_else(invalid)?;
    let lat: f64 = lat.trim().parse().map_err(|_| invalid())?;
    let lng: f64 = lng.trim().parse().map_err(|_| invalid())?;
    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lng) {
        return Err(invalid());
    }
    Ok((lat, lng))
}

/// Lowercase, dash-separated form of a tour name.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.trim().chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if (c.is_whitespace() || c == '-' || c == '_') && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    slug.trim_matches('-').to_string()
}

pub fn round_rating(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Child collections replaced as a whole when present.
struct TourChildren {
    start_dates: Option<Vec<DateTime<Utc>>>,
    locations: Option<Vec<GeoPoint>>,
    guides: Option<Vec<i64>>,
}

async fn replace_children(conn: &mut MySqlConnection, tour_id: i64, children: TourChildren) -> AppResult<()> {
    if let Some(dates) = children.start_dates {
        sqlx::query("DELETE FROM tour_start_dates WHERE tour_id = ?")
            .bind(tour_id)
            .execute(&mut *conn)
            .await?;
        if !dates.is_empty() {
            let mut qb = QueryBuilder::<MySql>::new("INSERT INTO tour_start_dates (tour_id, start_date) ");
            qb.push_values(dates, |mut b, date| {
                b.push_bind(tour_id).push_bind(date);
            });
            qb.build().execute(&mut *conn).await?;
        }
    }

    if let Some(locations) = children.locations {
        sqlx::query("DELETE FROM tour_locations WHERE tour_id = ?")
            .bind(tour_id)
            .execute(&mut *conn)
            .await?;
        if !locations.is_empty() {
            let mut qb = QueryBuilder::<MySql>::new(
                "INSERT INTO tour_locations (tour_id, lng, lat, address, description, day) ",
            );
            qb.push_values(locations, |mut b, loc| {
                b.push_bind(tour_id)
                    .push_bind(loc.lng())
                    .push_bind(loc.lat())
                    .push_bind(loc.address)
                    .push_bind(loc.description)
                    .push_bind(loc.day);
            });
            qb.build().execute(&mut *conn).await?;
        }
    }

    if let Some(guides) = children.guides {
        sqlx::query("DELETE FROM tour_guides WHERE tour_id = ?")
            .bind(tour_id)
            .execute(&mut *conn)
            .await?;
        let mut seen = Vec::new();
        for guide in guides {
            if !seen.contains(&guide) {
                seen.push(guide);
            }
        }
        if !seen.is_empty() {
            let mut qb = QueryBuilder::<MySql>::new("INSERT INTO tour_guides (tour_id, user_id, position) ");
            qb.push_values(seen.into_iter().enumerate(), |mut b, (position, user_id)| {
                b.push_bind(tour_id).push_bind(user_id).push_bind(position as i32);
            });
            qb.build().execute(&mut *conn).await?;
        }
    }

    Ok(())
}

impl Tour {
    pub async fn find_by_slug(db: &MySqlPool, slug: &str) -> AppResult<Option<Tour>> {
        let row = sqlx::query_as::<_, TourRow>(&format!(
            "SELECT {} FROM tours WHERE slug = ? AND secret_tour = FALSE",
            TOUR_SELECT
        ))
        .bind(slug)
        .fetch_optional(db)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let mut tour = Tour::hydrate(db, vec![row]).await?.pop();
        if let Some(tour) = tour.as_mut() {
            tour.reviews = Some(Review::find_for_tour(db, tour.id).await?);
        }
        Ok(tour)
    }

    /// Visible tours by id, ordered by creation date.
    pub async fn find_many_by_ids(db: &MySqlPool, ids: &[i64]) -> AppResult<Vec<Tour>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut qb = QueryBuilder::<MySql>::new(format!(
            "SELECT {} FROM tours WHERE secret_tour = FALSE AND id IN ",
            TOUR_SELECT
        ));
        push_id_list(&mut qb, ids);
        qb.push(" ORDER BY created_at DESC, id ASC");
        let rows = qb.build_query_as::<TourRow>().fetch_all(db).await?;
        Tour::hydrate(db, rows).await
    }

    pub async fn stats(db: &MySqlPool) -> AppResult<Vec<TourStats>> {
        let stats = sqlx::query_as::<_, TourStats>(
            r#"
            SELECT UPPER(difficulty) AS difficulty,
                   COUNT(*) AS num_tours,
                   CAST(SUM(ratings_quantity) AS SIGNED) AS num_ratings,
                   AVG(ratings_average) AS avg_rating,
                   AVG(price) AS avg_price,
                   MIN(price) AS min_price,
                   MAX(price) AS max_price
            FROM tours
            WHERE ratings_average >= 4.5 AND secret_tour = FALSE
            GROUP BY UPPER(difficulty)
            ORDER BY avg_price ASC
            "#,
        )
        .fetch_all(db)
        .await?;
        Ok(stats)
    }

    /// Tour starts per month of `year`, busiest first, at most six months.
    pub async fn monthly_plan(db: &MySqlPool, year: i32) -> AppResult<Vec<MonthlyPlan>> {
        let from = year_start(year)?;
        let to = year_start(year + 1)?;
        let plan = sqlx::query_as::<_, MonthlyPlan>(
            r#"
            SELECT CAST(MONTH(d.start_date) AS SIGNED) AS month,
                   COUNT(*) AS num_tour_starts,
                   JSON_ARRAYAGG(t.name) AS tours
            FROM tour_start_dates d
            JOIN tours t ON t.id = d.tour_id
            WHERE t.secret_tour = FALSE AND d.start_date >= ? AND d.start_date < ?
            GROUP BY month
            ORDER BY num_tour_starts DESC, month ASC
            LIMIT 6
            "#,
        )
        .bind(from)
        .bind(to)
        .fetch_all(db)
        .await?;
        Ok(plan)
    }

    /// Tours whose start location lies within `distance` of the point.
    pub async fn within(
        db: &MySqlPool,
        distance: f64,
        (lat, lng): (f64, f64),
        unit: DistanceUnit,
    ) -> AppResult<Vec<Tour>> {
        let rows = sqlx::query_as::<_, TourRow>(&format!(
            "SELECT {} FROM tours \
             WHERE secret_tour = FALSE AND start_lng IS NOT NULL AND start_lat IS NOT NULL \
             AND ST_Distance_Sphere(POINT(start_lng, start_lat), POINT(?, ?)) <= ? \
             ORDER BY id ASC",
            TOUR_SELECT
        ))
        .bind(lng)
        .bind(lat)
        .bind(unit.to_meters(distance))
        .fetch_all(db)
        .await?;
        Tour::hydrate(db, rows).await
    }

    /// Distance from the point to every tour start, nearest first.
    pub async fn distances(db: &MySqlPool, (lat, lng): (f64, f64), unit: DistanceUnit) -> AppResult<Vec<TourDistance>> {
        let distances = sqlx::query_as::<_, TourDistance>(
            r#"
            SELECT id, name,
                   ST_Distance_Sphere(POINT(start_lng, start_lat), POINT(?, ?)) * ? AS distance
            FROM tours
            WHERE secret_tour = FALSE AND start_lng IS NOT NULL AND start_lat IS NOT NULL
            ORDER BY distance ASC
            "#,
        )
        .bind(lng)
        .bind(lat)
        .bind(unit.multiplier())
        .fetch_all(db)
        .await?;
        Ok(distances)
    }

    /// Overwrites the rating summary. Used by review writes inside their transaction.
    pub async fn set_ratings(conn: &mut MySqlConnection, id: i64, quantity: i64, average: f64) -> AppResult<()> {
        sqlx::query("UPDATE tours SET ratings_quantity = ?, ratings_average = ? WHERE id = ?")
            .bind(quantity)
            .bind(round_rating(average))
            .bind(id)
            .execute(conn)
            .await?;
        Ok(())
    }
}

fn year_start(year: i32) -> AppResult<DateTime<Utc>> {
    NaiveDate::from_ymd_opt(year, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .ok_or_else(|| AppError::bad_request(format!("Invalid year: {}", year)))
}

#[async_trait]
impl Resource for Tour {
    type Row = TourRow;
    type Update = TourUpdateSchema;

    const TABLE: &'static str = "tours";
    const SELECT: &'static str = TOUR_SELECT;
    const COLUMNS: &'static [Column] = &[
        Column::new("id", "id", ColumnKind::Integer),
        Column::new("name", "name", ColumnKind::Text),
        Column::new("slug", "slug", ColumnKind::Text),
        Column::new("duration", "duration", ColumnKind::Integer),
        Column::new("maxGroupSize", "max_group_size", ColumnKind::Integer),
        Column::new("difficulty", "difficulty", ColumnKind::Text),
        Column::new("ratingsAverage", "ratings_average", ColumnKind::Number),
        Column::new("ratingsQuantity", "ratings_quantity", ColumnKind::Integer),
        Column::new("price", "price", ColumnKind::Number),
        Column::new("priceDiscount", "price_discount", ColumnKind::Number),
        Column::new("summary", "summary", ColumnKind::Text),
        Column::new("createdAt", "created_at", ColumnKind::Timestamp),
    ];
    const SCOPE: Option<&'static str> = Some("secret_tour = FALSE");

    async fn hydrate(db: &MySqlPool, rows: Vec<TourRow>) -> AppResult<Vec<Tour>> {
        let mut tours: Vec<Tour> = rows.into_iter().map(Tour::from_row).collect();
        if tours.is_empty() {
            return Ok(tours);
        }
        let ids = unique_ids(tours.iter().map(|t| t.id));

        let mut qb = QueryBuilder::<MySql>::new("SELECT tour_id, start_date FROM tour_start_dates WHERE tour_id IN ");
        push_id_list(&mut qb, &ids);
        qb.push(" ORDER BY start_date ASC");
        let dates: Vec<(i64, DateTime<Utc>)> = qb.build_query_as().fetch_all(db).await?;

        let mut qb = QueryBuilder::<MySql>::new(
            "SELECT tour_id, lng, lat, address, description, day FROM tour_locations WHERE tour_id IN ",
        );
        push_id_list(&mut qb, &ids);
        qb.push(" ORDER BY id ASC");
        let locations: Vec<(i64, f64, f64, Option<String>, Option<String>, Option<i32>)> =
            qb.build_query_as().fetch_all(db).await?;

        let mut qb = QueryBuilder::<MySql>::new(
            "SELECT g.tour_id, u.id, u.name, u.email, u.photo, u.role \
             FROM tour_guides g JOIN users u ON u.id = g.user_id \
             WHERE u.active = TRUE AND g.tour_id IN ",
        );
        push_id_list(&mut qb, &ids);
        qb.push(" ORDER BY g.tour_id, g.position");
        let guides: Vec<Guide> = qb.build_query_as().fetch_all(db).await?;

        let mut dates_by_tour: HashMap<i64, Vec<DateTime<Utc>>> = HashMap::new();
        for (tour_id, date) in dates {
            dates_by_tour.entry(tour_id).or_default().push(date);
        }
        let mut locations_by_tour: HashMap<i64, Vec<GeoPoint>> = HashMap::new();
        for (tour_id, lng, lat, address, description, day) in locations {
            locations_by_tour.entry(tour_id).or_default().push(GeoPoint {
                address,
                description,
                day,
                ..GeoPoint::new(lng, lat)
            });
        }
        let mut guides_by_tour: HashMap<i64, Vec<Guide>> = HashMap::new();
        for guide in guides {
            guides_by_tour.entry(guide.tour_id).or_default().push(guide);
        }

        for tour in &mut tours {
            tour.start_dates = dates_by_tour.remove(&tour.id).unwrap_or_default();
            tour.locations = locations_by_tour.remove(&tour.id).unwrap_or_default();
            tour.guides = guides_by_tour.remove(&tour.id).unwrap_or_default();
        }
        Ok(tours)
    }

    async fn find_one_populated(db: &MySqlPool, id: i64) -> AppResult<Option<Tour>> {
        let mut tour = Tour::find_by_id(db, id).await?;
        if let Some(tour) = tour.as_mut() {
            tour.reviews = Some(Review::find_for_tour(db, tour.id).await?);
        }
        Ok(tour)
    }

    async fn apply_update(db: &MySqlPool, id: i64, payload: TourUpdateSchema) -> AppResult<bool> {
        let mut tx = db.begin().await?;

        let current_price: Option<f64> =
            sqlx::query_scalar("SELECT price FROM tours WHERE id = ? AND secret_tour = FALSE FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;
        let Some(current_price) = current_price else {
            return Ok(false);
        };

        if let Some(discount) = payload.price_discount {
            let price = payload.price.unwrap_or(current_price);
            check_discount(discount, price).map_err(|e| {
                AppError::bad_request(format!(
                    "Invalid input data. {}",
                    e.message.map(|m| m.to_string()).unwrap_or_default()
                ))
            })?;
        }

        let mut qb = QueryBuilder::<MySql>::new("UPDATE tours SET ");
        let mut set = qb.separated(", ");
        set.push("id = id");
        if let Some(name) = &payload.name {
            let name = name.trim().to_string();
            set.push("slug = ").push_bind_unseparated(slugify(&name));
            set.push("name = ").push_bind_unseparated(name);
        }
        if let Some(duration) = payload.duration {
            set.push("duration = ").push_bind_unseparated(duration);
        }
        if let Some(size) = payload.max_group_size {
            set.push("max_group_size = ").push_bind_unseparated(size);
        }
        if let Some(difficulty) = payload.difficulty {
            set.push("difficulty = ").push_bind_unseparated(difficulty);
        }
        if let Some(average) = payload.ratings_average {
            set.push("ratings_average = ").push_bind_unseparated(round_rating(average));
        }
        if let Some(quantity) = payload.ratings_quantity {
            set.push("ratings_quantity = ").push_bind_unseparated(quantity);
        }
        if let Some(price) = payload.price {
            set.push("price = ").push_bind_unseparated(price);
        }
        if let Some(discount) = payload.price_discount {
            set.push("price_discount = ").push_bind_unseparated(discount);
        }
        if let Some(summary) = payload.summary {
            set.push("summary = ").push_bind_unseparated(summary.trim().to_string());
        }
        if let Some(description) = payload.description {
            set.push("description = ").push_bind_unseparated(description.trim().to_string());
        }
        if let Some(cover) = payload.image_cover {
            set.push("image_cover = ").push_bind_unseparated(cover);
        }
        if let Some(images) = payload.images {
            set.push("images = ").push_bind_unseparated(Json(images));
        }
        if let Some(secret) = payload.secret_tour {
            set.push("secret_tour = ").push_bind_unseparated(secret);
        }
        if let Some(start) = payload.start_location {
            set.push("start_lng = ").push_bind_unseparated(start.lng());
            set.push("start_lat = ").push_bind_unseparated(start.lat());
            set.push("start_address = ").push_bind_unseparated(start.address);
            set.push("start_description = ").push_bind_unseparated(start.description);
        }
        qb.push(" WHERE id = ").push_bind(id);
        qb.build().execute(&mut *tx).await?;

        replace_children(
            &mut *tx,
            id,
            TourChildren {
                start_dates: payload.start_dates,
                locations: payload.locations,
                guides: payload.guides,
            },
        )
        .await?;

        tx.commit().await?;
        Ok(true)
    }
}

#[async_trait]
impl Creatable for Tour {
    type Create = TourCreateSchema;

    async fn insert(db: &MySqlPool, payload: TourCreateSchema) -> AppResult<i64> {
        let missing = |field: &str| AppError::bad_request(format!("Invalid input data. Missing {}", field));
        let name = payload.name.ok_or_else(|| missing("name"))?.trim().to_string();
        let start = payload.start_location;

        let mut tx = db.begin().await?;
        let result = sqlx::query(
            r#"
            INSERT INTO tours (
                name, slug, duration, max_group_size, difficulty, ratings_average, ratings_quantity,
                price, price_discount, summary, description, image_cover, images, secret_tour,
                start_lng, start_lat, start_address, start_description
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&name)
        .bind(slugify(&name))
        .bind(payload.duration.ok_or_else(|| missing("duration"))?)
        .bind(payload.max_group_size.ok_or_else(|| missing("maxGroupSize"))?)
        .bind(payload.difficulty.ok_or_else(|| missing("difficulty"))?)
        .bind(round_rating(payload.ratings_average.unwrap_or(4.5)))
        .bind(payload.ratings_quantity.unwrap_or(0))
        .bind(payload.price.ok_or_else(|| missing("price"))?)
        .bind(payload.price_discount)
        .bind(payload.summary.ok_or_else(|| missing("summary"))?.trim().to_string())
        .bind(payload.description.map(|d| d.trim().to_string()))
        .bind(payload.image_cover.ok_or_else(|| missing("imageCover"))?)
        .bind(Json(payload.images.unwrap_or_default()))
        .bind(payload.secret_tour.unwrap_or(false))
        .bind(start.as_ref().map(GeoPoint::lng))
        .bind(start.as_ref().map(GeoPoint::lat))
        .bind(start.as_ref().and_then(|s| s.address.clone()))
        .bind(start.as_ref().and_then(|s| s.description.clone()))
        .execute(&mut *tx)
        .await?;

        let id = result.last_insert_id() as i64;
        replace_children(
            &mut *tx,
            id,
            TourChildren {
                start_dates: payload.start_dates,
                locations: payload.locations,
                guides: payload.guides,
            },
        )
        .await?;
        tx.commit().await?;

        tracing::info!(tour_id = id, "tour created");
        Ok(id)
    }
}
