//! Loads (or wipes) the sample users, tours and reviews.
//!
//! ```text
//! import-dev-data --import [--dir dev-data/data]
//! import-dev-data --delete
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use clap::Parser;
use dotenvy::dotenv;
use serde::Deserialize;
use serde_json::Value;
use sqlx::MySqlPool;
use validator::Validate;

use natours::config;
use natours::models::resource::Creatable;
use natours::models::review::Review;
use natours::models::tour::Tour;
use natours::models::user::{NewUser, Role, User};
use natours::schemas::review_schema::ReviewCreateSchema;
use natours::schemas::tour_schema::TourCreateSchema;
use natours::utils::auth::hash_password_blocking;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Parser, Debug)]
#[command(name = "import-dev-data", about = "Import or delete the development data set")]
struct Cli {
    /// Insert users, tours and reviews from the data directory
    #[arg(long, conflicts_with = "delete", required_unless_present = "delete")]
    import: bool,

    /// Delete every booking, review, tour and user
    #[arg(long)]
    delete: bool,

    #[arg(long, default_value = "dev-data/data")]
    dir: PathBuf,
}

#[derive(Debug, Deserialize)]
struct UserRecord {
    #[serde(rename = "_id")]
    id: String,
    name: String,
    email: String,
    #[serde(default)]
    role: Option<Role>,
    #[serde(default)]
    photo: Option<String>,
    password: String,
}

fn read_json<T: for<'de> Deserialize<'de>>(dir: &Path, file: &str) -> Result<T, BoxError> {
    let path = dir.join(file);
    let raw = std::fs::read_to_string(&path).map_err(|e| format!("cannot read {}: {}", path.display(), e))?;
    Ok(serde_json::from_str(&raw).map_err(|e| format!("invalid {}: {}", path.display(), e))?)
}

/// Replaces a file id with the database id it was stored under.
fn remap(value: &mut Value, ids: &HashMap<String, i64>) -> Result<(), BoxError> {
    let key = value.as_str().ok_or("reference is not a string id")?;
    let id = ids.get(key).ok_or_else(|| format!("unknown reference {}", key))?;
    *value = Value::from(*id);
    Ok(())
}

async fn import(db: &MySqlPool, dir: &Path) -> Result<(), BoxError> {
    let users: Vec<UserRecord> = read_json(dir, "users.json")?;
    let tours: Vec<Value> = read_json(dir, "tours.json")?;
    let reviews: Vec<Value> = read_json(dir, "reviews.json")?;

    let cost = std::env::var("BCRYPT_COST").ok().and_then(|v| v.parse().ok()).unwrap_or(10);
    let mut user_ids = HashMap::new();
    for record in users {
        let user = User::create(
            db,
            NewUser {
                name: record.name,
                email: record.email.trim().to_lowercase(),
                password_hash: hash_password_blocking(record.password, cost, Some(30)).await?,
                role: record.role.unwrap_or(Role::User),
                photo: record.photo,
            },
        )
        .await?;
        user_ids.insert(record.id, user.id);
    }
    tracing::info!(count = user_ids.len(), "users imported");

    let mut tour_ids = HashMap::new();
    for mut tour in tours {
        let file_id = tour
            .get("_id")
            .and_then(Value::as_str)
            .ok_or("tour without _id")?
            .to_string();
        if let Some(guides) = tour.get_mut("guides").and_then(Value::as_array_mut) {
            for guide in guides {
                remap(guide, &user_ids)?;
            }
        }
        let payload: TourCreateSchema = serde_json::from_value(tour)?;
        payload.validate()?;
        let id = Tour::insert(db, payload).await?;
        tour_ids.insert(file_id, id);
    }
    tracing::info!(count = tour_ids.len(), "tours imported");

    let mut imported = 0;
    for mut review in reviews {
        for (field, ids) in [("tour", &tour_ids), ("user", &user_ids)] {
            if let Some(value) = review.get_mut(field) {
                remap(value, ids)?;
            }
        }
        let payload: ReviewCreateSchema = serde_json::from_value(review)?;
        payload.validate()?;
        Review::insert(db, payload).await?;
        imported += 1;
    }
    tracing::info!(count = imported, "reviews imported");
    Ok(())
}

async fn delete_all(db: &MySqlPool) -> Result<(), BoxError> {
    let mut tx = db.begin().await?;
    for table in [
        "bookings",
        "reviews",
        "tour_guides",
        "tour_locations",
        "tour_start_dates",
        "tours",
        "users",
    ] {
        let result = sqlx::query(&format!("DELETE FROM {}", table)).execute(&mut *tx).await?;
        tracing::info!(table, rows = result.rows_affected(), "deleted");
    }
    tx.commit().await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    dotenv().ok();
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    let db = config::database::establish_connection().await?;
    if cli.delete {
        delete_all(&db).await?;
        tracing::info!("Data successfully deleted!");
    } else {
        import(&db, &cli.dir).await?;
        tracing::info!("Data successfully loaded!");
    }
    db.close().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn remaps_file_ids() {
        let ids = HashMap::from([("5c8a1d5b0190b214360dc057".to_string(), 12)]);
        let mut value = json!("5c8a1d5b0190b214360dc057");
        remap(&mut value, &ids).unwrap();
        assert_eq!(value, json!(12));

        let mut unknown = json!("nope");
        assert!(remap(&mut unknown, &ids).is_err());
    }

    #[test]
    fn cli_requires_an_action() {
        assert!(Cli::try_parse_from(["import-dev-data"]).is_err());
        assert!(Cli::try_parse_from(["import-dev-data", "--import", "--delete"]).is_err());
        let cli = Cli::try_parse_from(["import-dev-data", "--delete"]).unwrap();
        assert!(cli.delete && !cli.import);
        assert_eq!(cli.dir, PathBuf::from("dev-data/data"));
    }

    #[test]
    fn sample_files_parse() {
        let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("dev-data/data");
        let users: Vec<UserRecord> = read_json(&dir, "users.json").unwrap();
        assert!(!users.is_empty());
        let tours: Vec<Value> = read_json(&dir, "tours.json").unwrap();
        for tour in tours {
            let mut tour = tour;
            tour["guides"] = json!([]);
            let schema: TourCreateSchema = serde_json::from_value(tour).unwrap();
            schema.validate().unwrap();
        }
    }
}
