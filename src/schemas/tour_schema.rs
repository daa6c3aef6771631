use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use validator::{Validate, ValidationError};

use crate::utils::validation::error;

pub const DIFFICULTIES: [&str; 3] = ["easy", "medium", "difficult"];

/// Trims text as it is read, so validation sees the value that gets stored.
fn trimmed<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.map(|text| text.trim().to_string()))
}

/// GeoJSON point with coordinates in `[lng, lat]` order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct GeoPoint {
    #[serde(rename = "type", default = "point_type")]
    pub kind: String,
    #[validate(custom(function = "validate_coordinates"))]
    pub coordinates: Vec<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day: Option<i32>,
}

fn point_type() -> String {
    "Point".to_string()
}

impl GeoPoint {
    pub fn new(lng: f64, lat: f64) -> Self {
        Self {
            kind: point_type(),
            coordinates: vec![lng, lat],
            address: None,
            description: None,
            day: None,
        }
    }

    pub fn lng(&self) -> f64 {
        self.coordinates.first().copied().unwrap_or_default()
    }

    pub fn lat(&self) -> f64 {
        self.coordinates.get(1).copied().unwrap_or_default()
    }
}

fn validate_coordinates(coordinates: &[f64]) -> Result<(), ValidationError> {
    match coordinates {
        [lng, lat] if (-180.0..=180.0).contains(lng) && (-90.0..=90.0).contains(lat) => Ok(()),
        _ => Err(error("coordinates", "Coordinates must be [longitude, latitude]")),
    }
}

fn validate_difficulty(value: &str) -> Result<(), ValidationError> {
    if DIFFICULTIES.contains(&value) {
        Ok(())
    } else {
        Err(error("difficulty", "Difficulty is either: easy, medium, difficult"))
    }
}

fn discount_error(discount: f64) -> ValidationError {
    let mut err = ValidationError::new("priceDiscount");
    err.message = Some(format!("Discount price ({}) should be below the regular price", discount).into());
    err
}

/// Checks a discount against the price it applies to.
pub fn check_discount(discount: f64, price: f64) -> Result<(), ValidationError> {
    if discount < price { Ok(()) } else { Err(discount_error(discount)) }
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
#[validate(schema(function = "validate_create_discount"))]
pub struct TourCreateSchema {
    #[validate(
        required(message = "A tour must have a name"),
        length(min = 10, max = 40, message = "A tour name must have between 10 and 40 characters")
    )]
    #[serde(default, deserialize_with = "trimmed")]
    pub name: Option<String>,

    #[validate(
        required(message = "A tour must have a duration"),
        range(min = 1, message = "Duration must be at least one day")
    )]
    pub duration: Option<i32>,

    #[validate(
        required(message = "A tour must have a group size"),
        range(min = 1, message = "Group size must be at least 1")
    )]
    pub max_group_size: Option<i32>,

    #[validate(
        required(message = "A tour must have a difficulty"),
        custom(function = "validate_difficulty")
    )]
    pub difficulty: Option<String>,

    #[validate(range(min = 1.0, max = 5.0, message = "Rating must be between 1.0 and 5.0"))]
    pub ratings_average: Option<f64>,

    #[validate(range(min = 0, message = "Ratings quantity cannot be negative"))]
    pub ratings_quantity: Option<i32>,

    #[validate(
        required(message = "A tour must have a price"),
        range(min = 0.0, message = "Price cannot be negative")
    )]
    pub price: Option<f64>,

    pub price_discount: Option<f64>,

    #[validate(
        required(message = "A tour must have a summary"),
        custom(function = "crate::utils::validation::validate_not_blank", message = "A tour must have a summary")
    )]
    #[serde(default, deserialize_with = "trimmed")]
    pub summary: Option<String>,

    #[serde(default, deserialize_with = "trimmed")]
    pub description: Option<String>,

    #[validate(
        required(message = "A tour must have a cover image"),
        length(min = 1, message = "A tour must have a cover image")
    )]
    pub image_cover: Option<String>,

    pub images: Option<Vec<String>>,
    pub start_dates: Option<Vec<DateTime<Utc>>>,
    pub secret_tour: Option<bool>,

    #[validate(nested)]
    pub start_location: Option<GeoPoint>,

    #[validate(nested)]
    pub locations: Option<Vec<GeoPoint>>,

    pub guides: Option<Vec<i64>>,
}

fn validate_create_discount(payload: &TourCreateSchema) -> Result<(), ValidationError> {
    match (payload.price_discount, payload.price) {
        (Some(discount), Some(price)) => check_discount(discount, price),
        _ => Ok(()),
    }
}

/// Partial tour update. A discount without a price is checked against the stored price.
#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
#[validate(schema(function = "validate_update_discount"))]
pub struct TourUpdateSchema {
    #[validate(length(min = 10, max = 40, message = "A tour name must have between 10 and 40 characters"))]
    #[serde(default, deserialize_with = "trimmed")]
    pub name: Option<String>,

    #[validate(range(min = 1, message = "Duration must be at least one day"))]
    pub duration: Option<i32>,

    #[validate(range(min = 1, message = "Group size must be at least 1"))]
    pub max_group_size: Option<i32>,

    #[validate(custom(function = "validate_difficulty"))]
    pub difficulty: Option<String>,

    #[validate(range(min = 1.0, max = 5.0, message = "Rating must be between 1.0 and 5.0"))]
    pub ratings_average: Option<f64>,

    #[validate(range(min = 0, message = "Ratings quantity cannot be negative"))]
    pub ratings_quantity: Option<i32>,

    #[validate(range(min = 0.0, message = "Price cannot be negative"))]
    pub price: Option<f64>,

    pub price_discount: Option<f64>,

    #[validate(custom(function = "crate::utils::validation::validate_not_blank", message = "A tour must have a summary"))]
    #[serde(default, deserialize_with = "trimmed")]
    pub summary: Option<String>,

    #[serde(default, deserialize_with = "trimmed")]
    pub description: Option<String>,

    #[validate(length(min = 1, message = "A tour must have a cover image"))]
    pub image_cover: Option<String>,

    pub images: Option<Vec<String>>,
    pub start_dates: Option<Vec<DateTime<Utc>>>,
    pub secret_tour: Option<bool>,

    #[validate(nested)]
    pub start_location: Option<GeoPoint>,

    #[validate(nested)]
    pub locations: Option<Vec<GeoPoint>>,

    pub guides: Option<Vec<i64>>,
}

fn validate_update_discount(payload: &TourUpdateSchema) -> Result<(), ValidationError> {
    match (payload.price_discount, payload.price) {
        (Some(discount), Some(price)) => check_discount(discount, price),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn base() -> serde_json::Value {
        json!({
            "name": "The Forest Hiker",
            "duration": 5,
            "maxGroupSize": 25,
            "difficulty": "easy",
            "price": 397,
            "summary": "Breathtaking hike through the Canadian Banff National Park",
            "imageCover": "tour-1-cover.jpg",
            "startLocation": {
                "type": "Point",
                "coordinates": [-115.570154, 51.178456],
                "address": "224 Banff Ave, Banff, AB, Canada",
                "description": "Banff, CAN"
            }
        })
    }

    #[test]
    fn valid_tour_passes() {
        let payload: TourCreateSchema = serde_json::from_value(base()).unwrap();
        assert!(payload.validate().is_ok());
        assert_eq!(payload.start_location.unwrap().lat(), 51.178456);
    }

    #[test]
    fn short_names_and_unknown_difficulty_fail() {
        let mut body = base();
        body["name"] = json!("Short");
        body["difficulty"] = json!("extreme");
        let payload: TourCreateSchema = serde_json::from_value(body).unwrap();
        let errors = payload.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("name"));
        assert!(fields.contains_key("difficulty"));
    }

    #[test]
    fn names_are_measured_after_trimming() {
        let mut body = base();
        body["name"] = json!("   The Forest Hiker   ");
        body["summary"] = json!("  Breathtaking hike  ");
        let payload: TourCreateSchema = serde_json::from_value(body).unwrap();
        assert!(payload.validate().is_ok());
        assert_eq!(payload.name.as_deref(), Some("The Forest Hiker"));
        assert_eq!(payload.summary.as_deref(), Some("Breathtaking hike"));

        let payload: TourUpdateSchema =
            serde_json::from_value(json!({"name": "  The Sea Explorer                           "})).unwrap();
        assert!(payload.validate().is_ok());

        let payload: TourUpdateSchema = serde_json::from_value(json!({"name": "   Short    "})).unwrap();
        assert!(payload.validate().is_err());
    }

    #[test]
    fn discount_must_be_below_price() {
        let mut body = base();
        body["priceDiscount"] = json!(500);
        let payload: TourCreateSchema = serde_json::from_value(body).unwrap();
        let err: crate::errors::AppError = payload.validate().unwrap_err().into();
        assert!(err.message.contains("Discount price (500) should be below the regular price"));
    }

    #[test]
    fn missing_required_fields_are_reported() {
        let payload: TourCreateSchema = serde_json::from_value(json!({"name": "A Brand New Tour"})).unwrap();
        let errors = payload.validate().unwrap_err();
        let fields = errors.field_errors();
        for key in ["duration", "difficulty", "price", "summary"] {
            assert!(fields.contains_key(key), "missing error for {}", key);
        }
        assert_eq!(fields.len(), 6);
    }

    #[test]
    fn coordinates_are_checked() {
        let point = GeoPoint::new(200.0, 10.0);
        assert!(point.validate().is_err());
        assert!(GeoPoint::new(-80.1, 25.7).validate().is_ok());
    }

    #[test]
    fn update_may_be_partial() {
        let payload: TourUpdateSchema = serde_json::from_value(json!({"price": 499})).unwrap();
        assert!(payload.validate().is_ok());
    }
}
