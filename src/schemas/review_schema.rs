use serde::Deserialize;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct ReviewCreateSchema {
    #[validate(
        required(message = "Review cannot be empty"),
        custom(function = "crate::utils::validation::validate_not_blank", message = "Review cannot be empty")
    )]
    pub review: Option<String>,

    #[validate(range(min = 1, max = 5, message = "Rating must be between 1 and 5"))]
    pub rating: Option<i32>,

    #[validate(required(message = "Review must belong to a tour"))]
    pub tour: Option<i64>,

    #[validate(required(message = "Review must belong to a user"))]
    pub user: Option<i64>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ReviewUpdateSchema {
    #[validate(custom(function = "crate::utils::validation::validate_not_blank", message = "Review cannot be empty"))]
    pub review: Option<String>,

    #[validate(range(min = 1, max = 5, message = "Rating must be between 1 and 5"))]
    pub rating: Option<i32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn rating_is_bounded() {
        let payload: ReviewCreateSchema =
            serde_json::from_value(json!({"review": "Great", "rating": 6, "tour": 1, "user": 2})).unwrap();
        let err: crate::errors::AppError = payload.validate().unwrap_err().into();
        assert_eq!(err.message, "Invalid input data. Rating must be between 1 and 5");
    }

    #[test]
    fn tour_and_user_are_required() {
        let payload: ReviewCreateSchema = serde_json::from_value(json!({"review": "Great", "rating": 4})).unwrap();
        let errors = payload.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("tour"));
        assert!(errors.field_errors().contains_key("user"));
    }
}
