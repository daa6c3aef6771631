use serde::Deserialize;
use validator::Validate;

use crate::models::user::Role;

/// Admin update of any user. Passwords are changed through the auth routes only.
#[derive(Debug, Deserialize, Validate)]
pub struct UserUpdateRequestSchema {
    #[validate(custom(function = "crate::utils::validation::validate_not_blank", message = "Name cannot be empty"))]
    pub name: Option<String>,

    #[validate(email(message = "Please provide a valid email"))]
    pub email: Option<String>,

    #[validate(length(min = 1, message = "Photo cannot be empty"))]
    pub photo: Option<String>,

    pub role: Option<Role>,
}

/// Self-service profile update. Only these fields are ever applied.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateMeSchema {
    #[validate(custom(function = "crate::utils::validation::validate_not_blank", message = "Name cannot be empty"))]
    pub name: Option<String>,

    #[validate(email(message = "Please provide a valid email"))]
    pub email: Option<String>,
}
