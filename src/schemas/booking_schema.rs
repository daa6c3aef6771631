use serde::Deserialize;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct BookingCreateSchema {
    #[validate(required(message = "Booking must belong to a Tour!"))]
    pub tour: Option<i64>,

    #[validate(required(message = "Booking must belong to a User!"))]
    pub user: Option<i64>,

    #[validate(
        required(message = "Booking must have a price"),
        range(min = 0.0, message = "Price cannot be negative")
    )]
    pub price: Option<f64>,

    pub paid: Option<bool>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct BookingUpdateSchema {
    pub tour: Option<i64>,
    pub user: Option<i64>,

    #[validate(range(min = 0.0, message = "Price cannot be negative"))]
    pub price: Option<f64>,

    pub paid: Option<bool>,
}
