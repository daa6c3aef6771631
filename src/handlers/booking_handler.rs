use axum::{
    Extension, Json,
    body::Bytes,
    extract::Path,
    http::{HeaderMap, StatusCode},
};
use serde_json::{Value, json};

use crate::errors::{AppError, AppResult};
use crate::middlewares::auth_middleware::CurrentUser;
use crate::models::booking::Booking;
use crate::models::resource::Resource;
use crate::models::tour::Tour;
use crate::state::AppState;
use crate::utils::handler::parse_id;
use crate::utils::request::base_url;
use crate::utils::stripe::{CheckoutSessionParams, CompletedCheckout, StripeEvent};

pub const CHECKOUT_COMPLETED: &str = "checkout.session.completed";

/// Builds the Checkout session parameters for `tour` bought by `email`.
pub fn checkout_params(tour: &Tour, email: &str, base: &str) -> CheckoutSessionParams {
    CheckoutSessionParams {
        tour_id: tour.id,
        customer_email: email.to_string(),
        product_name: format!("{} Tour", tour.name),
        description: tour.summary.clone(),
        image_url: format!("{}/img/tours/{}", base, tour.image_cover),
        unit_amount: (tour.price * 100.0).round() as i64,
        success_url: format!("{}/my-tours?alert=booking", base),
        cancel_url: format!("{}/tour/{}", base, tour.slug),
    }
}

/// `GET /checkout-session/{id}`
pub async fn get_checkout_session(
    Extension(state): Extension<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(tour_id): Path<String>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let tour = Tour::find_by_id(&state.db, parse_id(&tour_id)?)
        .await?
        .ok_or_else(|| AppError::not_found("No tour found with that ID"))?;

    let params = checkout_params(&tour, &user.email, &base_url(&headers));
    let session = state.stripe.create_checkout_session(&params).await?;
    tracing::info!(user_id = user.id, tour_id = tour.id, "checkout session created");

    Ok(Json(json!({ "status": "success", "session": session })))
}

async fn booking_from_event(state: &AppState, event: StripeEvent) -> AppResult<()> {
    let session: CompletedCheckout = serde_json::from_value(event.data.object)
        .map_err(|e| AppError::bad_request(format!("Webhook error: {}", e)))?;

    let tour_id = session
        .client_reference_id
        .as_deref()
        .and_then(|id| id.parse::<i64>().ok())
        .ok_or_else(|| AppError::bad_request("Webhook error: missing client_reference_id"))?;
    let email = session
        .email()
        .ok_or_else(|| AppError::bad_request("Webhook error: missing customer email"))?;
    let price = session.amount_total.unwrap_or_default() as f64 / 100.0;

    Booking::create_from_checkout(&state.db, tour_id, email, price).await?;
    Ok(())
}

/// `POST /webhook-checkout`. Needs the raw body for the signature check.
pub async fn webhook_checkout(
    Extension(state): Extension<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<(StatusCode, Json<Value>)> {
    let signature = headers.get("stripe-signature").and_then(|v| v.to_str().ok());
    let event = state.stripe.construct_event(&body, signature)?;
    tracing::info!(event_id = event.id.as_deref().unwrap_or(""), kind = %event.kind, "stripe webhook received");

    if event.kind == CHECKOUT_COMPLETED {
        if let Err(err) = booking_from_event(&state, event).await {
            tracing::error!(error = %err, details = err.details.as_deref().unwrap_or(""), "failed to record booking");
        }
    }

    Ok((StatusCode::OK, Json(json!({ "received": true }))))
}
