use axum::{
    Extension, Form,
    extract::{Path, rejection::FormRejection},
    http::{HeaderValue, header::CONTENT_SECURITY_POLICY},
    response::{Html, IntoResponse, Response},
};
use minijinja::{Value, context};

use crate::errors::{AppError, AppResult};
use crate::middlewares::auth_middleware::CurrentUser;
use crate::middlewares::views::Alert;
use crate::models::booking::Booking;
use crate::models::resource::Resource;
use crate::models::tour::Tour;
use crate::models::user::User;
use crate::schemas::user_schema::UpdateMeSchema;
use crate::state::AppState;
use crate::utils::api_features::ApiFeatures;
use crate::utils::validation::validate_payload;

/// Lets the tour page load Mapbox and Stripe.
pub const TOUR_PAGE_CSP: &str = "default-src 'self' https://*.mapbox.com https://*.stripe.com; \
     base-uri 'self'; block-all-mixed-content; font-src 'self' https: data:; frame-ancestors 'self'; \
     frame-src https://*.stripe.com; img-src 'self' data: blob:; object-src 'none'; \
     script-src 'self' https://api.mapbox.com https://js.stripe.com blob:; script-src-attr 'none'; \
     style-src 'self' https: 'unsafe-inline'; worker-src blob:; connect-src 'self' https://*.mapbox.com; \
     upgrade-insecure-requests";

fn render(state: &AppState, template: &str, title: &str, user: Option<&User>, alert: Option<&Alert>, extra: Value) -> AppResult<Html<String>> {
    let ctx = context! {
        title => title,
        user => user,
        alert => alert.map(|Alert(msg)| *msg),
        ..extra
    };
    Ok(Html(state.templates.get_template(template)?.render(ctx)?))
}

fn current(user: &Option<Extension<CurrentUser>>) -> Option<&User> {
    user.as_ref().map(|Extension(CurrentUser(u))| u)
}

fn alert_of(alert: &Option<Extension<Alert>>) -> Option<&Alert> {
    alert.as_ref().map(|Extension(a)| a)
}

pub async fn overview(
    Extension(state): Extension<AppState>,
    user: Option<Extension<CurrentUser>>,
    alert: Option<Extension<Alert>>,
) -> AppResult<Html<String>> {
    let features = ApiFeatures::parse(&[], Tour::COLUMNS)?;
    let tours = Tour::find_many(&state.db, &features, None).await?;
    render(&state, "overview.html", "All Tours", current(&user), alert_of(&alert), context! { tours })
}

pub async fn tour(
    Extension(state): Extension<AppState>,
    Path(slug): Path<String>,
    user: Option<Extension<CurrentUser>>,
    alert: Option<Extension<Alert>>,
) -> AppResult<Response> {
    let tour = Tour::find_by_slug(&state.db, &slug)
        .await?
        .ok_or_else(|| AppError::not_found("There is no tour with that name."))?;

    let title = format!("{} Tour", tour.name);
    let page = render(&state, "tour.html", &title, current(&user), alert_of(&alert), context! { tour })?;
    Ok((
        [(CONTENT_SECURITY_POLICY, HeaderValue::from_static(TOUR_PAGE_CSP))],
        page,
    )
        .into_response())
}

pub async fn login_form(
    Extension(state): Extension<AppState>,
    user: Option<Extension<CurrentUser>>,
) -> AppResult<Html<String>> {
    render(&state, "login.html", "Log into your account", current(&user), None, context! {})
}

pub async fn account(
    Extension(state): Extension<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> AppResult<Html<String>> {
    render(&state, "account.html", "Your account", Some(&user), None, context! {})
}

pub async fn my_tours(
    Extension(state): Extension<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    alert: Option<Extension<Alert>>,
) -> AppResult<Html<String>> {
    let ids = Booking::tour_ids_for_user(&state.db, user.id).await?;
    let tours = Tour::find_many_by_ids(&state.db, &ids).await?;
    render(&state, "overview.html", "My Tours", Some(&user), alert_of(&alert), context! { tours })
}

/// Plain form post from the account page (no JavaScript).
pub async fn submit_user_data(
    Extension(state): Extension<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    form: Result<Form<UpdateMeSchema>, FormRejection>,
) -> AppResult<Html<String>> {
    let Form(form) = form?;
    validate_payload(&form)?;

    let updated = User::update_profile(
        &state.db,
        user.id,
        form.name.as_deref().map(str::trim),
        form.email.as_deref(),
        None,
    )
    .await?;
    tracing::info!(user_id = user.id, "account updated from form");

    render(&state, "account.html", "Your account", Some(&updated), None, context! {})
}
