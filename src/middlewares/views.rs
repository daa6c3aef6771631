use axum::{
    Extension,
    extract::Request,
    middleware::Next,
    response::{Html, IntoResponse, Response},
};
use minijinja::context;

use crate::config::AppEnv;
use crate::errors::AppError;
use crate::state::AppState;

pub const BOOKING_ALERT: &str = "Your booking was successful! Please check your email for a confirmation. \
     If your booking doesn't show up here immediately, please come back later.";

/// Message shown once at the top of a rendered page.
#[derive(Clone, Debug)]
pub struct Alert(pub &'static str);

pub fn alert_for(query: Option<&str>) -> Option<Alert> {
    query?
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(k, _)| *k == "alert")
        .and_then(|(_, v)| match v {
            "booking" => Some(Alert(BOOKING_ALERT)),
            _ => None,
        })
}

pub async fn alerts(mut req: Request, next: Next) -> Response {
    if let Some(alert) = alert_for(req.uri().query()) {
        req.extensions_mut().insert(alert);
    }
    next.run(req).await
}

/// Message for the error page: the real one for operational errors and in development.
pub fn page_message(err: &AppError, env: AppEnv) -> String {
    if err.operational || env == AppEnv::Development {
        err.message.clone()
    } else {
        "Please try again later.".to_string()
    }
}

/// Replaces JSON error bodies coming out of page routes with the rendered error page.
pub async fn render_errors(Extension(state): Extension<AppState>, req: Request, next: Next) -> Response {
    let response = next.run(req).await;
    let Some(err) = response.extensions().get::<AppError>().cloned() else {
        return response;
    };

    let rendered = state.templates.get_template("error.html").and_then(|t| {
        t.render(context! {
            title => "Something went wrong!",
            msg => page_message(&err, state.config.env),
        })
    });
    match rendered {
        Ok(html) => {
            let mut page = (err.status, Html(html)).into_response();
            page.extensions_mut().insert(err);
            page
        }
        Err(render_err) => {
            tracing::error!(error = %render_err, "failed to render error page");
            response
        }
    }
}
