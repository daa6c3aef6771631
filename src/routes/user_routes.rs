use axum::{
    Router,
    routing::{delete, get, patch, post},
};

use crate::handlers::auth_handler::{
    forgot_password, login, logout, reset_password, signup, update_my_password,
};
use crate::handlers::factory;
use crate::handlers::user_handler::{create_user, delete_me, get_me, update_me};
use crate::models::user::User;
use crate::routes::{ADMIN, protected, restricted, with_uploads};

pub fn user_routes() -> Router {
    Router::new()
        .route("/signup", post(signup))
        .route("/login", post(login))
        .route("/logout", get(logout))
        .route("/forgotPassword", post(forgot_password))
        .route("/resetPassword/{token}", patch(reset_password))
        .route("/updateMyPassword", protected(patch(update_my_password)))
        .route("/me", protected(get(get_me)))
        .route("/updateMe", with_uploads(protected(patch(update_me))))
        .route("/deleteMe", protected(delete(delete_me)))
        .route(
            "/",
            restricted(get(factory::index::<User>).post(create_user), ADMIN),
        )
        .route(
            "/{id}",
            restricted(
                get(factory::show::<User>)
                    .patch(factory::update::<User>)
                    .delete(factory::destroy::<User>),
                ADMIN,
            ),
        )
}
