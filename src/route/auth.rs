use rocket::http::Status;
use rocket::serde::json::Json;
use rocket::State;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use utoipa::ToSchema;

use crate::data::user::validate_email;
use crate::resp::jwt::AuthToken;
use crate::resp::problem::{problems, Problem};
use crate::security::Security;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct TokenResponse {
    pub token: String,
}

/// Issue an access token for the signed-in user. Every field besides
/// `email` is carried as an extra claim.
#[utoipa::path(
    request_body(content = Object, description = "User object with at least `email`"),
    responses(
        (status = 200, description = "Signed token valid for one hour", body = TokenResponse),
        (status = 400, description = "Missing or invalid email", body = Problem),
    )
)]
#[post("/jwt", data = "<user>")]
#[tracing::instrument(skip(security))]
pub fn token_issue(
    user: Json<Map<String, Value>>,
    security: &State<Security>,
) -> Result<Json<TokenResponse>, Problem> {
    let mut profile = user.into_inner();

    let email = match profile.remove("email") {
        Some(Value::String(email)) => email,
        _ => {
            return Err(problems::parse_problem()
                .detail("Field 'email' must be a string.")
                .clone())
        }
    };
    validate_email(&email)?;

    let token = AuthToken::new(&email, profile)
        .encode_jwt(&security.token_secret)
        .map_err(|e| {
            tracing::error!("unable to sign token for {}: {}", email, e);
            Problem::new_untyped(Status::InternalServerError, "Unable to sign token.")
        })?;

    Ok(Json(TokenResponse { token }))
}
