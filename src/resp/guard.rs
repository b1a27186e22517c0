//! Request guards gating routes on the caller's identity and stored role.
//!
//! Authentication comes from [`AuthToken`]; role checks look the caller up in
//! the user directory on every request. Every failure short-circuits the
//! request before the handler body runs.

use std::marker::PhantomData;

use rocket::http::Status;
use rocket::outcome::Outcome;
use rocket::request::{self, FromRequest, Request};

use crate::data::user::User;
use crate::data::Db;
use crate::resp::jwt::AuthToken;
use crate::resp::problem::{problems, GuardFailure, Problem};
use crate::role::Role;

/// Fails the guard, remembering the problem for the catcher.
pub(crate) fn reject<S>(req: &Request<'_>, problem: Problem) -> request::Outcome<S, Problem> {
    let status = problem.status;
    req.local_cache(|| GuardFailure(Some(problem.clone())));
    Outcome::Error((status, problem))
}

/// Role a [`RoleGate`] requires.
pub trait Requirement: Send + Sync + 'static {
    const ROLE: Role;
}

#[derive(Debug)]
pub struct AdminOnly;
impl Requirement for AdminOnly {
    const ROLE: Role = Role::Admin;
}

#[derive(Debug)]
pub struct InstructorOnly;
impl Requirement for InstructorOnly {
    const ROLE: Role = Role::Instructor;
}

/// Authenticated caller whose stored role equals `R::ROLE`.
#[derive(Debug)]
pub struct RoleGate<R> {
    pub token: AuthToken,
    pub user: User,
    _requirement: PhantomData<fn() -> R>,
}

pub type AdminGate = RoleGate<AdminOnly>;
pub type InstructorGate = RoleGate<InstructorOnly>;

impl<R> RoleGate<R> {
    pub fn email(&self) -> &str {
        &self.token.email
    }
}

/// Looks the caller up and checks the stored role is exactly `role`.
pub async fn require_role(db: &Db, token: &AuthToken, role: Role) -> Result<User, Problem> {
    let user = db
        .find_user_by_email(&token.email)
        .await?
        .ok_or_else(|| problems::forbidden("Caller isn't a registered user."))?;

    if user.role != role {
        tracing::debug!(
            "denied {} with role {} access requiring {}",
            user.email,
            user.role,
            role
        );
        return Err(problems::forbidden(format!("Requires the {} role.", role))
            .insert_str("role", role)
            .clone());
    }

    Ok(user)
}

/// Only lets callers act on resources scoped to their own email.
pub fn require_self(token: &AuthToken, email: &str) -> Result<(), Problem> {
    if token.email != email {
        return Err(problems::forbidden(
            "Resource belongs to a different user.",
        ));
    }
    Ok(())
}

#[rocket::async_trait]
impl<'r, R: Requirement> FromRequest<'r> for RoleGate<R> {
    type Error = Problem;

    async fn from_request(req: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        let token = match req.guard::<AuthToken>().await {
            Outcome::Success(token) => token,
            Outcome::Error(e) => return Outcome::Error(e),
            Outcome::Forward(status) => return Outcome::Forward(status),
        };

        let db = match req.rocket().state::<Db>() {
            Some(db) => db,
            None => {
                tracing::error!("store isn't managed by the server");
                return reject(
                    req,
                    Problem::new_untyped(Status::InternalServerError, "Server isn't configured."),
                );
            }
        };

        match require_role(db, &token, R::ROLE).await {
            Ok(user) => Outcome::Success(RoleGate {
                token,
                user,
                _requirement: PhantomData,
            }),
            Err(problem) => reject(req, problem),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::memory::MemoryStore;
    use crate::data::user::db::UserDirectory;
    use serde_json::Map;
    use std::sync::Arc;

    async fn directory_with(roles: &[(&str, Role)]) -> Db {
        let store = MemoryStore::default();
        for (email, role) in roles {
            store.upsert_user(email, Map::new()).await.unwrap();
            store
                .set_role(User::id_for(email), *role)
                .await
                .unwrap();
        }
        Arc::new(store)
    }

    #[rocket::async_test]
    async fn require_role_rejects_every_other_role() {
        let db = directory_with(&[
            ("none@x.com", Role::None),
            ("teach@x.com", Role::Instructor),
            ("boss@x.com", Role::Admin),
        ])
        .await;

        let roles = [Role::None, Role::Instructor, Role::Admin];
        let users = ["none@x.com", "teach@x.com", "boss@x.com"];

        for required in roles {
            for (email, held) in users.iter().zip(roles) {
                let token = AuthToken::new(*email, Map::new());
                let result = require_role(&db, &token, required).await;
                if held == required {
                    assert!(result.is_ok(), "{} should pass {}", email, required);
                } else {
                    let problem = result.unwrap_err();
                    assert_eq!(problem.status, Status::Forbidden);
                }
            }
        }
    }

    #[rocket::async_test]
    async fn require_role_rejects_unknown_users() {
        let db = directory_with(&[]).await;
        for role in [Role::None, Role::Instructor, Role::Admin] {
            let token = AuthToken::new("ghost@x.com", Map::new());
            let problem = require_role(&db, &token, role).await.unwrap_err();
            assert_eq!(problem.status, Status::Forbidden);
        }
    }

    #[test]
    fn require_self_stops_on_mismatch() {
        let token = AuthToken::new("a@x.com", Map::new());
        assert!(require_self(&token, "a@x.com").is_ok());
        assert_eq!(
            require_self(&token, "b@x.com").unwrap_err().status,
            Status::Forbidden
        );
    }
}
