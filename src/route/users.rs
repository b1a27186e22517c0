use rocket::serde::json::Json;
use rocket::State;
use uuid::Uuid;

use crate::data::user::db::Promotion;
use crate::data::user::problem as user_problem;
use crate::data::user::{
    validate_email, AdminCheck, InstructorCheck, UpsertSummary, User, UserUpsertData,
};
use crate::data::Db;
use crate::resp::guard::{require_self, AdminGate};
use crate::resp::jwt::AuthToken;
use crate::resp::problem::{problems, Problem};
use crate::role::Role;

/// Create the user on first sign-in and merge its profile fields
#[utoipa::path(
    request_body(content = Object, description = "Profile fields of the user"),
    responses(
        (status = 200, description = "Store update summary", body = UpsertSummary),
        (status = 400, description = "Invalid email or field name", body = Problem),
    )
)]
#[put("/users/<email>", data = "<profile>")]
#[tracing::instrument(skip(db))]
pub async fn user_upsert(
    email: &str,
    profile: Json<UserUpsertData>,
    db: &State<Db>,
) -> Result<Json<UpsertSummary>, Problem> {
    validate_email(email)?;
    let fields = profile.into_inner().into_profile_fields()?;

    let summary = db.upsert_user(email, fields).await?;
    if summary.upserted_id.is_some() {
        tracing::info!("registered new user {}", email);
    }
    Ok(Json(summary))
}

/// List all users
#[utoipa::path(
    responses(
        (status = 200, description = "All users", body = Vec<User>),
        (status = 403, description = "Caller isn't an admin", body = Problem),
    ),
    security(("jwt" = []))
)]
#[get("/users")]
#[tracing::instrument(skip(db))]
pub async fn user_list(_gate: AdminGate, db: &State<Db>) -> Result<Json<Vec<User>>, Problem> {
    Ok(Json(db.list_users().await?))
}

/// Find a user by email; `null` when absent
#[utoipa::path(
    responses((status = 200, description = "User or null", body = User)),
    security(("jwt" = []))
)]
#[get("/users/<email>")]
#[tracing::instrument(skip(db))]
pub async fn user_get(
    email: &str,
    _auth: AuthToken,
    db: &State<Db>,
) -> Result<Json<Option<User>>, Problem> {
    Ok(Json(db.find_user_by_email(email).await?))
}

#[utoipa::path(
    responses(
        (status = 200, description = "Whether the caller is an admin", body = AdminCheck),
        (status = 403, description = "Email isn't the caller's", body = Problem),
    ),
    security(("jwt" = []))
)]
#[get("/users/admin/<email>")]
#[tracing::instrument(skip(db))]
pub async fn user_is_admin(
    email: &str,
    auth: AuthToken,
    db: &State<Db>,
) -> Result<Json<AdminCheck>, Problem> {
    require_self(&auth, email)?;

    Ok(Json(AdminCheck {
        admin: db.has_role(email, Role::Admin).await?,
    }))
}

#[utoipa::path(
    responses(
        (status = 200, description = "Whether the caller is an instructor", body = InstructorCheck),
        (status = 403, description = "Email isn't the caller's", body = Problem),
    ),
    security(("jwt" = []))
)]
#[get("/users/instructor/<email>")]
#[tracing::instrument(skip(db))]
pub async fn user_is_instructor(
    email: &str,
    auth: AuthToken,
    db: &State<Db>,
) -> Result<Json<InstructorCheck>, Problem> {
    require_self(&auth, email)?;

    Ok(Json(InstructorCheck {
        instructor: db.has_role(email, Role::Instructor).await?,
    }))
}

async fn promote(gate: &AdminGate, db: &Db, id: Uuid, role: Role) -> Result<Json<User>, Problem> {
    match db.promote(gate.email(), id, role).await? {
        Promotion::Promoted(user) => Ok(Json(user)),
        Promotion::TargetMissing => Err(user_problem::not_found(id)),
        Promotion::CallerNotAdmin => Err(problems::forbidden("Caller is no longer an admin.")),
    }
}

/// Give a user the admin role
#[utoipa::path(
    responses(
        (status = 200, description = "Promoted user", body = User),
        (status = 403, description = "Caller isn't an admin", body = Problem),
        (status = 404, description = "No user with this id", body = Problem),
    ),
    security(("jwt" = []))
)]
#[patch("/users/admin/<id>")]
#[tracing::instrument(skip(db))]
pub async fn user_make_admin(
    id: Uuid,
    gate: AdminGate,
    db: &State<Db>,
) -> Result<Json<User>, Problem> {
    promote(&gate, db, id, Role::Admin).await
}

/// Give a user the instructor role
#[utoipa::path(
    responses(
        (status = 200, description = "Promoted user", body = User),
        (status = 403, description = "Caller isn't an admin", body = Problem),
        (status = 404, description = "No user with this id", body = Problem),
    ),
    security(("jwt" = []))
)]
#[patch("/users/instructor/<id>")]
#[tracing::instrument(skip(db))]
pub async fn user_make_instructor(
    id: Uuid,
    gate: AdminGate,
    db: &State<Db>,
) -> Result<Json<User>, Problem> {
    promote(&gate, db, id, Role::Instructor).await
}

/// List every instructor
#[utoipa::path(responses((status = 200, description = "Instructors", body = Vec<User>)))]
#[get("/instructor")]
#[tracing::instrument(skip(db))]
pub async fn instructor_list(db: &State<Db>) -> Result<Json<Vec<User>>, Problem> {
    Ok(Json(db.list_users_by_role(Role::Instructor).await?))
}

#[cfg(test)]
mod user_endpoints {
    use rocket::http::{ContentType, Status};
    use serde_json::{json, Value};

    use crate::data::user::db::UserDirectory;
    use crate::data::user::{UpsertSummary, User};
    use crate::role::Role;
    use crate::route::testing::{bearer, TestApp};

    #[rocket::async_test]
    async fn upsert_twice_changes_nothing_the_second_time() {
        let app = TestApp::new().await;
        let body = json!({"name": "Ana", "photo": "ana.png", "role": "admin"}).to_string();

        let first: UpsertSummary = app
            .client
            .put("/users/ana@x.com")
            .header(ContentType::JSON)
            .body(&body)
            .dispatch()
            .await
            .into_json()
            .await
            .unwrap();
        assert_eq!(first.upserted_id, Some(User::id_for("ana@x.com")));

        let second: UpsertSummary = app
            .client
            .put("/users/ana@x.com")
            .header(ContentType::JSON)
            .body(&body)
            .dispatch()
            .await
            .into_json()
            .await
            .unwrap();
        assert_eq!((second.matched_count, second.modified_count), (1, 0));

        let user = app.store.find_user_by_email("ana@x.com").await.unwrap().unwrap();
        assert_eq!(user.role, Role::None);
        assert_eq!(user.profile.get("name"), Some(&json!("Ana")));
    }

    #[rocket::async_test]
    async fn admin_check_is_self_only() {
        let app = TestApp::new().await;
        app.user("boss@x.com", Role::Admin).await;
        app.user("stu@x.com", Role::None).await;

        let response = app
            .client
            .get("/users/admin/boss@x.com")
            .header(bearer("boss@x.com"))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);
        let body: Value = response.into_json().await.unwrap();
        assert_eq!(body, json!({"admin": true}));

        let response = app
            .client
            .get("/users/admin/boss@x.com")
            .header(bearer("stu@x.com"))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Forbidden);

        let response = app
            .client
            .get("/users/instructor/stu@x.com")
            .header(bearer("stu@x.com"))
            .dispatch()
            .await;
        let body: Value = response.into_json().await.unwrap();
        assert_eq!(body, json!({"instructor": false}));
    }

    #[rocket::async_test]
    async fn only_admins_list_users() {
        let app = TestApp::new().await;
        app.user("boss@x.com", Role::Admin).await;
        app.user("teach@x.com", Role::Instructor).await;

        let response = app
            .client
            .get("/users")
            .header(bearer("teach@x.com"))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Forbidden);

        let response = app
            .client
            .get("/users")
            .header(bearer("ghost@x.com"))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Forbidden);

        let users: Vec<User> = app
            .client
            .get("/users")
            .header(bearer("boss@x.com"))
            .dispatch()
            .await
            .into_json()
            .await
            .unwrap();
        assert_eq!(users.len(), 2);
    }

    #[rocket::async_test]
    async fn missing_user_reads_as_null() {
        let app = TestApp::new().await;

        let response = app
            .client
            .get("/users/nobody@x.com")
            .header(bearer("stu@x.com"))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);
        assert_eq!(response.into_string().await.unwrap(), "null");
    }

    #[rocket::async_test]
    async fn admins_promote_instructors() {
        let app = TestApp::new().await;
        app.user("boss@x.com", Role::Admin).await;
        let target = app.user("teach@x.com", Role::None).await;

        let response = app
            .client
            .patch(format!("/users/instructor/{}", target.id))
            .header(bearer("teach@x.com"))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Forbidden);

        let promoted: User = app
            .client
            .patch(format!("/users/instructor/{}", target.id))
            .header(bearer("boss@x.com"))
            .dispatch()
            .await
            .into_json()
            .await
            .unwrap();
        assert_eq!(promoted.role, Role::Instructor);

        let instructors: Vec<User> = app
            .client
            .get("/instructor")
            .dispatch()
            .await
            .into_json()
            .await
            .unwrap();
        assert_eq!(instructors, vec![promoted]);

        let response = app
            .client
            .patch(format!("/users/admin/{}", uuid::Uuid::new_v4()))
            .header(bearer("boss@x.com"))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::NotFound);
    }
}
