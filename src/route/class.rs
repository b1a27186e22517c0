use rocket::serde::json::Json;
use rocket::State;
use uuid::Uuid;

use crate::data::class::problem as class_problem;
use crate::data::class::{ClassCreateData, ClassOffering, ClassStatus, ClassUpdateData, FeedbackData};
use crate::data::Db;
use crate::resp::guard::{require_self, AdminGate, InstructorGate};
use crate::resp::problem::{problems, Problem};

/// Submit a class for review; it starts out `pending`
#[utoipa::path(
    request_body = ClassCreateData,
    responses(
        (status = 200, description = "Created class", body = ClassOffering),
        (status = 400, description = "Invalid class data", body = Problem),
        (status = 403, description = "Caller isn't an instructor", body = Problem),
    ),
    security(("jwt" = []))
)]
#[post("/add-class", data = "<class>")]
#[tracing::instrument(skip(db))]
pub async fn class_create(
    class: Json<ClassCreateData>,
    gate: InstructorGate,
    db: &State<Db>,
) -> Result<Json<ClassOffering>, Problem> {
    class.validate()?;

    let offering = class.into_inner().into_offering(gate.email());
    db.insert_class(&offering).await?;
    tracing::info!("{} submitted class {}", gate.email(), offering.id);

    Ok(Json(offering))
}

/// List classes, optionally filtered by review status
#[utoipa::path(
    responses(
        (status = 200, description = "Classes", body = Vec<ClassOffering>),
        (status = 400, description = "Unknown status", body = Problem),
    )
)]
#[get("/classes?<status>")]
#[tracing::instrument(skip(db))]
pub async fn class_list(
    status: Option<&str>,
    db: &State<Db>,
) -> Result<Json<Vec<ClassOffering>>, Problem> {
    let status = status.map(str::parse::<ClassStatus>).transpose()?;
    Ok(Json(db.list_classes(status).await?))
}

/// Classes authored by the calling instructor
#[utoipa::path(
    responses(
        (status = 200, description = "Own classes", body = Vec<ClassOffering>),
        (status = 403, description = "Not an instructor or not the caller's email", body = Problem),
    ),
    security(("jwt" = []))
)]
#[get("/classes/<email>")]
#[tracing::instrument(skip(db))]
pub async fn class_list_own(
    email: &str,
    gate: InstructorGate,
    db: &State<Db>,
) -> Result<Json<Vec<ClassOffering>>, Problem> {
    require_self(&gate.token, email)?;
    Ok(Json(db.list_classes_by_owner(email).await?))
}

#[utoipa::path(
    responses(
        (status = 200, description = "Class", body = ClassOffering),
        (status = 404, description = "No class with this id", body = Problem),
    )
)]
#[get("/class/<id>")]
#[tracing::instrument(skip(db))]
pub async fn class_get(id: Uuid, db: &State<Db>) -> Result<Option<Json<ClassOffering>>, Problem> {
    Ok(db.get_class(id).await?.map(Json))
}

/// Edit name, image, price or seats of an own class
#[utoipa::path(
    request_body = ClassUpdateData,
    responses(
        (status = 200, description = "Updated class", body = ClassOffering),
        (status = 403, description = "Class belongs to another instructor", body = Problem),
        (status = 404, description = "No class with this id", body = Problem),
    ),
    security(("jwt" = []))
)]
#[patch("/update/<id>", data = "<update>")]
#[tracing::instrument(skip(db))]
pub async fn class_update(
    id: Uuid,
    update: Json<ClassUpdateData>,
    gate: InstructorGate,
    db: &State<Db>,
) -> Result<Json<ClassOffering>, Problem> {
    update.validate()?;

    if let Some(class) = db.update_class(id, gate.email(), &update).await? {
        return Ok(Json(class));
    }

    match db.get_class(id).await? {
        Some(_) => Err(problems::forbidden("Class belongs to a different instructor.")),
        None => Err(class_problem::not_found(id)),
    }
}

async fn review(db: &Db, id: Uuid, status: ClassStatus) -> Result<Json<ClassOffering>, Problem> {
    let class = db
        .set_class_status(id, status)
        .await?
        .ok_or_else(|| class_problem::not_found(id))?;
    tracing::info!("class {} is now {}", id, status);
    Ok(Json(class))
}

/// Approve a class
#[utoipa::path(
    responses(
        (status = 200, description = "Approved class", body = ClassOffering),
        (status = 404, description = "No class with this id", body = Problem),
    ),
    security(("jwt" = []))
)]
#[patch("/classes/update/<id>")]
#[tracing::instrument(skip(db))]
pub async fn class_approve(
    id: Uuid,
    _gate: AdminGate,
    db: &State<Db>,
) -> Result<Json<ClassOffering>, Problem> {
    review(db, id, ClassStatus::Approved).await
}

/// Deny a class
#[utoipa::path(
    responses(
        (status = 200, description = "Denied class", body = ClassOffering),
        (status = 404, description = "No class with this id", body = Problem),
    ),
    security(("jwt" = []))
)]
#[patch("/classes/deny/<id>")]
#[tracing::instrument(skip(db))]
pub async fn class_deny(
    id: Uuid,
    _gate: AdminGate,
    db: &State<Db>,
) -> Result<Json<ClassOffering>, Problem> {
    review(db, id, ClassStatus::Denied).await
}

/// Attach admin feedback to a class
#[utoipa::path(
    request_body = FeedbackData,
    responses(
        (status = 200, description = "Class with feedback", body = ClassOffering),
        (status = 404, description = "No class with this id", body = Problem),
    ),
    security(("jwt" = []))
)]
#[patch("/classes/feedback/<id>", data = "<feedback>")]
#[tracing::instrument(skip(db))]
pub async fn class_feedback(
    id: Uuid,
    feedback: Json<FeedbackData>,
    _gate: AdminGate,
    db: &State<Db>,
) -> Result<Json<ClassOffering>, Problem> {
    db.set_class_feedback(id, &feedback.feedback)
        .await?
        .map(Json)
        .ok_or_else(|| class_problem::not_found(id))
}

#[cfg(test)]
mod class_endpoints {
    use rocket::http::{ContentType, Status};
    use serde_json::json;

    use crate::data::class::db::ClassCatalog;
    use crate::data::class::{ClassOffering, ClassStatus};
    use crate::role::Role;
    use crate::route::testing::{bearer, TestApp};

    async fn submit(app: &TestApp, instructor: &str) -> ClassOffering {
        let response = app
            .client
            .post("/add-class")
            .header(ContentType::JSON)
            .header(bearer(instructor))
            .body(
                json!({
                    "name": "Morning Yoga",
                    "price": 25.0,
                    "seats": 10,
                    "instructorEmail": "forged@x.com"
                })
                .to_string(),
            )
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);
        response.into_json().await.unwrap()
    }

    #[rocket::async_test]
    async fn create_approve_deny_round_trip() {
        let app = TestApp::new().await;
        app.user("teach@x.com", Role::Instructor).await;
        app.user("boss@x.com", Role::Admin).await;

        let class = submit(&app, "teach@x.com").await;
        assert_eq!(class.status, ClassStatus::Pending);
        assert_eq!(class.instructor_email, "teach@x.com");

        for action in ["update", "deny"] {
            let response = app
                .client
                .patch(format!("/classes/{}/{}", action, class.id))
                .header(bearer("boss@x.com"))
                .dispatch()
                .await;
            assert_eq!(response.status(), Status::Ok);
        }

        let stored = app.store.get_class(class.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ClassStatus::Denied);
        assert_eq!(stored.seats, 10);

        let denied: Vec<ClassOffering> = app
            .client
            .get("/classes?status=deny")
            .dispatch()
            .await
            .into_json()
            .await
            .unwrap();
        assert_eq!(denied.len(), 1);
    }

    #[rocket::async_test]
    async fn admins_are_not_instructors() {
        let app = TestApp::new().await;
        app.user("boss@x.com", Role::Admin).await;

        let response = app
            .client
            .post("/add-class")
            .header(ContentType::JSON)
            .header(bearer("boss@x.com"))
            .body(json!({"name": "Judo", "price": 10.0, "seats": 4}).to_string())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Forbidden);
        assert!(app.store.list_classes(None).await.unwrap().is_empty());
    }

    #[rocket::async_test]
    async fn instructors_only_see_and_edit_their_own_classes() {
        let app = TestApp::new().await;
        app.user("teach@x.com", Role::Instructor).await;
        app.user("rival@x.com", Role::Instructor).await;
        let class = submit(&app, "teach@x.com").await;

        let response = app
            .client
            .get("/classes/teach@x.com")
            .header(bearer("rival@x.com"))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Forbidden);

        let response = app
            .client
            .patch(format!("/update/{}", class.id))
            .header(ContentType::JSON)
            .header(bearer("rival@x.com"))
            .body(json!({"seats": 99}).to_string())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Forbidden);

        let updated: ClassOffering = app
            .client
            .patch(format!("/update/{}", class.id))
            .header(ContentType::JSON)
            .header(bearer("teach@x.com"))
            .body(json!({"seats": 12}).to_string())
            .dispatch()
            .await
            .into_json()
            .await
            .unwrap();
        assert_eq!(updated.seats, 12);

        let own: Vec<ClassOffering> = app
            .client
            .get("/classes/teach@x.com")
            .header(bearer("teach@x.com"))
            .dispatch()
            .await
            .into_json()
            .await
            .unwrap();
        assert_eq!(own, vec![updated]);
    }

    #[rocket::async_test]
    async fn unknown_classes_are_not_found() {
        let app = TestApp::new().await;
        app.user("boss@x.com", Role::Admin).await;
        let id = uuid::Uuid::new_v4();

        let response = app.client.get(format!("/class/{}", id)).dispatch().await;
        assert_eq!(response.status(), Status::NotFound);

        let response = app
            .client
            .patch(format!("/classes/feedback/{}", id))
            .header(ContentType::JSON)
            .header(bearer("boss@x.com"))
            .body(json!({"feedback": "needs a photo"}).to_string())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::NotFound);

        let response = app.client.get("/classes?status=archived").dispatch().await;
        assert_eq!(response.status(), Status::BadRequest);
    }
}
