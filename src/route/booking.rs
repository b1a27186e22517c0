use rocket::serde::json::Json;
use rocket::State;
use uuid::Uuid;

use crate::data::booking::problem as booking_problem;
use crate::data::booking::{BookingCreateData, DeleteSummary, PendingBooking};
use crate::data::class::problem as class_problem;
use crate::data::Db;
use crate::resp::guard::require_self;
use crate::resp::jwt::AuthToken;
use crate::resp::problem::{problems, Problem};

/// Reserve a class for the caller; payment completes the enrollment
#[utoipa::path(
    request_body = BookingCreateData,
    responses(
        (status = 200, description = "Pending booking", body = PendingBooking),
        (status = 404, description = "No class with this id", body = Problem),
    ),
    security(("jwt" = []))
)]
#[post("/booking", data = "<booking>")]
#[tracing::instrument(skip(db))]
pub async fn booking_create(
    booking: Json<BookingCreateData>,
    auth: AuthToken,
    db: &State<Db>,
) -> Result<Json<PendingBooking>, Problem> {
    let class = db
        .get_class(booking.class_id)
        .await?
        .ok_or_else(|| class_problem::not_found(booking.class_id))?;

    let pending = PendingBooking::new(&auth.email, &class);
    db.insert_booking(&pending).await?;
    tracing::info!("{} booked class {}", auth.email, class.id);

    Ok(Json(pending))
}

/// Pending bookings of the caller; empty without `email`
#[utoipa::path(
    responses(
        (status = 200, description = "Pending bookings", body = Vec<PendingBooking>),
        (status = 403, description = "Email isn't the caller's", body = Problem),
    ),
    security(("jwt" = []))
)]
#[get("/booking?<email>")]
#[tracing::instrument(skip(db))]
pub async fn booking_list(
    email: Option<&str>,
    auth: AuthToken,
    db: &State<Db>,
) -> Result<Json<Vec<PendingBooking>>, Problem> {
    let email = match email {
        Some(it) => it,
        None => return Ok(Json(vec![])),
    };
    require_self(&auth, email)?;

    Ok(Json(db.list_bookings(email).await?))
}

/// Cancel an own pending booking
#[utoipa::path(
    responses(
        (status = 200, description = "Number of removed bookings", body = DeleteSummary),
        (status = 403, description = "Booking belongs to another user", body = Problem),
        (status = 404, description = "No booking with this id", body = Problem),
    ),
    security(("jwt" = []))
)]
#[delete("/booking/<id>")]
#[tracing::instrument(skip(db))]
pub async fn booking_delete(
    id: Uuid,
    auth: AuthToken,
    db: &State<Db>,
) -> Result<Json<DeleteSummary>, Problem> {
    let booking = db
        .get_booking(id)
        .await?
        .ok_or_else(|| booking_problem::not_found(id))?;

    if booking.student_email != auth.email {
        return Err(problems::forbidden("Booking belongs to a different user."));
    }

    Ok(Json(DeleteSummary {
        deleted_count: db.delete_booking(id).await?,
    }))
}

#[cfg(test)]
pub(crate) mod booking_endpoints {
    use rocket::http::{ContentType, Status};
    use serde_json::json;

    use crate::data::booking::db::BookingLedger;
    use crate::data::booking::{DeleteSummary, PendingBooking};
    use crate::data::class::db::ClassCatalog;
    use crate::data::class::{ClassCreateData, ClassOffering};
    use crate::route::testing::{bearer, TestApp};

    pub(crate) async fn class(app: &TestApp, seats: i64) -> ClassOffering {
        let class = ClassCreateData {
            name: "Climbing".to_string(),
            image: Some("wall.png".to_string()),
            instructor_name: Some("Teo".to_string()),
            price: 40.0,
            seats,
        }
        .into_offering("teach@x.com");
        app.store.insert_class(&class).await.unwrap();
        class
    }

    pub(crate) async fn book(app: &TestApp, student: &str, class: &ClassOffering) -> PendingBooking {
        let response = app
            .client
            .post("/booking")
            .header(ContentType::JSON)
            .header(bearer(student))
            .body(json!({ "classId": class.id }).to_string())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);
        response.into_json().await.unwrap()
    }

    #[rocket::async_test]
    async fn booking_snapshots_the_class() {
        let app = TestApp::new().await;
        let class = class(&app, 0).await;

        let booking = book(&app, "stu@x.com", &class).await;
        assert_eq!(booking.student_email, "stu@x.com");
        assert_eq!(booking.class_name, "Climbing");
        assert_eq!(booking.price, 40.0);

        let listed: Vec<PendingBooking> = app
            .client
            .get("/booking?email=stu@x.com")
            .header(bearer("stu@x.com"))
            .dispatch()
            .await
            .into_json()
            .await
            .unwrap();
        assert_eq!(listed, vec![booking]);
    }

    #[rocket::async_test]
    async fn listing_without_email_is_empty() {
        let app = TestApp::new().await;
        let class = class(&app, 3).await;
        book(&app, "stu@x.com", &class).await;

        let response = app
            .client
            .get("/booking")
            .header(bearer("stu@x.com"))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);
        assert_eq!(response.into_string().await.unwrap(), "[]");
    }

    #[rocket::async_test]
    async fn others_bookings_stay_private() {
        let app = TestApp::new().await;
        let class = class(&app, 3).await;
        let booking = book(&app, "stu@x.com", &class).await;

        let response = app
            .client
            .get("/booking?email=stu@x.com")
            .header(bearer("spy@x.com"))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Forbidden);

        let response = app
            .client
            .delete(format!("/booking/{}", booking.id))
            .header(bearer("spy@x.com"))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Forbidden);
        assert!(app.store.get_booking(booking.id).await.unwrap().is_some());

        let removed: DeleteSummary = app
            .client
            .delete(format!("/booking/{}", booking.id))
            .header(bearer("stu@x.com"))
            .dispatch()
            .await
            .into_json()
            .await
            .unwrap();
        assert_eq!(removed.deleted_count, 1);
    }

    #[rocket::async_test]
    async fn booking_a_missing_class_fails() {
        let app = TestApp::new().await;

        let response = app
            .client
            .post("/booking")
            .header(ContentType::JSON)
            .header(bearer("stu@x.com"))
            .body(json!({ "classId": uuid::Uuid::new_v4() }).to_string())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::NotFound);
        assert!(app.store.list_bookings("stu@x.com").await.unwrap().is_empty());
    }
}
