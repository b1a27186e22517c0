use rocket::http::Method;
use rocket::serde::json::Json;
use rocket::{Build, Rocket, Route};
use utoipa::OpenApi;

pub mod auth;
pub mod booking;
pub mod class;
pub mod payment;
pub mod users;

use auth::*;
use booking::*;
use class::*;
use payment::*;
use users::*;

use crate::data::booking::workflow::PaymentCompletion;
use crate::data::booking::{
    BookingCreateData, ClassPaymentStat, DeleteSummary, PaymentRecord, PaymentSubmission,
    PendingBooking,
};
use crate::data::class::{ClassCreateData, ClassOffering, ClassStatus, ClassUpdateData, FeedbackData};
use crate::data::user::{AdminCheck, InstructorCheck, UpsertSummary, User};
use crate::payment::{IntentRequest, IntentResponse};
use crate::resp::{jwt::doc::JWTAuth, problem::Problem};
use crate::role::Role;

/// Who may call a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Public,
    /// Any caller with a valid token.
    Authenticated,
    /// Token email must match the email in the path or query.
    OwnEmail,
    Admin,
    Instructor,
    /// Instructor acting on their own email.
    InstructorOwnEmail,
}

/// Access rule of every mounted route. Enforced by the guards in each
/// handler's signature.
pub static ACCESS_POLICY: &[(Method, &str, Access)] = &[
    (Method::Get, "/", Access::Public),
    (Method::Get, "/openapi.json", Access::Public),
    (Method::Post, "/jwt", Access::Public),
    (Method::Put, "/users/<email>", Access::Public),
    (Method::Get, "/users", Access::Admin),
    (Method::Get, "/users/<email>", Access::Authenticated),
    (Method::Get, "/users/admin/<email>", Access::OwnEmail),
    (Method::Get, "/users/instructor/<email>", Access::OwnEmail),
    (Method::Patch, "/users/admin/<id>", Access::Admin),
    (Method::Patch, "/users/instructor/<id>", Access::Admin),
    (Method::Get, "/instructor", Access::Public),
    (Method::Post, "/add-class", Access::Instructor),
    (Method::Get, "/classes?<status>", Access::Public),
    (Method::Get, "/classes/<email>", Access::InstructorOwnEmail),
    (Method::Get, "/class/<id>", Access::Public),
    (Method::Patch, "/update/<id>", Access::Instructor),
    (Method::Patch, "/classes/update/<id>", Access::Admin),
    (Method::Patch, "/classes/deny/<id>", Access::Admin),
    (Method::Patch, "/classes/feedback/<id>", Access::Admin),
    (Method::Post, "/booking", Access::Authenticated),
    (Method::Get, "/booking?<email>", Access::OwnEmail),
    (Method::Delete, "/booking/<id>", Access::Authenticated),
    (Method::Get, "/payment/<email>", Access::OwnEmail),
    (Method::Post, "/create-payment-intent", Access::Authenticated),
    (Method::Post, "/paymentBookings", Access::Authenticated),
    (Method::Get, "/order-stat", Access::Admin),
];

#[derive(OpenApi)]
#[openapi(
    paths(
        token_issue,
        user_upsert,
        user_list,
        user_get,
        user_is_admin,
        user_is_instructor,
        user_make_admin,
        user_make_instructor,
        instructor_list,
        class_create,
        class_list,
        class_list_own,
        class_get,
        class_update,
        class_approve,
        class_deny,
        class_feedback,
        booking_create,
        booking_list,
        booking_delete,
        payment_history,
        payment_intent_create,
        payment_complete,
        order_stat
    ),
    components(schemas(
        Role,
        User,
        UpsertSummary,
        AdminCheck,
        InstructorCheck,
        TokenResponse,
        ClassStatus,
        ClassOffering,
        ClassCreateData,
        ClassUpdateData,
        FeedbackData,
        PendingBooking,
        BookingCreateData,
        DeleteSummary,
        PaymentRecord,
        PaymentSubmission,
        PaymentCompletion,
        ClassPaymentStat,
        IntentRequest,
        IntentResponse,
        Problem
    )),
    modifiers(&JWTAuth)
)]
pub struct ApiDoc;

#[get("/")]
pub fn index() -> &'static str {
    "sportZone Server is running.."
}

#[get("/openapi.json")]
pub fn openapi() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

pub fn api() -> Vec<Route> {
    routes![
        index,
        openapi,
        token_issue,
        user_upsert,
        user_list,
        user_get,
        user_is_admin,
        user_is_instructor,
        user_make_admin,
        user_make_instructor,
        instructor_list,
        class_create,
        class_list,
        class_list_own,
        class_get,
        class_update,
        class_approve,
        class_deny,
        class_feedback,
        booking_create,
        booking_list,
        booking_delete,
        payment_history,
        payment_intent_create,
        payment_complete,
        order_stat
    ]
}

pub fn mount_api(rocket: Rocket<Build>) -> Rocket<Build> {
    rocket.mount("/", api())
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use rocket::http::{ContentType, Status};

    fn concrete(uri: &str) -> String {
        let path = uri.split('?').next().unwrap_or(uri);
        path.replace("<email>", "someone@x.com")
            .replace("<id>", "7f3b6a10-0a55-4b43-9c59-6c1f3c1d2e11")
    }

    #[test]
    fn every_mounted_route_has_an_access_rule() {
        let routes = api();
        assert_eq!(routes.len(), ACCESS_POLICY.len());

        for route in &routes {
            let uri = route.uri.to_string();
            assert!(
                ACCESS_POLICY
                    .iter()
                    .any(|(method, path, _)| *method == route.method && *path == uri),
                "no access rule for {} {}",
                route.method,
                uri
            );
        }
    }

    #[rocket::async_test]
    async fn guarded_routes_reject_anonymous_callers() {
        let app = TestApp::new().await;

        for (method, uri, access) in ACCESS_POLICY {
            if *access == Access::Public {
                continue;
            }
            let response = app
                .client
                .req(*method, concrete(uri))
                .header(ContentType::JSON)
                .dispatch()
                .await;

            assert_eq!(
                response.status(),
                Status::Unauthorized,
                "{} {} accepted an anonymous caller",
                method,
                uri
            );
            assert_eq!(
                response.content_type(),
                Some(ContentType::new("application", "problem+json"))
            );
        }
    }

    #[rocket::async_test]
    async fn index_and_openapi_are_public() {
        let app = TestApp::new().await;

        let response = app.client.get("/").dispatch().await;
        assert_eq!(response.status(), Status::Ok);
        assert_eq!(
            response.into_string().await.unwrap(),
            "sportZone Server is running.."
        );

        let response = app.client.get("/openapi.json").dispatch().await;
        assert_eq!(response.status(), Status::Ok);
        let doc: serde_json::Value = response.into_json().await.unwrap();
        assert!(doc["paths"]["/paymentBookings"].is_object());
    }

    #[rocket::async_test]
    async fn unknown_routes_render_problems() {
        let app = TestApp::new().await;
        let response = app.client.get("/nothing/here").dispatch().await;

        assert_eq!(response.status(), Status::NotFound);
        let body: serde_json::Value = response.into_json().await.unwrap();
        assert_eq!(body["status"], 404);
    }
}
