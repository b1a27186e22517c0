use rocket::serde::json::Json;
use rocket::State;

use crate::config::Config;
use crate::data::booking::problem as booking_problem;
use crate::data::booking::workflow::{check_submission, complete_payment, PaymentCompletion};
use crate::data::booking::{ClassPaymentStat, PaymentRecord, PaymentSubmission};
use crate::data::Db;
use crate::payment::{to_minor_units, IntentRequest, IntentResponse, Payments};
use crate::resp::guard::{require_self, AdminGate};
use crate::resp::jwt::AuthToken;
use crate::resp::problem::Problem;

/// Payment history of the caller, newest first
#[utoipa::path(
    responses(
        (status = 200, description = "Payments", body = Vec<PaymentRecord>),
        (status = 403, description = "Email isn't the caller's", body = Problem),
    ),
    security(("jwt" = []))
)]
#[get("/payment/<email>")]
#[tracing::instrument(skip(db))]
pub async fn payment_history(
    email: &str,
    auth: AuthToken,
    db: &State<Db>,
) -> Result<Json<Vec<PaymentRecord>>, Problem> {
    require_self(&auth, email)?;
    Ok(Json(db.list_payments(email).await?))
}

/// Start a card payment for `price` and hand the client secret to the browser
#[utoipa::path(
    request_body = IntentRequest,
    responses(
        (status = 200, description = "Client secret of the payment intent", body = IntentResponse),
        (status = 400, description = "Unusable price", body = Problem),
        (status = 502, description = "Payment processor failure", body = Problem),
        (status = 503, description = "Payments aren't configured", body = Problem),
    ),
    security(("jwt" = []))
)]
#[post("/create-payment-intent", data = "<intent>")]
#[tracing::instrument(skip(payments))]
pub async fn payment_intent_create(
    intent: Json<IntentRequest>,
    _auth: AuthToken,
    payments: &State<Payments>,
) -> Result<Json<IntentResponse>, Problem> {
    let amount = to_minor_units(intent.price)?;
    let created = payments.create_payment_intent(amount).await?;

    Ok(Json(IntentResponse {
        client_secret: created.client_secret,
    }))
}

/// Record a successful payment and turn the booking into an enrollment
#[utoipa::path(
    request_body = PaymentSubmission,
    responses(
        (status = 200, description = "Payment, removed booking and updated class", body = PaymentCompletion),
        (status = 403, description = "Booking belongs to another user", body = Problem),
        (status = 404, description = "Booking or class doesn't exist", body = Problem),
        (status = 409, description = "Class has no seats left", body = Problem),
    ),
    security(("jwt" = []))
)]
#[post("/paymentBookings", data = "<submission>")]
#[tracing::instrument(skip(db, config))]
pub async fn payment_complete(
    submission: Json<PaymentSubmission>,
    auth: AuthToken,
    db: &State<Db>,
    config: &State<Config>,
) -> Result<Json<PaymentCompletion>, Problem> {
    let booking = db
        .get_booking(submission.booking_id)
        .await?
        .ok_or_else(|| booking_problem::not_found(submission.booking_id))?;
    check_submission(&auth.email, &booking, &submission)?;

    let completion =
        complete_payment(db.inner().as_ref(), &booking, &submission, config.seat_adjustment).await?;
    Ok(Json(completion))
}

/// Payment count and revenue per class, most paid first
#[utoipa::path(
    responses(
        (status = 200, description = "Per-class statistics", body = Vec<ClassPaymentStat>),
        (status = 403, description = "Caller isn't an admin", body = Problem),
    ),
    security(("jwt" = []))
)]
#[get("/order-stat")]
#[tracing::instrument(skip(db))]
pub async fn order_stat(
    _gate: AdminGate,
    db: &State<Db>,
) -> Result<Json<Vec<ClassPaymentStat>>, Problem> {
    Ok(Json(db.payment_stats().await?))
}
