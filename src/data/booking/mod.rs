use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::data::class::ClassOffering;

pub mod db;
pub mod workflow;

pub static BOOKING_COLLECTION_NAME: &str = "bookedClass";
pub static PAYMENT_COLLECTION_NAME: &str = "payments";

/// A student's reservation of a class, waiting for payment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PendingBooking {
    #[serde(rename = "_id", with = "crate::data::bson_uuid")]
    pub id: Uuid,
    pub student_email: String,
    #[serde(with = "crate::data::bson_uuid")]
    pub class_id: Uuid,
    pub class_name: String,
    #[serde(default)]
    pub instructor_email: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
    pub price: f64,
    #[serde(default = "Utc::now", with = "crate::util::date_time_as_fixed_rfc3339")]
    pub booked_at: DateTime<Utc>,
}

impl PendingBooking {
    pub fn new(student_email: impl ToString, class: &ClassOffering) -> PendingBooking {
        PendingBooking {
            id: Uuid::new_v4(),
            student_email: student_email.to_string(),
            class_id: class.id,
            class_name: class.name.clone(),
            instructor_email: Some(class.instructor_email.clone()),
            image: class.image.clone(),
            price: class.price,
            booked_at: Utc::now(),
        }
    }
}

/// Append-only record of a completed payment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRecord {
    #[serde(rename = "_id", with = "crate::data::bson_uuid")]
    pub id: Uuid,
    pub student_email: String,
    #[serde(with = "crate::data::bson_uuid")]
    pub class_id: Uuid,
    pub class_name: String,
    #[serde(with = "crate::data::bson_uuid")]
    pub booking_id: Uuid,
    pub transaction_id: String,
    pub price: f64,
    #[serde(with = "crate::util::date_time_as_fixed_rfc3339")]
    pub paid_at: DateTime<Utc>,
}

impl PaymentRecord {
    /// The recorded price is always the booked one.
    pub fn for_booking(booking: &PendingBooking, submission: &PaymentSubmission) -> PaymentRecord {
        PaymentRecord {
            id: Uuid::new_v4(),
            student_email: booking.student_email.clone(),
            class_id: booking.class_id,
            class_name: booking.class_name.clone(),
            booking_id: booking.id,
            transaction_id: submission.transaction_id.clone(),
            price: booking.price,
            paid_at: Utc::now(),
        }
    }
}

/// Body of `POST /booking`.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BookingCreateData {
    pub class_id: Uuid,
}

/// Body of `POST /paymentBookings`, sent once the payment intent succeeded.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PaymentSubmission {
    pub booking_id: Uuid,
    pub transaction_id: String,
    /// Amount charged; must equal the booked price when present.
    #[serde(default)]
    pub price: Option<f64>,
}

/// Result of `DELETE /booking/<id>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeleteSummary {
    pub deleted_count: u64,
}

/// Payment count and revenue of one class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClassPaymentStat {
    #[serde(with = "crate::data::bson_uuid")]
    pub class_id: Uuid,
    pub class_name: String,
    pub count: i64,
    pub revenue: f64,
}

pub mod problem {
    use crate::resp::problem::Problem;
    use rocket::http::Status;
    use uuid::Uuid;

    #[inline]
    pub fn not_found(id: Uuid) -> Problem {
        Problem::new_untyped(Status::NotFound, "Booking doesn't exist.")
            .insert_str("id", id)
            .clone()
    }

    #[inline]
    pub fn already_completed(id: Uuid) -> Problem {
        Problem::new_untyped(Status::NotFound, "Booking doesn't exist.")
            .detail("Booking was already paid or cancelled.")
            .insert_str("id", id)
            .clone()
    }

    #[inline]
    pub fn bad_payment(detail: impl ToString) -> Problem {
        Problem::new_untyped(Status::BadRequest, "Bad payment data.")
            .detail(detail)
            .clone()
    }
}
