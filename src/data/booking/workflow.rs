//! Moves a pending booking to a paid enrollment.
//!
//! The steps span the payment records, the booking collection and the class
//! counters without a transaction. [`SeatAdjustment::Atomic`] claims the
//! booking by deleting it, then reserves the seat with a conditional
//! decrement, so a booking completes at most once and a full class never
//! accepts a payment. Failed steps put the booking and the seat back.
//! [`SeatAdjustment::ReadModifyWrite`] keeps the historical order (payment,
//! booking removal, then a read-then-write of the counters).

use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

use super::{problem as booking_problem, PaymentRecord, PaymentSubmission, PendingBooking};
use crate::config::SeatAdjustment;
use crate::data::class::{problem as class_problem, ClassOffering, SeatOutcome};
use crate::data::Store;
use crate::error::StoreError;
use crate::resp::problem::Problem;

#[derive(Debug, Error)]
pub enum EnrollError {
    #[error("booking {0} was already completed or cancelled")]
    BookingGone(Uuid),
    #[error("class {0} doesn't exist")]
    ClassMissing(Uuid),
    #[error("class {0} has no seats left")]
    ClassFull(Uuid),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<EnrollError> for Problem {
    fn from(e: EnrollError) -> Self {
        match e {
            EnrollError::BookingGone(id) => booking_problem::already_completed(id),
            EnrollError::ClassMissing(id) => class_problem::not_found(id),
            EnrollError::ClassFull(id) => class_problem::class_full(id),
            EnrollError::Store(e) => Problem::from(e),
        }
    }
}

/// Everything the completion touched.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PaymentCompletion {
    pub payment: PaymentRecord,
    pub removed_booking: Uuid,
    pub class: ClassOffering,
}

pub async fn complete_payment(
    db: &dyn Store,
    booking: &PendingBooking,
    submission: &PaymentSubmission,
    adjustment: SeatAdjustment,
) -> Result<PaymentCompletion, EnrollError> {
    let payment = PaymentRecord::for_booking(booking, submission);

    let completion = match adjustment {
        SeatAdjustment::Atomic => complete_atomic(db, booking, payment).await,
        SeatAdjustment::ReadModifyWrite => complete_read_modify_write(db, booking, payment).await,
    }?;

    tracing::info!(
        "{} paid {} for class {} ({} seats left)",
        booking.student_email,
        completion.payment.price,
        completion.class.id,
        completion.class.seats
    );
    Ok(completion)
}

async fn complete_atomic(
    db: &dyn Store,
    booking: &PendingBooking,
    payment: PaymentRecord,
) -> Result<PaymentCompletion, EnrollError> {
    if db.delete_booking(booking.id).await? == 0 {
        return Err(EnrollError::BookingGone(booking.id));
    }

    let seat = match db.take_seat(booking.class_id).await {
        Ok(SeatOutcome::Taken(class)) => Ok(class),
        Ok(SeatOutcome::Full) => Err(EnrollError::ClassFull(booking.class_id)),
        Ok(SeatOutcome::Missing) => Err(EnrollError::ClassMissing(booking.class_id)),
        Err(e) => Err(e.into()),
    };
    let class = match seat {
        Ok(class) => class,
        Err(e) => {
            restore_booking(db, booking).await;
            return Err(e);
        }
    };

    if let Err(e) = db.insert_payment(&payment).await {
        tracing::error!("payment insert failed, releasing seat of {}: {}", class.id, e);
        if let Err(release) = db.release_seat(class.id).await {
            tracing::error!("unable to release seat of {}: {}", class.id, release);
        }
        restore_booking(db, booking).await;
        return Err(e.into());
    }

    Ok(PaymentCompletion {
        payment,
        removed_booking: booking.id,
        class,
    })
}

async fn restore_booking(db: &dyn Store, booking: &PendingBooking) {
    if let Err(e) = db.insert_booking(booking).await {
        tracing::error!("unable to restore booking {}: {}", booking.id, e);
    }
}

async fn complete_read_modify_write(
    db: &dyn Store,
    booking: &PendingBooking,
    payment: PaymentRecord,
) -> Result<PaymentCompletion, EnrollError> {
    db.insert_payment(&payment).await?;
    db.delete_booking(booking.id).await?;

    let current = match db.get_class(booking.class_id).await? {
        Some(class) => class,
        None => {
            tracing::warn!(
                "payment {} recorded for missing class {}",
                payment.id,
                booking.class_id
            );
            return Err(EnrollError::ClassMissing(booking.class_id));
        }
    };

    let seats = current.seats - 1;
    let total_students = current.total_students + 1;

    let class = db
        .write_enrollment(current.id, seats, total_students)
        .await?
        .ok_or(EnrollError::ClassMissing(current.id))?;

    Ok(PaymentCompletion {
        payment,
        removed_booking: booking.id,
        class,
    })
}

/// Checks a submission against the booking it completes.
pub fn check_submission(
    caller: &str,
    booking: &PendingBooking,
    submission: &PaymentSubmission,
) -> Result<(), Problem> {
    if booking.student_email != caller {
        return Err(crate::resp::problem::problems::forbidden(
            "Booking belongs to a different user.",
        ));
    }
    if submission.transaction_id.trim().is_empty() {
        return Err(booking_problem::bad_payment("Missing transaction id."));
    }
    if matches!(submission.price, Some(price) if price != booking.price) {
        return Err(booking_problem::bad_payment(
            "Price doesn't match the booked price.",
        ));
    }
    Ok(())
}
