use bson::doc;
use mongodb::options::FindOptions;
use mongodb::{Collection, Database};
use rocket::futures::TryStreamExt;
use uuid::Uuid;

use super::{
    ClassPaymentStat, PaymentRecord, PendingBooking, BOOKING_COLLECTION_NAME,
    PAYMENT_COLLECTION_NAME,
};
use crate::data::filter;
use crate::error::StoreError;

#[rocket::async_trait]
pub trait BookingLedger: Send + Sync {
    async fn insert_booking(&self, booking: &PendingBooking) -> Result<(), StoreError>;

    async fn list_bookings(&self, student_email: &str) -> Result<Vec<PendingBooking>, StoreError>;

    async fn get_booking(&self, id: Uuid) -> Result<Option<PendingBooking>, StoreError>;

    /// Returns the number of removed bookings.
    async fn delete_booking(&self, id: Uuid) -> Result<u64, StoreError>;

    async fn insert_payment(&self, payment: &PaymentRecord) -> Result<(), StoreError>;

    /// Payments of a student, newest first.
    async fn list_payments(&self, student_email: &str) -> Result<Vec<PaymentRecord>, StoreError>;

    /// Payment count and revenue per class, most paid first.
    async fn payment_stats(&self) -> Result<Vec<ClassPaymentStat>, StoreError>;
}

fn bookings(db: &Database) -> Collection<PendingBooking> {
    db.collection::<PendingBooking>(BOOKING_COLLECTION_NAME)
}

fn payments(db: &Database) -> Collection<PaymentRecord> {
    db.collection::<PaymentRecord>(PAYMENT_COLLECTION_NAME)
}

#[rocket::async_trait]
impl BookingLedger for Database {
    async fn insert_booking(&self, booking: &PendingBooking) -> Result<(), StoreError> {
        bookings(self).insert_one(booking, None).await?;
        Ok(())
    }

    async fn list_bookings(&self, student_email: &str) -> Result<Vec<PendingBooking>, StoreError> {
        let cursor = bookings(self)
            .find(doc! { "studentEmail": student_email }, None)
            .await?;
        Ok(cursor.try_collect().await?)
    }

    async fn get_booking(&self, id: Uuid) -> Result<Option<PendingBooking>, StoreError> {
        Ok(bookings(self).find_one(filter::by_id(id), None).await?)
    }

    async fn delete_booking(&self, id: Uuid) -> Result<u64, StoreError> {
        let result = bookings(self).delete_one(filter::by_id(id), None).await?;
        Ok(result.deleted_count)
    }

    async fn insert_payment(&self, payment: &PaymentRecord) -> Result<(), StoreError> {
        payments(self).insert_one(payment, None).await?;
        Ok(())
    }

    async fn list_payments(&self, student_email: &str) -> Result<Vec<PaymentRecord>, StoreError> {
        let options = FindOptions::builder().sort(doc! { "paidAt": -1 }).build();
        let cursor = payments(self)
            .find(doc! { "studentEmail": student_email }, options)
            .await?;
        Ok(cursor.try_collect().await?)
    }

    async fn payment_stats(&self) -> Result<Vec<ClassPaymentStat>, StoreError> {
        let pipeline = [
            doc! {
                "$group": {
                    "_id": "$classId",
                    "className": { "$first": "$className" },
                    "count": { "$sum": 1_i64 },
                    "revenue": { "$sum": "$price" },
                }
            },
            doc! { "$sort": { "count": -1, "className": 1 } },
            doc! {
                "$project": {
                    "_id": 0,
                    "classId": "$_id",
                    "className": 1,
                    "count": 1,
                    "revenue": 1,
                }
            },
        ];

        let documents: Vec<bson::Document> = payments(self)
            .aggregate(pipeline, None)
            .await?
            .try_collect()
            .await?;

        let stats = documents
            .into_iter()
            .map(bson::from_document::<ClassPaymentStat>)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(stats)
    }
}
