//! Process-local store with the same semantics as the MongoDB collections.
//!
//! Each trait method suspends once, like a database round trip, and then holds
//! the lock for the duration of one operation. That mirrors MongoDB's
//! single-document atomicity and nothing more: concurrent callers interleave
//! between operations.

use std::sync::{Mutex, MutexGuard, PoisonError};

use serde_json::{Map, Value};
use uuid::Uuid;

use super::booking::db::BookingLedger;
use super::booking::{ClassPaymentStat, PaymentRecord, PendingBooking};
use super::class::db::ClassCatalog;
use super::class::{ClassOffering, ClassStatus, ClassUpdateData, SeatOutcome};
use super::user::db::UserDirectory;
use super::user::{UpsertSummary, User};
use crate::error::StoreError;
use crate::role::Role;

#[derive(Debug, Default)]
struct Tables {
    users: Vec<User>,
    classes: Vec<ClassOffering>,
    bookings: Vec<PendingBooking>,
    payments: Vec<PaymentRecord>,
}

async fn round_trip() {
    tokio::task::yield_now().await;
}

/// Newest first; ties keep insertion order.
fn sort_newest_first(payments: &mut [PaymentRecord]) {
    payments.sort_by(|a, b| b.paid_at.cmp(&a.paid_at));
}

fn sort_most_paid_first(stats: &mut [ClassPaymentStat]) {
    stats.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.class_name.cmp(&b.class_name)));
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn modify_class(
        &self,
        id: Uuid,
        f: impl FnOnce(&mut ClassOffering),
    ) -> Option<ClassOffering> {
        let mut tables = self.tables();
        let class = tables.classes.iter_mut().find(|it| it.id == id)?;
        f(class);
        Some(class.clone())
    }
}

#[rocket::async_trait]
impl UserDirectory for MemoryStore {
    async fn upsert_user(
        &self,
        email: &str,
        fields: Map<String, Value>,
    ) -> Result<UpsertSummary, StoreError> {
        round_trip().await;
        let mut tables = self.tables();

        if let Some(user) = tables.users.iter_mut().find(|it| it.email == email) {
            let mut modified = false;
            for (key, value) in fields {
                if user.profile.get(&key) != Some(&value) {
                    user.profile.insert(key, value);
                    modified = true;
                }
            }
            return Ok(UpsertSummary {
                matched_count: 1,
                modified_count: modified as u64,
                upserted_id: None,
            });
        }

        let user = User::new(email, fields);
        let id = user.id;
        tables.users.push(user);
        Ok(UpsertSummary {
            matched_count: 0,
            modified_count: 0,
            upserted_id: Some(id),
        })
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        round_trip().await;
        Ok(self.tables().users.iter().find(|it| it.email == email).cloned())
    }

    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        round_trip().await;
        Ok(self.tables().users.clone())
    }

    async fn list_users_by_role(&self, role: Role) -> Result<Vec<User>, StoreError> {
        round_trip().await;
        Ok(self
            .tables()
            .users
            .iter()
            .filter(|it| it.role == role)
            .cloned()
            .collect())
    }

    async fn set_role(&self, id: Uuid, role: Role) -> Result<Option<User>, StoreError> {
        round_trip().await;
        let mut tables = self.tables();
        Ok(tables.users.iter_mut().find(|it| it.id == id).map(|user| {
            user.role = role;
            user.clone()
        }))
    }
}

#[rocket::async_trait]
impl ClassCatalog for MemoryStore {
    async fn insert_class(&self, class: &ClassOffering) -> Result<(), StoreError> {
        round_trip().await;
        self.tables().classes.push(class.clone());
        Ok(())
    }

    async fn list_classes(
        &self,
        status: Option<ClassStatus>,
    ) -> Result<Vec<ClassOffering>, StoreError> {
        round_trip().await;
        Ok(self
            .tables()
            .classes
            .iter()
            .filter(|it| status.map_or(true, |status| it.status == status))
            .cloned()
            .collect())
    }

    async fn list_classes_by_owner(&self, email: &str) -> Result<Vec<ClassOffering>, StoreError> {
        round_trip().await;
        Ok(self
            .tables()
            .classes
            .iter()
            .filter(|it| it.instructor_email == email)
            .cloned()
            .collect())
    }

    async fn get_class(&self, id: Uuid) -> Result<Option<ClassOffering>, StoreError> {
        round_trip().await;
        Ok(self.tables().classes.iter().find(|it| it.id == id).cloned())
    }

    async fn set_class_status(
        &self,
        id: Uuid,
        status: ClassStatus,
    ) -> Result<Option<ClassOffering>, StoreError> {
        round_trip().await;
        Ok(self.modify_class(id, |class| class.status = status))
    }

    async fn set_class_feedback(
        &self,
        id: Uuid,
        feedback: &str,
    ) -> Result<Option<ClassOffering>, StoreError> {
        round_trip().await;
        Ok(self.modify_class(id, |class| class.feedback = Some(feedback.to_string())))
    }

    async fn update_class(
        &self,
        id: Uuid,
        owner: &str,
        update: &ClassUpdateData,
    ) -> Result<Option<ClassOffering>, StoreError> {
        round_trip().await;
        let mut tables = self.tables();
        Ok(tables
            .classes
            .iter_mut()
            .find(|it| it.id == id && it.instructor_email == owner)
            .map(|class| {
                update.apply(class);
                class.clone()
            }))
    }

    async fn write_enrollment(
        &self,
        id: Uuid,
        seats: i64,
        total_students: i64,
    ) -> Result<Option<ClassOffering>, StoreError> {
        round_trip().await;
        Ok(self.modify_class(id, |class| {
            class.seats = seats;
            class.total_students = total_students;
        }))
    }

    async fn take_seat(&self, id: Uuid) -> Result<SeatOutcome, StoreError> {
        round_trip().await;
        let mut tables = self.tables();
        let class = match tables.classes.iter_mut().find(|it| it.id == id) {
            Some(class) => class,
            None => return Ok(SeatOutcome::Missing),
        };

        if class.seats <= 0 {
            return Ok(SeatOutcome::Full);
        }
        class.seats -= 1;
        class.total_students += 1;
        Ok(SeatOutcome::Taken(class.clone()))
    }

    async fn release_seat(&self, id: Uuid) -> Result<Option<ClassOffering>, StoreError> {
        round_trip().await;
        Ok(self.modify_class(id, |class| {
            class.seats += 1;
            class.total_students -= 1;
        }))
    }
}

#[rocket::async_trait]
impl BookingLedger for MemoryStore {
    async fn insert_booking(&self, booking: &PendingBooking) -> Result<(), StoreError> {
        round_trip().await;
        self.tables().bookings.push(booking.clone());
        Ok(())
    }

    async fn list_bookings(&self, student_email: &str) -> Result<Vec<PendingBooking>, StoreError> {
        round_trip().await;
        Ok(self
            .tables()
            .bookings
            .iter()
            .filter(|it| it.student_email == student_email)
            .cloned()
            .collect())
    }

    async fn get_booking(&self, id: Uuid) -> Result<Option<PendingBooking>, StoreError> {
        round_trip().await;
        Ok(self.tables().bookings.iter().find(|it| it.id == id).cloned())
    }

    async fn delete_booking(&self, id: Uuid) -> Result<u64, StoreError> {
        round_trip().await;
        let mut tables = self.tables();
        let before = tables.bookings.len();
        tables.bookings.retain(|it| it.id != id);
        Ok((before - tables.bookings.len()) as u64)
    }

    async fn insert_payment(&self, payment: &PaymentRecord) -> Result<(), StoreError> {
        round_trip().await;
        self.tables().payments.push(payment.clone());
        Ok(())
    }

    async fn list_payments(&self, student_email: &str) -> Result<Vec<PaymentRecord>, StoreError> {
        round_trip().await;
        let mut records: Vec<PaymentRecord> = self
            .tables()
            .payments
            .iter()
            .filter(|it| it.student_email == student_email)
            .cloned()
            .collect();
        sort_newest_first(&mut records);
        Ok(records)
    }

    async fn payment_stats(&self) -> Result<Vec<ClassPaymentStat>, StoreError> {
        round_trip().await;
        let tables = self.tables();
        let mut stats: Vec<ClassPaymentStat> = Vec::new();

        for payment in &tables.payments {
            match stats.iter_mut().find(|it| it.class_id == payment.class_id) {
                Some(stat) => {
                    stat.count += 1;
                    stat.revenue += payment.price;
                }
                None => stats.push(ClassPaymentStat {
                    class_id: payment.class_id,
                    class_name: payment.class_name.clone(),
                    count: 1,
                    revenue: payment.price,
                }),
            }
        }

        sort_most_paid_first(&mut stats);
        Ok(stats)
    }
}
