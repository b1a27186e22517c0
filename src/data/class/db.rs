use bson::{doc, Document};
use mongodb::options::{FindOneAndUpdateOptions, ReturnDocument};
use mongodb::{Collection, Database};
use rocket::futures::TryStreamExt;
use uuid::Uuid;

use super::{ClassOffering, ClassStatus, ClassUpdateData, SeatOutcome, CLASS_COLLECTION_NAME};
use crate::data::filter;
use crate::error::StoreError;

#[rocket::async_trait]
pub trait ClassCatalog: Send + Sync {
    async fn insert_class(&self, class: &ClassOffering) -> Result<(), StoreError>;

    /// All classes, optionally only those with `status`.
    async fn list_classes(
        &self,
        status: Option<ClassStatus>,
    ) -> Result<Vec<ClassOffering>, StoreError>;

    async fn list_classes_by_owner(&self, email: &str) -> Result<Vec<ClassOffering>, StoreError>;

    async fn get_class(&self, id: Uuid) -> Result<Option<ClassOffering>, StoreError>;

    async fn set_class_status(
        &self,
        id: Uuid,
        status: ClassStatus,
    ) -> Result<Option<ClassOffering>, StoreError>;

    async fn set_class_feedback(
        &self,
        id: Uuid,
        feedback: &str,
    ) -> Result<Option<ClassOffering>, StoreError>;

    /// Applies `update` to the class with `id` only if `owner` authored it.
    async fn update_class(
        &self,
        id: Uuid,
        owner: &str,
        update: &ClassUpdateData,
    ) -> Result<Option<ClassOffering>, StoreError>;

    /// Persists counters computed by the caller. Not atomic with the read that
    /// produced them.
    async fn write_enrollment(
        &self,
        id: Uuid,
        seats: i64,
        total_students: i64,
    ) -> Result<Option<ClassOffering>, StoreError>;

    /// Takes one seat if any is left, in a single store operation.
    async fn take_seat(&self, id: Uuid) -> Result<SeatOutcome, StoreError>;

    /// Undoes [`ClassCatalog::take_seat`].
    async fn release_seat(&self, id: Uuid) -> Result<Option<ClassOffering>, StoreError>;
}

fn classes(db: &Database) -> Collection<ClassOffering> {
    db.collection::<ClassOffering>(CLASS_COLLECTION_NAME)
}

fn return_after() -> FindOneAndUpdateOptions {
    FindOneAndUpdateOptions::builder()
        .return_document(ReturnDocument::After)
        .build()
}

async fn set_fields(
    db: &Database,
    query: Document,
    fields: Document,
) -> Result<Option<ClassOffering>, StoreError> {
    Ok(classes(db)
        .find_one_and_update(query, doc! { "$set": fields }, return_after())
        .await?)
}

#[rocket::async_trait]
impl ClassCatalog for Database {
    async fn insert_class(&self, class: &ClassOffering) -> Result<(), StoreError> {
        classes(self).insert_one(class, None).await?;
        Ok(())
    }

    async fn list_classes(
        &self,
        status: Option<ClassStatus>,
    ) -> Result<Vec<ClassOffering>, StoreError> {
        let query = match status {
            Some(status) => Some(doc! { "status": bson::to_bson(&status)? }),
            None => None,
        };
        let cursor = classes(self).find(query, None).await?;
        Ok(cursor.try_collect().await?)
    }

    async fn list_classes_by_owner(&self, email: &str) -> Result<Vec<ClassOffering>, StoreError> {
        let cursor = classes(self)
            .find(doc! { "instructorEmail": email }, None)
            .await?;
        Ok(cursor.try_collect().await?)
    }

    async fn get_class(&self, id: Uuid) -> Result<Option<ClassOffering>, StoreError> {
        Ok(classes(self).find_one(filter::by_id(id), None).await?)
    }

    async fn set_class_status(
        &self,
        id: Uuid,
        status: ClassStatus,
    ) -> Result<Option<ClassOffering>, StoreError> {
        set_fields(
            self,
            filter::by_id(id),
            doc! { "status": bson::to_bson(&status)? },
        )
        .await
    }

    async fn set_class_feedback(
        &self,
        id: Uuid,
        feedback: &str,
    ) -> Result<Option<ClassOffering>, StoreError> {
        set_fields(self, filter::by_id(id), doc! { "feedback": feedback }).await
    }

    async fn update_class(
        &self,
        id: Uuid,
        owner: &str,
        update: &ClassUpdateData,
    ) -> Result<Option<ClassOffering>, StoreError> {
        let mut query = filter::by_id(id);
        query.insert("instructorEmail", owner);

        if update.is_empty() {
            return Ok(classes(self).find_one(query, None).await?);
        }
        set_fields(self, query, bson::to_document(update)?).await
    }

    async fn write_enrollment(
        &self,
        id: Uuid,
        seats: i64,
        total_students: i64,
    ) -> Result<Option<ClassOffering>, StoreError> {
        set_fields(
            self,
            filter::by_id(id),
            doc! { "seats": seats, "totalStudents": total_students },
        )
        .await
    }

    async fn take_seat(&self, id: Uuid) -> Result<SeatOutcome, StoreError> {
        let mut query = filter::by_id(id);
        query.insert("seats", doc! { "$gt": 0_i64 });

        let taken = classes(self)
            .find_one_and_update(
                query,
                doc! { "$inc": { "seats": -1_i64, "totalStudents": 1_i64 } },
                return_after(),
            )
            .await?;

        if let Some(class) = taken {
            return Ok(SeatOutcome::Taken(class));
        }
        Ok(match self.get_class(id).await? {
            Some(_) => SeatOutcome::Full,
            None => SeatOutcome::Missing,
        })
    }

    async fn release_seat(&self, id: Uuid) -> Result<Option<ClassOffering>, StoreError> {
        Ok(classes(self)
            .find_one_and_update(
                filter::by_id(id),
                doc! { "$inc": { "seats": 1_i64, "totalStudents": -1_i64 } },
                return_after(),
            )
            .await?)
    }
}
