use bson::{doc, Document};
use mongodb::options::{FindOneAndUpdateOptions, ReturnDocument, UpdateOptions};
use mongodb::Database;
use rocket::futures::TryStreamExt;
use serde_json::{Map, Value};
use uuid::Uuid;

use super::{UpsertSummary, User, USER_COLLECTION_NAME};
use crate::data::filter;
use crate::error::StoreError;
use crate::role::Role;

/// Outcome of a role promotion.
#[derive(Debug, Clone, PartialEq)]
pub enum Promotion {
    Promoted(User),
    TargetMissing,
    /// The caller lost (or never had) the admin role by the time of the write.
    CallerNotAdmin,
}

#[rocket::async_trait]
pub trait UserDirectory: Send + Sync {
    /// Creates the user if absent and merges `fields` into its profile.
    async fn upsert_user(
        &self,
        email: &str,
        fields: Map<String, Value>,
    ) -> Result<UpsertSummary, StoreError>;

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    async fn list_users(&self) -> Result<Vec<User>, StoreError>;

    async fn list_users_by_role(&self, role: Role) -> Result<Vec<User>, StoreError>;

    /// Overwrites the role; returns the updated user.
    async fn set_role(&self, id: Uuid, role: Role) -> Result<Option<User>, StoreError>;

    async fn has_role(&self, email: &str, role: Role) -> Result<bool, StoreError> {
        Ok(self
            .find_user_by_email(email)
            .await?
            .map(|user| user.role == role)
            .unwrap_or(false))
    }

    /// Re-reads the caller right before the write so a promotion never relies
    /// only on a check made earlier in the request.
    async fn promote(&self, caller: &str, id: Uuid, role: Role) -> Result<Promotion, StoreError> {
        if !self.has_role(caller, Role::Admin).await? {
            tracing::warn!("refused role change of {} by non-admin {}", id, caller);
            return Ok(Promotion::CallerNotAdmin);
        }

        match self.set_role(id, role).await? {
            Some(user) => {
                tracing::info!("{} set role of {} to {}", caller, user.email, role);
                Ok(Promotion::Promoted(user))
            }
            None => Ok(Promotion::TargetMissing),
        }
    }
}

fn profile_update(email: &str, fields: &Map<String, Value>) -> Result<Document, StoreError> {
    let mut set = Document::new();
    for (key, value) in fields {
        set.insert(format!("profile.{}", key), bson::to_bson(value)?);
    }

    let mut update = doc! {
        "$setOnInsert": {
            "_id": filter::uuid(User::id_for(email)),
            "role": bson::to_bson(&Role::None)?,
        }
    };
    if !set.is_empty() {
        update.insert("$set", set);
    }
    Ok(update)
}

#[rocket::async_trait]
impl UserDirectory for Database {
    async fn upsert_user(
        &self,
        email: &str,
        fields: Map<String, Value>,
    ) -> Result<UpsertSummary, StoreError> {
        let result = self
            .collection::<User>(USER_COLLECTION_NAME)
            .update_one(
                filter::by_email(email),
                profile_update(email, &fields)?,
                UpdateOptions::builder().upsert(true).build(),
            )
            .await?;

        Ok(UpsertSummary {
            matched_count: result.matched_count,
            modified_count: result.modified_count,
            upserted_id: result.upserted_id.map(|_| User::id_for(email)),
        })
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        Ok(self
            .collection::<User>(USER_COLLECTION_NAME)
            .find_one(filter::by_email(email), None)
            .await?)
    }

    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        let cursor = self
            .collection::<User>(USER_COLLECTION_NAME)
            .find(None, None)
            .await?;
        Ok(cursor.try_collect().await?)
    }

    async fn list_users_by_role(&self, role: Role) -> Result<Vec<User>, StoreError> {
        let cursor = self
            .collection::<User>(USER_COLLECTION_NAME)
            .find(doc! { "role": bson::to_bson(&role)? }, None)
            .await?;
        Ok(cursor.try_collect().await?)
    }

    async fn set_role(&self, id: Uuid, role: Role) -> Result<Option<User>, StoreError> {
        Ok(self
            .collection::<User>(USER_COLLECTION_NAME)
            .find_one_and_update(
                filter::by_id(id),
                doc! { "$set": { "role": bson::to_bson(&role)? } },
                FindOneAndUpdateOptions::builder()
                    .return_document(ReturnDocument::After)
                    .build(),
            )
            .await?)
    }
}
