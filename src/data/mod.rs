use std::sync::Arc;

use self::booking::db::BookingLedger;
use self::class::db::ClassCatalog;
use self::user::db::UserDirectory;

pub mod booking;
pub mod class;
pub mod memory;
pub mod user;

/// Everything the routes need from the database. Implemented by
/// [`mongodb::Database`] and by [`memory::MemoryStore`].
pub trait Store: UserDirectory + ClassCatalog + BookingLedger + Send + Sync {}

impl<T> Store for T where T: UserDirectory + ClassCatalog + BookingLedger + Send + Sync {}

/// Store handle built once at start-up and kept in managed state.
pub type Db = Arc<dyn Store>;

/// Stores `uuid::Uuid` as BSON binary (subtype 4) while keeping the string
/// form in JSON.
pub mod bson_uuid {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use uuid::Uuid;

    pub fn serialize<S: Serializer>(id: &Uuid, serializer: S) -> Result<S::Ok, S::Error> {
        bson::Uuid::from_uuid_1(*id).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Uuid, D::Error> {
        bson::Uuid::deserialize(deserializer).map(|it| it.to_uuid_1())
    }
}

pub mod filter {
    use bson::{doc, Document};
    use uuid::Uuid;

    #[inline]
    pub fn uuid(id: Uuid) -> bson::Uuid {
        bson::Uuid::from_uuid_1(id)
    }

    #[inline]
    pub fn by_id(id: Uuid) -> Document {
        doc! { "_id": uuid(id) }
    }

    #[inline]
    pub fn by_email(email: impl Into<String>) -> Document {
        doc! { "email": email.into() }
    }
}
