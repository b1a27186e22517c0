use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::resp::problem::Problem;
use crate::role::Role;

pub mod db;

pub static USER_COLLECTION_NAME: &str = "users";

/// Keys the upsert body can never write.
const PROTECTED_FIELDS: [&str; 3] = ["_id", "email", "role"];

pub mod problem {
    use crate::resp::problem::Problem;
    use rocket::http::Status;
    use uuid::Uuid;

    #[inline]
    pub fn bad_email(email: impl ToString, detail: impl ToString) -> Problem {
        Problem::new_untyped(Status::BadRequest, "Bad email.")
            .insert_str("email", email)
            .detail(detail)
            .to_owned()
    }

    #[inline]
    pub fn bad_field(field: impl ToString, detail: impl ToString) -> Problem {
        Problem::new_untyped(Status::BadRequest, "Bad profile field.")
            .insert_str("field", field)
            .detail(detail)
            .to_owned()
    }

    #[inline]
    pub fn not_found(id: Uuid) -> Problem {
        Problem::new_untyped(Status::NotFound, "User doesn't exist.")
            .insert_str("id", id)
            .clone()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct User {
    #[serde(rename = "_id", with = "crate::data::bson_uuid")]
    pub id: Uuid,
    pub email: String,
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub profile: Map<String, Value>,
}

impl User {
    /// Ids are derived from the email so repeated upserts address one record.
    pub fn id_for(email: impl AsRef<str>) -> Uuid {
        Uuid::new_v5(&Uuid::NAMESPACE_OID, email.as_ref().as_bytes())
    }

    pub fn new(email: impl ToString, profile: Map<String, Value>) -> User {
        let email = email.to_string();
        User {
            id: User::id_for(&email),
            email,
            role: Role::None,
            profile,
        }
    }
}

/// Body of `PUT /users/<email>`: any profile fields of the user.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserUpsertData(pub Map<String, Value>);

impl UserUpsertData {
    /// Drops protected keys and rejects keys MongoDB can't store as
    /// `profile.<key>` paths.
    pub fn into_profile_fields(self) -> Result<Map<String, Value>, Problem> {
        let mut fields = self.0;
        for key in PROTECTED_FIELDS {
            fields.remove(key);
        }

        if let Some(key) = fields
            .keys()
            .find(|key| key.is_empty() || key.starts_with('$') || key.contains('.'))
        {
            return Err(problem::bad_field(
                key,
                "Field names can't be empty, start with '$' or contain '.'.",
            ));
        }

        Ok(fields)
    }
}

pub fn validate_email(email: &str) -> Result<(), Problem> {
    if !email.contains('@') {
        return Err(problem::bad_email(email, "Not a valid e-mail address."));
    }
    Ok(())
}

/// Result of an upsert, in the store's update-result shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpsertSummary {
    pub matched_count: u64,
    pub modified_count: u64,
    pub upserted_id: Option<Uuid>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct AdminCheck {
    pub admin: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct InstructorCheck {
    pub instructor: bool,
}
