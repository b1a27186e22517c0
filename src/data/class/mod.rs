use chrono::{DateTime, Utc};
use rocket::http::Status;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::resp::problem::Problem;

pub mod db;

pub static CLASS_COLLECTION_NAME: &str = "allClass";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ClassStatus {
    Pending,
    Approved,
    /// Stored as `deny`, the value classes were always denied with.
    #[serde(rename = "deny")]
    Denied,
}

impl Default for ClassStatus {
    fn default() -> Self {
        ClassStatus::Pending
    }
}

impl std::fmt::Display for ClassStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClassStatus::Pending => write!(f, "pending"),
            ClassStatus::Approved => write!(f, "approved"),
            ClassStatus::Denied => write!(f, "deny"),
        }
    }
}

impl std::str::FromStr for ClassStatus {
    type Err = Problem;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ClassStatus::Pending),
            "approved" => Ok(ClassStatus::Approved),
            "deny" | "denied" => Ok(ClassStatus::Denied),
            other => Err(Problem::new_untyped(Status::BadRequest, "Unknown class status.")
                .insert_str("status", other)
                .clone()),
        }
    }
}

/// An instructor-authored enrollable class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClassOffering {
    #[serde(rename = "_id", with = "crate::data::bson_uuid")]
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub instructor_name: Option<String>,
    pub instructor_email: String,
    pub price: f64,
    /// Seats still available.
    pub seats: i64,
    #[serde(default)]
    pub total_students: i64,
    #[serde(default)]
    pub status: ClassStatus,
    #[serde(default)]
    pub feedback: Option<String>,
    #[serde(default = "Utc::now", with = "crate::util::date_time_as_fixed_rfc3339")]
    pub created_at: DateTime<Utc>,
}

/// Body of `POST /add-class`. The owner always comes from the caller.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClassCreateData {
    pub name: String,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub instructor_name: Option<String>,
    pub price: f64,
    pub seats: i64,
}

impl ClassCreateData {
    pub fn validate(&self) -> Result<(), Problem> {
        if self.name.trim().is_empty() {
            return Err(problem::bad_class("Class name can't be empty."));
        }
        if !self.price.is_finite() || self.price < 0.0 {
            return Err(problem::bad_class("Price must be a non-negative number."));
        }
        if self.seats < 0 {
            return Err(problem::bad_class("Seat capacity can't be negative."));
        }
        Ok(())
    }

    pub fn into_offering(self, owner: impl ToString) -> ClassOffering {
        ClassOffering {
            id: Uuid::new_v4(),
            name: self.name,
            image: self.image,
            instructor_name: self.instructor_name,
            instructor_email: owner.to_string(),
            price: self.price,
            seats: self.seats,
            total_students: 0,
            status: ClassStatus::Pending,
            feedback: None,
            created_at: Utc::now(),
        }
    }
}

/// Body of `PATCH /update/<id>`; absent fields are left unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClassUpdateData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seats: Option<i64>,
}

impl ClassUpdateData {
    pub fn validate(&self) -> Result<(), Problem> {
        if matches!(&self.name, Some(name) if name.trim().is_empty()) {
            return Err(problem::bad_class("Class name can't be empty."));
        }
        if matches!(self.price, Some(price) if !price.is_finite() || price < 0.0) {
            return Err(problem::bad_class("Price must be a non-negative number."));
        }
        if matches!(self.seats, Some(seats) if seats < 0) {
            return Err(problem::bad_class("Seat capacity can't be negative."));
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.image.is_none() && self.price.is_none() && self.seats.is_none()
    }

    pub fn apply(&self, class: &mut ClassOffering) {
        if let Some(name) = &self.name {
            class.name = name.clone();
        }
        if let Some(image) = &self.image {
            class.image = Some(image.clone());
        }
        if let Some(price) = self.price {
            class.price = price;
        }
        if let Some(seats) = self.seats {
            class.seats = seats;
        }
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct FeedbackData {
    pub feedback: String,
}

/// Result of the atomic seat reservation.
#[derive(Debug, Clone, PartialEq)]
pub enum SeatOutcome {
    Taken(ClassOffering),
    Full,
    Missing,
}

pub mod problem {
    use crate::resp::problem::Problem;
    use rocket::http::Status;
    use uuid::Uuid;

    #[inline]
    pub fn bad_class(detail: impl ToString) -> Problem {
        Problem::new_untyped(Status::BadRequest, "Bad class data.")
            .detail(detail)
            .clone()
    }

    #[inline]
    pub fn not_found(id: Uuid) -> Problem {
        Problem::new_untyped(Status::NotFound, "Class doesn't exist.")
            .insert_str("id", id)
            .clone()
    }

    #[inline]
    pub fn class_full(id: Uuid) -> Problem {
        Problem::new_untyped(Status::Conflict, "Class has no seats left.")
            .insert_str("id", id)
            .clone()
    }
}
