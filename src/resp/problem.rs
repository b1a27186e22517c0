use std::io::Cursor;

use rocket::http::hyper::header::CONTENT_LANGUAGE;
use rocket::http::ContentType;
use rocket::http::Status;
use rocket::response::Responder;
use rocket::{response, Request, Response};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt::{Display, Formatter};
use utoipa::ToSchema;

use crate::error::StoreError;

/// Implements [RFC7807](https://tools.ietf.org/html/rfc7807).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Problem {
    #[serde(skip)]
    pub status: Status,
    pub type_uri: String,
    pub title: String,

    pub detail: Option<String>,

    #[schema(value_type = Object)]
    pub body: Map<String, Value>,
}

impl Default for Problem {
    fn default() -> Self {
        Problem {
            status: Status::InternalServerError,
            type_uri: "about:blank".to_string(),
            title: "Problem".to_string(),
            detail: None,
            body: Map::new(),
        }
    }
}

impl Problem {
    pub fn new_untyped(status: Status, title: impl ToString) -> Problem {
        Problem {
            status,
            type_uri: "about:blank".to_string(),
            title: title.to_string(),
            ..Default::default()
        }
    }

    pub fn detail(&mut self, value: impl ToString) -> &mut Problem {
        self.detail = Some(value.to_string());
        self
    }

    pub fn insert_str(&mut self, key: impl ToString, value: impl ToString) -> &mut Problem {
        self.body
            .insert(key.to_string(), Value::String(value.to_string()));
        self
    }
}

impl Display for Problem {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.status, self.title)
    }
}

impl std::error::Error for Problem {}

impl<'r> Responder<'r, 'static> for Problem {
    fn respond_to(self, _: &'r Request<'_>) -> response::Result<'static> {
        let mut body = self.body.clone();

        // Following are required by rfc7807
        body.insert(String::from("type"), Value::from(self.type_uri));
        body.insert(String::from("title"), Value::from(self.title));

        // Optional parameters as specified by rfc7807
        if let Some(detail) = self.detail {
            body.insert(String::from("detail"), Value::from(detail));
        }
        body.insert(String::from("status"), Value::from(self.status.code));

        let body_string = Value::Object(body).to_string();

        Response::build()
            .status(self.status)
            .header(ContentType::new("application", "problem+json"))
            .raw_header(CONTENT_LANGUAGE.as_str(), "en")
            .sized_body(body_string.len(), Cursor::new(body_string))
            .ok()
    }
}

pub mod problems {
    use crate::resp::problem::Problem;
    use rocket::http::Status;

    #[inline]
    pub fn parse_problem() -> Problem {
        Problem::new_untyped(
            Status::BadRequest,
            "There was a problem parsing part of the request.",
        )
    }

    #[inline]
    pub fn forbidden(detail: impl ToString) -> Problem {
        Problem::new_untyped(Status::Forbidden, "Forbidden access.")
            .detail(detail)
            .clone()
    }
}

/// Problem raised by a request guard, kept in the request-local cache so the
/// catcher can render it instead of a generic status page.
#[derive(Debug, Clone, Default)]
pub struct GuardFailure(pub Option<Problem>);

/// Renders every error status as a problem document.
#[catch(default)]
pub fn problem_catcher(status: Status, req: &Request<'_>) -> Problem {
    if let Some(problem) = &req.local_cache(GuardFailure::default).0 {
        return problem.clone();
    }

    let title = match status.code {
        400 | 422 => "There was a problem parsing part of the request.",
        401 => "Unable to authorize user.",
        403 => "Forbidden access.",
        404 => "Resource not found.",
        _ => status.reason_lossy(),
    };
    Problem::new_untyped(status, title)
}

impl From<mongodb::error::Error> for Problem {
    fn from(e: mongodb::error::Error) -> Self {
        use mongodb::error::ErrorKind;

        fn mongodb_problem() -> Problem {
            Problem::new_untyped(
                Status::InternalServerError,
                "MongoDB failed while processing request.",
            )
        }

        fn access_problem() -> Problem {
            Problem::new_untyped(
                Status::InternalServerError,
                "Server was unable to access MongoDB.",
            )
        }

        fn bad_db_request() -> Problem {
            Problem::new_untyped(
                Status::InternalServerError,
                "MongoDB was unable to process bad server request.",
            )
        }

        fn bson_problem() -> Problem {
            Problem::new_untyped(
                Status::InternalServerError,
                "There was a problem with handling MongoDB bson.",
            )
        }

        match e.kind.as_ref() {
            ErrorKind::InvalidArgument { .. } => bad_db_request(),
            ErrorKind::Authentication { .. } => access_problem(),
            ErrorKind::BsonDeserialization(_) => bson_problem(),
            ErrorKind::BsonSerialization(_) => bson_problem(),
            ErrorKind::BulkWrite(_) => bad_db_request(),
            ErrorKind::Command(_) => bad_db_request(),
            ErrorKind::DnsResolve { .. } => access_problem(),
            ErrorKind::Internal { .. } => mongodb_problem(),
            ErrorKind::Io(_) => mongodb_problem()
                .detail("An IO error occurred. Submitted data might not be properly stored.")
                .clone(),
            ErrorKind::ConnectionPoolCleared { .. } => mongodb_problem(),
            ErrorKind::InvalidResponse { .. } => mongodb_problem(),
            ErrorKind::ServerSelection { .. } => access_problem(),
            ErrorKind::SessionsNotSupported => mongodb_problem(),
            ErrorKind::InvalidTlsConfig { .. } => access_problem(),
            ErrorKind::Write(_) => mongodb_problem()
                .detail("A write error occurred. Submitted data might not be properly stored.")
                .clone(),
            ErrorKind::Transaction { .. } => mongodb_problem(),
            ErrorKind::IncompatibleServer { .. } => access_problem(),
            _ => mongodb_problem(),
        }
    }
}

impl From<StoreError> for Problem {
    fn from(e: StoreError) -> Self {
        tracing::error!("store failure: {}", e);

        match e {
            StoreError::Database(e) => Problem::from(e),
            StoreError::BsonSerialization(_) | StoreError::BsonDeserialization(_) => {
                Problem::new_untyped(
                    Status::InternalServerError,
                    "An error occurred while processing BSON data.",
                )
            }
        }
    }
}

impl From<jsonwebtoken::errors::Error> for Problem {
    fn from(e: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match e.into_kind() {
            ErrorKind::ExpiredSignature => {
                Problem::new_untyped(Status::Unauthorized, "Expired JWT signature.")
            }
            _ => Problem::new_untyped(Status::Unauthorized, "Error while handling JWT."),
        }
    }
}
