use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rocket::http::Status;
use rocket::request::{self, FromRequest, Request};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::guard::reject;
use crate::resp::problem::Problem;
use crate::security::Security;
use crate::util::date_time_as_unix_seconds;
use rocket::outcome::Outcome::Success;

pub static AUTHORIZATION_HEADER: &str = "Authorization";

/// Claims reserved by the token itself; user supplied values are dropped.
const RESERVED_CLAIMS: [&str; 3] = ["iat", "exp", "email"];

/// Signed bearer token carrying the authenticated user's email.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthToken {
    #[serde(with = "date_time_as_unix_seconds")]
    iat: DateTime<Utc>,
    #[serde(with = "date_time_as_unix_seconds")]
    exp: DateTime<Utc>,
    pub email: String,
    #[serde(flatten)]
    pub profile: Map<String, Value>,
}

impl AuthToken {
    /// Tokens are valid for one hour from issuance.
    pub fn validity() -> Duration {
        Duration::hours(1)
    }

    pub fn new(email: impl ToString, profile: Map<String, Value>) -> AuthToken {
        AuthToken::issued_at(Utc::now(), email, profile)
    }

    pub fn issued_at(
        now: DateTime<Utc>,
        email: impl ToString,
        mut profile: Map<String, Value>,
    ) -> AuthToken {
        for claim in RESERVED_CLAIMS {
            profile.remove(claim);
        }

        AuthToken {
            iat: now,
            exp: now + AuthToken::validity(),
            email: email.to_string(),
            profile,
        }
    }

    pub fn issued(&self) -> DateTime<Utc> {
        self.iat
    }

    pub fn expires(&self) -> DateTime<Utc> {
        self.exp
    }

    pub fn encode_jwt(&self, secret: impl AsRef<[u8]>) -> Result<String, jsonwebtoken::errors::Error> {
        let header = Header::new(Algorithm::HS256);
        encode(&header, &self, &EncodingKey::from_secret(secret.as_ref()))
    }

    pub fn verify(token: &str, secret: impl AsRef<[u8]>) -> Result<AuthToken, Problem> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        decode::<AuthToken>(token, &DecodingKey::from_secret(secret.as_ref()), &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!("rejected bearer token: {}", e);
                Problem::from(e)
            })
    }
}

pub fn auth_problem(detail: impl ToString) -> Problem {
    Problem::new_untyped(Status::Unauthorized, "Unable to authorize user.")
        .detail(detail)
        .clone()
}

/// Pulls the token out of an `Authorization: Bearer <token>` header value.
pub fn bearer_token(header: &str) -> Option<&str> {
    let mut parts = header.split_whitespace();
    let scheme = parts.next()?;
    let token = parts.next()?;

    if !scheme.eq_ignore_ascii_case("bearer") || parts.next().is_some() {
        return None;
    }
    Some(token)
}

pub fn extract_claims(header: Option<&str>, secret: impl AsRef<[u8]>) -> Result<AuthToken, Problem> {
    let header = match header {
        Some(it) => it,
        None => return Err(auth_problem("No authorization header.")),
    };

    let token = bearer_token(header)
        .ok_or_else(|| auth_problem("Authorization header isn't a bearer token."))?;
    tracing::trace!("extracted bearer token from authorization header");

    let claims = AuthToken::verify(token, secret)?;
    tracing::debug!("decoded access token for user: {}", claims.email);

    Ok(claims)
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AuthToken {
    type Error = Problem;

    async fn from_request(req: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        let security = match req.rocket().state::<Security>() {
            Some(it) => it,
            None => {
                tracing::error!("token secret isn't managed by the server");
                return reject(
                    req,
                    Problem::new_untyped(Status::InternalServerError, "Server isn't configured."),
                );
            }
        };

        match extract_claims(
            req.headers().get_one(AUTHORIZATION_HEADER),
            &security.token_secret,
        ) {
            Ok(claims) => Success(claims),
            Err(problem) => reject(req, problem),
        }
    }
}

pub mod doc {
    use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};

    #[derive(Clone, Copy)]
    pub struct JWTAuth;

    impl From<JWTAuth> for SecurityScheme {
        fn from(_: JWTAuth) -> Self {
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            )
        }
    }

    impl utoipa::Modify for JWTAuth {
        fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
            if let Some(c) = openapi.components.as_mut() {
                c.add_security_scheme("jwt", *self)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::SubsecRound;
    use serde_json::json;

    const SECRET: &[u8] = b"sportzone-test-secret";

    fn profile() -> Map<String, Value> {
        match json!({"name": "Ana", "photo": "https://example.com/ana.png"}) {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn jwt_configured_properly() {
        let now = Utc::now().round_subsecs(0);
        let token = AuthToken::issued_at(now, "ana@example.com", profile());

        let encoded = token.encode_jwt(SECRET).expect("encoding should work for example");
        let decoded = AuthToken::verify(&encoded, SECRET).expect("fresh token verifies");

        assert_eq!(decoded, token);
        assert_eq!(decoded.issued(), now);
        assert_eq!(decoded.expires(), now + Duration::hours(1));
        assert_eq!(decoded.profile.get("name"), Some(&json!("Ana")));
    }

    #[test]
    fn expired_token_is_rejected() {
        let issued = Utc::now().round_subsecs(0) - Duration::hours(2);
        let token = AuthToken::issued_at(issued, "ana@example.com", Map::new());
        let encoded = token.encode_jwt(SECRET).unwrap();

        let problem = AuthToken::verify(&encoded, SECRET).expect_err("token expired an hour ago");
        assert_eq!(problem.status, Status::Unauthorized);
        assert_eq!(problem.title, "Expired JWT signature.");
    }

    #[test]
    fn wrong_secret_and_garbage_are_rejected() {
        let token = AuthToken::new("ana@example.com", Map::new());
        let encoded = token.encode_jwt(SECRET).unwrap();

        assert!(AuthToken::verify(&encoded, b"another-secret").is_err());
        assert!(AuthToken::verify("not.a.jwt", SECRET).is_err());
    }

    #[test]
    fn reserved_claims_are_dropped_from_profile() {
        let mut profile = profile();
        profile.insert("exp".to_string(), json!(0));
        profile.insert("email".to_string(), json!("mallory@example.com"));

        let token = AuthToken::new("ana@example.com", profile);
        let decoded = AuthToken::verify(&token.encode_jwt(SECRET).unwrap(), SECRET).unwrap();

        assert_eq!(decoded.email, "ana@example.com");
        assert!(!decoded.profile.contains_key("exp"));
    }

    #[test]
    fn bearer_header_parsing() {
        assert_eq!(bearer_token("Bearer abc.def"), Some("abc.def"));
        assert_eq!(bearer_token("bearer abc"), Some("abc"));
        assert_eq!(bearer_token("Basic abc"), None);
        assert_eq!(bearer_token("Bearer"), None);
        assert_eq!(bearer_token("Bearer a b"), None);
    }

    #[test]
    fn missing_header_is_unauthorized() {
        let problem = extract_claims(None, SECRET).unwrap_err();
        assert_eq!(problem.status, Status::Unauthorized);
    }
}
