//! Payment intents with a Stripe-compatible processor.

use std::sync::Arc;

use rocket::http::Status;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use crate::config::Config;
use crate::resp::problem::Problem;

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("price must be a positive amount")]
    InvalidAmount,
    #[error("payment processor isn't configured")]
    NotConfigured,
    #[error("payment processor rejected the request with {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

impl From<PaymentError> for Problem {
    fn from(e: PaymentError) -> Self {
        match e {
            PaymentError::InvalidAmount => {
                Problem::new_untyped(Status::BadRequest, "Bad payment amount.")
                    .detail("Price must be a positive number.")
                    .clone()
            }
            PaymentError::NotConfigured => Problem::new_untyped(
                Status::ServiceUnavailable,
                "Payments are currently unavailable.",
            ),
            PaymentError::Rejected { status, body } => {
                tracing::warn!("payment processor answered {}: {}", status, body);
                Problem::new_untyped(Status::BadGateway, "Payment processor refused the request.")
                    .insert_str("processorStatus", status)
                    .clone()
            }
            PaymentError::Http(e) => {
                tracing::error!("unable to reach payment processor: {}", e);
                Problem::new_untyped(Status::BadGateway, "Unable to reach payment processor.")
            }
        }
    }
}

/// Converts a price in major units to the integer minor units processors
/// charge in.
pub fn to_minor_units(price: f64) -> Result<i64, PaymentError> {
    if !price.is_finite() || price <= 0.0 {
        return Err(PaymentError::InvalidAmount);
    }
    let amount = (price * 100.0).round();
    if amount < 1.0 || amount > i64::MAX as f64 {
        return Err(PaymentError::InvalidAmount);
    }
    Ok(amount as i64)
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    pub client_secret: String,
    #[serde(default)]
    pub amount: i64,
    #[serde(default)]
    pub currency: String,
}

/// Body of `POST /create-payment-intent`.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct IntentRequest {
    pub price: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct IntentResponse {
    pub client_secret: String,
}

#[rocket::async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_payment_intent(&self, amount_minor: i64) -> Result<PaymentIntent, PaymentError>;
}

pub type Payments = Arc<dyn PaymentGateway>;

/// Creates card payment intents through `POST {api_base}/v1/payment_intents`.
pub struct StripeGateway {
    client: reqwest::Client,
    api_base: String,
    currency: String,
    secret_key: Option<String>,
}

impl std::fmt::Debug for StripeGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StripeGateway")
            .field("api_base", &self.api_base)
            .field("currency", &self.currency)
            .field("configured", &self.secret_key.is_some())
            .finish()
    }
}

impl StripeGateway {
    pub fn new(config: &Config) -> StripeGateway {
        if config.payment_secret_key.is_none() {
            tracing::warn!("PAYMENT_SECRET_KEY isn't set; payment intents will be refused.");
        }

        StripeGateway {
            client: reqwest::Client::new(),
            api_base: config.payment_api_base.trim_end_matches('/').to_string(),
            currency: config.currency.clone(),
            secret_key: config.payment_secret_key.clone(),
        }
    }
}

#[rocket::async_trait]
impl PaymentGateway for StripeGateway {
    async fn create_payment_intent(&self, amount_minor: i64) -> Result<PaymentIntent, PaymentError> {
        let secret_key = self.secret_key.as_ref().ok_or(PaymentError::NotConfigured)?;
        let amount = amount_minor.to_string();

        let response = self
            .client
            .post(format!("{}/v1/payment_intents", self.api_base))
            .bearer_auth(secret_key)
            .form(&[
                ("amount", amount.as_str()),
                ("currency", self.currency.as_str()),
                ("payment_method_types[]", "card"),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PaymentError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let intent: PaymentIntent = response.json().await?;
        tracing::debug!("created payment intent {} for {}", intent.id, amount_minor);
        Ok(intent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn gateway_for(server: &MockServer) -> StripeGateway {
        let mut config = Config::default();
        config.payment_secret_key = Some("sk_test_123".to_string());
        config.payment_api_base = format!("{}/", server.uri());
        config.currency = "usd".to_string();
        StripeGateway::new(&config)
    }

    #[test]
    fn prices_convert_to_minor_units() {
        assert_eq!(to_minor_units(30.0).unwrap(), 3000);
        assert_eq!(to_minor_units(19.99).unwrap(), 1999);
        assert_eq!(to_minor_units(0.125).unwrap(), 13);
    }

    #[test]
    fn unusable_prices_are_rejected() {
        for price in [0.0, -5.0, f64::NAN, f64::INFINITY, 0.001] {
            assert!(matches!(
                to_minor_units(price),
                Err(PaymentError::InvalidAmount)
            ));
        }
    }

    #[rocket::async_test]
    async fn unconfigured_gateway_refuses_without_calling_out() {
        let mut config = Config::default();
        config.payment_secret_key = None;
        config.payment_api_base = "http://127.0.0.1:9".to_string();

        let err = StripeGateway::new(&config)
            .create_payment_intent(1000)
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::NotConfigured));
        assert_eq!(Problem::from(err).status, Status::ServiceUnavailable);
    }

    #[test]
    fn processor_rejection_is_a_bad_gateway() {
        let problem = Problem::from(PaymentError::Rejected {
            status: 402,
            body: "{}".to_string(),
        });
        assert_eq!(problem.status, Status::BadGateway);
    }

    #[rocket::async_test]
    async fn intent_is_created_with_the_secret_key() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/payment_intents"))
            .and(header("authorization", "Bearer sk_test_123"))
            .and(body_string_contains("amount=1999"))
            .and(body_string_contains("currency=usd"))
            .and(body_string_contains("payment_method_types%5B%5D=card"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "pi_1",
                "object": "payment_intent",
                "client_secret": "pi_1_secret_abc",
                "amount": 1999,
                "currency": "usd"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let intent = gateway_for(&server)
            .create_payment_intent(1999)
            .await
            .unwrap();
        assert_eq!(intent.id, "pi_1");
        assert_eq!(intent.client_secret, "pi_1_secret_abc");
        assert_eq!(intent.amount, 1999);
        assert_eq!(intent.currency, "usd");
    }

    #[rocket::async_test]
    async fn declined_intent_surfaces_as_bad_gateway() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/payment_intents"))
            .respond_with(
                ResponseTemplate::new(402)
                    .set_body_json(json!({"error": {"code": "card_declined"}})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let err = gateway_for(&server)
            .create_payment_intent(500)
            .await
            .unwrap_err();
        match &err {
            PaymentError::Rejected { status, body } => {
                assert_eq!(*status, 402);
                assert!(body.contains("card_declined"));
            }
            other => panic!("unexpected payment error: {:?}", other),
        }

        let problem = Problem::from(err);
        assert_eq!(problem.status, Status::BadGateway);
        assert_eq!(problem.body.get("processorStatus"), Some(&json!("402")));
    }
}
