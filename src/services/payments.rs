//! Payment gateway adapter. The gateway call is a non-compensable external
//! side effect and is always made after the local order transaction commits;
//! its failure therefore never rolls an order back, it only changes what the
//! caller is told.

use crate::{
    config::PaymentGatewayConfig,
    entities::{address, order, order_item},
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Buyer identity forwarded to the gateway, taken verbatim from the verified
/// auth context.
#[derive(Debug, Clone, Serialize)]
pub struct BuyerInfo {
    pub user_id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    #[error("cash-on-delivery orders cannot be sent to the payment gateway")]
    CashOnDelivery,
    #[error("a wallet identifier is required for mobile wallet payments")]
    MissingWalletIdentifier,
    #[error("gateway request failed: {0}")]
    Transport(String),
    #[error("gateway rejected the payment: {0}")]
    Rejected(String),
}

/// External payment collaborator: given a committed order and billing data,
/// returns a redirect URL for the buyer to complete payment.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn pay(
        &self,
        buyer: &BuyerInfo,
        order: &order::Model,
        items: &[order_item::Model],
        billing_address: &address::Model,
        wallet_identifier: Option<&str>,
    ) -> Result<String, PaymentError>;
}

/// HTTP implementation talking to the configured gateway endpoint.
pub struct HttpPaymentGateway {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct GatewayResponse {
    redirect_url: String,
}

impl HttpPaymentGateway {
    pub fn new(config: &PaymentGatewayConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_default();

        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        }
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    #[instrument(skip_all, fields(order_id = %order.id, amount_cents = order.total_cents))]
    async fn pay(
        &self,
        buyer: &BuyerInfo,
        order: &order::Model,
        items: &[order_item::Model],
        billing_address: &address::Model,
        wallet_identifier: Option<&str>,
    ) -> Result<String, PaymentError> {
        check_method(order, wallet_identifier)?;

        let payload = json!({
            "order_id": order.id,
            "amount_cents": order.total_cents,
            "currency": order.currency,
            "buyer": buyer,
            "billing_address": {
                "city": billing_address.city,
                "street": billing_address.street,
                "building": billing_address.building,
            },
            "items": items.iter().map(|i| json!({
                "product_id": i.product_id,
                "unit_price_cents": i.unit_price_cents,
                "quantity": i.quantity,
            })).collect::<Vec<_>>(),
            "wallet_identifier": wallet_identifier,
        });

        let response = self
            .client
            .post(format!("{}/payments", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "Payment gateway unreachable");
                PaymentError::Transport(e.to_string())
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(PaymentError::Rejected(format!("{}: {}", status, body)));
        }

        let parsed: GatewayResponse = response
            .json()
            .await
            .map_err(|e| PaymentError::Transport(format!("malformed gateway response: {}", e)))?;

        info!("Payment redirect issued");
        Ok(parsed.redirect_url)
    }
}

fn check_method(
    order: &order::Model,
    wallet_identifier: Option<&str>,
) -> Result<(), PaymentError> {
    match order.payment_method {
        order::PaymentMethod::Cod => Err(PaymentError::CashOnDelivery),
        order::PaymentMethod::MobileWallet
            if wallet_identifier.map_or(true, |w| w.trim().is_empty()) =>
        {
            Err(PaymentError::MissingWalletIdentifier)
        }
        _ => Ok(()),
    }
}

/// In-process gateway double for tests and local development: records each
/// invocation and returns a canned redirect URL, or fails on demand.
#[derive(Debug, Default)]
pub struct MockPaymentGateway {
    pub fail_with: Mutex<Option<String>>,
    pub calls: Mutex<Vec<RecordedPayment>>,
}

#[derive(Debug, Clone)]
pub struct RecordedPayment {
    pub order_id: Uuid,
    pub amount_cents: i64,
    pub currency: String,
    pub buyer_id: Uuid,
    pub wallet_identifier: Option<String>,
}

impl MockPaymentGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next(&self, reason: &str) {
        *self.fail_with.lock().expect("gateway mutex") = Some(reason.to_string());
    }

    pub fn recorded(&self) -> Vec<RecordedPayment> {
        self.calls.lock().expect("gateway mutex").clone()
    }
}

#[async_trait]
impl PaymentGateway for MockPaymentGateway {
    async fn pay(
        &self,
        buyer: &BuyerInfo,
        order: &order::Model,
        _items: &[order_item::Model],
        _billing_address: &address::Model,
        wallet_identifier: Option<&str>,
    ) -> Result<String, PaymentError> {
        check_method(order, wallet_identifier)?;

        self.calls.lock().expect("gateway mutex").push(RecordedPayment {
            order_id: order.id,
            amount_cents: order.total_cents,
            currency: order.currency.clone(),
            buyer_id: buyer.user_id,
            wallet_identifier: wallet_identifier.map(str::to_string),
        });

        if let Some(reason) = self.fail_with.lock().expect("gateway mutex").take() {
            return Err(PaymentError::Transport(reason));
        }

        Ok(format!("https://pay.example.test/checkout/{}", order.id))
    }
}

impl BuyerInfo {
    pub fn from_auth(user: &crate::auth::AuthUser) -> Self {
        Self {
            user_id: user.id,
            name: user.name.clone(),
            email: user.email.clone(),
            phone: user.phone.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn order_with(method: order::PaymentMethod) -> order::Model {
        order::Model {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            address_id: Uuid::new_v4(),
            payment_method: method,
            currency: "EGP".into(),
            total_cents: 23000,
            status: order::OrderStatus::initial_for(method),
            delivery_needed: true,
            transporter_id: None,
            deleted: false,
            deleted_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn billing() -> address::Model {
        address::Model {
            id: Uuid::new_v4(),
            user_id: Some(Uuid::new_v4()),
            city: "Cairo".into(),
            street: "Main".into(),
            building: None,
            is_store: false,
            deleted: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn buyer() -> BuyerInfo {
        BuyerInfo {
            user_id: Uuid::new_v4(),
            name: "B".into(),
            email: "b@example.com".into(),
            phone: None,
        }
    }

    #[tokio::test]
    async fn cod_orders_are_an_invalid_gateway_call() {
        let gw = MockPaymentGateway::new();
        let err = gw
            .pay(&buyer(), &order_with(order::PaymentMethod::Cod), &[], &billing(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::CashOnDelivery));
        assert!(gw.recorded().is_empty());
    }

    #[tokio::test]
    async fn mobile_wallet_requires_identifier() {
        let gw = MockPaymentGateway::new();
        let order = order_with(order::PaymentMethod::MobileWallet);

        let err = gw
            .pay(&buyer(), &order, &[], &billing(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::MissingWalletIdentifier));

        let url = gw
            .pay(&buyer(), &order, &[], &billing(), Some("01000000000"))
            .await
            .unwrap();
        assert!(url.contains(&order.id.to_string()));
    }

    #[tokio::test]
    async fn records_amount_for_credit_card() {
        let gw = MockPaymentGateway::new();
        let order = order_with(order::PaymentMethod::CreditCard);
        gw.pay(&buyer(), &order, &[], &billing(), None).await.unwrap();

        let calls = gw.recorded();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].amount_cents, 23000);
    }
}
