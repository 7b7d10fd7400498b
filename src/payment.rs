//! Payment gateway adapter.
//!
//! Hands a pending order to SSLCommerz: the shop posts a session request,
//! the gateway answers with a hosted payment page, and the shopper's browser
//! is redirected there. The gateway later sends the browser back to one of
//! the success / fail / cancel callbacks handled by [`crate::fulfillment`].

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use crate::config::GatewayConfig;
use crate::domain::aggregates::{Order, OrderStatus};
use crate::domain::value_objects::{OrderId, UserId};
use crate::store::Store;
use crate::{EcommerceError, Result};

/// Form body of a gateway session request. Field names are the gateway's.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PaymentRequest {
    pub store_id: String,
    pub store_passwd: String,
    pub total_amount: String,
    pub currency: String,
    pub tran_id: String,
    pub success_url: String,
    pub fail_url: String,
    pub cancel_url: String,
    pub cus_name: String,
    pub cus_email: String,
    pub cus_phone: String,
    pub cus_add1: String,
    pub cus_city: String,
    pub cus_postcode: String,
    pub cus_country: String,
    pub shipping_method: String,
    pub product_name: String,
    pub product_category: String,
    pub product_profile: String,
}

impl PaymentRequest {
    /// The amount comes from the order's item snapshot; by now the cart is empty.
    pub fn for_order(order: &Order, cfg: &GatewayConfig) -> Self {
        let s = order.shipping();
        Self {
            store_id: cfg.store_id.clone(),
            store_passwd: cfg.store_password.clone(),
            total_amount: order.total().to_gateway_string(),
            currency: cfg.currency.clone(),
            tran_id: order.id().to_string(),
            success_url: cfg.callback_url("success", order.id()),
            fail_url: cfg.callback_url("fail", order.id()),
            cancel_url: cfg.callback_url("cancel", order.id()),
            cus_name: s.full_name(),
            cus_email: s.email.clone(),
            cus_phone: s.phone.clone(),
            cus_add1: s.address.clone(),
            cus_city: s.city.clone(),
            cus_postcode: s.postal_code.clone(),
            cus_country: cfg.country.clone(),
            shipping_method: "NO".to_string(),
            product_name: "Products from our store".to_string(),
            product_category: "General".to_string(),
            product_profile: "general".to_string(),
        }
    }
}

/// Session response. Only `status` is guaranteed to be present.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct GatewayResponse {
    pub status: String,
    #[serde(rename = "GatewayPageURL", default)]
    pub gateway_page_url: Option<String>,
    #[serde(rename = "failedreason", default)]
    pub failed_reason: Option<String>,
    #[serde(rename = "sessionkey", default)]
    pub session_key: Option<String>,
}

impl GatewayResponse {
    pub fn into_redirect(self, order_id: OrderId) -> Result<PaymentRedirect> {
        if self.status != "SUCCESS" {
            let reason = self.failed_reason.filter(|r| !r.is_empty()).unwrap_or(self.status);
            return Err(EcommerceError::GatewayRejected(reason));
        }
        match self.gateway_page_url.filter(|u| !u.is_empty()) {
            Some(redirect_url) => Ok(PaymentRedirect { order_id, redirect_url }),
            None => Err(EcommerceError::GatewayRejected("no payment page in gateway response".into())),
        }
    }
}

/// Where to send the shopper's browser next.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PaymentRedirect { pub order_id: OrderId, pub redirect_url: String }

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Opens a payment session. Transport failures and timeouts are
    /// `GatewayUnavailable`; a parsed answer is returned as-is.
    async fn create_session(&self, request: &PaymentRequest) -> Result<GatewayResponse>;
}

pub struct SslCommerzGateway { client: Client, payment_url: String }

impl SslCommerzGateway {
    pub fn new(cfg: &GatewayConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(cfg.timeout)
            .build()
            .map_err(|e| EcommerceError::GatewayUnavailable(format!("cannot build HTTP client: {e}")))?;
        Ok(Self { client, payment_url: cfg.payment_url.clone() })
    }
}

#[async_trait]
impl PaymentGateway for SslCommerzGateway {
    async fn create_session(&self, request: &PaymentRequest) -> Result<GatewayResponse> {
        let response = self.client.post(&self.payment_url).form(request).send().await.map_err(|e| {
            if e.is_timeout() { EcommerceError::GatewayUnavailable("gateway timed out".into()) }
            else { EcommerceError::GatewayUnavailable(e.to_string()) }
        })?;
        let status = response.status();
        if !status.is_success() {
            return Err(EcommerceError::GatewayUnavailable(format!("gateway answered HTTP {status}")));
        }
        response.json::<GatewayResponse>().await
            .map_err(|e| EcommerceError::GatewayUnavailable(format!("unreadable gateway response: {e}")))
    }
}

/// Opens a gateway session for `order`. On any failure the order is left
/// pending and unpaid so the shopper can retry.
#[instrument(skip_all, fields(order_id = %order.id()))]
pub async fn initiate_payment(gateway: &dyn PaymentGateway, cfg: &GatewayConfig, order: &Order) -> Result<PaymentRedirect> {
    if order.is_paid() || order.status() != OrderStatus::Pending {
        return Err(EcommerceError::InvalidTransition { from: order.status(), to: OrderStatus::Processing });
    }
    let request = PaymentRequest::for_order(order, cfg);
    let redirect = gateway.create_session(&request).await
        .and_then(|response| response.into_redirect(order.id()))
        .inspect_err(|e| warn!(error = %e, "payment session not opened"))?;
    info!(total = %order.total(), "payment session opened");
    Ok(redirect)
}

/// Payment step of the checkout flow: resolves the order recorded in the
/// user's checkout context and opens a session for it.
pub async fn pay_for_checkout(store: &dyn Store, gateway: &dyn PaymentGateway, cfg: &GatewayConfig, user: UserId) -> Result<PaymentRedirect> {
    let ctx = store.checkout_context(user).await?.ok_or(EcommerceError::NotFound("Checkout"))?;
    let order = store.order(ctx.order_id).await?.ok_or(EcommerceError::NotFound("Order"))?;
    if !order.is_owned_by(user) { return Err(EcommerceError::Unauthorized); }
    initiate_payment(gateway, cfg, &order).await
}
