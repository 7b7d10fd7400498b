#![allow(dead_code)]

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

use shopnest::config::GatewayConfig;
use shopnest::domain::aggregates::{Order, Product, ShippingInfo};
use shopnest::domain::events::OrderEvent;
use shopnest::domain::value_objects::{Money, OrderId};
use shopnest::notify::{Notifier, NotifyError};
use shopnest::payment::{GatewayResponse, PaymentGateway, PaymentRequest};
use shopnest::store::{MemoryStore, Store};
use shopnest::{EcommerceError, Result};

pub fn money(cents: i64) -> Money { Money::new(Decimal::new(cents, 2)) }

pub fn shipping() -> ShippingInfo {
    ShippingInfo {
        first_name: "Nusrat".into(), last_name: "Jahan".into(), email: "nusrat@example.com".into(),
        address: "House 7, Road 3".into(), postal_code: "1209".into(), phone: "01811111111".into(),
        city: "Dhaka".into(), note: "Call before delivery".into(),
    }
}

pub fn gateway_config() -> GatewayConfig {
    GatewayConfig {
        store_id: "teststore".into(), store_password: "testpass".into(), payment_url: "http://gateway.invalid".into(),
        public_base_url: "https://shop.example".into(), currency: "BDT".into(), country: "Bangladesh".into(),
        timeout: Duration::from_secs(1),
    }
}

pub async fn seeded(products: &[(&str, i64, u64)]) -> (Arc<MemoryStore>, Vec<Product>) {
    let store = Arc::new(MemoryStore::new());
    let mut out = vec![];
    for (name, cents, stock) in products {
        let p = Product::create(*name, money(*cents), *stock);
        store.upsert_product(&p).await.unwrap();
        out.push(p);
    }
    (store, out)
}

pub enum Scripted { Answer(GatewayResponse), Down }

/// Gateway double answering from a queue and recording what it was sent.
#[derive(Default)]
pub struct ScriptedGateway {
    answers: Mutex<VecDeque<Scripted>>,
    pub requests: Mutex<Vec<PaymentRequest>>,
}

impl ScriptedGateway {
    pub fn new(answers: Vec<Scripted>) -> Self { Self { answers: Mutex::new(answers.into()), requests: Mutex::default() } }

    pub fn success(url: &str) -> Scripted {
        Scripted::Answer(GatewayResponse { status: "SUCCESS".into(), gateway_page_url: Some(url.into()), ..Default::default() })
    }

    pub fn failed(reason: &str) -> Scripted {
        Scripted::Answer(GatewayResponse { status: "FAILED".into(), failed_reason: Some(reason.into()), ..Default::default() })
    }

    pub fn sent(&self) -> Vec<PaymentRequest> { self.requests.lock().unwrap().clone() }
}

#[async_trait]
impl PaymentGateway for ScriptedGateway {
    async fn create_session(&self, request: &PaymentRequest) -> Result<GatewayResponse> {
        self.requests.lock().unwrap().push(request.clone());
        match self.answers.lock().unwrap().pop_front() {
            Some(Scripted::Answer(r)) => Ok(r),
            Some(Scripted::Down) | None => Err(EcommerceError::GatewayUnavailable("connection refused".into())),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Sent { Confirmation(OrderId), Event(OrderEvent) }

/// Notifier that forwards everything onto a channel.
pub struct ChannelNotifier { tx: mpsc::UnboundedSender<Sent> }

impl ChannelNotifier {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<Sent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }
}

#[async_trait]
impl Notifier for ChannelNotifier {
    async fn send_order_confirmation(&self, order: &Order) -> std::result::Result<(), NotifyError> {
        let _ = self.tx.send(Sent::Confirmation(order.id()));
        Ok(())
    }

    async fn publish(&self, event: &OrderEvent) -> std::result::Result<(), NotifyError> {
        let _ = self.tx.send(Sent::Event(event.clone()));
        Ok(())
    }
}

/// Notifier whose every send fails.
pub struct BrokenNotifier;

#[async_trait]
impl Notifier for BrokenNotifier {
    async fn send_order_confirmation(&self, _order: &Order) -> std::result::Result<(), NotifyError> {
        Err(NotifyError::Publish("mail relay down".into()))
    }

    async fn publish(&self, _event: &OrderEvent) -> std::result::Result<(), NotifyError> {
        Err(NotifyError::Publish("broker down".into()))
    }
}

/// Waits for the next message, failing the test after a second.
pub async fn next_sent(rx: &mut mpsc::UnboundedReceiver<Sent>) -> Sent {
    tokio::time::timeout(Duration::from_secs(1), rx.recv()).await.expect("notification timed out").expect("channel closed")
}
