mod common;

use pretty_assertions::assert_eq;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;

use common::*;
use shopnest::domain::aggregates::{CancelOutcome, OrderStatus, PaymentOutcome, QuantityChange};
use shopnest::domain::events::OrderEvent;
use shopnest::domain::value_objects::UserId;
use shopnest::notify::{LogNotifier, Notifier};
use shopnest::store::{CartChange, CartCommand, CheckoutFault, FulfillmentStep, Store};
use shopnest::{checkout, fulfillment, payment, EcommerceError};

fn quiet() -> Arc<dyn Notifier> { Arc::new(LogNotifier) }

/// Product A (10.00, stock 5) x3 and product B (5.00, stock 2) x2.
async fn filled_cart() -> (Arc<shopnest::store::MemoryStore>, UserId, Vec<shopnest::domain::aggregates::Product>) {
    let (store, products) = seeded(&[("Product A", 1000, 5), ("Product B", 500, 2)]).await;
    let user = UserId::new();
    let (a, b) = (products[0].id(), products[1].id());
    store.mutate_cart(user, a, CartCommand::Add { quantity: 1 }).await.unwrap();
    store.mutate_cart(user, a, CartCommand::Add { quantity: 2 }).await.unwrap();
    store.mutate_cart(user, b, CartCommand::Add { quantity: 1 }).await.unwrap();
    store.mutate_cart(user, b, CartCommand::Add { quantity: 1 }).await.unwrap();
    (store, user, products)
}

#[tokio::test]
async fn checkout_snapshots_cart_and_empties_it() {
    let (store, user, products) = filled_cart().await;
    let cart = store.cart(user).await.unwrap();
    assert_eq!(cart.total_price(), money(4000));
    assert_eq!(cart.total_item_count(), 5);

    let order = checkout::checkout(store.as_ref(), quiet(), user, shipping()).await.unwrap();
    assert_eq!(order.total(), money(4000));
    assert_eq!(order.items().len(), 2);
    assert_eq!(order.status(), OrderStatus::Pending);
    assert!(!order.is_paid());
    for (product, qty) in [(&products[0], 3), (&products[1], 2)] {
        let line = order.items().iter().find(|i| i.product_id == product.id()).unwrap();
        assert_eq!(line.quantity, qty);
        assert_eq!(line.price, product.price());
    }

    assert!(store.cart(user).await.unwrap().is_empty());
    let ctx = store.checkout_context(user).await.unwrap().unwrap();
    assert_eq!(ctx.order_id, order.id());
    // Stock only moves on payment.
    assert_eq!(store.product(products[0].id()).await.unwrap().unwrap().stock().value(), 5);
}

#[tokio::test]
async fn empty_cart_checkout_is_rejected() {
    let (store, _) = seeded(&[]).await;
    let user = UserId::new();
    let err = checkout::checkout(store.as_ref(), quiet(), user, shipping()).await.unwrap_err();
    assert!(matches!(err, EcommerceError::EmptyCart));
    assert!(store.checkout_context(user).await.unwrap().is_none());
    assert!(store.orders_for_user(user).await.unwrap().is_empty());
}

#[tokio::test]
async fn failed_checkout_leaves_no_partial_state() {
    let (store, user, _) = filled_cart().await;
    let before = store.cart(user).await.unwrap();
    store.inject_checkout_fault(CheckoutFault::AfterItems(1)).await;

    let err = checkout::checkout(store.as_ref(), quiet(), user, shipping()).await.unwrap_err();
    assert!(matches!(err, EcommerceError::StorageError(_)));
    assert_eq!(store.cart(user).await.unwrap().items(), before.items());
    assert!(store.orders_for_user(user).await.unwrap().is_empty());
    assert!(store.checkout_context(user).await.unwrap().is_none());

    // The fault is one-shot; the retry commits everything.
    let order = checkout::checkout(store.as_ref(), quiet(), user, shipping()).await.unwrap();
    assert_eq!(order.items().len(), before.items().len());
    assert_eq!(order.total(), before.total_price());
    assert_eq!(store.orders_for_user(user).await.unwrap().len(), 1);
}

#[tokio::test]
async fn failed_session_write_rolls_back_the_whole_checkout() {
    let (store, user, products) = filled_cart().await;
    let first = checkout::checkout(store.as_ref(), quiet(), user, shipping()).await.unwrap();

    let mut watch = products[0].clone();
    watch.update_price(money(99_900));
    store.upsert_product(&watch).await.unwrap();
    store.mutate_cart(user, watch.id(), CartCommand::Add { quantity: 1 }).await.unwrap();
    let before = store.cart(user).await.unwrap();

    store.inject_checkout_fault(CheckoutFault::SessionWrite).await;
    let err = checkout::checkout(store.as_ref(), quiet(), user, shipping()).await.unwrap_err();
    assert!(matches!(err, EcommerceError::StorageError(_)));
    assert_eq!(store.cart(user).await.unwrap().items(), before.items());
    assert_eq!(store.orders_for_user(user).await.unwrap().len(), 1);
    assert_eq!(store.checkout_context(user).await.unwrap().unwrap().order_id, first.id());

    let second = checkout::checkout(store.as_ref(), quiet(), user, shipping()).await.unwrap();
    assert_eq!(second.total(), money(99_900));
    assert_eq!(store.checkout_context(user).await.unwrap().unwrap().order_id, second.id());

    let gateway = ScriptedGateway::new(vec![ScriptedGateway::success("https://pay.example/s/2")]);
    let redirect = payment::pay_for_checkout(store.as_ref(), &gateway, &gateway_config(), user).await.unwrap();
    assert_eq!(redirect.order_id, second.id());
    assert_eq!(gateway.sent()[0].total_amount, "999.00");
}

#[tokio::test]
async fn add_beyond_stock_is_rejected_and_cart_unchanged() {
    let (store, products) = seeded(&[("Mug", 800, 5)]).await;
    let user = UserId::new();
    let id = products[0].id();
    store.mutate_cart(user, id, CartCommand::Add { quantity: 1 }).await.unwrap();
    store.mutate_cart(user, id, CartCommand::Add { quantity: 4 }).await.unwrap();

    let err = store.mutate_cart(user, id, CartCommand::Add { quantity: 1 }).await.unwrap_err();
    assert!(matches!(err, EcommerceError::InsufficientStock { requested: 6, available: 5, .. }));
    assert_eq!(store.cart(user).await.unwrap().item(id).unwrap().quantity, 5);
}

#[tokio::test]
async fn set_quantity_above_stock_is_clamped() {
    let (store, products) = seeded(&[("Mug", 800, 5)]).await;
    let user = UserId::new();
    let id = products[0].id();
    store.mutate_cart(user, id, CartCommand::Add { quantity: 1 }).await.unwrap();

    let change = store.mutate_cart(user, id, CartCommand::SetQuantity { quantity: 10 }).await.unwrap();
    assert_eq!(change, CartChange::Quantity(QuantityChange::Clamped { requested: 10, applied: 5 }));
    assert!(change.warning().is_some());
    assert_eq!(store.cart(user).await.unwrap().item(id).unwrap().quantity, 5);

    let removed = store.mutate_cart(user, id, CartCommand::SetQuantity { quantity: 0 }).await.unwrap();
    assert_eq!(removed, CartChange::Quantity(QuantityChange::Removed));
    assert!(store.cart(user).await.unwrap().is_empty());
    let again = store.mutate_cart(user, id, CartCommand::Remove).await.unwrap();
    assert_eq!(again, CartChange::Removed { was_present: false });
}

#[tokio::test]
async fn success_callback_decrements_stock_exactly_once() {
    let (store, user, products) = filled_cart().await;
    let (notifier, mut sent) = ChannelNotifier::new();
    let order = checkout::checkout(store.as_ref(), notifier.clone(), user, shipping()).await.unwrap();
    assert!(matches!(next_sent(&mut sent).await, Sent::Event(OrderEvent::Placed { .. })));

    let first = fulfillment::payment_succeeded(store.as_ref(), notifier.clone(), user, order.id()).await.unwrap();
    assert_eq!(first.outcome, PaymentOutcome::Confirmed);
    assert!(first.order.is_paid());
    assert_eq!(first.order.status(), OrderStatus::Processing);
    assert_eq!(first.order.transaction_id(), Some(order.id().to_string().as_str()));

    let second = fulfillment::payment_succeeded(store.as_ref(), notifier.clone(), user, order.id()).await.unwrap();
    assert_eq!(second.outcome, PaymentOutcome::AlreadyPaid);

    assert_eq!(store.product(products[0].id()).await.unwrap().unwrap().stock().value(), 2);
    assert_eq!(store.product(products[1].id()).await.unwrap().unwrap().stock().value(), 0);

    let mut confirmations = 0;
    while let Ok(Some(msg)) = tokio::time::timeout(Duration::from_millis(200), sent.recv()).await {
        if msg == Sent::Confirmation(order.id()) { confirmations += 1; }
    }
    assert_eq!(confirmations, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_success_callbacks_confirm_once() {
    let (store, user, products) = filled_cart().await;
    let order_id = checkout::checkout(store.as_ref(), quiet(), user, shipping()).await.unwrap().id();

    let calls = (0..8).map(|_| {
        let store = store.clone();
        tokio::spawn(async move { fulfillment::payment_succeeded(store.as_ref(), quiet(), user, order_id).await.unwrap().outcome })
    });
    let mut confirmed = 0;
    for call in calls.collect::<Vec<_>>() {
        if call.await.unwrap() == PaymentOutcome::Confirmed { confirmed += 1; }
    }
    assert_eq!(confirmed, 1);
    assert_eq!(store.product(products[0].id()).await.unwrap().unwrap().stock().value(), 2);
}

#[tokio::test]
async fn stock_decrement_floors_at_zero() {
    let (store, user, products) = filled_cart().await;
    let order = checkout::checkout(store.as_ref(), quiet(), user, shipping()).await.unwrap();

    // Stock sold elsewhere between checkout and payment.
    let mut a = store.product(products[0].id()).await.unwrap().unwrap();
    a.sell(4);
    store.upsert_product(&a).await.unwrap();

    fulfillment::payment_succeeded(store.as_ref(), quiet(), user, order.id()).await.unwrap();
    assert_eq!(store.product(products[0].id()).await.unwrap().unwrap().stock().value(), 0);
}

#[tokio::test]
async fn order_prices_survive_catalog_changes() {
    let (store, user, products) = filled_cart().await;
    let order = checkout::checkout(store.as_ref(), quiet(), user, shipping()).await.unwrap();

    let mut a = products[0].clone();
    a.update_price(money(99_900));
    store.upsert_product(&a).await.unwrap();

    let stored = store.order(order.id()).await.unwrap().unwrap();
    assert_eq!(stored.total(), money(4000));
    assert_eq!(stored.items(), order.items());
}

#[tokio::test]
async fn fail_and_cancel_callbacks_cancel_without_touching_stock() {
    for cancel in [false, true] {
        let (store, user, products) = filled_cart().await;
        let order = checkout::checkout(store.as_ref(), quiet(), user, shipping()).await.unwrap();
        let result = if cancel {
            fulfillment::payment_canceled(store.as_ref(), quiet(), user, order.id()).await
        } else {
            fulfillment::payment_failed(store.as_ref(), quiet(), user, order.id()).await
        }
        .unwrap();
        assert_eq!(result.outcome, CancelOutcome::Canceled);

        let stored = store.order(order.id()).await.unwrap().unwrap();
        assert_eq!(stored.status(), OrderStatus::Canceled);
        assert!(!stored.is_paid());
        assert_eq!(store.product(products[0].id()).await.unwrap().unwrap().stock().value(), 5);

        // A late success callback cannot resurrect a canceled order.
        let err = fulfillment::payment_succeeded(store.as_ref(), quiet(), user, order.id()).await.unwrap_err();
        assert!(matches!(err, EcommerceError::InvalidTransition { from: OrderStatus::Canceled, .. }));
        assert_eq!(store.product(products[1].id()).await.unwrap().unwrap().stock().value(), 2);
    }
}

#[tokio::test]
async fn fail_callback_after_payment_is_ignored() {
    let (store, user, _) = filled_cart().await;
    let order = checkout::checkout(store.as_ref(), quiet(), user, shipping()).await.unwrap();
    fulfillment::payment_succeeded(store.as_ref(), quiet(), user, order.id()).await.unwrap();

    let result = fulfillment::payment_failed(store.as_ref(), quiet(), user, order.id()).await.unwrap();
    assert_eq!(result.outcome, CancelOutcome::AlreadyPaid);
    assert_eq!(store.order(order.id()).await.unwrap().unwrap().status(), OrderStatus::Processing);
}

#[tokio::test]
async fn callbacks_from_another_user_change_nothing() {
    let (store, user, products) = filled_cart().await;
    let order = checkout::checkout(store.as_ref(), quiet(), user, shipping()).await.unwrap();
    let intruder = UserId::new();

    let err = fulfillment::payment_succeeded(store.as_ref(), quiet(), intruder, order.id()).await.unwrap_err();
    assert!(matches!(err, EcommerceError::Unauthorized));
    let err = fulfillment::payment_canceled(store.as_ref(), quiet(), intruder, order.id()).await.unwrap_err();
    assert!(matches!(err, EcommerceError::Unauthorized));

    let stored = store.order(order.id()).await.unwrap().unwrap();
    assert_eq!(stored.status(), OrderStatus::Pending);
    assert_eq!(store.product(products[0].id()).await.unwrap().unwrap().stock().value(), 5);
}

#[tokio::test]
async fn notification_failure_does_not_undo_payment() {
    let (store, user, products) = filled_cart().await;
    let order = checkout::checkout(store.as_ref(), quiet(), user, shipping()).await.unwrap();

    let result = fulfillment::payment_succeeded(store.as_ref(), Arc::new(BrokenNotifier), user, order.id()).await.unwrap();
    assert_eq!(result.outcome, PaymentOutcome::Confirmed);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(store.order(order.id()).await.unwrap().unwrap().is_paid());
    assert_eq!(store.product(products[1].id()).await.unwrap().unwrap().stock().value(), 0);
}

#[tokio::test]
async fn payment_request_carries_order_snapshot() {
    let (store, user, _) = filled_cart().await;
    let order = checkout::checkout(store.as_ref(), quiet(), user, shipping()).await.unwrap();
    let gateway = ScriptedGateway::new(vec![ScriptedGateway::success("https://pay.example/session/1")]);
    let cfg = gateway_config();

    let redirect = payment::pay_for_checkout(store.as_ref(), &gateway, &cfg, user).await.unwrap();
    assert_eq!(redirect.redirect_url, "https://pay.example/session/1");
    assert_eq!(redirect.order_id, order.id());

    let sent = gateway.sent();
    assert_eq!(sent.len(), 1);
    let req = &sent[0];
    assert_eq!(req.total_amount.parse::<Decimal>().unwrap(), Decimal::new(40, 0));
    assert_eq!(req.tran_id, order.id().to_string());
    assert_eq!(req.success_url, format!("https://shop.example/payment/success/{}", order.id()));
    assert_eq!(req.fail_url, format!("https://shop.example/payment/fail/{}", order.id()));
    assert_eq!(req.cancel_url, format!("https://shop.example/payment/cancel/{}", order.id()));
    assert_eq!(req.cus_name, "Nusrat Jahan");
    assert_eq!(req.cus_country, "Bangladesh");
    assert_eq!(req.currency, "BDT");
    assert_eq!(req.shipping_method, "NO");
    assert_eq!(req.store_id, "teststore");
}

#[tokio::test]
async fn rejected_or_unreachable_gateway_leaves_order_retryable() {
    let (store, user, _) = filled_cart().await;
    let order = checkout::checkout(store.as_ref(), quiet(), user, shipping()).await.unwrap();
    let gateway = ScriptedGateway::new(vec![
        ScriptedGateway::failed("Invalid store"),
        Scripted::Down,
        ScriptedGateway::success("https://pay.example/retry"),
    ]);
    let cfg = gateway_config();

    let err = payment::pay_for_checkout(store.as_ref(), &gateway, &cfg, user).await.unwrap_err();
    assert!(matches!(err, EcommerceError::GatewayRejected(ref r) if r == "Invalid store"));
    let err = payment::pay_for_checkout(store.as_ref(), &gateway, &cfg, user).await.unwrap_err();
    assert!(matches!(err, EcommerceError::GatewayUnavailable(_)));

    let stored = store.order(order.id()).await.unwrap().unwrap();
    assert_eq!(stored.status(), OrderStatus::Pending);
    assert!(!stored.is_paid());

    let redirect = payment::pay_for_checkout(store.as_ref(), &gateway, &cfg, user).await.unwrap();
    assert_eq!(redirect.redirect_url, "https://pay.example/retry");
}

#[tokio::test]
async fn payment_needs_a_checkout_context() {
    let (store, _) = seeded(&[]).await;
    let gateway = ScriptedGateway::default();
    let err = payment::pay_for_checkout(store.as_ref(), &gateway, &gateway_config(), UserId::new()).await.unwrap_err();
    assert!(matches!(err, EcommerceError::NotFound("Checkout")));
    assert!(gateway.sent().is_empty());
}

#[tokio::test]
async fn paid_order_cannot_be_paid_again() {
    let (store, user, _) = filled_cart().await;
    let order = checkout::checkout(store.as_ref(), quiet(), user, shipping()).await.unwrap();
    fulfillment::payment_succeeded(store.as_ref(), quiet(), user, order.id()).await.unwrap();

    let gateway = ScriptedGateway::default();
    let err = payment::pay_for_checkout(store.as_ref(), &gateway, &gateway_config(), user).await.unwrap_err();
    assert!(matches!(err, EcommerceError::InvalidTransition { .. }));
    assert!(gateway.sent().is_empty());
}

#[tokio::test]
async fn fulfillment_steps_follow_the_lifecycle() {
    let (store, user, _) = filled_cart().await;
    let order = checkout::checkout(store.as_ref(), quiet(), user, shipping()).await.unwrap();

    let err = store.advance_order(order.id(), FulfillmentStep::Ship).await.unwrap_err();
    assert!(matches!(err, EcommerceError::InvalidTransition { from: OrderStatus::Pending, to: OrderStatus::Shipped }));

    fulfillment::payment_succeeded(store.as_ref(), quiet(), user, order.id()).await.unwrap();
    assert_eq!(store.advance_order(order.id(), FulfillmentStep::Ship).await.unwrap().status(), OrderStatus::Shipped);
    assert_eq!(store.advance_order(order.id(), FulfillmentStep::Deliver).await.unwrap().status(), OrderStatus::Delivered);
    assert!(store.advance_order(order.id(), FulfillmentStep::Cancel).await.is_err());
}

#[tokio::test]
async fn order_history_is_per_user_newest_first() {
    let (store, products) = seeded(&[("Tea", 300, 50)]).await;
    let user = UserId::new();
    let mut placed = vec![];
    for _ in 0..3 {
        store.mutate_cart(user, products[0].id(), CartCommand::Add { quantity: 1 }).await.unwrap();
        placed.push(checkout::checkout(store.as_ref(), quiet(), user, shipping()).await.unwrap().id());
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    let history: Vec<_> = store.orders_for_user(user).await.unwrap().iter().map(|o| o.id()).collect();
    placed.reverse();
    assert_eq!(history, placed);
    assert!(store.orders_for_user(UserId::new()).await.unwrap().is_empty());
}
