mod common;

use common::{at, delivery, line, memory_state, pickup, seed_product, sydney_address};
use chrono::{Duration, Utc};
use storefront_delivery::{
    dto::{
        address::AddressInput,
        orders::{CreateOrderRequest, UpdateOrderStatusRequest},
    },
    error::AppError,
    models::{
        Address, AustralianState, DeliveryMethod, Order, OrderStatus, Product, SlotWindow,
    },
    routes::params::OrderListQuery,
    services::order_service,
};
use uuid::Uuid;

fn status(value: &str) -> UpdateOrderStatusRequest {
    UpdateOrderStatusRequest {
        status: value.into(),
        note: None,
    }
}

#[tokio::test]
async fn pickup_order_snapshots_prices_and_takes_stock() -> anyhow::Result<()> {
    let (state, store) = memory_state();
    let mug = seed_product(&store, "Ferris Mug", 1200, 10).await;
    let hoodie = seed_product(&store, "Axum Hoodie", 5500, 3).await;
    let untouched = seed_product(&store, "Sticker Pack", 500, 7).await;

    let created = order_service::create_order(
        &state,
        pickup(vec![line(mug.id, 2), line(hoodie.id, 1)]),
    )
    .await?;
    assert_eq!(created.status, OrderStatus::Processing);

    let detail = order_service::get_order(&state, created.order_id).await?;
    assert_eq!(detail.order.total_cents, 2 * 1200 + 5500);
    assert_eq!(detail.order.delivery_method, DeliveryMethod::Pickup);
    assert!(detail.order.address.is_none());
    assert!(detail.order.slot.is_none());
    assert!(detail.history.is_empty());

    let item_sum: i64 = detail
        .items
        .iter()
        .map(|item| item.price_cents * i64::from(item.quantity))
        .sum();
    assert_eq!(item_sum, detail.order.total_cents);
    let names: Vec<_> = detail
        .items
        .iter()
        .map(|item| (item.line_no, item.name_at_purchase.as_str()))
        .collect();
    assert_eq!(names, vec![(1, "Ferris Mug"), (2, "Axum Hoodie")]);

    assert_eq!(store.product(mug.id).await.unwrap().stock_qty, 8);
    assert_eq!(store.product(hoodie.id).await.unwrap().stock_qty, 2);
    assert_eq!(store.product(untouched.id).await.unwrap().stock_qty, 7);

    let audit = store.audit_entries().await;
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0].action, "order_created");
    Ok(())
}

#[tokio::test]
async fn later_price_changes_do_not_touch_order_items() -> anyhow::Result<()> {
    let (state, store) = memory_state();
    let mug = seed_product(&store, "Ferris Mug", 1200, 10).await;

    let created = order_service::create_order(&state, pickup(vec![line(mug.id, 1)])).await?;

    store
        .insert_product(Product {
            name: "Ferris Mug v2".into(),
            price_cents: 9900,
            ..store.product(mug.id).await.unwrap()
        })
        .await;

    let detail = order_service::get_order(&state, created.order_id).await?;
    assert_eq!(detail.items[0].price_cents, 1200);
    assert_eq!(detail.items[0].name_at_purchase, "Ferris Mug");
    assert_eq!(detail.order.total_cents, 1200);
    Ok(())
}

#[tokio::test]
async fn insufficient_stock_is_rejected_and_stock_unchanged() {
    let (state, store) = memory_state();
    let widget = seed_product(&store, "Widget", 1000, 1).await;

    let err = order_service::create_order(&state, pickup(vec![line(widget.id, 2)]))
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Conflict(_)));
    assert_eq!(err.to_string(), "insufficient stock: Widget");
    assert_eq!(store.product(widget.id).await.unwrap().stock_qty, 1);
    assert_eq!(store.order_count().await, 0);
}

#[tokio::test]
async fn stock_decrement_refuses_to_go_negative() -> anyhow::Result<()> {
    let (state, store) = memory_state();
    let widget = seed_product(&store, "Widget", 1000, 2).await;

    let mut txn = state.store.begin().await?;
    let err = txn.decrement_stock(widget.id, 3).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
    assert_eq!(err.to_string(), "insufficient stock: Widget");
    drop(txn);

    assert_eq!(store.product(widget.id).await.unwrap().stock_qty, 2);
    Ok(())
}

#[tokio::test]
async fn repeated_lines_are_checked_against_their_combined_quantity() {
    let (state, store) = memory_state();
    let widget = seed_product(&store, "Widget", 1000, 3).await;

    let err = order_service::create_order(
        &state,
        pickup(vec![line(widget.id, 2), line(widget.id, 2)]),
    )
    .await
    .unwrap_err();
    assert_eq!(err.to_string(), "insufficient stock: Widget");
    assert_eq!(store.product(widget.id).await.unwrap().stock_qty, 3);
}

#[tokio::test]
async fn bad_postcode_is_rejected_before_any_product_lookup() {
    let (state, store) = memory_state();
    let widget = seed_product(&store, "Widget", 1000, 5).await;

    let mut request = delivery(vec![line(widget.id, 1)], "2025-10-25T10:00:00Z");
    request.address = Some(AddressInput {
        postcode: Some("ABC1".into()),
        ..sydney_address()
    });

    let err = order_service::create_order(&state, request).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
    assert_eq!(err.to_string(), "postcode must be 4 digits");
    assert_eq!(store.product_lookups(), 0);
    assert_eq!(store.order_count().await, 0);
}

#[tokio::test]
async fn request_shape_is_validated_before_the_store_is_touched() {
    let (state, store) = memory_state();
    let widget = seed_product(&store, "Widget", 1000, 5).await;

    let cases: Vec<(CreateOrderRequest, &str)> = vec![
        (pickup(vec![]), "items required"),
        (
            pickup(vec![line(widget.id, 0)]),
            "quantity must be a positive integer",
        ),
        (
            pickup(vec![line(widget.id, -3)]),
            "quantity must be a positive integer",
        ),
        (
            pickup(vec![line(widget.id, i64::from(i32::MAX) + 1)]),
            "quantity must be a positive integer",
        ),
        (
            CreateOrderRequest {
                delivery_method: "Courier".into(),
                ..pickup(vec![line(widget.id, 1)])
            },
            "invalid delivery method",
        ),
        (
            CreateOrderRequest {
                address: None,
                ..delivery(vec![line(widget.id, 1)], "2025-10-25T10:00:00Z")
            },
            "address required for delivery",
        ),
        (
            CreateOrderRequest {
                slot_end: None,
                ..delivery(vec![line(widget.id, 1)], "2025-10-25T10:00:00Z")
            },
            "delivery slot required",
        ),
        (
            delivery(vec![line(widget.id, 1)], "2025-10-25T08:00:00Z"),
            "invalid delivery slot",
        ),
    ];

    for (request, reason) in cases {
        let err = order_service::create_order(&state, request)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)), "{reason}");
        assert_eq!(err.to_string(), reason);
    }
    assert_eq!(store.product_lookups(), 0);
    assert_eq!(store.product(widget.id).await.unwrap().stock_qty, 5);
}

#[tokio::test]
async fn pickup_ignores_stray_address_and_slot() -> anyhow::Result<()> {
    let (state, store) = memory_state();
    let widget = seed_product(&store, "Widget", 1000, 5).await;

    let request = CreateOrderRequest {
        delivery_method: "Pickup".into(),
        ..delivery(vec![line(widget.id, 1)], "2025-10-25T10:00:00Z")
    };
    let created = order_service::create_order(&state, request).await?;

    let order = order_service::get_order(&state, created.order_id).await?.order;
    assert!(order.address.is_none());
    assert!(order.slot.is_none());
    Ok(())
}

#[tokio::test]
async fn unknown_or_inactive_products_abort_the_order() {
    let (state, store) = memory_state();
    let widget = seed_product(&store, "Widget", 1000, 5).await;
    let missing = Uuid::new_v4();

    let err = order_service::create_order(
        &state,
        pickup(vec![line(widget.id, 1), line(missing, 1)]),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
    assert_eq!(err.to_string(), format!("product not found: {missing}"));

    let retired = Product {
        id: Uuid::new_v4(),
        name: "Retired Granola".into(),
        price_cents: 950,
        stock_qty: 4,
        is_active: false,
    };
    store.insert_product(retired.clone()).await;
    let err = order_service::create_order(&state, pickup(vec![line(retired.id, 1)]))
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "product not available: Retired Granola");

    assert_eq!(store.product(widget.id).await.unwrap().stock_qty, 5);
    assert_eq!(store.order_count().await, 0);
}

#[tokio::test]
async fn failed_item_write_rolls_back_the_whole_order() {
    let (state, store) = memory_state();
    let widget = seed_product(&store, "Widget", 1000, 5).await;
    store.fail_item_inserts(true);

    let err = order_service::create_order(&state, pickup(vec![line(widget.id, 2)]))
        .await
        .unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(store.order_count().await, 0);
    assert_eq!(store.product(widget.id).await.unwrap().stock_qty, 5);
    assert!(store.audit_entries().await.is_empty());

    store.fail_item_inserts(false);
    order_service::create_order(&state, pickup(vec![line(widget.id, 2)]))
        .await
        .expect("order succeeds once the store recovers");
    assert_eq!(store.product(widget.id).await.unwrap().stock_qty, 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_orders_never_oversell() {
    let (state, store) = memory_state();
    let widget = seed_product(&store, "Widget", 1000, 5).await;

    let handles: Vec<_> = (0..20)
        .map(|_| {
            let state = state.clone();
            tokio::spawn(async move {
                order_service::create_order(&state, pickup(vec![line(widget.id, 1)])).await
            })
        })
        .collect();

    let mut placed = 0;
    let mut rejected = 0;
    for handle in handles {
        match handle.await.expect("task panicked") {
            Ok(_) => placed += 1,
            Err(AppError::Conflict(reason)) => {
                assert_eq!(reason, "insufficient stock: Widget");
                rejected += 1;
            }
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(placed, 5);
    assert_eq!(rejected, 15);
    assert_eq!(store.product(widget.id).await.unwrap().stock_qty, 0);
}

fn booked_delivery(slot_start: &str) -> Order {
    let start = at(slot_start);
    let now = Utc::now();
    Order {
        id: Uuid::new_v4(),
        delivery_method: DeliveryMethod::Delivery,
        address: Some(Address {
            address_line1: "8 Chapel St".into(),
            suburb: "Windsor".into(),
            state: AustralianState::Vic,
            postcode: "3181".into(),
        }),
        slot: Some(SlotWindow {
            start,
            end: start + Duration::hours(1),
        }),
        total_cents: 100,
        status: OrderStatus::Processing,
        created_at: now,
        updated_at: now,
    }
}

#[tokio::test]
async fn full_slot_rejects_further_bookings() -> anyhow::Result<()> {
    let (state, store) = memory_state();
    let widget = seed_product(&store, "Widget", 100, 100).await;

    for _ in 0..9 {
        store.insert_order(booked_delivery("2025-10-25T14:00:00Z")).await;
    }
    // The tenth booking still fits.
    order_service::create_order(
        &state,
        delivery(vec![line(widget.id, 1)], "2025-10-25T14:00:00Z"),
    )
    .await?;

    let err = order_service::create_order(
        &state,
        delivery(vec![line(widget.id, 1)], "2025-10-25T14:00:00Z"),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
    assert_eq!(err.to_string(), "delivery slot is full");
    assert_eq!(store.product(widget.id).await.unwrap().stock_qty, 99);
    assert_eq!(store.order_count().await, 10);

    // The neighbouring window is unaffected.
    order_service::create_order(
        &state,
        delivery(vec![line(widget.id, 1)], "2025-10-25T15:00:00Z"),
    )
    .await?;
    Ok(())
}

#[tokio::test]
async fn delivery_order_keeps_address_and_slot() -> anyhow::Result<()> {
    let (state, store) = memory_state();
    let widget = seed_product(&store, "Widget", 1000, 5).await;

    let created = order_service::create_order(
        &state,
        delivery(vec![line(widget.id, 1)], "2025-10-25T11:00:00Z"),
    )
    .await?;

    let order = order_service::get_order(&state, created.order_id).await?.order;
    assert_eq!(order.delivery_method, DeliveryMethod::Delivery);
    let address = order.address.expect("delivery address");
    assert_eq!(address.postcode, "2000");
    let slot = order.slot.expect("delivery slot");
    assert_eq!(slot.start, at("2025-10-25T11:00:00Z"));
    assert_eq!(slot.end, at("2025-10-25T12:00:00Z"));
    Ok(())
}

#[tokio::test]
async fn status_moves_forward_and_never_back() -> anyhow::Result<()> {
    let (state, store) = memory_state();
    let widget = seed_product(&store, "Widget", 1000, 5).await;
    let created = order_service::create_order(&state, pickup(vec![line(widget.id, 1)])).await?;
    assert_eq!(created.status, OrderStatus::Processing);

    let packed = order_service::update_status(&state, created.order_id, status("Packed")).await?;
    assert_eq!(packed.status, OrderStatus::Packed);

    let err = order_service::update_status(&state, created.order_id, status("Processing"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
    assert_eq!(err.to_string(), "status can only progress forward");

    let err = order_service::update_status(&state, created.order_id, status("Packed"))
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "status can only progress forward");

    let detail = order_service::get_order(&state, created.order_id).await?;
    assert_eq!(detail.order.status, OrderStatus::Packed);
    assert_eq!(detail.history.len(), 1);
    Ok(())
}

#[tokio::test]
async fn status_may_skip_ahead_and_history_is_appended() -> anyhow::Result<()> {
    let (state, store) = memory_state();
    let widget = seed_product(&store, "Widget", 1000, 5).await;
    let created = order_service::create_order(&state, pickup(vec![line(widget.id, 1)])).await?;

    order_service::update_status(
        &state,
        created.order_id,
        UpdateOrderStatusRequest {
            status: "OutForDelivery".into(),
            note: Some("  van 3  ".into()),
        },
    )
    .await?;
    order_service::update_status(
        &state,
        created.order_id,
        UpdateOrderStatusRequest {
            status: "Delivered".into(),
            note: Some("   ".into()),
        },
    )
    .await?;

    let detail = order_service::get_order(&state, created.order_id).await?;
    assert_eq!(detail.order.status, OrderStatus::Delivered);
    let observed: Vec<_> = detail.history.iter().map(|e| e.status).collect();
    assert_eq!(
        observed,
        vec![OrderStatus::OutForDelivery, OrderStatus::Delivered]
    );
    assert!(observed.windows(2).all(|pair| pair[0] < pair[1]));
    assert_eq!(detail.history[0].note.as_deref(), Some("van 3"));
    assert_eq!(detail.history[1].note, None);

    let err = order_service::update_status(&state, created.order_id, status("Delivered"))
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "status can only progress forward");

    let actions: Vec<_> = store
        .audit_entries()
        .await
        .into_iter()
        .map(|e| e.action)
        .collect();
    assert_eq!(
        actions,
        vec!["order_created", "order_status_update", "order_status_update"]
    );
    Ok(())
}

#[tokio::test]
async fn invalid_status_is_reported_before_order_lookup() {
    let (state, _store) = memory_state();

    let err = order_service::update_status(&state, Uuid::new_v4(), status("Cancelled"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
    assert_eq!(err.to_string(), "invalid status");

    let err = order_service::update_status(&state, Uuid::new_v4(), status("Packed"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
    assert_eq!(err.to_string(), "order not found");
}

#[tokio::test]
async fn list_orders_filters_and_pages() -> anyhow::Result<()> {
    let (state, store) = memory_state();
    let widget = seed_product(&store, "Widget", 1000, 50).await;

    let first = order_service::create_order(&state, pickup(vec![line(widget.id, 1)])).await?;
    order_service::create_order(
        &state,
        delivery(vec![line(widget.id, 1)], "2025-10-25T10:00:00Z"),
    )
    .await?;
    order_service::create_order(
        &state,
        delivery(vec![line(widget.id, 1)], "2025-10-26T10:00:00Z"),
    )
    .await?;
    order_service::update_status(&state, first.order_id, status("Packed")).await?;

    let (orders, meta) = order_service::list_orders(&state, OrderListQuery::default()).await?;
    assert_eq!(orders.len(), 3);
    assert_eq!(meta.total, Some(3));

    let (orders, _) = order_service::list_orders(
        &state,
        OrderListQuery {
            status: Some("Packed".into()),
            ..Default::default()
        },
    )
    .await?;
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].id, first.order_id);

    let (orders, meta) = order_service::list_orders(
        &state,
        OrderListQuery {
            delivery_method: Some("Delivery".into()),
            slot_date: Some("2025-10-25".into()),
            ..Default::default()
        },
    )
    .await?;
    assert_eq!(orders.len(), 1);
    assert_eq!(meta.total, Some(1));

    let (orders, meta) = order_service::list_orders(
        &state,
        OrderListQuery {
            page: Some(2),
            per_page: Some(2),
            ..Default::default()
        },
    )
    .await?;
    assert_eq!(orders.len(), 1);
    assert_eq!(meta.page, Some(2));
    assert_eq!(meta.total, Some(3));

    let err = order_service::list_orders(
        &state,
        OrderListQuery {
            status: Some("Shipped".into()),
            ..Default::default()
        },
    )
    .await
    .unwrap_err();
    assert_eq!(err.to_string(), "invalid status");
    Ok(())
}
