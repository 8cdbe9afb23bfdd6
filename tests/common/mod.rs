#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use storefront_delivery::{
    dto::{
        address::AddressInput,
        orders::{CreateOrderRequest, OrderLineRequest},
    },
    models::Product,
    services::slot_service::SlotSchedule,
    state::AppState,
    store::MemoryOrderStore,
};
use uuid::Uuid;

pub fn memory_state() -> (AppState, MemoryOrderStore) {
    let store = MemoryOrderStore::new();
    let state = AppState::new(Arc::new(store.clone()), SlotSchedule::default());
    (state, store)
}

pub async fn seed_product(
    store: &MemoryOrderStore,
    name: &str,
    price_cents: i64,
    stock_qty: i32,
) -> Product {
    let product = Product {
        id: Uuid::new_v4(),
        name: name.to_string(),
        price_cents,
        stock_qty,
        is_active: true,
    };
    store.insert_product(product.clone()).await;
    product
}

pub fn at(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .expect("rfc3339 timestamp")
        .with_timezone(&Utc)
}

pub fn line(product_id: Uuid, quantity: i64) -> OrderLineRequest {
    OrderLineRequest {
        product_id,
        quantity,
    }
}

pub fn sydney_address() -> AddressInput {
    AddressInput {
        address_line1: Some("1 George St".into()),
        suburb: Some("Sydney".into()),
        state: Some("NSW".into()),
        postcode: Some("2000".into()),
    }
}

pub fn pickup(items: Vec<OrderLineRequest>) -> CreateOrderRequest {
    CreateOrderRequest {
        items,
        delivery_method: "Pickup".into(),
        ..Default::default()
    }
}

pub fn delivery(items: Vec<OrderLineRequest>, slot_start: &str) -> CreateOrderRequest {
    let start = at(slot_start);
    CreateOrderRequest {
        items,
        delivery_method: "Delivery".into(),
        address: Some(sydney_address()),
        slot_start: Some(start),
        slot_end: Some(start + Duration::hours(1)),
    }
}
