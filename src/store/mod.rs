//! Persistence seam for the order core.
//!
//! Services never talk to a database client directly. They receive an
//! `Arc<dyn OrderStore>` and do every multi-step write through an
//! [`OrderTxn`], so the same code runs against Postgres in production and
//! against [`memory::MemoryOrderStore`] in tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    audit::AuditEntry,
    error::AppResult,
    models::{
        Address, DeliveryMethod, Order, OrderItem, OrderStatus, Product, SlotWindow,
        StatusHistoryEntry,
    },
};

pub mod memory;
pub mod postgres;

pub use memory::MemoryOrderStore;
pub use postgres::PgOrderStore;

/// How an order will reach the customer. Address and slot only exist together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fulfilment {
    Delivery { address: Address, slot: SlotWindow },
    Pickup,
}

impl Fulfilment {
    pub fn method(&self) -> DeliveryMethod {
        match self {
            Fulfilment::Delivery { .. } => DeliveryMethod::Delivery,
            Fulfilment::Pickup => DeliveryMethod::Pickup,
        }
    }

    pub fn slot(&self) -> Option<SlotWindow> {
        match self {
            Fulfilment::Delivery { slot, .. } => Some(*slot),
            Fulfilment::Pickup => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewOrder {
    pub id: Uuid,
    pub fulfilment: Fulfilment,
    pub total_cents: i64,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewOrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    /// 1-based position of the line in the request.
    pub line_no: i32,
    pub product_id: Uuid,
    pub name_at_purchase: String,
    pub price_cents: i64,
    pub quantity: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewStatusEntry {
    pub id: Uuid,
    pub order_id: Uuid,
    pub status: OrderStatus,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct OrderFilter {
    pub status: Option<OrderStatus>,
    pub delivery_method: Option<DeliveryMethod>,
    /// Only orders whose slot start falls inside this window.
    pub slot_within: Option<SlotWindow>,
    pub newest_first: bool,
    pub limit: u64,
    pub offset: u64,
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Open a unit of work. Dropping it without [`OrderTxn::commit`] discards every write.
    async fn begin(&self) -> AppResult<Box<dyn OrderTxn>>;

    /// Slot starts of every order booked inside `window`.
    async fn slot_starts_within(&self, window: SlotWindow) -> AppResult<Vec<DateTime<Utc>>>;

    async fn find_order(&self, id: Uuid) -> AppResult<Option<Order>>;

    async fn order_items(&self, order_id: Uuid) -> AppResult<Vec<OrderItem>>;

    /// Oldest entry first.
    async fn status_history(&self, order_id: Uuid) -> AppResult<Vec<StatusHistoryEntry>>;

    /// Matching page plus the total number of matches.
    async fn list_orders(&self, filter: &OrderFilter) -> AppResult<(Vec<Order>, u64)>;

    async fn record_audit(&self, entry: AuditEntry) -> AppResult<()>;
}

/// Writes issued through one transaction against the store.
#[async_trait]
pub trait OrderTxn: Send {
    /// Fetch and lock the given products. Unknown ids are simply absent from the result.
    async fn lock_products(&mut self, ids: &[Uuid]) -> AppResult<Vec<Product>>;

    /// Serialize bookings of one slot until this unit of work ends.
    async fn lock_slot(&mut self, slot: SlotWindow) -> AppResult<()>;

    async fn count_orders_in_slot(&mut self, slot: SlotWindow) -> AppResult<u32>;

    async fn insert_order(&mut self, order: NewOrder) -> AppResult<Order>;

    async fn insert_item(&mut self, item: NewOrderItem) -> AppResult<OrderItem>;

    /// Fails with a conflict instead of letting stock drop below zero.
    async fn decrement_stock(&mut self, product_id: Uuid, quantity: i32) -> AppResult<()>;

    async fn lock_order(&mut self, id: Uuid) -> AppResult<Option<Order>>;

    async fn set_status(
        &mut self,
        id: Uuid,
        status: OrderStatus,
        at: DateTime<Utc>,
    ) -> AppResult<Order>;

    async fn append_history(&mut self, entry: NewStatusEntry) -> AppResult<StatusHistoryEntry>;

    async fn commit(self: Box<Self>) -> AppResult<()>;
}
