use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::{
    audit::AuditEntry,
    error::{AppError, AppResult},
    models::{Order, OrderItem, OrderStatus, Product, SlotWindow, StatusHistoryEntry},
    store::{
        Fulfilment, NewOrder, NewOrderItem, NewStatusEntry, OrderFilter, OrderStore, OrderTxn,
    },
};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    products: HashMap<Uuid, Product>,
    orders: Vec<Order>,
    items: Vec<OrderItem>,
    history: Vec<StatusHistoryEntry>,
    audit: Vec<AuditEntry>,
}

#[derive(Debug, Default)]
struct Faults {
    fail_item_insert: AtomicBool,
    unavailable: AtomicBool,
    product_lookups: AtomicUsize,
}

impl Faults {
    fn check_available(&self) -> AppResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(AppError::Unavailable("store unavailable".into()));
        }
        Ok(())
    }
}

/// In-process store. One unit of work at a time holds the state lock, so
/// transactions are fully serialized; commit publishes the working copy.
#[derive(Clone, Default)]
pub struct MemoryOrderStore {
    state: Arc<Mutex<MemoryState>>,
    faults: Arc<Faults>,
}

impl MemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_product(&self, product: Product) {
        self.state
            .lock()
            .await
            .products
            .insert(product.id, product);
    }

    pub async fn product(&self, id: Uuid) -> Option<Product> {
        self.state.lock().await.products.get(&id).cloned()
    }

    pub async fn order_count(&self) -> usize {
        self.state.lock().await.orders.len()
    }

    pub async fn audit_entries(&self) -> Vec<AuditEntry> {
        self.state.lock().await.audit.clone()
    }

    /// Number of product lookups made through units of work so far.
    pub fn product_lookups(&self) -> usize {
        self.faults.product_lookups.load(Ordering::SeqCst)
    }

    /// Make every order item insert fail, to exercise rollback.
    pub fn fail_item_inserts(&self, fail: bool) {
        self.faults.fail_item_insert.store(fail, Ordering::SeqCst);
    }

    /// Make every store call fail as if the database were unreachable.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.faults.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Seed an order directly, bypassing stock and capacity checks.
    pub async fn insert_order(&self, order: Order) {
        self.state.lock().await.orders.push(order);
    }
}

#[async_trait]
impl OrderStore for MemoryOrderStore {
    async fn begin(&self) -> AppResult<Box<dyn OrderTxn>> {
        self.faults.check_available()?;
        let guard = self.state.clone().lock_owned().await;
        let working = (*guard).clone();
        Ok(Box::new(MemoryTxn {
            guard,
            working,
            faults: self.faults.clone(),
        }))
    }

    async fn slot_starts_within(&self, window: SlotWindow) -> AppResult<Vec<DateTime<Utc>>> {
        self.faults.check_available()?;
        let state = self.state.lock().await;
        Ok(state
            .orders
            .iter()
            .filter_map(|order| order.slot)
            .map(|slot| slot.start)
            .filter(|start| window.contains(*start))
            .collect())
    }

    async fn find_order(&self, id: Uuid) -> AppResult<Option<Order>> {
        self.faults.check_available()?;
        let state = self.state.lock().await;
        Ok(state.orders.iter().find(|order| order.id == id).cloned())
    }

    async fn order_items(&self, order_id: Uuid) -> AppResult<Vec<OrderItem>> {
        self.faults.check_available()?;
        let state = self.state.lock().await;
        let mut items: Vec<_> = state
            .items
            .iter()
            .filter(|item| item.order_id == order_id)
            .cloned()
            .collect();
        items.sort_by_key(|item| item.line_no);
        Ok(items)
    }

    async fn status_history(&self, order_id: Uuid) -> AppResult<Vec<StatusHistoryEntry>> {
        self.faults.check_available()?;
        let state = self.state.lock().await;
        let mut entries: Vec<_> = state
            .history
            .iter()
            .filter(|entry| entry.order_id == order_id)
            .cloned()
            .collect();
        // Stable, so entries sharing a timestamp keep insertion order.
        entries.sort_by_key(|entry| entry.created_at);
        Ok(entries)
    }

    async fn list_orders(&self, filter: &OrderFilter) -> AppResult<(Vec<Order>, u64)> {
        self.faults.check_available()?;
        let state = self.state.lock().await;
        let mut matching: Vec<Order> = state
            .orders
            .iter()
            .filter(|order| filter.status.is_none_or(|s| order.status == s))
            .filter(|order| filter.delivery_method.is_none_or(|m| order.delivery_method == m))
            .filter(|order| match filter.slot_within {
                Some(window) => order.slot.is_some_and(|slot| window.contains(slot.start)),
                None => true,
            })
            .cloned()
            .collect();

        matching.sort_by_key(|order| order.created_at);
        if filter.newest_first {
            matching.reverse();
        }

        let total = matching.len() as u64;
        let page = matching
            .into_iter()
            .skip(usize::try_from(filter.offset).unwrap_or(usize::MAX))
            .take(usize::try_from(filter.limit).unwrap_or(usize::MAX))
            .collect();
        Ok((page, total))
    }

    async fn record_audit(&self, entry: AuditEntry) -> AppResult<()> {
        self.faults.check_available()?;
        self.state.lock().await.audit.push(entry);
        Ok(())
    }
}

struct MemoryTxn {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
    faults: Arc<Faults>,
}

#[async_trait]
impl OrderTxn for MemoryTxn {
    async fn lock_products(&mut self, ids: &[Uuid]) -> AppResult<Vec<Product>> {
        self.faults.check_available()?;
        self.faults.product_lookups.fetch_add(1, Ordering::SeqCst);
        Ok(ids
            .iter()
            .filter_map(|id| self.working.products.get(id).cloned())
            .collect())
    }

    async fn lock_slot(&mut self, _slot: SlotWindow) -> AppResult<()> {
        // The unit of work already holds the whole store.
        Ok(())
    }

    async fn count_orders_in_slot(&mut self, slot: SlotWindow) -> AppResult<u32> {
        self.faults.check_available()?;
        let count = self
            .working
            .orders
            .iter()
            .filter(|order| order.slot.is_some_and(|s| slot.contains(s.start)))
            .count();
        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }

    async fn insert_order(&mut self, order: NewOrder) -> AppResult<Order> {
        self.faults.check_available()?;
        let delivery_method = order.fulfilment.method();
        let (address, slot) = match order.fulfilment {
            Fulfilment::Delivery { address, slot } => (Some(address), Some(slot)),
            Fulfilment::Pickup => (None, None),
        };
        let record = Order {
            id: order.id,
            delivery_method,
            address,
            slot,
            total_cents: order.total_cents,
            status: order.status,
            created_at: order.created_at,
            updated_at: order.created_at,
        };
        self.working.orders.push(record.clone());
        Ok(record)
    }

    async fn insert_item(&mut self, item: NewOrderItem) -> AppResult<OrderItem> {
        self.faults.check_available()?;
        if self.faults.fail_item_insert.load(Ordering::SeqCst) {
            return Err(AppError::Unavailable("order item write failed".into()));
        }
        let record = OrderItem {
            id: item.id,
            order_id: item.order_id,
            line_no: item.line_no,
            product_id: item.product_id,
            name_at_purchase: item.name_at_purchase,
            price_cents: item.price_cents,
            quantity: item.quantity,
            created_at: item.created_at,
        };
        self.working.items.push(record.clone());
        Ok(record)
    }

    async fn decrement_stock(&mut self, product_id: Uuid, quantity: i32) -> AppResult<()> {
        self.faults.check_available()?;
        let product = self
            .working
            .products
            .get_mut(&product_id)
            .ok_or_else(|| AppError::not_found(format!("product not found: {product_id}")))?;
        if product.stock_qty < quantity {
            return Err(AppError::conflict(format!(
                "insufficient stock: {}",
                product.name
            )));
        }
        product.stock_qty -= quantity;
        Ok(())
    }

    async fn lock_order(&mut self, id: Uuid) -> AppResult<Option<Order>> {
        self.faults.check_available()?;
        Ok(self.working.orders.iter().find(|o| o.id == id).cloned())
    }

    async fn set_status(
        &mut self,
        id: Uuid,
        status: OrderStatus,
        at: DateTime<Utc>,
    ) -> AppResult<Order> {
        self.faults.check_available()?;
        let order = self
            .working
            .orders
            .iter_mut()
            .find(|o| o.id == id)
            .ok_or_else(|| AppError::not_found("order not found"))?;
        order.status = status;
        order.updated_at = at;
        Ok(order.clone())
    }

    async fn append_history(&mut self, entry: NewStatusEntry) -> AppResult<StatusHistoryEntry> {
        self.faults.check_available()?;
        let record = StatusHistoryEntry {
            id: entry.id,
            order_id: entry.order_id,
            status: entry.status,
            note: entry.note,
            created_at: entry.created_at,
        };
        self.working.history.push(record.clone());
        Ok(record)
    }

    async fn commit(self: Box<Self>) -> AppResult<()> {
        let MemoryTxn {
            mut guard, working, ..
        } = *self;
        *guard = working;
        Ok(())
    }
}
