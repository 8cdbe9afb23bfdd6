use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::sea_query::{Expr, LockType};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DatabaseTransaction, DbBackend,
    EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, Statement,
    TransactionTrait,
};
use uuid::Uuid;

use crate::{
    audit::AuditEntry,
    db::OrmConn,
    entity::{
        audit_logs::ActiveModel as AuditLogActive,
        order_items::{
            ActiveModel as OrderItemActive, Column as OrderItemCol, Entity as OrderItems,
            Model as OrderItemModel,
        },
        order_status_history::{
            ActiveModel as HistoryActive, Column as HistoryCol, Entity as OrderStatusHistory,
            Model as HistoryModel,
        },
        orders::{
            ActiveModel as OrderActive, Column as OrderCol, Entity as Orders,
            Model as OrderModel,
        },
        products::{Column as ProdCol, Entity as Products, Model as ProductModel},
    },
    error::{AppError, AppResult},
    models::{
        Address, AustralianState, DeliveryMethod, Order, OrderItem, OrderStatus, Product,
        SlotWindow, StatusHistoryEntry,
    },
    store::{
        Fulfilment, NewOrder, NewOrderItem, NewStatusEntry, OrderFilter, OrderStore, OrderTxn,
    },
};

/// Postgres-backed store. Everything goes through SeaORM on the shared pool.
#[derive(Clone)]
pub struct PgOrderStore {
    orm: OrmConn,
}

impl PgOrderStore {
    pub fn new(orm: OrmConn) -> Self {
        Self { orm }
    }
}

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn begin(&self) -> AppResult<Box<dyn OrderTxn>> {
        let txn = self.orm.begin().await?;
        Ok(Box::new(PgOrderTxn { txn }))
    }

    async fn slot_starts_within(&self, window: SlotWindow) -> AppResult<Vec<DateTime<Utc>>> {
        let starts: Vec<Option<sea_orm::prelude::DateTimeWithTimeZone>> = Orders::find()
            .select_only()
            .column(OrderCol::SlotStart)
            .filter(OrderCol::SlotStart.gte(window.start.fixed_offset()))
            .filter(OrderCol::SlotStart.lt(window.end.fixed_offset()))
            .into_tuple()
            .all(&self.orm)
            .await?;

        Ok(starts
            .into_iter()
            .flatten()
            .map(|dt| dt.with_timezone(&Utc))
            .collect())
    }

    async fn find_order(&self, id: Uuid) -> AppResult<Option<Order>> {
        Orders::find_by_id(id)
            .one(&self.orm)
            .await?
            .map(order_from_entity)
            .transpose()
    }

    async fn order_items(&self, order_id: Uuid) -> AppResult<Vec<OrderItem>> {
        let items = OrderItems::find()
            .filter(OrderItemCol::OrderId.eq(order_id))
            .order_by_asc(OrderItemCol::LineNo)
            .all(&self.orm)
            .await?
            .into_iter()
            .map(order_item_from_entity)
            .collect();
        Ok(items)
    }

    async fn status_history(&self, order_id: Uuid) -> AppResult<Vec<StatusHistoryEntry>> {
        OrderStatusHistory::find()
            .filter(HistoryCol::OrderId.eq(order_id))
            .order_by_asc(HistoryCol::CreatedAt)
            .all(&self.orm)
            .await?
            .into_iter()
            .map(history_from_entity)
            .collect()
    }

    async fn list_orders(&self, filter: &OrderFilter) -> AppResult<(Vec<Order>, u64)> {
        let mut condition = Condition::all();
        if let Some(status) = filter.status {
            condition = condition.add(OrderCol::Status.eq(status.as_str()));
        }
        if let Some(method) = filter.delivery_method {
            condition = condition.add(OrderCol::DeliveryMethod.eq(method.as_str()));
        }
        if let Some(window) = filter.slot_within {
            condition = condition
                .add(OrderCol::SlotStart.gte(window.start.fixed_offset()))
                .add(OrderCol::SlotStart.lt(window.end.fixed_offset()));
        }

        let mut finder = Orders::find().filter(condition);
        finder = if filter.newest_first {
            finder.order_by_desc(OrderCol::CreatedAt)
        } else {
            finder.order_by_asc(OrderCol::CreatedAt)
        };

        let total = finder.clone().count(&self.orm).await?;

        let orders = finder
            .limit(filter.limit)
            .offset(filter.offset)
            .all(&self.orm)
            .await?
            .into_iter()
            .map(order_from_entity)
            .collect::<AppResult<Vec<_>>>()?;

        Ok((orders, total))
    }

    async fn record_audit(&self, entry: AuditEntry) -> AppResult<()> {
        AuditLogActive {
            id: Set(Uuid::new_v4()),
            action: Set(entry.action),
            resource: Set(entry.resource),
            metadata: Set(entry.metadata),
            created_at: Set(Utc::now().fixed_offset()),
        }
        .insert(&self.orm)
        .await?;

        Ok(())
    }
}

pub struct PgOrderTxn {
    txn: DatabaseTransaction,
}

#[async_trait]
impl OrderTxn for PgOrderTxn {
    async fn lock_products(&mut self, ids: &[Uuid]) -> AppResult<Vec<Product>> {
        // Id order keeps concurrent checkouts from deadlocking on each other.
        let products = Products::find()
            .filter(ProdCol::Id.is_in(ids.iter().copied()))
            .order_by_asc(ProdCol::Id)
            .lock(LockType::Update)
            .all(&self.txn)
            .await?
            .into_iter()
            .map(product_from_entity)
            .collect();
        Ok(products)
    }

    async fn lock_slot(&mut self, slot: SlotWindow) -> AppResult<()> {
        self.txn
            .execute(Statement::from_sql_and_values(
                DbBackend::Postgres,
                "SELECT pg_advisory_xact_lock($1)",
                [slot.start.timestamp().into()],
            ))
            .await?;
        Ok(())
    }

    async fn count_orders_in_slot(&mut self, slot: SlotWindow) -> AppResult<u32> {
        let count = Orders::find()
            .filter(OrderCol::SlotStart.gte(slot.start.fixed_offset()))
            .filter(OrderCol::SlotStart.lt(slot.end.fixed_offset()))
            .count(&self.txn)
            .await?;
        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }

    async fn insert_order(&mut self, order: NewOrder) -> AppResult<Order> {
        let (address, slot) = match &order.fulfilment {
            Fulfilment::Delivery { address, slot } => (Some(address.clone()), Some(*slot)),
            Fulfilment::Pickup => (None, None),
        };

        let model = OrderActive {
            id: Set(order.id),
            delivery_method: Set(order.fulfilment.method().as_str().to_string()),
            address_line1: Set(address.as_ref().map(|a| a.address_line1.clone())),
            suburb: Set(address.as_ref().map(|a| a.suburb.clone())),
            state: Set(address.as_ref().map(|a| a.state.as_str().to_string())),
            postcode: Set(address.as_ref().map(|a| a.postcode.clone())),
            slot_start: Set(slot.map(|s| s.start.fixed_offset())),
            slot_end: Set(slot.map(|s| s.end.fixed_offset())),
            total_cents: Set(order.total_cents),
            status: Set(order.status.as_str().to_string()),
            created_at: Set(order.created_at.fixed_offset()),
            updated_at: Set(order.created_at.fixed_offset()),
        }
        .insert(&self.txn)
        .await?;

        order_from_entity(model)
    }

    async fn insert_item(&mut self, item: NewOrderItem) -> AppResult<OrderItem> {
        let model = OrderItemActive {
            id: Set(item.id),
            order_id: Set(item.order_id),
            line_no: Set(item.line_no),
            product_id: Set(item.product_id),
            name_at_purchase: Set(item.name_at_purchase),
            price_cents: Set(item.price_cents),
            quantity: Set(item.quantity),
            created_at: Set(item.created_at.fixed_offset()),
        }
        .insert(&self.txn)
        .await?;

        Ok(order_item_from_entity(model))
    }

    async fn decrement_stock(&mut self, product_id: Uuid, quantity: i32) -> AppResult<()> {
        let result = Products::update_many()
            .col_expr(ProdCol::StockQty, Expr::col(ProdCol::StockQty).sub(quantity))
            .filter(ProdCol::Id.eq(product_id))
            .filter(ProdCol::StockQty.gte(quantity))
            .exec(&self.txn)
            .await?;

        if result.rows_affected == 0 {
            let product = Products::find_by_id(product_id).one(&self.txn).await?;
            return Err(match product {
                Some(product) => {
                    AppError::conflict(format!("insufficient stock: {}", product.name))
                }
                None => AppError::not_found(format!("product not found: {product_id}")),
            });
        }
        Ok(())
    }

    async fn lock_order(&mut self, id: Uuid) -> AppResult<Option<Order>> {
        Orders::find_by_id(id)
            .lock(LockType::Update)
            .one(&self.txn)
            .await?
            .map(order_from_entity)
            .transpose()
    }

    async fn set_status(
        &mut self,
        id: Uuid,
        status: OrderStatus,
        at: DateTime<Utc>,
    ) -> AppResult<Order> {
        let model = OrderActive {
            id: Set(id),
            status: Set(status.as_str().to_string()),
            updated_at: Set(at.fixed_offset()),
            ..Default::default()
        }
        .update(&self.txn)
        .await?;

        order_from_entity(model)
    }

    async fn append_history(&mut self, entry: NewStatusEntry) -> AppResult<StatusHistoryEntry> {
        let model = HistoryActive {
            id: Set(entry.id),
            order_id: Set(entry.order_id),
            status: Set(entry.status.as_str().to_string()),
            note: Set(entry.note),
            created_at: Set(entry.created_at.fixed_offset()),
        }
        .insert(&self.txn)
        .await?;

        history_from_entity(model)
    }

    async fn commit(self: Box<Self>) -> AppResult<()> {
        self.txn.commit().await?;
        Ok(())
    }
}

fn corrupt_row(table: &str, id: Uuid, detail: &str) -> AppError {
    AppError::Internal(anyhow!("{table} row {id} is inconsistent: {detail}"))
}

fn order_from_entity(model: OrderModel) -> AppResult<Order> {
    let delivery_method: DeliveryMethod = model
        .delivery_method
        .parse()
        .map_err(|_| corrupt_row("orders", model.id, "delivery_method"))?;
    let status: OrderStatus = model
        .status
        .parse()
        .map_err(|_| corrupt_row("orders", model.id, "status"))?;

    let address = match (model.address_line1, model.suburb, model.state, model.postcode) {
        (Some(address_line1), Some(suburb), Some(state), Some(postcode)) => Some(Address {
            address_line1,
            suburb,
            state: state
                .parse::<AustralianState>()
                .map_err(|_| corrupt_row("orders", model.id, "state"))?,
            postcode,
        }),
        _ => None,
    };

    let slot = match (model.slot_start, model.slot_end) {
        (Some(start), Some(end)) => Some(SlotWindow {
            start: start.with_timezone(&Utc),
            end: end.with_timezone(&Utc),
        }),
        _ => None,
    };

    Ok(Order {
        id: model.id,
        delivery_method,
        address,
        slot,
        total_cents: model.total_cents,
        status,
        created_at: model.created_at.with_timezone(&Utc),
        updated_at: model.updated_at.with_timezone(&Utc),
    })
}

fn order_item_from_entity(model: OrderItemModel) -> OrderItem {
    OrderItem {
        id: model.id,
        order_id: model.order_id,
        line_no: model.line_no,
        product_id: model.product_id,
        name_at_purchase: model.name_at_purchase,
        price_cents: model.price_cents,
        quantity: model.quantity,
        created_at: model.created_at.with_timezone(&Utc),
    }
}

fn history_from_entity(model: HistoryModel) -> AppResult<StatusHistoryEntry> {
    let status: OrderStatus = model
        .status
        .parse()
        .map_err(|_| corrupt_row("order_status_history", model.id, "status"))?;
    Ok(StatusHistoryEntry {
        id: model.id,
        order_id: model.order_id,
        status,
        note: model.note,
        created_at: model.created_at.with_timezone(&Utc),
    })
}

fn product_from_entity(model: ProductModel) -> Product {
    Product {
        id: model.id,
        name: model.name,
        price_cents: model.price_cents,
        stock_qty: model.stock_qty,
        is_active: model.is_active,
    }
}
