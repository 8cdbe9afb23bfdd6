use std::collections::{BTreeMap, HashMap};

use chrono::Utc;
use uuid::Uuid;

use crate::{
    audit::log_audit,
    dto::orders::{
        CreateOrderRequest, CreateOrderResponse, OrderDetail, OrderLineRequest,
        UpdateOrderStatusRequest,
    },
    error::{AppError, AppResult},
    models::{DeliveryMethod, Order, OrderStatus, Product},
    response::Meta,
    routes::params::{OrderListQuery, SortOrder},
    services::{
        address_service::validate_address,
        slot_service::{PER_SLOT_CAPACITY, SlotSchedule},
    },
    state::AppState,
    store::{Fulfilment, NewOrder, NewOrderItem, NewStatusEntry, OrderFilter},
};

#[derive(Debug, Clone, Copy)]
struct OrderLine {
    product_id: Uuid,
    quantity: i32,
}

fn validate_lines(items: &[OrderLineRequest]) -> AppResult<Vec<OrderLine>> {
    if items.is_empty() {
        return Err(AppError::validation("items required"));
    }
    items
        .iter()
        .map(|item| {
            let quantity = i32::try_from(item.quantity)
                .ok()
                .filter(|q| *q > 0)
                .ok_or_else(|| AppError::validation("quantity must be a positive integer"))?;
            Ok(OrderLine {
                product_id: item.product_id,
                quantity,
            })
        })
        .collect()
}

/// Delivery needs a valid address and a timetable slot. Anything a pickup
/// request sends along is dropped so pickup orders never carry either.
fn resolve_fulfilment(
    schedule: &SlotSchedule,
    payload: &CreateOrderRequest,
) -> AppResult<Fulfilment> {
    match payload.delivery_method.parse::<DeliveryMethod>()? {
        DeliveryMethod::Delivery => {
            let input = payload
                .address
                .as_ref()
                .ok_or_else(|| AppError::validation("address required for delivery"))?;
            let address = validate_address(input)?;
            let slot = match (payload.slot_start, payload.slot_end) {
                (Some(start), Some(end)) => schedule.resolve_window(start, end)?,
                _ => return Err(AppError::validation("delivery slot required")),
            };
            Ok(Fulfilment::Delivery { address, slot })
        }
        DeliveryMethod::Pickup => {
            if payload.address.is_some() || payload.slot_start.is_some() {
                tracing::debug!("ignoring address/slot sent with a pickup order");
            }
            Ok(Fulfilment::Pickup)
        }
    }
}

/// Place an order in one unit of work: snapshot prices, check stock and
/// slot capacity, write the order and its items, then take the stock.
/// Any failure leaves the store untouched.
pub async fn create_order(
    state: &AppState,
    payload: CreateOrderRequest,
) -> AppResult<CreateOrderResponse> {
    let lines = validate_lines(&payload.items)?;
    let fulfilment = resolve_fulfilment(&state.schedule, &payload)?;

    let mut txn = state.store.begin().await?;

    if let Some(slot) = fulfilment.slot() {
        txn.lock_slot(slot).await?;
        let booked = txn.count_orders_in_slot(slot).await?;
        if booked >= PER_SLOT_CAPACITY {
            tracing::info!(slot_start = %slot.start, booked, "delivery slot is full");
            return Err(AppError::conflict("delivery slot is full"));
        }
    }

    let mut product_ids: Vec<Uuid> = lines.iter().map(|line| line.product_id).collect();
    product_ids.sort_unstable();
    product_ids.dedup();
    let products: HashMap<Uuid, Product> = txn
        .lock_products(&product_ids)
        .await?
        .into_iter()
        .map(|product| (product.id, product))
        .collect();

    let mut reserved: BTreeMap<Uuid, i32> = BTreeMap::new();
    let mut priced: Vec<(OrderLine, &Product)> = Vec::with_capacity(lines.len());
    let mut total_cents: i64 = 0;
    for line in &lines {
        let product = products.get(&line.product_id).ok_or_else(|| {
            AppError::not_found(format!("product not found: {}", line.product_id))
        })?;
        if !product.is_active {
            return Err(AppError::conflict(format!(
                "product not available: {}",
                product.name
            )));
        }

        let wanted = reserved.entry(product.id).or_insert(0);
        *wanted = wanted
            .checked_add(line.quantity)
            .ok_or_else(|| AppError::validation("quantity must be a positive integer"))?;
        if product.stock_qty < *wanted {
            return Err(AppError::conflict(format!(
                "insufficient stock: {}",
                product.name
            )));
        }

        total_cents = product
            .price_cents
            .checked_mul(i64::from(line.quantity))
            .and_then(|line_total| total_cents.checked_add(line_total))
            .ok_or_else(|| AppError::validation("order total out of range"))?;
        priced.push((*line, product));
    }

    let now = Utc::now();
    let order = txn
        .insert_order(NewOrder {
            id: Uuid::new_v4(),
            fulfilment,
            total_cents,
            status: OrderStatus::Processing,
            created_at: now,
        })
        .await?;

    for (line_no, (line, product)) in (1..).zip(&priced) {
        txn.insert_item(NewOrderItem {
            id: Uuid::new_v4(),
            order_id: order.id,
            line_no,
            product_id: product.id,
            name_at_purchase: product.name.clone(),
            price_cents: product.price_cents,
            quantity: line.quantity,
            created_at: now,
        })
        .await?;
    }

    for (product_id, quantity) in &reserved {
        txn.decrement_stock(*product_id, *quantity).await?;
    }

    txn.commit().await?;

    tracing::info!(
        order_id = %order.id,
        method = order.delivery_method.as_str(),
        total_cents,
        lines = lines.len(),
        "order created"
    );
    log_audit(
        state.store.as_ref(),
        "order_created",
        Some("orders"),
        Some(serde_json::json!({
            "order_id": order.id,
            "delivery_method": order.delivery_method.as_str(),
            "total_cents": total_cents,
        })),
    )
    .await;

    Ok(CreateOrderResponse {
        order_id: order.id,
        status: order.status,
    })
}

/// Move an order strictly forward through the status sequence and append
/// the transition to its history.
pub async fn update_status(
    state: &AppState,
    id: Uuid,
    payload: UpdateOrderStatusRequest,
) -> AppResult<Order> {
    let next: OrderStatus = payload.status.parse()?;
    let note = payload
        .note
        .map(|note| note.trim().to_string())
        .filter(|note| !note.is_empty());

    let mut txn = state.store.begin().await?;
    let current = txn
        .lock_order(id)
        .await?
        .ok_or_else(|| AppError::not_found("order not found"))?;

    if !current.status.can_advance_to(next) {
        return Err(AppError::conflict("status can only progress forward"));
    }

    let now = Utc::now();
    let order = txn.set_status(id, next, now).await?;
    txn.append_history(NewStatusEntry {
        id: Uuid::new_v4(),
        order_id: id,
        status: next,
        note,
        created_at: now,
    })
    .await?;
    txn.commit().await?;

    tracing::info!(order_id = %id, from = %current.status, to = %next, "order status updated");
    log_audit(
        state.store.as_ref(),
        "order_status_update",
        Some("orders"),
        Some(serde_json::json!({
            "order_id": id,
            "from": current.status.as_str(),
            "to": next.as_str(),
        })),
    )
    .await;

    Ok(order)
}

pub async fn get_order(state: &AppState, id: Uuid) -> AppResult<OrderDetail> {
    let order = state
        .store
        .find_order(id)
        .await?
        .ok_or_else(|| AppError::not_found("order not found"))?;
    let items = state.store.order_items(id).await?;
    let history = state.store.status_history(id).await?;

    Ok(OrderDetail {
        order,
        items,
        history,
    })
}

pub async fn list_orders(state: &AppState, query: OrderListQuery) -> AppResult<(Vec<Order>, Meta)> {
    let (page, per_page, offset) = query.pagination().normalize();

    let status = query
        .status
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .map(str::parse::<OrderStatus>)
        .transpose()?;
    let delivery_method = query
        .delivery_method
        .as_deref()
        .filter(|m| !m.trim().is_empty())
        .map(str::parse::<DeliveryMethod>)
        .transpose()?;
    let slot_within = match query.slot_date.as_deref().filter(|d| !d.trim().is_empty()) {
        Some(raw) => {
            let date = state.schedule.parse_date(Some(raw))?;
            Some(state.schedule.day_span(date)?)
        }
        None => None,
    };

    let filter = OrderFilter {
        status,
        delivery_method,
        slot_within,
        newest_first: matches!(query.sort_order.unwrap_or(SortOrder::Desc), SortOrder::Desc),
        limit: u64::try_from(per_page).unwrap_or(20),
        offset: u64::try_from(offset).unwrap_or(0),
    };

    let (orders, total) = state.store.list_orders(&filter).await?;
    Ok((orders, Meta::new(page, per_page, total)))
}
