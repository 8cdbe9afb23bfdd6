use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::AppError;

/// Order progress. Declaration order is the only order a status may move in.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
pub enum OrderStatus {
    Processing,
    Packed,
    OutForDelivery,
    Delivered,
}

impl OrderStatus {
    pub const SEQUENCE: [OrderStatus; 4] = [
        OrderStatus::Processing,
        OrderStatus::Packed,
        OrderStatus::OutForDelivery,
        OrderStatus::Delivered,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Processing => "Processing",
            OrderStatus::Packed => "Packed",
            OrderStatus::OutForDelivery => "OutForDelivery",
            OrderStatus::Delivered => "Delivered",
        }
    }

    pub fn position(self) -> usize {
        self as usize
    }

    /// Skipping ahead is allowed; staying put or going back is not.
    pub fn can_advance_to(self, next: OrderStatus) -> bool {
        next.position() > self.position()
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        OrderStatus::SEQUENCE
            .into_iter()
            .find(|status| status.as_str() == value.trim())
            .ok_or_else(|| AppError::validation("invalid status"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum DeliveryMethod {
    Delivery,
    Pickup,
}

impl DeliveryMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryMethod::Delivery => "Delivery",
            DeliveryMethod::Pickup => "Pickup",
        }
    }
}

impl FromStr for DeliveryMethod {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "Delivery" => Ok(DeliveryMethod::Delivery),
            "Pickup" => Ok(DeliveryMethod::Pickup),
            _ => Err(AppError::validation("invalid delivery method")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum AustralianState {
    Nsw,
    Vic,
    Qld,
    Sa,
    Wa,
    Tas,
    Act,
    Nt,
}

impl AustralianState {
    pub const ALL: [AustralianState; 8] = [
        AustralianState::Nsw,
        AustralianState::Vic,
        AustralianState::Qld,
        AustralianState::Sa,
        AustralianState::Wa,
        AustralianState::Tas,
        AustralianState::Act,
        AustralianState::Nt,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AustralianState::Nsw => "NSW",
            AustralianState::Vic => "VIC",
            AustralianState::Qld => "QLD",
            AustralianState::Sa => "SA",
            AustralianState::Wa => "WA",
            AustralianState::Tas => "TAS",
            AustralianState::Act => "ACT",
            AustralianState::Nt => "NT",
        }
    }
}

impl FromStr for AustralianState {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        AustralianState::ALL
            .into_iter()
            .find(|state| state.as_str() == value)
            .ok_or_else(|| AppError::validation("invalid state"))
    }
}

/// A delivery address that has passed validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    pub address_line1: String,
    pub suburb: String,
    pub state: AustralianState,
    pub postcode: String,
}

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SlotWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl SlotWindow {
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at < self.end
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeliverySlot {
    pub slot_start: DateTime<Utc>,
    pub slot_end: DateTime<Utc>,
    pub remaining: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub price_cents: i64,
    pub stock_qty: i32,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: Uuid,
    pub delivery_method: DeliveryMethod,
    pub address: Option<Address>,
    pub slot: Option<SlotWindow>,
    pub total_cents: i64,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Line of an order, frozen at purchase time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub line_no: i32,
    pub product_id: Uuid,
    pub name_at_purchase: String,
    pub price_cents: i64,
    pub quantity: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StatusHistoryEntry {
    pub id: Uuid,
    pub order_id: Uuid,
    pub status: OrderStatus,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}
