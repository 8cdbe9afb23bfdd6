use serde::Serialize;
use utoipa::ToSchema;

use crate::models::DeliverySlot;

/// Serialized as a bare array, earliest window first.
#[derive(Debug, Serialize, ToSchema)]
#[serde(transparent)]
pub struct SlotList {
    #[schema(value_type = Vec<DeliverySlot>)]
    pub slots: Vec<DeliverySlot>,
}
