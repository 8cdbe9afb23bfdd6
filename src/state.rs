use std::sync::Arc;

use crate::{services::slot_service::SlotSchedule, store::OrderStore};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn OrderStore>,
    pub schedule: SlotSchedule,
}

impl AppState {
    pub fn new(store: Arc<dyn OrderStore>, schedule: SlotSchedule) -> Self {
        Self { store, schedule }
    }
}
