pub mod address_service;
pub mod order_service;
pub mod slot_service;
