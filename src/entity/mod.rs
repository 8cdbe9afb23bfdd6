pub mod audit_logs;
pub mod order_items;
pub mod order_status_history;
pub mod orders;
pub mod products;
