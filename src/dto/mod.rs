pub mod address;
pub mod orders;
pub mod slots;
