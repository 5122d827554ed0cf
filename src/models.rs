pub mod finance;
pub mod inventory;
pub mod service_order;
