pub mod finance_service;
pub mod inventory_service;
pub mod order_service;
pub mod settlement;
pub mod status_machine;

#[cfg(test)]
mod scenarios;
