pub mod finance_repo;
pub use finance_repo::FinanceRepository;
pub mod inventory_repo;
pub use inventory_repo::InventoryRepository;
pub mod service_order_repo;
pub use service_order_repo::ServiceOrderRepository;
