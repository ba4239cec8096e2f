pub mod addresses;
pub mod carts;
pub mod inventory;
pub mod orders;
pub mod payments;
pub mod pricing;
pub mod returns;

pub use addresses::AddressService;
pub use carts::CartService;
pub use inventory::InventoryLedger;
pub use orders::OrderService;
pub use payments::{HttpPaymentGateway, MockPaymentGateway, PaymentGateway};
pub use returns::ReturnService;
