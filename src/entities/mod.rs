pub mod address;
pub mod cart;
pub mod cart_item;
pub mod order;
pub mod order_item;
pub mod product;
pub mod promo_code;
pub mod return_request;
pub mod user;

pub use address::Entity as Address;
pub use cart::Entity as Cart;
pub use cart_item::Entity as CartItem;
pub use order::Entity as Order;
pub use order_item::Entity as OrderItem;
pub use product::Entity as Product;
pub use promo_code::Entity as PromoCode;
pub use return_request::Entity as ReturnRequest;
pub use user::Entity as User;
