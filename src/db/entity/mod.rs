pub mod user;
pub mod product;
pub mod price_history;

pub use user::Entity as User;
pub use product::Entity as Product;
pub use price_history::Entity as PriceHistory;
