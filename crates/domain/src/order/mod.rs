//! Order aggregate, its actors and its repository.

mod actor;
mod aggregate;
mod repository;
mod request;

pub use actor::Actor;
pub use aggregate::{Order, OrderLine};
pub use repository::OrderRepository;
pub use request::PurchaseRequest;
