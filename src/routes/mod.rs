mod auth;
mod balance;
mod orders;

pub use auth::auth_routes;
pub use balance::balance_routes;
pub use orders::{order_routes, withdrawal_routes};
