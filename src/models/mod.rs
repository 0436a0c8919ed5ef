pub mod order;
pub mod token;
pub mod transaction;
pub mod user;

pub use order::{Order, OrderError, OrderStatus};
pub use token::TokenService;
pub use transaction::{signed_amount, Transaction, TransactionKind};
pub use user::{BalanceView, User, UserError};
