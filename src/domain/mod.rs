pub mod account;
pub mod gateway;
pub mod transaction;

pub use account::{Country, User, UserAccount};
pub use gateway::GatewayPriority;
pub use transaction::{
    NewTransaction, Transaction, TransactionStatus, TransactionType, Transition, TransitionError,
};
