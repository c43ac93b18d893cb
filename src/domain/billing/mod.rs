//! Billing domain entities mutated by webhook processing.

mod merchant;
mod order;
mod subscription;

pub use merchant::Merchant;
pub use order::{Order, OrderStatus};
pub use subscription::{Subscription, SubscriptionStatus};
