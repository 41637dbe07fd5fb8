pub mod config;
pub mod enums;
pub mod error;
pub mod crypto;
pub mod db;
pub mod chains;
pub mod services;
pub mod api;
pub mod bot;
pub mod scheduler;
pub mod dex;

#[cfg(test)]
mod test_support;

pub use config::Config;
pub use enums::{ Chain, OrderSide, OrderStatus, TriggerCondition, TriggerType };
pub use error::{ AppError, Result };
