pub mod custody_service;
pub mod order_service;
pub mod price_service;
pub mod session_store;

pub use custody_service::CustodyService;
pub use order_service::OrderService;
pub use price_service::{ DexScreenerClient, MarketDataProvider };
pub use session_store::SessionStore;
