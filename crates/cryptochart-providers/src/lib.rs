pub mod binance;
pub mod error;
pub mod poll;
pub mod provider;
pub mod stream;
