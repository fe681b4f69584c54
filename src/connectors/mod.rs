// src/connectors/mod.rs
pub mod binance;
pub mod messages;
pub mod signer;
pub mod stream;
pub mod traits;
