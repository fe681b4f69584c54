// src/strategies/mod.rs
pub mod swing;
pub mod tracer;
pub mod traits;
