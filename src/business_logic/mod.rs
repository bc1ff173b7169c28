pub mod backtest;
pub mod candle_store;
pub mod config;
pub mod patterns;
pub mod reversal;
pub mod swings;

#[cfg(test)]
pub(crate) mod fixtures;
