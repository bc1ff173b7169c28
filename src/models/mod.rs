pub mod candle;
pub mod health;
pub mod market;
pub mod reversal;
