pub mod hyperliquid;
pub mod monitor;
pub mod notifier;
pub mod persistence;
pub mod status;
