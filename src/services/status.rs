use std::sync::Arc;

use tokio::sync::{broadcast, RwLock};

use crate::models::candle::Candle;
use crate::models::reversal::{MonitorStatus, StatusSnapshot};

#[derive(Debug)]
pub struct StatusInner {
    pub status: RwLock<Option<MonitorStatus>>,
    /// Candle window as of the last successful cycle
    pub candles: RwLock<Vec<Candle>>,
    pub broadcaster: broadcast::Sender<StatusSnapshot>,
}

pub type SharedStatus = Arc<StatusInner>;

pub fn new_shared_status() -> SharedStatus {
    let (broadcaster, _receiver) = broadcast::channel(16);
    Arc::new(StatusInner {
        status: RwLock::new(None),
        candles: RwLock::new(Vec::new()),
        broadcaster,
    })
}

impl StatusInner {
    pub async fn publish(&self, status: MonitorStatus, candles: Option<Vec<Candle>>) {
        if let Some(candles) = candles {
            *self.candles.write().await = candles;
        }

        let snapshot = StatusSnapshot {
            as_of_ms: chrono::Utc::now().timestamp_millis() as u64,
            status: status.clone(),
        };

        *self.status.write().await = Some(status);
        // No subscribers is fine
        let _ = self.broadcaster.send(snapshot);
    }
}
