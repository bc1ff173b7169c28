use crate::services::status::SharedStatus;

#[derive(Clone)]
pub struct AppState {
    pub status: SharedStatus,
    pub symbol: String,
    pub interval: String,
}
