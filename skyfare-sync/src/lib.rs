pub mod connectivity;
pub mod engine;
pub mod filter_worker;
pub mod remote;
pub mod search_cache;

pub use connectivity::{ConnectivityMonitor, ReachabilityEvent};
pub use engine::{BookingChange, SeatAdjustment, SyncEngine};
pub use filter_worker::FilterWorker;

use skyfare_core::gateway::GatewayError;
use skyfare_store::StoreError;

/// Failures surfaced by the engine. Remote errors never reach UI-facing
/// callers of the fallback-capable operations; store failures always do,
/// since there is no further fallback below the local store.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

pub type SyncResult<T> = Result<T, SyncError>;
