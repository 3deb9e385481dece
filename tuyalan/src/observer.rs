//! State change notifications

use async_trait::async_trait;

use tuyalan_types::Datapoints;

/// Receives the merged snapshot after every unsolicited update
///
/// Called from the device's reader task, so implementations should hand
/// long work off to their own task.
#[async_trait]
pub trait StateObserver: Send + Sync {
    async fn state_updated(&self, device_id: &str, state: &Datapoints);
}
