//! Source trait for tick streams

use crate::Result;
use crate::types::Tick;

/// Trait for telemetry tick sources
///
/// Sources abstract over where ticks come from (a message bus subscription,
/// a recorded tick log, an in-process channel) and handle their own pacing.
#[async_trait::async_trait]
pub trait TickSource: Send + 'static {
    /// Get the next tick
    ///
    /// Returns:
    /// - `Ok(Some(tick))` - New tick available
    /// - `Ok(None)` - Stream ended (normal termination)
    /// - `Err(e)` - Error occurred; the driver retries with backoff
    async fn next_tick(&mut self) -> Result<Option<Tick>>;
}
