//! In-process tick source

use tokio::sync::mpsc;

use crate::Result;
use crate::provider::TickSource;
use crate::types::Tick;

/// Tick source fed through a bounded channel.
///
/// The stream ends once every sender has been dropped and the buffered ticks
/// are drained.
#[derive(Debug)]
pub struct ChannelSource {
    receiver: mpsc::Receiver<Tick>,
}

impl ChannelSource {
    /// Create a source and the sender that feeds it.
    pub fn channel(capacity: usize) -> (mpsc::Sender<Tick>, Self) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (sender, Self { receiver })
    }
}

impl From<mpsc::Receiver<Tick>> for ChannelSource {
    fn from(receiver: mpsc::Receiver<Tick>) -> Self {
        Self { receiver }
    }
}

#[async_trait::async_trait]
impl TickSource for ChannelSource {
    async fn next_tick(&mut self) -> Result<Option<Tick>> {
        Ok(self.receiver.recv().await)
    }
}
