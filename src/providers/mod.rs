//! Tick source implementations

mod channel;
mod replay;

pub use channel::ChannelSource;
pub use replay::{ReplayProvider, TickRecord};
