//! Streaming proxy between the upstream media server and renderers.

mod proxy;
mod relay;
pub mod seek;

pub use proxy::{StreamRequest, StreamingProxy};
pub use relay::{relay, RelayGuard};
pub use seek::{requested_start_ticks, ProgressEstimator};
