//! Tinybird 投递模块
//!
//! 先整批以 NDJSON 发送，整批失败时逐条回退发送，并汇总每条的结果。

mod client;
mod types;

pub use client::SinkClient;
pub use types::{Owned, RelayError, RelayOutcome};
