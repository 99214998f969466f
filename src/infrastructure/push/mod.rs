//! Push transport adapters.

pub mod local;
pub mod offline;

pub use local::LocalPushHub;
pub use offline::OfflineTransport;
