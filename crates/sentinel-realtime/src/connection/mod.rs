//! Transport connections attached to the hub.

pub mod handle;
pub mod pool;

pub use handle::ConnectionHandle;
pub use pool::ConnectionPool;
