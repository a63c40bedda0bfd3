//! CDP (Chrome DevTools Protocol) layer
//!
//! WebSocket transport, wire types, the HTTP endpoint probe and the mock
//! transport used by tests.

pub mod connect;
pub mod driver;
pub mod mock;
pub mod traits;
pub mod types;

pub use connect::Endpoint;
pub use driver::Driver;
pub use traits::Transport;
