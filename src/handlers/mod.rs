//! 핸들러 모듈

pub mod connection;
pub mod ice;
pub mod room;
pub mod signaling;

pub use connection::*;
pub use ice::*;
pub use room::*;
pub use signaling::*;
