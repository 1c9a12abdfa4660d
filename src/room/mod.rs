//! 면접 방: 두 참가자의 세션, 시그널링 중계, 캡처 수명

mod actor;
pub mod capture;
pub mod command;
pub mod event;
pub mod ice_buffer;
pub mod registry;
pub mod relay;

pub use capture::CaptureServices;
pub use command::{ConnectionHandle, RoomSnapshot, Signal};
pub use event::{LeaveReason, RoomEvent};
pub use registry::{RoomHandle, RoomRegistry};
