//! 주기 프레임 캡처

pub mod frame;
pub mod scheduler;

pub use frame::{CaptureTick, FrameSource, LatestFrame, TickSink};
pub use scheduler::CaptureScheduler;
