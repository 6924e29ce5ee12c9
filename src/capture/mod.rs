pub mod frame;
pub mod producer;
pub mod source;
pub mod synthetic;
pub mod throttle;
pub mod v4l2;

pub use frame::{DepthGeometry, EncodedFrame, Frame, FrameKind, FrameMetadata};
pub use producer::{run_capture, Admission, CaptureSummary, FrameProducer};
pub use source::{FrameSource, SourceStatus};
pub use synthetic::SyntheticSource;
pub use throttle::Throttle;
pub use v4l2::V4l2DepthSource;
