pub mod buffer;
pub mod codec;
pub mod runner;
pub mod worker;

pub use buffer::{BufferStats, FrameBuffer};
pub use codec::Codec;
pub use runner::{Pipeline, PipelineReport};
pub use worker::{EncodeWorker, WorkerReport};
