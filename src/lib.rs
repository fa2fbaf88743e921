#![forbid(unsafe_code)]
//! Deterministic capture of animated web pages into fixed-duration videos.
//!
//! A page is loaded in an isolated browsing context, its animation clock is advanced frame by
//! frame (or it is recorded continuously), and the result is assembled into a video of an exact
//! target duration, published, and referenced back into editor documents. Batches run with a
//! concurrency ceiling and an explicit abort/continue error policy.

pub mod batch;
pub mod browser;
pub mod capture;
pub mod config;
pub mod document;
pub mod encode;
pub mod foundation;
pub mod model;
pub mod report;
pub mod session;
pub mod store;
pub mod time;

pub use batch::{BatchOrchestrator, PipelineRunner, SessionRunner};
pub use config::{CaptureMode, OnError, ReelConfig};
pub use document::convert_document;
pub use encode::{Encoder, FfmpegEncoder, VideoAssembler};
pub use foundation::core::{FrameIndex, FrameRate, Viewport};
pub use foundation::error::{ErrorKind, ReelError, ReelResult};
pub use model::{BatchReport, CaptureRequest, CaptureResult};
pub use report::ConversionResponse;
pub use session::{CaptureSession, SessionDeps, SessionState};
pub use store::{DirStore, Store};
pub use time::{ClockStrategy, TimeController};
