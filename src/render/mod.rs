//! Render-job execution: the pipeline that drives a browser page from
//! blank tab to finished artifact, plus request interception.

pub mod intercept;
pub mod pipeline;

pub use intercept::{DebugBuffer, RequestInterceptor};
pub use pipeline::{RenderFailure, RenderOutcome, RenderPipeline};
