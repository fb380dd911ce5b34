//! hardcopy: an internal HTTP service that renders HTML to PDF or PNG
//! through a shared headless Chromium engine.
//!
//! Jobs arrive as `POST /snap` with either a `url` query parameter or an
//! inline `html` body field. Each admitted job gets its own isolated
//! browsing context; a semaphore bounds how many run at once; temporary
//! artifacts clean themselves up on every exit path.
//!
//! # Module Overview
//!
//! - [`engine`] - Lazy, self-healing handle to the Chromium process
//! - [`gate`] - Render-job admission control
//! - [`render`] - The pipeline from blank tab to finished artifact
//! - [`request`] - Parameter validation and the render-job data model
//! - [`artifact`] - Temp-file naming and RAII cleanup
//! - [`logo`] - Logo manifest and header-template substitution
//! - [`server`] - The axum HTTP surface
//! - [`config`] - TOML configuration with production defaults

pub mod artifact;
pub mod config;
pub mod engine;
pub mod error;
pub mod gate;
pub mod logo;
pub mod render;
pub mod request;
pub mod server;

pub use artifact::{TempArtifact, TempArtifactManager};
pub use config::{Config, LogFormat, LoggingConfig};
pub use engine::{BrowsingContext, EngineHandle, EngineOptions};
pub use error::{FieldError, RenderError, Result};
pub use gate::{ConcurrencyGate, RenderPermit};
pub use logo::{apply_logo, LogoAsset, LogoRegistry};
pub use render::{DebugBuffer, RenderFailure, RenderOutcome, RenderPipeline, RequestInterceptor};
pub use request::{
    BasicAuth, MediaKind, OutputKind, PaperFormat, RenderRequest, SnapParams, Source, Viewport,
};
pub use server::{build_router, AppState};
