//! Shared browser engine lifecycle.
//!
//! Launching Chromium per request would dominate render latency, so a
//! single engine process is shared by all jobs and each job gets a fresh
//! isolated browsing context inside it (cookies, storage and DOM never
//! leak between concurrent renders). The handle launches lazily on first
//! use behind one lock, so two simultaneous cold requests cannot start two
//! processes. When the connection dies the handle is dropped and the next
//! acquire relaunches; the failing request itself is not retried.

use std::path::PathBuf;

use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::browser::BrowserContextId;
use chromiumoxide::cdp::browser_protocol::target::{
    CreateBrowserContextParams, CreateTargetParams, DisposeBrowserContextParams,
};
use chromiumoxide::error::CdpError;
use chromiumoxide::Page;
use futures::StreamExt;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{RenderError, Result};

/// Flags the engine is launched with. Headless is chromiumoxide's default;
/// the rest keep a containerized Chromium stable.
const LAUNCH_ARGS: [&str; 3] = [
    "--disable-gpu",
    "--disable-dev-shm-usage",
    "--hide-scrollbars",
];

#[derive(Debug, Clone, Default)]
pub struct EngineOptions {
    /// Explicit Chromium binary; autodetected when unset.
    pub chrome_executable: Option<PathBuf>,
    /// DevTools websocket URL of an external engine; connect instead of launch.
    pub remote_endpoint: Option<String>,
}

/// One isolated browsing context, held by exactly one render job.
#[derive(Debug)]
pub struct BrowsingContext {
    pub page: Page,
    context_id: BrowserContextId,
}

struct Engine {
    browser: Browser,
    handler_task: JoinHandle<()>,
}

/// Process-wide handle to the shared engine.
pub struct EngineHandle {
    options: EngineOptions,
    state: Mutex<Option<Engine>>,
}

impl EngineHandle {
    pub fn new(options: EngineOptions) -> Self {
        Self {
            options,
            state: Mutex::new(None),
        }
    }

    /// Hand out a fresh isolated context, launching or connecting to the
    /// engine first if needed. Connection-level failures surface as
    /// [`RenderError::EngineUnavailable`] and poison the handle so the next
    /// request starts clean.
    pub async fn acquire_context(&self) -> Result<BrowsingContext> {
        let mut state = self.state.lock().await;
        let engine = match state.as_mut() {
            Some(engine) => engine,
            None => state.insert(self.start().await?),
        };

        match open_context(&engine.browser).await {
            Ok(ctx) => {
                debug!(context = %ctx.context_id.inner(), "browsing context created");
                Ok(ctx)
            }
            Err(err) => {
                if is_connection_error(&err) {
                    if let Some(dead) = state.take() {
                        dead.handler_task.abort();
                    }
                }
                Err(RenderError::EngineUnavailable(err.to_string()))
            }
        }
    }

    /// Dispose a context once its job is done (or failed). The engine
    /// process stays warm. Best effort: a context we cannot dispose belongs
    /// to a connection that is already gone.
    pub async fn release_context(&self, ctx: BrowsingContext) {
        let mut state = self.state.lock().await;
        let Some(engine) = state.as_ref() else {
            return;
        };
        let context_id = ctx.context_id.clone();
        if let Err(err) = engine
            .browser
            .execute(DisposeBrowserContextParams::new(ctx.context_id))
            .await
        {
            warn!(context = %context_id.inner(), error = %err, "failed to dispose browsing context");
            if is_connection_error(&err) {
                if let Some(dead) = state.take() {
                    dead.handler_task.abort();
                }
            }
        }
    }

    /// Terminate the engine process on service shutdown.
    pub async fn shutdown(&self) {
        let mut state = self.state.lock().await;
        if let Some(mut engine) = state.take() {
            if let Err(err) = engine.browser.close().await {
                warn!(error = %err, "browser did not close cleanly");
            }
            engine.handler_task.abort();
        }
    }

    async fn start(&self) -> Result<Engine> {
        let (browser, mut handler) = match &self.options.remote_endpoint {
            Some(endpoint) => {
                info!(%endpoint, "connecting to external browser engine");
                Browser::connect(endpoint.clone())
                    .await
                    .map_err(|e| RenderError::EngineUnavailable(e.to_string()))?
            }
            None => {
                let mut builder = BrowserConfig::builder().no_sandbox();
                for arg in LAUNCH_ARGS {
                    builder = builder.arg(arg);
                }
                if let Some(path) = &self.options.chrome_executable {
                    builder = builder.chrome_executable(path);
                }
                let config = builder.build().map_err(RenderError::EngineUnavailable)?;
                Browser::launch(config)
                    .await
                    .map_err(|e| RenderError::EngineUnavailable(e.to_string()))?
            }
        };

        // The handler drives all CDP traffic; it ends when the connection does.
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        info!(endpoint = %browser.websocket_address(), "browser engine ready");
        Ok(Engine {
            browser,
            handler_task,
        })
    }
}

async fn open_context(browser: &Browser) -> std::result::Result<BrowsingContext, CdpError> {
    let created = browser
        .execute(CreateBrowserContextParams::default())
        .await?;
    let context_id = created.result.browser_context_id.clone();

    let mut target = CreateTargetParams::new("about:blank");
    target.browser_context_id = Some(context_id.clone());
    let page = browser.new_page(target).await?;

    Ok(BrowsingContext { page, context_id })
}

/// Whether a CDP failure means the engine connection itself is gone (as
/// opposed to a command-level error on a healthy connection).
fn is_connection_error(err: &CdpError) -> bool {
    let text = err.to_string();
    text.contains("AlreadyClosed")
        || text.contains("ConnectionClosed")
        || text.contains("connection")
        || matches!(err, CdpError::Ws(_))
}
