//! Per-request network policy and diagnostics.
//!
//! When a request asks for domain blocking or debug capture, the pipeline
//! arms an interceptor on the page before navigation (interception armed
//! after navigation would miss the earliest requests). Blocked hosts are
//! matched by substring against the request's host; everything else
//! continues unmodified. Debug mode additionally records console output
//! and page exceptions. All of it lands in one per-job buffer that is
//! drained into the request's log record and then discarded.

use std::sync::{Arc, Mutex};

use chromiumoxide::cdp::browser_protocol::fetch::{
    ContinueRequestParams, EnableParams as FetchEnableParams, EventRequestPaused,
    FailRequestParams,
};
use chromiumoxide::cdp::browser_protocol::network::ErrorReason;
use chromiumoxide::cdp::js_protocol::runtime::{
    EnableParams as RuntimeEnableParams, EventConsoleApiCalled, EventExceptionThrown,
};
use chromiumoxide::Page;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::{RenderError, Result};

/// One tagged diagnostic line captured during a job.
#[derive(Debug, Clone)]
pub struct DebugEntry {
    pub category: &'static str,
    pub message: String,
}

/// Job-scoped diagnostic buffer. Cloned handles all append to the same
/// buffer; `drain()` empties it for the final log record so nothing is
/// retained past the job.
#[derive(Debug, Clone, Default)]
pub struct DebugBuffer {
    entries: Arc<Mutex<Vec<DebugEntry>>>,
}

impl DebugBuffer {
    pub fn push(&self, category: &'static str, message: impl Into<String>) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.push(DebugEntry {
            category,
            message: message.into(),
        });
    }

    pub fn drain(&self) -> Vec<DebugEntry> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        std::mem::take(&mut *entries)
    }

    /// Render the buffer as `category: message` lines for the log record.
    pub fn drain_lines(&self) -> Vec<String> {
        self.drain()
            .into_iter()
            .map(|e| format!("{}: {}", e.category, e.message))
            .collect()
    }
}

/// Wiring for fetch interception and telemetry hooks. Listener tasks are
/// aborted when this drops, so a failed job cannot leak them.
pub struct RequestInterceptor {
    buffer: DebugBuffer,
    tasks: Vec<JoinHandle<()>>,
}

impl RequestInterceptor {
    /// Arm interception and/or telemetry on a page. Must run before
    /// navigation. `blocked_domains` empty + `debug` false is a caller bug;
    /// the pipeline only constructs an interceptor when one of them is on.
    pub async fn arm(page: &Page, blocked_domains: Vec<String>, debug: bool) -> Result<Self> {
        let buffer = DebugBuffer::default();
        let mut tasks = Vec::new();

        if !blocked_domains.is_empty() {
            page.execute(FetchEnableParams::default())
                .await
                .map_err(|e| RenderError::EngineUnavailable(format!("fetch interception: {e}")))?;

            let paused = page
                .event_listener::<EventRequestPaused>()
                .await
                .map_err(|e| RenderError::EngineUnavailable(format!("fetch interception: {e}")))?;
            tasks.push(tokio::spawn(intercept_loop(
                page.clone(),
                paused,
                blocked_domains,
                buffer.clone(),
            )));
        }

        if debug {
            page.execute(RuntimeEnableParams::default())
                .await
                .map_err(|e| RenderError::EngineUnavailable(format!("runtime telemetry: {e}")))?;

            let console = page
                .event_listener::<EventConsoleApiCalled>()
                .await
                .map_err(|e| RenderError::EngineUnavailable(format!("runtime telemetry: {e}")))?;
            let console_buffer = buffer.clone();
            tasks.push(tokio::spawn(async move {
                futures::pin_mut!(console);
                while let Some(event) = console.next().await {
                    let kind = format!("console.{:?}", event.r#type).to_ascii_lowercase();
                    debug!(kind = %kind, "page console output");
                    console_buffer.push("console", format!("[{kind}] {}", describe_args(&event)));
                }
            }));

            let exceptions = page
                .event_listener::<EventExceptionThrown>()
                .await
                .map_err(|e| RenderError::EngineUnavailable(format!("runtime telemetry: {e}")))?;
            let exception_buffer = buffer.clone();
            tasks.push(tokio::spawn(async move {
                futures::pin_mut!(exceptions);
                while let Some(event) = exceptions.next().await {
                    let details = &event.exception_details;
                    let message = details
                        .exception
                        .as_ref()
                        .and_then(|e| e.description.clone())
                        .unwrap_or_else(|| details.text.clone());
                    exception_buffer.push("pageerror", message);
                }
            }));
        }

        Ok(Self { buffer, tasks })
    }

    pub fn buffer(&self) -> DebugBuffer {
        self.buffer.clone()
    }
}

impl Drop for RequestInterceptor {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

async fn intercept_loop(
    page: Page,
    paused: impl futures::Stream<Item = Arc<EventRequestPaused>>,
    blocked_domains: Vec<String>,
    buffer: DebugBuffer,
) {
    futures::pin_mut!(paused);
    while let Some(event) = paused.next().await {
        let request_id = event.request_id.clone();
        let url = event.request.url.clone();
        if host_is_blocked(&url, &blocked_domains) {
            buffer.push("blocked", url.clone());
            if let Err(err) = page
                .execute(FailRequestParams::new(request_id, ErrorReason::Aborted))
                .await
            {
                warn!(%url, error = %err, "failed to abort blocked request");
            }
        } else if let Err(err) = page.execute(ContinueRequestParams::new(request_id)).await {
            warn!(%url, error = %err, "failed to continue intercepted request");
        }
    }
}

/// Whether the URL's host contains any configured blocked substring.
pub fn host_is_blocked(url: &str, blocked_domains: &[String]) -> bool {
    let Some(host) = url::Url::parse(url).ok().and_then(|u| u.host_str().map(str::to_string))
    else {
        return false;
    };
    blocked_domains.iter().any(|domain| host.contains(domain))
}

fn describe_args(event: &EventConsoleApiCalled) -> String {
    event
        .args
        .iter()
        .map(|arg| {
            arg.value
                .as_ref()
                .map(|v| v.to_string())
                .or_else(|| arg.description.clone())
                .unwrap_or_else(|| "<object>".to_string())
        })
        .collect::<Vec<_>>()
        .join(" ")
}
