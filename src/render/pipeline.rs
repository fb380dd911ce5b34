//! The render pipeline: drives one browsing context from blank tab to
//! finished PDF or PNG on disk.
//!
//! Ordering matters and is fixed: admission permit, then browsing context,
//! then page configuration, then navigation and readiness, then capture.
//! Teardown runs in reverse on every path, success or failure, so a crashed
//! job can never leak a context, a permit, or a temp file.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chromiumoxide::cdp::browser_protocol::dom::Rgba;
use chromiumoxide::cdp::browser_protocol::emulation::{
    SetDefaultBackgroundColorOverrideParams, SetDeviceMetricsOverrideParams,
    SetEmulatedMediaParams,
};
use chromiumoxide::cdp::browser_protocol::network::{
    CookieParam, EnableParams as NetworkEnableParams, EventResponseReceived, Headers, LoaderId,
    ResourceType, SetExtraHttpHeadersParams,
};
use chromiumoxide::cdp::browser_protocol::page::{
    CaptureScreenshotFormat, EnableParams as PageEnableParams, EventLifecycleEvent,
    NavigateParams, PrintToPdfParams, SetLifecycleEventsEnabledParams,
};
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::{Element, Page};
use futures::{Stream, StreamExt};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::artifact::{TempArtifact, TempArtifactManager};
use crate::engine::EngineHandle;
use crate::error::{RenderError, Result};
use crate::gate::ConcurrencyGate;
use crate::logo::apply_logo;
use crate::render::intercept::RequestInterceptor;
use crate::request::{BasicAuth, OutputKind, PdfSettings, RenderRequest, Source};

/// How often we re-query the page for a pending `selector`.
const SELECTOR_POLL: Duration = Duration::from_millis(100);

/// Class added to `<html>` before capture so stylesheets can branch on the
/// output kind (`hardcopy--pdf` / `hardcopy--png`).
const MARKER_CLASS_PREFIX: &str = "hardcopy";

/// A finished render. The artifact still lives on disk until the caller
/// consumes it (or drops it).
pub struct RenderOutcome {
    pub artifact: TempArtifact,
    pub content_type: &'static str,
    pub bytes: u64,
    pub elapsed: Duration,
    /// Captured console/pageerror/blocked-request lines, empty unless the
    /// request asked for debug telemetry or domain blocking.
    pub debug_log: Vec<String>,
}

/// A failed render. Telemetry gathered up to the failure still matters to
/// whoever is diagnosing it, so the error travels with the elapsed time and
/// any captured page output.
pub struct RenderFailure {
    pub error: RenderError,
    pub elapsed: Duration,
    pub debug_log: Vec<String>,
}

impl RenderFailure {
    fn bare(error: RenderError, elapsed: Duration) -> Self {
        Self {
            error,
            elapsed,
            debug_log: Vec::new(),
        }
    }
}

pub struct RenderPipeline {
    engine: Arc<EngineHandle>,
    gate: ConcurrencyGate,
    artifacts: TempArtifactManager,
    navigation_timeout: Duration,
    selector_timeout: Duration,
}

impl RenderPipeline {
    pub fn new(
        engine: Arc<EngineHandle>,
        gate: ConcurrencyGate,
        artifacts: TempArtifactManager,
        navigation_timeout: Duration,
        selector_timeout: Duration,
    ) -> Self {
        Self {
            engine,
            gate,
            artifacts,
            navigation_timeout,
            selector_timeout,
        }
    }

    /// Execute one render job end to end.
    ///
    /// A permit is held for the whole lifetime of the browsing context, and
    /// the context is always disposed before the permit is returned. On any
    /// failure the partially written artifact is deleted before the error
    /// propagates.
    pub async fn render(
        &self,
        request: &RenderRequest,
    ) -> std::result::Result<RenderOutcome, RenderFailure> {
        let started = Instant::now();

        let permit = match self.gate.acquire().await {
            Ok(permit) => permit,
            Err(err) => return Err(RenderFailure::bare(err, started.elapsed())),
        };
        let ctx = match self.engine.acquire_context().await {
            Ok(ctx) => ctx,
            Err(err) => return Err(RenderFailure::bare(err, started.elapsed())),
        };
        // The output path is fixed before navigation so logs can reference
        // it even when the job dies mid-flight.
        let artifact = self.artifacts.output_for(&request.source, request.output);
        debug!(path = %artifact.path().display(), "render job admitted");

        let (driven, debug_log) = self.drive(&ctx.page, request, &artifact).await;

        self.engine.release_context(ctx).await;
        drop(permit);

        match driven {
            Ok(()) => {
                let bytes = artifact.size().await.unwrap_or(0);
                Ok(RenderOutcome {
                    artifact,
                    content_type: request.output.content_type(),
                    bytes,
                    elapsed: started.elapsed(),
                    debug_log,
                })
            }
            Err(error) => {
                // Dropping the artifact removes whatever was written.
                drop(artifact);
                Err(RenderFailure {
                    error,
                    elapsed: started.elapsed(),
                    debug_log,
                })
            }
        }
    }

    /// Configure the page, navigate, and capture. Runs entirely inside the
    /// permit/context envelope held by [`render`](Self::render). The debug
    /// buffer is drained on both paths so a failed job still surrenders
    /// whatever the page logged before it died.
    async fn drive(
        &self,
        page: &Page,
        request: &RenderRequest,
        artifact: &TempArtifact,
    ) -> (Result<()>, Vec<String>) {
        let interceptor = match self.prepare(page, request).await {
            Ok(interceptor) => interceptor,
            Err(err) => return (Err(err), Vec::new()),
        };
        let result = self.run(page, request, artifact).await;
        let debug_log = interceptor
            .map(|i| i.buffer().drain_lines())
            .unwrap_or_default();
        (result, debug_log)
    }

    /// Enable the event domains and arm interception. Must happen before
    /// navigation or the readiness signals are never delivered.
    async fn prepare(
        &self,
        page: &Page,
        request: &RenderRequest,
    ) -> Result<Option<RequestInterceptor>> {
        page.execute(PageEnableParams::default())
            .await
            .map_err(|e| RenderError::EngineUnavailable(e.to_string()))?;
        page.execute(SetLifecycleEventsEnabledParams::new(true))
            .await
            .map_err(|e| RenderError::EngineUnavailable(e.to_string()))?;
        page.execute(NetworkEnableParams::default())
            .await
            .map_err(|e| RenderError::EngineUnavailable(e.to_string()))?;

        if request.debug || !request.blocked_domains.is_empty() {
            let interceptor =
                RequestInterceptor::arm(page, request.blocked_domains.clone(), request.debug)
                    .await?;
            Ok(Some(interceptor))
        } else {
            Ok(None)
        }
    }

    async fn run(&self, page: &Page, request: &RenderRequest, artifact: &TempArtifact) -> Result<()> {
        if let Some(auth) = &request.auth {
            apply_basic_auth(page, auth).await?;
        }
        apply_viewport(page, request).await?;
        apply_media(page, request).await?;
        if request.source.is_url() {
            apply_cookies(page, request).await;
        }
        if let Some(ua) = &request.user_agent {
            page.set_user_agent(ua.as_str())
                .await
                .map_err(|e| RenderError::EngineUnavailable(e.to_string()))?;
        }

        self.navigate(page, request).await?;

        page.evaluate(format!(
            "document.documentElement.classList.add('{}--{}')",
            MARKER_CLASS_PREFIX, request.output
        ))
        .await
        .map_err(|e| RenderError::capture(format!("marker class: {e}")))?;

        let element = match &request.selector {
            Some(selector) => Some(self.wait_for_selector(page, selector).await?),
            None => None,
        };

        if !request.delay.is_zero() {
            tokio::time::sleep(request.delay).await;
        }

        match request.output {
            OutputKind::Pdf => {
                let params = build_pdf_params(&request.pdf);
                page.save_pdf(params, artifact.path())
                    .await
                    .map_err(|e| RenderError::capture(format!("pdf: {e}")))?;
            }
            OutputKind::Png => {
                capture_png(page, element.as_ref(), artifact).await?;
            }
        }

        Ok(())
    }

    /// Navigate to the request source and wait for the page to be ready
    /// (both `load` and `networkIdle`), all under the navigation timeout.
    /// For URL sources the main document status is checked afterwards and a
    /// non-2xx answer fails the job.
    async fn navigate(&self, page: &Page, request: &RenderRequest) -> Result<()> {
        let document_status: Arc<Mutex<Option<i64>>> = Arc::default();
        let watcher = if request.source.is_url() {
            let responses = page
                .event_listener::<EventResponseReceived>()
                .await
                .map_err(|e| RenderError::EngineUnavailable(e.to_string()))?;
            let slot = Arc::clone(&document_status);
            Some(tokio::spawn(watch_document_status(responses, slot)))
        } else {
            None
        };

        let lifecycle = page
            .event_listener::<EventLifecycleEvent>()
            .await
            .map_err(|e| RenderError::EngineUnavailable(e.to_string()))?;

        let target = match &request.source {
            Source::Url(url) => url.as_str().to_string(),
            // Inline documents go through the same navigation path as URLs
            // so readiness waiting works identically for both.
            Source::InlineHtml(html) => html_data_uri(html),
        };

        let navigation = async {
            let nav = page
                .execute(NavigateParams::new(target))
                .await
                .map_err(|e| RenderError::navigation(e.to_string()))?;
            if let Some(text) = nav.result.error_text.as_deref() {
                if !text.is_empty() {
                    return Err(RenderError::navigation(text.to_string()));
                }
            }
            // Readiness only counts for this navigation's loader; the
            // about:blank document the context starts on can still emit
            // stale lifecycle events after the listener is registered.
            if !wait_until_ready(lifecycle, nav.result.loader_id.as_ref()).await {
                return Err(RenderError::navigation(
                    "page event stream closed before load".to_string(),
                ));
            }
            Ok::<(), RenderError>(())
        };
        let outcome = tokio::time::timeout(self.navigation_timeout, navigation).await;
        if let Some(watcher) = watcher {
            watcher.abort();
        }

        match outcome {
            Err(_) => Err(RenderError::navigation(format!(
                "page not ready after {:?}",
                self.navigation_timeout
            ))),
            Ok(Err(err)) => Err(err),
            Ok(Ok(())) => {
                if request.source.is_url() {
                    let status = document_status.lock().unwrap_or_else(|e| e.into_inner());
                    if let Some(code) = *status {
                        if !(200..300).contains(&code) {
                            return Err(RenderError::UpstreamStatus { code: code as u16 });
                        }
                    }
                }
                Ok(())
            }
        }
    }

    /// Poll for `selector` until it resolves or the selector timeout lapses.
    async fn wait_for_selector(&self, page: &Page, selector: &str) -> Result<Element> {
        let deadline = Instant::now() + self.selector_timeout;
        loop {
            match page.find_element(selector).await {
                Ok(element) => return Ok(element),
                Err(_) if Instant::now() < deadline => {
                    tokio::time::sleep(SELECTOR_POLL).await;
                }
                Err(_) => {
                    return Err(RenderError::SelectorNotFound {
                        selector: selector.to_string(),
                        timeout: self.selector_timeout,
                    })
                }
            }
        }
    }
}

/// Record the status of the navigation's own document response.
async fn watch_document_status(
    responses: impl Stream<Item = Arc<EventResponseReceived>>,
    slot: Arc<Mutex<Option<i64>>>,
) {
    futures::pin_mut!(responses);
    while let Some(event) = responses.next().await {
        record_document_status(&event.r#type, event.response.status, &slot);
    }
}

/// Redirect hops never reach `responseReceived`, so the first `Document`
/// response carries the main document's final status. Later `Document`
/// responses belong to iframes and must not overwrite it.
fn record_document_status(kind: &ResourceType, status: i64, slot: &Mutex<Option<i64>>) {
    if *kind != ResourceType::Document {
        return;
    }
    let mut recorded = slot.lock().unwrap_or_else(|e| e.into_inner());
    if recorded.is_none() {
        *recorded = Some(status);
    }
}

/// Drain lifecycle events until the page has both finished loading and gone
/// network-idle, skipping events from other loaders. Returns `false` when
/// the stream ends first, which means the connection is gone. The caller
/// bounds the wait with the navigation timeout.
async fn wait_until_ready(
    events: impl Stream<Item = Arc<EventLifecycleEvent>>,
    loader: Option<&LoaderId>,
) -> bool {
    futures::pin_mut!(events);
    let mut loaded = false;
    let mut idle = false;
    while let Some(event) = events.next().await {
        if loader.is_some_and(|id| event.loader_id != *id) {
            continue;
        }
        match event.name.as_str() {
            "load" => loaded = true,
            "networkIdle" => idle = true,
            _ => {}
        }
        if loaded && idle {
            return true;
        }
    }
    false
}

async fn apply_basic_auth(page: &Page, auth: &BasicAuth) -> Result<()> {
    let token = BASE64.encode(format!("{}:{}", auth.username, auth.password));
    let headers = Headers::new(serde_json::json!({
        "Authorization": format!("Basic {token}"),
    }));
    page.execute(SetExtraHttpHeadersParams::new(headers))
        .await
        .map_err(|e| RenderError::EngineUnavailable(format!("auth header: {e}")))?;
    Ok(())
}

async fn apply_viewport(page: &Page, request: &RenderRequest) -> Result<()> {
    let viewport = request.viewport;
    let params = SetDeviceMetricsOverrideParams::builder()
        .width(i64::from(viewport.width))
        .height(i64::from(viewport.height))
        .device_scale_factor(f64::from(viewport.scale))
        .mobile(false)
        .build()
        .map_err(RenderError::Config)?;
    page.execute(params)
        .await
        .map_err(|e| RenderError::EngineUnavailable(format!("viewport: {e}")))?;
    Ok(())
}

async fn apply_media(page: &Page, request: &RenderRequest) -> Result<()> {
    let mut params = SetEmulatedMediaParams::default();
    params.media = Some(request.media.as_cdp().to_string());
    page.execute(params)
        .await
        .map_err(|e| RenderError::EngineUnavailable(format!("media emulation: {e}")))?;
    Ok(())
}

/// Install request cookies against the target origin. A malformed pair is
/// logged and skipped rather than failing the whole job.
async fn apply_cookies(page: &Page, request: &RenderRequest) {
    let Source::Url(url) = &request.source else {
        return;
    };
    for cookie in &request.cookies {
        let param = match CookieParam::builder()
            .name(&cookie.name)
            .value(&cookie.value)
            .url(url.as_str())
            .build()
        {
            Ok(param) => param,
            Err(err) => {
                warn!(cookie = %cookie.name, error = %err, "skipping malformed cookie");
                continue;
            }
        };
        if let Err(err) = page.set_cookies(vec![param]).await {
            warn!(cookie = %cookie.name, error = %err, "failed to set cookie");
        }
    }
}

async fn capture_png(
    page: &Page,
    element: Option<&Element>,
    artifact: &TempArtifact,
) -> Result<()> {
    match element {
        Some(element) => {
            // Fragment shots get a transparent canvas so they compose onto
            // any background.
            let mut background = SetDefaultBackgroundColorOverrideParams::default();
            background.color = Some(Rgba {
                r: 0,
                g: 0,
                b: 0,
                a: Some(0.0),
            });
            page.execute(background)
                .await
                .map_err(|e| RenderError::capture(format!("transparent background: {e}")))?;
            element
                .save_screenshot(CaptureScreenshotFormat::Png, artifact.path())
                .await
                .map_err(|e| RenderError::capture(format!("element screenshot: {e}")))?;
        }
        None => {
            let params = ScreenshotParams::builder()
                .format(CaptureScreenshotFormat::Png)
                .full_page(true)
                .build();
            page.save_screenshot(params, artifact.path())
                .await
                .map_err(|e| RenderError::capture(format!("screenshot: {e}")))?;
        }
    }
    Ok(())
}

/// Build the CDP print parameters from the request's PDF settings. Margins
/// arrive in their declared unit and leave as inches; logo placeholders in
/// the header template are substituted here, once.
pub(crate) fn build_pdf_params(pdf: &PdfSettings) -> PrintToPdfParams {
    let mut params = PrintToPdfParams::default();
    params.landscape = Some(pdf.landscape);
    params.print_background = Some(pdf.background);

    if let Some(format) = pdf.format {
        let (width, height) = format.size_inches();
        params.paper_width = Some(width);
        params.paper_height = Some(height);
    }

    let (top, right, bottom, left) = pdf.margins.to_inches();
    params.margin_top = Some(top);
    params.margin_right = Some(right);
    params.margin_bottom = Some(bottom);
    params.margin_left = Some(left);

    let header = pdf.header_template.as_ref().map(|template| match &pdf.logo {
        Some(logo) => apply_logo(template, logo),
        None => template.clone(),
    });
    let footer = pdf.footer_template.clone();
    params.display_header_footer = Some(header.is_some() || footer.is_some());
    params.header_template = header;
    params.footer_template = footer;

    params
}

/// Inline documents navigate like any URL via a base64 data URI.
fn html_data_uri(html: &str) -> String {
    format!("data:text/html;base64,{}", BASE64.encode(html))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineOptions;
    use crate::logo::{LogoAsset, LogoRegistry};
    use crate::request::{MarginUnit, PaperFormat, PdfMargins, SnapParams};
    use chromiumoxide::cdp::browser_protocol::network::MonotonicTime;
    use chromiumoxide::cdp::browser_protocol::page::FrameId;

    fn pdf_settings() -> PdfSettings {
        PdfSettings::default()
    }

    fn lifecycle_event(name: &str, loader: &str) -> Arc<EventLifecycleEvent> {
        Arc::new(EventLifecycleEvent {
            frame_id: FrameId::new("frame-1"),
            loader_id: LoaderId::new(loader),
            name: name.to_string(),
            timestamp: MonotonicTime::new(0.0),
        })
    }

    #[test]
    fn first_document_status_wins() {
        // The main document answers before any frame it embeds; a failing
        // iframe must not fail the job.
        let slot = Mutex::new(None);
        record_document_status(&ResourceType::Document, 200, &slot);
        record_document_status(&ResourceType::Document, 404, &slot);
        assert_eq!(*slot.lock().unwrap(), Some(200));
    }

    #[test]
    fn a_failing_main_document_is_recorded() {
        let slot = Mutex::new(None);
        record_document_status(&ResourceType::Document, 404, &slot);
        assert_eq!(*slot.lock().unwrap(), Some(404));
    }

    #[test]
    fn subresources_never_record_a_status() {
        let slot = Mutex::new(None);
        record_document_status(&ResourceType::Image, 500, &slot);
        record_document_status(&ResourceType::Xhr, 500, &slot);
        assert_eq!(*slot.lock().unwrap(), None);
    }

    #[tokio::test]
    async fn stale_lifecycle_events_do_not_satisfy_readiness() {
        let loader = LoaderId::new("nav-1");
        let events = futures::stream::iter(vec![
            lifecycle_event("load", "about-blank"),
            lifecycle_event("networkIdle", "about-blank"),
        ]);
        assert!(!wait_until_ready(events, Some(&loader)).await);
    }

    #[tokio::test]
    async fn readiness_needs_both_signals_from_the_navigation_loader() {
        let loader = LoaderId::new("nav-1");
        let events = futures::stream::iter(vec![
            lifecycle_event("load", "about-blank"),
            lifecycle_event("DOMContentLoaded", "nav-1"),
            lifecycle_event("load", "nav-1"),
            lifecycle_event("networkIdle", "nav-1"),
        ]);
        assert!(wait_until_ready(events, Some(&loader)).await);
    }

    #[tokio::test]
    async fn without_a_loader_id_any_load_and_idle_count() {
        let events = futures::stream::iter(vec![
            lifecycle_event("load", "a"),
            lifecycle_event("networkIdle", "b"),
        ]);
        assert!(wait_until_ready(events, None).await);
    }

    #[tokio::test]
    async fn failure_before_the_page_still_reports_elapsed_and_telemetry() {
        let engine = Arc::new(EngineHandle::new(EngineOptions {
            chrome_executable: Some("/nonexistent/chromium".into()),
            remote_endpoint: None,
        }));
        let pipeline = RenderPipeline::new(
            engine,
            ConcurrencyGate::new(1),
            TempArtifactManager::new(std::env::temp_dir()),
            Duration::from_secs(1),
            Duration::from_secs(1),
        );
        let params = SnapParams {
            url: Some("https://example.com".to_string()),
            ..SnapParams::default()
        };
        let request = RenderRequest::from_params(params, None, &LogoRegistry::empty()).unwrap();

        let Err(failure) = pipeline.render(&request).await else {
            panic!("render without an engine should fail");
        };
        assert!(matches!(failure.error, RenderError::EngineUnavailable(_)));
        assert!(failure.debug_log.is_empty());
    }

    #[test]
    fn default_pdf_params_use_default_margins() {
        let params = build_pdf_params(&pdf_settings());
        assert_eq!(params.margin_top, Some(0.0));
        assert_eq!(params.margin_right, Some(0.0));
        // 64px at 96dpi.
        assert_eq!(params.margin_bottom, Some(64.0 / 96.0));
        assert_eq!(params.margin_left, Some(0.0));
        assert_eq!(params.landscape, Some(false));
        assert_eq!(params.print_background, Some(false));
        assert_eq!(params.display_header_footer, Some(false));
        assert_eq!(params.paper_width, None);
        assert_eq!(params.paper_height, None);
    }

    #[test]
    fn paper_format_sets_dimensions_in_inches() {
        let mut settings = pdf_settings();
        settings.format = Some(PaperFormat::Letter);
        let params = build_pdf_params(&settings);
        assert_eq!(params.paper_width, Some(8.5));
        assert_eq!(params.paper_height, Some(11.0));
    }

    #[test]
    fn metric_margins_convert_to_inches() {
        let mut settings = pdf_settings();
        settings.margins = PdfMargins {
            top: 25.4,
            right: 0.0,
            bottom: 50.8,
            left: 12.7,
            unit: MarginUnit::Mm,
        };
        let params = build_pdf_params(&settings);
        assert_eq!(params.margin_top, Some(1.0));
        assert_eq!(params.margin_bottom, Some(2.0));
        assert_eq!(params.margin_left, Some(0.5));
    }

    #[test]
    fn landscape_and_background_flags_pass_through() {
        let mut settings = pdf_settings();
        settings.landscape = true;
        settings.background = true;
        let params = build_pdf_params(&settings);
        assert_eq!(params.landscape, Some(true));
        assert_eq!(params.print_background, Some(true));
    }

    #[test]
    fn header_template_enables_header_footer_display() {
        let mut settings = pdf_settings();
        settings.header_template = Some("<div>page</div>".to_string());
        let params = build_pdf_params(&settings);
        assert_eq!(params.display_header_footer, Some(true));
        assert_eq!(params.header_template.as_deref(), Some("<div>page</div>"));
        assert_eq!(params.footer_template, None);
    }

    #[test]
    fn footer_alone_enables_header_footer_display() {
        let mut settings = pdf_settings();
        settings.footer_template = Some("<span>f</span>".to_string());
        let params = build_pdf_params(&settings);
        assert_eq!(params.display_header_footer, Some(true));
        assert_eq!(params.header_template, None);
    }

    #[test]
    fn logo_placeholders_are_substituted_into_the_header() {
        let mut settings = pdf_settings();
        settings.header_template =
            Some("<img src=\"__LOGO_SRC__\" width=\"__LOGO_WIDTH__\" height=\"__LOGO_HEIGHT__\">".to_string());
        settings.logo = Some(LogoAsset {
            data_uri: "data:image/png;base64,AAAA".to_string(),
            width: 90.0,
            height: 30.0,
        });
        let params = build_pdf_params(&settings);
        let header = params.header_template.unwrap();
        assert!(header.contains("data:image/png;base64,AAAA"));
        assert!(header.contains("width=\"90\""));
        assert!(header.contains("height=\"30\""));
        assert!(!header.contains("__LOGO_"));
    }

    #[test]
    fn data_uri_encodes_the_document() {
        let uri = html_data_uri("<h1>hi</h1>");
        assert!(uri.starts_with("data:text/html;base64,"));
        let encoded = uri.trim_start_matches("data:text/html;base64,");
        assert_eq!(BASE64.decode(encoded).unwrap(), b"<h1>hi</h1>");
    }
}
