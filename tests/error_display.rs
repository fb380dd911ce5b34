use std::time::Duration;

use hardcopy::RenderError;

#[test]
fn validation_error_display_includes_message() {
    let err = RenderError::validation("scale out of range");

    assert_eq!(format!("{}", err), "invalid request: scale out of range");
}

#[test]
fn io_error_display_wraps_source() {
    let io_err = std::io::Error::other("disk full");
    let err: RenderError = io_err.into();
    let rendered = format!("{}", err);

    assert!(rendered.starts_with("I/O error: "));
    assert!(rendered.contains("disk full"));
}

#[test]
fn navigation_helper_uses_reason() {
    let err = RenderError::navigation("net::ERR_NAME_NOT_RESOLVED");

    assert_eq!(
        format!("{}", err),
        "navigation failed: net::ERR_NAME_NOT_RESOLVED"
    );
}

#[test]
fn upstream_status_display_includes_code() {
    let err = RenderError::UpstreamStatus { code: 401 };

    assert_eq!(format!("{}", err), "upstream returned status 401");
}

#[test]
fn selector_not_found_display_includes_selector_and_window() {
    let err = RenderError::SelectorNotFound {
        selector: "#content".to_string(),
        timeout: Duration::from_secs(10),
    };
    let rendered = format!("{}", err);

    assert!(rendered.contains("#content"));
    assert!(rendered.contains("10s"));
}

#[test]
fn capture_helper_uses_message() {
    let err = RenderError::capture("page crashed");

    assert_eq!(format!("{}", err), "capture failed: page crashed");
}
