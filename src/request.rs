use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::FieldError;
use crate::logo::{LogoAsset, LogoRegistry};

/// Characters a CSS selector may contain. A selector cannot be regexed, so
/// this is an allow-list of the common cases; extend it if a legitimate
/// selector is being rejected. The leading space is intentional.
pub const ALLOWED_SELECTOR_CHARS: &str =
    " #.[]()-_=+:~^*abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Upper bound for the artificial pre-capture delay, milliseconds.
pub const MAX_DELAY_MS: u64 = 10_000;

/// Where the page content comes from. Exactly one of the two.
#[derive(Debug, Clone)]
pub enum Source {
    Url(Url),
    InlineHtml(String),
}

impl Source {
    pub fn is_url(&self) -> bool {
        matches!(self, Source::Url(_))
    }

    /// Byte length of the inline document, 0 for URL sources.
    pub fn input_size(&self) -> usize {
        match self {
            Source::Url(_) => 0,
            Source::InlineHtml(html) => html.len(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    Png,
    Pdf,
}

impl OutputKind {
    pub fn content_type(self) -> &'static str {
        match self {
            OutputKind::Png => "image/png",
            OutputKind::Pdf => "application/pdf",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            OutputKind::Png => "png",
            OutputKind::Pdf => "pdf",
        }
    }
}

impl fmt::Display for OutputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Screen,
    Print,
}

impl MediaKind {
    /// Value passed to `Emulation.setEmulatedMedia`.
    pub fn as_cdp(self) -> &'static str {
        match self {
            MediaKind::Screen => "screen",
            MediaKind::Print => "print",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
    /// Device scale factor, 1 to 3.
    pub scale: u8,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
            scale: 2,
        }
    }
}

/// Standard paper sizes accepted for PDF output, with Chromium's inch
/// dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaperFormat {
    Letter,
    Legal,
    Tabloid,
    Ledger,
    A0,
    A1,
    A2,
    A3,
    A4,
    A5,
    A6,
}

impl PaperFormat {
    pub const ALL: [&'static str; 11] = [
        "Letter", "Legal", "Tabloid", "Ledger", "A0", "A1", "A2", "A3", "A4", "A5", "A6",
    ];

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Letter" => Some(Self::Letter),
            "Legal" => Some(Self::Legal),
            "Tabloid" => Some(Self::Tabloid),
            "Ledger" => Some(Self::Ledger),
            "A0" => Some(Self::A0),
            "A1" => Some(Self::A1),
            "A2" => Some(Self::A2),
            "A3" => Some(Self::A3),
            "A4" => Some(Self::A4),
            "A5" => Some(Self::A5),
            "A6" => Some(Self::A6),
            _ => None,
        }
    }

    /// (width, height) in inches, portrait orientation.
    pub fn size_inches(self) -> (f64, f64) {
        match self {
            Self::Letter => (8.5, 11.0),
            Self::Legal => (8.5, 14.0),
            Self::Tabloid => (11.0, 17.0),
            Self::Ledger => (17.0, 11.0),
            Self::A0 => (33.1, 46.8),
            Self::A1 => (23.4, 33.1),
            Self::A2 => (16.54, 23.4),
            Self::A3 => (11.7, 16.54),
            Self::A4 => (8.27, 11.7),
            Self::A5 => (5.83, 8.27),
            Self::A6 => (4.13, 5.83),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarginUnit {
    Px,
    Mm,
    Cm,
    In,
}

impl MarginUnit {
    pub const ALL: [&'static str; 4] = ["px", "mm", "cm", "in"];

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "px" => Some(Self::Px),
            "mm" => Some(Self::Mm),
            "cm" => Some(Self::Cm),
            "in" => Some(Self::In),
            _ => None,
        }
    }

    /// Convert a value in this unit to inches (CSS reference: 96 px/in).
    pub fn to_inches(self, value: f64) -> f64 {
        match self {
            Self::Px => value / 96.0,
            Self::Mm => value / 25.4,
            Self::Cm => value / 2.54,
            Self::In => value,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PdfMargins {
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
    pub left: f64,
    pub unit: MarginUnit,
}

impl Default for PdfMargins {
    fn default() -> Self {
        Self {
            top: 0.0,
            right: 0.0,
            bottom: 64.0,
            left: 0.0,
            unit: MarginUnit::Px,
        }
    }
}

impl PdfMargins {
    /// (top, right, bottom, left) in inches.
    pub fn to_inches(&self) -> (f64, f64, f64, f64) {
        (
            self.unit.to_inches(self.top),
            self.unit.to_inches(self.right),
            self.unit.to_inches(self.bottom),
            self.unit.to_inches(self.left),
        )
    }
}

#[derive(Debug, Clone, Default)]
pub struct PdfSettings {
    pub format: Option<PaperFormat>,
    pub landscape: bool,
    pub background: bool,
    pub margins: PdfMargins,
    pub header_template: Option<String>,
    pub footer_template: Option<String>,
    /// Resolved by the HTTP layer from the logo manifest; substituted into
    /// the header template once, before generation.
    pub logo: Option<LogoAsset>,
}

#[derive(Debug, Clone)]
pub struct BasicAuth {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    pub name: String,
    pub value: String,
}

/// A fully validated render request. Constructed only through
/// [`RenderRequest::from_params`]; the pipeline never re-validates.
#[derive(Debug, Clone)]
pub struct RenderRequest {
    pub source: Source,
    pub output: OutputKind,
    pub viewport: Viewport,
    pub media: MediaKind,
    /// Scopes the capture to the matched element; forces full_page = false.
    pub selector: Option<String>,
    pub pdf: PdfSettings,
    pub auth: Option<BasicAuth>,
    pub cookies: Vec<Cookie>,
    pub user_agent: Option<String>,
    /// Host substrings; any in-flight request whose host contains one is aborted.
    pub blocked_domains: Vec<String>,
    pub debug: bool,
    pub delay: Duration,
    /// Identifier of the calling service, logged only.
    pub service: Option<String>,
}

impl RenderRequest {
    pub fn full_page(&self) -> bool {
        self.selector.is_none()
    }
}

/// Raw querystring parameters for `POST /snap`. Everything is optional and
/// string-typed; [`RenderRequest::from_params`] owns the real validation so
/// errors come back field-by-field instead of as a deserializer rejection.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SnapParams {
    pub url: Option<String>,
    pub width: Option<String>,
    pub height: Option<String>,
    pub scale: Option<String>,
    pub media: Option<String>,
    pub output: Option<String>,
    pub selector: Option<String>,
    #[serde(rename = "pdfFormat")]
    pub pdf_format: Option<String>,
    #[serde(rename = "pdfLandscape")]
    pub pdf_landscape: Option<String>,
    #[serde(rename = "pdfBackground")]
    pub pdf_background: Option<String>,
    #[serde(rename = "pdfMarginTop")]
    pub pdf_margin_top: Option<String>,
    #[serde(rename = "pdfMarginRight")]
    pub pdf_margin_right: Option<String>,
    #[serde(rename = "pdfMarginBottom")]
    pub pdf_margin_bottom: Option<String>,
    #[serde(rename = "pdfMarginLeft")]
    pub pdf_margin_left: Option<String>,
    #[serde(rename = "pdfMarginUnit")]
    pub pdf_margin_unit: Option<String>,
    #[serde(rename = "pdfHeader")]
    pub pdf_header: Option<String>,
    #[serde(rename = "pdfFooter")]
    pub pdf_footer: Option<String>,
    pub user: Option<String>,
    pub pass: Option<String>,
    pub cookies: Option<String>,
    pub logo: Option<String>,
    pub service: Option<String>,
    pub ua: Option<String>,
    pub delay: Option<String>,
    pub block: Option<String>,
    pub debug: Option<String>,
}

pub(crate) const EITHER_SOURCE_MSG: &str =
    "You must supply either `url` as a querystring parameter, or `html` as a URL-encoded form field.";
pub(crate) const BOTH_SOURCES_MSG: &str =
    "You must supply either `url` as a querystring parameter, OR `html` as a URL-encoded form field, but not both.";

impl RenderRequest {
    /// Validate raw parameters into a complete request. All problems are
    /// collected and reported together; the render core is never invoked on
    /// a request that failed here.
    pub fn from_params(
        params: SnapParams,
        html: Option<String>,
        logos: &LogoRegistry,
    ) -> std::result::Result<RenderRequest, Vec<FieldError>> {
        let mut errors = Vec::new();

        let html = html.filter(|h| !h.is_empty());

        // Exactly one source. This pair of errors mirrors the response shape
        // existing callers parse, so keep both entries.
        match (&params.url, &html) {
            (None, None) => {
                errors.push(FieldError::query("url", None, EITHER_SOURCE_MSG));
                errors.push(FieldError::body("html", None, EITHER_SOURCE_MSG));
                return Err(errors);
            }
            (Some(url), Some(_)) => {
                errors.push(FieldError::query("url", Some(url.clone()), BOTH_SOURCES_MSG));
                errors.push(FieldError::body("html", None, BOTH_SOURCES_MSG));
                return Err(errors);
            }
            _ => {}
        }

        let source = match (&params.url, html) {
            (Some(raw), None) => match Url::parse(raw) {
                Ok(url) if matches!(url.scheme(), "http" | "https") => Some(Source::Url(url)),
                Ok(url) => {
                    errors.push(FieldError::query(
                        "url",
                        Some(raw.clone()),
                        format!("Unsupported scheme `{}`; must be http or https", url.scheme()),
                    ));
                    None
                }
                Err(_) => {
                    errors.push(FieldError::query(
                        "url",
                        Some(raw.clone()),
                        "Must be a valid, fully-qualified URL",
                    ));
                    None
                }
            },
            (None, Some(html)) => Some(Source::InlineHtml(html)),
            _ => unreachable!("source cardinality checked above"),
        };

        let width = parse_dimension(&params.width, "width", &mut errors).unwrap_or(800);
        let height = parse_dimension(&params.height, "height", &mut errors).unwrap_or(600);

        let scale = match &params.scale {
            None => 2,
            Some(raw) => match raw.parse::<u8>() {
                Ok(s @ 1..=3) => s,
                _ => {
                    errors.push(FieldError::query(
                        "scale",
                        Some(raw.clone()),
                        "Must be an integer in the range: 1-3",
                    ));
                    2
                }
            },
        };

        let media = match params.media.as_deref() {
            None | Some("screen") => MediaKind::Screen,
            Some("print") => MediaKind::Print,
            Some(other) => {
                errors.push(FieldError::query(
                    "media",
                    Some(other.to_string()),
                    "Must be one of the following: print, screen",
                ));
                MediaKind::Screen
            }
        };

        let output = match params.output.as_deref() {
            None | Some("pdf") => OutputKind::Pdf,
            Some("png") => OutputKind::Png,
            Some(other) => {
                errors.push(FieldError::query(
                    "output",
                    Some(other.to_string()),
                    "Must be one of the following: png, pdf",
                ));
                OutputKind::Pdf
            }
        };

        let selector = match &params.selector {
            None => None,
            Some(raw) if raw.is_empty() => None,
            Some(raw) => {
                if raw.chars().all(|c| ALLOWED_SELECTOR_CHARS.contains(c)) {
                    Some(raw.clone())
                } else {
                    errors.push(FieldError::query(
                        "selector",
                        Some(raw.clone()),
                        format!(
                            "Must be a CSS selector made of the following characters: {ALLOWED_SELECTOR_CHARS}"
                        ),
                    ));
                    None
                }
            }
        };

        let format = match &params.pdf_format {
            None => Some(PaperFormat::A4),
            Some(raw) => match PaperFormat::parse(raw) {
                Some(f) => Some(f),
                None => {
                    errors.push(FieldError::query(
                        "pdfFormat",
                        Some(raw.clone()),
                        format!(
                            "Must be one of the following values: {}",
                            PaperFormat::ALL.join(", ")
                        ),
                    ));
                    None
                }
            },
        };

        let landscape = parse_bool(&params.pdf_landscape, "pdfLandscape", &mut errors);
        let background = parse_bool(&params.pdf_background, "pdfBackground", &mut errors);
        let debug = parse_bool(&params.debug, "debug", &mut errors);

        let unit = match &params.pdf_margin_unit {
            None => MarginUnit::Px,
            Some(raw) => MarginUnit::parse(raw).unwrap_or_else(|| {
                errors.push(FieldError::query(
                    "pdfMarginUnit",
                    Some(raw.clone()),
                    format!(
                        "Must be one of the following values: {}",
                        MarginUnit::ALL.join(", ")
                    ),
                ));
                MarginUnit::Px
            }),
        };

        let margins = PdfMargins {
            top: parse_margin(&params.pdf_margin_top, "pdfMarginTop", 0.0, &mut errors),
            right: parse_margin(&params.pdf_margin_right, "pdfMarginRight", 0.0, &mut errors),
            bottom: parse_margin(&params.pdf_margin_bottom, "pdfMarginBottom", 64.0, &mut errors),
            left: parse_margin(&params.pdf_margin_left, "pdfMarginLeft", 0.0, &mut errors),
            unit,
        };

        let auth = match (&params.user, &params.pass) {
            (Some(user), Some(pass)) if !user.is_empty() && !pass.is_empty() => {
                for (param, value) in [("user", user), ("pass", pass)] {
                    if !value.chars().all(|c| c.is_ascii_alphanumeric()) {
                        errors.push(FieldError::query(
                            param,
                            (param == "user").then(|| value.clone()),
                            "Must be an alphanumeric string",
                        ));
                    }
                }
                Some(BasicAuth {
                    username: user.clone(),
                    password: pass.clone(),
                })
            }
            _ => None,
        };

        let service = match &params.service {
            None => None,
            Some(raw) => {
                if raw.chars().all(|c| c.is_ascii_alphanumeric()) {
                    Some(raw.clone())
                } else {
                    errors.push(FieldError::query(
                        "service",
                        Some(raw.clone()),
                        "Must be an alphanumeric string identifier for the requesting service.",
                    ));
                    None
                }
            }
        };

        let delay = match &params.delay {
            None => Duration::ZERO,
            Some(raw) => match raw.parse::<u64>() {
                Ok(ms) if ms <= MAX_DELAY_MS => Duration::from_millis(ms),
                _ => {
                    errors.push(FieldError::query(
                        "delay",
                        Some(raw.clone()),
                        format!("Must be an integer in the range: 0-{MAX_DELAY_MS} (milliseconds)"),
                    ));
                    Duration::ZERO
                }
            },
        };

        let logo = match &params.logo {
            None => None,
            Some(name) => match logos.resolve(name) {
                Ok(Some(asset)) => Some(asset),
                Ok(None) => {
                    errors.push(FieldError::query(
                        "logo",
                        Some(name.clone()),
                        format!(
                            "Must be one of the following values: {}",
                            logos.names().join(", ")
                        ),
                    ));
                    None
                }
                Err(e) => {
                    errors.push(FieldError::query(
                        "logo",
                        Some(name.clone()),
                        format!("Logo asset could not be read: {e}"),
                    ));
                    None
                }
            },
        };

        if !errors.is_empty() {
            return Err(errors);
        }

        Ok(RenderRequest {
            // safe: a missing source returned early, a malformed one errored
            source: source.expect("source validated"),
            output,
            viewport: Viewport {
                width,
                height,
                scale,
            },
            media,
            selector,
            pdf: PdfSettings {
                format,
                landscape,
                background,
                margins,
                header_template: params.pdf_header.filter(|s| !s.is_empty()),
                footer_template: params.pdf_footer.filter(|s| !s.is_empty()),
                logo,
            },
            auth,
            cookies: parse_cookies(params.cookies.as_deref().unwrap_or_default()),
            user_agent: params.ua.filter(|s| !s.is_empty()),
            blocked_domains: parse_blocked(params.block.as_deref().unwrap_or_default()),
            debug,
            delay,
            service,
        })
    }
}

fn parse_dimension(
    raw: &Option<String>,
    param: &'static str,
    errors: &mut Vec<FieldError>,
) -> Option<u32> {
    let raw = raw.as_ref()?;
    match raw.parse::<u32>() {
        Ok(v) if v > 0 => Some(v),
        _ => {
            errors.push(FieldError::query(
                param,
                Some(raw.clone()),
                "Must be a positive integer with no units",
            ));
            None
        }
    }
}

fn parse_bool(raw: &Option<String>, param: &'static str, errors: &mut Vec<FieldError>) -> bool {
    match raw.as_deref() {
        None | Some("false") => false,
        Some("true") => true,
        Some(other) => {
            errors.push(FieldError::query(
                param,
                Some(other.to_string()),
                "Must be one of the following: true, false",
            ));
            false
        }
    }
}

fn parse_margin(
    raw: &Option<String>,
    param: &'static str,
    default: f64,
    errors: &mut Vec<FieldError>,
) -> f64 {
    match raw {
        None => default,
        Some(raw) => match raw.parse::<f64>() {
            Ok(v) if v.is_finite() && v >= 0.0 => v,
            _ => {
                errors.push(FieldError::query(
                    param,
                    Some(raw.clone()),
                    "Must be a decimal with no units. Use pdfMarginUnit to set units.",
                ));
                default
            }
        },
    }
}

/// Parse a `name=value; name2=value2` cookie string. A pair without `=`
/// yields an empty value; the pipeline logs and skips cookies the browser
/// rejects, so lenience here matches the downstream contract.
pub fn parse_cookies(raw: &str) -> Vec<Cookie> {
    raw.split("; ")
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
            Cookie {
                name: name.to_string(),
                value: value.to_string(),
            }
        })
        .collect()
}

/// Parse the comma-separated blocked-domain list, dropping empties.
pub fn parse_blocked(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> LogoRegistry {
        LogoRegistry::empty()
    }

    fn valid_url_params() -> SnapParams {
        SnapParams {
            url: Some("https://example.com/report".to_string()),
            ..SnapParams::default()
        }
    }

    #[test]
    fn defaults_match_the_boundary_table() {
        let req =
            RenderRequest::from_params(valid_url_params(), None, &registry()).unwrap();
        assert_eq!(req.viewport.width, 800);
        assert_eq!(req.viewport.height, 600);
        assert_eq!(req.viewport.scale, 2);
        assert_eq!(req.media, MediaKind::Screen);
        assert_eq!(req.output, OutputKind::Pdf);
        assert_eq!(req.pdf.format, Some(PaperFormat::A4));
        assert!(!req.pdf.landscape);
        assert!(!req.pdf.background);
        assert_eq!(req.pdf.margins.top, 0.0);
        assert_eq!(req.pdf.margins.bottom, 64.0);
        assert_eq!(req.pdf.margins.unit, MarginUnit::Px);
        assert!(req.selector.is_none());
        assert!(req.full_page());
        assert_eq!(req.delay, Duration::ZERO);
        assert!(req.blocked_domains.is_empty());
        assert!(!req.debug);
    }

    #[test]
    fn neither_source_yields_paired_errors() {
        let errors =
            RenderRequest::from_params(SnapParams::default(), None, &registry()).unwrap_err();
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].param, "url");
        assert_eq!(errors[1].param, "html");
        assert_eq!(errors[0].location, "query");
        assert_eq!(errors[1].location, "body");
    }

    #[test]
    fn both_sources_yield_paired_errors() {
        let errors = RenderRequest::from_params(
            valid_url_params(),
            Some("<p>hi</p>".to_string()),
            &registry(),
        )
        .unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(errors[0].msg.contains("but not both"));
    }

    #[test]
    fn empty_html_counts_as_absent() {
        let errors =
            RenderRequest::from_params(SnapParams::default(), Some(String::new()), &registry())
                .unwrap_err();
        assert_eq!(errors[0].msg, EITHER_SOURCE_MSG);
    }

    #[test]
    fn inline_html_becomes_the_source() {
        let req = RenderRequest::from_params(
            SnapParams::default(),
            Some("<div id=\"content\">hi</div>".to_string()),
            &registry(),
        )
        .unwrap();
        assert!(matches!(req.source, Source::InlineHtml(_)));
        assert_eq!(req.source.input_size(), 26);
    }

    #[test]
    fn relative_or_non_http_urls_are_rejected() {
        for bad in ["/relative/path", "ftp://example.com/x", "not a url"] {
            let params = SnapParams {
                url: Some(bad.to_string()),
                ..SnapParams::default()
            };
            let errors = RenderRequest::from_params(params, None, &registry()).unwrap_err();
            assert_eq!(errors[0].param, "url", "{bad} should be rejected");
        }
    }

    #[test]
    fn selector_charset_is_enforced() {
        let params = SnapParams {
            selector: Some("#content > div".to_string()),
            ..valid_url_params()
        };
        let errors = RenderRequest::from_params(params, None, &registry()).unwrap_err();
        assert_eq!(errors[0].param, "selector");

        let params = SnapParams {
            selector: Some("#content .row:first-child".to_string()),
            ..valid_url_params()
        };
        let req = RenderRequest::from_params(params, None, &registry()).unwrap();
        assert_eq!(req.selector.as_deref(), Some("#content .row:first-child"));
        assert!(!req.full_page());
    }

    #[test]
    fn scale_out_of_range_is_rejected() {
        for bad in ["0", "4", "1.5", "-1"] {
            let params = SnapParams {
                scale: Some(bad.to_string()),
                ..valid_url_params()
            };
            let errors = RenderRequest::from_params(params, None, &registry()).unwrap_err();
            assert_eq!(errors[0].param, "scale", "{bad} should be rejected");
        }
    }

    #[test]
    fn delay_above_ceiling_is_rejected() {
        let params = SnapParams {
            delay: Some("10001".to_string()),
            ..valid_url_params()
        };
        assert!(RenderRequest::from_params(params, None, &registry()).is_err());

        let params = SnapParams {
            delay: Some("2500".to_string()),
            ..valid_url_params()
        };
        let req = RenderRequest::from_params(params, None, &registry()).unwrap();
        assert_eq!(req.delay, Duration::from_millis(2500));
    }

    #[test]
    fn auth_requires_both_user_and_pass() {
        let params = SnapParams {
            user: Some("staging".to_string()),
            ..valid_url_params()
        };
        let req = RenderRequest::from_params(params, None, &registry()).unwrap();
        assert!(req.auth.is_none());

        let params = SnapParams {
            user: Some("staging".to_string()),
            pass: Some("secret123".to_string()),
            ..valid_url_params()
        };
        let req = RenderRequest::from_params(params, None, &registry()).unwrap();
        let auth = req.auth.unwrap();
        assert_eq!(auth.username, "staging");
        assert_eq!(auth.password, "secret123");
    }

    #[test]
    fn non_alphanumeric_credentials_are_rejected() {
        let params = SnapParams {
            user: Some("stag ing".to_string()),
            pass: Some("p@ss".to_string()),
            ..valid_url_params()
        };
        let errors = RenderRequest::from_params(params, None, &registry()).unwrap_err();
        assert_eq!(errors.len(), 2);
        // password value never echoes back
        assert!(errors.iter().all(|e| e.param != "pass" || e.value.is_none()));
    }

    #[test]
    fn unknown_logo_lists_allowed_names() {
        let params = SnapParams {
            logo: Some("unknown".to_string()),
            ..valid_url_params()
        };
        let errors = RenderRequest::from_params(params, None, &registry()).unwrap_err();
        assert_eq!(errors[0].param, "logo");
    }

    #[test]
    fn margins_accept_decimals_and_units() {
        let params = SnapParams {
            pdf_margin_top: Some("1".to_string()),
            pdf_margin_unit: Some("in".to_string()),
            ..valid_url_params()
        };
        let req = RenderRequest::from_params(params, None, &registry()).unwrap();
        let (top, right, bottom, left) = req.pdf.margins.to_inches();
        assert!((top - 1.0).abs() < f64::EPSILON);
        assert!((right - 0.0).abs() < f64::EPSILON);
        // bottom default stays 64, now interpreted in inches
        assert!((bottom - 64.0).abs() < f64::EPSILON);
        assert!((left - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn margin_unit_conversions() {
        assert!((MarginUnit::Px.to_inches(96.0) - 1.0).abs() < 1e-9);
        assert!((MarginUnit::Mm.to_inches(25.4) - 1.0).abs() < 1e-9);
        assert!((MarginUnit::Cm.to_inches(2.54) - 1.0).abs() < 1e-9);
        assert!((MarginUnit::In.to_inches(1.0) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn paper_formats_cover_the_allow_list() {
        for name in PaperFormat::ALL {
            assert!(PaperFormat::parse(name).is_some(), "{name} should parse");
        }
        assert!(PaperFormat::parse("B5").is_none());
        assert_eq!(PaperFormat::Letter.size_inches(), (8.5, 11.0));
        assert_eq!(PaperFormat::A4.size_inches(), (8.27, 11.7));
        // Ledger is Tabloid rotated
        assert_eq!(PaperFormat::Ledger.size_inches(), (17.0, 11.0));
    }

    #[test]
    fn cookie_string_parses_pairs() {
        let cookies = parse_cookies("session=abc123; theme=dark");
        assert_eq!(
            cookies,
            vec![
                Cookie {
                    name: "session".into(),
                    value: "abc123".into()
                },
                Cookie {
                    name: "theme".into(),
                    value: "dark".into()
                },
            ]
        );
        assert!(parse_cookies("").is_empty());
        // a pair without `=` keeps an empty value rather than failing
        assert_eq!(parse_cookies("flag")[0].value, "");
    }

    #[test]
    fn blocked_domains_split_on_commas() {
        assert_eq!(
            parse_blocked("ads.example.com, tracker.io"),
            vec!["ads.example.com".to_string(), "tracker.io".to_string()]
        );
        assert!(parse_blocked("").is_empty());
    }

    #[test]
    fn output_kind_maps_content_types() {
        assert_eq!(OutputKind::Png.content_type(), "image/png");
        assert_eq!(OutputKind::Pdf.content_type(), "application/pdf");
        assert_eq!(OutputKind::Png.extension(), "png");
    }
}
