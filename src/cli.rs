use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use hardcopy::config::{Config, LogFormat};

#[derive(Parser, Debug)]
#[command(name = "hardcopy")]
#[command(
    version,
    about = "HTML-to-PDF/PNG render service backed by headless Chromium",
    long_about = "hardcopy\n\nAccepts render jobs over HTTP (POST /snap) with either a `url` query \
parameter or an urlencoded `html` body field, drives a shared headless Chromium \
through isolated browsing contexts, and answers with the finished PDF or PNG."
)]
pub struct Cli {
    #[arg(
        long,
        value_name = "PATH",
        help = "Config file (TOML) setting service defaults; CLI flags override config"
    )]
    pub config: Option<PathBuf>,

    #[arg(long, value_name = "ADDR", help = "Listen address, e.g. 0.0.0.0:8080")]
    pub listen: Option<SocketAddr>,

    #[arg(long, value_name = "N", help = "Maximum render jobs in flight at once")]
    pub max_renders: Option<usize>,

    #[arg(
        long,
        value_name = "PATH",
        help = "Chromium binary to launch (autodetected when unset)"
    )]
    pub chrome: Option<PathBuf>,

    #[arg(
        long,
        value_name = "WS_URL",
        help = "DevTools websocket of an already-running Chromium; connect instead of launching"
    )]
    pub chrome_endpoint: Option<String>,

    #[arg(long, value_name = "DIR", help = "Directory for temporary render artifacts")]
    pub tmp_dir: Option<PathBuf>,

    #[arg(
        long,
        value_name = "PATH",
        help = "JSON manifest mapping logo names to image files for PDF headers"
    )]
    pub logos: Option<PathBuf>,

    #[arg(long, value_enum, help = "Log output format")]
    pub log_format: Option<LogFormatArg>,

    #[arg(long, help = "Enable verbose (debug-level) logging")]
    pub verbose: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogFormatArg {
    Compact,
    Json,
}

impl From<LogFormatArg> for LogFormat {
    fn from(arg: LogFormatArg) -> Self {
        match arg {
            LogFormatArg::Compact => LogFormat::Compact,
            LogFormatArg::Json => LogFormat::Json,
        }
    }
}

impl Cli {
    /// Fold CLI flags over the loaded (or default) config.
    pub fn apply(&self, config: &mut Config) {
        if let Some(listen) = self.listen {
            config.listen = listen;
        }
        if let Some(max) = self.max_renders {
            config.max_concurrent_renders = max;
        }
        if let Some(chrome) = &self.chrome {
            config.chrome_executable = Some(chrome.clone());
        }
        if let Some(endpoint) = &self.chrome_endpoint {
            config.chrome_endpoint = Some(endpoint.clone());
        }
        if let Some(tmp) = &self.tmp_dir {
            config.tmp_dir = tmp.clone();
        }
        if let Some(logos) = &self.logos {
            config.logo_manifest = Some(logos.clone());
        }
        if let Some(format) = self.log_format {
            config.logging.format = format.into();
        }
        if self.verbose {
            config.logging.level = "debug".to_string();
        }
    }
}

pub fn parse() -> Cli {
    Cli::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_config_values() {
        let cli = Cli::parse_from([
            "hardcopy",
            "--listen",
            "127.0.0.1:9000",
            "--max-renders",
            "4",
            "--verbose",
        ]);
        let mut config = Config::default();
        cli.apply(&mut config);
        assert_eq!(config.listen.port(), 9000);
        assert_eq!(config.max_concurrent_renders, 4);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn unset_flags_leave_config_alone() {
        let cli = Cli::parse_from(["hardcopy"]);
        let mut config = Config::default();
        let listen = config.listen;
        cli.apply(&mut config);
        assert_eq!(config.listen, listen);
        assert_eq!(config.logging.level, "info");
    }
}
