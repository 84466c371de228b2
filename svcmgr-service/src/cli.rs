//! Command line

use clap::{Parser, ValueEnum};
use std::fmt;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    /// Line-delimited JSON-RPC on stdin/stdout
    #[value(alias = "mcp")]
    Stdio,
    /// REST/JSON API
    #[value(alias = "http")]
    RestHttp,
    /// JSON-RPC over HTTP with server-sent events
    #[value(alias = "mcp-http")]
    SseHttp,
    /// JSON-RPC over bidirectional NDJSON streams
    #[value(alias = "mcp-streamable")]
    BidirHttp,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Stdio => "stdio",
            Mode::RestHttp => "rest-http",
            Mode::SseHttp => "sse-http",
            Mode::BidirHttp => "bidir-http",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Parser, Debug)]
#[command(name = "svcmgr", version)]
#[command(about = "Manage systemd, SysV and docker services over MCP and REST")]
pub struct Args {
    /// Transport to serve
    #[arg(short, long, value_enum, default_value_t = Mode::Stdio)]
    pub mode: Mode,

    /// YAML configuration file (optional)
    #[arg(short, long, default_value = "config.yaml")]
    pub config: PathBuf,

    /// Shorthand for --mode rest-http
    #[arg(long, overrides_with_all = ["mcp_http", "mcp_streamable"])]
    pub http: bool,

    /// Shorthand for --mode sse-http
    #[arg(long, overrides_with_all = ["http", "mcp_streamable"])]
    pub mcp_http: bool,

    /// Shorthand for --mode bidir-http
    #[arg(long, overrides_with_all = ["http", "mcp_http"])]
    pub mcp_streamable: bool,
}

impl Args {
    /// The selected mode; a shorthand flag beats `--mode`
    pub fn mode(&self) -> Mode {
        if self.http {
            Mode::RestHttp
        } else if self.mcp_http {
            Mode::SseHttp
        } else if self.mcp_streamable {
            Mode::BidirHttp
        } else {
            self.mode
        }
    }
}
