use std::path::PathBuf;

use clap::Parser;

use crate::transport::TransportKind;

#[derive(Parser, Debug, Default)]
#[command(name = "mcp-resource-server")]
#[command(about = "MCP server exposing URI-addressed resources over stdio or HTTP SSE", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Serve over stdin/stdout
    #[arg(long, conflicts_with = "http")]
    pub stdio: bool,

    /// Serve over HTTP with Server-Sent Events
    #[arg(long)]
    pub http: bool,

    /// Path to a TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

impl Cli {
    /// Transport forced on the command line, if any.
    pub fn transport_flag(&self) -> Option<TransportKind> {
        if self.stdio {
            Some(TransportKind::Stdio)
        } else if self.http {
            Some(TransportKind::HttpSse)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_select_transport() {
        let cli = Cli::try_parse_from(["mcp-resource-server", "--stdio"]).expect("parse");
        assert_eq!(cli.transport_flag(), Some(TransportKind::Stdio));

        let cli = Cli::try_parse_from(["mcp-resource-server", "--http", "-c", "server.toml"])
            .expect("parse");
        assert_eq!(cli.transport_flag(), Some(TransportKind::HttpSse));
        assert_eq!(cli.config, Some(PathBuf::from("server.toml")));

        let cli = Cli::try_parse_from(["mcp-resource-server"]).expect("parse");
        assert_eq!(cli.transport_flag(), None);
    }

    #[test]
    fn transport_flags_are_exclusive() {
        assert!(Cli::try_parse_from(["mcp-resource-server", "--stdio", "--http"]).is_err());
    }
}
