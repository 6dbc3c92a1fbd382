use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "atelier")]
#[command(about = "Atelier backend client - session, requests, and runtime diagnostics")]
#[command(version)]
pub struct Cli {
    /// Override the API base URL for this invocation
    #[arg(long, global = true, value_name = "URL")]
    pub base_url: Option<String>,

    /// Read configuration from FILE instead of ~/.atelier/config.toml
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Probe the backend and print the normalized health report
    Health,

    /// Store a bearer token for later calls
    Login {
        #[arg(long)]
        token: String,
    },

    /// Forget the stored token
    Logout,

    /// Show the resolved settings and session state
    Status,

    /// GET a path and print the unwrapped payload
    Get {
        path: String,
        /// Query parameter, repeatable
        #[arg(short, long = "query", value_name = "KEY=VALUE", value_parser = parse_query_pair)]
        query: Vec<(String, String)>,
    },

    /// Upload a file as multipart form data
    Upload {
        path: String,
        #[arg(long, value_name = "FILE")]
        file: PathBuf,
        /// Form field that carries the file
        #[arg(long, default_value = "file")]
        field: String,
    },

    /// Sample the frame clock and report frames per second
    Fps {
        /// Sampling window (ms)
        #[arg(long, default_value = "1000")]
        window_ms: u64,
        /// Frame clock rate
        #[arg(long, default_value = "60")]
        refresh_hz: u32,
    },

    /// Print process and host memory figures
    Memory,
}

impl Commands {
    /// Label used for timing marks and logs.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Health => "health",
            Self::Login { .. } => "login",
            Self::Logout => "logout",
            Self::Status => "status",
            Self::Get { .. } => "get",
            Self::Upload { .. } => "upload",
            Self::Fps { .. } => "fps",
            Self::Memory => "memory",
        }
    }
}

fn parse_query_pair(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got `{raw}`"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty key in `{raw}`"));
    }
    Ok((key.to_string(), value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_pairs_parse() {
        assert_eq!(
            parse_query_pair("page=2").unwrap(),
            ("page".to_string(), "2".to_string())
        );
        assert_eq!(
            parse_query_pair("q=a=b").unwrap(),
            ("q".to_string(), "a=b".to_string())
        );
        assert_eq!(
            parse_query_pair("empty=").unwrap(),
            ("empty".to_string(), String::new())
        );
        assert!(parse_query_pair("novalue").is_err());
        assert!(parse_query_pair("=x").is_err());
    }

    #[test]
    fn get_collects_repeated_queries() {
        let cli = Cli::try_parse_from([
            "atelier", "get", "/images", "--query", "page=2", "-q", "per_page=20",
        ])
        .unwrap();
        match cli.command {
            Commands::Get { path, query } => {
                assert_eq!(path, "/images");
                assert_eq!(query.len(), 2);
                assert_eq!(query[1], ("per_page".to_string(), "20".to_string()));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn global_base_url_after_subcommand() {
        let cli = Cli::try_parse_from(["atelier", "health", "--base-url", "http://h:1"]).unwrap();
        assert_eq!(cli.base_url.as_deref(), Some("http://h:1"));
        assert_eq!(cli.command.name(), "health");
    }

    #[test]
    fn login_requires_token() {
        assert!(Cli::try_parse_from(["atelier", "login"]).is_err());
        let cli = Cli::try_parse_from(["atelier", "login", "--token", "abc"]).unwrap();
        assert!(matches!(cli.command, Commands::Login { token } if token == "abc"));
    }

    #[test]
    fn fps_defaults() {
        let cli = Cli::try_parse_from(["atelier", "fps"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Fps {
                window_ms: 1000,
                refresh_hz: 60
            }
        ));
    }
}
