//! CLI - Command-line argument parsing
//!
//! Defines the CLI structure using clap and the precedence rules that turn
//! flags and files into one `DaemonConfig`.

use clap::{Parser, Subcommand};
use ota_common::{load_config, resolve_server_address, DaemonConfig};
use std::path::PathBuf;
use tracing::debug;

use crate::client::ClientConfig;

/// otad - A/B over-the-air update agent
#[derive(Parser, Debug)]
#[command(name = "otad")]
#[command(about = "otad - A/B over-the-air update agent", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Config file
    #[arg(long, global = true, default_value = ota_common::CONFIG_PATH)]
    pub config: PathBuf,

    /// Plain-text file holding the update server address
    #[arg(long, global = true, default_value = ota_common::SERVER_FILE_PATH)]
    pub server_file: PathBuf,

    /// Update server address (overrides both files)
    #[arg(long, global = true)]
    pub server: Option<String>,

    /// Client certificate (PEM)
    #[arg(long, global = true)]
    pub cert: Option<PathBuf>,

    /// Client private key (PEM)
    #[arg(long, global = true)]
    pub key: Option<PathBuf>,

    /// CA certificate for the update server (PEM)
    #[arg(long, global = true)]
    pub ca: Option<PathBuf>,

    /// Cycle state file
    #[arg(long, global = true, default_value = ota_common::STATE_PATH)]
    pub state: PathBuf,

    /// Subcommand (defaults to `daemon`)
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available commands
#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Commands {
    /// Poll the update server until stopped
    Daemon,

    /// Run a single update cycle and exit
    Check,

    /// Commit the running update after a successful boot
    Commit,

    /// Reboot the device
    Reboot,

    /// Show resolved configuration and the last cycle result
    Status,
}

impl Cli {
    pub fn command(&self) -> Commands {
        self.command.unwrap_or(Commands::Daemon)
    }

    /// Resolve the daemon configuration.
    ///
    /// Server precedence: `--server` > server file (if present) > config file > default.
    /// A blank `--server` counts as not given.
    pub fn daemon_config(&self) -> DaemonConfig {
        let mut config = load_config(&self.config);

        let flag = self
            .server
            .as_deref()
            .map(str::trim)
            .filter(|server| !server.is_empty());

        if let Some(server) = flag {
            debug!("Server taken from command line");
            config.server = server.to_string();
        } else if self.server_file.is_file() {
            debug!("Server taken from {}", self.server_file.display());
            config.server = resolve_server_address(&self.server_file);
        }

        config
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            client_cert: self.cert.clone(),
            client_key: self.key.clone(),
            server_ca: self.ca.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ota_common::DEFAULT_SERVER_ADDRESS;
    use std::fs;
    use tempfile::TempDir;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("otad").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_default_command_is_daemon() {
        assert_eq!(parse(&[]).command(), Commands::Daemon);
        assert_eq!(parse(&["commit"]).command(), Commands::Commit);
    }

    #[test]
    fn test_server_flag_wins() {
        let temp = TempDir::new().unwrap();
        let server_file = temp.path().join("otad.server");
        fs::write(&server_file, "https://from-file").unwrap();

        let cli = parse(&[
            "--config",
            "/nonexistent/otad.toml",
            "--server-file",
            server_file.to_str().unwrap(),
            "--server",
            "https://from-flag",
        ]);
        assert_eq!(cli.daemon_config().server, "https://from-flag");
    }

    #[test]
    fn test_server_file_beats_config_file() {
        let temp = TempDir::new().unwrap();
        let config_file = temp.path().join("otad.toml");
        let server_file = temp.path().join("otad.server");
        fs::write(&config_file, "server = \"https://from-config\"").unwrap();
        fs::write(&server_file, "https://from-file\n").unwrap();

        let cli = parse(&[
            "--config",
            config_file.to_str().unwrap(),
            "--server-file",
            server_file.to_str().unwrap(),
        ]);
        assert_eq!(cli.daemon_config().server, "https://from-file");
    }

    #[test]
    fn test_blank_server_flag_is_ignored() {
        let temp = TempDir::new().unwrap();
        let server_file = temp.path().join("otad.server");
        fs::write(&server_file, "https://from-file").unwrap();

        let cli = parse(&[
            "--config",
            "/nonexistent/otad.toml",
            "--server-file",
            server_file.to_str().unwrap(),
            "--server",
            "   ",
        ]);
        assert_eq!(cli.daemon_config().server, "https://from-file");

        let cli = parse(&[
            "--config",
            "/nonexistent/otad.toml",
            "--server-file",
            "/nonexistent/otad.server",
            "--server",
            "",
        ]);
        assert_eq!(cli.daemon_config().server, DEFAULT_SERVER_ADDRESS);
    }

    #[test]
    fn test_server_flag_is_trimmed() {
        let cli = parse(&[
            "--config",
            "/nonexistent/otad.toml",
            "--server",
            " https://from-flag ",
        ]);
        assert_eq!(cli.daemon_config().server, "https://from-flag");
    }

    #[test]
    fn test_missing_files_give_default_server() {
        let cli = parse(&[
            "--config",
            "/nonexistent/otad.toml",
            "--server-file",
            "/nonexistent/otad.server",
        ]);
        assert_eq!(cli.daemon_config().server, DEFAULT_SERVER_ADDRESS);
    }
}
