//! Command-line options

use crate::mixer::BackendKind;
use crate::settings::DEFAULT_NAME;
use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "voltray")]
#[command(author, version, about = "Volume control for the system tray")]
pub struct Cli {
    /// Alternate name for the configuration file
    #[arg(short, long, value_name = "NAME", default_value = DEFAULT_NAME)]
    pub config: String,

    /// Mixer device to open instead of the configured card
    #[arg(short, long, value_name = "NAME")]
    pub device: Option<String>,

    /// Mixer API to use instead of the configured one
    #[arg(short, long, value_enum)]
    pub backend: Option<BackendKind>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn defaults_and_overrides() {
        let cli = Cli::parse_from(["voltray"]);
        assert_eq!(cli.config, "config");
        assert_eq!(cli.device, None);
        assert_eq!(cli.backend, None);

        let cli = Cli::parse_from(["voltray", "-c", "desk", "--device", "hw:1", "--backend", "oss"]);
        assert_eq!(cli.config, "desk");
        assert_eq!(cli.device.as_deref(), Some("hw:1"));
        assert_eq!(cli.backend, Some(BackendKind::Oss));
    }

    #[test]
    fn rejects_unknown_backend() {
        assert!(Cli::try_parse_from(["voltray", "--backend", "pulse"]).is_err());
    }
}
