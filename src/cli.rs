use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "printlink",
    version,
    about = "Serial link to a Marlin-style 3D printer controller"
)]
pub struct Cli {
    /// Configuration file (.toml or .json); defaults to the platform config dir
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub cmd: Cmd,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Cmd {
    /// List serial ports that may have a controller attached
    Ports(PortsOpts),
    /// Connect, forward console lines and optionally stream a job
    Run(RunOpts),
    /// Write the effective configuration to the config file
    InitConfig,
}

#[derive(Args, Debug, Clone)]
pub struct PortsOpts {
    /// Include ports that do not look like printer controllers
    #[arg(long, default_value_t = false)]
    pub all: bool,
}

#[derive(Args, Debug, Clone)]
pub struct RunOpts {
    /// Serial device path; overrides `link.port` from the config
    #[arg(long)]
    pub port: Option<String>,
    /// G-code file to print once the link is up
    #[arg(long)]
    pub job: Option<PathBuf>,
    /// Only try this baud rate
    #[arg(long)]
    pub baud: Option<u32>,
    /// Controller receive buffer in bytes (0 = unknown, stop-and-wait)
    #[arg(long)]
    pub rx_buffer: Option<usize>,
    /// Engine tick period in milliseconds
    #[arg(long, default_value_t = 5)]
    pub tick_ms: u64,
    /// Temperature log period in seconds (0 disables)
    #[arg(long, default_value_t = 5)]
    pub status_secs: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_options() {
        let cli = Cli::parse_from([
            "printlink",
            "run",
            "--port",
            "/dev/ttyUSB0",
            "--job",
            "part.gcode",
            "--baud",
            "250000",
            "--config",
            "link.toml",
        ]);
        assert_eq!(cli.config, Some(PathBuf::from("link.toml")));
        match cli.cmd {
            Cmd::Run(opts) => {
                assert_eq!(opts.port.as_deref(), Some("/dev/ttyUSB0"));
                assert_eq!(opts.job, Some(PathBuf::from("part.gcode")));
                assert_eq!(opts.baud, Some(250000));
                assert_eq!(opts.rx_buffer, None);
                assert_eq!(opts.tick_ms, 5);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_ports_options() {
        let cli = Cli::parse_from(["printlink", "ports", "--all"]);
        assert!(matches!(cli.cmd, Cmd::Ports(PortsOpts { all: true })));
    }
}
