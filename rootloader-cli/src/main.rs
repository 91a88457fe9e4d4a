//! rootloader CLI - Command-line tool for AVR devices running AVRootloader.
//!
//! ## Features
//!
//! - Write flash and EEPROM images (raw binary or Intel HEX)
//! - Device-side flash verification
//! - EEPROM read-back
//! - Interactive serial port selection
//! - Shell completion generation
//! - Environment variable and config file support

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use console::style;
use env_logger::Env;
use log::debug;
use rootloader::MemoryKind;
use std::env;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

/// Whether stderr is a terminal (set once at startup).
static STDERR_IS_TTY: AtomicBool = AtomicBool::new(true);

/// Check if animations should be used (TTY and colors enabled).
fn use_fancy_output() -> bool {
    STDERR_IS_TTY.load(Ordering::Relaxed) && console::colors_enabled_stderr()
}

mod commands;
mod config;
mod serial;

use config::Config;

/// Part used when neither the command line nor the config names one.
const DEFAULT_PART: &str = "atmega328p";

/// Baud rate used when neither the command line nor the config sets one.
const DEFAULT_BAUD: u32 = 115_200;

/// rootloader - Program AVR microcontrollers through the AVRootloader
/// serial bootloader.
///
/// Environment variables:
///   ROOTLOADER_PORT              - Default serial port
///   ROOTLOADER_BAUD              - Default baud rate (default: 115200)
///   ROOTLOADER_PART              - Default part (default: atmega328p)
///   ROOTLOADER_KEY               - Bootloader identification key
///   ROOTLOADER_NON_INTERACTIVE   - Non-interactive mode (disable prompts)
#[derive(Parser)]
#[command(name = "rootloader")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
#[allow(clippy::struct_excessive_bools)]
struct Cli {
    /// Serial port to use (auto-detected if not specified).
    #[arg(short, long, global = true, env = "ROOTLOADER_PORT")]
    port: Option<String>,

    /// Baud rate [default: 115200].
    #[arg(short, long, global = true, env = "ROOTLOADER_BAUD")]
    baud: Option<u32>,

    /// Target part, see `rootloader parts` [default: atmega328p].
    #[arg(short = 'c', long, global = true, env = "ROOTLOADER_PART")]
    part: Option<String>,

    /// Bootloader identification key.
    #[arg(long, global = true, env = "ROOTLOADER_KEY")]
    key: Option<String>,

    /// Sign-on string the bootloader answers with.
    #[arg(long, global = true)]
    trigger: Option<String>,

    /// Request block mode transfers.
    #[arg(long, global = true)]
    block_mode: bool,

    /// Continue even if the device signature does not match the part.
    #[arg(long, global = true)]
    force: bool,

    /// Verbose output level (-v, -vv for increasing detail).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode (suppress non-essential output).
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Non-interactive mode (fail instead of prompting).
    #[arg(long, global = true, env = "ROOTLOADER_NON_INTERACTIVE")]
    non_interactive: bool,

    /// Path to a configuration file.
    #[arg(long = "config", global = true, value_name = "PATH")]
    config_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Device memories.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Memory {
    /// Program flash.
    Flash,
    /// Data EEPROM.
    Eeprom,
}

impl From<Memory> for MemoryKind {
    fn from(memory: Memory) -> Self {
        match memory {
            Memory::Flash => MemoryKind::Flash,
            Memory::Eeprom => MemoryKind::Eeprom,
        }
    }
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Connect to the bootloader and show device information.
    Info {
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Write an image to the device.
    Write {
        /// Image file (raw binary or Intel HEX).
        file: PathBuf,

        /// Destination memory.
        #[arg(short, long, value_enum, default_value = "flash")]
        memory: Memory,

        /// Skip the flash verify pass after writing.
        #[arg(long)]
        skip_verify: bool,
    },

    /// Compare a flash image against the device.
    Verify {
        /// Image file (raw binary or Intel HEX).
        file: PathBuf,
    },

    /// Read device memory into a raw binary file.
    Read {
        /// Output file.
        file: PathBuf,

        /// Memory to read. Only EEPROM can be read back.
        #[arg(short, long, value_enum, default_value = "eeprom")]
        memory: Memory,
    },

    /// List available serial ports.
    ListPorts {
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// List built-in parts.
    Parts {
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completions.
    Completions {
        /// Shell type.
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Errors with a dedicated exit code.
#[derive(Debug, thiserror::Error)]
pub(crate) enum CliError {
    /// Bad invocation or missing input the user has to supply.
    #[error("{0}")]
    Usage(String),
    /// Invalid configuration.
    #[error("{0}")]
    Config(String),
    /// The user aborted a prompt.
    #[error("{0}")]
    Cancelled(String),
}

/// Map an error to the process exit code.
///
/// 2 usage, 3 configuration, 4 device communication, 130 cancelled, 1 otherwise.
fn exit_code(err: &anyhow::Error) -> i32 {
    if let Some(cli_err) = err.downcast_ref::<CliError>() {
        return match cli_err {
            CliError::Usage(_) => 2,
            CliError::Config(_) => 3,
            CliError::Cancelled(_) => 130,
        };
    }

    match err.downcast_ref::<rootloader::Error>() {
        Some(rootloader::Error::Config(_)) => 3,
        Some(
            rootloader::Error::Transport(_)
            | rootloader::Error::Handshake(_)
            | rootloader::Error::NotConnected
            | rootloader::Error::SignatureMismatch { .. },
        ) => 4,
        _ => 1,
    }
}

fn init_logging(cli: &Cli) {
    let log_level = if cli.quiet {
        "warn"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level))
        .format_target(cli.verbose >= 2)
        .format_timestamp(if cli.verbose >= 2 {
            Some(env_logger::TimestampPrecision::Millis)
        } else {
            None
        })
        .init();
}

fn run(cli: &Cli) -> Result<()> {
    let config = if let Some(ref path) = cli.config_path {
        Config::load_from_path(path)
    } else {
        Config::load()
    };

    match &cli.command {
        Commands::Info { json } => commands::info::cmd_info(cli, &config, *json),
        Commands::Write {
            file,
            memory,
            skip_verify,
        } => commands::write::cmd_write(cli, &config, file, (*memory).into(), *skip_verify),
        Commands::Verify { file } => commands::write::cmd_verify(cli, &config, file),
        Commands::Read { file, memory } => {
            commands::write::cmd_read(cli, &config, file, (*memory).into())
        },
        Commands::ListPorts { json } => commands::ports::cmd_list_ports(*json),
        Commands::Parts { json } => commands::parts::cmd_parts(*json),
        Commands::Completions { shell } => {
            commands::completions::cmd_completions(*shell);
            Ok(())
        },
    }
}

fn main() {
    let stderr_is_tty = console::Term::stderr().is_term();
    STDERR_IS_TTY.store(stderr_is_tty, Ordering::Relaxed);

    if env::var("NO_COLOR").is_ok() || !stderr_is_tty {
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }

    let cli = Cli::parse();
    init_logging(&cli);

    debug!(
        "rootloader v{} (verbose level: {})",
        env!("CARGO_PKG_VERSION"),
        cli.verbose
    );

    if let Err(err) = run(&cli) {
        eprintln!("{} {err:#}", style("Error:").red().bold());
        std::process::exit(exit_code(&err));
    }
}

#[cfg(test)]
mod cli_tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_command_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_cli_parse_write() {
        let cli = Cli::try_parse_from([
            "rootloader",
            "--port",
            "/dev/ttyUSB0",
            "--baud",
            "57600",
            "write",
            "firmware.hex",
        ])
        .unwrap();
        assert_eq!(cli.port.as_deref(), Some("/dev/ttyUSB0"));
        assert_eq!(cli.baud, Some(57600));
        match cli.command {
            Commands::Write {
                file,
                memory,
                skip_verify,
            } => {
                assert_eq!(file, PathBuf::from("firmware.hex"));
                assert_eq!(memory, Memory::Flash);
                assert!(!skip_verify);
            },
            _ => panic!("Expected Write command"),
        }
    }

    #[test]
    fn test_cli_parse_write_eeprom() {
        let cli = Cli::try_parse_from([
            "rootloader",
            "write",
            "data.eep",
            "--memory",
            "eeprom",
            "--skip-verify",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Commands::Write {
                memory: Memory::Eeprom,
                skip_verify: true,
                ..
            }
        ));
    }

    #[test]
    fn test_cli_parse_read_defaults_to_eeprom() {
        let cli = Cli::try_parse_from(["rootloader", "read", "out.bin"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Read {
                memory: Memory::Eeprom,
                ..
            }
        ));
    }

    #[test]
    fn test_cli_parse_bootloader_options() {
        let cli = Cli::try_parse_from([
            "rootloader",
            "-c",
            "atmega644p",
            "--key",
            "SECRET",
            "--trigger",
            "(c) 2010 HR",
            "--block-mode",
            "--force",
            "info",
        ])
        .unwrap();
        assert_eq!(cli.part.as_deref(), Some("atmega644p"));
        assert_eq!(cli.key.as_deref(), Some("SECRET"));
        assert_eq!(cli.trigger.as_deref(), Some("(c) 2010 HR"));
        assert!(cli.block_mode);
        assert!(cli.force);
    }

    #[test]
    fn test_cli_global_options_after_subcommand() {
        let cli = Cli::try_parse_from(["rootloader", "info", "--json", "-vv", "-q"]).unwrap();
        assert_eq!(cli.verbose, 2);
        assert!(cli.quiet);
        assert!(matches!(cli.command, Commands::Info { json: true }));
    }

    #[test]
    fn test_cli_rejects_unknown_memory() {
        assert!(Cli::try_parse_from(["rootloader", "write", "a.bin", "--memory", "fuses"]).is_err());
    }

    #[test]
    fn test_cli_requires_subcommand() {
        assert!(Cli::try_parse_from(["rootloader"]).is_err());
    }

    #[test]
    fn test_memory_into_kind() {
        assert_eq!(MemoryKind::from(Memory::Flash), MemoryKind::Flash);
        assert_eq!(MemoryKind::from(Memory::Eeprom), MemoryKind::Eeprom);
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(exit_code(&CliError::Usage("x".into()).into()), 2);
        assert_eq!(exit_code(&CliError::Config("x".into()).into()), 3);
        assert_eq!(exit_code(&CliError::Cancelled("x".into()).into()), 130);
        assert_eq!(exit_code(&rootloader::Error::NotConnected.into()), 4);
        assert_eq!(exit_code(&anyhow::anyhow!("other")), 1);
    }
}
