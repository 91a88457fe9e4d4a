//! Command implementations.
//!
//! Each subcommand is implemented in its own module. Helpers shared by the
//! commands that talk to a device live here.

pub(crate) mod completions;
pub(crate) mod info;
pub(crate) mod parts;
pub(crate) mod ports;
pub(crate) mod write;

use {
    crate::{
        CliError, Cli, DEFAULT_BAUD, DEFAULT_PART,
        config::Config,
        serial::{SerialOptions, select_serial_port},
        use_fancy_output,
    },
    anyhow::{Context, Result},
    console::style,
    indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle},
    log::warn,
    rootloader::{
        Flasher, NativePort, Part, SerialConfig, SessionConfig,
        protocol::handshake::{DEFAULT_KEY, DEFAULT_TRIGGER},
    },
};

/// Resolve the target part from the command line, then the config.
pub(crate) fn resolve_part(cli: &Cli, config: &Config) -> Result<&'static Part> {
    let name = cli
        .part
        .as_deref()
        .or(config.target.part.as_deref())
        .unwrap_or(DEFAULT_PART);
    Part::from_name(name).map_err(|e| {
        CliError::Usage(format!("{e}. Run `rootloader parts` to list supported parts")).into()
    })
}

/// Build the session settings from the command line and the config.
pub(crate) fn session_config(cli: &Cli, config: &Config) -> SessionConfig {
    let key = cli
        .key
        .clone()
        .or_else(|| config.bootloader.key.clone())
        .unwrap_or_else(|| DEFAULT_KEY.to_string());
    let trigger = cli
        .trigger
        .clone()
        .or_else(|| config.bootloader.trigger.clone())
        .unwrap_or_else(|| DEFAULT_TRIGGER.to_string());
    SessionConfig::default()
        .with_key(key)
        .with_trigger(trigger)
        .with_block_mode(cli.block_mode || config.bootloader.block_mode)
}

/// Open the port, run the handshake and check the signature.
pub(crate) fn connect(
    cli: &Cli,
    config: &Config,
    part: &'static Part,
) -> Result<Flasher<NativePort>> {
    let port_name = select_serial_port(
        &SerialOptions {
            port: cli.port.clone(),
            non_interactive: cli.non_interactive,
        },
        config,
    )?;
    let baud = cli.baud.or(config.connection.baud).unwrap_or(DEFAULT_BAUD);

    let session = session_config(cli, config);
    session
        .validate()
        .map_err(|e| CliError::Config(e.to_string()))?;

    let serial = SerialConfig::new(&port_name, baud);
    let mut flasher = Flasher::open(&serial, session, part.flash())
        .with_context(|| format!("Failed to open {port_name}"))?;

    let spinner = spinner(cli, &format!("Waiting for bootloader on {port_name}..."));
    let connected = flasher.connect().map(|_| ());
    spinner.finish_and_clear();
    connected.with_context(|| format!("No bootloader answered on {port_name}"))?;

    match flasher.check_signature(part.signature) {
        Ok(()) => {},
        Err(e) if cli.force => warn!("{e}, continuing because of --force"),
        Err(e) => {
            return Err(e).context("Wrong part selected? Use --part, or --force to override");
        },
    }

    status(cli, &format!("Connected to {} on {port_name}", part.description));
    Ok(flasher)
}

/// Print a success line unless quiet.
pub(crate) fn status(cli: &Cli, message: &str) {
    if !cli.quiet {
        eprintln!("{} {message}", style("✓").green());
    }
}

fn spinner(cli: &Cli, message: &str) -> ProgressBar {
    if cli.quiet || !use_fancy_output() {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new_spinner();
    pb.set_draw_target(ProgressDrawTarget::stderr());
    pb.set_message(message.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

/// Byte progress bar drawn on stderr, hidden when quiet or not a terminal.
pub(crate) fn progress_bar(cli: &Cli, message: &str) -> ProgressBar {
    if cli.quiet || !use_fancy_output() {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(0);
    if let Ok(bar) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}")
    {
        pb.set_style(bar.progress_chars("#>-"));
    }
    pb.set_draw_target(ProgressDrawTarget::stderr());
    pb.set_message(message.to_string());
    pb
}

/// Progress callback feeding `pb`.
pub(crate) fn track(pb: &ProgressBar) -> impl FnMut(u64, u64) + '_ {
    move |done, total| {
        pb.set_length(total);
        pb.set_position(done);
    }
}
