//! Serial port selection.
//!
//! The port comes from, in order: the `--port` flag (or `ROOTLOADER_PORT`),
//! the config file, the only detected port, or an interactive prompt. The
//! prompt is never shown in non-interactive mode.

use {
    crate::{CliError, config::Config},
    anyhow::Result,
    console::style,
    dialoguer::{Error as DialoguerError, Select, theme::ColorfulTheme},
    log::{debug, info},
    rootloader::{NativePortEnumerator, PortEnumerator, PortInfo},
    std::io::IsTerminal,
};

/// USB serial bridges commonly found on AVR boards.
const KNOWN_BRIDGES: &[(u16, u16, &str)] = &[
    (0x1A86, 0x7523, "CH340"),
    (0x1A86, 0x5523, "CH341"),
    (0x0403, 0x6001, "FT232R"),
    (0x0403, 0x6015, "FT231X"),
    (0x10C4, 0xEA60, "CP210x"),
    (0x067B, 0x2303, "PL2303"),
    (0x2341, 0x0043, "Arduino Uno"),
];

/// Options for serial port selection.
#[derive(Debug, Clone, Default)]
pub struct SerialOptions {
    /// Explicit port specified via CLI.
    pub port: Option<String>,
    /// Non-interactive mode (fail instead of prompting).
    pub non_interactive: bool,
}

/// Name of the USB bridge behind a port, if it is a known one.
pub fn bridge_name(port: &PortInfo) -> Option<&'static str> {
    let (vid, pid) = (port.vid?, port.pid?);
    KNOWN_BRIDGES
        .iter()
        .find(|(v, p, _)| *v == vid && *p == pid)
        .map(|(_, _, name)| *name)
}

/// List ports, known bridges first.
pub fn detect_ports() -> Result<Vec<PortInfo>> {
    let mut ports = NativePortEnumerator::list_ports()?;
    ports.sort_by_key(|p| bridge_name(p).is_none());
    Ok(ports)
}

fn usage_err(message: &str) -> anyhow::Error {
    CliError::Usage(message.to_string()).into()
}

/// Select the serial port to open.
pub fn select_serial_port(options: &SerialOptions, config: &Config) -> Result<String> {
    if let Some(port_name) = &options.port {
        return Ok(port_name.clone());
    }

    if let Some(port_name) = &config.connection.serial {
        debug!("Using port from config: {port_name}");
        return Ok(port_name.clone());
    }

    choose_port(detect_ports()?, options.non_interactive)
}

fn choose_port(mut ports: Vec<PortInfo>, non_interactive: bool) -> Result<String> {
    match ports.len() {
        0 => Err(usage_err(
            "No serial ports found. Connect the device or pass --port",
        )),
        1 => {
            let port = ports.remove(0);
            info!("Auto-selected port: {}", port.name);
            Ok(port.name)
        },
        _ if non_interactive => Err(usage_err(
            "Found multiple serial ports; pass --port in non-interactive mode",
        )),
        _ => {
            ensure_interactive_terminal()?;
            select_port_interactive(ports)
        },
    }
}

fn ensure_interactive_terminal() -> Result<()> {
    if std::io::stdin().is_terminal() && std::io::stderr().is_terminal() {
        Ok(())
    } else {
        Err(usage_err(
            "Port selection needs a terminal; pass --port instead",
        ))
    }
}

fn map_prompt_error(err: DialoguerError) -> anyhow::Error {
    match err {
        DialoguerError::IO(io_err) => {
            if io_err.kind() == std::io::ErrorKind::Interrupted {
                CliError::Cancelled("Port selection cancelled".to_string()).into()
            } else {
                usage_err("Port prompt failed")
            }
        },
    }
}

/// Label shown for a port in lists and prompts.
pub fn port_label(port: &PortInfo) -> String {
    let bridge = bridge_name(port)
        .map(|b| format!(" [{}]", style(b).yellow()))
        .unwrap_or_default();
    let ids = match (port.vid, port.pid) {
        (Some(vid), Some(pid)) => format!(" ({vid:04X}:{pid:04X})"),
        _ => String::new(),
    };
    let product = port
        .product
        .as_ref()
        .map(|p| format!(" - {}", style(p).dim()))
        .unwrap_or_default();
    format!("{}{bridge}{ids}{product}", port.name)
}

fn select_port_interactive(ports: Vec<PortInfo>) -> Result<String> {
    eprintln!(
        "{} Detected {} serial ports",
        style("ℹ").blue(),
        ports.len()
    );

    // Keep labels on one line in narrow terminals.
    let term_width = console::Term::stderr().size().1 as usize;
    let max_item_width = term_width.saturating_sub(4);
    let labels: Vec<String> = ports
        .iter()
        .map(|p| console::truncate_str(&port_label(p), max_item_width, "\u{2026}").into_owned())
        .collect();

    let selection = Select::with_theme(&ColorfulTheme::default())
        .with_prompt("Select the port the device is on")
        .items(&labels)
        .default(0)
        .interact_opt()
        .map_err(map_prompt_error)?;

    match selection {
        Some(index) => ports
            .into_iter()
            .nth(index)
            .map(|p| p.name)
            .ok_or_else(|| anyhow::anyhow!("Invalid port index: {index}")),
        None => Err(CliError::Cancelled("Port selection cancelled".to_string()).into()),
    }
}
