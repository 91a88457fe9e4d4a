//! Device information command.

use {
    super::{connect, resolve_part},
    crate::{Cli, config::Config},
    anyhow::Result,
    console::style,
    rootloader::{Part, Transport},
};

/// Connect and print what the bootloader reported.
pub(crate) fn cmd_info(cli: &Cli, config: &Config, json: bool) -> Result<()> {
    let part = resolve_part(cli, config)?;
    let flasher = connect(cli, config, part)?;
    let session = flasher.session().ok_or(rootloader::Error::NotConnected)?;
    let detected = Part::from_signature(session.signature);
    let signature = format!(
        "{:02X} {:02X} {:02X}",
        session.signature[0], session.signature[1], session.signature[2]
    );

    if json {
        let output = serde_json::json!({
            "ok": true,
            "data": {
                "port": flasher.port().name(),
                "signature": signature,
                "part": detected.map(|p| p.name),
                "version": session.version,
                "features": session.features.names(),
                "boot_pages": session.boot_pages,
                "boot_size": session.boot_size(part.flash_page),
                "large_buffer": session.large_buffer,
            }
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    let part_label = detected.map_or_else(
        || style("unknown").dim().to_string(),
        |p| p.description.to_string(),
    );
    println!("{}", style("Bootloader").bold().underlined());
    println!("  Signature:    {signature} ({part_label})");
    println!("  Version:      {}", session.version);
    println!("  Features:     {}", session.features);
    println!(
        "  Boot area:    {} pages ({} bytes)",
        session.boot_pages,
        session.boot_size(part.flash_page)
    );
    println!(
        "  Buffering:    {}",
        if session.large_buffer {
            "multi-page"
        } else {
            "single page"
        }
    );
    Ok(())
}
