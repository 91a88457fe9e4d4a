//! Part table listing.

use {anyhow::Result, console::style, rootloader::target::part::PARTS};

/// Print the built-in part table.
pub(crate) fn cmd_parts(json: bool) -> Result<()> {
    if json {
        let parts: Vec<serde_json::Value> = PARTS
            .iter()
            .map(|p| {
                serde_json::json!({
                    "name": p.name,
                    "description": p.description,
                    "signature": format!(
                        "{:02X}{:02X}{:02X}",
                        p.signature[0], p.signature[1], p.signature[2]
                    ),
                    "flash_size": p.flash_size,
                    "flash_page": p.flash_page,
                    "eeprom_size": p.eeprom_size,
                    "eeprom_page": p.eeprom_page,
                    "sram": p.sram,
                })
            })
            .collect();
        let output = serde_json::json!({
            "ok": true,
            "data": {
                "parts": parts,
            }
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!(
        "{:<12} {:<8} {:>8} {:>6} {:>8} {:>6}",
        style("Part").bold(),
        style("Sig").bold(),
        style("Flash").bold(),
        style("Page").bold(),
        style("EEPROM").bold(),
        style("Page").bold()
    );
    for p in PARTS {
        println!(
            "{:<12} {:02X}{:02X}{:02X}   {:>8} {:>6} {:>8} {:>6}",
            p.name,
            p.signature[0],
            p.signature[1],
            p.signature[2],
            p.flash_size,
            p.flash_page,
            p.eeprom_size,
            p.eeprom_page
        );
    }
    Ok(())
}
