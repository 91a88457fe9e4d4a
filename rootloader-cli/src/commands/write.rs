//! Memory write, verify and read commands.

use {
    super::{connect, progress_bar, resolve_part, status, track},
    crate::{Cli, CliError, config::Config},
    anyhow::{Context, Result, bail},
    log::info,
    rootloader::{MemoryKind, image},
    std::{fs, path::Path},
};

fn load_image(path: &Path, max_size: usize) -> Result<Vec<u8>> {
    let data = image::load(path, max_size)
        .with_context(|| format!("Failed to load image {}", path.display()))?;
    if data.is_empty() {
        return Err(CliError::Usage(format!("{} contains no data", path.display())).into());
    }
    Ok(data)
}

/// Offset of the first byte where `actual` differs from `expected`.
fn first_mismatch(expected: &[u8], actual: &[u8]) -> Option<usize> {
    expected
        .iter()
        .zip(actual)
        .position(|(e, a)| e != a)
        .or_else(|| (actual.len() < expected.len()).then_some(actual.len()))
}

/// Write an image, then check it unless told not to.
///
/// Flash is checked by the device with VERIFYFLASH. EEPROM is read back and
/// compared here.
pub(crate) fn cmd_write(
    cli: &Cli,
    config: &Config,
    file: &Path,
    kind: MemoryKind,
    skip_verify: bool,
) -> Result<()> {
    let part = resolve_part(cli, config)?;
    let region = part.region(kind);
    let data = load_image(file, region.size)?;
    let mut flasher = connect(cli, config, part)?;

    let pb = progress_bar(cli, &format!("Writing {kind}"));
    let written = flasher.write_region(&region, &data, track(&pb));
    pb.finish_and_clear();
    written.with_context(|| format!("Writing {kind} failed"))?;
    status(cli, &format!("Wrote {} bytes to {kind}", data.len()));

    if skip_verify {
        info!("Skipping verification");
        return Ok(());
    }

    let pb = progress_bar(cli, &format!("Verifying {kind}"));
    let checked = match kind {
        MemoryKind::Flash => flasher
            .verify_region(&region, Some(&data), track(&pb))
            .map_err(anyhow::Error::from),
        MemoryKind::Eeprom => flasher
            .read_region(&region, track(&pb))
            .map_err(anyhow::Error::from)
            .and_then(|back| match first_mismatch(&data, &back) {
                Some(offset) => bail!("EEPROM differs at offset {offset:#06X}"),
                None => Ok(()),
            }),
    };
    pb.finish_and_clear();
    checked.with_context(|| format!("Verifying {kind} failed"))?;
    status(cli, &format!("Verified {kind}"));
    Ok(())
}

/// Have the device compare a flash image.
pub(crate) fn cmd_verify(cli: &Cli, config: &Config, file: &Path) -> Result<()> {
    let part = resolve_part(cli, config)?;
    let region = part.flash();
    let data = load_image(file, region.size)?;
    let mut flasher = connect(cli, config, part)?;

    let pb = progress_bar(cli, "Verifying flash");
    let checked = flasher.verify_region(&region, Some(&data), track(&pb));
    pb.finish_and_clear();
    checked.context("Flash does not match the image")?;
    status(cli, &format!("Flash matches {}", file.display()));
    Ok(())
}

/// Read memory into a raw binary file.
pub(crate) fn cmd_read(cli: &Cli, config: &Config, file: &Path, kind: MemoryKind) -> Result<()> {
    if kind == MemoryKind::Flash {
        bail!(CliError::Usage(
            "Flash cannot be read through AVRootloader; only EEPROM can be read back".to_string()
        ));
    }

    let part = resolve_part(cli, config)?;
    let region = part.region(kind);
    let mut flasher = connect(cli, config, part)?;

    let pb = progress_bar(cli, &format!("Reading {kind}"));
    let data = flasher.read_region(&region, track(&pb));
    pb.finish_and_clear();
    let data = data.with_context(|| format!("Reading {kind} failed"))?;

    fs::write(file, &data).with_context(|| format!("Failed to write {}", file.display()))?;
    status(
        cli,
        &format!("Read {} bytes of {kind} into {}", data.len(), file.display()),
    );
    Ok(())
}
