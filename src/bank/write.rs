use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{bail, Context, Result};

use super::{CaptionBank, CaptionLine, CaptionScript, BANK_VERSION};

pub fn serialise<P: AsRef<Path>>(bank: &CaptionBank, output: P) -> Result<()> {
    let output = output.as_ref();
    let file = std::fs::File::create(output)
        .with_context(|| format!("Failed to create '{}'", output.display()))?;
    let mut writer = BufWriter::new(file);
    write_bank(&mut writer, bank).context("Failed to write caption bank.")?;
    writer.flush().context("Failed to write caption bank.")?;
    Ok(())
}

pub fn write_bank<W: Write>(buf: &mut W, bank: &CaptionBank) -> Result<()> {
    let entry_count = i16::try_from(bank.scripts().len()).context("too many scripts")?;
    let speaker_count =
        i16::try_from(bank.speaker_names().len()).context("too many speaker names")?;

    buf.write_all(&entry_count.to_le_bytes())?;
    buf.write_all(&BANK_VERSION.to_le_bytes())?;
    buf.write_all(&(bank.language as i16).to_le_bytes())?;
    buf.write_all(&speaker_count.to_le_bytes())?;

    for name in bank.speaker_names() {
        write_string(buf, name)?;
    }
    for script in bank.scripts() {
        write_script(buf, script)
            .with_context(|| format!("in script '{}'", script.name))?;
    }
    Ok(())
}

fn write_script<W: Write>(buf: &mut W, script: &CaptionScript) -> Result<()> {
    write_string(buf, &script.name)?;
    let line_count = i32::try_from(script.lines.len()).context("too many lines")?;
    buf.write_all(&line_count.to_le_bytes())?;
    for line in &script.lines {
        write_line(buf, line)?;
    }
    Ok(())
}

fn write_line<W: Write>(buf: &mut W, line: &CaptionLine) -> Result<()> {
    buf.write_all(&line.start_time.to_le_bytes())?;
    buf.write_all(&line.end_time.to_le_bytes())?;
    buf.write_all(&(line.speaker as i16).to_le_bytes())?;
    buf.write_all(&line.flags.bits().to_le_bytes())?;
    write_string(buf, &line.text)
}

fn write_string<W: Write>(buf: &mut W, text: &str) -> Result<()> {
    let Ok(len) = u16::try_from(text.len()) else {
        bail!("string of {} bytes does not fit a u16 length", text.len());
    };
    buf.write_all(&len.to_le_bytes())?;
    buf.write_all(text.as_bytes())?;
    Ok(())
}
