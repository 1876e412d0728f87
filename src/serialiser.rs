use crate::srt::CaptionEntry;

use std::io::{BufWriter, Write};
use std::time::Duration;

use anyhow::{Context, Result};

pub fn serialise<W: Write>(entries: &[CaptionEntry], dst: W) -> Result<()> {
    let mut writer = BufWriter::new(dst);
    write_subs(&mut writer, entries).context("Failed to write subtitles.")?;
    writer.flush().context("Failed to write subtitles.")?;
    Ok(())
}

fn write_subs<W: Write>(buf: &mut W, entries: &[CaptionEntry]) -> Result<()> {
    for entry in entries {
        write_sub(buf, entry)?;
    }
    Ok(())
}

fn write_sub<W: Write>(buf: &mut W, entry: &CaptionEntry) -> Result<()> {
    writeln!(buf, "{}", entry.index)?;
    write_ts(buf, entry.show_at)?;
    write!(buf, " --> ")?;
    write_ts(buf, entry.hide_at)?;
    writeln!(buf)?;
    for line in entry.text.lines() {
        writeln!(buf, "{}", line)?;
    }
    writeln!(buf)?;
    Ok(())
}

fn write_ts<W: Write>(buf: &mut W, timestamp: Duration) -> Result<()> {
    let total_secs = timestamp.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    let millis = timestamp.subsec_millis();
    write!(
        buf,
        "{:02}:{:02}:{:02},{:03}",
        hours, minutes, seconds, millis
    )?;
    Ok(())
}
