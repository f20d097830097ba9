//! Encode command: shows how a message is framed on the wire.

use camlink_protocol::{hex, segment_bulk, split_message};

use crate::error::CliResult;

/// Prints one line per frame: `seq/total  HEX`.
pub fn run(text: &str, bulk: Option<usize>) -> CliResult<()> {
    let lines = match bulk {
        Some(frame_size) => bulk_lines(text.as_bytes(), frame_size)?,
        None => control_lines(text.as_bytes())?,
    };
    for line in lines {
        println!("{line}");
    }
    Ok(())
}

/// Control frame lines for `message`.
pub fn control_lines(message: &[u8]) -> CliResult<Vec<String>> {
    Ok(split_message(message)?
        .iter()
        .map(|frame| {
            format!(
                "{}/{}  {}",
                frame.sequence,
                frame.total_count,
                hex(&frame.encode())
            )
        })
        .collect())
}

/// Bulk frame lines for `data` at `frame_size` bytes per frame.
pub fn bulk_lines(data: &[u8], frame_size: usize) -> CliResult<Vec<String>> {
    let mut lines = Vec::new();
    for frame in segment_bulk(data, frame_size)? {
        let bytes = frame.encode(frame_size)?;
        lines.push(format!(
            "{}/{}  {}",
            frame.sequence,
            frame.total_count,
            hex(&bytes)
        ));
    }
    Ok(lines)
}
