// src/exec/decode.rs

//! Byte-stream → line decoding for process pipes.

use std::io;
use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tracing::trace;

use super::output::{OutputLine, OutputLog, Source};

/// Text encoding of a process' output pipes.
///
/// The distribution-management commands of the host tool write UTF-16LE;
/// everything executed *inside* an environment writes UTF-8.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputEncoding {
    #[default]
    Utf8,
    Utf16Le,
}

impl OutputEncoding {
    /// Decode one raw line. Invalid sequences are replaced, NUL padding and
    /// byte-order marks are dropped.
    pub fn decode(self, raw: &[u8]) -> String {
        match self {
            OutputEncoding::Utf8 => String::from_utf8_lossy(raw).into_owned(),
            OutputEncoding::Utf16Le => {
                let units = raw
                    .chunks_exact(2)
                    .map(|pair| u16::from_le_bytes([pair[0], pair[1]]));
                char::decode_utf16(units)
                    .map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER))
                    .filter(|c| *c != '\0' && *c != '\u{feff}')
                    .collect()
            }
        }
    }
}

/// Read `reader` to EOF, appending every line to `log` tagged with `source`.
///
/// This is the whole body of a reader task: no other logic runs here.
pub(crate) async fn pump_lines<R>(
    reader: R,
    encoding: OutputEncoding,
    source: Source,
    log: Arc<OutputLog>,
) -> io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        let n = match encoding {
            OutputEncoding::Utf8 => reader.read_until(b'\n', &mut buf).await?,
            OutputEncoding::Utf16Le => read_utf16_line(&mut reader, &mut buf).await?,
        };
        if n == 0 {
            break;
        }
        log.append(OutputLine::new(encoding.decode(&buf), source));
    }

    trace!(?source, "pipe closed");
    Ok(())
}

/// Read up to and including the next `\n` code unit (`0x0A 0x00`).
///
/// A bare `0x0A` byte can also be the high byte of another code unit, so the
/// byte offset decides whether a line really ended.
async fn read_utf16_line<R>(reader: &mut R, buf: &mut Vec<u8>) -> io::Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    loop {
        let n = reader.read_until(b'\n', buf).await?;
        if n == 0 || buf.last() != Some(&b'\n') {
            return Ok(buf.len());
        }
        if buf.len() % 2 == 1 {
            let mut high = [0u8; 1];
            if reader.read(&mut high).await? == 0 {
                return Ok(buf.len());
            }
            buf.push(high[0]);
            if high[0] == 0 {
                return Ok(buf.len());
            }
        }
    }
}
