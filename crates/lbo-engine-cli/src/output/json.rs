use serde_json::Value;
use std::io::{self, Write};

/// Write the result envelope as JSON, one document per invocation.
///
/// Compact output keeps a batch or simulation report on a single line so it
/// can be streamed into line-oriented tools.
pub fn write_json<W: Write>(out: &mut W, value: &Value, compact: bool) -> io::Result<()> {
    if compact {
        serde_json::to_writer(&mut *out, value)?;
    } else {
        serde_json::to_writer_pretty(&mut *out, value)?;
    }
    writeln!(out)?;
    out.flush()
}
