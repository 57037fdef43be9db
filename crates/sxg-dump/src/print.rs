//! Human-readable rendering of an exchange.

use std::io::{self, Write};

use sxg_verify::Exchange;

/// Version, request, response headers and header integrity.
pub fn headers<W: Write>(exchange: &Exchange, w: &mut W) -> io::Result<()> {
    writeln!(w, "format version: {}", exchange.version)?;
    writeln!(w, "request:")?;
    writeln!(w, "  method: {}", exchange.request_method)?;
    writeln!(w, "  uri: {}", exchange.request_uri)?;
    writeln!(w, "response:")?;
    writeln!(w, "  status: {}", exchange.response_status)?;
    writeln!(w, "  headers:")?;
    for (name, value) in &exchange.response_headers {
        writeln!(w, "    {name}: {value}")?;
    }
    writeln!(w, "signature: {}", exchange.signature)?;
    match exchange.header_integrity() {
        Ok(integrity) => writeln!(w, "header integrity: {integrity}"),
        Err(e) => writeln!(w, "header integrity: unavailable ({e})"),
    }
}

pub fn payload<W: Write>(exchange: &Exchange, w: &mut W) -> io::Result<()> {
    writeln!(w, "payload [{} bytes]:", exchange.payload.len())?;
    w.write_all(&exchange.payload)?;
    writeln!(w)
}
