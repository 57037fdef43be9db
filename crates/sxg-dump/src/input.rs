//! Loading the exchange and certificate override named on the command line.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use sxg_verify::{Exchange, FetchConfig, Fetcher, HttpFetcher};
use tracing::debug;

use crate::args::Cli;

/// Read the exchange from `-i` or fetch it from `-u`. `None` when neither
/// was given.
pub fn load_exchange(cli: &Cli) -> Result<Option<Exchange>> {
    if let Some(path) = &cli.input {
        return read_exchange_file(path).map(Some);
    }
    if let Some(uri) = &cli.uri {
        let fetcher = HttpFetcher::for_exchanges(&FetchConfig::from_env())?;
        let bytes = fetcher.fetch(uri)?;
        debug!(uri = %uri, bytes = bytes.len(), "fetched exchange");
        let exchange =
            Exchange::from_bytes(&bytes).with_context(|| format!("could not decode {uri}"))?;
        return Ok(Some(exchange));
    }
    Ok(None)
}

fn read_exchange_file(path: &Path) -> Result<Exchange> {
    let bytes = fs::read(path).with_context(|| format!("could not open {}", path.display()))?;
    Exchange::from_bytes(&bytes).with_context(|| format!("could not decode {}", path.display()))
}

/// Certificate chain bytes from `--cert`.
pub fn load_cert_override(cli: &Cli) -> Result<Option<Vec<u8>>> {
    cli.cert
        .as_ref()
        .map(|path| fs::read(path).with_context(|| format!("could not read {}", path.display())))
        .transpose()
}
