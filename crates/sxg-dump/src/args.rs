use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::{ArgAction, Parser};

#[derive(Parser, Debug)]
#[command(
    name = "dump-signedexchange",
    version,
    about = "Print and verify Signed HTTP Exchanges (application/signed-exchange)"
)]
pub struct Cli {
    /// Signed-exchange input file, read instead of `-u` when both are given
    #[arg(short = 'i', long = "input", value_name = "FILE")]
    pub input: Option<PathBuf>,

    /// Signed-exchange URI to fetch
    #[arg(short = 'u', long = "uri", value_name = "URI")]
    pub uri: Option<String>,

    /// Print signature value
    #[arg(long)]
    pub signature: bool,

    /// Perform signature verification
    #[arg(long)]
    pub verify: bool,

    /// Certificate chain CBOR file, used instead of fetching the signature's cert-url
    #[arg(long, value_name = "FILE")]
    pub cert: Option<PathBuf>,

    /// Print headers (`--headers=false` to suppress)
    #[arg(
        long,
        action = ArgAction::Set,
        default_value_t = true,
        num_args = 0..=1,
        default_missing_value = "true",
        value_name = "BOOL"
    )]
    pub headers: bool,

    /// Print payload
    #[arg(long)]
    pub payload: bool,

    /// Verification time (RFC 3339); defaults to now
    #[arg(long, value_name = "RFC3339", value_parser = parse_time)]
    pub time: Option<DateTime<Utc>>,

    /// Print one JSON document instead of text
    #[arg(long)]
    pub json: bool,
}

fn parse_time(raw: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| format!("invalid RFC 3339 time {raw:?}: {e}"))
}
