use std::io::{self, Write};

use anyhow::Result;
use chrono::Utc;
use clap::Parser;
use sxg_verify::{Exchange, FetchConfig, HttpFetcher, Verifier, VerifyConfig};
use tracing_subscriber::EnvFilter;

mod args;
pub mod exit_codes;
mod input;
mod print;
mod report;

use args::Cli;
use report::{DumpReport, VerificationReport};

const USAGE_HINT: &str = "Need to pass -u with URI of sxg or -i with file location of sxg";

fn main() {
    init_tracing();
    let cli = Cli::parse();
    let code = match run(&cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("fatal: {e:#}");
            exit_codes::for_error(&e)
        }
    };
    std::process::exit(code);
}

/// Logs go to stderr so stdout stays parseable.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn run(cli: &Cli) -> Result<i32> {
    let Some(mut exchange) = input::load_exchange(cli)? else {
        println!("{USAGE_HINT}");
        return Ok(exit_codes::INPUT_ERROR);
    };

    let verification = if cli.verify {
        let report = verify(cli, &mut exchange)?;
        Some(report)
    } else {
        None
    };
    let code = verification
        .as_ref()
        .map_or(exit_codes::SUCCESS, |r| r.exit_code);

    let stdout = io::stdout();
    let mut out = stdout.lock();
    if cli.json {
        let mut dump = DumpReport::new(&exchange);
        dump.signature = cli.signature.then(|| exchange.signature.clone());
        dump.payload = cli
            .payload
            .then(|| String::from_utf8_lossy(&exchange.payload).into_owned());
        dump.verification = verification;
        serde_json::to_writer_pretty(&mut out, &dump)?;
        writeln!(out)?;
        return Ok(code);
    }

    if cli.headers {
        print::headers(&exchange, &mut out)?;
    }
    if cli.payload {
        print::payload(&exchange, &mut out)?;
    }
    if cli.signature {
        writeln!(out, "{}", exchange.signature)?;
    }
    if let Some(report) = &verification {
        writeln!(out)?;
        report.write_text(&mut out)?;
    }
    Ok(code)
}

/// Verify and, on success, swap in the decoded payload.
fn verify(cli: &Cli, exchange: &mut Exchange) -> Result<VerificationReport> {
    let cert_override = input::load_cert_override(cli)?;
    let fetcher = HttpFetcher::for_certificates(&FetchConfig::from_env())?;
    let now = cli.time.unwrap_or_else(Utc::now);

    let result = Verifier::new(&fetcher)
        .with_certificate_override(cert_override.as_deref())
        .with_config(VerifyConfig::from_env())
        .verify(exchange, now);
    let report = VerificationReport::from_result(&result);

    if let Ok(verified) = result {
        exchange.payload = verified.payload;
    }
    Ok(report)
}
