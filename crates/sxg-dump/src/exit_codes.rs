//! Process exit codes. Part of the public contract of `dump-signedexchange`.

use sxg_verify::ExchangeError;

pub const SUCCESS: i32 = 0;
pub const INPUT_ERROR: i32 = 1; // Unreadable or malformed input, missing -i/-u
pub const INTERNAL_ERROR: i32 = 2; // Anything not classified below

// Assigned by `ExchangeError::exit_code`; named here for the contract.
#[allow(dead_code)]
pub const VERIFICATION_FAILED: i32 = 4; // No signature set verified
#[allow(dead_code)]
pub const FETCH_FAILED: i32 = 5; // Exchange or certificate fetch failed
#[allow(dead_code)]
pub const UNSUPPORTED: i32 = 6; // Valid input using an unsupported algorithm or digest

/// Exit code for an exchange error, as assigned by [`ExchangeError::exit_code`].
pub fn for_exchange_error(err: &ExchangeError) -> i32 {
    err.exit_code()
}

/// Exit code for an error that aborted the run.
pub fn for_error(err: &anyhow::Error) -> i32 {
    if let Some(e) = err.downcast_ref::<ExchangeError>() {
        return for_exchange_error(e);
    }
    if err.downcast_ref::<std::io::Error>().is_some() {
        return INPUT_ERROR;
    }
    INTERNAL_ERROR
}
