pub mod config;
pub mod stats;
pub mod timer;

use serde::Serialize;

/// Print one JSON document per line on stdout.
pub(crate) fn print_json<T: Serialize>(value: &T) -> Result<(), serde_json::Error> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}
