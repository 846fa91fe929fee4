//! `aviary version` — show version information.

use anyhow::Result;

/// Run `aviary version`.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn run(json: bool) -> Result<()> {
    let version = env!("CARGO_PKG_VERSION");
    if json {
        let payload = serde_json::json!({ "name": "aviary", "version": version });
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        println!("aviary {version}");
    }
    Ok(())
}
