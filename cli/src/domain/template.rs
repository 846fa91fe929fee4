//! `{{KEY}}` template substitution and token detection — no I/O, no async.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

/// Opaque placeholder persisted in place of sensitive variable values.
/// The secret itself is never written to a state record.
pub const SENSITIVE_PLACEHOLDER: &str = "<redacted>";

/// Template token: `{{KEY}}` with optional interior whitespace.
pub static TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    // Safety: this is a compile-time constant pattern — cannot fail.
    #[allow(clippy::expect_used)]
    Regex::new(r"\{\{\s*([A-Z][A-Z0-9_]*)\s*\}\}").expect("valid regex")
});

/// Sniff window for binary detection. A NUL byte in the first 8 KiB marks
/// the file as opaque bytes, exempt from substitution.
const BINARY_SNIFF_LEN: usize = 8192;

/// Substitute every `{{KEY}}` token with its resolved value. Tokens without
/// a value are left verbatim so callers can detect them afterwards.
#[must_use]
pub fn substitute(input: &str, variables: &BTreeMap<String, String>) -> String {
    TOKEN_RE
        .replace_all(input, |caps: &regex::Captures<'_>| {
            let key = &caps[1];
            variables
                .get(key)
                .cloned()
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// Keys of the tokens still present in `input`, in order of appearance.
#[must_use]
pub fn unresolved_tokens(input: &str) -> Vec<String> {
    TOKEN_RE
        .captures_iter(input)
        .map(|caps| caps[1].to_string())
        .collect()
}

/// Returns `true` if `input` still contains any template token.
#[must_use]
pub fn has_unresolved_tokens(input: &str) -> bool {
    TOKEN_RE.is_match(input)
}

/// Returns `true` if `bytes` looks like binary content.
#[must_use]
pub fn looks_binary(bytes: &[u8]) -> bool {
    bytes[..bytes.len().min(BINARY_SNIFF_LEN)].contains(&0u8)
}
