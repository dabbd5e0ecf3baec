//! Revert reason extraction from node error text.

const MARKER: &str = "execution reverted";

/// Human-readable revert reason from an RPC error message.
///
/// `execution reverted: nonce used` gives `nonce used` (quotes stripped); a
/// bare `execution reverted` gives itself; any other text is returned as is.
pub fn revert_reason(text: &str) -> String {
    let lower = text.to_ascii_lowercase();
    let Some(idx) = lower.find(MARKER) else {
        return text.trim().to_string();
    };
    let rest = &text[idx + MARKER.len()..];
    match rest.trim_start().strip_prefix(':') {
        Some(reason) => {
            let reason = reason.trim().trim_matches(|c| c == '"' || c == '\'').trim();
            if reason.is_empty() {
                MARKER.to_string()
            } else {
                reason.to_string()
            }
        }
        None => MARKER.to_string(),
    }
}

/// Hint attached to a revert whose reason the caller can act on.
pub fn revert_hint(reason: &str) -> Option<&'static str> {
    match reason.trim().to_ascii_lowercase().as_str() {
        "nonce used" => Some(
            "Re-run prepare_suite_artifacts to get a fresh nonce/signature, then register again.",
        ),
        _ => None,
    }
}
