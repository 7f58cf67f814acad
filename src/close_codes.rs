//! WebSocket close codes (RFC 6455, section 7.4.1).
//!
//! Only the values the gateway itself emits are used, the rest are here so
//! protocol engines and tests can name what a peer sent back.

// -----------------------------------------------------------------------------
// ----- Close Codes -----------------------------------------------------------

pub const CLOSE_NORMAL: u16 = 1000;
pub const CLOSE_GOING_AWAY: u16 = 1001;
pub const CLOSE_PROTOCOL_ERROR: u16 = 1002;
pub const CLOSE_UNSUPPORTED: u16 = 1003;
pub const CLOSE_NO_STATUS: u16 = 1005;
pub const CLOSE_ABNORMAL: u16 = 1006;
pub const CLOSE_INVALID_PAYLOAD: u16 = 1007;
pub const CLOSE_POLICY_VIOLATION: u16 = 1008;
pub const CLOSE_TOO_LARGE: u16 = 1009;
pub const CLOSE_INTERNAL_ERROR: u16 = 1011;

/// Close frames carry at most 125 payload bytes, two of which are the code.
pub const MAX_CLOSE_REASON_LEN: usize = 123;

// -----------------------------------------------------------------------------
// ----- Helpers ---------------------------------------------------------------

/// Trim `reason` so it fits in a close frame without splitting a char.
pub fn clamp_reason(reason: &str) -> &str {
    if reason.len() <= MAX_CLOSE_REASON_LEN {
        return reason;
    }

    let mut end = MAX_CLOSE_REASON_LEN;
    while !reason.is_char_boundary(end) {
        end -= 1;
    }

    &reason[..end]
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
