//! Simulated decline codes and their human-readable messages.
//!
//! The code set mirrors the target platform. Requests to simulate an
//! unsupported code are rejected, never silently substituted; unknown
//! codes arriving from randomized chaos still render the default message.

/// Fallback code used when weighted selection exhausts its list.
pub const GENERIC_DECLINE: &str = "generic_decline";

/// Decline codes the control surface accepts.
pub const SUPPORTED_DECLINE_CODES: &[&str] = &[
    "card_declined",
    "insufficient_funds",
    "expired_card",
    "incorrect_cvc",
    "processing_error",
    "lost_card",
    "stolen_card",
    "fraudulent",
    GENERIC_DECLINE,
];

const DEFAULT_MESSAGE: &str = "Your card was declined.";

/// Whether the control surface accepts this code.
pub fn is_supported_code(code: &str) -> bool {
    SUPPORTED_DECLINE_CODES.contains(&code)
}

/// Human-readable message for a decline code.
pub fn message_for_code(code: &str) -> &'static str {
    match code {
        "card_declined" | "generic_decline" => DEFAULT_MESSAGE,
        "insufficient_funds" => "Your card has insufficient funds.",
        "expired_card" => "Your card has expired.",
        "incorrect_cvc" => "Your card's security code is incorrect.",
        "processing_error" => "An error occurred while processing your card. Try again in a little while.",
        "lost_card" => "Your card was declined. The card has been reported lost.",
        "stolen_card" => "Your card was declined. The card has been reported stolen.",
        "fraudulent" => "Your card was declined. The payment was flagged as fraudulent.",
        _ => DEFAULT_MESSAGE,
    }
}
