//! Prompt text for the timeout advisor.

use crate::types::TimeoutDecisionRequest;

/// System prompt for the advisor call. The model must answer with bare JSON
/// so the response survives providers without structured-output support.
pub const ADVISOR_SYSTEM: &str = r#"You are an AI responsible for determining the session timeout for a secure chat application.

You will receive the latest message content, a numerical value representing the user activity level, and the current session timeout. Based on these inputs, you should adjust the timeout to ensure optimal security.

Consider the following factors:
- Suspicious Message Content: If the message content contains potentially sensitive information or suspicious keywords, reduce the timeout.
- User Activity: If the user is highly active, maintain a longer timeout. If the user is inactive, reduce the timeout.

The new timeout must not be less than 60 seconds.

Respond with a single JSON object and nothing else:
{"newTimeout": <seconds, integer>, "reason": "<brief explanation for the adjustment>"}"#;

/// Render the per-evaluation user message.
pub fn evaluation_prompt(req: &TimeoutDecisionRequest) -> String {
    format!(
        "Message Content: {}\nUser Activity Level: {}\nCurrent Timeout: {} seconds",
        req.message_content, req.user_activity_level, req.current_timeout_secs
    )
}

/// Keywords the rule-based advisor treats as suspicious. Lowercase.
pub const SUSPICIOUS_KEYWORDS: &[&str] = &[
    "password",
    "credit card",
    "ssn",
    "social security",
    "bank account",
    "wire transfer",
    "bitcoin",
    "private key",
    "seed phrase",
    "http://",
    "https://",
];
