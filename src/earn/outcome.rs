//! Classification of panel responses.

use serde_json::Value;

use super::tracker::SessionState;
use crate::domain::messages;
use crate::session::PanelResponse;

/// Field names that may carry the credit balance
pub const BALANCE_KEYS: [&str; 4] = ["balance", "credits", "coins", "amount"];

/// Depth-first search for the first numeric balance field.
///
/// At every object the candidate keys are checked first, then nested objects
/// and arrays are searched in document order.
pub fn extract_balance(value: &Value) -> Option<f64> {
    match value {
        Value::Object(map) => {
            for key in BALANCE_KEYS {
                if let Some(balance) = map.get(key).and_then(Value::as_f64) {
                    return Some(balance);
                }
            }
            map.values().find_map(extract_balance)
        }
        Value::Array(items) => items.iter().find_map(extract_balance),
        _ => None,
    }
}

/// Parse a response body and extract a balance. Non-JSON yields `None`.
pub fn parse_balance(body: &str) -> Option<f64> {
    serde_json::from_str::<Value>(body).ok().as_ref().and_then(extract_balance)
}

/// Message for a known balance, e.g. `balance=500`
pub fn balance_message(balance: f64) -> String {
    format!("balance={}", balance)
}

/// Result of classifying a balance fetch
#[derive(Debug, Clone, PartialEq)]
pub struct BalanceOutcome {
    pub state: SessionState,
    pub balance: Option<f64>,
    pub message: String,
}

/// Result of classifying an earn post
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EarnOutcome {
    /// New session state, `None` leaves it untouched
    pub state: Option<SessionState>,
    pub message: String,
}

fn is_auth_failure(status: u16) -> bool {
    matches!(status, 401 | 403)
}

/// Classify a balance response.
///
/// 2xx is valid, anything else marks the session expired so the next cycle
/// refreshes.
pub fn classify_balance(response: &PanelResponse) -> BalanceOutcome {
    if response.is_success() {
        let balance = parse_balance(&response.body);
        let message = balance.map_or_else(|| messages::OK.to_string(), balance_message);
        return BalanceOutcome {
            state: SessionState::Valid,
            balance,
            message,
        };
    }

    let message = if is_auth_failure(response.status) {
        messages::SESSION_EXPIRED.to_string()
    } else {
        format!("http {}", response.status)
    };
    BalanceOutcome {
        state: SessionState::Expired,
        balance: None,
        message,
    }
}

/// Classify an earn response. Only 204 counts as success.
pub fn classify_earn(response: &PanelResponse) -> EarnOutcome {
    match response.status {
        204 => EarnOutcome {
            state: Some(SessionState::Valid),
            message: messages::OK.to_string(),
        },
        status if is_auth_failure(status) => EarnOutcome {
            state: Some(SessionState::Expired),
            message: messages::SESSION_EXPIRED.to_string(),
        },
        status => EarnOutcome {
            state: None,
            message: format!("http {}", status),
        },
    }
}
