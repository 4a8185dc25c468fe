#[cfg(test)]
#[path = "error_test.rs"]
mod tests;

use std::error;
use std::fmt;

/// Everything that can go wrong talking to the chat backend, collapsed into
/// the handful of cases the companion renders differently.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChatError {
    NoInternet,
    Timeout,
    ServerError,
    RateLimited,
    ParseError,
    Unknown,
}

impl ChatError {
    pub fn from_status(status: u16) -> ChatError {
        if status == 429 {
            return ChatError::RateLimited;
        }
        if status == 408 || status == 504 {
            return ChatError::Timeout;
        }
        if (500..=599).contains(&status) {
            return ChatError::ServerError;
        }

        return ChatError::Unknown;
    }

    pub fn from_request_error(err: &reqwest::Error) -> ChatError {
        if err.is_timeout() {
            return ChatError::Timeout;
        }
        if err.is_connect() {
            return ChatError::NoInternet;
        }
        if err.is_decode() {
            return ChatError::ParseError;
        }
        if let Some(status) = err.status() {
            return ChatError::from_status(status.as_u16());
        }

        return ChatError::Unknown;
    }

    /// Short, actionable copy rendered inside the error bubble.
    pub fn user_message(&self) -> &'static str {
        match self {
            ChatError::NoInternet => {
                return "Looks like you're offline. Check your connection and hit Retry.";
            }
            ChatError::Timeout => {
                return "That took too long. Give it another try in a moment.";
            }
            ChatError::ServerError => {
                return "The assistant hit a server error. Try again shortly.";
            }
            ChatError::RateLimited => {
                return "Slow down a touch, you're sending messages too quickly.";
            }
            ChatError::ParseError => {
                return "Got a reply I couldn't read. Try sending that again.";
            }
            ChatError::Unknown => {
                return "Something went wrong. Try again, and reconnect if it keeps up.";
            }
        }
    }
}

impl fmt::Display for ChatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ChatError::NoInternet => "no internet connection",
            ChatError::Timeout => "request timed out",
            ChatError::ServerError => "server error",
            ChatError::RateLimited => "rate limited",
            ChatError::ParseError => "unreadable response",
            ChatError::Unknown => "unknown error",
        };
        return write!(f, "{label}");
    }
}

impl error::Error for ChatError {}
