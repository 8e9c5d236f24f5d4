//! Closure status codes reported by the messaging library.

use std::fmt;

/// Known reasons a messaging connection closes.
///
/// The library reports these as HTTP-like numeric status codes. A timed-out
/// connection shares code 408 with [`DisconnectReason::ConnectionLost`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DisconnectReason {
    ConnectionClosed,
    ConnectionLost,
    ConnectionReplaced,
    LoggedOut,
    BadSession,
    RestartRequired,
    MultideviceMismatch,
    Forbidden,
    UnavailableService,
}

impl DisconnectReason {
    pub const ALL: [DisconnectReason; 9] = [
        Self::ConnectionClosed,
        Self::ConnectionLost,
        Self::ConnectionReplaced,
        Self::LoggedOut,
        Self::BadSession,
        Self::RestartRequired,
        Self::MultideviceMismatch,
        Self::Forbidden,
        Self::UnavailableService,
    ];

    pub fn status_code(self) -> u16 {
        match self {
            Self::ConnectionClosed => 428,
            Self::ConnectionLost => 408,
            Self::ConnectionReplaced => 440,
            Self::LoggedOut => 401,
            Self::BadSession => 500,
            Self::RestartRequired => 515,
            Self::MultideviceMismatch => 411,
            Self::Forbidden => 403,
            Self::UnavailableService => 503,
        }
    }

    pub fn from_status_code(code: u16) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.status_code() == code)
    }

    /// Only an explicit logout ends the session for good.
    pub fn is_terminal(self) -> bool {
        self == Self::LoggedOut
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ConnectionClosed => "connection closed",
            Self::ConnectionLost => "connection lost",
            Self::ConnectionReplaced => "connection replaced",
            Self::LoggedOut => "logged out",
            Self::BadSession => "bad session",
            Self::RestartRequired => "restart required",
            Self::MultideviceMismatch => "multi-device mismatch",
            Self::Forbidden => "forbidden",
            Self::UnavailableService => "service unavailable",
        };
        write!(f, "{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_resolve_back() {
        for reason in DisconnectReason::ALL {
            assert_eq!(
                DisconnectReason::from_status_code(reason.status_code()),
                Some(reason)
            );
        }
        assert_eq!(DisconnectReason::from_status_code(999), None);
    }

    #[test]
    fn only_logged_out_is_terminal() {
        let terminal: Vec<_> = DisconnectReason::ALL
            .into_iter()
            .filter(|r| r.is_terminal())
            .collect();
        assert_eq!(terminal, vec![DisconnectReason::LoggedOut]);
        assert_eq!(DisconnectReason::LoggedOut.status_code(), 401);
    }
}
