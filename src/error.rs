use std::fmt;

use solana_client::client_error::ClientError;
use thiserror::Error;

/// Remote endpoints the engine talks to. Each one is its own failure domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Leaderboard,
    Config,
    Account,
    Adjustments,
    Click,
}

impl Endpoint {
    pub fn path(&self) -> &'static str {
        match self {
            Endpoint::Leaderboard => "/points/leaderboard",
            Endpoint::Config => "/points/config",
            Endpoint::Account => "/points",
            Endpoint::Adjustments => "/points/adjustments",
            Endpoint::Click => "/points/click",
        }
    }

    pub fn takes_wallet(&self) -> bool {
        matches!(self, Endpoint::Account | Endpoint::Adjustments | Endpoint::Click)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Endpoint::Leaderboard => "leaderboard",
            Endpoint::Config => "config",
            Endpoint::Account => "account",
            Endpoint::Adjustments => "adjustments",
            Endpoint::Click => "click",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{endpoint} request failed: {reason}")]
    Network { endpoint: Endpoint, reason: String },

    #[error("{endpoint} returned malformed {field}: {value:?}")]
    Malformed {
        endpoint: Endpoint,
        field: &'static str,
        value: String,
    },

    #[error("slot history RPC error: {0}")]
    Rpc(#[from] ClientError),

    #[error("wallet not connected")]
    WalletNotConnected,

    #[error("daily click limit reached")]
    DailyCapReached {
        current: Option<u64>,
        max: Option<u64>,
    },

    #[error("a click is already awaiting confirmation")]
    ClickInFlight,

    #[error("result discarded: wallet changed while the request was in flight")]
    Superseded,

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl EngineError {
    pub fn network(endpoint: Endpoint, reason: impl fmt::Display) -> Self {
        EngineError::Network {
            endpoint,
            reason: reason.to_string(),
        }
    }

    pub fn malformed(endpoint: Endpoint, field: &'static str, value: impl Into<String>) -> Self {
        EngineError::Malformed {
            endpoint,
            field,
            value: value.into(),
        }
    }

    /// Transport, status and parse failures. These are absorbed per endpoint and
    /// leave previously published data in place.
    pub fn is_network_failure(&self) -> bool {
        matches!(
            self,
            EngineError::Network { .. } | EngineError::Malformed { .. } | EngineError::Rpc(_)
        )
    }

    pub fn endpoint(&self) -> Option<Endpoint> {
        match self {
            EngineError::Network { endpoint, .. } | EngineError::Malformed { endpoint, .. } => {
                Some(*endpoint)
            }
            _ => None,
        }
    }
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;
