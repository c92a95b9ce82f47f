/// Every way a trade operation can be refused.
///
/// The message carried by each variant is what the caller sees.
#[derive(thiserror::Error, Debug)]
pub enum TradeError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    InvalidState(String),
    #[error("{0}")]
    InvalidArgument(String),
    #[error("{0}")]
    InvalidOperation(String),
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

impl TradeError {
    pub(crate) fn trade_not_found() -> Self {
        Self::NotFound("Trade request not found.".into())
    }
    pub(crate) fn forbidden(action: &str) -> Self {
        Self::Forbidden(format!("You are not authorized to {action} this trade."))
    }
    pub(crate) fn not_pending() -> Self {
        Self::InvalidState("Trade is not in a pending state.".into())
    }
}
