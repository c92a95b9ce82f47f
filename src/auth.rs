//! Who may act on a trade.
//!
//! Only the two parties of a trade are ever authorized. [`Role::Admin`](crate::identity::Role)
//! grants nothing here.
use super::trade::Trade;
use super::types::UserId;

pub fn is_owner(trade: &Trade, caller: &UserId) -> bool {
    trade.owner() == caller
}

pub fn is_requester(trade: &Trade, caller: &UserId) -> bool {
    trade.requester() == caller
}

pub fn is_party(trade: &Trade, caller: &UserId) -> bool {
    is_owner(trade, caller) || is_requester(trade, caller)
}
