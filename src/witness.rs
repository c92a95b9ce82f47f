use super::trade::TradeStatus;
use super::types::{BookId, TimeStamp, TradeId, UserId};
use chrono::Utc;
use serde::Serialize;

/// One entry of a trade's history. Written once per successful operation, never updated.
#[derive(Debug, PartialEq, Eq, minicbor::Encode, minicbor::Decode, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Witness {
    #[n(0)]
    pub trade_id: TradeId,
    #[n(1)]
    pub actor: UserId,
    #[n(2)]
    pub timestamp: TimeStamp<Utc>,
    #[n(3)]
    pub kind: WitnessKind,
}

#[derive(Debug, PartialEq, Eq, minicbor::Encode, minicbor::Decode, Clone, Serialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum WitnessKind {
    #[n(0)]
    Initiate {
        #[n(0)]
        requested_book: BookId,
        #[n(1)]
        offered_book: Option<BookId>,
    },
    #[n(1)]
    Respond {
        #[n(0)]
        status: TradeStatus,
        #[n(1)]
        proposed_book: Option<BookId>,
    },
    #[n(2)]
    Accept,
    #[n(3)]
    Reject,
    #[n(4)]
    Cancel,
    #[n(5)]
    Complete,
}

impl Witness {
    pub fn new(trade_id: TradeId, actor: UserId, kind: WitnessKind) -> Self {
        Self {
            trade_id,
            actor,
            timestamp: TimeStamp::new(),
            kind,
        }
    }
    /// CBOR encoding of the witness and the sha256 digest that addresses it
    pub fn build(&self) -> anyhow::Result<(String, Vec<u8>)> {
        let cbor = minicbor::to_vec(self)?;
        let hash = sha256::digest(&cbor);

        Ok((hash, cbor))
    }
}
