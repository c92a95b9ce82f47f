//! The trade record and its status machine.
//!
//! ```text
//! pending ─┬─> accepted ──> completed
//!          ├─> proposed ─┬─> completed
//!          │             └─> cancelled
//!          ├─> rejected
//!          └─> cancelled
//! ```
//!
//! `completed`, `rejected` and `cancelled` are terminal. Fields are private: a [`Trade`] only
//! changes through the transition methods below.
use super::error::TradeError;
use super::transfer::OwnershipTransfer;
use super::types::{BookId, TimeStamp, TradeId, UserId};
use chrono::Utc;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

#[derive(
    minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize,
)]
#[serde(rename_all = "lowercase")]
pub enum TradeStatus {
    #[n(0)]
    Pending,
    #[n(1)]
    Accepted,
    #[n(2)]
    Rejected,
    #[n(3)]
    Completed,
    #[n(4)]
    Cancelled,
    #[n(5)]
    Proposed,
}

impl TradeStatus {
    pub const ALL: [TradeStatus; 6] = [
        TradeStatus::Pending,
        TradeStatus::Accepted,
        TradeStatus::Rejected,
        TradeStatus::Completed,
        TradeStatus::Cancelled,
        TradeStatus::Proposed,
    ];

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TradeStatus::Completed | TradeStatus::Rejected | TradeStatus::Cancelled
        )
    }

    /// The statuses an owner may answer a pending request with
    pub fn is_response(self) -> bool {
        matches!(
            self,
            TradeStatus::Accepted | TradeStatus::Rejected | TradeStatus::Proposed
        )
    }

    pub fn can_transition_to(self, next: TradeStatus) -> bool {
        use TradeStatus::*;
        match self {
            Pending => matches!(next, Accepted | Rejected | Proposed | Cancelled),
            // an accepted trade is binding, it can only be completed
            Accepted => next == Completed,
            Proposed => matches!(next, Completed | Cancelled),
            Completed | Rejected | Cancelled => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TradeStatus::Pending => "pending",
            TradeStatus::Accepted => "accepted",
            TradeStatus::Rejected => "rejected",
            TradeStatus::Completed => "completed",
            TradeStatus::Cancelled => "cancelled",
            TradeStatus::Proposed => "proposed",
        }
    }
}

impl fmt::Display for TradeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TradeStatus {
    type Err = TradeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TradeStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| TradeError::InvalidArgument("Invalid trade status.".into()))
    }
}

/// Everything needed to open a trade, already resolved against the ledger.
#[derive(Debug, Clone)]
pub struct OpenTrade {
    pub id: TradeId,
    pub requester: UserId,
    pub owner: UserId,
    pub requested_book: BookId,
    pub offered_book: Option<BookId>,
    pub notes: Option<String>,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Trade {
    #[n(0)]
    id: TradeId,
    #[n(1)]
    requester: UserId,
    #[n(2)]
    owner: UserId, // owner of the requested book when the trade was opened
    #[n(3)]
    requested_book: BookId,
    #[n(4)]
    offered_book: Option<BookId>,
    #[n(5)]
    proposed_book_from_owner: Option<BookId>,
    #[n(6)]
    status: TradeStatus,
    #[n(7)]
    notes_from_requester: Option<String>,
    #[n(8)]
    notes_from_owner: Option<String>,
    // reserved, nothing reads or writes it yet
    #[n(9)]
    counter_accepted_by_requester: bool,
    #[n(10)]
    requested_book_transferred: bool,
    #[n(11)]
    trade_date: Option<TimeStamp<Utc>>,
    #[n(12)]
    created_at: TimeStamp<Utc>,
    #[n(13)]
    updated_at: TimeStamp<Utc>,
}

impl Trade {
    pub fn open(draft: OpenTrade, now: TimeStamp<Utc>) -> Result<Self, TradeError> {
        if draft.requester == draft.owner {
            return Err(TradeError::InvalidOperation(
                "You cannot request a book you already own.".into(),
            ));
        }

        Ok(Self {
            id: draft.id,
            requester: draft.requester,
            owner: draft.owner,
            requested_book: draft.requested_book,
            offered_book: draft.offered_book,
            proposed_book_from_owner: None,
            status: TradeStatus::Pending,
            notes_from_requester: draft.notes,
            notes_from_owner: None,
            counter_accepted_by_requester: false,
            requested_book_transferred: false,
            trade_date: None,
            created_at: now.clone(),
            updated_at: now,
        })
    }

    pub fn id(&self) -> &TradeId {
        &self.id
    }
    pub fn requester(&self) -> &UserId {
        &self.requester
    }
    pub fn owner(&self) -> &UserId {
        &self.owner
    }
    pub fn requested_book(&self) -> &BookId {
        &self.requested_book
    }
    pub fn offered_book(&self) -> Option<&BookId> {
        self.offered_book.as_ref()
    }
    pub fn proposed_book_from_owner(&self) -> Option<&BookId> {
        self.proposed_book_from_owner.as_ref()
    }
    pub fn status(&self) -> TradeStatus {
        self.status
    }
    pub fn notes_from_requester(&self) -> Option<&str> {
        self.notes_from_requester.as_deref()
    }
    pub fn notes_from_owner(&self) -> Option<&str> {
        self.notes_from_owner.as_deref()
    }
    pub fn counter_accepted_by_requester(&self) -> bool {
        self.counter_accepted_by_requester
    }
    pub fn requested_book_transferred(&self) -> bool {
        self.requested_book_transferred
    }
    pub fn trade_date(&self) -> Option<&TimeStamp<Utc>> {
        self.trade_date.as_ref()
    }
    pub fn created_at(&self) -> &TimeStamp<Utc> {
        &self.created_at
    }
    pub fn updated_at(&self) -> &TimeStamp<Utc> {
        &self.updated_at
    }

    /// Owner's answer to a pending request. Ownership of the proposed book is checked by the
    /// caller, this only enforces that one is named.
    pub fn respond(
        &mut self,
        status: TradeStatus,
        proposed_book: Option<BookId>,
        notes: Option<String>,
        now: TimeStamp<Utc>,
    ) -> Result<(), TradeError> {
        if !status.is_response() {
            return Err(TradeError::InvalidArgument("Invalid trade status.".into()));
        }
        if self.status != TradeStatus::Pending {
            return Err(TradeError::not_pending());
        }
        if status == TradeStatus::Proposed {
            let Some(book) = proposed_book else {
                return Err(TradeError::InvalidArgument("Invalid proposed book.".into()));
            };
            self.proposed_book_from_owner = Some(book);
        }
        if notes.is_some() {
            self.notes_from_owner = notes;
        }
        self.advance(status, now)
    }

    /// One-way acceptance. The requested book changes hands as part of this transition.
    pub fn accept(&mut self, now: TimeStamp<Utc>) -> Result<(), TradeError> {
        if self.status != TradeStatus::Pending {
            return Err(TradeError::not_pending());
        }
        self.requested_book_transferred = true;
        self.advance(TradeStatus::Accepted, now)
    }

    pub fn reject(&mut self, now: TimeStamp<Utc>) -> Result<(), TradeError> {
        if self.status != TradeStatus::Pending {
            return Err(TradeError::not_pending());
        }
        self.advance(TradeStatus::Rejected, now)
    }

    pub fn cancel(&mut self, now: TimeStamp<Utc>) -> Result<(), TradeError> {
        match self.status {
            TradeStatus::Accepted | TradeStatus::Completed => Err(TradeError::InvalidState(
                "Cannot cancel a trade that has been accepted or completed.".into(),
            )),
            TradeStatus::Rejected | TradeStatus::Cancelled => Err(TradeError::InvalidState(
                format!("Trade is already {}.", self.status),
            )),
            TradeStatus::Pending | TradeStatus::Proposed => {
                self.advance(TradeStatus::Cancelled, now)
            }
        }
    }

    pub fn complete(&mut self, now: TimeStamp<Utc>) -> Result<(), TradeError> {
        if !matches!(self.status, TradeStatus::Accepted | TradeStatus::Proposed) {
            return Err(TradeError::InvalidState(
                "Trade must be accepted or proposed before completion.".into(),
            ));
        }
        self.requested_book_transferred = true;
        self.trade_date = Some(now.clone());
        self.advance(TradeStatus::Completed, now)
    }

    /// Book movements that completing this trade performs. The requested book is left out when
    /// an earlier accept already moved it.
    pub fn completion_transfers(&self) -> Vec<OwnershipTransfer> {
        let mut transfers = Vec::with_capacity(2);
        if !self.requested_book_transferred {
            transfers.push(OwnershipTransfer::new(
                self.requested_book.clone(),
                self.requester.clone(),
            ));
        }
        if let Some(offered) = &self.offered_book {
            transfers.push(OwnershipTransfer::new(offered.clone(), self.owner.clone()));
        }
        transfers
    }

    /// Book movements performed by the one-way accept path
    pub fn acceptance_transfers(&self) -> Vec<OwnershipTransfer> {
        vec![OwnershipTransfer::new(
            self.requested_book.clone(),
            self.requester.clone(),
        )]
    }

    fn advance(&mut self, next: TradeStatus, now: TimeStamp<Utc>) -> Result<(), TradeError> {
        if !self.status.can_transition_to(next) {
            return Err(TradeError::InvalidState(format!(
                "Trade cannot move from {} to {}.",
                self.status, next
            )));
        }
        self.status = next;
        self.updated_at = now;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open(offered: Option<&str>) -> Trade {
        Trade::open(
            OpenTrade {
                id: TradeId::from("trade_t"),
                requester: UserId::from("user_c"),
                owner: UserId::from("user_a"),
                requested_book: BookId::from("book_1"),
                offered_book: offered.map(BookId::from),
                notes: Some("please".into()),
            },
            TimeStamp::new(),
        )
        .unwrap()
    }

    #[test]
    fn opens_pending() {
        let trade = open(None);
        assert_eq!(trade.status(), TradeStatus::Pending);
        assert_eq!(trade.notes_from_requester(), Some("please"));
        assert!(trade.trade_date().is_none());
        assert!(!trade.counter_accepted_by_requester());
    }

    #[test]
    fn refuses_self_trade() {
        let draft = OpenTrade {
            id: TradeId::from("trade_t"),
            requester: UserId::from("user_a"),
            owner: UserId::from("user_a"),
            requested_book: BookId::from("book_1"),
            offered_book: None,
            notes: None,
        };
        assert!(matches!(
            Trade::open(draft, TimeStamp::new()),
            Err(TradeError::InvalidOperation(_))
        ));
    }

    #[test]
    fn status_strings() {
        assert_eq!("proposed".parse::<TradeStatus>().unwrap(), TradeStatus::Proposed);
        assert!(matches!(
            "maybe".parse::<TradeStatus>(),
            Err(TradeError::InvalidArgument(_))
        ));
        assert_eq!(TradeStatus::Cancelled.to_string(), "cancelled");
    }

    #[test]
    fn proposal_requires_a_book() {
        let mut trade = open(None);
        let err = trade
            .respond(TradeStatus::Proposed, None, None, TimeStamp::new())
            .unwrap_err();
        assert!(matches!(err, TradeError::InvalidArgument(_)));
        assert_eq!(trade.status(), TradeStatus::Pending);
    }

    #[test]
    fn respond_only_accepts_response_statuses() {
        let mut trade = open(None);
        for status in [
            TradeStatus::Pending,
            TradeStatus::Completed,
            TradeStatus::Cancelled,
        ] {
            assert!(matches!(
                trade.respond(status, None, None, TimeStamp::new()),
                Err(TradeError::InvalidArgument(_))
            ));
        }
    }

    #[test]
    fn proposal_records_counter_offer() {
        let mut trade = open(None);
        trade
            .respond(
                TradeStatus::Proposed,
                Some(BookId::from("book_2")),
                Some("how about this one".into()),
                TimeStamp::new(),
            )
            .unwrap();

        assert_eq!(trade.status(), TradeStatus::Proposed);
        assert_eq!(trade.proposed_book_from_owner(), Some(&BookId::from("book_2")));
        assert_eq!(trade.notes_from_owner(), Some("how about this one"));
    }

    #[test]
    fn accept_then_complete_moves_only_offered_book() {
        let mut trade = open(Some("book_9"));
        trade.accept(TimeStamp::new()).unwrap();
        assert!(trade.requested_book_transferred());

        let transfers = trade.completion_transfers();
        assert_eq!(transfers.len(), 1);
        assert_eq!(transfers[0].book, BookId::from("book_9"));
        assert_eq!(transfers[0].new_owner, UserId::from("user_a"));

        trade.complete(TimeStamp::new()).unwrap();
        assert_eq!(trade.status(), TradeStatus::Completed);
        assert!(trade.trade_date().is_some());
    }

    #[test]
    fn responded_acceptance_still_owes_requested_book() {
        let mut trade = open(Some("book_9"));
        trade
            .respond(TradeStatus::Accepted, None, None, TimeStamp::new())
            .unwrap();
        assert!(!trade.requested_book_transferred());
        assert_eq!(trade.completion_transfers().len(), 2);
    }

    #[test]
    fn accepted_trade_cannot_be_cancelled() {
        let mut trade = open(None);
        trade.accept(TimeStamp::new()).unwrap();
        assert!(matches!(
            trade.cancel(TimeStamp::new()),
            Err(TradeError::InvalidState(_))
        ));
    }

    #[test]
    fn terminal_states_are_final() {
        let mut trade = open(None);
        trade.reject(TimeStamp::new()).unwrap();

        assert!(trade.accept(TimeStamp::new()).is_err());
        assert!(trade.cancel(TimeStamp::new()).is_err());
        assert!(trade.complete(TimeStamp::new()).is_err());
        assert_eq!(trade.status(), TradeStatus::Rejected);
    }

    #[test]
    fn trade_encoding() {
        let original = open(Some("book_9"));

        let encoding = minicbor::to_vec(&original).unwrap();
        let decoded: Trade = minicbor::decode(&encoding).unwrap();

        assert_eq!(original, decoded);
    }
}
