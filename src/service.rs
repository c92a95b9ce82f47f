//! Service layer API for trade negotiation
use super::auth::{is_owner, is_party};
use super::error::TradeError;
use super::identity::Identity;
use super::ledger::BookLedger;
use super::store::TradeStore;
use super::trade::{OpenTrade, Trade, TradeStatus};
use super::transfer::{self, OwnershipTransfer};
use super::types::{BookId, TimeStamp, TradeId};
use super::witness::{Witness, WitnessKind};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Request to open a trade for someone else's book
#[derive(Debug, Clone)]
pub struct InitiateTrade {
    pub requested_book: BookId,
    pub offered_book: Option<BookId>,
    pub notes: Option<String>,
}

impl InitiateTrade {
    pub fn new(requested_book: BookId) -> Self {
        Self {
            requested_book,
            offered_book: None,
            notes: None,
        }
    }
    pub fn offering(mut self, book: BookId) -> Self {
        self.offered_book = Some(book);
        self
    }
    pub fn with_notes(mut self, notes: &str) -> Self {
        self.notes = Some(notes.to_owned());
        self
    }
}

/// The owner's answer to a pending trade. `status` is the raw value the caller sent.
#[derive(Debug, Clone)]
pub struct RespondToTrade {
    pub status: String,
    pub proposed_book: Option<BookId>,
    pub notes: Option<String>,
}

impl RespondToTrade {
    pub fn new(status: &str) -> Self {
        Self {
            status: status.to_owned(),
            proposed_book: None,
            notes: None,
        }
    }
    pub fn proposing(mut self, book: BookId) -> Self {
        self.proposed_book = Some(book);
        self
    }
    pub fn with_notes(mut self, notes: &str) -> Self {
        self.notes = Some(notes.to_owned());
        self
    }
}

pub struct TradeService<S, L> {
    trades: Arc<S>,
    books: Arc<L>,
}

impl<S, L> Clone for TradeService<S, L> {
    fn clone(&self) -> Self {
        Self {
            trades: Arc::clone(&self.trades),
            books: Arc::clone(&self.books),
        }
    }
}

impl<S: TradeStore, L: BookLedger> TradeService<S, L> {
    pub fn new(trades: Arc<S>, books: Arc<L>) -> Self {
        Self { trades, books }
    }

    /// Open a pending trade for `cmd.requested_book`. The trade's owner is whoever owns the
    /// book right now.
    pub fn initiate_trade(
        &self,
        caller: &Identity,
        cmd: InitiateTrade,
    ) -> Result<Trade, TradeError> {
        let Some(requested) = self.books.fetch_book(&cmd.requested_book)? else {
            return Err(TradeError::NotFound("Requested book not found.".into()));
        };

        if let Some(offered) = &cmd.offered_book {
            let owns_offer = self
                .books
                .fetch_book(offered)?
                .is_some_and(|book| book.is_owned_by(&caller.id));
            if !owns_offer {
                return Err(TradeError::InvalidArgument("Invalid offered book.".into()));
            }
        }

        let trade = Trade::open(
            OpenTrade {
                id: TradeId::new()?,
                requester: caller.id.clone(),
                owner: requested.owner,
                requested_book: cmd.requested_book.clone(),
                offered_book: cmd.offered_book.clone(),
                notes: cmd.notes,
            },
            TimeStamp::new(),
        )?;

        self.trades.insert_trade(&trade)?;
        self.witness(
            &trade,
            caller,
            WitnessKind::Initiate {
                requested_book: cmd.requested_book,
                offered_book: cmd.offered_book,
            },
        );

        info!(trade = %trade.id(), requester = %caller.id, "trade initiated");
        Ok(trade)
    }

    /// Trades the caller takes part in, as requester or owner
    pub fn list_trades(&self, caller: &Identity) -> Result<Vec<Trade>, TradeError> {
        Ok(self.trades.trades_for_user(&caller.id)?)
    }

    pub fn get_trade(&self, trade_id: &TradeId) -> Result<Trade, TradeError> {
        self.load_trade(trade_id)
    }

    pub fn trade_history(
        &self,
        caller: &Identity,
        trade_id: &TradeId,
    ) -> Result<Vec<Witness>, TradeError> {
        let trade = self.load_trade(trade_id)?;
        if !is_party(&trade, &caller.id) {
            return Err(TradeError::forbidden("view"));
        }
        Ok(self.trades.witnesses(trade_id)?)
    }

    /// Owner answers a pending trade with accepted, rejected or proposed. No book moves.
    pub fn respond_to_trade(
        &self,
        caller: &Identity,
        trade_id: &TradeId,
        cmd: RespondToTrade,
    ) -> Result<Trade, TradeError> {
        let current = self.load_trade(trade_id)?;

        if !is_owner(&current, &caller.id) {
            return Err(TradeError::forbidden("respond to"));
        }

        let status: TradeStatus = cmd.status.parse()?;
        if !status.is_response() {
            return Err(TradeError::InvalidArgument("Invalid trade status.".into()));
        }
        if current.status() != TradeStatus::Pending {
            return Err(TradeError::not_pending());
        }

        if status == TradeStatus::Proposed {
            let owns_proposal = match &cmd.proposed_book {
                Some(book) => self
                    .books
                    .fetch_book(book)?
                    .is_some_and(|book| book.is_owned_by(&caller.id)),
                None => false,
            };
            if !owns_proposal {
                return Err(TradeError::InvalidArgument("Invalid proposed book.".into()));
            }
        }

        // a counter-offer book is only kept on a proposal
        let proposed_book = cmd.proposed_book.filter(|_| status == TradeStatus::Proposed);

        let mut next = current.clone();
        next.respond(status, proposed_book.clone(), cmd.notes, TimeStamp::new())?;

        let trade = self.commit(&current, next, &[])?;
        self.witness(
            &trade,
            caller,
            WitnessKind::Respond {
                status,
                proposed_book,
            },
        );

        info!(trade = %trade.id(), owner = %caller.id, %status, "trade answered");
        Ok(trade)
    }

    /// Owner accepts a pending trade. The requested book goes to the requester immediately.
    pub fn accept_trade(&self, caller: &Identity, trade_id: &TradeId) -> Result<Trade, TradeError> {
        let current = self.load_trade(trade_id)?;

        if !is_owner(&current, &caller.id) {
            return Err(TradeError::forbidden("accept"));
        }

        let mut next = current.clone();
        next.accept(TimeStamp::new())?;

        let trade = self.commit(&current, next, &current.acceptance_transfers())?;
        self.witness(&trade, caller, WitnessKind::Accept);

        info!(trade = %trade.id(), owner = %caller.id, "trade accepted");
        Ok(trade)
    }

    pub fn reject_trade(&self, caller: &Identity, trade_id: &TradeId) -> Result<Trade, TradeError> {
        let current = self.load_trade(trade_id)?;

        if !is_owner(&current, &caller.id) {
            return Err(TradeError::forbidden("reject"));
        }

        let mut next = current.clone();
        next.reject(TimeStamp::new())?;

        let trade = self.commit(&current, next, &[])?;
        self.witness(&trade, caller, WitnessKind::Reject);

        info!(trade = %trade.id(), owner = %caller.id, "trade rejected");
        Ok(trade)
    }

    /// Either party may withdraw while the trade is pending or proposed.
    pub fn cancel_trade(&self, caller: &Identity, trade_id: &TradeId) -> Result<Trade, TradeError> {
        let current = self.load_trade(trade_id)?;

        if !is_party(&current, &caller.id) {
            return Err(TradeError::forbidden("cancel"));
        }

        let mut next = current.clone();
        next.cancel(TimeStamp::new())?;

        let trade = self.commit(&current, next, &[])?;
        self.witness(&trade, caller, WitnessKind::Cancel);

        info!(trade = %trade.id(), by = %caller.id, "trade cancelled");
        Ok(trade)
    }

    /// Either party closes an accepted or proposed trade. The requested book goes to the
    /// requester unless an accept already moved it; an offered book goes to the owner.
    pub fn complete_trade(
        &self,
        caller: &Identity,
        trade_id: &TradeId,
    ) -> Result<Trade, TradeError> {
        let current = self.load_trade(trade_id)?;

        if !is_party(&current, &caller.id) {
            return Err(TradeError::forbidden("complete"));
        }

        let mut next = current.clone();
        next.complete(TimeStamp::new())?;

        let trade = self.commit(&current, next, &current.completion_transfers())?;
        self.witness(&trade, caller, WitnessKind::Complete);

        info!(trade = %trade.id(), by = %caller.id, "trade completed");
        Ok(trade)
    }

    fn load_trade(&self, trade_id: &TradeId) -> Result<Trade, TradeError> {
        self.trades
            .get_trade(trade_id)?
            .ok_or_else(TradeError::trade_not_found)
    }

    // Persist `next` conditional on the status observed in `current`, then move books.
    // Books are checked before the status write and put back, together with the status,
    // if a move fails half way.
    fn commit(
        &self,
        current: &Trade,
        next: Trade,
        transfers: &[OwnershipTransfer],
    ) -> Result<Trade, TradeError> {
        transfer::preflight(self.books.as_ref(), transfers)?;

        if !self.trades.swap_trade(&next, current.status())? {
            warn!(
                trade = %current.id(),
                expected = %current.status(),
                "lost a race on trade status"
            );
            return Err(TradeError::InvalidState(
                "Trade was modified concurrently, reload and retry.".into(),
            ));
        }

        if let Err(err) = transfer::execute(self.books.as_ref(), transfers) {
            let trade = current.id();
            match self.trades.swap_trade(current, next.status()) {
                Ok(true) => warn!(%trade, "ownership transfer failed, status restored"),
                Ok(false) => error!(%trade, "ownership transfer failed and status moved on"),
                Err(revert) => error!(%trade, "status restore after failed transfer: {revert:#}"),
            }
            return Err(err);
        }

        Ok(next)
    }

    // history is best effort, a failed write never undoes a committed transition
    fn witness(&self, trade: &Trade, actor: &Identity, kind: WitnessKind) {
        let witness = Witness::new(trade.id().clone(), actor.id.clone(), kind);
        if let Err(err) = self.trades.record_witness(&witness) {
            error!(trade = %trade.id(), "failed to record trade history: {err:#}");
        }
    }
}
