//! Moving books between owners when a trade closes
use super::error::TradeError;
use super::ledger::BookLedger;
use super::types::{BookId, UserId};
use tracing::{debug, error};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnershipTransfer {
    pub book: BookId,
    pub new_owner: UserId,
}

impl OwnershipTransfer {
    pub fn new(book: BookId, new_owner: UserId) -> Self {
        Self { book, new_owner }
    }
}

/// Check every book still exists before anything is written.
pub fn preflight<L: BookLedger + ?Sized>(
    ledger: &L,
    transfers: &[OwnershipTransfer],
) -> Result<(), TradeError> {
    for transfer in transfers {
        if !ledger.book_exists(&transfer.book)? {
            return Err(TradeError::NotFound(format!(
                "Book {} not found.",
                transfer.book
            )));
        }
    }
    Ok(())
}

/// Apply the transfers in order. On the first failure the ones already applied are put back
/// and the error is returned, so the ledger ends up either fully moved or untouched.
pub fn execute<L: BookLedger + ?Sized>(
    ledger: &L,
    transfers: &[OwnershipTransfer],
) -> Result<(), TradeError> {
    let mut applied: Vec<OwnershipTransfer> = Vec::with_capacity(transfers.len());

    for transfer in transfers {
        match apply_one(ledger, transfer) {
            Ok(previous) => {
                debug!(book = %transfer.book, to = %transfer.new_owner, "book changed hands");
                applied.push(OwnershipTransfer::new(transfer.book.clone(), previous));
            }
            Err(err) => {
                restore(ledger, &applied);
                return Err(err);
            }
        }
    }
    Ok(())
}

// returns the owner the book had before
fn apply_one<L: BookLedger + ?Sized>(
    ledger: &L,
    transfer: &OwnershipTransfer,
) -> Result<UserId, TradeError> {
    let Some(book) = ledger.fetch_book(&transfer.book)? else {
        return Err(TradeError::Unexpected(anyhow::anyhow!(
            "book {} disappeared during transfer",
            transfer.book
        )));
    };
    if !ledger.update_owner(&transfer.book, &transfer.new_owner)? {
        return Err(TradeError::Unexpected(anyhow::anyhow!(
            "book {} disappeared during transfer",
            transfer.book
        )));
    }
    Ok(book.owner)
}

fn restore<L: BookLedger + ?Sized>(ledger: &L, applied: &[OwnershipTransfer]) {
    for undo in applied.iter().rev() {
        if let Err(err) = ledger.update_owner(&undo.book, &undo.new_owner) {
            error!(book = %undo.book, owner = %undo.new_owner, "failed to restore owner: {err:#}");
        }
    }
}
