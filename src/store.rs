//! Persistence for trades, books, users and trade history
use super::identity::{Identity, IdentityProvider, User};
use super::ledger::{Book, BookLedger};
use super::trade::{Trade, TradeStatus};
use super::types::{BookId, TradeId, UserId};
use super::witness::Witness;
use anyhow::Context;
use sled::transaction::{ConflictableTransactionError, TransactionError, abort};
use sled::{Db, Tree};
use std::path::Path;
use std::sync::Arc;

/// Storage seam for trades. The store is the only writer of trade status.
pub trait TradeStore: Send + Sync {
    fn insert_trade(&self, trade: &Trade) -> anyhow::Result<()>;

    fn get_trade(&self, id: &TradeId) -> anyhow::Result<Option<Trade>>;

    /// Trades where the user is either requester or owner, oldest first
    fn trades_for_user(&self, user: &UserId) -> anyhow::Result<Vec<Trade>>;

    /// Persist `next` only if the stored trade still has status `expected`.
    /// `Ok(false)` means another writer got there first and nothing was written.
    fn swap_trade(&self, next: &Trade, expected: TradeStatus) -> anyhow::Result<bool>;

    /// Append to the trade's history, returns the witness digest
    fn record_witness(&self, witness: &Witness) -> anyhow::Result<String>;

    /// History of a trade, oldest first
    fn witnesses(&self, trade_id: &TradeId) -> anyhow::Result<Vec<Witness>>;
}

// why a swap transaction was aborted
#[derive(Debug)]
enum SwapRejected {
    Missing,
    StatusChanged,
    Corrupt(minicbor::decode::Error),
}

/// sled backed store. One tree per collection, values are CBOR documents keyed by id.
pub struct SledStore {
    instance: Arc<Db>,
    trades: Tree,
    books: Tree,
    users: Tree,
    witnesses: Tree,
}

impl SledStore {
    pub fn new(instance: Arc<Db>) -> anyhow::Result<Self> {
        let trades = instance.open_tree("trades")?;
        let books = instance.open_tree("books")?;
        let users = instance.open_tree("users")?;
        let witnesses = instance.open_tree("witnesses")?;

        Ok(Self {
            instance,
            trades,
            books,
            users,
            witnesses,
        })
    }

    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let db = sled::open(path)
            .with_context(|| format!("failed to open sled database at {}", path.display()))?;
        Self::new(Arc::new(db))
    }

    pub fn put_book(&self, book: &Book) -> anyhow::Result<()> {
        self.books
            .insert(book.id.as_str().as_bytes(), minicbor::to_vec(book)?)?;
        Ok(())
    }

    pub fn put_user(&self, user: &User) -> anyhow::Result<()> {
        self.users
            .insert(user.id.as_str().as_bytes(), minicbor::to_vec(user)?)?;
        Ok(())
    }

    pub fn flush(&self) -> anyhow::Result<()> {
        self.instance.flush()?;
        Ok(())
    }
}

impl TradeStore for SledStore {
    fn insert_trade(&self, trade: &Trade) -> anyhow::Result<()> {
        let key = trade.id().as_str().as_bytes();
        let swapped = self
            .trades
            .compare_and_swap(key, None as Option<&[u8]>, Some(minicbor::to_vec(trade)?))?;
        if swapped.is_err() {
            anyhow::bail!("trade {} already exists", trade.id());
        }
        Ok(())
    }

    fn get_trade(&self, id: &TradeId) -> anyhow::Result<Option<Trade>> {
        let Some(bytes) = self.trades.get(id.as_str().as_bytes())? else {
            return Ok(None);
        };
        let trade = minicbor::decode(&bytes)
            .with_context(|| format!("failed to decode trade {id}"))?;
        Ok(Some(trade))
    }

    fn trades_for_user(&self, user: &UserId) -> anyhow::Result<Vec<Trade>> {
        let mut trades = Vec::new();
        for entry in self.trades.iter() {
            let (_, bytes) = entry?;
            let trade: Trade = minicbor::decode(&bytes).context("failed to decode trade")?;
            if trade.requester() == user || trade.owner() == user {
                trades.push(trade);
            }
        }
        trades.sort_by(|a, b| a.created_at().cmp(b.created_at()));
        Ok(trades)
    }

    fn swap_trade(&self, next: &Trade, expected: TradeStatus) -> anyhow::Result<bool> {
        let key = next.id().as_str().as_bytes();
        let encoded = minicbor::to_vec(next)?;

        let outcome = self.trades.transaction(|tx| {
            let Some(current) = tx.get(key)? else {
                return abort(SwapRejected::Missing);
            };
            let current: Trade = minicbor::decode(&current)
                .map_err(|err| ConflictableTransactionError::Abort(SwapRejected::Corrupt(err)))?;
            if current.status() != expected {
                return abort(SwapRejected::StatusChanged);
            }
            tx.insert(key, encoded.as_slice())?;
            Ok(())
        });

        match outcome {
            Ok(()) => Ok(true),
            Err(TransactionError::Abort(SwapRejected::StatusChanged)) => Ok(false),
            Err(TransactionError::Abort(SwapRejected::Missing)) => {
                Err(anyhow::anyhow!("trade {} vanished from the store", next.id()))
            }
            Err(TransactionError::Abort(SwapRejected::Corrupt(err))) => Err(anyhow::Error::new(err)
                .context(format!("failed to decode trade {}", next.id()))),
            Err(TransactionError::Storage(err)) => Err(err.into()),
        }
    }

    fn record_witness(&self, witness: &Witness) -> anyhow::Result<String> {
        let (hash, cbor) = witness.build()?;
        let key = format!("{}/{}", witness.trade_id, hash);
        self.witnesses.insert(key.as_bytes(), cbor)?;
        Ok(hash)
    }

    fn witnesses(&self, trade_id: &TradeId) -> anyhow::Result<Vec<Witness>> {
        let prefix = format!("{trade_id}/");
        let mut history = Vec::new();
        for entry in self.witnesses.scan_prefix(prefix.as_bytes()) {
            let (_, bytes) = entry?;
            let witness: Witness = minicbor::decode(&bytes).context("failed to decode witness")?;
            history.push(witness);
        }
        history.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        Ok(history)
    }
}

impl BookLedger for SledStore {
    fn fetch_book(&self, id: &BookId) -> anyhow::Result<Option<Book>> {
        let Some(bytes) = self.books.get(id.as_str().as_bytes())? else {
            return Ok(None);
        };
        let book = minicbor::decode(&bytes).with_context(|| format!("failed to decode book {id}"))?;
        Ok(Some(book))
    }

    fn book_exists(&self, id: &BookId) -> anyhow::Result<bool> {
        Ok(self.books.contains_key(id.as_str().as_bytes())?)
    }

    fn update_owner(&self, id: &BookId, owner: &UserId) -> anyhow::Result<bool> {
        let key = id.as_str().as_bytes();

        let outcome = self.books.transaction(|tx| {
            let Some(current) = tx.get(key)? else {
                return Ok(false);
            };
            let mut book: Book = minicbor::decode(&current)
                .map_err(|err| ConflictableTransactionError::Abort(anyhow::Error::new(err)))?;
            book.owner = owner.clone();
            let encoded = minicbor::to_vec(&book)
                .map_err(|err| ConflictableTransactionError::Abort(anyhow::Error::new(err)))?;
            tx.insert(key, encoded)?;
            Ok(true)
        });

        match outcome {
            Ok(updated) => Ok(updated),
            Err(TransactionError::Abort(err)) => {
                Err(err.context(format!("failed to rewrite book {id}")))
            }
            Err(TransactionError::Storage(err)) => Err(err.into()),
        }
    }
}

impl IdentityProvider for SledStore {
    // credentials are verified upstream and arrive here as the user id
    fn resolve(&self, credential: &str) -> anyhow::Result<Option<Identity>> {
        Ok(self
            .profile(&UserId::from(credential))?
            .map(|user| user.identity()))
    }

    fn profile(&self, id: &UserId) -> anyhow::Result<Option<User>> {
        let Some(bytes) = self.users.get(id.as_str().as_bytes())? else {
            return Ok(None);
        };
        let user = minicbor::decode(&bytes).with_context(|| format!("failed to decode user {id}"))?;
        Ok(Some(user))
    }
}
