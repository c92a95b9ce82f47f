//! Book records and the ledger that owns them
use super::types::{BookId, UserId};

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Book {
    #[n(0)]
    pub id: BookId,
    #[n(1)]
    pub title: String,
    #[n(2)]
    pub author: String,
    #[n(3)]
    pub genre: String,
    #[n(4)]
    pub photo: String, // path or url of the cover image
    #[n(5)]
    pub owner: UserId,
}

impl Book {
    pub fn new(title: &str, author: &str, owner: UserId) -> anyhow::Result<Self> {
        Ok(Self {
            id: BookId::new()?,
            title: title.to_owned(),
            author: author.to_owned(),
            genre: String::new(),
            photo: String::new(),
            owner,
        })
    }
    pub fn set_genre(mut self, genre: &str) -> Self {
        self.genre = genre.to_owned();
        self
    }
    pub fn set_photo(mut self, photo: &str) -> Self {
        self.photo = photo.to_owned();
        self
    }
    pub fn is_owned_by(&self, user: &UserId) -> bool {
        &self.owner == user
    }
}

/// Lookup and owner mutation over the book collection.
pub trait BookLedger: Send + Sync {
    fn fetch_book(&self, id: &BookId) -> anyhow::Result<Option<Book>>;

    fn book_exists(&self, id: &BookId) -> anyhow::Result<bool> {
        Ok(self.fetch_book(id)?.is_some())
    }

    /// Point the book at a new owner. Returns `false` when the book is absent.
    fn update_owner(&self, id: &BookId, owner: &UserId) -> anyhow::Result<bool>;
}
