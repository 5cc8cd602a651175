//! The CRUD capability every storage backend must provide to be benchmarked.

use anyhow::Result;

use crate::types::{Author, Book};

/// CRUD operations over authors and books, backed by some storage engine.
///
/// One instance is shared by every pool worker, so implementations must be
/// safe for concurrent use. The benchmark never inspects error detail: any
/// `Err` counts as a failed operation.
///
/// Contract:
/// - creates return the identifier the backend assigned;
/// - a get for an unknown id is an error;
/// - after [`Client::close`] every call fails, and a second close succeeds.
pub trait Client: Send + Sync {
    /// Label used in reports (e.g. `Postgres`, `Redis`).
    fn name(&self) -> &'static str;

    fn create_author(&self, author: &Author) -> Result<i64>;
    fn get_author(&self, id: i64) -> Result<Author>;
    fn update_author(&self, author: &Author) -> Result<()>;
    fn delete_author(&self, id: i64) -> Result<()>;

    fn create_book(&self, book: &Book) -> Result<i64>;
    fn get_book(&self, id: i64) -> Result<Book>;
    fn update_book(&self, book: &Book) -> Result<()>;
    fn delete_book(&self, id: i64) -> Result<()>;

    /// Release the underlying connection.
    fn close(&self) -> Result<()>;
}
