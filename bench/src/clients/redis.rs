//! Redis-backed CRUD client.
//!
//! Key schema:
//! - `id`: shared counter, `INCR`ed to allocate author and book ids
//! - `author{id}`: bincode `Author`
//! - `book{id}`: bincode `Book`
//!
//! Ids come from one counter, so an author and a book never share an id.

use anyhow::{anyhow, Context, Result};
use crud_core::{Author, Book, Client};
use redis::Connection;

use super::SharedConnection;

const ID_COUNTER_KEY: &str = "id";

/// Accept either `host:port` or a full `redis://` / `rediss://` URL.
pub fn redis_url(address: &str) -> String {
    if address.contains("://") {
        address.to_string()
    } else {
        format!("redis://{address}/")
    }
}

fn author_key(id: i64) -> String {
    format!("author{id}")
}

fn book_key(id: i64) -> String {
    format!("book{id}")
}

fn next_id(con: &mut Connection) -> Result<i64> {
    redis::cmd("INCR")
        .arg(ID_COUNTER_KEY)
        .query::<i64>(con)
        .context("failed to increment id")
}

fn set_blob(con: &mut Connection, key: &str, bytes: Vec<u8>) -> Result<()> {
    redis::cmd("SET")
        .arg(key)
        .arg(bytes)
        .query::<()>(con)
        .with_context(|| format!("Redis SET {key} failed"))
}

fn get_blob(con: &mut Connection, key: &str) -> Result<Option<Vec<u8>>> {
    redis::cmd("GET")
        .arg(key)
        .query::<Option<Vec<u8>>>(con)
        .with_context(|| format!("Redis GET {key} failed"))
}

fn delete_key(con: &mut Connection, key: &str) -> Result<()> {
    redis::cmd("DEL")
        .arg(key)
        .query::<()>(con)
        .with_context(|| format!("Redis DEL {key} failed"))
}

pub struct RedisClient {
    conn: SharedConnection<Connection>,
}

impl RedisClient {
    /// Open a connection to the server at `address`.
    pub fn connect(address: &str) -> Result<Self> {
        let url = redis_url(address);
        let client = redis::Client::open(url.as_str())
            .with_context(|| format!("failed to open Redis client for {url}"))?;
        let conn = client
            .get_connection()
            .with_context(|| format!("failed to connect to Redis at {url}"))?;

        log::info!("Connected to Redis at {url}");

        Ok(Self {
            conn: SharedConnection::new(conn),
        })
    }
}

impl Client for RedisClient {
    fn name(&self) -> &'static str {
        "Redis"
    }

    fn create_author(&self, author: &Author) -> Result<i64> {
        self.conn.with(|con| {
            let id = next_id(con)?;
            let stored = Author {
                id,
                ..author.clone()
            };
            set_blob(con, &author_key(id), stored.encode()?).context("failed to create author")?;
            Ok(id)
        })
    }

    fn get_author(&self, id: i64) -> Result<Author> {
        self.conn.with(|con| {
            let bytes = get_blob(con, &author_key(id))
                .context("failed to get author")?
                .ok_or_else(|| anyhow!("author {id} not found"))?;
            Author::decode(&bytes)
        })
    }

    fn update_author(&self, author: &Author) -> Result<()> {
        self.conn.with(|con| {
            set_blob(con, &author_key(author.id), author.encode()?)
                .context("failed to update author")
        })
    }

    fn delete_author(&self, id: i64) -> Result<()> {
        self.conn
            .with(|con| delete_key(con, &author_key(id)).context("failed to delete author"))
    }

    fn create_book(&self, book: &Book) -> Result<i64> {
        self.conn.with(|con| {
            let id = next_id(con)?;
            let stored = Book { id, ..book.clone() };
            set_blob(con, &book_key(id), stored.encode()?).context("failed to create book")?;
            Ok(id)
        })
    }

    fn get_book(&self, id: i64) -> Result<Book> {
        self.conn.with(|con| {
            let bytes = get_blob(con, &book_key(id))
                .context("failed to get book")?
                .ok_or_else(|| anyhow!("book {id} not found"))?;
            Book::decode(&bytes)
        })
    }

    fn update_book(&self, book: &Book) -> Result<()> {
        self.conn.with(|con| {
            set_blob(con, &book_key(book.id), book.encode()?).context("failed to update book")
        })
    }

    fn delete_book(&self, id: i64) -> Result<()> {
        self.conn
            .with(|con| delete_key(con, &book_key(id)).context("failed to delete book"))
    }

    /// Drops the connection; the server sees the socket close.
    fn close(&self) -> Result<()> {
        drop(self.conn.take());
        Ok(())
    }
}
