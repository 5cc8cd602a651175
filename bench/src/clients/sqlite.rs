//! SQLite-backed CRUD client.
//!
//! Same relational schema as the PostgreSQL backend, stored in a file or in
//! memory. Useful as an offline stand-in for the relational side and as the
//! backend the integration tests drive.

use anyhow::{anyhow, Context, Result};
use crud_core::{Author, Book, Client};
use rusqlite::{params, Connection, OptionalExtension};

use super::SharedConnection;

const CREATE_TABLES: &str = "
    CREATE TABLE IF NOT EXISTS authors (
        id            INTEGER PRIMARY KEY AUTOINCREMENT,
        name          TEXT NOT NULL,
        surname       TEXT NOT NULL,
        birth_country TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS books (
        id        INTEGER PRIMARY KEY AUTOINCREMENT,
        title     TEXT NOT NULL,
        genre     TEXT NOT NULL,
        author_id INTEGER NOT NULL REFERENCES authors (id),
        year      INTEGER NOT NULL,
        pages     INTEGER NOT NULL
    );";

/// Configure a connection for low-latency benchmarking.
pub fn configure_connection(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA synchronous = OFF;
         PRAGMA temp_store = MEMORY;
         PRAGMA foreign_keys = ON;",
    )?;
    Ok(())
}

pub struct SqliteClient {
    conn: SharedConnection<Connection>,
}

impl SqliteClient {
    /// Open (or create) the database at `path`; `:memory:` opens a private
    /// in-memory database.
    pub fn open(path: &str) -> Result<Self> {
        let conn = if path == ":memory:" {
            Connection::open_in_memory()
        } else {
            Connection::open(path)
        }
        .with_context(|| format!("failed to open SQLite database {path}"))?;

        configure_connection(&conn).context("failed to configure connection")?;
        conn.execute_batch(CREATE_TABLES)
            .context("failed to create tables")?;

        log::info!("Opened SQLite database {path}");

        Ok(Self {
            conn: SharedConnection::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::open(":memory:")
    }
}

impl Client for SqliteClient {
    fn name(&self) -> &'static str {
        "SQLite"
    }

    fn create_author(&self, author: &Author) -> Result<i64> {
        self.conn.with(|conn| {
            conn.prepare_cached(
                "INSERT INTO authors (name, surname, birth_country) VALUES (?1, ?2, ?3)",
            )?
            .execute(params![author.name, author.surname, author.birth_country])
            .context("failed to create author")?;
            Ok(conn.last_insert_rowid())
        })
    }

    fn get_author(&self, id: i64) -> Result<Author> {
        self.conn.with(|conn| {
            conn.prepare_cached(
                "SELECT id, name, surname, birth_country FROM authors WHERE id = ?1",
            )?
            .query_row(params![id], |row| {
                Ok(Author {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    surname: row.get(2)?,
                    birth_country: row.get(3)?,
                })
            })
            .optional()
            .context("failed to get author")?
            .ok_or_else(|| anyhow!("author {id} not found"))
        })
    }

    fn update_author(&self, author: &Author) -> Result<()> {
        self.conn.with(|conn| {
            conn.prepare_cached(
                "UPDATE authors SET name = ?1, surname = ?2, birth_country = ?3 WHERE id = ?4",
            )?
            .execute(params![
                author.name,
                author.surname,
                author.birth_country,
                author.id
            ])
            .context("failed to update author")?;
            Ok(())
        })
    }

    fn delete_author(&self, id: i64) -> Result<()> {
        self.conn.with(|conn| {
            conn.prepare_cached("DELETE FROM authors WHERE id = ?1")?
                .execute(params![id])
                .context("failed to delete author")?;
            Ok(())
        })
    }

    fn create_book(&self, book: &Book) -> Result<i64> {
        self.conn.with(|conn| {
            conn.prepare_cached(
                "INSERT INTO books (title, genre, author_id, year, pages) VALUES (?1, ?2, ?3, ?4, ?5)",
            )?
            .execute(params![
                book.title,
                book.genre,
                book.author_id,
                book.year,
                book.pages
            ])
            .context("failed to create book")?;
            Ok(conn.last_insert_rowid())
        })
    }

    fn get_book(&self, id: i64) -> Result<Book> {
        self.conn.with(|conn| {
            conn.prepare_cached(
                "SELECT id, title, genre, author_id, year, pages FROM books WHERE id = ?1",
            )?
            .query_row(params![id], |row| {
                Ok(Book {
                    id: row.get(0)?,
                    title: row.get(1)?,
                    genre: row.get(2)?,
                    author_id: row.get(3)?,
                    year: row.get(4)?,
                    pages: row.get(5)?,
                })
            })
            .optional()
            .context("failed to get book")?
            .ok_or_else(|| anyhow!("book {id} not found"))
        })
    }

    fn update_book(&self, book: &Book) -> Result<()> {
        self.conn.with(|conn| {
            conn.prepare_cached(
                "UPDATE books SET title = ?1, genre = ?2, author_id = ?3, year = ?4, pages = ?5 WHERE id = ?6",
            )?
            .execute(params![
                book.title,
                book.genre,
                book.author_id,
                book.year,
                book.pages,
                book.id
            ])
            .context("failed to update book")?;
            Ok(())
        })
    }

    fn delete_book(&self, id: i64) -> Result<()> {
        self.conn.with(|conn| {
            conn.prepare_cached("DELETE FROM books WHERE id = ?1")?
                .execute(params![id])
                .context("failed to delete book")?;
            Ok(())
        })
    }

    fn close(&self) -> Result<()> {
        match self.conn.take() {
            Some(conn) => conn
                .close()
                .map_err(|(_, e)| e)
                .context("failed to close SQLite database"),
            None => Ok(()),
        }
    }
}
