//! PostgreSQL-backed CRUD client.
//!
//! Uses the blocking `postgres` driver over a single connection. The
//! `authors` and `books` tables are created on connect when missing:
//!
//! ```sql
//! authors (id BIGSERIAL PK, name, surname, birth_country)
//! books   (id BIGSERIAL PK, title, genre, author_id -> authors.id, year, pages)
//! ```
//!
//! Only plaintext connections are supported (`sslmode` `disable` or `prefer`).

use anyhow::{anyhow, bail, Context, Result};
use crud_core::{Author, Book, Client};
use postgres::config::SslMode;
use postgres::{NoTls, Row};

use super::SharedConnection;

const CREATE_TABLES: &str = "
    CREATE TABLE IF NOT EXISTS authors (
        id            BIGSERIAL PRIMARY KEY,
        name          TEXT NOT NULL,
        surname       TEXT NOT NULL,
        birth_country TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS books (
        id        BIGSERIAL PRIMARY KEY,
        title     TEXT NOT NULL,
        genre     TEXT NOT NULL,
        author_id BIGINT NOT NULL REFERENCES authors (id),
        year      INTEGER NOT NULL,
        pages     INTEGER NOT NULL
    );";

/// Connection parameters for the PostgreSQL backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostgresConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    pub ssl_mode: String,
}

impl PostgresConfig {
    /// Translate into a driver config, rejecting ssl modes that need TLS.
    pub fn to_driver_config(&self) -> Result<postgres::Config> {
        let ssl_mode = match self.ssl_mode.to_lowercase().as_str() {
            "disable" => SslMode::Disable,
            "prefer" => SslMode::Prefer,
            other => bail!("unsupported sslmode {other:?}: only disable and prefer are available"),
        };

        let mut config = postgres::Config::new();
        config
            .host(&self.host)
            .port(self.port)
            .user(&self.user)
            .dbname(&self.database)
            .ssl_mode(ssl_mode);
        if !self.password.is_empty() {
            config.password(&self.password);
        }
        Ok(config)
    }
}

/// Map an `id, name, surname, birth_country` row. Column type mismatches are
/// errors, not panics.
fn author_from_row(row: &Row) -> Result<Author> {
    Ok(Author {
        id: row.try_get(0)?,
        name: row.try_get(1)?,
        surname: row.try_get(2)?,
        birth_country: row.try_get(3)?,
    })
}

/// Map an `id, title, genre, author_id, year, pages` row.
fn book_from_row(row: &Row) -> Result<Book> {
    Ok(Book {
        id: row.try_get(0)?,
        title: row.try_get(1)?,
        genre: row.try_get(2)?,
        author_id: row.try_get(3)?,
        year: row.try_get(4)?,
        pages: row.try_get(5)?,
    })
}

pub struct PostgresClient {
    conn: SharedConnection<postgres::Client>,
}

impl PostgresClient {
    /// Open a connection and make sure the schema exists.
    pub fn connect(config: &PostgresConfig) -> Result<Self> {
        let mut conn = config
            .to_driver_config()?
            .connect(NoTls)
            .with_context(|| format!("failed to open connection to {}:{}", config.host, config.port))?;

        conn.batch_execute(CREATE_TABLES)
            .context("failed to create tables")?;

        log::info!(
            "Connected to PostgreSQL at {}:{}/{}",
            config.host,
            config.port,
            config.database
        );

        Ok(Self {
            conn: SharedConnection::new(conn),
        })
    }
}

impl Client for PostgresClient {
    fn name(&self) -> &'static str {
        "Postgres"
    }

    fn create_author(&self, author: &Author) -> Result<i64> {
        self.conn.with(|conn| {
            let row = conn
                .query_one(
                    "INSERT INTO authors (name, surname, birth_country) VALUES ($1, $2, $3) RETURNING id",
                    &[&author.name, &author.surname, &author.birth_country],
                )
                .context("failed to create author")?;
            Ok(row.try_get::<_, i64>(0)?)
        })
    }

    fn get_author(&self, id: i64) -> Result<Author> {
        self.conn.with(|conn| {
            let row = conn
                .query_opt(
                    "SELECT id, name, surname, birth_country FROM authors WHERE id = $1",
                    &[&id],
                )
                .context("failed to get author")?
                .ok_or_else(|| anyhow!("author {id} not found"))?;
            author_from_row(&row)
        })
    }

    fn update_author(&self, author: &Author) -> Result<()> {
        self.conn.with(|conn| {
            conn.execute(
                "UPDATE authors SET name = $1, surname = $2, birth_country = $3 WHERE id = $4",
                &[&author.name, &author.surname, &author.birth_country, &author.id],
            )
            .context("failed to update author")?;
            Ok(())
        })
    }

    fn delete_author(&self, id: i64) -> Result<()> {
        self.conn.with(|conn| {
            conn.execute("DELETE FROM authors WHERE id = $1", &[&id])
                .context("failed to delete author")?;
            Ok(())
        })
    }

    fn create_book(&self, book: &Book) -> Result<i64> {
        self.conn.with(|conn| {
            let row = conn
                .query_one(
                    "INSERT INTO books (title, genre, author_id, year, pages) VALUES ($1, $2, $3, $4, $5) RETURNING id",
                    &[&book.title, &book.genre, &book.author_id, &book.year, &book.pages],
                )
                .context("failed to create book")?;
            Ok(row.try_get::<_, i64>(0)?)
        })
    }

    fn get_book(&self, id: i64) -> Result<Book> {
        self.conn.with(|conn| {
            let row = conn
                .query_opt(
                    "SELECT id, title, genre, author_id, year, pages FROM books WHERE id = $1",
                    &[&id],
                )
                .context("failed to get book")?
                .ok_or_else(|| anyhow!("book {id} not found"))?;
            book_from_row(&row)
        })
    }

    fn update_book(&self, book: &Book) -> Result<()> {
        self.conn.with(|conn| {
            conn.execute(
                "UPDATE books SET title = $1, genre = $2, author_id = $3, year = $4, pages = $5 WHERE id = $6",
                &[&book.title, &book.genre, &book.author_id, &book.year, &book.pages, &book.id],
            )
            .context("failed to update book")?;
            Ok(())
        })
    }

    fn delete_book(&self, id: i64) -> Result<()> {
        self.conn.with(|conn| {
            conn.execute("DELETE FROM books WHERE id = $1", &[&id])
                .context("failed to delete book")?;
            Ok(())
        })
    }

    fn close(&self) -> Result<()> {
        match self.conn.take() {
            Some(conn) => conn.close().context("failed to close connection"),
            None => Ok(()),
        }
    }
}
