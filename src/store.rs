//! Defines the [`Store`], [`Batch`], and [`Error`] types. The store owns the
//! SQLite `posts` table and the logic that keeps it consistent with the
//! visible-posts directory: discovering new files, re-ingesting modified
//! files, and the read-only queries the presentation layer is built on.
//!
//! Writes are staged through a [`Batch`], which wraps one SQLite
//! transaction. A sweep over the whole directory stages every mutation and
//! commits once, so there is a single durability barrier per sweep rather
//! than one per row. Dropping a batch without committing rolls back
//! everything it staged.

use std::collections::HashSet;
use std::fs::{read_dir, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use chrono::DateTime;
use rusqlite::types::Type;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row, Transaction};

use crate::markdown;
use crate::post::{Post, PostListing, PostSummary};
use crate::titles::TitleIndex;
use crate::util;

const POST_COLUMNS: &str = "id, file, title, slug, body, originalTime, modifiedTime, formattedDate";

/// Timestamp of the seed row inserted into a freshly created store.
const SEED_TIME: i64 = 1347260529;

/// Owns the connection to the `posts` database and the title index used
/// during ingestion. One instance per process; access is not synchronized.
pub struct Store {
    conn: Connection,
    titles: TitleIndex,
    posts_dir: PathBuf,
}

impl Store {
    /// Opens the database at `db_path`, creating the schema and inserting
    /// the seed row if no database file exists yet. `posts_dir` is the
    /// visible-posts directory that [`Store::check_new_posts`] scans, and
    /// `titles` is the index consulted for every ingestion.
    pub fn open(db_path: &Path, posts_dir: &Path, titles: TitleIndex) -> Result<Store> {
        let create = !db_path.is_file();
        let store = Store {
            conn: Connection::open(db_path)?,
            titles,
            posts_dir: posts_dir.to_owned(),
        };
        if create {
            store.create()?;
        }
        Ok(store)
    }

    /// Creates the `posts` table and its seed row. The seed keeps queries
    /// from ever seeing an empty table on a fresh store.
    fn create(&self) -> Result<()> {
        self.conn.execute_batch(
            "CREATE TABLE posts (
                id    INTEGER NOT NULL,
                file  TEXT    NOT NULL,
                title TEXT,
                slug  TEXT    NOT NULL UNIQUE,
                body  TEXT    NOT NULL,
                originalTime  TEXT NOT NULL,
                modifiedTime  TEXT NOT NULL,
                formattedDate TEXT NOT NULL,
                PRIMARY KEY (id)
            );",
        )?;
        self.conn.execute(
            "INSERT INTO posts VALUES (0, ?1, ?2, ?3, ?4, ?5, ?5, ?6)",
            params![
                self.posts_dir.join("1.markdown").to_string_lossy().into_owned(),
                "Test post #1",
                "test-post-1",
                "<h1>Testing</h1>\n<p>This is the test post.</p>\n",
                SEED_TIME.to_string(),
                format_date(SEED_TIME).ok_or(Error::Timestamp(SEED_TIME))?,
            ],
        )?;
        Ok(())
    }

    /// Begins a write batch. Stage any number of mutations through the
    /// returned [`Batch`], then call [`Batch::commit`]; a batch dropped
    /// without committing rolls back every staged write.
    pub fn batch(&mut self) -> Result<Batch> {
        Ok(Batch {
            tx: self.conn.transaction()?,
            titles: &mut self.titles,
        })
    }

    /// Ingests a single file as a new post and commits immediately. Returns
    /// the new post's id.
    pub fn add_post(&mut self, file: &Path) -> Result<i64> {
        let mut batch = self.batch()?;
        let id = batch.add_post(file)?;
        batch.commit()?;
        Ok(id)
    }

    /// Re-ingests a single tracked post from its file and commits
    /// immediately.
    pub fn update_post(&mut self, id: i64, file: &Path) -> Result<()> {
        let mut batch = self.batch()?;
        batch.update_post(id, file)?;
        batch.commit()
    }

    /// Deletes a single post by id and commits immediately. Deleting an id
    /// that isn't tracked is not an error.
    pub fn delete_post(&mut self, id: i64) -> Result<()> {
        let mut batch = self.batch()?;
        batch.delete_post(id)?;
        batch.commit()
    }

    /// Deletes every id in `ids`, staged in one batch with a single commit.
    pub fn delete_posts(&mut self, ids: &[i64]) -> Result<()> {
        let mut batch = self.batch()?;
        for &id in ids {
            batch.delete_post(id)?;
        }
        batch.commit()
    }

    /// The change-detection sweep. Re-ingests every tracked post whose
    /// file's on-disk modification time is strictly newer than the recorded
    /// one, in one batch, and returns the re-ingested files. Detection is
    /// by modification time only; a file rewritten without a timestamp bump
    /// is not picked up. Tracked files that no longer exist on disk are
    /// left alone, since deletion is an explicit operation.
    pub fn refresh(&mut self) -> Result<Vec<String>> {
        let mut stale = Vec::new();
        for (id, file, recorded) in self.tracked()? {
            match util::mtime(Path::new(&file)) {
                Ok(mtime) if mtime > recorded => stale.push((id, file)),
                Ok(_) => {}
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => return Err(err.into()),
            }
        }
        if stale.is_empty() {
            return Ok(Vec::new());
        }

        let mut batch = self.batch()?;
        for (id, file) in &stale {
            batch.update_post(*id, Path::new(file))?;
        }
        batch.commit()?;
        Ok(stale.into_iter().map(|(_, file)| file).collect())
    }

    /// The discovery sweep. Ingests every file present in the visible-posts
    /// directory but absent from the table, in one batch, and returns the
    /// ingested files. Files that have disappeared from the directory are
    /// not reconciled here. Re-running with no filesystem changes performs
    /// no writes.
    pub fn check_new_posts(&mut self) -> Result<Vec<String>> {
        let tracked: HashSet<String> = self
            .tracked()?
            .into_iter()
            .map(|(_, file, _)| file)
            .collect();

        let mut fresh = Vec::new();
        for entry in read_dir(&self.posts_dir)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                let path = entry.path().to_string_lossy().into_owned();
                if !tracked.contains(&path) {
                    fresh.push(path);
                }
            }
        }
        if fresh.is_empty() {
            return Ok(Vec::new());
        }
        // Directory order is arbitrary; sort so ingestion order (and with
        // it, id assignment) is stable across runs.
        fresh.sort();

        let mut batch = self.batch()?;
        for file in &fresh {
            batch.add_post(Path::new(file))?;
        }
        batch.commit()?;
        Ok(fresh)
    }

    /// Returns up to `limit` posts, newest first by first-observed time.
    pub fn newest_posts(&self, limit: u32) -> Result<Vec<Post>> {
        // Timestamps are text-encoded; compare them numerically.
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM posts ORDER BY CAST(originalTime AS INTEGER) DESC LIMIT ?1",
            POST_COLUMNS
        ))?;
        let rows = stmt.query_map(params![limit], decode_post)?;
        collect_rows(rows)
    }

    /// Returns up to `limit` title-only summaries, newest first by
    /// first-observed time.
    pub fn newest_titles(&self, limit: u32) -> Result<Vec<PostSummary>> {
        let mut stmt = self.conn.prepare(
            "SELECT title, formattedDate, slug FROM posts
             ORDER BY CAST(originalTime AS INTEGER) DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit], |row| {
            Ok(PostSummary {
                title: row.get(0)?,
                formatted_date: row.get(1)?,
                slug: row.get(2)?,
            })
        })?;
        collect_rows(rows)
    }

    /// Returns the posts whose ids appear in `ids`, ordered by
    /// first-observed time ascending. Result order always comes from the
    /// ORDER BY clause, never from the order of `ids`. Unknown ids are
    /// skipped, not errors.
    pub fn posts_by_ids(&self, ids: &[i64]) -> Result<Vec<Post>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; ids.len()].join(", ");
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM posts WHERE id IN ({}) ORDER BY CAST(originalTime AS INTEGER) ASC",
            POST_COLUMNS, placeholders
        ))?;
        let rows = stmt.query_map(params_from_iter(ids.iter()), decode_post)?;
        collect_rows(rows)
    }

    /// Looks a post up by its slug. `None` is the explicit not-found result
    /// for an unknown slug.
    pub fn post_by_slug(&self, slug: &str) -> Result<Option<Post>> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM posts WHERE slug = ?1 LIMIT 1", POST_COLUMNS),
                params![slug],
                decode_post,
            )
            .optional()
            .map_err(Into::into)
    }

    /// Lists every tracked post, most-recently-assigned id first.
    pub fn list_posts(&self) -> Result<Vec<PostListing>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, title, file FROM posts ORDER BY id DESC")?;
        let rows = stmt.query_map([], |row| {
            Ok(PostListing {
                id: row.get(0)?,
                title: row.get(1)?,
                file: row.get(2)?,
            })
        })?;
        collect_rows(rows)
    }

    /// Every tracked `(id, file, modifiedTime)` triple, the working set for
    /// both synchronization sweeps.
    fn tracked(&self) -> Result<Vec<(i64, String, i64)>> {
        let mut stmt = self.conn.prepare("SELECT id, file, modifiedTime FROM posts")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get(0)?, row.get(1)?, text_time(row, 2)?))
        })?;
        collect_rows(rows)
    }
}

/// A write batch over the `posts` table, wrapping one SQLite transaction.
/// [`Batch::commit`] is the single durability barrier for everything staged
/// through it; a batch that goes out of scope uncommitted rolls back, so a
/// failure partway through a sweep leaves the store unchanged.
pub struct Batch<'s> {
    tx: Transaction<'s>,
    titles: &'s mut TitleIndex,
}

impl Batch<'_> {
    /// Stages the ingestion of a new post from `file`: stats its
    /// modification time, resolves its title, derives the slug, renders the
    /// body, and inserts the row with `originalTime`, `modifiedTime`, and
    /// `formattedDate` all derived from the current mtime. Returns the new
    /// row's id. A slug collision with an existing post is an error, not
    /// something that gets auto-suffixed away.
    pub fn add_post(&mut self, file: &Path) -> Result<i64> {
        let t = util::mtime(file)?;
        let mut raw = String::new();
        File::open(file)?.read_to_string(&mut raw)?;
        let title = self.titles.resolve(file)?;
        let slug = slug::slugify(&title);
        let formatted = format_date(t).ok_or(Error::Timestamp(t))?;

        let result = self.tx.execute(
            "INSERT INTO posts (file, title, slug, body, originalTime, modifiedTime, formattedDate)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5, ?6)",
            params![
                file.to_string_lossy().into_owned(),
                title,
                slug,
                markdown::to_html(&raw),
                t.to_string(),
                formatted,
            ],
        );
        match result {
            Ok(_) => Ok(self.tx.last_insert_rowid()),
            Err(err) if is_slug_conflict(&err) => Err(Error::SlugTaken { slug }),
            Err(err) => Err(err.into()),
        }
    }

    /// Stages the re-ingestion of the tracked post `id` from `file`:
    /// re-resolves the title, re-renders the body, and records the file's
    /// current modification time. `slug`, `originalTime`, and
    /// `formattedDate` are immutable after creation and deliberately left
    /// untouched.
    pub fn update_post(&mut self, id: i64, file: &Path) -> Result<()> {
        let t = util::mtime(file)?;
        let mut raw = String::new();
        File::open(file)?.read_to_string(&mut raw)?;
        let title = self.titles.resolve(file)?;

        let changed = self.tx.execute(
            "UPDATE posts SET file = ?1, title = ?2, body = ?3, modifiedTime = ?4 WHERE id = ?5",
            params![
                file.to_string_lossy().into_owned(),
                title,
                markdown::to_html(&raw),
                t.to_string(),
                id,
            ],
        )?;
        if changed == 0 {
            return Err(Error::UnknownId(id));
        }
        Ok(())
    }

    /// Stages the deletion of the post `id`. An untracked id is a no-op.
    pub fn delete_post(&mut self, id: i64) -> Result<()> {
        self.tx.execute("DELETE FROM posts WHERE id = ?1", params![id])?;
        Ok(())
    }

    /// Commits every staged write as one transaction.
    pub fn commit(self) -> Result<()> {
        self.tx.commit().map_err(Into::into)
    }
}

/// Renders an epoch-seconds timestamp as the stored human-readable date,
/// e.g. `Monday, Sep 10 at 07:02`. Day and month names are English
/// regardless of locale. Returns `None` only for timestamps chrono can't
/// represent.
fn format_date(secs: i64) -> Option<String> {
    DateTime::from_timestamp(secs, 0).map(|t| t.format("%A, %b %d at %H:%M").to_string())
}

/// Decodes one full row of the `posts` table into a [`Post`]. This is the
/// only place rows are read by position; past here everything is typed.
fn decode_post(row: &Row) -> rusqlite::Result<Post> {
    Ok(Post {
        id: row.get(0)?,
        file: row.get(1)?,
        title: row.get(2)?,
        slug: row.get(3)?,
        body: row.get(4)?,
        original_time: text_time(row, 5)?,
        modified_time: text_time(row, 6)?,
        formatted_date: row.get(7)?,
    })
}

// The timestamp columns are text-encoded integers.
fn text_time(row: &Row, index: usize) -> rusqlite::Result<i64> {
    let raw: String = row.get(index)?;
    raw.parse().map_err(|err| {
        rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(err))
    })
}

fn is_slug_conflict(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(e, Some(message)) => {
            e.code == rusqlite::ErrorCode::ConstraintViolation && message.contains("posts.slug")
        }
        _ => false,
    }
}

fn collect_rows<T>(rows: impl Iterator<Item = rusqlite::Result<T>>) -> Result<Vec<T>> {
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

type Result<T> = std::result::Result<T, Error>;

/// The error type for store operations. Covers title resolution, source
/// file I/O, the database itself, and the slug uniqueness constraint.
#[derive(Debug)]
pub enum Error {
    /// Returned when a post's title can't be resolved.
    Title(crate::titles::Error),

    /// Returned for I/O problems reading or statting a source file.
    Io(io::Error),

    /// Returned for underlying database errors.
    Sql(rusqlite::Error),

    /// Returned when an inserted post's slug collides with an existing
    /// post's slug.
    SlugTaken { slug: String },

    /// Returned when an update names an id with no row.
    UnknownId(i64),

    /// Returned for a file modification time outside the representable
    /// date range.
    Timestamp(i64),
}

impl std::fmt::Display for Error {
    /// Implements [`std::fmt::Display`] for [`Error`].
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::Title(err) => err.fmt(f),
            Error::Io(err) => err.fmt(f),
            Error::Sql(err) => err.fmt(f),
            Error::SlugTaken { slug } => {
                write!(f, "Slug `{}` already belongs to another post", slug)
            }
            Error::UnknownId(id) => write!(f, "No post with id {}", id),
            Error::Timestamp(t) => write!(f, "Timestamp {} is out of range", t),
        }
    }
}

impl std::error::Error for Error {
    /// Implements [`std::error::Error`] for [`Error`].
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Title(err) => Some(err),
            Error::Io(err) => Some(err),
            Error::Sql(err) => Some(err),
            Error::SlugTaken { .. } => None,
            Error::UnknownId(_) => None,
            Error::Timestamp(_) => None,
        }
    }
}

impl From<crate::titles::Error> for Error {
    /// Converts title-resolution errors into [`Error`]. This allows us to
    /// use the `?` operator during ingestion.
    fn from(err: crate::titles::Error) -> Error {
        Error::Title(err)
    }
}

impl From<io::Error> for Error {
    /// Converts [`io::Error`]s into [`Error`]. This allows us to use the
    /// `?` operator for source file I/O.
    fn from(err: io::Error) -> Error {
        Error::Io(err)
    }
}

impl From<rusqlite::Error> for Error {
    /// Converts [`rusqlite::Error`]s into [`Error`]. This allows us to use
    /// the `?` operator for database operations.
    fn from(err: rusqlite::Error) -> Error {
        Error::Sql(err)
    }
}
