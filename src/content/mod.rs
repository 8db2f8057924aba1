//! Content store: relational CRUD for galleries and blog posts.
//!
//! Every multi-table mutation runs inside one sqlx transaction; any failure
//! rolls the whole mutation back. Mutations that orphan media files return
//! the filenames so callers can run the upload janitor after commit.

pub mod blog;
pub mod galleries;
pub mod slug;

#[derive(Debug, thiserror::Error)]
pub enum ContentError {
    #[error("not found")]
    NotFound,
    #[error("slug already exists")]
    DuplicateSlug,
    #[error("database error: {0}")]
    Database(sqlx::Error),
}

impl From<sqlx::Error> for ContentError {
    fn from(e: sqlx::Error) -> Self {
        if let sqlx::Error::Database(ref db) = e {
            if db.message().contains("UNIQUE constraint failed: blog_posts.slug") {
                return ContentError::DuplicateSlug;
            }
        }
        ContentError::Database(e)
    }
}
