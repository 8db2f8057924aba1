//! Blog post CRUD with transactional tag maintenance.
//!
//! Tag rows are insert-if-absent and never deleted, even when orphaned. Tag
//! links are fully replaced on update, not diffed.

use chrono::Utc;
use sqlx::{Sqlite, SqlitePool, Transaction};

use super::slug::slugify;
use super::ContentError;
use crate::db::models::{BlogPost, BlogPostWithTags};

/// Default page size for the public blog listing.
pub const POSTS_PER_PAGE: i64 = 6;

const POST_COLUMNS: &str = "id, title, content, excerpt, image, slug, created_at, updated_at";

/// Split a comma-separated tag list: trim each entry, drop empties. Tags are
/// case-sensitive as submitted.
pub fn parse_tags(tags: &str) -> Vec<String> {
    tags.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Ordered tag linking inside the caller's transaction: upsert the tag row,
/// then the join row. `INSERT OR IGNORE` makes a verbatim duplicate in the
/// list a no-op rather than an error.
async fn link_tags(
    tx: &mut Transaction<'_, Sqlite>,
    post_id: i64,
    tags: &[String],
) -> Result<(), sqlx::Error> {
    for tag in tags {
        sqlx::query("INSERT OR IGNORE INTO blog_tags (tag_name) VALUES (?)")
            .bind(tag)
            .execute(&mut **tx)
            .await?;
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO post_tags (post_id, tag_id)
            SELECT ?, id FROM blog_tags WHERE tag_name = ?
            "#,
        )
        .bind(post_id)
        .bind(tag)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

/// Insert a post plus its tag rows and links, atomically. The slug is
/// derived from the title; a collision aborts the whole insert.
pub async fn create_post(
    pool: &SqlitePool,
    title: &str,
    content: &str,
    excerpt: &str,
    image: Option<&str>,
    tags: Option<&str>,
) -> Result<i64, ContentError> {
    let slug = slugify(title);
    let now = Utc::now();
    let mut tx = pool.begin().await?;

    let result = sqlx::query(
        r#"
        INSERT INTO blog_posts (title, content, excerpt, image, slug, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(title)
    .bind(content)
    .bind(excerpt)
    .bind(image)
    .bind(&slug)
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await?;
    let post_id = result.last_insert_rowid();

    if let Some(tags) = tags {
        link_tags(&mut tx, post_id, &parse_tags(tags)).await?;
    }

    tx.commit().await?;
    tracing::info!("Created blog post {} ({})", post_id, slug);
    Ok(post_id)
}

/// Update a post and replace its tag links wholesale, atomically: existing
/// links are cleared first, then the post row is rewritten (slug recomputed
/// from the new title), then links are re-inserted. Any failure, including
/// a slug collision, restores the cleared links via rollback.
///
/// Returns the previous image filename when a new image replaces it, so the
/// caller can clean the old file up after commit.
pub async fn update_post(
    pool: &SqlitePool,
    post_id: i64,
    title: &str,
    content: &str,
    excerpt: &str,
    new_image: Option<&str>,
    tags: Option<&str>,
) -> Result<Option<String>, ContentError> {
    let slug = slugify(title);
    let mut tx = pool.begin().await?;

    let existing: Option<(Option<String>,)> =
        sqlx::query_as("SELECT image FROM blog_posts WHERE id = ?")
            .bind(post_id)
            .fetch_optional(&mut *tx)
            .await?;
    let old_image = existing.ok_or(ContentError::NotFound)?.0;

    sqlx::query("DELETE FROM post_tags WHERE post_id = ?")
        .bind(post_id)
        .execute(&mut *tx)
        .await?;

    let image = new_image.map(str::to_string).or_else(|| old_image.clone());
    sqlx::query(
        r#"
        UPDATE blog_posts
        SET title = ?, content = ?, excerpt = ?, image = ?, slug = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(title)
    .bind(content)
    .bind(excerpt)
    .bind(&image)
    .bind(&slug)
    .bind(Utc::now())
    .bind(post_id)
    .execute(&mut *tx)
    .await?;

    if let Some(tags) = tags {
        link_tags(&mut tx, post_id, &parse_tags(tags)).await?;
    }

    tx.commit().await?;

    let orphan = match (new_image, old_image) {
        (Some(new), Some(old)) if new != old => Some(old),
        _ => None,
    };
    Ok(orphan)
}

/// Delete a post and its tag links, atomically. Returns the post's image
/// filename (if any) for post-commit cleanup. Tag rows themselves stay.
pub async fn delete_post(pool: &SqlitePool, post_id: i64) -> Result<Option<String>, ContentError> {
    let mut tx = pool.begin().await?;

    let existing: Option<(Option<String>,)> =
        sqlx::query_as("SELECT image FROM blog_posts WHERE id = ?")
            .bind(post_id)
            .fetch_optional(&mut *tx)
            .await?;
    let image = existing.ok_or(ContentError::NotFound)?.0;

    // The schema cascades, but deletion is explicit so the contract does not
    // depend on pragma state.
    sqlx::query("DELETE FROM post_tags WHERE post_id = ?")
        .bind(post_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM blog_posts WHERE id = ?")
        .bind(post_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    tracing::info!("Deleted blog post {}", post_id);
    Ok(image)
}

async fn tags_for_post(pool: &SqlitePool, post_id: i64) -> Result<Vec<String>, sqlx::Error> {
    let rows: Vec<(String,)> = sqlx::query_as(
        r#"
        SELECT bt.tag_name
        FROM blog_tags bt
        JOIN post_tags pt ON pt.tag_id = bt.id
        WHERE pt.post_id = ?
        ORDER BY bt.id
        "#,
    )
    .bind(post_id)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(|(t,)| t).collect())
}

/// One page of posts (newest first) with their tags, plus the total count.
pub async fn list_posts(
    pool: &SqlitePool,
    page: i64,
    page_size: i64,
) -> Result<(Vec<BlogPostWithTags>, i64), ContentError> {
    let page_size = page_size.clamp(1, 100);
    let page = page.max(1);
    let offset = (page - 1) * page_size;

    let posts: Vec<BlogPost> = sqlx::query_as(&format!(
        "SELECT {POST_COLUMNS} FROM blog_posts ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?"
    ))
    .bind(page_size)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    let total: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM blog_posts")
        .fetch_one(pool)
        .await?;

    let mut result = Vec::with_capacity(posts.len());
    for post in posts {
        let tags = tags_for_post(pool, post.id).await?;
        result.push(BlogPostWithTags::from_post(post, tags));
    }

    Ok((result, total.0))
}

pub async fn get_post_by_slug(pool: &SqlitePool, slug: &str) -> Result<BlogPostWithTags, ContentError> {
    let post: BlogPost = sqlx::query_as(&format!(
        "SELECT {POST_COLUMNS} FROM blog_posts WHERE slug = ?"
    ))
    .bind(slug)
    .fetch_optional(pool)
    .await?
    .ok_or(ContentError::NotFound)?;

    let tags = tags_for_post(pool, post.id).await?;
    Ok(BlogPostWithTags::from_post(post, tags))
}

pub async fn get_post(pool: &SqlitePool, post_id: i64) -> Result<BlogPostWithTags, ContentError> {
    let post: BlogPost = sqlx::query_as(&format!(
        "SELECT {POST_COLUMNS} FROM blog_posts WHERE id = ?"
    ))
    .bind(post_id)
    .fetch_optional(pool)
    .await?
    .ok_or(ContentError::NotFound)?;

    let tags = tags_for_post(pool, post.id).await?;
    Ok(BlogPostWithTags::from_post(post, tags))
}
