//! Gallery CRUD with transactional image-row maintenance.

use chrono::Utc;
use sqlx::SqlitePool;

use super::ContentError;
use crate::db::models::{Gallery, GalleryImage, GalleryWithImages};

/// Insert a gallery and one image row per uploaded filename, atomically.
pub async fn create_gallery(
    pool: &SqlitePool,
    title: &str,
    description: &str,
    image_filenames: &[String],
) -> Result<i64, ContentError> {
    let mut tx = pool.begin().await?;

    let result = sqlx::query(
        r#"
        INSERT INTO galleries (title, description, created_at)
        VALUES (?, ?, ?)
        "#,
    )
    .bind(title)
    .bind(description)
    .bind(Utc::now())
    .execute(&mut *tx)
    .await?;
    let gallery_id = result.last_insert_rowid();

    for filename in image_filenames {
        sqlx::query("INSERT INTO gallery_images (gallery_id, filename) VALUES (?, ?)")
            .bind(gallery_id)
            .bind(filename)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;
    tracing::info!(
        "Created gallery {} with {} images",
        gallery_id,
        image_filenames.len()
    );
    Ok(gallery_id)
}

/// Update a gallery's metadata and image set: image rows in the removed set
/// are deleted and one row is inserted per newly uploaded file, all in one
/// transaction. Returns the filenames that became orphans so the caller can
/// delete them from disk after commit.
pub async fn update_gallery(
    pool: &SqlitePool,
    gallery_id: i64,
    title: &str,
    description: &str,
    removed: &[String],
    added: &[String],
) -> Result<Vec<String>, ContentError> {
    let mut tx = pool.begin().await?;

    let updated = sqlx::query("UPDATE galleries SET title = ?, description = ? WHERE id = ?")
        .bind(title)
        .bind(description)
        .bind(gallery_id)
        .execute(&mut *tx)
        .await?;
    if updated.rows_affected() == 0 {
        return Err(ContentError::NotFound);
    }

    let mut orphans = Vec::new();
    for filename in removed {
        let deleted =
            sqlx::query("DELETE FROM gallery_images WHERE gallery_id = ? AND filename = ?")
                .bind(gallery_id)
                .bind(filename)
                .execute(&mut *tx)
                .await?;
        if deleted.rows_affected() > 0 {
            orphans.push(filename.clone());
        }
    }

    for filename in added {
        sqlx::query("INSERT INTO gallery_images (gallery_id, filename) VALUES (?, ?)")
            .bind(gallery_id)
            .bind(filename)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;
    Ok(orphans)
}

/// Delete a gallery and all of its image rows, atomically. Returns every
/// associated filename for post-commit cleanup.
pub async fn delete_gallery(pool: &SqlitePool, gallery_id: i64) -> Result<Vec<String>, ContentError> {
    let mut tx = pool.begin().await?;

    let filenames: Vec<(String,)> =
        sqlx::query_as("SELECT filename FROM gallery_images WHERE gallery_id = ?")
            .bind(gallery_id)
            .fetch_all(&mut *tx)
            .await?;

    sqlx::query("DELETE FROM gallery_images WHERE gallery_id = ?")
        .bind(gallery_id)
        .execute(&mut *tx)
        .await?;

    let deleted = sqlx::query("DELETE FROM galleries WHERE id = ?")
        .bind(gallery_id)
        .execute(&mut *tx)
        .await?;
    if deleted.rows_affected() == 0 {
        return Err(ContentError::NotFound);
    }

    tx.commit().await?;
    tracing::info!("Deleted gallery {} ({} images)", gallery_id, filenames.len());
    Ok(filenames.into_iter().map(|(f,)| f).collect())
}

/// All galleries, newest first, each with its image filenames.
pub async fn list_galleries(pool: &SqlitePool) -> Result<Vec<GalleryWithImages>, ContentError> {
    let galleries: Vec<Gallery> = sqlx::query_as(
        "SELECT id, title, description, created_at FROM galleries ORDER BY created_at DESC, id DESC",
    )
    .fetch_all(pool)
    .await?;

    let images: Vec<GalleryImage> =
        sqlx::query_as("SELECT id, gallery_id, filename FROM gallery_images ORDER BY id")
            .fetch_all(pool)
            .await?;

    let mut result: Vec<GalleryWithImages> = galleries
        .into_iter()
        .map(|g| GalleryWithImages {
            id: g.id,
            title: g.title,
            description: g.description,
            created_at: g.created_at,
            images: Vec::new(),
        })
        .collect();

    for image in images {
        if let Some(gallery) = result.iter_mut().find(|g| g.id == image.gallery_id) {
            gallery.images.push(image.filename);
        }
    }

    Ok(result)
}

pub async fn get_gallery(pool: &SqlitePool, gallery_id: i64) -> Result<GalleryWithImages, ContentError> {
    let gallery: Gallery = sqlx::query_as(
        "SELECT id, title, description, created_at FROM galleries WHERE id = ?",
    )
    .bind(gallery_id)
    .fetch_optional(pool)
    .await?
    .ok_or(ContentError::NotFound)?;

    let images: Vec<(String,)> =
        sqlx::query_as("SELECT filename FROM gallery_images WHERE gallery_id = ? ORDER BY id")
            .bind(gallery_id)
            .fetch_all(pool)
            .await?;

    Ok(GalleryWithImages {
        id: gallery.id,
        title: gallery.title,
        description: gallery.description,
        created_at: gallery.created_at,
        images: images.into_iter().map(|(f,)| f).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    fn names(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_create_and_get_gallery() {
        let pool = test_pool().await;

        let id = create_gallery(&pool, "Summer", "Beach photos", &names(&["a.png", "b.png"]))
            .await
            .unwrap();

        let gallery = get_gallery(&pool, id).await.unwrap();
        assert_eq!(gallery.title, "Summer");
        assert_eq!(gallery.images, names(&["a.png", "b.png"]));
    }

    #[tokio::test]
    async fn test_update_gallery_image_set() {
        let pool = test_pool().await;
        let id = create_gallery(&pool, "Trip", "desc", &names(&["a.png", "c.png"]))
            .await
            .unwrap();

        let orphans = update_gallery(
            &pool,
            id,
            "Trip 2024",
            "updated",
            &names(&["a.png"]),
            &names(&["b.png"]),
        )
        .await
        .unwrap();
        assert_eq!(orphans, names(&["a.png"]));

        let gallery = get_gallery(&pool, id).await.unwrap();
        assert_eq!(gallery.title, "Trip 2024");
        assert_eq!(gallery.description, "updated");
        // (original set - {a.png}) + {b.png}
        assert_eq!(gallery.images, names(&["c.png", "b.png"]));
    }

    #[tokio::test]
    async fn test_update_gallery_ignores_unknown_removed_filename() {
        let pool = test_pool().await;
        let id = create_gallery(&pool, "Trip", "desc", &names(&["a.png"]))
            .await
            .unwrap();

        let orphans = update_gallery(&pool, id, "Trip", "desc", &names(&["zz.png"]), &[])
            .await
            .unwrap();
        assert!(orphans.is_empty());
        assert_eq!(get_gallery(&pool, id).await.unwrap().images, names(&["a.png"]));
    }

    #[tokio::test]
    async fn test_delete_gallery_returns_all_filenames() {
        let pool = test_pool().await;
        let id = create_gallery(&pool, "Trip", "desc", &names(&["a.png", "b.png", "c.png"]))
            .await
            .unwrap();

        let orphans = delete_gallery(&pool, id).await.unwrap();
        assert_eq!(orphans.len(), 3);

        assert!(matches!(
            get_gallery(&pool, id).await,
            Err(ContentError::NotFound)
        ));
        let remaining: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM gallery_images")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(remaining.0, 0);
    }

    #[tokio::test]
    async fn test_unknown_gallery_is_not_found() {
        let pool = test_pool().await;
        assert!(matches!(
            get_gallery(&pool, 999).await,
            Err(ContentError::NotFound)
        ));
        assert!(matches!(
            delete_gallery(&pool, 999).await,
            Err(ContentError::NotFound)
        ));
        assert!(matches!(
            update_gallery(&pool, 999, "t", "d", &[], &[]).await,
            Err(ContentError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_list_galleries_groups_images() {
        let pool = test_pool().await;
        create_gallery(&pool, "One", "first", &names(&["1.png"]))
            .await
            .unwrap();
        create_gallery(&pool, "Two", "second", &names(&["2.png", "3.png"]))
            .await
            .unwrap();

        let galleries = list_galleries(&pool).await.unwrap();
        assert_eq!(galleries.len(), 2);
        let two = galleries.iter().find(|g| g.title == "Two").unwrap();
        assert_eq!(two.images.len(), 2);
    }
}
