/**
 * Blog Routes
 * CRUD endpoints for blog posts and their tags
 */
use axum::extract::{Multipart, Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::content::blog::{self, POSTS_PER_PAGE};
use crate::content::slug::is_valid_slug;
use crate::db::models::BlogPostWithTags;
use crate::routes::{content_error, require_session, ErrorResponse, SuccessResponse};
use crate::AppState;

/// Query parameters for GET /api/blog (list)
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlogListQuery {
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_page_size")]
    pub page_size: i64,
}

fn default_page() -> i64 {
    1
}

fn default_page_size() -> i64 {
    POSTS_PER_PAGE
}

/// Response for GET /api/blog (list)
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlogListResponse {
    pub items: Vec<BlogPostWithTags>,
    pub page: i64,
    pub page_size: i64,
    pub total: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostCreatedResponse {
    pub id: i64,
    pub slug: String,
}

/// Form fields accepted by create/update. An uploaded cover image is
/// persisted to the media store while parsing; callers janitor it on
/// failure.
#[derive(Debug, Default)]
struct BlogForm {
    title: String,
    content: String,
    excerpt: String,
    tags: Option<String>,
    image: Option<String>,
}

async fn parse_blog_form(
    state: &AppState,
    mut multipart: Multipart,
) -> Result<BlogForm, (StatusCode, Json<ErrorResponse>)> {
    let mut form = BlogForm::default();

    let cleanup = |form: &BlogForm| {
        let image = form.image.clone();
        let media = state.media.clone();
        async move {
            if let Some(image) = image {
                media.delete_if_exists(&image).await;
            }
        }
    };

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                tracing::error!("Multipart error: {}", e);
                cleanup(&form).await;
                return Err((
                    StatusCode::BAD_REQUEST,
                    Json(ErrorResponse::new("Invalid multipart data")),
                ));
            }
        };

        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "title" => form.title = field.text().await.unwrap_or_default(),
            "content" => form.content = field.text().await.unwrap_or_default(),
            "excerpt" => form.excerpt = field.text().await.unwrap_or_default(),
            "tags" => {
                let tags = field.text().await.unwrap_or_default();
                if !tags.trim().is_empty() {
                    form.tags = Some(tags);
                }
            }
            "blogImage" => {
                let original_name = field.file_name().unwrap_or("").to_string();
                if original_name.is_empty() {
                    continue;
                }
                let bytes = match field.bytes().await {
                    Ok(b) => b,
                    Err(e) => {
                        tracing::error!("Failed to read upload bytes: {}", e);
                        cleanup(&form).await;
                        return Err((
                            StatusCode::BAD_REQUEST,
                            Json(ErrorResponse::new("Failed to read file data")),
                        ));
                    }
                };
                match state.media.store(&original_name, &bytes).await {
                    Ok(filename) => form.image = Some(filename),
                    Err(crate::media::MediaError::Io(e)) => {
                        tracing::error!("Failed to store upload: {}", e);
                        cleanup(&form).await;
                        return Err((
                            StatusCode::INTERNAL_SERVER_ERROR,
                            Json(ErrorResponse::new("Failed to save file")),
                        ));
                    }
                    Err(e) => {
                        cleanup(&form).await;
                        return Err((
                            StatusCode::BAD_REQUEST,
                            Json(ErrorResponse::new(e.to_string())),
                        ));
                    }
                }
            }
            _ => {}
        }
    }

    if form.title.trim().is_empty() {
        cleanup(&form).await;
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new("Title is required")),
        ));
    }

    Ok(form)
}

/// GET /api/blog - list posts with their tags, paginated (public)
pub async fn list_posts(
    State(state): State<AppState>,
    Query(query): Query<BlogListQuery>,
) -> impl IntoResponse {
    match blog::list_posts(&state.pool, query.page, query.page_size).await {
        Ok((items, total)) => (
            StatusCode::OK,
            Json(BlogListResponse {
                items,
                page: query.page.max(1),
                page_size: query.page_size.clamp(1, 100),
                total,
            }),
        )
            .into_response(),
        Err(e) => content_error(e).into_response(),
    }
}

/// GET /api/blog/{slug} - single post by slug (public)
pub async fn get_post(State(state): State<AppState>, Path(slug): Path<String>) -> impl IntoResponse {
    if !is_valid_slug(&slug) {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "Invalid slug".to_string(),
                message: Some(
                    "Slug must contain only lowercase letters, numbers, and hyphens".to_string(),
                ),
            }),
        )
            .into_response();
    }

    match blog::get_post_by_slug(&state.pool, &slug).await {
        Ok(post) => (StatusCode::OK, Json(post)).into_response(),
        Err(e) => content_error(e).into_response(),
    }
}

/// POST /api/blog - create a post with optional cover image (auth required)
pub async fn create_post(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: Multipart,
) -> impl IntoResponse {
    if let Err(err_response) = require_session(&state, &headers).await {
        return err_response.into_response();
    }

    let form = match parse_blog_form(&state, multipart).await {
        Ok(form) => form,
        Err(err_response) => return err_response.into_response(),
    };

    match blog::create_post(
        &state.pool,
        &form.title,
        &form.content,
        &form.excerpt,
        form.image.as_deref(),
        form.tags.as_deref(),
    )
    .await
    {
        Ok(id) => match blog::get_post(&state.pool, id).await {
            Ok(post) => (
                StatusCode::CREATED,
                Json(PostCreatedResponse { id, slug: post.slug }),
            )
                .into_response(),
            Err(e) => content_error(e).into_response(),
        },
        Err(e) => {
            if let Some(image) = form.image {
                state.media.delete_if_exists(&image).await;
            }
            content_error(e).into_response()
        }
    }
}

/// PATCH /api/blog/{id} - update a post, replacing tags wholesale (auth required)
pub async fn update_post(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    multipart: Multipart,
) -> impl IntoResponse {
    if let Err(err_response) = require_session(&state, &headers).await {
        return err_response.into_response();
    }

    let form = match parse_blog_form(&state, multipart).await {
        Ok(form) => form,
        Err(err_response) => return err_response.into_response(),
    };

    match blog::update_post(
        &state.pool,
        id,
        &form.title,
        &form.content,
        &form.excerpt,
        form.image.as_deref(),
        form.tags.as_deref(),
    )
    .await
    {
        Ok(orphan) => {
            if let Some(old_image) = orphan {
                state.media.delete_if_exists(&old_image).await;
            }
            (StatusCode::OK, Json(SuccessResponse { success: true })).into_response()
        }
        Err(e) => {
            if let Some(image) = form.image {
                state.media.delete_if_exists(&image).await;
            }
            content_error(e).into_response()
        }
    }
}

/// DELETE /api/blog/{id} - delete a post and its cover image (auth required)
pub async fn delete_post(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> impl IntoResponse {
    if let Err(err_response) = require_session(&state, &headers).await {
        return err_response.into_response();
    }

    match blog::delete_post(&state.pool, id).await {
        Ok(image) => {
            if let Some(image) = image {
                state.media.delete_if_exists(&image).await;
            }
            (StatusCode::OK, Json(SuccessResponse { success: true })).into_response()
        }
        Err(e) => content_error(e).into_response(),
    }
}
