/**
 * Gallery Routes
 * CRUD endpoints for galleries and their image sets
 */
use axum::extract::{Multipart, Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use crate::content::galleries;
use crate::media::MediaError;
use crate::routes::{content_error, require_session, ErrorResponse, SuccessResponse};
use crate::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GalleryCreatedResponse {
    pub id: i64,
}

/// Form fields accepted by create/update. Uploaded files are persisted to
/// the media store while parsing; callers must janitor them on failure.
#[derive(Debug, Default)]
struct GalleryForm {
    title: String,
    description: String,
    removed: Vec<String>,
    uploads: Vec<String>,
}

fn media_error_response(e: MediaError) -> (StatusCode, Json<ErrorResponse>) {
    match e {
        MediaError::Io(e) => {
            tracing::error!("Failed to store upload: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("Failed to save file")),
            )
        }
        e => (StatusCode::BAD_REQUEST, Json(ErrorResponse::new(e.to_string()))),
    }
}

async fn parse_gallery_form(
    state: &AppState,
    mut multipart: Multipart,
) -> Result<GalleryForm, (StatusCode, Json<ErrorResponse>)> {
    let mut form = GalleryForm::default();

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                tracing::error!("Multipart error: {}", e);
                // Drop any files already written for this request.
                state.media.delete_all(&form.uploads).await;
                return Err((
                    StatusCode::BAD_REQUEST,
                    Json(ErrorResponse::new("Invalid multipart data")),
                ));
            }
        };

        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "title" => {
                form.title = field.text().await.unwrap_or_default();
            }
            "description" => {
                form.description = field.text().await.unwrap_or_default();
            }
            "removedImages" => {
                let filename = field.text().await.unwrap_or_default();
                if !filename.is_empty() {
                    form.removed.push(filename);
                }
            }
            "galleryImages" => {
                let original_name = field.file_name().unwrap_or("").to_string();
                if original_name.is_empty() {
                    continue; // empty file input submitted with the form
                }
                let bytes = match field.bytes().await {
                    Ok(b) => b,
                    Err(e) => {
                        tracing::error!("Failed to read upload bytes: {}", e);
                        state.media.delete_all(&form.uploads).await;
                        return Err((
                            StatusCode::BAD_REQUEST,
                            Json(ErrorResponse::new("Failed to read file data")),
                        ));
                    }
                };
                match state.media.store(&original_name, &bytes).await {
                    Ok(filename) => form.uploads.push(filename),
                    Err(e) => {
                        state.media.delete_all(&form.uploads).await;
                        return Err(media_error_response(e));
                    }
                }
            }
            _ => {}
        }
    }

    if form.title.trim().is_empty() {
        state.media.delete_all(&form.uploads).await;
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new("Title is required")),
        ));
    }

    Ok(form)
}

/// GET /api/galleries - list galleries with their images (public)
pub async fn list_galleries(State(state): State<AppState>) -> impl IntoResponse {
    match galleries::list_galleries(&state.pool).await {
        Ok(items) => (StatusCode::OK, Json(items)).into_response(),
        Err(e) => content_error(e).into_response(),
    }
}

/// POST /api/galleries - create a gallery with uploaded images (auth required)
pub async fn create_gallery(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: Multipart,
) -> impl IntoResponse {
    if let Err(err_response) = require_session(&state, &headers).await {
        return err_response.into_response();
    }

    let form = match parse_gallery_form(&state, multipart).await {
        Ok(form) => form,
        Err(err_response) => return err_response.into_response(),
    };

    match galleries::create_gallery(&state.pool, &form.title, &form.description, &form.uploads)
        .await
    {
        Ok(id) => (StatusCode::CREATED, Json(GalleryCreatedResponse { id })).into_response(),
        Err(e) => {
            // The insert rolled back; the files written during parsing are
            // orphans now.
            state.media.delete_all(&form.uploads).await;
            content_error(e).into_response()
        }
    }
}

/// PATCH /api/galleries/{id} - update metadata and image set (auth required)
pub async fn update_gallery(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    multipart: Multipart,
) -> impl IntoResponse {
    if let Err(err_response) = require_session(&state, &headers).await {
        return err_response.into_response();
    }

    let form = match parse_gallery_form(&state, multipart).await {
        Ok(form) => form,
        Err(err_response) => return err_response.into_response(),
    };

    match galleries::update_gallery(
        &state.pool,
        id,
        &form.title,
        &form.description,
        &form.removed,
        &form.uploads,
    )
    .await
    {
        Ok(orphans) => {
            // Files come off disk only after the transaction committed.
            state.media.delete_all(&orphans).await;
            (StatusCode::OK, Json(SuccessResponse { success: true })).into_response()
        }
        Err(e) => {
            state.media.delete_all(&form.uploads).await;
            content_error(e).into_response()
        }
    }
}

/// DELETE /api/galleries/{id} - delete a gallery, its rows and files (auth required)
pub async fn delete_gallery(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> impl IntoResponse {
    if let Err(err_response) = require_session(&state, &headers).await {
        return err_response.into_response();
    }

    match galleries::delete_gallery(&state.pool, id).await {
        Ok(orphans) => {
            state.media.delete_all(&orphans).await;
            (StatusCode::OK, Json(SuccessResponse { success: true })).into_response()
        }
        Err(e) => content_error(e).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{login_cookie, router_for, test_state};
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_list_galleries_is_public() {
        let state = test_state().await;
        let req = Request::get("/api/galleries").body(Body::empty()).unwrap();
        let res = router_for(state).oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_mutations_require_session() {
        let state = test_state().await;
        let app = router_for(state);

        let req = Request::delete("/api/galleries/1").body(Body::empty()).unwrap();
        let res = app.clone().oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

        let req = Request::post("/api/galleries")
            .header("content-type", "multipart/form-data; boundary=x")
            .body(Body::empty())
            .unwrap();
        let res = app.oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    fn gallery_multipart_body(boundary: &str) -> Vec<u8> {
        let mut png = vec![0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
        png.extend_from_slice(&[0u8; 16]);

        let mut body = Vec::new();
        body.extend(
            format!(
                "--{boundary}\r\nContent-Disposition: form-data; name=\"title\"\r\n\r\nSummer\r\n"
            )
            .into_bytes(),
        );
        body.extend(
            format!(
                "--{boundary}\r\nContent-Disposition: form-data; name=\"description\"\r\n\r\nBeach\r\n"
            )
            .into_bytes(),
        );
        body.extend(
            format!(
                "--{boundary}\r\nContent-Disposition: form-data; name=\"galleryImages\"; \
                 filename=\"a.png\"\r\nContent-Type: image/png\r\n\r\n"
            )
            .into_bytes(),
        );
        body.extend(&png);
        body.extend(format!("\r\n--{boundary}--\r\n").into_bytes());
        body
    }

    #[tokio::test]
    async fn test_create_gallery_via_multipart() {
        let state = test_state().await;
        let cookie = login_cookie(&state).await;

        let req = Request::post("/api/galleries")
            .header("cookie", cookie)
            .header(
                "content-type",
                "multipart/form-data; boundary=XBOUNDARY",
            )
            .body(Body::from(gallery_multipart_body("XBOUNDARY")))
            .unwrap();
        let res = router_for(state.clone()).oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::CREATED);

        let items = crate::content::galleries::list_galleries(&state.pool)
            .await
            .unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "Summer");
        assert_eq!(items[0].images.len(), 1);
        assert!(state.media.dir().join(&items[0].images[0]).exists());
    }

    #[tokio::test]
    async fn test_delete_unknown_gallery_is_not_found() {
        let state = test_state().await;
        let cookie = login_cookie(&state).await;

        let req = Request::delete("/api/galleries/999")
            .header("cookie", cookie)
            .body(Body::empty())
            .unwrap();
        let res = router_for(state).oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }
}
