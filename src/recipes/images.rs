use anyhow::Context;
use bytes::Bytes;
use uuid::Uuid;

use crate::storage::StorageClient;

/// Presigned image links stay valid for a week; `urlImage` is stored on the recipe.
pub const IMAGE_URL_TTL_SECS: u64 = 7 * 24 * 60 * 60;

pub struct UploadedImage {
    pub key: String,
    pub url: String,
}

pub async fn upload_recipe_image(
    storage: &dyn StorageClient,
    body: Bytes,
    content_type: &str,
) -> anyhow::Result<UploadedImage> {
    anyhow::ensure!(!body.is_empty(), "empty image");

    let ext = ext_from_mime(content_type).unwrap_or("bin");
    let key = format!("recipes/images/{}.{}", Uuid::new_v4(), ext);
    storage
        .put_object(&key, body, content_type)
        .await
        .with_context(|| format!("upload recipe image {}", key))?;

    let url = storage.presign_get(&key, IMAGE_URL_TTL_SECS).await?;
    tracing::info!(%key, "recipe image uploaded");
    Ok(UploadedImage { key, url })
}

fn ext_from_mime(ct: &str) -> Option<&'static str> {
    match ct {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/webp" => Some("webp"),
        "image/heic" => Some("heic"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use crate::state::AppState;

    #[test]
    fn ext_from_mime_known_and_unknown() {
        assert_eq!(super::ext_from_mime("image/jpeg"), Some("jpg"));
        assert_eq!(super::ext_from_mime("image/png"), Some("png"));
        assert_eq!(super::ext_from_mime("image/heic"), Some("heic"));
        assert_eq!(super::ext_from_mime("application/octet-stream"), None);
    }

    #[tokio::test]
    async fn upload_returns_presigned_url_for_new_key() {
        let state = AppState::fake();
        let img = super::upload_recipe_image(
            state.storage.as_ref(),
            bytes::Bytes::from_static(b"\x89PNG"),
            "image/png",
        )
        .await
        .unwrap();
        assert!(img.key.starts_with("recipes/images/"));
        assert!(img.key.ends_with(".png"));
        assert!(img.url.contains(&img.key));
    }

    #[tokio::test]
    async fn upload_rejects_empty_body() {
        let state = AppState::fake();
        let res =
            super::upload_recipe_image(state.storage.as_ref(), bytes::Bytes::new(), "image/png")
                .await;
        assert!(res.is_err());
    }
}
