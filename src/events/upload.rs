use std::path::{Path, PathBuf};

use axum::extract::multipart::Field;
use tokio::{fs, io::AsyncWriteExt};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::AppError;

/// A file that made it to disk. `file_name` is the generated name the public
/// URL is composed from; `path` is where it lives.
#[derive(Debug)]
pub struct SavedUpload {
    pub file_name: String,
    pub path: PathBuf,
}

/// Collision-resistant destination name: random UUID prefix plus the original
/// filename stripped of any directory components and odd characters.
pub fn generate_file_name(original: &str) -> String {
    let base = Path::new(original)
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty())
        .unwrap_or("upload");
    let base: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("{}-{}", Uuid::new_v4(), base)
}

/// Stream a multipart file part to the upload directory chunk by chunk,
/// without buffering the whole body. A failure mid-stream removes the
/// partial file, so no request leaves a corrupt upload behind.
pub async fn save_field(
    dir: &Path,
    mut field: Field<'_>,
    original_name: &str,
) -> Result<SavedUpload, AppError> {
    let file_name = generate_file_name(original_name);
    let path = dir.join(&file_name);

    let mut file = fs::File::create(&path).await?;
    if let Err(e) = write_stream(&mut field, &mut file).await {
        discard(&path).await;
        return Err(e);
    }

    debug!(file = %path.display(), "upload stored");
    Ok(SavedUpload { file_name, path })
}

async fn write_stream(field: &mut Field<'_>, file: &mut fs::File) -> Result<(), AppError> {
    loop {
        match field.chunk().await {
            Ok(Some(chunk)) => file.write_all(&chunk).await?,
            Ok(None) => break,
            Err(e) => {
                return Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, e).into());
            }
        }
    }
    file.flush().await?;
    Ok(())
}

/// Best-effort compensating delete for partial or orphaned uploads.
pub async fn discard(path: &Path) {
    if let Err(e) = fs::remove_file(path).await {
        warn!(file = %path.display(), error = %e, "failed to remove upload");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_names_are_unique() {
        let a = generate_file_name("img.png");
        let b = generate_file_name("img.png");
        assert_ne!(a, b);
        assert!(a.ends_with("-img.png"));
    }

    #[test]
    fn generated_name_strips_directories() {
        let name = generate_file_name("../../etc/passwd");
        assert!(!name.contains('/'));
        assert!(!name.contains(".."));
        assert!(name.ends_with("-passwd"));
    }

    #[test]
    fn generated_name_sanitizes_odd_characters() {
        let name = generate_file_name("my photo (1).png");
        assert!(name.ends_with("-my_photo__1_.png"));
    }

    #[test]
    fn empty_original_falls_back() {
        assert!(generate_file_name("").ends_with("-upload"));
    }

    #[tokio::test]
    async fn discard_tolerates_missing_file() {
        // Must not panic or error outward when there is nothing to remove.
        discard(Path::new("/tmp/eventhub-definitely-not-here")).await;
    }

    use axum::{
        extract::{FromRequest, Multipart},
        http::Request,
    };

    const BOUNDARY: &str = "test-boundary";

    fn multipart_request(body: Vec<u8>) -> Request<axum::body::Body> {
        Request::builder()
            .header(
                "content-type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(axum::body::Body::from(body))
            .unwrap()
    }

    fn file_part_header() -> Vec<u8> {
        format!(
            "--{BOUNDARY}\r\n\
             Content-Disposition: form-data; name=\"image\"; filename=\"img.png\"\r\n\
             Content-Type: image/png\r\n\r\n"
        )
        .into_bytes()
    }

    async fn fresh_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("eventhub-upload-{tag}-{}", Uuid::new_v4()));
        fs::create_dir_all(&dir).await.unwrap();
        dir
    }

    #[tokio::test]
    async fn save_field_streams_file_to_disk() {
        let mut body = file_part_header();
        body.extend_from_slice(b"png-bytes-here");
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

        let mut multipart = Multipart::from_request(multipart_request(body), &())
            .await
            .unwrap();
        let field = multipart.next_field().await.unwrap().unwrap();
        let dir = fresh_dir("ok").await;

        let saved = save_field(&dir, field, "img.png")
            .await
            .expect("save should succeed");
        assert!(saved.file_name.ends_with("-img.png"));
        let written = fs::read(&saved.path).await.unwrap();
        assert_eq!(written, b"png-bytes-here");

        fs::remove_dir_all(&dir).await.unwrap();
    }

    #[tokio::test]
    async fn interrupted_stream_leaves_no_partial_file() {
        // Body ends mid-file, no closing boundary: the chunk stream errors out.
        let mut body = file_part_header();
        body.extend_from_slice(b"partial-data");

        let mut multipart = Multipart::from_request(multipart_request(body), &())
            .await
            .unwrap();
        let field = multipart.next_field().await.unwrap().unwrap();
        let dir = fresh_dir("interrupted").await;

        assert!(save_field(&dir, field, "img.png").await.is_err());

        // The partial file must have been removed.
        let mut entries = fs::read_dir(&dir).await.unwrap();
        assert!(entries.next_entry().await.unwrap().is_none());

        fs::remove_dir_all(&dir).await.unwrap();
    }
}
