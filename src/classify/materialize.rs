//! Attachment materializer — turns one email attachment into an ordered
//! sequence of content fragments.
//!
//! Media-type routing:
//! - `text/*` → decoded UTF-8 as one text fragment
//! - `application/pdf` → one PNG image fragment per page, in page order
//! - `image/*` → one inline image fragment
//! - anything else → one document fragment
//!
//! PDF pages are rasterized with poppler's `pdftoppm` inside a scoped temp
//! directory. The directory is removed when it drops, on every exit path.

use std::process::Stdio;

use tokio::process::Command;

use crate::classify::fragment::ContentFragment;
use crate::error::MaterializeError;
use crate::mailbox::EmailAttachment;

/// Rasterization resolution in DPI.
const RASTER_DPI: &str = "150";

/// Materialize one attachment into fragments.
///
/// The result preserves within-attachment order (PDF page order). A zero-page
/// document yields an empty sequence; callers must tolerate that.
pub async fn materialize(
    attachment: &EmailAttachment,
) -> Result<Vec<ContentFragment>, MaterializeError> {
    if attachment.primary_type() == "text" {
        let text = String::from_utf8(attachment.data.clone()).map_err(|e| {
            MaterializeError::Decode {
                filename: attachment.filename.clone(),
                source: e,
            }
        })?;
        return Ok(vec![ContentFragment::text(text)]);
    }

    if attachment.media_type == "application/pdf" {
        let pages = rasterize_pdf_pages(&attachment.data, &attachment.filename).await?;
        return Ok(pages
            .iter()
            .map(|png| ContentFragment::image("image/png", png))
            .collect());
    }

    if attachment.primary_type() == "image" {
        return Ok(vec![ContentFragment::image(
            attachment.media_type.clone(),
            &attachment.data,
        )]);
    }

    Ok(vec![ContentFragment::document(
        attachment.media_type.clone(),
        &attachment.data,
    )])
}

/// Rasterize each page of a PDF into PNG bytes, in page order.
async fn rasterize_pdf_pages(
    data: &[u8],
    filename: &str,
) -> Result<Vec<Vec<u8>>, MaterializeError> {
    // Dropped on every return path, taking the written PDF and any partial
    // page output with it.
    let dir = tempfile::tempdir()?;
    let pdf_path = dir.path().join("input.pdf");
    tokio::fs::write(&pdf_path, data).await?;

    let output = Command::new("pdftoppm")
        .arg("-png")
        .arg("-r")
        .arg(RASTER_DPI)
        .arg(&pdf_path)
        .arg(dir.path().join("page"))
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|e| MaterializeError::Rasterization {
            filename: filename.to_string(),
            reason: if e.kind() == std::io::ErrorKind::NotFound {
                "pdftoppm not found on PATH (install poppler-utils)".to_string()
            } else {
                e.to_string()
            },
        })?;

    if !output.status.success() {
        return Err(MaterializeError::Rasterization {
            filename: filename.to_string(),
            reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    // pdftoppm writes page-1.png, page-2.png, ... (zero-padded for larger
    // documents); sort numerically to recover page order.
    let mut pages: Vec<(u32, std::path::PathBuf)> = Vec::new();
    let mut entries = tokio::fs::read_dir(dir.path()).await?;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().to_string();
        if let Some(number) = name
            .strip_prefix("page-")
            .and_then(|rest| rest.strip_suffix(".png"))
            .and_then(|n| n.parse::<u32>().ok())
        {
            pages.push((number, entry.path()));
        }
    }
    pages.sort_by_key(|(number, _)| *number);

    let mut images = Vec::with_capacity(pages.len());
    for (_, path) in pages {
        images.push(tokio::fs::read(&path).await?);
    }
    Ok(images)
}

/// Whether the rasterization tool is installed. Used to gate integration
/// tests on environments without poppler.
#[cfg(test)]
async fn pdftoppm_available() -> bool {
    Command::new("pdftoppm")
        .arg("-v")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn text_attachment_yields_one_text_fragment() {
        let att = EmailAttachment::new("text/plain", "notes.txt", b"claim details".to_vec());
        let fragments = materialize(&att).await.unwrap();
        assert_eq!(fragments, vec![ContentFragment::text("claim details")]);
    }

    #[tokio::test]
    async fn text_subtype_is_still_text() {
        let att = EmailAttachment::new("text/csv", "data.csv", b"a,b\n1,2".to_vec());
        let fragments = materialize(&att).await.unwrap();
        assert_eq!(fragments, vec![ContentFragment::text("a,b\n1,2")]);
    }

    #[tokio::test]
    async fn invalid_utf8_text_is_a_decode_error() {
        let att = EmailAttachment::new("text/plain", "bad.txt", vec![0xff, 0xfe, 0x00]);
        let err = materialize(&att).await.unwrap_err();
        match err {
            MaterializeError::Decode { filename, .. } => assert_eq!(filename, "bad.txt"),
            other => panic!("Expected Decode, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn image_attachment_yields_one_inline_fragment() {
        let att = EmailAttachment::new("image/jpeg", "photo.jpg", vec![0xff, 0xd8, 0xff]);
        let fragments = materialize(&att).await.unwrap();
        assert_eq!(fragments.len(), 1);
        assert!(matches!(fragments[0], ContentFragment::Image { .. }));
        assert_eq!(fragments[0].media_type(), Some("image/jpeg"));
    }

    #[tokio::test]
    async fn unknown_type_yields_one_document_fragment() {
        let att = EmailAttachment::new("application/zip", "bundle.zip", b"PK".to_vec());
        let fragments = materialize(&att).await.unwrap();
        assert_eq!(
            fragments,
            vec![ContentFragment::document("application/zip", b"PK")]
        );
    }

    /// Minimal valid PDF with the given page count, assembled with a correct
    /// xref table so poppler accepts it without recovery.
    fn tiny_pdf(page_count: usize) -> Vec<u8> {
        let kids: Vec<String> = (0..page_count).map(|i| format!("{} 0 R", i + 3)).collect();
        let mut objects = vec![
            "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
            format!(
                "<< /Type /Pages /Kids [{}] /Count {} >>",
                kids.join(" "),
                page_count
            ),
        ];
        for _ in 0..page_count {
            objects.push("<< /Type /Page /Parent 2 0 R /MediaBox [0 0 200 200] >>".to_string());
        }

        let mut body = String::from("%PDF-1.4\n");
        let mut offsets = Vec::new();
        for (i, obj) in objects.iter().enumerate() {
            offsets.push(body.len());
            body.push_str(&format!("{} 0 obj\n{}\nendobj\n", i + 1, obj));
        }
        let xref_start = body.len();
        body.push_str(&format!("xref\n0 {}\n", objects.len() + 1));
        body.push_str("0000000000 65535 f \n");
        for off in &offsets {
            body.push_str(&format!("{off:010} 00000 n \n"));
        }
        body.push_str(&format!(
            "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
            objects.len() + 1,
            xref_start
        ));
        body.into_bytes()
    }

    #[tokio::test]
    async fn two_page_pdf_yields_two_png_fragments_in_order() {
        if !pdftoppm_available().await {
            eprintln!("pdftoppm not installed; skipping");
            return;
        }
        let att = EmailAttachment::new("application/pdf", "claim.pdf", tiny_pdf(2));
        let fragments = materialize(&att).await.unwrap();
        assert_eq!(fragments.len(), 2);
        for frag in &fragments {
            assert!(matches!(frag, ContentFragment::Image { .. }));
            assert_eq!(frag.media_type(), Some("image/png"));
        }
    }

    #[tokio::test]
    async fn corrupt_pdf_is_a_rasterization_error() {
        if !pdftoppm_available().await {
            eprintln!("pdftoppm not installed; skipping");
            return;
        }
        let att = EmailAttachment::new("application/pdf", "broken.pdf", b"not a pdf".to_vec());
        let err = materialize(&att).await.unwrap_err();
        match err {
            MaterializeError::Rasterization { filename, .. } => {
                assert_eq!(filename, "broken.pdf");
            }
            other => panic!("Expected Rasterization, got {other:?}"),
        }
    }
}
