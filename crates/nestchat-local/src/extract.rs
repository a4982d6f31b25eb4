use futures_util::StreamExt;
use nestchat_core::ExtractionError;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Tags whose subtrees carry page chrome, not resource content.
const CHROME_TAGS: [&str; 6] = ["script", "style", "noscript", "header", "footer", "nav"];

pub(crate) fn norm_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub(crate) fn has_any_text(s: &str) -> bool {
    s.chars().any(|c| !c.is_whitespace())
}

/// Lowercased content type with any `; charset=...` suffix removed.
pub(crate) fn content_type_lc_prefix(ct: Option<&str>) -> String {
    ct.unwrap_or("")
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase()
}

/// Best-effort guess for whether bytes are HTML-ish (used when the server
/// sends no content type at all).
pub(crate) fn bytes_look_like_html(bytes: &[u8]) -> bool {
    let mut i = 0usize;
    while i < bytes.len() && bytes[i].is_ascii_whitespace() {
        i += 1;
    }
    if i >= bytes.len() {
        return false;
    }
    let rest = &bytes[i..];
    rest.starts_with(b"<!doctype")
        || rest.starts_with(b"<!DOCTYPE")
        || rest.starts_with(b"<html")
        || rest.starts_with(b"<HTML")
        || rest.starts_with(b"<head")
        || rest.starts_with(b"<body")
}

fn is_chrome_tag(name: &str) -> bool {
    CHROME_TAGS.iter().any(|t| name.eq_ignore_ascii_case(t))
}

fn push_element_text(el: html_scraper::ElementRef<'_>, out: &mut String) {
    if is_chrome_tag(el.value().name()) {
        return;
    }
    for child in el.children() {
        if let html_scraper::Node::Text(t) = child.value() {
            out.push_str(t);
            out.push(' ');
        } else if let Some(child_el) = html_scraper::ElementRef::wrap(child) {
            push_element_text(child_el, out);
        }
    }
}

/// Strip chrome subtrees, keep everything else as text, collapse whitespace.
pub(crate) fn clean_webpage_html(html: &str) -> String {
    let doc = html_scraper::Html::parse_document(html);
    let mut buf = String::new();
    push_element_text(doc.root_element(), &mut buf);
    norm_ws(&buf)
}

/// One GET with the resource-fetch bounds: per-request timeout and a hard
/// cap on bytes read from the body.
pub(crate) async fn fetch_bounded(
    client: &reqwest::Client,
    url: &str,
    timeout: Duration,
    max_bytes: usize,
) -> Result<(reqwest::StatusCode, Option<String>, Vec<u8>), ExtractionError> {
    let resp = client
        .get(url)
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| ExtractionError::NetworkError(format!("Error extracting webpage text: {e}")))?;

    let status = resp.status();
    let content_type = resp
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());

    let mut bytes: Vec<u8> = Vec::new();
    let mut stream = resp.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| {
            ExtractionError::NetworkError(format!("Error extracting webpage text: {e}"))
        })?;
        if bytes.len() + chunk.len() >= max_bytes {
            let take = max_bytes.saturating_sub(bytes.len());
            bytes.extend_from_slice(&chunk[..take]);
            break;
        }
        bytes.extend_from_slice(&chunk);
    }
    Ok((status, content_type, bytes))
}

/// Fetch a webpage and reduce it to plain text.
///
/// Non-2xx and non-HTML responses fail before any HTML parsing happens.
pub(crate) async fn extract_webpage(
    client: &reqwest::Client,
    url: &str,
    timeout: Duration,
    max_bytes: usize,
) -> Result<String, ExtractionError> {
    let (status, content_type, bytes) = fetch_bounded(client, url, timeout, max_bytes).await?;
    if !status.is_success() {
        return Err(ExtractionError::NetworkError(format!(
            "Error fetching webpage: HTTP {}",
            status.as_u16()
        )));
    }
    let ct = content_type_lc_prefix(content_type.as_deref());
    let htmlish = match ct.as_str() {
        "text/html" | "application/xhtml+xml" => true,
        // No declared type at all: sniff, conservatively.
        "" => bytes_look_like_html(&bytes),
        _ => false,
    };
    if !htmlish {
        let shown = if ct.is_empty() { "unknown" } else { ct.as_str() };
        return Err(ExtractionError::UnsupportedContentType(format!(
            "The URL does not point to an HTML page (content type: {shown})."
        )));
    }

    let html = String::from_utf8_lossy(&bytes);
    let text = clean_webpage_html(&html);
    if !has_any_text(&text) {
        return Err(ExtractionError::NoTextContent(
            "No text content could be extracted from the webpage.".to_string(),
        ));
    }
    tracing::debug!(url, chars = text.chars().count(), "webpage text extracted");
    Ok(text)
}

/// Text of every readable page, in page order. An unreadable page is logged
/// and skipped; a document where every page comes back empty is treated as
/// scanned/image-only.
pub(crate) fn pdf_document_text(doc: &lopdf::Document) -> Result<String, ExtractionError> {
    if doc.is_encrypted() {
        return Err(ExtractionError::Encrypted(
            "The PDF is encrypted and cannot be read. Please upload an unencrypted version."
                .to_string(),
        ));
    }
    let mut out = String::new();
    for (&page_no, _) in doc.get_pages().iter() {
        match doc.extract_text(&[page_no]) {
            Ok(t) => {
                if has_any_text(&t) {
                    out.push_str(t.trim_end());
                    out.push('\n');
                }
            }
            Err(e) => {
                tracing::warn!(page = page_no, error = %e, "skipping unreadable pdf page");
            }
        }
    }
    if !has_any_text(&out) {
        return Err(ExtractionError::NoTextContent(
            "No text could be extracted from the PDF. The file might be scanned images or protected."
                .to_string(),
        ));
    }
    Ok(out.trim_end().to_string())
}

fn pdf_file_text(path: &Path) -> Result<String, ExtractionError> {
    let doc = lopdf::Document::load(path)
        .map_err(|e| ExtractionError::ParseError(format!("Error extracting PDF text: {e}")))?;
    pdf_document_text(&doc)
}

/// Extract text from a PDF on disk.
///
/// Path validation happens up front so the common failure modes (stale
/// upload paths) produce precise messages without touching the parser.
pub(crate) async fn extract_pdf(path: &Path) -> Result<String, ExtractionError> {
    if !path.exists() {
        return Err(ExtractionError::NotFound(format!(
            "PDF file not found at {}. Please make sure the file exists.",
            path.display()
        )));
    }
    if !path.is_file() {
        return Err(ExtractionError::NotFound(format!(
            "Not a valid file path: {}.",
            path.display()
        )));
    }
    let is_pdf_ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false);
    if !is_pdf_ext {
        return Err(ExtractionError::ParseError(format!(
            "Not a PDF file: {}.",
            path.display()
        )));
    }

    // Parsing is CPU-bound and the parser is not panic-free on hostile
    // input; the blocking-worker join contains both.
    let owned: PathBuf = path.to_path_buf();
    match tokio::task::spawn_blocking(move || pdf_file_text(&owned)).await {
        Ok(res) => res,
        Err(e) => Err(ExtractionError::ParseError(format!(
            "Error extracting PDF text: worker failed ({e})"
        ))),
    }
}
