//! YouTube transcript extraction.
//!
//! Works against the public watch page rather than a data API: the page
//! embeds its caption track list as JSON, and each track's `baseUrl`
//! serves plain timed-text XML.
//!
//! Design goals:
//! - Accept the usual URL shapes and reject playlist links early with a
//!   usable message.
//! - Stay bounded: both fetches reuse the capped reader from `extract`.
//! - Tolerate page-format drift where possible and fail with a precise
//!   error where not.

use std::time::Duration;

use serde::Deserialize;

use nestchat_core::ExtractionError;

use crate::extract::{fetch_bounded, has_any_text, norm_ws};

fn is_id_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

fn leading_id_run(s: &str) -> Option<String> {
    let id: String = s.chars().take_while(|c| is_id_char(*c)).collect();
    (!id.is_empty()).then_some(id)
}

fn is_playlist_url(raw: &str) -> bool {
    if let Ok(u) = url::Url::parse(raw) {
        u.query_pairs().any(|(k, _)| k == "list")
    } else {
        raw.contains("?list=") || raw.contains("&list=")
    }
}

fn explicit_shape_id(raw: &str) -> Option<String> {
    let u = url::Url::parse(raw).ok()?;
    if u.path().starts_with("/watch") {
        if let Some((_, v)) = u.query_pairs().find(|(k, _)| k == "v") {
            if let Some(id) = leading_id_run(&v) {
                return Some(id);
            }
        }
    }
    if u.host_str().is_some_and(|h| h.eq_ignore_ascii_case("youtu.be")) {
        if let Some(seg) = u.path_segments().and_then(|mut s| s.next()) {
            if let Some(id) = leading_id_run(seg) {
                return Some(id);
            }
        }
    }
    let mut segs = u.path_segments()?;
    let first = segs.next()?;
    if first == "embed" || first == "v" {
        if let Some(id) = segs.next().and_then(leading_id_run) {
            return Some(id);
        }
    }
    None
}

/// Last resort for shapes we do not model (shorts, live, attribution
/// links): any isolated 11-character id token in the URL.
fn fallback_id_scan(raw: &str) -> Option<String> {
    let re =
        regex::Regex::new(r"(?:^|[^0-9A-Za-z_-])([0-9A-Za-z_-]{11})(?:[^0-9A-Za-z_-]|$)").ok()?;
    re.captures(raw)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Pulls the video id out of a pasted URL. Playlist links are refused
/// before any id extraction so that `watch?v=...&list=...` does not
/// silently resolve to one video out of a set.
pub(crate) fn video_id_from_url(raw: &str) -> Result<String, ExtractionError> {
    if is_playlist_url(raw) {
        return Err(ExtractionError::UnsupportedContentType(
            "This appears to be a YouTube playlist URL. Please provide a URL to a specific video instead."
                .to_string(),
        ));
    }
    explicit_shape_id(raw)
        .or_else(|| fallback_id_scan(raw))
        .ok_or_else(|| ExtractionError::ParseError("Could not extract YouTube video ID.".to_string()))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CaptionTrack {
    base_url: String,
    language_code: Option<String>,
}

/// Slices the balanced JSON array that starts at the first `[` of `s`.
/// Brackets inside string literals (and escaped quotes inside those) do
/// not count toward the balance.
fn json_array_prefix(s: &str) -> Option<&str> {
    let open = s.find('[')?;
    if !s[..open].trim().is_empty() {
        return None;
    }
    let mut depth = 0usize;
    let mut in_str = false;
    let mut escaped = false;
    for (i, b) in s.bytes().enumerate().skip(open) {
        if in_str {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_str = false;
            }
            continue;
        }
        match b {
            b'"' => in_str = true,
            b'[' => depth += 1,
            b']' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&s[open..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

fn caption_tracks(page: &str) -> Result<Vec<CaptionTrack>, ExtractionError> {
    const MARKER: &str = "\"captionTracks\":";
    let Some(at) = page.find(MARKER) else {
        return Err(ExtractionError::TranscriptUnavailable(
            "Subtitles are disabled for this video.".to_string(),
        ));
    };
    let rest = &page[at + MARKER.len()..];
    let raw = json_array_prefix(rest).ok_or_else(|| {
        ExtractionError::ParseError(
            "Error extracting YouTube transcript: malformed caption track list.".to_string(),
        )
    })?;
    serde_json::from_str::<Vec<CaptionTrack>>(raw)
        .map_err(|e| ExtractionError::ParseError(format!("Error extracting YouTube transcript: {e}")))
}

fn pick_english_track(tracks: &[CaptionTrack]) -> Option<&CaptionTrack> {
    tracks.iter().find(|t| {
        t.language_code
            .as_deref()
            .is_some_and(|l| l == "en" || l.starts_with("en-"))
    })
}

/// Caption payloads are frequently double-escaped (`&amp;#39;` and
/// friends), so one more pass runs after the XML-level unescape.
fn decode_basic_entities(s: &str) -> String {
    s.replace("&amp;", "&")
        .replace("&#39;", "'")
        .replace("&quot;", "\"")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
}

fn timedtext_to_text(xml: &str) -> Result<String, ExtractionError> {
    let mut reader = quick_xml::Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut parts: Vec<String> = Vec::new();
    let mut in_text = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Eof) => break,
            Ok(quick_xml::events::Event::Start(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                if name == "text" || name.ends_with(":text") {
                    in_text = true;
                }
            }
            Ok(quick_xml::events::Event::Text(t)) if in_text => {
                let txt = t.unescape().map(|t| t.to_string()).unwrap_or_default();
                let txt = decode_basic_entities(&txt);
                if !txt.trim().is_empty() {
                    parts.push(txt);
                }
            }
            Ok(quick_xml::events::Event::End(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                if name == "text" || name.ends_with(":text") {
                    in_text = false;
                }
            }
            Err(e) => {
                // A capped body can truncate mid-element; keep what parsed.
                if parts.is_empty() {
                    return Err(ExtractionError::ParseError(format!(
                        "Error extracting YouTube transcript: {e}"
                    )));
                }
                break;
            }
            _ => {}
        }
        buf.clear();
    }
    Ok(norm_ws(&parts.join(" ")))
}

/// Fetches the English transcript for the video behind `url` and
/// returns it as a single line prefixed with the video id.
pub(crate) async fn extract_youtube(
    client: &reqwest::Client,
    base_url: &str,
    url: &str,
    timeout: Duration,
    max_bytes: usize,
) -> Result<String, ExtractionError> {
    let id = video_id_from_url(url)?;
    let watch = format!("{}/watch?v={}", base_url.trim_end_matches('/'), id);
    let (status, _content_type, body) = fetch_bounded(client, &watch, timeout, max_bytes).await?;
    if !status.is_success() {
        return Err(ExtractionError::NetworkError(format!(
            "Error fetching YouTube page: HTTP {}",
            status.as_u16()
        )));
    }

    let page = String::from_utf8_lossy(&body);
    if page.contains(r#""status":"ERROR""#) {
        return Err(ExtractionError::NotFound(
            "The video is unavailable. It may have been removed or made private.".to_string(),
        ));
    }

    let tracks = caption_tracks(&page)?;
    tracing::debug!(video = %id, tracks = tracks.len(), "caption tracks found");
    let track = pick_english_track(&tracks).ok_or_else(|| {
        ExtractionError::TranscriptUnavailable("No transcript found for this video.".to_string())
    })?;
    let track_url = if track.base_url.starts_with('/') {
        format!("{}{}", base_url.trim_end_matches('/'), track.base_url)
    } else {
        track.base_url.clone()
    };

    let (status, _content_type, body) = fetch_bounded(client, &track_url, timeout, max_bytes).await?;
    if !status.is_success() {
        return Err(ExtractionError::NetworkError(format!(
            "Error fetching YouTube transcript: HTTP {}",
            status.as_u16()
        )));
    }
    let text = timedtext_to_text(&String::from_utf8_lossy(&body))?;
    if !has_any_text(&text) {
        return Err(ExtractionError::TranscriptUnavailable(
            "No transcript found for this video.".to_string(),
        ));
    }
    Ok(format!("[{id}] {text}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn video_id_from_common_url_shapes() {
        let cases = [
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
            "https://m.youtube.com/watch?v=dQw4w9WgXcQ&t=42s",
            "https://youtu.be/dQw4w9WgXcQ",
            "https://youtu.be/dQw4w9WgXcQ?t=43",
            "https://www.youtube.com/embed/dQw4w9WgXcQ",
            "https://www.youtube.com/v/dQw4w9WgXcQ?version=3",
            "https://www.youtube.com/shorts/dQw4w9WgXcQ",
        ];
        for url in cases {
            assert_eq!(
                video_id_from_url(url).ok().as_deref(),
                Some("dQw4w9WgXcQ"),
                "{url}"
            );
        }
    }

    #[test]
    fn playlist_urls_are_rejected_before_id_extraction() {
        let err = video_id_from_url(
            "https://www.youtube.com/playlist?list=PLx0sYbCqOb8TBPRdmBHs5Iftvv9TPboYG",
        )
        .unwrap_err();
        assert_eq!(err.kind(), "unsupported_content_type");

        // list= wins even when a video id is present.
        let err = video_id_from_url("https://www.youtube.com/watch?v=dQw4w9WgXcQ&list=PLx0sYb")
            .unwrap_err();
        assert_eq!(err.kind(), "unsupported_content_type");
        assert!(err.to_string().contains("playlist"));
    }

    #[test]
    fn unrecognizable_url_is_a_parse_error() {
        let err = video_id_from_url("https://example.com/video").unwrap_err();
        assert_eq!(err.kind(), "parse_error");
        assert_eq!(err.to_string(), "Could not extract YouTube video ID.");
    }

    #[test]
    fn embedded_id_is_found_by_the_fallback_scan() {
        assert_eq!(
            video_id_from_url("https://www.youtube.com/live/dQw4w9WgXcQ?feature=share")
                .ok()
                .as_deref(),
            Some("dQw4w9WgXcQ"),
        );
    }

    #[test]
    fn json_array_prefix_balances_nested_brackets_and_strings() {
        let s = r#"[{"a":"[not a bracket]","b":[1,2]},{"c":"x\"y]"}] ,"rest":1"#;
        let arr = json_array_prefix(s).unwrap();
        assert_eq!(arr.chars().last(), Some(']'));
        let v: serde_json::Value = serde_json::from_str(arr).unwrap();
        assert_eq!(v.as_array().map(|a| a.len()), Some(2));
    }

    #[test]
    fn caption_tracks_parses_the_embedded_player_json() {
        let page = r#"<html>"captions":{"playerCaptionsTracklistRenderer":{"captionTracks":[{"baseUrl":"https://example.com/tt?v=1&lang=en","languageCode":"en","kind":"asr"}]}}</html>"#;
        let tracks = caption_tracks(page).unwrap();
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].base_url, "https://example.com/tt?v=1&lang=en");
        assert_eq!(tracks[0].language_code.as_deref(), Some("en"));
    }

    #[test]
    fn page_without_caption_tracks_means_subtitles_disabled() {
        let err = caption_tracks("<html><body>player</body></html>").unwrap_err();
        assert_eq!(err.kind(), "transcript_unavailable");
        assert!(err.to_string().contains("disabled"));
    }

    #[test]
    fn timedtext_flattens_to_one_line_and_decodes_entities() {
        let xml = r#"<?xml version="1.0" encoding="utf-8" ?><transcript>
            <text start="0.0" dur="1.4">Hello &amp;amp; welcome</text>
            <text start="1.4" dur="2.0">to Rust&amp;#39;s world</text>
        </transcript>"#;
        assert_eq!(
            timedtext_to_text(xml).unwrap(),
            "Hello & welcome to Rust's world"
        );
    }

    proptest::proptest! {
        #[test]
        fn any_plausible_id_survives_every_url_shape(id in "[0-9A-Za-z_-]{11}") {
            let shapes = [
                format!("https://www.youtube.com/watch?v={id}"),
                format!("https://youtu.be/{id}"),
                format!("https://www.youtube.com/embed/{id}"),
                format!("https://www.youtube.com/v/{id}"),
            ];
            for url in &shapes {
                let got = video_id_from_url(url).ok();
                proptest::prop_assert_eq!(got.as_deref(), Some(id.as_str()));
            }
        }
    }

    mod transcripts {
        use super::*;
        use axum::routing::get;
        use axum::Router;
        use std::time::Duration;

        fn client() -> reqwest::Client {
            reqwest::Client::builder().build().unwrap()
        }

        const WATCH_URL: &str = "https://www.youtube.com/watch?v=dQw4w9WgXcQ";

        #[tokio::test]
        async fn transcript_is_prefixed_with_the_video_id() {
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            let page = format!(
                r#"<html>"captionTracks":[{{"baseUrl":"http://{addr}/api/timedtext","languageCode":"en"}}]</html>"#
            );
            let app = Router::new()
                .route(
                    "/watch",
                    get(move || {
                        let page = page.clone();
                        async move { axum::response::Html(page) }
                    }),
                )
                .route(
                    "/api/timedtext",
                    get(|| async {
                        r#"<transcript><text start="0.0" dur="1.0">hello</text><text start="1.0" dur="1.0">world</text></transcript>"#
                    }),
                );
            tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

            let base = format!("http://{addr}");
            let text = extract_youtube(
                &client(),
                &base,
                WATCH_URL,
                Duration::from_secs(5),
                2_000_000,
            )
            .await
            .unwrap();
            assert_eq!(text, "[dQw4w9WgXcQ] hello world");
        }

        #[tokio::test]
        async fn page_without_tracks_reports_subtitles_disabled() {
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            let app = Router::new().route(
                "/watch",
                get(|| async { axum::response::Html("<html><body>player shell</body></html>") }),
            );
            tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

            let base = format!("http://{addr}");
            let err = extract_youtube(
                &client(),
                &base,
                WATCH_URL,
                Duration::from_secs(5),
                2_000_000,
            )
            .await
            .unwrap_err();
            assert_eq!(err.kind(), "transcript_unavailable");
            assert!(err.to_string().contains("disabled"));
        }

        #[tokio::test]
        async fn no_english_track_reports_no_transcript() {
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            let page = format!(
                r#"<html>"captionTracks":[{{"baseUrl":"http://{addr}/api/timedtext","languageCode":"fr"}}]</html>"#
            );
            let app = Router::new().route(
                "/watch",
                get(move || {
                    let page = page.clone();
                    async move { axum::response::Html(page) }
                }),
            );
            tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

            let base = format!("http://{addr}");
            let err = extract_youtube(
                &client(),
                &base,
                WATCH_URL,
                Duration::from_secs(5),
                2_000_000,
            )
            .await
            .unwrap_err();
            assert_eq!(err.kind(), "transcript_unavailable");
            assert!(err.to_string().contains("No transcript"));
        }

        #[tokio::test]
        async fn unavailable_video_is_not_found() {
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            let app = Router::new().route(
                "/watch",
                get(|| async {
                    axum::response::Html(
                        r#"<html>"playabilityStatus":{"status":"ERROR","reason":"Video unavailable"}</html>"#,
                    )
                }),
            );
            tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

            let base = format!("http://{addr}");
            let err = extract_youtube(
                &client(),
                &base,
                WATCH_URL,
                Duration::from_secs(5),
                2_000_000,
            )
            .await
            .unwrap_err();
            assert_eq!(err.kind(), "not_found");
        }
    }
}
