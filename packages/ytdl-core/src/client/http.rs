//! `reqwest`-backed production implementations of [`MetadataClient`],
//! [`StreamClient`], and [`PlaylistClient`].
//!
//! The real YouTube-facing client is treated as an external collaborator;
//! this adapter exists so the CLI is a runnable binary, but its scraping
//! logic is intentionally thin (regex extraction of the watch/playlist
//! page's embedded JSON) rather than a full reimplementation of YouTube's
//! player-response format. A format's byte stream is a chunked GET against
//! its resolved direct URL, consumed through one shared [`Client`].

use std::time::Duration;

use async_trait::async_trait;
use futures::{stream, StreamExt};
use regex::Regex;
use reqwest::Client;

use crate::domain::{Author, DownloadOptions, PlaylistItem, VideoDetails, VideoFormat, VideoInfo};
use crate::error::{YtdlError, YtdlResult};

use super::{ByteEventStream, MetadataClient, PlaylistClient, ResponseInfo, StreamClient, StreamEvent};

const USER_AGENT: &str = "Mozilla/5.0 (compatible; ytdl-core/0.1)";
const WATCH_URL: &str = "https://www.youtube.com/watch";
const PLAYLIST_URL: &str = "https://www.youtube.com/playlist";
const SEARCH_URL: &str = "https://www.youtube.com/results";

/// A `reqwest`-backed client implementing all three external-collaborator
/// traits the core consumes (metadata, byte stream, playlist resolution).
///
/// One [`Client`] is shared across every call rather than building a fresh
/// one per request.
pub struct YoutubeHttpClient {
    http: Client,
}

impl YoutubeHttpClient {
    /// Builds a client with a connect/read timeout generous enough for
    /// metadata pages; the byte-stream path has its own inactivity
    /// watchdog and does not rely on this timeout.
    pub fn new() -> YtdlResult<Self> {
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| YtdlError::Config(format!("failed to build http client: {e}")))?;
        Ok(Self { http })
    }
}

impl Default for YoutubeHttpClient {
    fn default() -> Self {
        Self::new().expect("default reqwest client configuration is always valid")
    }
}

fn video_id_from_url(url: &str) -> YtdlResult<String> {
    let re = Regex::new(r"(?:v=|youtu\.be/|shorts/)([A-Za-z0-9_-]{6,})").expect("static pattern is valid");
    re.captures(url)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| YtdlError::Metadata(format!("could not extract a video id from {url}")))
}

/// Extracts the `ytInitialPlayerResponse` JSON blob embedded in a watch
/// page's HTML.
fn extract_player_response(html: &str) -> YtdlResult<serde_json::Value> {
    let marker = "ytInitialPlayerResponse = ";
    let start = html
        .find(marker)
        .ok_or_else(|| YtdlError::Metadata("ytInitialPlayerResponse not found on watch page".to_string()))?
        + marker.len();
    let tail = &html[start..];
    let end = tail
        .find(";</script>")
        .or_else(|| tail.find(";\n"))
        .unwrap_or(tail.len());
    serde_json::from_str(&tail[..end]).map_err(|e| YtdlError::Metadata(format!("failed to parse player response: {e}")))
}

fn parse_video_info(video_id: &str, json: &serde_json::Value) -> YtdlResult<VideoInfo> {
    let details = &json["videoDetails"];
    let title = details["title"].as_str().unwrap_or("").to_string();
    let author_name = details["author"].as_str().unwrap_or("").to_string();
    let channel_id = details["channelId"].as_str().unwrap_or("").to_string();
    let length_seconds = details["lengthSeconds"]
        .as_str()
        .and_then(|s| s.parse().ok())
        .unwrap_or(0);
    let description = details["shortDescription"].as_str().map(str::to_string);

    let mut formats = Vec::new();
    let streaming = &json["streamingData"];
    for bucket in ["formats", "adaptiveFormats"] {
        if let Some(list) = streaming[bucket].as_array() {
            for raw in list {
                formats.push(parse_format(raw));
            }
        }
    }

    Ok(VideoInfo {
        video_details: VideoDetails {
            title,
            author: Author { name: author_name, channel_id },
            length_seconds,
            description,
            video_id: video_id.to_string(),
        },
        formats,
    })
}

fn parse_format(raw: &serde_json::Value) -> VideoFormat {
    let mime = raw["mimeType"].as_str().unwrap_or("");
    let container = mime.split('/').nth(1).unwrap_or("mp4").split(';').next().unwrap_or("mp4").to_string();
    let codecs = Regex::new(r#"codecs="([^"]+)""#)
        .ok()
        .and_then(|re| re.captures(mime))
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_default();

    VideoFormat {
        itag: raw["itag"].as_u64().unwrap_or(0) as u32,
        container,
        quality_label: raw["qualityLabel"].as_str().map(str::to_string),
        codecs,
        bitrate: raw["bitrate"].as_u64(),
        audio_bitrate: raw["averageBitrate"].as_u64().filter(|_| raw["audioQuality"].is_string()),
        content_length: raw["contentLength"].as_str().and_then(|s| s.parse().ok()),
        is_live: raw["isLive"].as_bool().unwrap_or(false),
        is_hls: mime.contains("mp4a") && raw.get("targetDurationSec").is_some(),
        is_dash_mpd: raw["type"].as_str() == Some("FORMAT_STREAM_TYPE_OTF"),
        url: raw["url"].as_str().map(str::to_string),
    }
}

/// Chooses the best matching format for `opts`, preferring the highest
/// bitrate among formats that satisfy [`DownloadOptions::matches`].
fn choose_format<'a>(formats: &'a [VideoFormat], opts: &DownloadOptions) -> YtdlResult<&'a VideoFormat> {
    formats
        .iter()
        .filter(|f| opts.matches(f))
        .max_by_key(|f| f.bitrate.unwrap_or(0) + f.audio_bitrate.unwrap_or(0))
        .ok_or_else(|| YtdlError::Metadata("no format matches the requested filters".to_string()))
}

#[async_trait]
impl MetadataClient for YoutubeHttpClient {
    async fn get_info(&self, url: &str) -> YtdlResult<VideoInfo> {
        let video_id = video_id_from_url(url)?;
        let response = self
            .http
            .get(WATCH_URL)
            .query(&[("v", video_id.as_str())])
            .send()
            .await
            .map_err(|e| YtdlError::Metadata(format!("watch page request failed: {e}")))?;
        let html = response
            .text()
            .await
            .map_err(|e| YtdlError::Metadata(format!("failed to read watch page body: {e}")))?;
        let player_response = extract_player_response(&html)?;
        parse_video_info(&video_id, &player_response)
    }
}

#[async_trait]
impl StreamClient for YoutubeHttpClient {
    async fn download_from_info(&self, info: &VideoInfo, opts: &DownloadOptions) -> YtdlResult<ByteEventStream> {
        let format = choose_format(&info.formats, opts)?.clone();
        let url = format
            .url
            .clone()
            .ok_or_else(|| YtdlError::Stream("chosen format carries no direct media url".to_string()))?;

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| YtdlError::Stream(format!("format request failed: {e}")))?;

        let mut headers = std::collections::HashMap::new();
        for (name, value) in response.headers() {
            if let Ok(value) = value.to_str() {
                headers.insert(name.as_str().to_lowercase(), value.to_string());
            }
        }
        let response_info = ResponseInfo { headers };

        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| YtdlError::Stream(format!("body read error: {e}"))));

        Ok(wrap_byte_stream(info.clone(), format, response_info, body))
    }
}

#[async_trait]
impl PlaylistClient for YoutubeHttpClient {
    fn validate_id(&self, url_or_id: &str) -> bool {
        url_or_id.starts_with("PL")
            || url_or_id.contains("list=")
            || Regex::new(r"^[A-Za-z0-9_-]{10,}$").is_ok_and(|re| re.is_match(url_or_id))
    }

    fn get_playlist_id(&self, url: &str) -> YtdlResult<String> {
        Regex::new(r"list=([A-Za-z0-9_-]+)")
            .ok()
            .and_then(|re| re.captures(url))
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
            .or_else(|| self.validate_id(url).then(|| url.to_string()))
            .ok_or_else(|| YtdlError::Config(format!("not a playlist url or id: {url}")))
    }

    async fn resolve(&self, id: &str, _opts: &DownloadOptions) -> YtdlResult<Vec<PlaylistItem>> {
        let response = self
            .http
            .get(PLAYLIST_URL)
            .query(&[("list", id)])
            .send()
            .await
            .map_err(|e| YtdlError::Metadata(format!("playlist page request failed: {e}")))?;
        let html = response
            .text()
            .await
            .map_err(|e| YtdlError::Metadata(format!("failed to read playlist page body: {e}")))?;

        let items = extract_video_items(&html);
        if items.is_empty() {
            return Err(YtdlError::Metadata(format!("playlist {id} resolved to no items")));
        }
        Ok(items)
    }
}

/// Extracts `{videoId, title}` pairs embedded in a watch/playlist/search
/// results page's inline JSON, used by both playlist resolution and search.
fn extract_video_items(html: &str) -> Vec<PlaylistItem> {
    let video_id_re = Regex::new(r#""videoId":"([A-Za-z0-9_-]{6,})""#).expect("static pattern is valid");
    let title_re = Regex::new(r#""title":\{"runs":\[\{"text":"([^"]*)""#).expect("static pattern is valid");

    let mut seen = std::collections::HashSet::new();
    let mut items = Vec::new();
    let mut titles = title_re.captures_iter(html);
    for (index, caps) in video_id_re.captures_iter(html).enumerate() {
        let video_id = caps[1].to_string();
        if !seen.insert(video_id.clone()) {
            continue;
        }
        let title = titles.next().map(|c| c[1].to_string()).unwrap_or_else(|| video_id.clone());
        items.push(PlaylistItem {
            id: video_id.clone(),
            title,
            url: format!("https://www.youtube.com/watch?v={video_id}"),
            author: Author { name: String::new(), channel_id: String::new() },
            index,
        });
    }
    items
}

impl YoutubeHttpClient {
    /// Searches YouTube for `query`, returning at most `limit` results as
    /// [`PlaylistItem`]s. This exists only so the `search` CLI subcommand is
    /// runnable, and does not attempt `safeSearch` filtering beyond the
    /// best-effort query parameter YouTube itself accepts.
    pub async fn search(&self, query: &str, limit: usize, safe_search: bool) -> YtdlResult<Vec<PlaylistItem>> {
        let mut params = vec![("search_query", query.to_string())];
        if safe_search {
            params.push(("sp", "EgIQAQ%3D%3D".to_string()));
        }
        let response = self
            .http
            .get(SEARCH_URL)
            .query(&params)
            .send()
            .await
            .map_err(|e| YtdlError::Metadata(format!("search request failed: {e}")))?;
        let html = response
            .text()
            .await
            .map_err(|e| YtdlError::Metadata(format!("failed to read search results body: {e}")))?;

        let mut items = extract_video_items(&html);
        items.truncate(limit);
        Ok(items)
    }
}

/// Wraps an already-established byte stream (for example, the body of a
/// chunked `reqwest` GET against a format's direct URL) in the `info` /
/// `response` / `data` signal sequence.
pub fn wrap_byte_stream(
    info: VideoInfo,
    format: VideoFormat,
    response: ResponseInfo,
    body: impl futures::Stream<Item = YtdlResult<bytes::Bytes>> + Send + 'static,
) -> ByteEventStream {
    let head = stream::iter(vec![
        Ok(StreamEvent::Info { info, format }),
        Ok(StreamEvent::Response(response)),
    ]);
    Box::pin(head.chain(body.map(|r| r.map(StreamEvent::Data))))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_video_id_from_common_url_shapes() {
        assert_eq!(video_id_from_url("https://www.youtube.com/watch?v=abc123XYZ").unwrap(), "abc123XYZ");
        assert_eq!(video_id_from_url("https://youtu.be/abc123XYZ").unwrap(), "abc123XYZ");
    }

    #[test]
    fn rejects_url_with_no_recognizable_id() {
        assert!(video_id_from_url("https://example.com/not-a-video").is_err());
    }
}
