//! Output filename templating and sanitization.
//!
//! Resolves `{path.dotted}` tokens in an `output` template string against
//! the worker's `VideoInfo` and chosen `VideoFormat`, in that order, then
//! sanitizes the result into a filesystem-safe name.

use regex::{Captures, Regex};

use crate::domain::{VideoDetails, VideoFormat};

/// Resolves `template` against `details`/`format` and appends `.ext`.
#[must_use]
pub fn resolve_filename(template: &str, details: &VideoDetails, format: &VideoFormat, ext: &str) -> String {
    let resolved = resolve_tokens(template, details, format);
    format!("{}.{}", sanitize(&resolved), ext)
}

fn token_pattern() -> Regex {
    Regex::new(r"\{([A-Za-z0-9_.]+)\}").expect("static token pattern is valid")
}

fn resolve_tokens(template: &str, details: &VideoDetails, format: &VideoFormat) -> String {
    let pattern = token_pattern();
    pattern
        .replace_all(template, |caps: &Captures| {
            let path = &caps[1];
            lookup(path, details, format).unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// Looks up one token path against `videoInfo` (as `videoDetails.*`) first,
/// then `videoFormat` (as a bare field name).
fn lookup(path: &str, details: &VideoDetails, format: &VideoFormat) -> Option<String> {
    match path {
        "videoDetails.title" => Some(details.title.clone()),
        "videoDetails.author.name" => Some(details.author.name.clone()),
        "videoDetails.author.channelId" => Some(details.author.channel_id.clone()),
        "videoDetails.videoId" => Some(details.video_id.clone()),
        "videoDetails.lengthSeconds" => Some(details.length_seconds.to_string()),
        "itag" => Some(format.itag.to_string()),
        "container" => Some(format.container.clone()),
        "qualityLabel" => format.quality_label.clone(),
        "codecs" => Some(format.codecs.clone()),
        _ => None,
    }
}

/// Replaces every character unsafe in a filename with `-`.
fn sanitize(value: &str) -> String {
    value
        .chars()
        .map(|c| if is_filename_safe(c) { c } else { '-' })
        .collect()
}

fn is_filename_safe(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ' ')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Author;

    fn details() -> VideoDetails {
        VideoDetails {
            title: "Cool: Video?".to_string(),
            author: Author { name: "Some/Channel".to_string(), channel_id: "UC123".to_string() },
            length_seconds: 42,
            description: None,
            video_id: "abc123".to_string(),
        }
    }

    fn format() -> VideoFormat {
        VideoFormat {
            itag: 22,
            container: "mp4".to_string(),
            quality_label: Some("720p".to_string()),
            codecs: "avc1.64001F, mp4a.40.2".to_string(),
            bitrate: Some(1_000_000),
            audio_bitrate: Some(128_000),
            content_length: Some(1024),
            is_live: false,
            is_hls: false,
            is_dash_mpd: false,
            url: None,
        }
    }

    #[test]
    fn default_template_resolves_title_and_sanitizes_unsafe_characters() {
        let name = resolve_filename("{videoDetails.title}", &details(), &format(), "mp4");
        assert_eq!(name, "Cool- Video-.mp4");
    }

    #[test]
    fn unknown_token_is_left_untouched_but_braces_are_sanitized() {
        let name = resolve_filename("{videoDetails.videoId}-{unknownToken}", &details(), &format(), "mp4");
        assert_eq!(name, "abc123--unknownToken-.mp4");
    }

    #[test]
    fn composite_template_mixes_video_info_and_format_tokens() {
        let name = resolve_filename(
            "{videoDetails.videoId}-{qualityLabel}",
            &details(),
            &format(),
            "mp4",
        );
        assert_eq!(name, "abc123-720p.mp4");
    }
}
