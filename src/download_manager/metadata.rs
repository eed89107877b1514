//! Track metadata as reported by the extraction tool.

use serde::Deserialize;

use crate::catalogue_store::{DEFAULT_ARTIST, DEFAULT_TITLE};

/// The subset of yt-dlp's `--dump-json` document we care about.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExtractedInfo {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub uploader: Option<String>,
    pub album: Option<String>,
    /// Seconds, possibly fractional
    pub duration: Option<f64>,
    pub thumbnail: Option<String>,
}

/// Display metadata for a catalogue item, with defaults applied.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackMetadata {
    pub title: String,
    pub artist: String,
    pub album: Option<String>,
    pub duration_seconds: Option<i64>,
    pub thumbnail_url: Option<String>,
}

/// Returns the first candidate that is present and not blank.
pub fn first_present<'a>(candidates: &[Option<&'a str>]) -> Option<&'a str> {
    candidates
        .iter()
        .flatten()
        .copied()
        .find(|value| !value.trim().is_empty())
}

impl From<ExtractedInfo> for TrackMetadata {
    fn from(info: ExtractedInfo) -> Self {
        let title = first_present(&[info.title.as_deref()])
            .unwrap_or(DEFAULT_TITLE)
            .to_string();
        let artist = first_present(&[info.artist.as_deref(), info.uploader.as_deref()])
            .unwrap_or(DEFAULT_ARTIST)
            .to_string();
        let album = first_present(&[info.album.as_deref()]).map(str::to_string);
        let thumbnail_url = first_present(&[info.thumbnail.as_deref()]).map(str::to_string);
        let duration_seconds = info
            .duration
            .filter(|d| d.is_finite() && *d >= 0.0)
            .map(|d| d.round() as i64);

        TrackMetadata {
            title,
            artist,
            album,
            duration_seconds,
            thumbnail_url,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_present_skips_missing_and_blank() {
        assert_eq!(first_present(&[None, Some(""), Some("b")]), Some("b"));
        assert_eq!(first_present(&[Some("  "), None]), None);
        assert_eq!(first_present(&[]), None);
    }

    #[test]
    fn artist_falls_back_to_uploader_then_default() {
        let with_uploader = ExtractedInfo {
            uploader: Some("Channel".to_string()),
            ..Default::default()
        };
        assert_eq!(TrackMetadata::from(with_uploader).artist, "Channel");

        let with_both = ExtractedInfo {
            artist: Some("Band".to_string()),
            uploader: Some("Channel".to_string()),
            ..Default::default()
        };
        assert_eq!(TrackMetadata::from(with_both).artist, "Band");

        let blank_artist = ExtractedInfo {
            artist: Some(String::new()),
            ..Default::default()
        };
        assert_eq!(TrackMetadata::from(blank_artist).artist, DEFAULT_ARTIST);
    }

    #[test]
    fn parses_dump_json_document() {
        let json = r#"{
            "id": "abc",
            "title": "Song A",
            "uploader": "Someone",
            "duration": 119.6,
            "thumbnail": "https://img/a.jpg",
            "formats": []
        }"#;
        let info: ExtractedInfo = serde_json::from_str(json).unwrap();
        let metadata = TrackMetadata::from(info);

        assert_eq!(
            metadata,
            TrackMetadata {
                title: "Song A".to_string(),
                artist: "Someone".to_string(),
                album: None,
                duration_seconds: Some(120),
                thumbnail_url: Some("https://img/a.jpg".to_string()),
            }
        );
    }

    #[test]
    fn empty_document_gets_defaults() {
        let metadata = TrackMetadata::from(ExtractedInfo::default());
        assert_eq!(metadata.title, DEFAULT_TITLE);
        assert_eq!(metadata.artist, DEFAULT_ARTIST);
        assert_eq!(metadata.duration_seconds, None);
    }
}
