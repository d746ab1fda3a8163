//! Storage usage accounting
//!
//! Files are sorted into five mutually exclusive buckets by content type.
//! The counters are a plain value: the aggregator builds a fresh one per scan
//! and hands it back to the coordinator, which persists it.

use serde::{Deserialize, Serialize};

/// Bucket a file's bytes are counted in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentCategory {
    Audio,
    Movies,
    Documents,
    Photos,
    Others,
}

const AUDIO_TYPES: &[&str] = &[
    "audio/mpeg",
    "audio/x-mpeg-3",
    "audio/mpeg3",
    "audio/aiff",
    "audio/x-aiff",
];

const MOVIE_TYPES: &[&str] = &[
    "video/mp4",
    "video/x-msvideo",
    "video/mpeg",
    "video/flv",
    "video/quicktime",
];

const PHOTO_TYPES: &[&str] = &["image/png", "image/jpeg", "image/jpg", "image/tiff"];

const DOCUMENT_TYPES: &[&str] = &[
    "application/powerpoint",
    "application/mspowerpoint",
    "application/x-mspowerpoint",
    "application/pdf",
    "application/x-dvi",
];

impl ContentCategory {
    /// Classify a content type tag. Anything unrecognised lands in `Others`.
    #[must_use]
    pub fn classify(mime_type: &str) -> Self {
        if AUDIO_TYPES.contains(&mime_type) {
            Self::Audio
        } else if MOVIE_TYPES.contains(&mime_type) {
            Self::Movies
        } else if PHOTO_TYPES.contains(&mime_type) {
            Self::Photos
        } else if DOCUMENT_TYPES.contains(&mime_type) {
            Self::Documents
        } else {
            Self::Others
        }
    }
}

/// Per-category byte totals plus the number of files counted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageCounters {
    #[serde(rename = "audio_size")]
    pub audio: u64,
    #[serde(rename = "movies_size")]
    pub movies: u64,
    #[serde(rename = "document_size")]
    pub documents: u64,
    #[serde(rename = "photo_size")]
    pub photos: u64,
    #[serde(rename = "others_size")]
    pub others: u64,
    #[serde(rename = "total_files")]
    pub file_count: u64,
}

impl UsageCounters {
    /// Add `size` bytes to the bucket for `category` and count one file
    pub fn record(&mut self, category: ContentCategory, size: u64) {
        let bucket = match category {
            ContentCategory::Audio => &mut self.audio,
            ContentCategory::Movies => &mut self.movies,
            ContentCategory::Documents => &mut self.documents,
            ContentCategory::Photos => &mut self.photos,
            ContentCategory::Others => &mut self.others,
        };
        *bucket = bucket.saturating_add(size);
        self.file_count += 1;
    }

    /// Zero the five byte totals, leaving the file count alone
    pub fn reset_buckets(&mut self) {
        self.audio = 0;
        self.movies = 0;
        self.documents = 0;
        self.photos = 0;
        self.others = 0;
    }

    #[must_use]
    pub fn total_bytes(&self) -> u64 {
        self.audio + self.movies + self.documents + self.photos + self.others
    }
}
