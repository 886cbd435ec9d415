// Wire types shared by both controller variants

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Which wire protocol a client speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    /// Standalone firmware polled over `rr_*` HTTP endpoints.
    Poll,
    /// Board computer service with REST endpoints and a model WebSocket.
    Rest,
}

impl std::fmt::Display for Variant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Poll => f.write_str("poll"),
            Self::Rest => f.write_str("rest"),
        }
    }
}

/// Immediate controller acknowledgement of a submitted code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodeAck {
    /// Accepted into a code buffer. The reply arrives later through the
    /// reply sequence counter.
    Queued { buffer_space: u32 },
    /// The controller executed the code and returned its reply directly.
    Replied(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileKind {
    #[serde(rename = "f")]
    File,
    #[serde(rename = "d")]
    Directory,
}

/// One entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    #[serde(rename = "type")]
    pub kind: FileKind,
    pub name: String,
    #[serde(default)]
    pub size: u64,
    /// Last modification time as reported (`YYYY-MM-DDTHH:MM:SS`).
    #[serde(default)]
    pub date: Option<String>,
}

impl FileEntry {
    pub fn is_directory(&self) -> bool {
        self.kind == FileKind::Directory
    }

    pub fn modified(&self) -> Option<NaiveDateTime> {
        parse_timestamp(self.date.as_deref()?)
    }
}

/// Metadata the controller extracts from a job file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FileInfo {
    pub file_name: Option<String>,
    pub size: u64,
    pub last_modified: Option<String>,
    pub height: f64,
    pub layer_height: f64,
    pub num_layers: u32,
    /// Filament required per extruder, in mm.
    pub filament: Vec<f64>,
    pub generated_by: Option<String>,
    /// Slicer estimate in seconds.
    pub print_time: Option<u64>,
    /// Simulated duration in seconds.
    pub simulated_time: Option<u64>,
}

/// Format a timestamp the way the controllers expect it in query strings.
pub fn format_timestamp(time: NaiveDateTime) -> String {
    time.format("%Y-%m-%dT%H:%M:%S").to_string()
}

fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let trimmed = raw.trim_end_matches('Z');
    NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f").ok()
}
