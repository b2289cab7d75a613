use serde::{Deserialize, Serialize};

/// Marker line closing the managed section of entry-style memory documents.
pub const ENTRIES_MARKER: &str = "<!-- ENTRIES START -->";

/// Marker line closing the managed section of roadmap-style memory documents.
pub const PHASES_MARKER: &str = "<!-- PHASES START -->";

/// Per-path comparison semantics.
///
/// The policy decides which part of a file's content the engine owns and how
/// two contents are compared for upgrade eligibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PolicyId {
    /// The whole file is engine-owned and compared byte-for-byte (normalized).
    #[serde(rename = "full_file")]
    FullFile,
    /// The prefix up to and including `<!-- ENTRIES START -->` is engine-owned;
    /// everything after belongs to the user.
    #[serde(rename = "memory_entries_v1")]
    MemoryEntriesV1,
    /// Same discipline as entries, with `<!-- PHASES START -->`.
    #[serde(rename = "memory_roadmap_v1")]
    MemoryRoadmapV1,
    /// The file is an unordered set of non-empty, non-comment lines; order and
    /// duplicates are irrelevant.
    #[serde(rename = "allowlist_lines_v1")]
    AllowlistLinesV1,
}

impl PolicyId {
    pub fn as_str(self) -> &'static str {
        match self {
            PolicyId::FullFile => "full_file",
            PolicyId::MemoryEntriesV1 => "memory_entries_v1",
            PolicyId::MemoryRoadmapV1 => "memory_roadmap_v1",
            PolicyId::AllowlistLinesV1 => "allowlist_lines_v1",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "full_file" => Some(PolicyId::FullFile),
            "memory_entries_v1" => Some(PolicyId::MemoryEntriesV1),
            "memory_roadmap_v1" => Some(PolicyId::MemoryRoadmapV1),
            "allowlist_lines_v1" => Some(PolicyId::AllowlistLinesV1),
            _ => None,
        }
    }

    /// The section marker for section-aware policies, `None` otherwise.
    pub fn section_marker(self) -> Option<&'static str> {
        match self {
            PolicyId::MemoryEntriesV1 => Some(ENTRIES_MARKER),
            PolicyId::MemoryRoadmapV1 => Some(PHASES_MARKER),
            PolicyId::FullFile | PolicyId::AllowlistLinesV1 => None,
        }
    }

    pub fn is_section_aware(self) -> bool {
        self.section_marker().is_some()
    }
}
