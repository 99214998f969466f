use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Uploaded study material, chunked and embedded server-side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Material {
    /// Unique identifier.
    pub id: String,
    /// Uploader.
    #[serde(default)]
    pub uploaded_by: Option<String>,
    /// Exam the material belongs to.
    #[serde(default)]
    pub exam_id: Option<String>,
    /// Original filename.
    pub filename: String,
    /// MIME type of the upload.
    pub mime_type: String,
    /// Chunks embedded so far; zero until embedding finished.
    #[serde(default)]
    pub chunk_count: u32,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl Material {
    /// Embedding is done once at least one chunk exists.
    pub const fn is_embedded(&self) -> bool {
        self.chunk_count > 0
    }
}
