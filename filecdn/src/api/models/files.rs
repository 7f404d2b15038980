use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Multipart body accepted by the upload route (documentation only)
#[derive(Debug, ToSchema)]
#[allow(dead_code)]
pub struct UploadForm {
    /// The file to upload; its name becomes the storage key
    #[schema(value_type = String, format = Binary)]
    pub file: Vec<u8>,
}

/// Response for a successful upload
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UploadResponse {
    pub filename: String,
    /// Lowercased extension of the stored name
    #[serde(rename = "type")]
    pub file_type: String,
    pub message: String,
}

/// Plain confirmation message
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

/// Response for file list
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct FileListResponse {
    pub response: FileListing,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct FileListing {
    /// Every stored name, in the order the backend reports them
    pub names: Vec<String>,
    pub paging: Paging,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct Paging {
    /// Number of names returned
    pub size: usize,
}

impl FileListResponse {
    pub fn from_names(names: Vec<String>) -> Self {
        Self {
            response: FileListing {
                paging: Paging { size: names.len() },
                names,
            },
        }
    }
}
