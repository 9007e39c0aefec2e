//! Descriptor of an uploaded file.

use serde::{Deserialize, Serialize};

/// Link to a file produced by an upload outside this crate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "file_link")]
pub struct FileLink {
    /// Original file name
    pub filename: String,
    /// Location of the stored file
    pub url: String,
}

impl FileLink {
    /// Create a file link.
    #[must_use]
    pub fn new(filename: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            url: url.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_link_wire_shape() {
        let link = FileLink::new("xrd.csv", "https://files.example/xrd.csv");
        let json = serde_json::to_value(&link).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "type": "file_link",
                "filename": "xrd.csv",
                "url": "https://files.example/xrd.csv"
            })
        );
    }
}
