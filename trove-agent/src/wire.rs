//! Request bodies whose field names differ from the core types.

use serde::Serialize;
use trove_core::model::PermitId;
use trove_core::request::DigRequest;

/// Body of `POST /dig`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DigBody {
    #[serde(rename = "licenseID")]
    pub license_id: PermitId,
    #[serde(rename = "posX")]
    pub x: i32,
    #[serde(rename = "posY")]
    pub y: i32,
    pub depth: u8,
}

impl From<DigRequest> for DigBody {
    fn from(request: DigRequest) -> Self {
        Self {
            license_id: request.license_id,
            x: request.x,
            y: request.y,
            depth: request.depth,
        }
    }
}
