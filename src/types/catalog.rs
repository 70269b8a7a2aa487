use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub id: u64,
    pub name: String,
    pub notes: Option<String>,
    /// SportTracks equipment id the tag was created from.
    pub equipment_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TourType {
    pub id: u64,
    pub name: String,
}
