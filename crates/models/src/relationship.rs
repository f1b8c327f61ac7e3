use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

/// Directed link from one entity to another, e.g. "أخ" / "أخت"
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct Relationship {
    pub id: Uuid,
    pub target_entity_id: Uuid,
    pub target_entity_name: String,
    pub target_entity_image: Option<String>,
    pub label: String,
    pub reverse_label: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct CreateRelationship {
    pub target_entity_id: Uuid,
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reverse_label: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRelationship {
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reverse_label: Option<String>,
}
