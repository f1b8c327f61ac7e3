use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use ts_rs::TS;
use uuid::Uuid;

use super::{article::Article, gallery::GalleryImage, relationship::Relationship};

/// Entity as returned by `GET /wikis/{wiki_id}/entities/{entity_id}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct EntityRecord {
    pub id: Uuid,
    pub wiki_id: Uuid, // novel the wiki belongs to
    pub name: String,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub short_description: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub section: String,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    #[ts(type = "Record<string, string | Array<string>>")]
    pub attributes: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub articles: Vec<Article>,
    #[serde(default)]
    pub relationships: Vec<Relationship>,
    #[serde(default)]
    pub gallery_images: Vec<GalleryImage>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Row of the entity list of a wiki
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct EntitySummary {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
}

/// Scalar fields edited together on the details form
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct EntityDetails {
    pub name: String,
    pub role: String,
    pub short_description: String,
    pub description: String,
    pub section: String,
}

impl EntityDetails {
    pub fn get(&self, field: DetailField) -> &str {
        match field {
            DetailField::Name => &self.name,
            DetailField::Role => &self.role,
            DetailField::ShortDescription => &self.short_description,
            DetailField::Description => &self.description,
            DetailField::Section => &self.section,
        }
    }

    pub fn set(&mut self, field: DetailField, value: String) {
        let slot = match field {
            DetailField::Name => &mut self.name,
            DetailField::Role => &mut self.role,
            DetailField::ShortDescription => &mut self.short_description,
            DetailField::Description => &mut self.description,
            DetailField::Section => &mut self.section,
        };
        *slot = value;
    }

    /// Multipart form field names and values, in API naming.
    pub fn form_fields(&self) -> [(&'static str, &str); 5] {
        [
            ("name", self.name.as_str()),
            ("role", self.role.as_str()),
            ("shortDescription", self.short_description.as_str()),
            ("description", self.description.as_str()),
            ("section", self.section.as_str()),
        ]
    }
}

impl From<&EntityRecord> for EntityDetails {
    fn from(record: &EntityRecord) -> Self {
        Self {
            name: record.name.clone(),
            role: record.role.clone(),
            short_description: record.short_description.clone(),
            description: record.description.clone(),
            section: record.section.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, EnumString, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DetailField {
    Name,
    Role,
    ShortDescription,
    Description,
    Section,
}
