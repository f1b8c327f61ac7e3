use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

/// A long-form article attached to an entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct Article {
    pub id: Uuid,
    pub title: String,
    pub content: String, // rich-text markup, opaque to the client
    #[serde(default)]
    pub order_index: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct CreateArticle {
    pub title: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_index: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct UpdateArticle {
    pub title: String,
    pub content: String,
}

impl From<&Article> for UpdateArticle {
    fn from(article: &Article) -> Self {
        Self {
            title: article.title.clone(),
            content: article.content.clone(),
        }
    }
}

/// Request body for the article reorder endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
pub struct ReorderArticles {
    pub order: Vec<Uuid>,
}
