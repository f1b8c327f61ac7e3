//! HTTP client for the wiki endpoints of the Sard API.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use models::{
    article::{Article, CreateArticle, ReorderArticles, UpdateArticle},
    attribute::Attributes,
    entity::{EntityDetails, EntityRecord, EntitySummary},
    gallery::{ImageUpload, UpdateGalleryCaption},
    relationship::{CreateRelationship, UpdateRelationship},
};
use reqwest::{
    Client, RequestBuilder, Response, StatusCode,
    multipart::{Form, Part},
};
use secrecy::ExposeSecret;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;
use utils::response::extract_error_message;
use uuid::Uuid;

use super::{auth::TokenProvider, config::ClientConfig};

#[derive(Debug, Clone, Error)]
pub enum WikiApiError {
    #[error("network error: {0}")]
    Transport(String),
    #[error("timeout")]
    Timeout,
    #[error("http {status}: {}", .message.as_deref().unwrap_or("no message"))]
    Server { status: u16, message: Option<String> },
    #[error("unauthorized")]
    Unauthorized { message: Option<String> },
    #[error("json error: {0}")]
    Serde(String),
    #[error("invalid request url: {0}")]
    Url(String),
}

impl WikiApiError {
    /// Message the server attached to a rejection, if any
    pub fn server_message(&self) -> Option<&str> {
        match self {
            Self::Server { message, .. } | Self::Unauthorized { message } => message.as_deref(),
            _ => None,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Server { status, .. } => Some(*status),
            Self::Unauthorized { .. } => Some(StatusCode::UNAUTHORIZED.as_u16()),
            _ => None,
        }
    }
}

/// Remote operations the entity editor depends on
#[async_trait]
pub trait WikiBackend: Send + Sync {
    async fn fetch_entity(&self, wiki_id: Uuid, entity_id: Uuid)
    -> Result<EntityRecord, WikiApiError>;

    async fn list_entities(&self, wiki_id: Uuid) -> Result<Vec<EntitySummary>, WikiApiError>;

    async fn update_details(
        &self,
        entity_id: Uuid,
        details: &EntityDetails,
    ) -> Result<(), WikiApiError>;

    async fn update_entity_image(
        &self,
        entity_id: Uuid,
        image: ImageUpload,
    ) -> Result<(), WikiApiError>;

    async fn update_attributes(
        &self,
        entity_id: Uuid,
        attributes: &Attributes,
    ) -> Result<(), WikiApiError>;

    async fn create_article(
        &self,
        entity_id: Uuid,
        article: &CreateArticle,
    ) -> Result<Article, WikiApiError>;

    async fn update_article(
        &self,
        article_id: Uuid,
        update: &UpdateArticle,
    ) -> Result<(), WikiApiError>;

    async fn delete_article(&self, article_id: Uuid) -> Result<(), WikiApiError>;

    async fn reorder_articles(&self, entity_id: Uuid, order: &[Uuid]) -> Result<(), WikiApiError>;

    async fn create_relationship(
        &self,
        entity_id: Uuid,
        relationship: &CreateRelationship,
    ) -> Result<(), WikiApiError>;

    async fn update_relationship(
        &self,
        relationship_id: Uuid,
        relationship: &UpdateRelationship,
    ) -> Result<(), WikiApiError>;

    async fn delete_relationship(&self, relationship_id: Uuid) -> Result<(), WikiApiError>;

    async fn upload_gallery_image(
        &self,
        entity_id: Uuid,
        image: ImageUpload,
        caption: Option<String>,
    ) -> Result<(), WikiApiError>;

    async fn update_gallery_caption(
        &self,
        image_id: Uuid,
        caption: &str,
    ) -> Result<(), WikiApiError>;

    async fn delete_gallery_image(&self, image_id: Uuid) -> Result<(), WikiApiError>;

    async fn delete_entity(&self, entity_id: Uuid) -> Result<(), WikiApiError>;
}

/// reqwest implementation of [`WikiBackend`]
#[derive(Clone)]
pub struct WikiApiClient {
    http: Client,
    base_url: Url,
    tokens: Arc<dyn TokenProvider>,
}

impl WikiApiClient {
    pub fn new(
        base_url: Url,
        timeout: Duration,
        tokens: Arc<dyn TokenProvider>,
    ) -> Result<Self, WikiApiError> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("sard-wiki/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| WikiApiError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            base_url,
            tokens,
        })
    }

    pub fn from_config(
        config: &ClientConfig,
        tokens: Arc<dyn TokenProvider>,
    ) -> Result<Self, WikiApiError> {
        Self::new(config.api_base_url.clone(), config.request_timeout(), tokens)
    }

    /// Base URL with `segments` appended, whether or not it ends in `/`.
    fn url(&self, segments: &[&str]) -> Result<Url, WikiApiError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| WikiApiError::Url(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn execute(&self, request: RequestBuilder) -> Result<Response, WikiApiError> {
        let request = match self.tokens.access_token().await {
            Some(token) => request.bearer_auth(token.expose_secret()),
            None => request,
        };
        let request = request
            .build()
            .map_err(|e| WikiApiError::Transport(e.to_string()))?;
        let method = request.method().clone();
        let url = request.url().clone();
        debug!(%method, %url, "Wiki API request");

        let res = self.http.execute(request).await.map_err(map_reqwest_error)?;
        let status = res.status();
        if status.is_success() {
            return Ok(res);
        }

        let body = res.text().await.unwrap_or_default();
        let message = extract_error_message(&body);
        warn!(
            %method,
            %url,
            status = status.as_u16(),
            server_message = message.as_deref().unwrap_or(""),
            "Wiki API request rejected"
        );
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(WikiApiError::Unauthorized { message })
            }
            s => Err(WikiApiError::Server {
                status: s.as_u16(),
                message,
            }),
        }
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, WikiApiError> {
        self.execute(request)
            .await?
            .json::<T>()
            .await
            .map_err(|e| WikiApiError::Serde(e.to_string()))
    }

    async fn send_empty(&self, request: RequestBuilder) -> Result<(), WikiApiError> {
        // body, if any, is ignored; callers refetch
        self.execute(request).await.map(|_| ())
    }
}

fn image_part(image: ImageUpload) -> Result<Part, WikiApiError> {
    Part::bytes(image.bytes)
        .file_name(image.file_name)
        .mime_str(&image.content_type)
        .map_err(|e| WikiApiError::Transport(e.to_string()))
}

#[async_trait]
impl WikiBackend for WikiApiClient {
    async fn fetch_entity(
        &self,
        wiki_id: Uuid,
        entity_id: Uuid,
    ) -> Result<EntityRecord, WikiApiError> {
        let url = self.url(&["wikis", &wiki_id.to_string(), "entities", &entity_id.to_string()])?;
        self.send_json(self.http.get(url)).await
    }

    async fn list_entities(&self, wiki_id: Uuid) -> Result<Vec<EntitySummary>, WikiApiError> {
        let url = self.url(&["wikis", &wiki_id.to_string(), "entities"])?;
        self.send_json(self.http.get(url)).await
    }

    async fn update_details(
        &self,
        entity_id: Uuid,
        details: &EntityDetails,
    ) -> Result<(), WikiApiError> {
        let url = self.url(&["entities", &entity_id.to_string()])?;
        let form = details
            .form_fields()
            .into_iter()
            .fold(Form::new(), |form, (name, value)| form.text(name, value.to_string()));
        self.send_empty(self.http.patch(url).multipart(form)).await
    }

    async fn update_entity_image(
        &self,
        entity_id: Uuid,
        image: ImageUpload,
    ) -> Result<(), WikiApiError> {
        let url = self.url(&["entities", &entity_id.to_string()])?;
        let form = Form::new().part("image", image_part(image)?);
        self.send_empty(self.http.patch(url).multipart(form)).await
    }

    async fn update_attributes(
        &self,
        entity_id: Uuid,
        attributes: &Attributes,
    ) -> Result<(), WikiApiError> {
        let url = self.url(&["entities", &entity_id.to_string()])?;
        let body = serde_json::json!({ "attributes": attributes });
        self.send_empty(self.http.patch(url).json(&body)).await
    }

    async fn create_article(
        &self,
        entity_id: Uuid,
        article: &CreateArticle,
    ) -> Result<Article, WikiApiError> {
        let url = self.url(&["entities", &entity_id.to_string(), "articles"])?;
        self.send_json(self.http.post(url).json(article)).await
    }

    async fn update_article(
        &self,
        article_id: Uuid,
        update: &UpdateArticle,
    ) -> Result<(), WikiApiError> {
        let url = self.url(&["articles", &article_id.to_string()])?;
        self.send_empty(self.http.patch(url).json(update)).await
    }

    async fn delete_article(&self, article_id: Uuid) -> Result<(), WikiApiError> {
        let url = self.url(&["articles", &article_id.to_string()])?;
        self.send_empty(self.http.delete(url)).await
    }

    async fn reorder_articles(&self, entity_id: Uuid, order: &[Uuid]) -> Result<(), WikiApiError> {
        let url = self.url(&["entities", &entity_id.to_string(), "articles", "order"])?;
        let body = ReorderArticles {
            order: order.to_vec(),
        };
        self.send_empty(self.http.patch(url).json(&body)).await
    }

    async fn create_relationship(
        &self,
        entity_id: Uuid,
        relationship: &CreateRelationship,
    ) -> Result<(), WikiApiError> {
        let url = self.url(&["entities", &entity_id.to_string(), "relationships"])?;
        self.send_empty(self.http.post(url).json(relationship)).await
    }

    async fn update_relationship(
        &self,
        relationship_id: Uuid,
        relationship: &UpdateRelationship,
    ) -> Result<(), WikiApiError> {
        let url = self.url(&["relationships", &relationship_id.to_string()])?;
        self.send_empty(self.http.patch(url).json(relationship)).await
    }

    async fn delete_relationship(&self, relationship_id: Uuid) -> Result<(), WikiApiError> {
        let url = self.url(&["relationships", &relationship_id.to_string()])?;
        self.send_empty(self.http.delete(url)).await
    }

    async fn upload_gallery_image(
        &self,
        entity_id: Uuid,
        image: ImageUpload,
        caption: Option<String>,
    ) -> Result<(), WikiApiError> {
        let url = self.url(&["entities", &entity_id.to_string(), "gallery"])?;
        let mut form = Form::new().part("image", image_part(image)?);
        if let Some(caption) = caption {
            form = form.text("caption", caption);
        }
        self.send_empty(self.http.post(url).multipart(form)).await
    }

    async fn update_gallery_caption(
        &self,
        image_id: Uuid,
        caption: &str,
    ) -> Result<(), WikiApiError> {
        let url = self.url(&["gallery", &image_id.to_string()])?;
        let body = UpdateGalleryCaption {
            caption: caption.to_string(),
        };
        self.send_empty(self.http.patch(url).json(&body)).await
    }

    async fn delete_gallery_image(&self, image_id: Uuid) -> Result<(), WikiApiError> {
        let url = self.url(&["gallery", &image_id.to_string()])?;
        self.send_empty(self.http.delete(url)).await
    }

    async fn delete_entity(&self, entity_id: Uuid) -> Result<(), WikiApiError> {
        let url = self.url(&["entities", &entity_id.to_string()])?;
        self.send_empty(self.http.delete(url)).await
    }
}

fn map_reqwest_error(e: reqwest::Error) -> WikiApiError {
    if e.is_timeout() {
        WikiApiError::Timeout
    } else {
        WikiApiError::Transport(e.to_string())
    }
}
