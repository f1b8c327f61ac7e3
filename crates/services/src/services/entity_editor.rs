//! One editing session of a wiki entity.
//!
//! Holds the [`EditBuffer`] behind a lock that is never held across a
//! network call, so saves, refreshes and edits can interleave freely.

use std::sync::Arc;

use models::{
    article::{Article, CreateArticle},
    attribute::AttributeField,
    entity::EntitySummary,
    field_group::FieldGroup,
    gallery::ImageUpload,
    relationship::{CreateRelationship, UpdateRelationship},
};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

use super::{
    edit_buffer::{
        ArticleChange, DirtyFlags, EditBuffer, EntityDraft, FieldEdit, SaveRequest,
        ValidationError,
    },
    query_cache::{CacheKey, QueryCache},
    wiki_api::{WikiApiError, WikiBackend},
};

/// Shown when the server gives no message of its own
pub const FALLBACK_ERROR_MESSAGE: &str = "حدث خطأ ما، يرجى المحاولة مرة أخرى";
pub const SAVED_MESSAGE: &str = "تم الحفظ بنجاح";
pub const NOTHING_TO_SAVE_MESSAGE: &str = "لا توجد تغييرات لحفظها";

#[derive(Debug, Error)]
pub enum EditorError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),
    #[error("wiki api error: {0}")]
    Api(#[from] WikiApiError),
}

impl EditorError {
    /// Text for the toast shown to the user
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation(e) => e.message.clone(),
            Self::Api(e) => e
                .server_message()
                .unwrap_or(FALLBACK_ERROR_MESSAGE)
                .to_string(),
        }
    }

    pub fn notice(&self) -> Notice {
        Notice::error(self.user_message())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    Success,
    Info,
    Error,
}

/// Toast-like message for the UI
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SaveOutcome {
    Saved,
    NothingToSave,
}

impl SaveOutcome {
    pub fn notice(self) -> Notice {
        match self {
            Self::Saved => Notice {
                level: NoticeLevel::Success,
                message: SAVED_MESSAGE.to_string(),
            },
            Self::NothingToSave => Notice {
                level: NoticeLevel::Info,
                message: NOTHING_TO_SAVE_MESSAGE.to_string(),
            },
        }
    }
}

pub struct EntityEditor {
    backend: Arc<dyn WikiBackend>,
    cache: QueryCache,
    wiki_id: Uuid,
    entity_id: Uuid,
    buffer: RwLock<EditBuffer>,
}

impl EntityEditor {
    /// Open a session; the working copy comes from the first successful fetch.
    pub async fn open(
        backend: Arc<dyn WikiBackend>,
        cache: QueryCache,
        wiki_id: Uuid,
        entity_id: Uuid,
    ) -> Result<Self, EditorError> {
        let record = cache
            .entity(wiki_id, entity_id, backend.fetch_entity(wiki_id, entity_id))
            .await?;
        info!(%wiki_id, %entity_id, name = %record.name, "Opened entity editor");

        Ok(Self {
            backend,
            cache,
            wiki_id,
            entity_id,
            buffer: RwLock::new(EditBuffer::initialize(&record)),
        })
    }

    pub fn entity_id(&self) -> Uuid {
        self.entity_id
    }

    pub fn wiki_id(&self) -> Uuid {
        self.wiki_id
    }

    fn key(&self) -> CacheKey {
        CacheKey::Entity {
            wiki_id: self.wiki_id,
            entity_id: self.entity_id,
        }
    }

    /// Refetch the entity and merge it into the working copy.
    pub async fn refresh(&self) -> Result<(), EditorError> {
        self.cache.invalidate(self.key()).await;
        self.pull().await
    }

    async fn pull(&self) -> Result<(), EditorError> {
        let record = self
            .cache
            .entity(
                self.wiki_id,
                self.entity_id,
                self.backend.fetch_entity(self.wiki_id, self.entity_id),
            )
            .await?;
        self.buffer.write().await.on_server_refresh(&record);
        Ok(())
    }

    /// Invalidate and pull after an immediately persisted change.
    ///
    /// The change itself already succeeded, so a failed refetch is only logged.
    async fn after_mutation(&self) {
        if let Err(e) = self.refresh().await {
            warn!(entity_id = %self.entity_id, error = %e, "Refetch after mutation failed");
        }
    }

    pub async fn snapshot(&self) -> EntityDraft {
        self.buffer.read().await.working().clone()
    }

    pub async fn attribute_fields(&self) -> Vec<AttributeField> {
        self.buffer.read().await.attribute_fields()
    }

    pub async fn attribute_text(&self, name: &str) -> Option<String> {
        self.buffer.read().await.attribute_text(name)
    }

    pub async fn dirty(&self) -> DirtyFlags {
        self.buffer.read().await.dirty()
    }

    pub async fn dirty_groups(&self) -> Vec<FieldGroup> {
        self.buffer.read().await.dirty_groups()
    }

    pub async fn is_dirty(&self, group: FieldGroup) -> bool {
        self.buffer.read().await.is_dirty(group)
    }

    pub async fn edit(&self, edit: FieldEdit) -> bool {
        self.buffer.write().await.set_field(edit)
    }

    pub async fn reorder_articles(&self, from: usize, to: usize) -> bool {
        self.buffer.write().await.reorder_articles(from, to)
    }

    pub async fn move_article_up(&self, id: Uuid) -> bool {
        self.buffer.write().await.move_article_up(id)
    }

    pub async fn move_article_down(&self, id: Uuid) -> bool {
        self.buffer.write().await.move_article_down(id)
    }

    pub async fn discard(&self, group: FieldGroup) {
        self.buffer.write().await.discard(group)
    }

    /// Save one field group.
    ///
    /// On failure nothing local changes: the edit stays in the working copy
    /// and the group stays dirty, ready for a retry.
    pub async fn save_group(&self, group: FieldGroup) -> Result<SaveOutcome, EditorError> {
        let prepared = self.buffer.read().await.prepare_save(group)?;
        let Some(request) = prepared else {
            info!(entity_id = %self.entity_id, %group, "Nothing to save");
            return Ok(SaveOutcome::NothingToSave);
        };

        let sent = match &request {
            SaveRequest::Details(details) => {
                self.backend.update_details(self.entity_id, details).await
            }
            SaveRequest::Attributes(attributes) => {
                self.backend
                    .update_attributes(self.entity_id, attributes)
                    .await
            }
            SaveRequest::ArticleOrder(order) => {
                self.backend.reorder_articles(self.entity_id, order).await
            }
            SaveRequest::Articles(changes) => return self.save_articles(changes).await,
        };

        match sent {
            Ok(()) => {
                self.buffer.write().await.commit_save(&request);
                info!(entity_id = %self.entity_id, %group, "Saved field group");
                Ok(SaveOutcome::Saved)
            }
            Err(e) => {
                warn!(entity_id = %self.entity_id, %group, error = %e, "Save failed");
                Err(e.into())
            }
        }
    }

    /// Articles are saved one request each; accepted ones are committed even
    /// when a later one fails.
    async fn save_articles(&self, changes: &[ArticleChange]) -> Result<SaveOutcome, EditorError> {
        let mut first_error = None;
        for change in changes {
            match self.backend.update_article(change.id, &change.update).await {
                Ok(()) => self.buffer.write().await.commit_article(change),
                Err(e) => {
                    warn!(
                        entity_id = %self.entity_id,
                        article_id = %change.id,
                        error = %e,
                        "Article save failed"
                    );
                    first_error.get_or_insert(e);
                }
            }
        }
        match first_error {
            Some(e) => Err(e.into()),
            None => {
                info!(entity_id = %self.entity_id, count = changes.len(), "Saved articles");
                Ok(SaveOutcome::Saved)
            }
        }
    }

    /// Save every dirty group; each result is independent of the others.
    pub async fn save_all(&self) -> Vec<(FieldGroup, Result<SaveOutcome, EditorError>)> {
        let mut results = Vec::new();
        for group in self.dirty_groups().await {
            results.push((group, self.save_group(group).await));
        }
        results
    }

    pub async fn add_article(
        &self,
        title: String,
        content: String,
    ) -> Result<Article, EditorError> {
        if title.trim().is_empty() {
            return Err(ValidationError::new(FieldGroup::Articles, "عنوان المقال مطلوب").into());
        }
        let order_index = i32::try_from(self.buffer.read().await.working().articles.len())
            .unwrap_or(i32::MAX);
        let article = self
            .backend
            .create_article(
                self.entity_id,
                &CreateArticle {
                    title,
                    content,
                    order_index: Some(order_index),
                },
            )
            .await?;
        info!(entity_id = %self.entity_id, article_id = %article.id, "Article created");

        // both copies, so it shows up even while local article edits are held
        self.buffer.write().await.insert_article(article.clone());
        self.after_mutation().await;
        Ok(article)
    }

    pub async fn delete_article(&self, article_id: Uuid) -> Result<(), EditorError> {
        self.backend.delete_article(article_id).await?;
        info!(entity_id = %self.entity_id, %article_id, "Article deleted");
        self.buffer.write().await.remove_article(article_id);
        self.after_mutation().await;
        Ok(())
    }

    pub async fn add_relationship(
        &self,
        target_entity_id: Uuid,
        label: String,
        reverse_label: Option<String>,
    ) -> Result<(), EditorError> {
        if target_entity_id == self.entity_id {
            return Err(ValidationError::new(
                FieldGroup::Relationships,
                "لا يمكن ربط الشخصية بنفسها",
            )
            .into());
        }
        let relationship = CreateRelationship {
            target_entity_id,
            label: required_label(label)?,
            reverse_label: optional_text(reverse_label),
        };
        self.backend
            .create_relationship(self.entity_id, &relationship)
            .await?;
        info!(entity_id = %self.entity_id, %target_entity_id, "Relationship created");
        self.after_mutation().await;
        Ok(())
    }

    pub async fn update_relationship(
        &self,
        relationship_id: Uuid,
        label: String,
        reverse_label: Option<String>,
    ) -> Result<(), EditorError> {
        let relationship = UpdateRelationship {
            label: required_label(label)?,
            reverse_label: optional_text(reverse_label),
        };
        self.backend
            .update_relationship(relationship_id, &relationship)
            .await?;
        self.after_mutation().await;
        Ok(())
    }

    pub async fn delete_relationship(&self, relationship_id: Uuid) -> Result<(), EditorError> {
        self.backend.delete_relationship(relationship_id).await?;
        info!(entity_id = %self.entity_id, %relationship_id, "Relationship deleted");
        self.after_mutation().await;
        Ok(())
    }

    pub async fn upload_gallery_image(
        &self,
        image: ImageUpload,
        caption: Option<String>,
    ) -> Result<(), EditorError> {
        if image.is_empty() {
            return Err(ValidationError::new(FieldGroup::Gallery, "يرجى اختيار صورة").into());
        }
        self.backend
            .upload_gallery_image(self.entity_id, image, optional_text(caption))
            .await?;
        info!(entity_id = %self.entity_id, "Gallery image uploaded");
        self.after_mutation().await;
        Ok(())
    }

    pub async fn update_gallery_caption(
        &self,
        image_id: Uuid,
        caption: String,
    ) -> Result<(), EditorError> {
        self.backend
            .update_gallery_caption(image_id, caption.trim())
            .await?;
        self.after_mutation().await;
        Ok(())
    }

    pub async fn delete_gallery_image(&self, image_id: Uuid) -> Result<(), EditorError> {
        self.backend.delete_gallery_image(image_id).await?;
        info!(entity_id = %self.entity_id, %image_id, "Gallery image deleted");
        self.after_mutation().await;
        Ok(())
    }

    /// Replace the main picture of the entity.
    pub async fn replace_entity_image(&self, image: ImageUpload) -> Result<(), EditorError> {
        if image.is_empty() {
            return Err(ValidationError::new(FieldGroup::Details, "يرجى اختيار صورة").into());
        }
        self.backend
            .update_entity_image(self.entity_id, image)
            .await?;
        self.after_mutation().await;
        Ok(())
    }

    /// Delete the entity on the server.
    ///
    /// The session is over afterwards; the caller should drop the editor.
    pub async fn delete_entity(&self) -> Result<(), EditorError> {
        self.backend.delete_entity(self.entity_id).await?;
        info!(wiki_id = %self.wiki_id, entity_id = %self.entity_id, "Entity deleted");
        self.cache.invalidate(self.key()).await;
        self.cache
            .invalidate(CacheKey::EntityList {
                wiki_id: self.wiki_id,
            })
            .await;
        Ok(())
    }

    /// Other entities of the same wiki, e.g. to pick a relationship target.
    pub async fn wiki_entities(&self) -> Result<Arc<Vec<EntitySummary>>, EditorError> {
        Ok(self
            .cache
            .entity_list(self.wiki_id, self.backend.list_entities(self.wiki_id))
            .await?)
    }
}

fn required_label(label: String) -> Result<String, ValidationError> {
    let label = label.trim();
    if label.is_empty() {
        return Err(ValidationError::new(
            FieldGroup::Relationships,
            "وصف العلاقة مطلوب",
        ));
    }
    Ok(label.to_string())
}

fn optional_text(text: Option<String>) -> Option<String> {
    text.map(|t| t.trim().to_string()).filter(|t| !t.is_empty())
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    };

    use async_trait::async_trait;
    use models::{
        article::UpdateArticle,
        attribute::{AttributeValue, Attributes},
        entity::{DetailField, EntityDetails, EntityRecord},
        gallery::GalleryImage,
        relationship::Relationship,
    };
    use tokio::sync::Notify;

    use super::*;
    use crate::services::edit_buffer::tests::{sample_record, uid};

    /// In-memory server: mutations change the stored record
    struct FakeBackend {
        record: Mutex<EntityRecord>,
        fetches: AtomicUsize,
        calls: Mutex<Vec<&'static str>>,
        failing: Mutex<Vec<(&'static str, Option<String>)>>,
        // update_details waits on `release` after signalling `entered`
        gate: Option<(Arc<Notify>, Arc<Notify>)>,
    }

    impl FakeBackend {
        fn new() -> Self {
            Self {
                record: Mutex::new(sample_record()),
                fetches: AtomicUsize::new(0),
                calls: Mutex::new(Vec::new()),
                failing: Mutex::new(Vec::new()),
                gate: None,
            }
        }

        fn fail(&self, op: &'static str, message: Option<&str>) {
            self.failing
                .lock()
                .unwrap()
                .push((op, message.map(str::to_string)));
        }

        fn check(&self, op: &'static str) -> Result<(), WikiApiError> {
            self.calls.lock().unwrap().push(op);
            let failing = self.failing.lock().unwrap();
            match failing.iter().find(|(name, _)| *name == op) {
                Some((_, message)) => Err(WikiApiError::Server {
                    status: 422,
                    message: message.clone(),
                }),
                None => Ok(()),
            }
        }

        fn calls(&self) -> Vec<&'static str> {
            self.calls.lock().unwrap().clone()
        }

        fn server_edit(&self, f: impl FnOnce(&mut EntityRecord)) {
            f(&mut self.record.lock().unwrap());
        }
    }

    #[async_trait]
    impl WikiBackend for FakeBackend {
        async fn fetch_entity(
            &self,
            _wiki_id: Uuid,
            _entity_id: Uuid,
        ) -> Result<EntityRecord, WikiApiError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            Ok(self.record.lock().unwrap().clone())
        }

        async fn list_entities(&self, _wiki_id: Uuid) -> Result<Vec<EntitySummary>, WikiApiError> {
            self.check("list_entities")?;
            let record = self.record.lock().unwrap();
            Ok(vec![EntitySummary {
                id: record.id,
                name: record.name.clone(),
                role: Some(record.role.clone()),
                image_url: None,
            }])
        }

        async fn update_details(
            &self,
            _entity_id: Uuid,
            details: &EntityDetails,
        ) -> Result<(), WikiApiError> {
            if let Some((entered, release)) = &self.gate {
                entered.notify_one();
                release.notified().await;
            }
            self.check("update_details")?;
            self.server_edit(|r| {
                r.name = details.name.clone();
                r.role = details.role.clone();
                r.short_description = details.short_description.clone();
                r.description = details.description.clone();
                r.section = details.section.clone();
            });
            Ok(())
        }

        async fn update_entity_image(
            &self,
            _entity_id: Uuid,
            image: ImageUpload,
        ) -> Result<(), WikiApiError> {
            self.check("update_entity_image")?;
            self.server_edit(|r| r.image_url = Some(format!("https://cdn.example/{}", image.file_name)));
            Ok(())
        }

        async fn update_attributes(
            &self,
            _entity_id: Uuid,
            attributes: &Attributes,
        ) -> Result<(), WikiApiError> {
            self.check("update_attributes")?;
            let value = serde_json::to_value(attributes).unwrap();
            self.server_edit(|r| r.attributes = value.as_object().cloned().unwrap());
            Ok(())
        }

        async fn create_article(
            &self,
            _entity_id: Uuid,
            article: &CreateArticle,
        ) -> Result<Article, WikiApiError> {
            self.check("create_article")?;
            let created = Article {
                id: uid(100),
                title: article.title.clone(),
                content: article.content.clone(),
                order_index: article.order_index.unwrap_or_default(),
            };
            self.server_edit(|r| r.articles.push(created.clone()));
            Ok(created)
        }

        async fn update_article(
            &self,
            article_id: Uuid,
            update: &UpdateArticle,
        ) -> Result<(), WikiApiError> {
            self.check("update_article")?;
            self.server_edit(|r| {
                if let Some(a) = r.articles.iter_mut().find(|a| a.id == article_id) {
                    a.title = update.title.clone();
                    a.content = update.content.clone();
                }
            });
            Ok(())
        }

        async fn delete_article(&self, article_id: Uuid) -> Result<(), WikiApiError> {
            self.check("delete_article")?;
            self.server_edit(|r| r.articles.retain(|a| a.id != article_id));
            Ok(())
        }

        async fn reorder_articles(
            &self,
            _entity_id: Uuid,
            order: &[Uuid],
        ) -> Result<(), WikiApiError> {
            self.check("reorder_articles")?;
            self.server_edit(|r| {
                for a in &mut r.articles {
                    a.order_index = order.iter().position(|id| *id == a.id).unwrap() as i32;
                }
            });
            Ok(())
        }

        async fn create_relationship(
            &self,
            _entity_id: Uuid,
            relationship: &CreateRelationship,
        ) -> Result<(), WikiApiError> {
            self.check("create_relationship")?;
            self.server_edit(|r| {
                r.relationships.push(Relationship {
                    id: uid(200),
                    target_entity_id: relationship.target_entity_id,
                    target_entity_name: "هدف".into(),
                    target_entity_image: None,
                    label: relationship.label.clone(),
                    reverse_label: relationship.reverse_label.clone(),
                })
            });
            Ok(())
        }

        async fn update_relationship(
            &self,
            relationship_id: Uuid,
            relationship: &UpdateRelationship,
        ) -> Result<(), WikiApiError> {
            self.check("update_relationship")?;
            self.server_edit(|r| {
                if let Some(rel) = r.relationships.iter_mut().find(|x| x.id == relationship_id) {
                    rel.label = relationship.label.clone();
                    rel.reverse_label = relationship.reverse_label.clone();
                }
            });
            Ok(())
        }

        async fn delete_relationship(&self, relationship_id: Uuid) -> Result<(), WikiApiError> {
            self.check("delete_relationship")?;
            self.server_edit(|r| r.relationships.retain(|x| x.id != relationship_id));
            Ok(())
        }

        async fn upload_gallery_image(
            &self,
            _entity_id: Uuid,
            image: ImageUpload,
            caption: Option<String>,
        ) -> Result<(), WikiApiError> {
            self.check("upload_gallery_image")?;
            self.server_edit(|r| {
                r.gallery_images.push(GalleryImage {
                    id: uid(300),
                    image_url: format!("https://cdn.example/{}", image.file_name),
                    caption,
                })
            });
            Ok(())
        }

        async fn update_gallery_caption(
            &self,
            image_id: Uuid,
            caption: &str,
        ) -> Result<(), WikiApiError> {
            self.check("update_gallery_caption")?;
            self.server_edit(|r| {
                if let Some(img) = r.gallery_images.iter_mut().find(|x| x.id == image_id) {
                    img.caption = Some(caption.to_string());
                }
            });
            Ok(())
        }

        async fn delete_gallery_image(&self, image_id: Uuid) -> Result<(), WikiApiError> {
            self.check("delete_gallery_image")?;
            self.server_edit(|r| r.gallery_images.retain(|x| x.id != image_id));
            Ok(())
        }

        async fn delete_entity(&self, _entity_id: Uuid) -> Result<(), WikiApiError> {
            self.check("delete_entity")
        }
    }

    async fn open(backend: Arc<FakeBackend>) -> EntityEditor {
        let record = sample_record();
        EntityEditor::open(backend, QueryCache::default(), record.wiki_id, record.id)
            .await
            .unwrap()
    }

    fn rename(value: &str) -> FieldEdit {
        FieldEdit::Detail {
            field: DetailField::Name,
            value: value.to_string(),
        }
    }

    #[tokio::test]
    async fn test_save_group_persists_and_clears_dirty() {
        let backend = Arc::new(FakeBackend::new());
        let editor = open(backend.clone()).await;

        editor.edit(rename("سلمى")).await;
        assert!(editor.is_dirty(FieldGroup::Details).await);

        let outcome = editor.save_group(FieldGroup::Details).await.unwrap();
        assert_eq!(outcome, SaveOutcome::Saved);
        assert!(!editor.is_dirty(FieldGroup::Details).await);
        assert_eq!(backend.record.lock().unwrap().name, "سلمى");
    }

    #[tokio::test]
    async fn test_nothing_to_save_makes_no_request() {
        let backend = Arc::new(FakeBackend::new());
        let editor = open(backend.clone()).await;

        let outcome = editor.save_group(FieldGroup::Attributes).await.unwrap();
        assert_eq!(outcome, SaveOutcome::NothingToSave);
        assert_eq!(outcome.notice().message, NOTHING_TO_SAVE_MESSAGE);
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn test_failed_save_keeps_edit_and_message() {
        let backend = Arc::new(FakeBackend::new());
        backend.fail("update_details", Some("الاسم مستخدم"));
        let editor = open(backend.clone()).await;

        editor.edit(rename("مكرر")).await;
        let before = editor.snapshot().await;
        let err = editor.save_group(FieldGroup::Details).await.unwrap_err();

        assert_eq!(err.user_message(), "الاسم مستخدم");
        assert_eq!(err.notice().level, NoticeLevel::Error);
        assert_eq!(editor.snapshot().await, before);
        assert!(editor.is_dirty(FieldGroup::Details).await);
    }

    #[tokio::test]
    async fn test_failure_without_message_uses_fallback() {
        let backend = Arc::new(FakeBackend::new());
        backend.fail("update_attributes", None);
        let editor = open(backend.clone()).await;

        editor
            .edit(FieldEdit::Attribute {
                name: "اللقب".into(),
                value: AttributeValue::Scalar("الصقر".into()),
            })
            .await;
        let err = editor.save_group(FieldGroup::Attributes).await.unwrap_err();
        assert_eq!(err.user_message(), FALLBACK_ERROR_MESSAGE);
    }

    #[tokio::test]
    async fn test_validation_blocks_request() {
        let backend = Arc::new(FakeBackend::new());
        let editor = open(backend.clone()).await;

        editor.edit(rename("")).await;
        let err = editor.save_group(FieldGroup::Details).await.unwrap_err();
        assert!(matches!(err, EditorError::Validation(_)));
        assert_eq!(err.user_message(), "الاسم مطلوب");

        let err = editor
            .add_relationship(uid(3), "  ".into(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, EditorError::Validation(_)));
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn test_refresh_keeps_dirty_details() {
        let backend = Arc::new(FakeBackend::new());
        let editor = open(backend.clone()).await;

        editor.edit(rename("محلي")).await;
        backend.server_edit(|r| {
            r.name = "من الخادم".into();
            r.role = "دور جديد".into();
            r.relationships.clear();
        });
        editor.refresh().await.unwrap();

        let draft = editor.snapshot().await;
        assert_eq!(draft.details.name, "محلي");
        // the whole details group is held, not just the edited field
        assert_eq!(draft.details.role, "بطلة");
        assert!(draft.relationships.is_empty());
        assert_eq!(backend.fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_edit_during_save_is_not_lost() {
        let entered = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let mut fake = FakeBackend::new();
        fake.gate = Some((entered.clone(), release.clone()));
        let backend = Arc::new(fake);
        let editor = Arc::new(open(backend.clone()).await);

        editor.edit(rename("أول")).await;
        let saving = tokio::spawn({
            let editor = editor.clone();
            async move { editor.save_group(FieldGroup::Details).await }
        });

        entered.notified().await;
        editor.edit(rename("ثان")).await;
        release.notify_one();

        assert_eq!(saving.await.unwrap().unwrap(), SaveOutcome::Saved);
        assert_eq!(backend.record.lock().unwrap().name, "أول");
        assert_eq!(editor.snapshot().await.details.name, "ثان");
        assert!(editor.is_dirty(FieldGroup::Details).await);
    }

    #[tokio::test]
    async fn test_relationship_mutation_refreshes_despite_dirty_groups() {
        let backend = Arc::new(FakeBackend::new());
        let editor = open(backend.clone()).await;

        editor.edit(rename("محلي")).await;
        editor
            .add_relationship(uid(4), "صديقة".into(), Some(" ".into()))
            .await
            .unwrap();

        let draft = editor.snapshot().await;
        assert_eq!(draft.relationships.len(), 2);
        assert_eq!(draft.relationships[1].label, "صديقة");
        assert_eq!(draft.relationships[1].reverse_label, None);
        assert_eq!(draft.details.name, "محلي");

        editor.delete_relationship(uid(20)).await.unwrap();
        assert_eq!(editor.snapshot().await.relationships.len(), 1);
    }

    #[tokio::test]
    async fn test_self_relationship_rejected() {
        let backend = Arc::new(FakeBackend::new());
        let editor = open(backend.clone()).await;
        let err = editor
            .add_relationship(editor.entity_id(), "نفسه".into(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, EditorError::Validation(_)));
    }

    #[tokio::test]
    async fn test_gallery_upload_and_caption() {
        let backend = Arc::new(FakeBackend::new());
        let editor = open(backend.clone()).await;

        let empty = ImageUpload::from_file_name("x.png", Vec::new());
        assert!(editor.upload_gallery_image(empty, None).await.is_err());

        let image = ImageUpload::from_file_name("map.png", vec![0x89, 0x50]);
        editor
            .upload_gallery_image(image, Some("خريطة".into()))
            .await
            .unwrap();
        editor
            .update_gallery_caption(uid(300), " خريطة المدينة ".into())
            .await
            .unwrap();

        let gallery = editor.snapshot().await.gallery;
        assert_eq!(gallery.len(), 2);
        assert_eq!(gallery[1].caption.as_deref(), Some("خريطة المدينة"));

        editor.delete_gallery_image(uid(30)).await.unwrap();
        assert_eq!(editor.snapshot().await.gallery.len(), 1);
    }

    #[tokio::test]
    async fn test_added_article_visible_while_articles_dirty() {
        let backend = Arc::new(FakeBackend::new());
        let editor = open(backend.clone()).await;

        editor
            .edit(FieldEdit::ArticleTitle {
                id: uid(10),
                title: "A*".into(),
            })
            .await;
        let created = editor
            .add_article("D".into(), "<p>d</p>".into())
            .await
            .unwrap();
        assert_eq!(created.order_index, 3);

        let draft = editor.snapshot().await;
        assert_eq!(draft.articles.len(), 4);
        assert_eq!(draft.articles[0].title, "A*");
        assert!(editor.is_dirty(FieldGroup::Articles).await);

        editor.delete_article(created.id).await.unwrap();
        assert_eq!(editor.snapshot().await.articles.len(), 3);
    }

    #[tokio::test]
    async fn test_reorder_save_sends_order() {
        let backend = Arc::new(FakeBackend::new());
        let editor = open(backend.clone()).await;

        assert!(editor.move_article_up(uid(11)).await);
        editor.save_group(FieldGroup::ArticleOrder).await.unwrap();
        assert!(!editor.is_dirty(FieldGroup::ArticleOrder).await);

        editor.refresh().await.unwrap();
        let ids: Vec<_> = editor.snapshot().await.articles.iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![uid(11), uid(10), uid(12)]);
    }

    #[tokio::test]
    async fn test_partial_article_failure() {
        let backend = Arc::new(FakeBackend::new());
        backend.fail("update_article", None);
        let editor = open(backend.clone()).await;

        editor
            .edit(FieldEdit::ArticleContent {
                id: uid(11),
                content: "<p>new</p>".into(),
            })
            .await;
        assert!(editor.save_group(FieldGroup::Articles).await.is_err());
        assert!(editor.is_dirty(FieldGroup::Articles).await);
        assert_eq!(editor.snapshot().await.articles[1].content, "<p>new</p>");
    }

    #[tokio::test]
    async fn test_save_all_groups_are_independent() {
        let backend = Arc::new(FakeBackend::new());
        backend.fail("update_details", None);
        let editor = open(backend.clone()).await;

        editor.edit(rename("x")).await;
        editor
            .edit(FieldEdit::AttributeText {
                name: "الأسلحة".into(),
                text: "* سيف\n* رمح".into(),
            })
            .await;

        let results = editor.save_all().await;
        assert_eq!(results.len(), 2);
        assert!(results[0].1.is_err());
        assert_eq!(results[1].1.as_ref().unwrap(), &SaveOutcome::Saved);
        assert_eq!(editor.dirty_groups().await, vec![FieldGroup::Details]);

        let saved = backend.record.lock().unwrap().attributes["الأسلحة"].clone();
        assert_eq!(saved, serde_json::json!(["سيف", "رمح"]));
    }

    #[tokio::test]
    async fn test_delete_entity_invalidates_cache() {
        let backend = Arc::new(FakeBackend::new());
        let cache = QueryCache::default();
        let record = sample_record();
        let editor = EntityEditor::open(backend.clone(), cache.clone(), record.wiki_id, record.id)
            .await
            .unwrap();
        editor.wiki_entities().await.unwrap();

        editor.delete_entity().await.unwrap();
        assert!(
            !cache
                .contains(CacheKey::Entity {
                    wiki_id: record.wiki_id,
                    entity_id: record.id
                })
                .await
        );
        assert!(
            !cache
                .contains(CacheKey::EntityList {
                    wiki_id: record.wiki_id
                })
                .await
        );
    }

    #[tokio::test]
    async fn test_replace_entity_image() {
        let backend = Arc::new(FakeBackend::new());
        let editor = open(backend.clone()).await;
        editor
            .replace_entity_image(ImageUpload::from_file_name("laila.webp", vec![1, 2, 3]))
            .await
            .unwrap();
        assert_eq!(
            editor.snapshot().await.image_url.as_deref(),
            Some("https://cdn.example/laila.webp")
        );
    }
}
