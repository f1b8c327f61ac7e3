//! Reconciles a locally edited entity with server refreshes.
//!
//! Two copies are kept: the authoritative copy (what the server last said)
//! and the working copy (what the user sees and edits). A field group is
//! dirty iff its working value differs from the authoritative one. A refresh
//! replaces every clean group and leaves dirty groups alone.

use models::{
    article::{Article, UpdateArticle},
    attribute::{AttributeField, AttributeValue, Attributes, attribute_fields, attributes_from_wire},
    entity::{DetailField, EntityDetails, EntityRecord},
    field_group::FieldGroup,
    gallery::GalleryImage,
    relationship::Relationship,
};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use super::attribute_text::{normalize_attributes, parse_list_text, render_list_text};

/// Editable view of an [`EntityRecord`], split into field groups
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityDraft {
    pub id: Uuid,
    pub wiki_id: Uuid,
    pub image_url: Option<String>,
    pub details: EntityDetails,
    pub attributes: Attributes,
    pub articles: Vec<Article>,
    pub relationships: Vec<Relationship>,
    pub gallery: Vec<GalleryImage>,
}

impl From<&EntityRecord> for EntityDraft {
    fn from(record: &EntityRecord) -> Self {
        let mut articles = record.articles.clone();
        // stable, so equal indexes keep server order
        articles.sort_by_key(|a| a.order_index);

        Self {
            id: record.id,
            wiki_id: record.wiki_id,
            image_url: record.image_url.clone(),
            details: EntityDetails::from(record),
            attributes: attributes_from_wire(&record.attributes),
            articles,
            relationships: record.relationships.clone(),
            gallery: record.gallery_images.clone(),
        }
    }
}

impl EntityDraft {
    fn article_order(&self) -> Vec<Uuid> {
        self.articles.iter().map(|a| a.id).collect()
    }

    fn article(&self, id: Uuid) -> Option<&Article> {
        self.articles.iter().find(|a| a.id == id)
    }

    fn article_mut(&mut self, id: Uuid) -> Option<&mut Article> {
        self.articles.iter_mut().find(|a| a.id == id)
    }

    fn renumber_articles(&mut self) {
        renumber(&mut self.articles);
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DirtyFlags {
    pub details: bool,
    pub attributes: bool,
    pub article_content: bool,
    pub article_order: bool,
}

impl DirtyFlags {
    pub fn get(&self, group: FieldGroup) -> bool {
        match group {
            FieldGroup::Details => self.details,
            FieldGroup::Attributes => self.attributes,
            FieldGroup::Articles => self.article_content,
            FieldGroup::ArticleOrder => self.article_order,
            FieldGroup::Relationships | FieldGroup::Gallery => false,
        }
    }

    pub fn any(&self) -> bool {
        self.details || self.attributes || self.article_content || self.article_order
    }

    fn articles_held(&self) -> bool {
        self.article_content || self.article_order
    }
}

/// A single local edit, addressed by group and field
#[derive(Debug, Clone, PartialEq)]
pub enum FieldEdit {
    Detail { field: DetailField, value: String },
    /// Creates the attribute when missing
    Attribute { name: String, value: AttributeValue },
    /// Raw text of a list attribute editor, one item per line
    AttributeText { name: String, text: String },
    RenameAttribute { from: String, to: String },
    RemoveAttribute { name: String },
    ArticleTitle { id: Uuid, title: String },
    ArticleContent { id: Uuid, content: String },
}

impl FieldEdit {
    pub fn group(&self) -> FieldGroup {
        match self {
            Self::Detail { .. } => FieldGroup::Details,
            Self::Attribute { .. }
            | Self::AttributeText { .. }
            | Self::RenameAttribute { .. }
            | Self::RemoveAttribute { .. } => FieldGroup::Attributes,
            Self::ArticleTitle { .. } | Self::ArticleContent { .. } => FieldGroup::Articles,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArticleChange {
    pub id: Uuid,
    pub update: UpdateArticle,
}

/// Payload of one group save, exactly as sent to the server
#[derive(Debug, Clone, PartialEq)]
pub enum SaveRequest {
    Details(EntityDetails),
    Attributes(Attributes),
    Articles(Vec<ArticleChange>),
    ArticleOrder(Vec<Uuid>),
}

impl SaveRequest {
    pub fn group(&self) -> FieldGroup {
        match self {
            Self::Details(_) => FieldGroup::Details,
            Self::Attributes(_) => FieldGroup::Attributes,
            Self::Articles(_) => FieldGroup::Articles,
            Self::ArticleOrder(_) => FieldGroup::ArticleOrder,
        }
    }
}

/// Rejected before any request is made
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ValidationError {
    pub group: FieldGroup,
    pub message: String,
}

impl ValidationError {
    pub fn new(group: FieldGroup, message: impl Into<String>) -> Self {
        Self {
            group,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EditBuffer {
    authoritative: EntityDraft,
    working: EntityDraft,
    dirty: DirtyFlags,
}

impl EditBuffer {
    /// Start a session from the first successful fetch.
    pub fn initialize(record: &EntityRecord) -> Self {
        let draft = EntityDraft::from(record);
        Self {
            authoritative: draft.clone(),
            working: draft,
            dirty: DirtyFlags::default(),
        }
    }

    pub fn entity_id(&self) -> Uuid {
        self.authoritative.id
    }

    pub fn working(&self) -> &EntityDraft {
        &self.working
    }

    pub fn authoritative(&self) -> &EntityDraft {
        &self.authoritative
    }

    pub fn dirty(&self) -> DirtyFlags {
        self.dirty
    }

    pub fn is_dirty(&self, group: FieldGroup) -> bool {
        self.dirty.get(group)
    }

    pub fn dirty_groups(&self) -> Vec<FieldGroup> {
        [
            FieldGroup::Details,
            FieldGroup::Attributes,
            FieldGroup::Articles,
            FieldGroup::ArticleOrder,
        ]
        .into_iter()
        .filter(|g| self.dirty.get(*g))
        .collect()
    }

    pub fn has_unsaved_changes(&self) -> bool {
        self.dirty.any()
    }

    /// Working attributes in the shape of the editing form.
    pub fn attribute_fields(&self) -> Vec<AttributeField> {
        attribute_fields(&self.working.attributes)
    }

    /// Text for the list editor of `name`; `None` for scalars and unknown names.
    pub fn attribute_text(&self, name: &str) -> Option<String> {
        match self.working.attributes.get(name)? {
            AttributeValue::List(items) => Some(render_list_text(items)),
            AttributeValue::Scalar(_) => None,
        }
    }

    /// Merge a fresh server record, group by group.
    pub fn on_server_refresh(&mut self, record: &EntityRecord) {
        let fresh = EntityDraft::from(record);
        let held = self.dirty;

        if held.details {
            debug!(entity_id = %fresh.id, "Refresh: keeping local details");
        } else {
            self.working.details = fresh.details.clone();
        }
        if held.attributes {
            debug!(entity_id = %fresh.id, "Refresh: keeping local attributes");
        } else {
            self.working.attributes = fresh.attributes.clone();
        }
        if held.articles_held() {
            debug!(
                entity_id = %fresh.id,
                content = held.article_content,
                order = held.article_order,
                "Refresh: merging articles with local edits"
            );
            self.working.articles = self.merge_articles(&fresh, held.article_order);
        } else {
            self.working.articles = fresh.articles.clone();
        }

        // persisted immediately on change, so never held back
        self.working.relationships = fresh.relationships.clone();
        self.working.gallery = fresh.gallery.clone();
        self.working.image_url = fresh.image_url.clone();
        self.working.id = fresh.id;
        self.working.wiki_id = fresh.wiki_id;

        self.authoritative = fresh;
        self.recompute();
    }

    /// Working article list after a refresh that arrives while articles are
    /// dirty.
    ///
    /// Membership always follows the server: deleted articles are dropped and
    /// new ones appended. Only articles whose own text was edited keep the
    /// local title and content. The local order is kept only if it is dirty.
    fn merge_articles(&self, fresh: &EntityDraft, keep_order: bool) -> Vec<Article> {
        let merged_one = |server: &Article| match self.working.article(server.id) {
            Some(local)
                if self
                    .authoritative
                    .article(server.id)
                    .is_some_and(|saved| !same_text(saved, local)) =>
            {
                Article {
                    title: local.title.clone(),
                    content: local.content.clone(),
                    ..server.clone()
                }
            }
            _ => server.clone(),
        };

        let mut merged: Vec<Article> = if keep_order {
            self.working
                .articles
                .iter()
                .filter_map(|local| fresh.article(local.id))
                .map(merged_one)
                .collect()
        } else {
            fresh.articles.iter().map(merged_one).collect()
        };
        for server in &fresh.articles {
            if !merged.iter().any(|a| a.id == server.id) {
                merged.push(server.clone());
            }
        }
        renumber(&mut merged);
        merged
    }

    /// Apply a local edit. Returns false when the edit addressed nothing.
    pub fn set_field(&mut self, edit: FieldEdit) -> bool {
        let applied = match edit {
            FieldEdit::Detail { field, value } => {
                self.working.details.set(field, value);
                true
            }
            FieldEdit::Attribute { name, value } => {
                self.working.attributes.insert(name, value);
                true
            }
            FieldEdit::AttributeText { name, text } => {
                self.working
                    .attributes
                    .insert(name, AttributeValue::List(parse_list_text(&text)));
                true
            }
            FieldEdit::RenameAttribute { from, to } => self.rename_attribute(&from, to),
            FieldEdit::RemoveAttribute { name } => {
                self.working.attributes.shift_remove(&name).is_some()
            }
            FieldEdit::ArticleTitle { id, title } => match self.working.article_mut(id) {
                Some(article) => {
                    article.title = title;
                    true
                }
                None => {
                    warn!(article_id = %id, "Edit addressed an unknown article");
                    false
                }
            },
            FieldEdit::ArticleContent { id, content } => match self.working.article_mut(id) {
                Some(article) => {
                    article.content = content;
                    true
                }
                None => {
                    warn!(article_id = %id, "Edit addressed an unknown article");
                    false
                }
            },
        };
        self.recompute();
        applied
    }

    fn rename_attribute(&mut self, from: &str, to: String) -> bool {
        if from == to || !self.working.attributes.contains_key(from) {
            return false;
        }
        let renamed: Attributes = std::mem::take(&mut self.working.attributes)
            .into_iter()
            .filter_map(|(name, value)| {
                if name == from {
                    Some((to.clone(), value))
                } else if name == to {
                    // replaced by the renamed entry
                    None
                } else {
                    Some((name, value))
                }
            })
            .collect();
        self.working.attributes = renamed;
        true
    }

    /// Swap two adjacent articles of the working copy.
    ///
    /// Anything other than an in-range adjacent swap is a no-op.
    pub fn reorder_articles(&mut self, from: usize, to: usize) -> bool {
        let len = self.working.articles.len();
        if from >= len || to >= len || from.abs_diff(to) != 1 {
            return false;
        }
        self.working.articles.swap(from, to);
        self.working.renumber_articles();
        self.recompute();
        true
    }

    pub fn move_article_up(&mut self, id: Uuid) -> bool {
        match self.article_position(id) {
            Some(index) if index > 0 => self.reorder_articles(index, index - 1),
            _ => false,
        }
    }

    pub fn move_article_down(&mut self, id: Uuid) -> bool {
        match self.article_position(id) {
            Some(index) => self.reorder_articles(index, index + 1),
            None => false,
        }
    }

    fn article_position(&self, id: Uuid) -> Option<usize> {
        self.working.articles.iter().position(|a| a.id == id)
    }

    /// Throw away local edits of a group.
    pub fn discard(&mut self, group: FieldGroup) {
        match group {
            FieldGroup::Details => self.working.details = self.authoritative.details.clone(),
            FieldGroup::Attributes => {
                self.working.attributes = self.authoritative.attributes.clone()
            }
            FieldGroup::Articles => {
                // keep the local order, restore texts
                for article in &mut self.working.articles {
                    if let Some(saved) = self.authoritative.article(article.id) {
                        article.title = saved.title.clone();
                        article.content = saved.content.clone();
                    }
                }
            }
            FieldGroup::ArticleOrder => {
                let order = self.authoritative.article_order();
                self.working
                    .articles
                    .sort_by_key(|a| order.iter().position(|id| *id == a.id).unwrap_or(usize::MAX));
                self.working.renumber_articles();
            }
            FieldGroup::Relationships | FieldGroup::Gallery => {}
        }
        self.recompute();
    }

    /// Build the payload for saving a group.
    ///
    /// `Ok(None)` means the group has nothing to save.
    pub fn prepare_save(&self, group: FieldGroup) -> Result<Option<SaveRequest>, ValidationError> {
        if !group.is_drafted() || !self.dirty.get(group) {
            return Ok(None);
        }
        let request = match group {
            FieldGroup::Details => {
                let details = self.working.details.clone();
                if details.get(DetailField::Name).trim().is_empty() {
                    return Err(ValidationError::new(group, "الاسم مطلوب"));
                }
                SaveRequest::Details(details)
            }
            FieldGroup::Attributes => {
                let attributes = normalize_attributes(&self.working.attributes);
                if attributes.keys().any(|name| name.is_empty()) {
                    return Err(ValidationError::new(group, "اسم الخاصية مطلوب"));
                }
                SaveRequest::Attributes(attributes)
            }
            FieldGroup::Articles => {
                let changes: Vec<ArticleChange> = self
                    .working
                    .articles
                    .iter()
                    .filter(|article| {
                        self.authoritative
                            .article(article.id)
                            .is_some_and(|saved| !same_text(saved, article))
                    })
                    .map(|article| ArticleChange {
                        id: article.id,
                        update: UpdateArticle::from(article),
                    })
                    .collect();
                if changes.iter().any(|c| c.update.title.trim().is_empty()) {
                    return Err(ValidationError::new(group, "عنوان المقال مطلوب"));
                }
                if changes.is_empty() {
                    return Ok(None);
                }
                SaveRequest::Articles(changes)
            }
            FieldGroup::ArticleOrder => SaveRequest::ArticleOrder(self.working.article_order()),
            FieldGroup::Relationships | FieldGroup::Gallery => return Ok(None),
        };
        Ok(Some(request))
    }

    /// Record that the server accepted `request`.
    ///
    /// The authoritative copy takes the value that was sent, not the current
    /// working value, so edits made while the request was in flight stay dirty.
    pub fn commit_save(&mut self, request: &SaveRequest) {
        match request {
            SaveRequest::Details(details) => self.authoritative.details = details.clone(),
            SaveRequest::Attributes(attributes) => {
                self.authoritative.attributes = attributes.clone()
            }
            SaveRequest::Articles(changes) => {
                for change in changes {
                    self.apply_article_commit(change);
                }
            }
            SaveRequest::ArticleOrder(order) => {
                self.authoritative
                    .articles
                    .sort_by_key(|a| order.iter().position(|id| *id == a.id).unwrap_or(usize::MAX));
                self.authoritative.renumber_articles();
            }
        }
        self.recompute();
    }

    /// Record a single accepted article of a partially failed articles save.
    pub fn commit_article(&mut self, change: &ArticleChange) {
        self.apply_article_commit(change);
        self.recompute();
    }

    fn apply_article_commit(&mut self, change: &ArticleChange) {
        if let Some(saved) = self.authoritative.article_mut(change.id) {
            saved.title = change.update.title.clone();
            saved.content = change.update.content.clone();
        }
    }

    /// Add an article the server has already created, to both copies.
    pub fn insert_article(&mut self, article: Article) {
        self.authoritative.articles.push(article.clone());
        self.working.articles.push(article);
        self.recompute();
    }

    /// Drop an article the server has already deleted, from both copies.
    pub fn remove_article(&mut self, id: Uuid) {
        self.authoritative.articles.retain(|a| a.id != id);
        self.working.articles.retain(|a| a.id != id);
        self.recompute();
    }

    fn recompute(&mut self) {
        let (auth, work) = (&self.authoritative, &self.working);
        self.dirty = DirtyFlags {
            details: auth.details != work.details,
            attributes: normalize_attributes(&auth.attributes)
                != normalize_attributes(&work.attributes),
            article_content: !same_article_texts(auth, work),
            article_order: auth.article_order() != work.article_order(),
        };
    }
}

/// Set `order_index` from list position.
fn renumber(articles: &mut [Article]) {
    for (index, article) in articles.iter_mut().enumerate() {
        article.order_index = i32::try_from(index).unwrap_or(i32::MAX);
    }
}

fn same_text(a: &Article, b: &Article) -> bool {
    a.title == b.title && a.content == b.content
}

/// Titles and contents compared by id, independent of order.
fn same_article_texts(auth: &EntityDraft, work: &EntityDraft) -> bool {
    auth.articles.len() == work.articles.len()
        && work
            .articles
            .iter()
            .all(|w| auth.article(w.id).is_some_and(|a| same_text(a, w)))
}
