use std::{path::Path, sync::Arc};

use anyhow::{Context, Result, bail};
use dialoguer::Confirm;
use models::{
    attribute::{AttributeField, AttributeValue},
    entity::DetailField,
    field_group::FieldGroup,
    gallery::ImageUpload,
};
use serde::Serialize;
use services::services::{
    edit_buffer::{EntityDraft, FieldEdit},
    entity_editor::{EditorError, EntityEditor, SaveOutcome},
    query_cache::QueryCache,
    wiki_api::WikiBackend,
};
use tracing::info;

use crate::args::{
    ArticleCommand, Command, Direction, EditArgs, GalleryCommand, RelationCommand, Target,
    unescape_lines,
};

/// `show` output: the working copy plus the form view of its attributes
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EntityView {
    #[serde(flatten)]
    entity: EntityDraft,
    attribute_fields: Vec<AttributeField>,
    dirty_groups: Vec<FieldGroup>,
}

impl EntityView {
    async fn load(editor: &EntityEditor) -> Self {
        Self {
            entity: editor.snapshot().await,
            attribute_fields: editor.attribute_fields().await,
            dirty_groups: editor.dirty_groups().await,
        }
    }
}

/// Attach the toast text of an editor error as the top-level message.
trait UserFacing<T> {
    fn user_facing(self) -> Result<T>;
}

impl<T> UserFacing<T> for Result<T, EditorError> {
    fn user_facing(self) -> Result<T> {
        self.map_err(|e| {
            let message = e.user_message();
            anyhow::Error::new(e).context(message)
        })
    }
}

pub async fn run(command: Command, backend: Arc<dyn WikiBackend>, cache: QueryCache) -> Result<()> {
    let open = |target: Target| {
        EntityEditor::open(backend.clone(), cache.clone(), target.wiki, target.entity)
    };

    match command {
        Command::Show { target } => {
            let editor = open(target).await.user_facing()?;
            print_json(&EntityView::load(&editor).await)
        }
        Command::List { wiki } => {
            let entities = cache
                .entity_list(wiki, backend.list_entities(wiki))
                .await
                .map_err(EditorError::from)
                .user_facing()?;
            print_json(&*entities)
        }
        Command::Edit(args) => {
            let editor = open(args.target).await.user_facing()?;
            apply_edit_args(&editor, args).await;
            save_dirty(&editor).await?;
            print_json(&editor.snapshot().await)
        }
        Command::Article { command } => run_article(command, open).await,
        Command::Relation { command } => run_relation(command, open).await,
        Command::Gallery { command } => run_gallery(command, open).await,
        Command::Image { target, path } => {
            let editor = open(target).await.user_facing()?;
            editor
                .replace_entity_image(read_image(&path)?)
                .await
                .user_facing()?;
            print_json(&editor.snapshot().await)
        }
        Command::Delete { target, yes } => {
            let editor = open(target).await.user_facing()?;
            let name = editor.snapshot().await.details.name;
            if !yes
                && !Confirm::new()
                    .with_prompt(format!("Delete \"{name}\" and everything attached to it?"))
                    .default(false)
                    .interact()?
            {
                bail!("aborted");
            }
            editor.delete_entity().await.user_facing()?;
            info!(entity_id = %target.entity, "Deleted");
            Ok(())
        }
    }
}

async fn apply_edit_args(editor: &EntityEditor, args: EditArgs) {
    let details = [
        (DetailField::Name, args.name),
        (DetailField::Role, args.role),
        (DetailField::ShortDescription, args.short_description),
        (DetailField::Description, args.description),
        (DetailField::Section, args.section),
    ];
    for (field, value) in details {
        if let Some(value) = value {
            editor.edit(FieldEdit::Detail { field, value }).await;
        }
    }
    for (from, to) in args.rename_attrs {
        editor.edit(FieldEdit::RenameAttribute { from, to }).await;
    }
    for (name, value) in args.attrs {
        editor
            .edit(FieldEdit::Attribute {
                name,
                value: AttributeValue::Scalar(value),
            })
            .await;
    }
    for (name, text) in args.list_attrs {
        editor
            .edit(FieldEdit::AttributeText {
                name,
                text: unescape_lines(&text),
            })
            .await;
    }
    for (name, item) in args.add_items {
        // text of an unknown or scalar attribute starts a new list
        let text = match editor.attribute_text(&name).await {
            Some(text) if !text.is_empty() => format!("{text}\n{item}"),
            _ => item,
        };
        editor.edit(FieldEdit::AttributeText { name, text }).await;
    }
    for name in args.remove_attrs {
        editor.edit(FieldEdit::RemoveAttribute { name }).await;
    }
}

/// Save every dirty group, reporting each; fails if any group failed.
async fn save_dirty(editor: &EntityEditor) -> Result<()> {
    let results = editor.save_all().await;
    if results.is_empty() {
        eprintln!("{}", SaveOutcome::NothingToSave.notice().message);
        return Ok(());
    }

    let mut failed = Vec::new();
    for (group, result) in results {
        match result {
            Ok(outcome) => eprintln!("{group}: {}", outcome.notice().message),
            Err(e) => {
                eprintln!("{group}: {}", e.user_message());
                failed.push(group);
            }
        }
    }
    if !failed.is_empty() {
        bail!("failed to save: {}", join_groups(&failed));
    }
    Ok(())
}

async fn save_one(editor: &EntityEditor, group: FieldGroup) -> Result<()> {
    let outcome = editor.save_group(group).await.user_facing()?;
    eprintln!("{group}: {}", outcome.notice().message);
    Ok(())
}

async fn run_article<F, Fut>(command: ArticleCommand, open: F) -> Result<()>
where
    F: Fn(Target) -> Fut,
    Fut: Future<Output = Result<EntityEditor, EditorError>>,
{
    match command {
        ArticleCommand::Add {
            target,
            title,
            content,
        } => {
            let content = content.read()?.unwrap_or_default();
            let editor = open(target).await.user_facing()?;
            let article = editor.add_article(title, content).await.user_facing()?;
            print_json(&article)
        }
        ArticleCommand::Edit {
            target,
            id,
            title,
            content,
        } => {
            let content = content.read()?;
            let editor = open(target).await.user_facing()?;
            let mut applied = true;
            if let Some(title) = title {
                applied &= editor.edit(FieldEdit::ArticleTitle { id, title }).await;
            }
            if let Some(content) = content {
                applied &= editor.edit(FieldEdit::ArticleContent { id, content }).await;
            }
            if !applied {
                bail!("no article {id} on this entity");
            }
            save_one(&editor, FieldGroup::Articles).await?;
            print_json(&editor.snapshot().await.articles)
        }
        ArticleCommand::Delete { target, id } => {
            let editor = open(target).await.user_facing()?;
            editor.delete_article(id).await.user_facing()?;
            print_json(&editor.snapshot().await.articles)
        }
        ArticleCommand::Move {
            target,
            id,
            direction,
        } => {
            let editor = open(target).await.user_facing()?;
            let moved = match direction {
                Direction::Up => editor.move_article_up(id).await,
                Direction::Down => editor.move_article_down(id).await,
            };
            if moved {
                save_one(&editor, FieldGroup::ArticleOrder).await?;
            } else {
                eprintln!("{}", SaveOutcome::NothingToSave.notice().message);
            }
            print_json(&editor.snapshot().await.articles)
        }
    }
}

async fn run_relation<F, Fut>(command: RelationCommand, open: F) -> Result<()>
where
    F: Fn(Target) -> Fut,
    Fut: Future<Output = Result<EntityEditor, EditorError>>,
{
    let target = match &command {
        RelationCommand::Add { target, .. }
        | RelationCommand::Edit { target, .. }
        | RelationCommand::Delete { target, .. } => *target,
    };
    let editor = open(target).await.user_facing()?;
    let result = match command {
        RelationCommand::Add {
            to,
            label,
            reverse_label,
            ..
        } => editor.add_relationship(to, label, reverse_label).await,
        RelationCommand::Edit {
            id,
            label,
            reverse_label,
            ..
        } => editor.update_relationship(id, label, reverse_label).await,
        RelationCommand::Delete { id, .. } => editor.delete_relationship(id).await,
    };
    result.user_facing()?;
    print_json(&editor.snapshot().await.relationships)
}

async fn run_gallery<F, Fut>(command: GalleryCommand, open: F) -> Result<()>
where
    F: Fn(Target) -> Fut,
    Fut: Future<Output = Result<EntityEditor, EditorError>>,
{
    let target = match &command {
        GalleryCommand::Upload { target, .. }
        | GalleryCommand::Caption { target, .. }
        | GalleryCommand::Delete { target, .. } => *target,
    };
    let editor = open(target).await.user_facing()?;
    let result = match command {
        GalleryCommand::Upload { path, caption, .. } => {
            editor
                .upload_gallery_image(read_image(&path)?, caption)
                .await
        }
        GalleryCommand::Caption { id, caption, .. } => {
            editor.update_gallery_caption(id, caption).await
        }
        GalleryCommand::Delete { id, .. } => editor.delete_gallery_image(id).await,
    };
    result.user_facing()?;
    print_json(&editor.snapshot().await.gallery)
}

fn read_image(path: &Path) -> Result<ImageUpload> {
    let bytes =
        std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string());
    Ok(ImageUpload::from_file_name(file_name, bytes))
}

fn join_groups(groups: &[FieldGroup]) -> String {
    groups
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
