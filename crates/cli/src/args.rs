use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use thiserror::Error;
use url::Url;
use uuid::Uuid;

#[derive(Debug, Parser)]
#[command(name = "sard-wiki")]
#[command(version, about = "Edit the wiki entities of a Sard novel")]
pub struct Cli {
    /// Config file (defaults to the user config dir)
    #[arg(long, global = true, env = "SARD_CONFIG", value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Base URL of the API
    #[arg(long, global = true, value_name = "URL")]
    pub api_url: Option<Url>,

    /// Bearer token
    #[arg(long, global = true, env = "SARD_API_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, Args)]
pub struct Target {
    /// Wiki (novel) id
    #[arg(long)]
    pub wiki: Uuid,
    /// Entity id
    #[arg(long)]
    pub entity: Uuid,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Print the entity as JSON
    Show {
        #[command(flatten)]
        target: Target,
    },
    /// List the entities of a wiki
    List {
        #[arg(long)]
        wiki: Uuid,
    },
    /// Edit details and attributes, then save what changed
    Edit(EditArgs),
    /// Articles of an entity
    Article {
        #[command(subcommand)]
        command: ArticleCommand,
    },
    /// Relationships to other entities
    Relation {
        #[command(subcommand)]
        command: RelationCommand,
    },
    /// Gallery images
    Gallery {
        #[command(subcommand)]
        command: GalleryCommand,
    },
    /// Replace the main picture of the entity
    Image {
        #[command(flatten)]
        target: Target,
        path: PathBuf,
    },
    /// Delete the entity
    Delete {
        #[command(flatten)]
        target: Target,
        /// Do not ask for confirmation
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Debug, Args)]
pub struct EditArgs {
    #[command(flatten)]
    pub target: Target,
    #[arg(long)]
    pub name: Option<String>,
    #[arg(long)]
    pub role: Option<String>,
    #[arg(long)]
    pub short_description: Option<String>,
    #[arg(long)]
    pub description: Option<String>,
    #[arg(long)]
    pub section: Option<String>,
    /// Scalar attribute, `NAME=VALUE`
    #[arg(long = "attr", value_name = "NAME=VALUE", value_parser = parse_pair)]
    pub attrs: Vec<(String, String)>,
    /// List attribute, `NAME=ITEMS` with items on separate lines (`\n` allowed)
    #[arg(long = "list-attr", value_name = "NAME=ITEMS", value_parser = parse_pair)]
    pub list_attrs: Vec<(String, String)>,
    /// Rename an attribute, `OLD=NEW`
    #[arg(long = "rename-attr", value_name = "OLD=NEW", value_parser = parse_pair)]
    pub rename_attrs: Vec<(String, String)>,
    /// Append an item to a list attribute, `NAME=ITEM`
    #[arg(long = "add-item", value_name = "NAME=ITEM", value_parser = parse_pair)]
    pub add_items: Vec<(String, String)>,
    #[arg(long = "remove-attr", value_name = "NAME")]
    pub remove_attrs: Vec<String>,
}

#[derive(Debug, Subcommand)]
pub enum ArticleCommand {
    Add {
        #[command(flatten)]
        target: Target,
        #[arg(long)]
        title: String,
        #[command(flatten)]
        content: ContentSource,
    },
    Edit {
        #[command(flatten)]
        target: Target,
        #[arg(long)]
        id: Uuid,
        #[arg(long)]
        title: Option<String>,
        #[command(flatten)]
        content: ContentSource,
    },
    Delete {
        #[command(flatten)]
        target: Target,
        #[arg(long)]
        id: Uuid,
    },
    /// Move an article one position and save the new order
    Move {
        #[command(flatten)]
        target: Target,
        #[arg(long)]
        id: Uuid,
        #[arg(long, value_enum)]
        direction: Direction,
    },
}

#[derive(Debug, Clone, Args)]
pub struct ContentSource {
    /// Article markup
    #[arg(long, conflicts_with = "content_file")]
    pub content: Option<String>,
    /// Read the article markup from a file
    #[arg(long, value_name = "PATH")]
    pub content_file: Option<PathBuf>,
}

impl ContentSource {
    pub fn read(&self) -> std::io::Result<Option<String>> {
        match (&self.content, &self.content_file) {
            (Some(text), _) => Ok(Some(text.clone())),
            (None, Some(path)) => std::fs::read_to_string(path).map(Some),
            (None, None) => Ok(None),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Direction {
    Up,
    Down,
}

#[derive(Debug, Subcommand)]
pub enum RelationCommand {
    Add {
        #[command(flatten)]
        target: Target,
        /// Id of the related entity
        #[arg(long)]
        to: Uuid,
        #[arg(long)]
        label: String,
        #[arg(long)]
        reverse_label: Option<String>,
    },
    Edit {
        #[command(flatten)]
        target: Target,
        #[arg(long)]
        id: Uuid,
        #[arg(long)]
        label: String,
        #[arg(long)]
        reverse_label: Option<String>,
    },
    Delete {
        #[command(flatten)]
        target: Target,
        #[arg(long)]
        id: Uuid,
    },
}

#[derive(Debug, Subcommand)]
pub enum GalleryCommand {
    Upload {
        #[command(flatten)]
        target: Target,
        path: PathBuf,
        #[arg(long)]
        caption: Option<String>,
    },
    Caption {
        #[command(flatten)]
        target: Target,
        #[arg(long)]
        id: Uuid,
        caption: String,
    },
    Delete {
        #[command(flatten)]
        target: Target,
        #[arg(long)]
        id: Uuid,
    },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PairError {
    #[error("expected NAME=VALUE, got `{0}`")]
    MissingSeparator(String),
    #[error("name must not be empty")]
    EmptyName,
}

/// `NAME=VALUE`; only the first `=` separates, so values may contain `=`.
pub fn parse_pair(raw: &str) -> Result<(String, String), PairError> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| PairError::MissingSeparator(raw.to_string()))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(PairError::EmptyName);
    }
    Ok((name.to_string(), value.to_string()))
}

/// Expand the two-character `\n` escape typed on a shell line.
pub fn unescape_lines(text: &str) -> String {
    text.replace("\\n", "\n")
}
