pub mod attribute_text;
pub mod auth;
pub mod config;
pub mod edit_buffer;
pub mod entity_editor;
pub mod query_cache;
pub mod wiki_api;
