pub mod article;
pub mod attribute;
pub mod entity;
pub mod field_group;
pub mod gallery;
pub mod relationship;
