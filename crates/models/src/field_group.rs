use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};
use ts_rs::TS;

/// Granularity at which an entity is dirty-tracked and saved
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS, EnumString, Display, EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FieldGroup {
    Details,
    Attributes,
    /// Article titles and contents
    Articles,
    /// Position of articles relative to each other
    ArticleOrder,
    Relationships,
    Gallery,
}

impl FieldGroup {
    /// Groups that hold a local draft and are saved in batch.
    ///
    /// Relationships and gallery images are persisted as soon as they are
    /// changed, so they never carry unsaved state.
    pub fn is_drafted(self) -> bool {
        !matches!(self, Self::Relationships | Self::Gallery)
    }
}
