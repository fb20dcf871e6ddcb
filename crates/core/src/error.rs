use crate::types::EntityId;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: EntityId },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),
}

impl CoreError {
    /// Shorthand for a [`CoreError::NotFound`] on a content unit.
    pub fn unit_not_found(id: impl Into<EntityId>) -> Self {
        Self::NotFound {
            entity: "ContentUnit",
            id: id.into(),
        }
    }
}
