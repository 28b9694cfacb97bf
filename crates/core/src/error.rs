use crate::lifecycle::ItemStatus;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Item not found: {0}")]
    ItemNotFound(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Invalid transition for item {item_id}: {from} -> {to}")]
    InvalidTransition {
        item_id: String,
        from: ItemStatus,
        to: ItemStatus,
    },

    #[error("Image error: {0}")]
    Image(String),
}

impl From<image::ImageError> for CoreError {
    fn from(err: image::ImageError) -> Self {
        Self::Image(err.to_string())
    }
}
