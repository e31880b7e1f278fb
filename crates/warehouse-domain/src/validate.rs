use crate::model::{NewItem, NewNote, NewShelf, Position, Size};
use crate::patch::{ItemPatch, NotePatch, ShelfPatch};

/// A field value rejected before any mutation is attempted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("field '{field}': {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Input checks shared by create and update requests.
pub trait Validate {
    fn validate(&self) -> Result<(), ValidationError>;
}

fn require_text(field: &str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new(field, "must not be empty"));
    }
    Ok(())
}

fn check_position(position: &Position) -> Result<(), ValidationError> {
    if !position.is_finite() {
        return Err(ValidationError::new("position", "components must be finite"));
    }
    Ok(())
}

fn check_size(size: &Size) -> Result<(), ValidationError> {
    for (field, value) in [
        ("size.width", size.width),
        ("size.height", size.height),
        ("size.depth", size.depth),
    ] {
        if !value.is_finite() || value <= 0.0 {
            return Err(ValidationError::new(field, "must be greater than zero"));
        }
    }
    Ok(())
}

fn check_quantity(quantity: u32) -> Result<(), ValidationError> {
    if quantity < 1 {
        return Err(ValidationError::new("quantity", "must be at least 1"));
    }
    Ok(())
}

impl Validate for NewShelf {
    fn validate(&self) -> Result<(), ValidationError> {
        check_position(&self.position)?;
        check_size(&self.size)?;
        require_text("color", &self.color)
    }
}

impl Validate for ShelfPatch {
    fn validate(&self) -> Result<(), ValidationError> {
        if let Some(position) = &self.position {
            check_position(position)?;
        }
        if let Some(size) = &self.size {
            check_size(size)?;
        }
        if let Some(color) = &self.color {
            require_text("color", color)?;
        }
        Ok(())
    }
}

impl Validate for NewItem {
    fn validate(&self) -> Result<(), ValidationError> {
        require_text("name", &self.name)?;
        check_quantity(self.quantity)
    }
}

impl Validate for ItemPatch {
    fn validate(&self) -> Result<(), ValidationError> {
        if let Some(name) = &self.name {
            require_text("name", name)?;
        }
        if let Some(quantity) = self.quantity {
            check_quantity(quantity)?;
        }
        Ok(())
    }
}

impl Validate for NewNote {
    fn validate(&self) -> Result<(), ValidationError> {
        require_text("title", &self.title)?;
        require_text("content", &self.content)
    }
}

impl Validate for NotePatch {
    fn validate(&self) -> Result<(), ValidationError> {
        if let Some(title) = &self.title {
            require_text("title", title)?;
        }
        if let Some(content) = &self.content {
            require_text("content", content)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn default_shelf_is_valid() {
        assert!(NewShelf::default().validate().is_ok());
    }

    #[rstest]
    #[case([0.0, 2.0, 0.5], "size.width")]
    #[case([1.0, -2.0, 0.5], "size.height")]
    #[case([1.0, 2.0, f64::NAN], "size.depth")]
    fn rejects_non_positive_dimensions(#[case] size: [f64; 3], #[case] field: &str) {
        let shelf = NewShelf {
            size: size.into(),
            ..Default::default()
        };
        let err = shelf.validate().unwrap_err();
        assert_eq!(err.field, field);
    }

    #[rstest]
    #[case("", 3, "name")]
    #[case("   ", 3, "name")]
    #[case("Martello", 0, "quantity")]
    fn rejects_bad_items(#[case] name: &str, #[case] quantity: u32, #[case] field: &str) {
        let err = NewItem::new(name, quantity).validate().unwrap_err();
        assert_eq!(err.field, field);
    }

    #[test]
    fn rejects_empty_note_content() {
        let err = NewNote::new("Titolo", "").validate().unwrap_err();
        assert_eq!(err.field, "content");
        assert!(err.to_string().contains("content"));
    }

    #[test]
    fn empty_patches_are_valid() {
        assert!(ShelfPatch::default().validate().is_ok());
        assert!(ItemPatch::default().validate().is_ok());
        assert!(NotePatch::default().validate().is_ok());
    }

    #[test]
    fn patch_rejects_zero_quantity() {
        assert!(ItemPatch::quantity(0).validate().is_err());
    }
}
