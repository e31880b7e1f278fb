//! Partial updates.
//!
//! Every field is optional and `None` means "leave unchanged". Fields that
//! can be cleared use `Option<Option<T>>`: `Some(None)` clears the value.
//! Each patch can produce its inverse against the current entity, which
//! restores exactly the fields the patch touches.

use chrono::{DateTime, Utc};

use crate::model::{Item, Note, Position, Shelf, Size};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShelfPatch {
    pub position: Option<Position>,
    pub size: Option<Size>,
    pub color: Option<String>,
    pub name: Option<Option<String>>,
}

impl ShelfPatch {
    pub fn position(position: Position) -> Self {
        Self {
            position: Some(position),
            ..Default::default()
        }
    }

    pub fn geometry(position: Position, size: Size) -> Self {
        Self {
            position: Some(position),
            size: Some(size),
            ..Default::default()
        }
    }

    pub fn color(color: impl Into<String>) -> Self {
        Self {
            color: Some(color.into()),
            ..Default::default()
        }
    }

    pub fn name(name: Option<String>) -> Self {
        Self {
            name: Some(name),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.position.is_none() && self.size.is_none() && self.color.is_none() && self.name.is_none()
    }

    pub fn apply(&self, shelf: &mut Shelf) {
        if let Some(position) = self.position {
            shelf.position = position;
        }
        if let Some(size) = self.size {
            shelf.size = size;
        }
        if let Some(color) = &self.color {
            shelf.color = color.clone();
        }
        if let Some(name) = &self.name {
            shelf.name = name.clone();
        }
    }

    /// The patch that undoes `self` when applied after it.
    pub fn inverse(&self, shelf: &Shelf) -> Self {
        Self {
            position: self.position.map(|_| shelf.position),
            size: self.size.map(|_| shelf.size),
            color: self.color.as_ref().map(|_| shelf.color.clone()),
            name: self.name.as_ref().map(|_| shelf.name.clone()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemPatch {
    pub name: Option<String>,
    pub quantity: Option<u32>,
}

impl ItemPatch {
    pub fn quantity(quantity: u32) -> Self {
        Self {
            quantity: Some(quantity),
            ..Default::default()
        }
    }

    pub fn name(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.quantity.is_none()
    }

    pub fn apply(&self, item: &mut Item) {
        if let Some(name) = &self.name {
            item.name = name.clone();
        }
        if let Some(quantity) = self.quantity {
            item.quantity = quantity;
        }
    }

    pub fn inverse(&self, item: &Item) -> Self {
        Self {
            name: self.name.as_ref().map(|_| item.name.clone()),
            quantity: self.quantity.map(|_| item.quantity),
        }
    }
}

/// Edits to a note's text. The read flag is not editable here; it only
/// changes through [`ReadState::read`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotePatch {
    pub title: Option<String>,
    pub content: Option<String>,
}

impl NotePatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.content.is_none()
    }

    pub fn apply(&self, note: &mut Note) {
        if let Some(title) = &self.title {
            note.title = title.clone();
        }
        if let Some(content) = &self.content {
            note.content = content.clone();
        }
    }

    pub fn inverse(&self, note: &Note) -> Self {
        Self {
            title: self.title.as_ref().map(|_| note.title.clone()),
            content: self.content.as_ref().map(|_| note.content.clone()),
        }
    }
}

/// A note's read flag together with its timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadState {
    is_read: bool,
    read_at: Option<DateTime<Utc>>,
}

impl ReadState {
    /// The unread to read transition at `at`.
    pub fn read(at: DateTime<Utc>) -> Self {
        Self {
            is_read: true,
            read_at: Some(at),
        }
    }

    /// The state `note` is in now, for restoring it later.
    pub fn of(note: &Note) -> Self {
        Self {
            is_read: note.is_read,
            read_at: note.read_at,
        }
    }

    pub fn apply(&self, note: &mut Note) {
        note.is_read = self.is_read;
        note.read_at = self.read_at;
    }
}
