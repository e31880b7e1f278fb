use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque entity identifier.
///
/// New entities get a UUID v4 string; older data may carry any string
/// (the seed shelves use `"1"`, `"2"`, `"3"`).
pub type EntityId = String;

/// Generate a fresh identity for a client-created entity.
pub fn new_entity_id() -> EntityId {
    Uuid::new_v4().to_string()
}

/// Current time truncated to whole milliseconds, the precision of the
/// persisted layout.
pub fn now_millis() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

/// Center of a shelf in scene coordinates. `y` is vertical.
///
/// Serialized as `[x, y, z]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 3]", into = "[f64; 3]")]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Position {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Position of a shelf of the given height resting `elevation` above the ground.
    pub fn at_elevation(x: f64, z: f64, elevation: f64, height: f64) -> Self {
        Self::new(x, elevation + height / 2.0, z)
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

impl From<[f64; 3]> for Position {
    fn from([x, y, z]: [f64; 3]) -> Self {
        Self { x, y, z }
    }
}

impl From<Position> for [f64; 3] {
    fn from(p: Position) -> Self {
        [p.x, p.y, p.z]
    }
}

/// Box dimensions of a shelf. All components must be strictly positive.
///
/// Serialized as `[width, height, depth]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 3]", into = "[f64; 3]")]
pub struct Size {
    pub width: f64,
    pub height: f64,
    pub depth: f64,
}

impl Size {
    pub fn new(width: f64, height: f64, depth: f64) -> Self {
        Self {
            width,
            height,
            depth,
        }
    }
}

impl From<[f64; 3]> for Size {
    fn from([width, height, depth]: [f64; 3]) -> Self {
        Self {
            width,
            height,
            depth,
        }
    }
}

impl From<Size> for [f64; 3] {
    fn from(s: Size) -> Self {
        [s.width, s.height, s.depth]
    }
}

/// An inventory line stored on a shelf.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: EntityId,
    pub name: String,
    pub quantity: u32,
}

/// A shelf rendered as a box in the warehouse scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shelf {
    pub id: EntityId,
    pub position: Position,
    pub size: Size,
    pub color: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub items: Vec<Item>,
}

impl Shelf {
    /// Human-readable label, falling back to the identity.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }

    /// Height of the shelf's base above the ground plane.
    pub fn elevation(&self) -> f64 {
        self.position.y - self.size.height / 2.0
    }

    pub fn item(&self, item_id: &str) -> Option<&Item> {
        self.items.iter().find(|i| i.id == item_id)
    }

    pub fn item_mut(&mut self, item_id: &str) -> Option<&mut Item> {
        self.items.iter_mut().find(|i| i.id == item_id)
    }

    /// Total number of units stored on this shelf.
    pub fn total_quantity(&self) -> u64 {
        self.items.iter().map(|i| u64::from(i.quantity)).sum()
    }
}

/// An informational note, independent of shelves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub id: EntityId,
    pub title: String,
    pub content: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub is_read: bool,
    #[serde(
        default,
        with = "chrono::serde::ts_milliseconds_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub read_at: Option<DateTime<Utc>>,
}

/// Fields supplied when creating a shelf.
#[derive(Debug, Clone, PartialEq)]
pub struct NewShelf {
    pub position: Position,
    pub size: Size,
    pub color: String,
    pub name: Option<String>,
}

impl Default for NewShelf {
    /// A standard 1 x 2 x 0.5 shelf standing on the ground at the origin.
    fn default() -> Self {
        Self {
            position: Position::new(0.0, 1.0, 0.0),
            size: Size::new(1.0, 2.0, 0.5),
            color: "#8B4513".to_string(),
            name: None,
        }
    }
}

impl NewShelf {
    pub fn into_shelf(self, id: EntityId) -> Shelf {
        Shelf {
            id,
            position: self.position,
            size: self.size,
            color: self.color,
            name: self.name,
            items: Vec::new(),
        }
    }
}

/// Fields supplied when adding an item to a shelf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewItem {
    pub name: String,
    pub quantity: u32,
}

impl NewItem {
    pub fn new(name: impl Into<String>, quantity: u32) -> Self {
        Self {
            name: name.into(),
            quantity,
        }
    }

    pub fn into_item(self, id: EntityId) -> Item {
        Item {
            id,
            name: self.name,
            quantity: self.quantity,
        }
    }
}

/// Fields supplied when posting a note.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewNote {
    pub title: String,
    pub content: String,
}

impl NewNote {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
        }
    }

    /// Build an unread note created at `created_at`.
    pub fn into_note(self, id: EntityId, created_at: DateTime<Utc>) -> Note {
        Note {
            id,
            title: self.title,
            content: self.content,
            created_at,
            is_read: false,
            read_at: None,
        }
    }
}
