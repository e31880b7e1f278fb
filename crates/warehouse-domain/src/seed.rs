use crate::model::{Item, Position, Shelf, Size};

fn item(id: &str, name: &str, quantity: u32) -> Item {
    Item {
        id: id.to_string(),
        name: name.to_string(),
        quantity,
    }
}

fn shelf(id: &str, x: f64, color: &str, items: Vec<Item>) -> Shelf {
    Shelf {
        id: id.to_string(),
        position: Position::new(x, 1.0, 0.0),
        size: Size::new(1.0, 2.0, 0.5),
        color: color.to_string(),
        name: None,
        items,
    }
}

/// Sample warehouse installed the very first time an offline store loads.
pub fn seed_shelves() -> Vec<Shelf> {
    vec![
        shelf(
            "1",
            -3.0,
            "#8B4513",
            vec![
                item("item1", "Set di cacciaviti", 15),
                item("item2", "Martello", 8),
            ],
        ),
        shelf(
            "2",
            0.0,
            "#A0522D",
            vec![
                item("item3", "Barattoli di vernice", 24),
                item("item4", "Pennelli", 30),
            ],
        ),
        shelf("3", 3.0, "#8B4513", vec![item("item5", "Scatola di chiodi", 50)]),
    ]
}
