use std::path::PathBuf;

use clap::Subcommand;
use warehouse_domain::{ItemPatch, NewItem, NewNote, NewShelf, Position, Shelf, ShelfPatch, Size};
use warehouse_sync::Warehouse;

type CliResult = Result<(), Box<dyn std::error::Error>>;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List shelves and their items
    Show {
        /// Print the collection as JSON
        #[arg(long)]
        json: bool,
    },
    /// Find items by name
    Search { query: String },
    /// Add a shelf
    AddShelf {
        #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
        x: f64,
        #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
        z: f64,
        #[arg(long, default_value_t = 1.0)]
        width: f64,
        #[arg(long, default_value_t = 2.0)]
        height: f64,
        #[arg(long, default_value_t = 0.5)]
        depth: f64,
        /// Height of the shelf base above the ground
        #[arg(long, default_value_t = 0.0)]
        elevation: f64,
        #[arg(long, default_value = "#8B4513")]
        color: String,
        #[arg(long)]
        name: Option<String>,
    },
    /// Drag a shelf to a ground point, snapping to matching neighbours
    Move {
        id: String,
        #[arg(allow_negative_numbers = true)]
        x: f64,
        #[arg(allow_negative_numbers = true)]
        z: f64,
    },
    /// Change a shelf's dimensions
    Resize {
        id: String,
        width: f64,
        height: f64,
        depth: f64,
        #[arg(long, default_value_t = 0.0)]
        elevation: f64,
    },
    /// Recolour or rename a shelf
    EditShelf {
        id: String,
        #[arg(long)]
        color: Option<String>,
        #[arg(long, conflicts_with = "clear_name")]
        name: Option<String>,
        #[arg(long)]
        clear_name: bool,
    },
    RemoveShelf { id: String },
    AddItem {
        shelf: String,
        name: String,
        quantity: u32,
    },
    SetItem {
        shelf: String,
        item: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        quantity: Option<u32>,
    },
    RemoveItem { shelf: String, item: String },
    /// Post a note
    Note { title: String, content: String },
    /// List notes, newest first
    Notes,
    /// Mark a note as read
    Read { id: String },
    RemoveNote { id: String },
    /// Write a backup file
    Export {
        #[arg(long, default_value = ".")]
        dir: PathBuf,
    },
    /// Restore shelves and append notes from a backup file
    Import { file: PathBuf },
    /// Print updates as remote changes arrive, until Ctrl-C
    Watch,
}

pub async fn run(warehouse: &Warehouse, command: Command) -> CliResult {
    let shelves = &warehouse.shelves;
    let notes = &warehouse.notes;

    match command {
        Command::Show { json } => {
            let snapshot = shelves.snapshot();
            if json {
                println!("{}", serde_json::to_string_pretty(&snapshot)?);
            } else {
                print_shelves(&snapshot);
            }
        }
        Command::Search { query } => {
            let hits = shelves.search_items(&query);
            if hits.is_empty() {
                println!("No items match '{}'", query);
            }
            for hit in hits {
                println!("{:>6} x {}  (shelf {})", hit.item.quantity, hit.item.name, hit.shelf_id);
            }
        }
        Command::AddShelf {
            x,
            z,
            width,
            height,
            depth,
            elevation,
            color,
            name,
        } => {
            let id = shelves
                .create(NewShelf {
                    position: Position::at_elevation(x, z, elevation, height),
                    size: Size::new(width, height, depth),
                    color,
                    name,
                })
                .await?;
            println!("{}", id);
        }
        Command::Move { id, x, z } => {
            report(shelves.drag_to(&id, x, z).await?, "shelf", &id)?;
            if let Some(shelf) = shelves.get(&id) {
                let p = shelf.position;
                println!("{} at ({}, {}, {})", shelf.display_name(), p.x, p.y, p.z);
            }
        }
        Command::Resize {
            id,
            width,
            height,
            depth,
            elevation,
        } => {
            let size = Size::new(width, height, depth);
            report(shelves.resize(&id, size, elevation).await?, "shelf", &id)?;
        }
        Command::EditShelf {
            id,
            color,
            name,
            clear_name,
        } => {
            let patch = ShelfPatch {
                color,
                name: if clear_name { Some(None) } else { name.map(Some) },
                ..Default::default()
            };
            report(shelves.update(&id, patch).await?, "shelf", &id)?;
        }
        Command::RemoveShelf { id } => report(shelves.delete(&id).await?, "shelf", &id)?,
        Command::AddItem {
            shelf,
            name,
            quantity,
        } => match shelves.add_item(&shelf, NewItem::new(name, quantity)).await? {
            Some(id) => println!("{}", id),
            None => return Err(format!("no shelf with id {}", shelf).into()),
        },
        Command::SetItem {
            shelf,
            item,
            name,
            quantity,
        } => {
            let patch = ItemPatch { name, quantity };
            report(shelves.update_item(&shelf, &item, patch).await?, "item", &item)?;
        }
        Command::RemoveItem { shelf, item } => {
            report(shelves.delete_item(&shelf, &item).await?, "item", &item)?
        }
        Command::Note { title, content } => {
            println!("{}", notes.create(NewNote::new(title, content)).await?);
        }
        Command::Notes => {
            println!("{} unread", notes.unread_count());
            for note in notes.snapshot() {
                let marker = if note.is_read { " " } else { "*" };
                println!(
                    "{} {}  {}  [{}]",
                    marker,
                    note.created_at.format("%Y-%m-%d %H:%M"),
                    note.title,
                    note.id
                );
                println!("    {}", note.content);
            }
        }
        Command::Read { id } => report(notes.mark_read(&id).await?, "note", &id)?,
        Command::RemoveNote { id } => report(notes.delete(&id).await?, "note", &id)?,
        Command::Export { dir } => {
            let path = warehouse.transfer().export_to_dir(&dir)?;
            println!("{}", path.display());
        }
        Command::Import { file } => {
            let summary = warehouse.transfer().import_file(&file).await?;
            if let Some(count) = summary.shelves {
                println!("Restored {} shelves", count);
            }
            println!("Added {} notes", summary.notes_added);
            for (title, error) in summary.note_failures {
                println!("Skipped note '{}': {}", title, error);
            }
        }
        Command::Watch => watch(warehouse).await?,
    }
    Ok(())
}

fn report(found: bool, kind: &str, id: &str) -> CliResult {
    if found {
        Ok(())
    } else {
        Err(format!("no {} with id {}", kind, id).into())
    }
}

fn print_shelves(shelves: &[Shelf]) {
    for shelf in shelves {
        let p = shelf.position;
        let s = shelf.size;
        println!(
            "{} [{}]  pos ({}, {}, {})  size {}x{}x{}  {}",
            shelf.display_name(),
            shelf.id,
            p.x,
            p.y,
            p.z,
            s.width,
            s.height,
            s.depth,
            shelf.color
        );
        for item in &shelf.items {
            println!("    {:>6} x {}  [{}]", item.quantity, item.name, item.id);
        }
    }
}

async fn watch(warehouse: &Warehouse) -> CliResult {
    if !warehouse.is_online() {
        return Err("watch needs a configured remote".into());
    }
    let (_shelf_watch, _note_watch) = warehouse.watch().await?;
    let mut shelf_status = warehouse.shelves.watch_status();
    let mut note_status = warehouse.notes.watch_status();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = shelf_status.changed() => {
                changed?;
                let shelves = warehouse.shelves.snapshot();
                let items: usize = shelves.iter().map(|s| s.items.len()).sum();
                println!("shelves: {} shelves, {} items", shelves.len(), items);
            }
            changed = note_status.changed() => {
                changed?;
                println!("notes: {} unread of {}", warehouse.notes.unread_count(), warehouse.notes.snapshot().len());
            }
        }
    }
    Ok(())
}
