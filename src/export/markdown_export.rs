use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::core::model::{Room, RoomRegistry};
use crate::export::json_export::write_atomic;
use crate::export::Exporter;

/// Human readable registry table, `rooms.md`.
#[derive(Debug, Clone)]
pub struct MarkdownExporter {
    out_dir: PathBuf,
}

impl MarkdownExporter {
    pub fn new(out_dir: PathBuf) -> Self {
        Self { out_dir }
    }

    pub fn render(registry: &RoomRegistry) -> String {
        let mut out = String::from("# Rooms\n\n");
        if let Some(source) = &registry.source {
            out.push_str(&format!("Source: `{source}`\n\n"));
        }
        let q = &registry.quality;
        out.push_str(&format!(
            "{} rooms, average confidence {:.3} ({} high, {} medium, {} low, {} to review)\n\n",
            registry.rooms.len(),
            q.average_confidence,
            q.rooms_high_confidence,
            q.rooms_medium_confidence,
            q.rooms_low_confidence,
            q.rooms_needing_review
        ));
        out.push_str("| ID | Name | Block | Floor | Confidence | Pages | Review |\n");
        out.push_str("|----|------|-------|-------|------------|-------|--------|\n");
        for room in &registry.rooms {
            out.push_str(&Self::row(room));
        }
        out
    }

    fn row(room: &Room) -> String {
        let pages = room
            .source_pages
            .iter()
            .map(u32::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        let floor = room.floor.map(|f| f.to_string()).unwrap_or_default();
        format!(
            "| {} | {} | {} | {} | {:.2} | {} | {} |\n",
            escape_cell(&room.id),
            escape_cell(&room.name),
            escape_cell(&room.block),
            floor,
            room.confidence,
            pages,
            if room.needs_review { "yes" } else { "" }
        )
    }
}

fn escape_cell(text: &str) -> String {
    text.replace('|', "\\|")
}

impl Exporter<RoomRegistry> for MarkdownExporter {
    fn export(&self, registry: &RoomRegistry) -> Result<()> {
        fs::create_dir_all(&self.out_dir)
            .with_context(|| format!("failed to create {}", self.out_dir.display()))?;
        write_atomic(&self.out_dir.join("rooms.md"), Self::render(registry).as_bytes())
    }
}
