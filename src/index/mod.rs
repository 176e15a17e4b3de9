pub mod query;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::core::model::{DocumentClassification, PageType, Room, RoomRegistry};
use crate::devis::references::compact;
use crate::devis::{LocalReference, SpecDocument};
use crate::rooms::matcher::normalize;

pub use query::{search, IndexConfig, SearchFilters, SearchHit};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoomEntry {
    pub id: String,
    pub name: String,
    pub number: String,
    pub block: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub floor: Option<u32>,
    pub source_pages: Vec<u32>,
    pub primary_source: u32,
    pub confidence: f32,
    /// Places the specification cites this room.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub spec_references: Vec<SpecMention>,
    pub search_text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SpecMention {
    pub page: u32,
    pub context: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PageEntry {
    pub page: u32,
    pub page_type: PageType,
    pub score: u32,
    pub search_text: String,
}

/// A MasterFormat section of the specification. `page` is the specification
/// page, not a plan page.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SectionEntry {
    pub code: String,
    pub division: String,
    pub title: String,
    pub page: u32,
    pub search_text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProductEntry {
    pub manufacturer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_type: Option<String>,
    pub page: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub csi_section: Option<String>,
    pub search_text: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Room,
    Page,
    Section,
    Product,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum IndexEntry {
    Room(RoomEntry),
    Page(PageEntry),
    Section(SectionEntry),
    Product(ProductEntry),
}

impl IndexEntry {
    pub fn kind(&self) -> EntryKind {
        match self {
            IndexEntry::Room(_) => EntryKind::Room,
            IndexEntry::Page(_) => EntryKind::Page,
            IndexEntry::Section(_) => EntryKind::Section,
            IndexEntry::Product(_) => EntryKind::Product,
        }
    }

    pub fn search_text(&self) -> &str {
        match self {
            IndexEntry::Room(room) => &room.search_text,
            IndexEntry::Page(page) => &page.search_text,
            IndexEntry::Section(section) => &section.search_text,
            IndexEntry::Product(product) => &product.search_text,
        }
    }

    /// Only rooms carry detection uncertainty.
    pub fn confidence(&self) -> f32 {
        match self {
            IndexEntry::Room(room) => room.confidence,
            _ => 1.0,
        }
    }

    /// Section and product pages count in the specification document.
    pub fn on_page(&self, page: u32) -> bool {
        match self {
            IndexEntry::Room(room) => room.source_pages.contains(&page),
            IndexEntry::Page(entry) => entry.page == page,
            IndexEntry::Section(entry) => entry.page == page,
            IndexEntry::Product(entry) => entry.page == page,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RagIndex {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub entries: Vec<IndexEntry>,
}

/// Builds the searchable index. Every entry points back to at least one
/// page; rooms without a source page are left out. Rooms cited in the
/// specification carry those citations and their text.
pub fn build_index(
    registry: &RoomRegistry,
    classification: Option<&DocumentClassification>,
    devis: Option<&SpecDocument>,
) -> RagIndex {
    let mut entries: Vec<IndexEntry> = Vec::new();
    let references: &[LocalReference] = devis
        .map(|doc| doc.local_references.as_slice())
        .unwrap_or_default();

    for room in &registry.rooms {
        if room.source_pages.is_empty() {
            debug!(id = %room.id, "room has no source page, not indexed");
            continue;
        }
        let mut entry = room_entry(room);
        attach_references(&mut entry, references);
        entries.push(IndexEntry::Room(entry));
    }

    if let Some(classification) = classification {
        entries.extend(classification.pages.iter().map(|page| {
            IndexEntry::Page(PageEntry {
                page: page.page,
                page_type: page.page_type,
                score: page.scores.get(page.page_type),
                search_text: search_text(&format!(
                    "page {} {}",
                    page.page,
                    page_type_terms(page.page_type)
                )),
            })
        }));
    }

    if let Some(doc) = devis {
        entries.extend(doc.csi_sections.iter().map(|csi| {
            IndexEntry::Section(SectionEntry {
                search_text: search_text(&format!("section {} {} devis", csi.code, csi.title)),
                code: csi.code.clone(),
                division: csi.division.clone(),
                title: csi.title.clone(),
                page: csi.page,
            })
        }));
        entries.extend(doc.products.iter().map(|product| {
            IndexEntry::Product(ProductEntry {
                search_text: search_text(&format!(
                    "{} {} {} {} produit fabricant",
                    product.manufacturer,
                    product.model.as_deref().unwrap_or_default(),
                    product.product_type.as_deref().unwrap_or_default(),
                    product.csi_section.as_deref().unwrap_or_default(),
                )),
                manufacturer: product.manufacturer.clone(),
                model: product.model.clone(),
                product_type: product.product_type.clone(),
                page: product.page,
                csi_section: product.csi_section.clone(),
            })
        }));
    }

    info!(entries = entries.len(), "built retrieval index");
    RagIndex {
        source: registry.source.clone(),
        entries,
    }
}

fn room_entry(room: &Room) -> RoomEntry {
    let number = room
        .id
        .split_once('-')
        .map_or(room.id.as_str(), |(_, rest)| rest)
        .to_string();
    let floor = room.floor.map(|f| format!("étage {f}")).unwrap_or_default();
    RoomEntry {
        search_text: search_text(&format!(
            "{} {} {} bloc {} {} local pièce salle",
            room.name, room.id, number, room.block, floor
        )),
        id: room.id.clone(),
        name: room.name.clone(),
        number,
        block: room.block.clone(),
        floor: room.floor,
        source_pages: room.source_pages.clone(),
        primary_source: room.primary_source,
        confidence: room.confidence,
        spec_references: Vec::new(),
    }
}

/// A reference names a room when it equals the full id ("A-102") or the
/// bare number ("101"), separators aside. A bare number cites every block
/// holding that number.
fn attach_references(entry: &mut RoomEntry, references: &[LocalReference]) {
    let id = compact(&entry.id);
    let number = compact(&entry.number);
    for reference in references.iter().filter(|r| r.names_a_room()) {
        let cited = reference.compact();
        if cited != id && cited != number {
            continue;
        }
        entry.search_text.push(' ');
        entry.search_text.push_str(&search_text(&reference.context));
        entry.spec_references.push(SpecMention {
            page: reference.page,
            context: reference.context.clone(),
        });
    }
    if !entry.spec_references.is_empty() {
        debug!(id = %entry.id, mentions = entry.spec_references.len(), "room cited in specification");
    }
}

fn page_type_terms(page_type: PageType) -> &'static str {
    match page_type {
        PageType::Legend => "legend légende symboles",
        PageType::Plan => "plan étage floor",
        PageType::Detail => "detail détail coupe",
        PageType::Elevation => "elevation élévation façade",
        PageType::Other => "other autre",
    }
}

/// NFC, lowercase, single spaces.
pub fn search_text(raw: &str) -> String {
    normalize(raw).to_lowercase()
}
