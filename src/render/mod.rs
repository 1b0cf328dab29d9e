//! Dashboard rendering.
//!
//! The pipeline talks to a [`DashboardRenderer`]; the [`Dashboard`] recorder
//! keeps the emitted blocks in order and exports them as a Leaflet HTML page,
//! JSON, or plain text.

mod html;
mod text;

pub use html::render_html;
pub use text::{render_text, TextTable};

use serde::Serialize;
use std::fmt;
use std::str::FromStr;

use crate::canvas::RenderableMap;
use crate::error::{AtlasError, Result};
use crate::table::Table;

/// Sink for the dashboard's sequential display blocks.
pub trait DashboardRenderer {
    fn render_title(&mut self, text: &str);
    fn render_header(&mut self, text: &str);
    fn render_subheader(&mut self, text: &str);
    fn render_text(&mut self, text: &str);
    fn render_table(&mut self, table: &Table);
    /// Renders a snapshot of the map at the given pixel width.
    fn render_map(&mut self, map: &RenderableMap, width: u32);
    fn render_error(&mut self, message: &str);
}

/// One display block, in page order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "block", rename_all = "snake_case")]
pub enum Block {
    Title { text: String },
    Header { text: String },
    Subheader { text: String },
    Text { text: String },
    Table { table: Table },
    Map { map: RenderableMap, width: u32 },
    Error { message: String },
}

/// Output format for an exported dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Html,
    Json,
    Text,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "html" => Ok(Self::Html),
            "json" => Ok(Self::Json),
            "text" | "txt" => Ok(Self::Text),
            _ => Err(format!(
                "Invalid output format: {s}. Expected: html, json, or text"
            )),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Html => write!(f, "html"),
            Self::Json => write!(f, "json"),
            Self::Text => write!(f, "text"),
        }
    }
}

/// Records rendered blocks for later export.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Dashboard {
    blocks: Vec<Block>,
}

impl Dashboard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Every map block, in order.
    pub fn maps(&self) -> impl Iterator<Item = &RenderableMap> {
        self.blocks.iter().filter_map(|block| match block {
            Block::Map { map, .. } => Some(map),
            _ => None,
        })
    }

    /// Every error message, in order.
    pub fn errors(&self) -> impl Iterator<Item = &str> {
        self.blocks.iter().filter_map(|block| match block {
            Block::Error { message } => Some(message.as_str()),
            _ => None,
        })
    }

    /// The page title, if one was rendered.
    pub fn title(&self) -> Option<&str> {
        self.blocks.iter().find_map(|block| match block {
            Block::Title { text } => Some(text.as_str()),
            _ => None,
        })
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| AtlasError::render(format!("Failed to serialize dashboard: {e}")))
    }

    pub fn export(&self, format: OutputFormat) -> Result<String> {
        match format {
            OutputFormat::Html => render_html(self),
            OutputFormat::Json => self.to_json(),
            OutputFormat::Text => Ok(render_text(self)),
        }
    }

    fn push(&mut self, block: Block) {
        self.blocks.push(block);
    }
}

impl DashboardRenderer for Dashboard {
    fn render_title(&mut self, text: &str) {
        self.push(Block::Title {
            text: text.to_string(),
        });
    }

    fn render_header(&mut self, text: &str) {
        self.push(Block::Header {
            text: text.to_string(),
        });
    }

    fn render_subheader(&mut self, text: &str) {
        self.push(Block::Subheader {
            text: text.to_string(),
        });
    }

    fn render_text(&mut self, text: &str) {
        self.push(Block::Text {
            text: text.to_string(),
        });
    }

    fn render_table(&mut self, table: &Table) {
        self.push(Block::Table {
            table: table.clone(),
        });
    }

    fn render_map(&mut self, map: &RenderableMap, width: u32) {
        self.push(Block::Map {
            map: map.clone(),
            width,
        });
    }

    fn render_error(&mut self, message: &str) {
        self.push(Block::Error {
            message: message.to_string(),
        });
    }
}
