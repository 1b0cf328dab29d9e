//! Plain-text rendering with box-drawn tables.

use super::{Block, Dashboard};
use crate::canvas::{Layer, RenderableMap};
use crate::table::Table;
use crate::warehouse::Value;

/// Maximum width for any column before truncation.
const MAX_COLUMN_WIDTH: usize = 40;

/// Minimum width for any column.
const MIN_COLUMN_WIDTH: usize = 4;

/// Renders a table with box-drawing borders.
pub struct TextTable<'a> {
    table: &'a Table,
}

impl<'a> TextTable<'a> {
    pub fn new(table: &'a Table) -> Self {
        Self { table }
    }

    /// Calculates the width of each column from its header and values.
    fn calculate_column_widths(&self) -> Vec<usize> {
        let mut widths: Vec<usize> = self
            .table
            .columns()
            .iter()
            .map(|col| col.name.chars().count().max(MIN_COLUMN_WIDTH))
            .collect();

        for row in self.table.rows() {
            for (i, value) in row.iter().enumerate() {
                if let Some(width) = widths.get_mut(i) {
                    *width = (*width).max(value.to_display_string().chars().count());
                }
            }
        }

        widths.iter().map(|&w| w.min(MAX_COLUMN_WIDTH)).collect()
    }

    /// Truncates to `max_width` characters, ending in "..." when cut.
    fn truncate(s: &str, max_width: usize) -> String {
        if s.chars().count() <= max_width {
            s.to_string()
        } else if max_width <= 3 {
            s.chars().take(max_width).collect()
        } else {
            let kept: String = s.chars().take(max_width - 3).collect();
            format!("{kept}...")
        }
    }

    pub fn render_to_lines(&self) -> Vec<String> {
        if self.table.columns().is_empty() {
            return vec!["(no columns)".to_string()];
        }

        let widths = self.calculate_column_widths();
        let mut lines = Vec::with_capacity(self.table.row_count() + 5);

        lines.push(Self::border(&widths, '┌', '┬', '┐'));
        let names: Vec<String> = self.table.columns().iter().map(|c| c.name.clone()).collect();
        lines.push(Self::cells(&names, &widths));
        lines.push(Self::border(&widths, '├', '┼', '┤'));
        for row in self.table.rows() {
            let values: Vec<String> = row.iter().map(Value::to_display_string).collect();
            lines.push(Self::cells(&values, &widths));
        }
        lines.push(Self::border(&widths, '└', '┴', '┘'));

        let count = self.table.row_count();
        lines.push(format!("({count} row{})", if count == 1 { "" } else { "s" }));
        lines
    }

    fn border(widths: &[usize], left: char, mid: char, right: char) -> String {
        let segments: Vec<String> = widths.iter().map(|&w| "─".repeat(w + 2)).collect();
        format!("{left}{}{right}", segments.join(&mid.to_string()))
    }

    fn cells(values: &[String], widths: &[usize]) -> String {
        let cells: Vec<String> = widths
            .iter()
            .enumerate()
            .map(|(i, &width)| {
                let text = values.get(i).map(String::as_str).unwrap_or("");
                let text = Self::truncate(text, width);
                let pad = width - text.chars().count();
                format!(" {text}{} ", " ".repeat(pad))
            })
            .collect();
        format!("│{}│", cells.join("│"))
    }
}

fn map_summary(map: &RenderableMap, width: u32) -> Vec<String> {
    let mut lines = vec![format!(
        "[map {width}px] center ({:.6}, {:.6}) zoom {}, {} marker(s), {} polyline(s)",
        map.center.lat,
        map.center.lon,
        map.zoom,
        map.marker_count(),
        map.polyline_count()
    )];

    if let Some(bounds) = map.bounds {
        lines.push(format!(
            "  bounds ({:.6}, {:.6}) - ({:.6}, {:.6})",
            bounds.south_west.lat,
            bounds.south_west.lon,
            bounds.north_east.lat,
            bounds.north_east.lon
        ));
    }

    for layer in &map.layers {
        let label = layer.label().replace('\n', " | ");
        match layer {
            Layer::Marker {
                position, style, ..
            } => {
                let style = style
                    .as_ref()
                    .map(|s| format!(" [{} {}]", s.color, s.icon))
                    .unwrap_or_default();
                lines.push(format!(
                    "  * ({:.6}, {:.6}){style} {label}",
                    position.lat, position.lon
                ));
            }
            Layer::Polyline { positions, .. } => {
                lines.push(format!("  ~ {} vertices {label}", positions.len()));
            }
        }
    }
    lines
}

/// Renders the dashboard as plain text.
pub fn render_text(dashboard: &Dashboard) -> String {
    let mut lines: Vec<String> = Vec::new();

    for block in dashboard.blocks() {
        match block {
            Block::Title { text } => {
                lines.push(text.clone());
                lines.push("=".repeat(text.chars().count()));
            }
            Block::Header { text } => {
                lines.push(String::new());
                lines.push(text.clone());
                lines.push("-".repeat(text.chars().count()));
            }
            Block::Subheader { text } | Block::Text { text } => lines.push(text.clone()),
            Block::Table { table } => lines.extend(TextTable::new(table).render_to_lines()),
            Block::Map { map, width } => lines.extend(map_summary(map, *width)),
            Block::Error { message } => lines.push(format!("ERROR: {message}")),
        }
    }

    let mut out = lines.join("\n");
    out.push('\n');
    out
}
