//! Standalone HTML page with Leaflet maps.

use std::fmt::Write;

use super::{Block, Dashboard};
use crate::canvas::RenderableMap;
use crate::error::{AtlasError, Result};
use crate::table::Table;

const MAP_HEIGHT_PX: u32 = 500;

const HEAD: &str = r#"<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<link rel="stylesheet" href="https://unpkg.com/leaflet@1.9.4/dist/leaflet.css">
<link rel="stylesheet" href="https://cdnjs.cloudflare.com/ajax/libs/Leaflet.awesome-markers/2.0.2/leaflet.awesome-markers.css">
<link rel="stylesheet" href="https://netdna.bootstrapcdn.com/bootstrap/3.0.0/css/bootstrap-glyphicons.css">
<link rel="stylesheet" href="https://cdnjs.cloudflare.com/ajax/libs/font-awesome/6.2.0/css/all.min.css">
<script src="https://unpkg.com/leaflet@1.9.4/dist/leaflet.js"></script>
<script src="https://cdnjs.cloudflare.com/ajax/libs/Leaflet.awesome-markers/2.0.2/leaflet.awesome-markers.js"></script>
<style>
body { font-family: sans-serif; margin: 2rem auto; max-width: 960px; color: #262730; }
table { border-collapse: collapse; margin: 1rem 0; font-size: 0.9rem; }
th, td { border: 1px solid #ddd; padding: 0.3rem 0.6rem; text-align: left; }
th { background: #f0f2f6; }
td.null { color: #999; }
.error { background: #ffebee; color: #b71c1c; padding: 0.75rem 1rem; border-radius: 4px; }
.map { margin: 1rem 0; }
</style>
<script>
function escapeHtml(text) {
  return text.replace(/&/g, "&amp;").replace(/</g, "&lt;").replace(/>/g, "&gt;")
    .replace(/"/g, "&quot;").replace(/'/g, "&#39;");
}
function popupHtml(label) {
  return escapeHtml(label).replace(/\n/g, "<br><br>");
}
function renderMap(id, spec) {
  var map = L.map(id).setView([spec.center.lat, spec.center.lon], spec.zoom);
  L.tileLayer("https://{s}.tile.openstreetmap.org/{z}/{x}/{y}.png", {
    maxZoom: 19,
    attribution: "&copy; OpenStreetMap contributors"
  }).addTo(map);
  L.control.scale().addTo(map);
  spec.layers.forEach(function (layer) {
    if (layer.kind === "marker") {
      var options = {};
      if (layer.style) {
        options.icon = L.AwesomeMarkers.icon({
          icon: layer.style.icon,
          markerColor: layer.style.color,
          prefix: layer.style.icon === "info-sign" ? "glyphicon" : "fa"
        });
      }
      L.marker([layer.position.lat, layer.position.lon], options)
        .bindPopup(popupHtml(layer.label))
        .addTo(map);
    } else if (layer.kind === "polyline") {
      L.polyline(layer.positions.map(function (p) { return [p.lat, p.lon]; }))
        .bindTooltip(escapeHtml(layer.label))
        .addTo(map);
    }
  });
  if (spec.bounds) {
    map.fitBounds(
      [[spec.bounds.south_west.lat, spec.bounds.south_west.lon],
       [spec.bounds.north_east.lat, spec.bounds.north_east.lon]],
      spec.fit_padding ? { padding: spec.fit_padding } : {}
    );
  }
}
</script>
"#;

/// Renders the dashboard as a self-contained HTML page.
pub fn render_html(dashboard: &Dashboard) -> Result<String> {
    let mut page = String::new();
    let title = dashboard.title().unwrap_or("Sales Atlas");

    page.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n");
    let _ = writeln!(page, "<title>{}</title>", escape_html(title));
    page.push_str(HEAD);
    page.push_str("</head>\n<body>\n");

    let mut map_index = 0;
    for block in dashboard.blocks() {
        match block {
            Block::Title { text } => {
                let _ = writeln!(page, "<h1>{}</h1>", escape_html(text));
            }
            Block::Header { text } => {
                let _ = writeln!(page, "<h2>{}</h2>", escape_html(text));
            }
            Block::Subheader { text } => {
                let _ = writeln!(page, "<h3>{}</h3>", escape_html(text));
            }
            Block::Text { text } => {
                let _ = writeln!(page, "<p>{}</p>", escape_html(text));
            }
            Block::Table { table } => write_table(&mut page, table),
            Block::Map { map, width } => {
                write_map(&mut page, map, *width, map_index)?;
                map_index += 1;
            }
            Block::Error { message } => {
                let _ = writeln!(page, "<div class=\"error\">{}</div>", escape_html(message));
            }
        }
    }

    page.push_str("</body>\n</html>\n");
    Ok(page)
}

fn write_table(page: &mut String, table: &Table) {
    page.push_str("<table>\n<thead><tr>");
    for column in table.columns() {
        let _ = write!(page, "<th>{}</th>", escape_html(&column.name));
    }
    page.push_str("</tr></thead>\n<tbody>\n");
    for row in table.rows() {
        page.push_str("<tr>");
        for value in row {
            if value.is_null() {
                page.push_str("<td class=\"null\">NULL</td>");
            } else {
                let _ = write!(page, "<td>{}</td>", escape_html(&value.to_display_string()));
            }
        }
        page.push_str("</tr>\n");
    }
    page.push_str("</tbody>\n</table>\n");
}

fn write_map(page: &mut String, map: &RenderableMap, width: u32, index: usize) -> Result<()> {
    let spec = serde_json::to_string(map)
        .map_err(|e| AtlasError::render(format!("Failed to serialize map: {e}")))?;
    let id = format!("map-{index}");
    let _ = writeln!(
        page,
        "<div id=\"{id}\" class=\"map\" style=\"width: {width}px; height: {MAP_HEIGHT_PX}px;\"></div>"
    );
    let _ = writeln!(
        page,
        "<script>renderMap(\"{id}\", {});</script>",
        escape_script_json(&spec)
    );
    Ok(())
}

/// Escapes text for an HTML element body or attribute.
pub(crate) fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

/// Keeps serialized JSON from closing the surrounding script element.
fn escape_script_json(json: &str) -> String {
    json.replace("</", "<\\/").replace("<!--", "<\\!--")
}
