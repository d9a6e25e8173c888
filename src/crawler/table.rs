//! Download-table parsing
//!
//! A version page lists its files in `table#downloadsTable`. The first row
//! holding `<th>` cells fixes the column count; each later row with the same
//! number of cells and a `/download/...` link becomes one `TableRow`.

use crate::url::{href_path, resolve_link};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::sync::OnceLock;
use url::Url;

/// Structural marker of the download listing on a version page
pub const DOWNLOADS_TABLE_SELECTOR: &str = "table#downloadsTable";

/// Path prefix of a per-file download page
const DOWNLOAD_PATH_PREFIX: &str = "/download/";

/// One file row from the download table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRow {
    /// Link text, the href, or `download_<id>`
    pub name: String,

    /// Absolute URL of the per-file download page
    pub download_url: Url,

    /// Identifier taken from the download path
    pub file_id: String,

    /// Text of the first cell that looks like a size
    pub size: Option<String>,

    /// Image title (or alt) describing the architecture
    pub architecture: Option<String>,
}

/// Result of parsing a download table
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedTable {
    /// Number of header columns, 0 if no header row was found
    pub columns: usize,

    /// File rows in table order
    pub rows: Vec<TableRow>,

    /// Data rows whose cell count differs from the header
    pub malformed_rows: usize,

    /// Data rows without a download link
    pub rows_without_link: usize,
}

fn size_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\d+\s*(KB|MB|GB|TB|bytes|B)\b").expect("valid size regex")
    })
}

fn numeric_id_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^/download/(\d+)").expect("valid download id regex"))
}

struct TableSelectors {
    table: Selector,
    row: Selector,
    header_cell: Selector,
    anchor: Selector,
    img_title: Selector,
    img_alt: Selector,
}

fn selectors() -> &'static TableSelectors {
    static SEL: OnceLock<TableSelectors> = OnceLock::new();
    SEL.get_or_init(|| {
        let parse = |css: &str| Selector::parse(css).expect("valid table selector");
        TableSelectors {
            table: parse(DOWNLOADS_TABLE_SELECTOR),
            row: parse("tr"),
            header_cell: parse("th"),
            anchor: parse("a[href]"),
            img_title: parse("img[title]"),
            img_alt: parse("img[alt]"),
        }
    })
}

/// Parses the download table of a version page
///
/// # Returns
///
/// * `None` - the page has no `table#downloadsTable`
/// * `Some(ParsedTable)` - rows in original order; header-only tables and
///   tables without a header row yield zero rows
pub fn parse_download_table(html: &str, base_url: &Url) -> Option<ParsedTable> {
    let document = Html::parse_document(html);
    let table = document.select(&selectors().table).next()?;
    Some(parse_table_element(table, base_url))
}

fn parse_table_element(table: ElementRef<'_>, base_url: &Url) -> ParsedTable {
    let sel = selectors();
    let rows: Vec<ElementRef<'_>> = table.select(&sel.row).collect();

    let Some(header_index) = rows
        .iter()
        .position(|row| row.select(&sel.header_cell).next().is_some())
    else {
        tracing::info!("Download table has no header row; treating as empty");
        return ParsedTable::default();
    };

    let columns = cells(rows[header_index]).len();
    let mut parsed = ParsedTable {
        columns,
        ..ParsedTable::default()
    };

    for (index, row) in rows.iter().enumerate() {
        if index == header_index {
            continue;
        }

        let row_cells = cells(*row);
        if row_cells.len() != columns {
            tracing::info!(
                "Skipping malformed download row {}: {} cells, header has {}",
                index,
                row_cells.len(),
                columns
            );
            parsed.malformed_rows += 1;
            continue;
        }

        match parse_row(*row, &row_cells, base_url) {
            Some(file) => parsed.rows.push(file),
            None => parsed.rows_without_link += 1,
        }
    }

    parsed
}

/// Direct `td`/`th` children of a row
fn cells(row: ElementRef<'_>) -> Vec<ElementRef<'_>> {
    row.children()
        .filter_map(ElementRef::wrap)
        .filter(|el| matches!(el.value().name(), "td" | "th"))
        .collect()
}

/// Whitespace-normalized text of an element
fn cell_text(el: ElementRef<'_>) -> String {
    el.text()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn parse_row(
    row: ElementRef<'_>,
    row_cells: &[ElementRef<'_>],
    base_url: &Url,
) -> Option<TableRow> {
    let (link, href, path) = row.select(&selectors().anchor).find_map(|a| {
        let href = a.value().attr("href")?.trim();
        let path = href_path(href, base_url)?;
        path.starts_with(DOWNLOAD_PATH_PREFIX)
            .then(|| (a, href.to_string(), path))
    })?;

    let download_url = resolve_link(&href, base_url)?;
    let file_id = extract_file_id(&path);

    let text = cell_text(link);
    let name = if !text.is_empty() {
        text
    } else if !href.is_empty() {
        href.clone()
    } else {
        format!("download_{}", file_id)
    };

    let size = row_cells
        .iter()
        .map(|c| cell_text(*c))
        .find(|text| size_regex().is_match(text));

    Some(TableRow {
        name,
        download_url,
        file_id,
        size,
        architecture: extract_architecture(row),
    })
}

/// Numeric id from `/download/<digits>`, else the path remainder
fn extract_file_id(path: &str) -> String {
    if let Some(caps) = numeric_id_regex().captures(path) {
        return caps[1].to_string();
    }

    path.split(DOWNLOAD_PATH_PREFIX)
        .last()
        .unwrap_or_default()
        .trim_matches('/')
        .to_string()
}

/// Image title, falling back to image alt
fn extract_architecture(row: ElementRef<'_>) -> Option<String> {
    let sel = selectors();
    let non_empty = |images: &Selector, attr: &str| {
        row.select(images)
            .filter_map(|img| img.value().attr(attr))
            .map(|v| v.trim().to_string())
            .find(|v| !v.is_empty())
    };

    non_empty(&sel.img_title, "title").or_else(|| non_empty(&sel.img_alt, "alt"))
}
