//! Table reconstruction: positioned fragments → logical table rows.
//!
//! Works one page at a time; a logical row never spans pages in the source
//! document.
//!
//! 1. Fragments are grouped into visual lines by baseline proximity
//!    ([`TableLayout::row_tolerance`]) and ordered left to right.
//! 2. Column boundaries are either fixed by configuration or anchored on the
//!    header row: one column per header label, placed where the text under
//!    that label starts. A page without a header reuses the last header's
//!    columns; before any header is seen, columns are inferred from
//!    x-positions where text starts on several lines of the page.
//! 3. Each fragment lands in the rightmost column whose boundary is at or
//!    left of it; fragments sharing a cell are joined with a space.
//! 4. A visual line whose first cell is empty continues the previous logical
//!    row: each non-empty cell is appended to the matching column after a
//!    [`LINE_BREAK`]. Any other line starts a new logical row.
//!
//! Reconstruction never fails. A page without fragments yields no rows.

use crate::config::{ColumnBoundaries, TableLayout};
use crate::error::RowError;
use crate::pipeline::extract::{Page, PositionedFragment};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, warn};

/// Marker inserted between the visual lines of a wrapped cell.
pub const LINE_BREAK: char = '\n';

/// One logical table row: cell strings in column order.
///
/// Trailing empty cells are dropped, so a column past the end of `cells` was
/// never printed on this row while an empty string inside it was printed
/// blank.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Row {
    /// 1-indexed page the row was found on.
    pub page: usize,
    pub cells: Vec<String>,
}

impl Row {
    pub fn new(page: usize, cells: Vec<String>) -> Self {
        Self { page, cells }
    }

    /// Cell at `index`, or `None` when the row has no such column.
    pub fn cell(&self, index: usize) -> Option<&str> {
        self.cells.get(index).map(String::as_str)
    }

    pub fn first_cell(&self) -> Option<&str> {
        self.cell(0)
    }

    pub fn is_blank(&self) -> bool {
        self.cells.iter().all(|c| c.trim().is_empty())
    }

    /// Merge a continuation line into this row.
    fn absorb(&mut self, continuation: Vec<String>) {
        if self.cells.len() < continuation.len() {
            self.cells.resize(continuation.len(), String::new());
        }
        for (target, text) in self.cells.iter_mut().zip(continuation) {
            if text.is_empty() {
                continue;
            }
            if !target.is_empty() {
                target.push(LINE_BREAK);
            }
            target.push_str(&text);
        }
    }
}

/// Reconstruct the rows of every page, in page order.
pub fn reconstruct(pages: &[Page], layout: &TableLayout) -> Vec<Row> {
    let mut reconstructor = TableReconstructor::new(layout);
    let mut rows = Vec::new();
    for page in pages {
        let page_rows = reconstructor.page(&page.fragments);
        debug!("Page {}: {} logical rows", page.number, page_rows.len());
        rows.extend(page_rows);
    }
    rows
}

/// Reconstruct the logical rows of a single page on its own, with no column
/// positions carried over from earlier pages.
pub fn reconstruct_page(fragments: &[PositionedFragment], layout: &TableLayout) -> Vec<Row> {
    TableReconstructor::new(layout).page(fragments)
}

type Line<'f> = Vec<&'f PositionedFragment>;

/// Rebuilds the rows of one document, page by page.
///
/// Column starts learned from a header row are remembered and reused on
/// later pages that print no header of their own.
#[derive(Debug)]
pub struct TableReconstructor<'a> {
    layout: &'a TableLayout,
    header_columns: Option<Vec<f32>>,
}

impl<'a> TableReconstructor<'a> {
    pub fn new(layout: &'a TableLayout) -> Self {
        Self {
            layout,
            header_columns: None,
        }
    }

    /// Column starts taken from the most recent header row.
    pub fn header_columns(&self) -> Option<&[f32]> {
        self.header_columns.as_deref()
    }

    /// Reconstruct the logical rows of the next page.
    pub fn page(&mut self, fragments: &[PositionedFragment]) -> Vec<Row> {
        let Some(first) = fragments.first() else {
            return Vec::new();
        };
        let page = first.page;

        let lines = group_lines(fragments, self.layout.row_tolerance);
        let boundaries = self.boundaries(page, &lines);
        let tolerance = self.layout.column_tolerance;

        let mut rows: Vec<Row> = Vec::new();
        for line in &lines {
            let cells = assign_cells(line, &boundaries, tolerance);
            if cells.is_empty() {
                continue;
            }
            if cells[0].is_empty() {
                if let Some(previous) = rows.last_mut() {
                    previous.absorb(cells);
                    continue;
                }
            }
            rows.push(Row { page, cells });
        }
        rows
    }

    fn boundaries(&mut self, page: usize, lines: &[Line<'_>]) -> Vec<f32> {
        let layout = self.layout;
        let anchored = match &layout.boundaries {
            ColumnBoundaries::Fixed(starts) => {
                let mut starts = starts.clone();
                starts.sort_by(f32::total_cmp);
                return starts;
            }
            ColumnBoundaries::Inferred => header_columns(lines, layout),
        };

        if let Some(columns) = anchored {
            debug!("Page {}: header row gives columns at {:?}", page, columns);
            if let Some(expected) = layout.expected_columns {
                if columns.len() != expected {
                    warn!(
                        "Page {}: header row has {} columns, expected {}",
                        page,
                        columns.len(),
                        expected
                    );
                }
            }
            self.header_columns = Some(columns.clone());
            return columns;
        }
        if let Some(columns) = &self.header_columns {
            debug!("Page {}: no header row, reusing {} columns", page, columns.len());
            return columns.clone();
        }
        let columns = infer_boundaries(lines, layout.column_tolerance, layout.min_column_support);
        debug!("Page {}: inferred columns at {:?}", page, columns);
        columns
    }
}

/// Group fragments into visual lines, top to bottom, each sorted by x.
///
/// A fragment joins the current line when its baseline is within `tolerance`
/// of the line's first baseline, so a slow drift never chains lines together.
fn group_lines(fragments: &[PositionedFragment], tolerance: f32) -> Vec<Line<'_>> {
    let mut sorted: Vec<&PositionedFragment> = fragments.iter().collect();
    sorted.sort_by(|a, b| a.y.total_cmp(&b.y).then(a.x.total_cmp(&b.x)));

    let mut lines: Vec<(f32, Line<'_>)> = Vec::new();
    for fragment in sorted {
        if let Some((anchor, line)) = lines.last_mut() {
            if (fragment.y - *anchor).abs() <= tolerance {
                line.push(fragment);
                continue;
            }
        }
        lines.push((fragment.y, vec![fragment]));
    }

    lines
        .into_iter()
        .map(|(_, mut line)| {
            line.sort_by(|a, b| a.x.total_cmp(&b.x));
            line
        })
        .collect()
}

fn is_marker_line(line: &[&PositionedFragment], marker: &str) -> bool {
    line.first().is_some_and(|f| f.text.trim() == marker)
}

struct Cluster {
    start: f32,
    lines: BTreeSet<usize>,
}

/// Cluster `(x, line index)` starts left to right. A start closer than
/// `tolerance` to a cluster's leftmost start joins that cluster.
fn cluster_starts(starts: impl IntoIterator<Item = (f32, usize)>, tolerance: f32) -> Vec<Cluster> {
    let mut starts: Vec<(f32, usize)> = starts.into_iter().collect();
    starts.sort_by(|a, b| a.0.total_cmp(&b.0));

    let mut clusters: Vec<Cluster> = Vec::new();
    for (x, line) in starts {
        if let Some(cluster) = clusters.last_mut() {
            if x - cluster.start <= tolerance {
                cluster.lines.insert(line);
                continue;
            }
        }
        clusters.push(Cluster {
            start: x,
            lines: BTreeSet::from([line]),
        });
    }
    clusters
}

/// Column starts anchored on the page's header row.
///
/// The header is the line with the most fragments above the first data row,
/// the nearest one winning a tie. Each label names exactly one column, so a
/// cell split into several text runs cannot add a column. Labels may be
/// centred over their column: column `i` starts at the best-supported x-start
/// of the other lines lying after label `i - 1` and no later than label `i`
/// (the rightmost on a tie). A label with nothing printed under it keeps its
/// own position. When data rows start their marker further left than the
/// first column found this way, the marker gets a column of its own.
fn header_columns(lines: &[Line<'_>], layout: &TableLayout) -> Option<Vec<f32>> {
    let tolerance = layout.column_tolerance;
    let first_data = lines
        .iter()
        .position(|line| is_marker_line(line, &layout.marker))?;
    let (header_index, header) = lines[..first_data]
        .iter()
        .enumerate()
        .filter(|(_, line)| line.len() >= 2)
        .max_by_key(|(index, line)| (line.len(), *index))?;

    let labels: Vec<f32> = cluster_starts(header.iter().map(|f| (f.x, header_index)), tolerance)
        .iter()
        .map(|c| c.start)
        .collect();
    if labels.len() < 2 {
        return None;
    }

    let clusters = cluster_starts(
        lines
            .iter()
            .enumerate()
            .filter(|(index, _)| *index != header_index)
            .flat_map(|(index, line)| line.iter().map(move |f| (f.x, index))),
        tolerance,
    );

    let marker_start = lines
        .iter()
        .filter(|line| is_marker_line(line, &layout.marker))
        .filter_map(|line| line.first())
        .map(|f| f.x)
        .fold(f32::INFINITY, f32::min);

    let mut columns = Vec::with_capacity(labels.len() + 1);
    let mut floor = f32::NEG_INFINITY;
    for label in labels {
        let ceiling = label + tolerance;
        let start = clusters
            .iter()
            .filter(|c| c.start > floor && c.start <= ceiling)
            .max_by(|a, b| {
                a.lines
                    .len()
                    .cmp(&b.lines.len())
                    .then(a.start.total_cmp(&b.start))
            })
            .map_or(label, |c| c.start);
        columns.push(start);
        floor = ceiling;
    }
    if columns
        .first()
        .is_some_and(|&first| marker_start < first - tolerance)
    {
        columns.insert(0, marker_start);
    }
    Some(columns)
}

/// Infer column start positions from where text begins on each line.
///
/// Used for pages with no header row before any header has been seen. A
/// cluster becomes a column once text starts there on at least `min_support`
/// distinct lines (capped by the number of lines on the page).
fn infer_boundaries(lines: &[Line<'_>], tolerance: f32, min_support: usize) -> Vec<f32> {
    let clusters = cluster_starts(
        lines
            .iter()
            .enumerate()
            .flat_map(|(index, line)| line.iter().map(move |f| (f.x, index))),
        tolerance,
    );

    let threshold = min_support.min(lines.len()).max(1);
    let supported: Vec<f32> = clusters
        .iter()
        .filter(|c| c.lines.len() >= threshold)
        .map(|c| c.start)
        .collect();

    if supported.is_empty() {
        // No repeated alignment at all; every distinct start is its own column.
        clusters.iter().map(|c| c.start).collect()
    } else {
        supported
    }
}

/// Place one line's fragments into cells and drop trailing empty cells.
fn assign_cells(line: &[&PositionedFragment], boundaries: &[f32], tolerance: f32) -> Vec<String> {
    let mut cells = vec![String::new(); boundaries.len().max(1)];
    for fragment in line {
        let column = boundaries
            .iter()
            .rposition(|&start| start <= fragment.x + tolerance)
            .unwrap_or(0);
        let cell = &mut cells[column];
        if !cell.is_empty() {
            cell.push(' ');
        }
        cell.push_str(fragment.text.trim());
    }
    while cells.last().is_some_and(|c| c.is_empty()) {
        cells.pop();
    }
    cells
}

// ── Column mapping ───────────────────────────────────────────────────────

/// A data row with its configured columns pulled out by name.
///
/// `None` means the column is absent from the row; `Some("")` means it was
/// printed blank.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTableRow {
    pub page: usize,
    pub reference: Option<String>,
    pub description: Option<String>,
    pub date_received: Option<String>,
}

impl RawTableRow {
    /// Map a row onto the layout's named columns.
    ///
    /// Returns `Ok(None)` unless the first cell is the data-row marker. A data
    /// row wider than [`TableLayout::expected_columns`] is a
    /// [`RowError::ColumnCount`].
    pub fn from_row(row: &Row, layout: &TableLayout) -> Result<Option<Self>, RowError> {
        if row.first_cell().map(str::trim) != Some(layout.marker.as_str()) {
            return Ok(None);
        }
        let reference = row
            .cell(layout.reference_column)
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(String::from);

        if let Some(expected) = layout.expected_columns {
            if row.cells.len() > expected {
                return Err(RowError::ColumnCount {
                    reference: reference.unwrap_or_default(),
                    page: row.page,
                    found: row.cells.len(),
                    expected,
                });
            }
        }
        if row.cells.len() < layout.required_columns() {
            debug!(
                "Data row on page {} has {} of {} columns",
                row.page,
                row.cells.len(),
                layout.required_columns()
            );
        }

        Ok(Some(Self {
            page: row.page,
            reference,
            description: row.cell(layout.description_column).map(String::from),
            date_received: row.cell(layout.date_received_column).map(String::from),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frag(text: &str, x: f32, y: f32) -> PositionedFragment {
        PositionedFragment {
            text: text.to_string(),
            x,
            y,
            font_size: 8.0,
            page: 1,
        }
    }

    fn header(y: f32) -> Vec<PositionedFragment> {
        vec![
            frag("Item", 20.0, y),
            frag("DAP Ref", 60.0, y),
            frag("LG Name", 140.0, y),
            frag("Value", 220.0, y),
            frag("Description", 300.0, y),
            frag("Received", 480.0, y),
        ]
    }

    fn data_line(reference: &str, description: &str, date: &str, y: f32) -> Vec<PositionedFragment> {
        vec![
            frag("No", 20.0, y),
            frag(reference, 60.0, y),
            frag("City of Stirling", 140.0, y),
            frag("$2.1m", 220.0, y),
            frag(description, 300.0, y),
            frag(date, 480.0, y),
        ]
    }

    #[test]
    fn empty_page_yields_no_rows() {
        assert!(reconstruct_page(&[], &TableLayout::default()).is_empty());
    }

    #[test]
    fn builds_header_and_data_rows() {
        let mut fragments = header(50.0);
        fragments.extend(data_line("DAP/20/01790", "Two storey dwelling", "01/03/2020", 80.0));

        let rows = reconstruct_page(&fragments, &TableLayout::default());
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].first_cell(), Some("Item"));
        assert_eq!(
            rows[1].cells,
            vec![
                "No",
                "DAP/20/01790",
                "City of Stirling",
                "$2.1m",
                "Two storey dwelling",
                "01/03/2020"
            ]
        );
    }

    #[test]
    fn baseline_jitter_stays_on_one_line() {
        let mut fragments = header(50.0);
        let mut line = data_line("DAP/20/01790", "Shops", "01/03/2020", 80.0);
        line[1].y = 81.5;
        line[5].y = 78.9;
        fragments.extend(line);

        let rows = reconstruct_page(&fragments, &TableLayout::default());
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].cell(5), Some("01/03/2020"));
    }

    #[test]
    fn wrapped_cell_merges_into_previous_row() {
        let mut fragments = header(50.0);
        fragments.extend(data_line("DAP/20/01790", "Two storey dwelling", "01/03/2020", 80.0));
        fragments.push(frag("12 Main St Yokine", 300.0, 92.0));

        let rows = reconstruct_page(&fragments, &TableLayout::default());
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].cell(4), Some("Two storey dwelling\n12 Main St Yokine"));
        assert_eq!(rows[1].cell(5), Some("01/03/2020"));
    }

    #[test]
    fn continuation_fills_empty_cell_without_break() {
        let mut fragments = header(50.0);
        let mut line = data_line("DAP/20/01790", "x", "y", 80.0);
        line.truncate(4);
        fragments.extend(line);
        fragments.push(frag("Yokine", 300.0, 92.0));

        let rows = reconstruct_page(&fragments, &TableLayout::default());
        assert_eq!(rows[1].cell(4), Some("Yokine"));
    }

    #[test]
    fn non_marker_first_cell_starts_new_row() {
        let mut fragments = header(50.0);
        fragments.extend(data_line("DAP/20/01790", "Shops", "01/03/2020", 80.0));
        fragments.push(frag("Page", 20.0, 700.0));
        fragments.push(frag("1 of 4", 60.0, 700.0));

        let rows = reconstruct_page(&fragments, &TableLayout::default());
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[2].first_cell(), Some("Page"));
    }

    #[test]
    fn fixed_boundaries_are_used_as_given() {
        let layout = TableLayout {
            boundaries: ColumnBoundaries::Fixed(vec![300.0, 20.0]),
            ..TableLayout::default()
        };
        let fragments = vec![
            frag("No", 20.0, 10.0),
            frag("DAP/20/01790", 60.0, 10.0),
            frag("Shops", 310.0, 10.0),
        ];

        let rows = reconstruct_page(&fragments, &layout);
        assert_eq!(rows[0].cells, vec!["No DAP/20/01790", "Shops"]);
    }

    #[test]
    fn raw_row_requires_marker() {
        let layout = TableLayout::default();
        let header = Row::new(1, vec!["Item".into(), "DAP Ref".into()]);
        assert!(RawTableRow::from_row(&header, &layout).unwrap().is_none());

        let data = Row::new(
            1,
            vec![" No ".into(), "DAP/20/01790".into(), "".into(), "".into(), "".into()],
        );
        let raw = RawTableRow::from_row(&data, &layout).unwrap().unwrap();
        assert_eq!(raw.reference.as_deref(), Some("DAP/20/01790"));
        assert_eq!(raw.description.as_deref(), Some(""));
        assert_eq!(raw.date_received, None);
    }

    #[test]
    fn reconstruct_keeps_page_order() {
        let mut second = data_line("DAP/20/00002", "b", "02/03/2020", 80.0);
        second.iter_mut().for_each(|f| f.page = 2);
        let pages = vec![
            Page {
                number: 1,
                fragments: data_line("DAP/20/00001", "a", "01/03/2020", 80.0),
            },
            Page {
                number: 2,
                fragments: second,
            },
        ];

        let rows = reconstruct(&pages, &TableLayout::default());
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].cell(1), Some("DAP/20/00001"));
        assert_eq!(rows[1].page, 2);
    }

    #[test]
    fn raw_row_wider_than_expected_is_rejected() {
        let layout = TableLayout {
            expected_columns: Some(6),
            ..TableLayout::default()
        };
        let mut cells: Vec<String> = ["No", "DAP/20/01790", "", "", "Shops", "01/03/2020"]
            .iter()
            .map(|c| c.to_string())
            .collect();
        assert!(RawTableRow::from_row(&Row::new(2, cells.clone()), &layout)
            .unwrap()
            .is_some());

        cells.push("Approved".into());
        let err = RawTableRow::from_row(&Row::new(2, cells), &layout).unwrap_err();
        assert_eq!(
            err,
            RowError::ColumnCount {
                reference: "DAP/20/01790".into(),
                page: 2,
                found: 7,
                expected: 6,
            }
        );
    }

    // ── Column anchoring ─────────────────────────────────────────────────

    #[test]
    fn split_text_runs_stay_in_one_cell() {
        let mut fragments = header(50.0);
        let mut first = data_line("DAP/20/01790", "Two storey", "01/03/2020", 80.0);
        first.push(frag("dwelling", 350.0, 80.0));
        let mut second = data_line("DAP/20/01791", "Mixed use", "02/03/2020", 110.0);
        second.push(frag("development", 351.0, 110.0));
        fragments.extend(first);
        fragments.extend(second);

        let rows = reconstruct_page(&fragments, &TableLayout::default());
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[1].cells.len(), 6);
        assert_eq!(rows[1].cell(4), Some("Two storey dwelling"));
        assert_eq!(rows[1].cell(5), Some("01/03/2020"));
        assert_eq!(rows[2].cell(4), Some("Mixed use development"));
        assert_eq!(rows[2].cell(5), Some("02/03/2020"));
    }

    #[test]
    fn centred_header_labels_resolve_to_data_columns() {
        let mut fragments: Vec<PositionedFragment> = header(50.0)
            .into_iter()
            .map(|mut f| {
                f.x += 12.0;
                f
            })
            .collect();
        fragments.extend(data_line("DAP/20/01790", "Shops", "01/03/2020", 80.0));
        fragments.extend(data_line("DAP/20/01791", "Offices", "02/03/2020", 110.0));

        let layout = TableLayout::default();
        let mut reconstructor = TableReconstructor::new(&layout);
        let rows = reconstructor.page(&fragments);
        assert_eq!(
            reconstructor.header_columns(),
            Some(&[20.0, 60.0, 140.0, 220.0, 300.0, 480.0][..])
        );
        assert_eq!(
            rows[2].cells,
            vec![
                "No",
                "DAP/20/01791",
                "City of Stirling",
                "$2.1m",
                "Offices",
                "02/03/2020"
            ]
        );
    }

    #[test]
    fn sparse_column_keeps_later_columns_in_place() {
        let mut fragments = header(50.0);
        fragments.extend(data_line("DAP/20/01790", "Shops", "01/03/2020", 80.0));
        for (reference, y) in [("DAP/20/01791", 110.0), ("DAP/20/01792", 140.0)] {
            let mut line = data_line(reference, "Offices", "02/03/2020", y);
            line.remove(3);
            fragments.extend(line);
        }

        let rows = reconstruct_page(&fragments, &TableLayout::default());
        assert_eq!(rows[1].cell(3), Some("$2.1m"));
        for row in &rows[2..] {
            assert_eq!(row.cell(2), Some("City of Stirling"));
            assert_eq!(row.cell(3), Some(""));
            assert_eq!(row.cell(4), Some("Offices"));
            assert_eq!(row.cell(5), Some("02/03/2020"));
        }
    }

    #[test]
    fn page_without_header_reuses_previous_columns() {
        let layout = TableLayout::default();
        let mut reconstructor = TableReconstructor::new(&layout);
        let mut first = header(50.0);
        first.extend(data_line("DAP/20/01790", "Shops", "01/03/2020", 80.0));
        reconstructor.page(&first);

        // Only one row carries a value, and both descriptions are split.
        let mut second = data_line("DAP/20/01791", "Two storey", "02/03/2020", 40.0);
        second.push(frag("dwelling", 350.0, 40.0));
        let mut line = data_line("DAP/20/01792", "Mixed use", "03/03/2020", 70.0);
        line.remove(3);
        line.push(frag("development", 351.0, 70.0));
        second.extend(line);
        second.iter_mut().for_each(|f| f.page = 2);

        let rows = reconstructor.page(&second);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].page, 2);
        assert_eq!(rows[0].cell(4), Some("Two storey dwelling"));
        assert_eq!(rows[0].cell(5), Some("02/03/2020"));
        assert_eq!(rows[1].cell(3), Some(""));
        assert_eq!(rows[1].cell(4), Some("Mixed use development"));
        assert_eq!(rows[1].cell(5), Some("03/03/2020"));
    }

    #[test]
    fn unlabelled_marker_column_is_kept() {
        let mut fragments: Vec<PositionedFragment> = header(50.0).into_iter().skip(1).collect();
        fragments.extend(data_line("DAP/20/01790", "Shops", "01/03/2020", 80.0));

        let rows = reconstruct_page(&fragments, &TableLayout::default());
        assert_eq!(rows[1].first_cell(), Some("No"));
        assert_eq!(rows[1].cell(1), Some("DAP/20/01790"));
        assert_eq!(rows[1].cell(5), Some("01/03/2020"));
    }
}
