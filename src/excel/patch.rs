//! In-place worksheet XML patching
//!
//! Streams `sheetData` and rewrites only the edited `<c>` elements. Every
//! other element passes through byte-for-byte, so `<cols>`, row heights,
//! merges, print setup and untouched cells survive the export. An edited
//! cell keeps its `s` attribute and with it the template's cell style.

use super::grid::{CellRef, CellValue};
use super::package::PackageError;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use std::collections::{BTreeMap, BTreeSet};
use std::iter::Peekable;
use std::vec::IntoIter;

type RowCells<'a> = Vec<(u16, &'a CellValue)>;
type PendingCells<'a> = Peekable<IntoIter<(u16, &'a CellValue)>>;

/// Apply `edits` to a worksheet part, returning the rewritten XML
pub(super) fn patch_worksheet_xml(
    original: &[u8],
    edits: &BTreeMap<CellRef, CellValue>,
) -> Result<Vec<u8>, PackageError> {
    let mut rows: BTreeMap<u32, RowCells> = BTreeMap::new();
    for (cell, value) in edits {
        rows.entry(cell.row).or_default().push((cell.col, value));
    }
    let bounds = edit_bounds(edits);

    let mut reader = Reader::from_reader(original);
    reader.config_mut().trim_text(false);
    let mut writer = Writer::new(Vec::with_capacity(original.len() + edits.len() * 64));
    let mut buf = Vec::new();

    let mut patcher = RowPatcher::default();
    let mut in_sheet_data = false;
    let mut saw_sheet_data = false;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Eof => break,
            Event::Empty(e) if e.local_name().as_ref() == b"dimension" => {
                let dimension = widen_dimension(&e, bounds)?;
                writer.write_event(Event::Empty(dimension))?;
            }
            Event::Start(e) if e.local_name().as_ref() == b"sheetData" => {
                in_sheet_data = true;
                saw_sheet_data = true;
                writer.write_event(Event::Start(e.into_owned()))?;
            }
            Event::Empty(e) if e.local_name().as_ref() == b"sheetData" => {
                saw_sheet_data = true;
                writer.write_event(Event::Start(e.into_owned()))?;
                write_new_rows(&mut writer, &mut rows, u32::MAX)?;
                writer.write_event(Event::End(BytesEnd::new("sheetData")))?;
            }
            Event::End(e) if e.local_name().as_ref() == b"sheetData" => {
                write_new_rows(&mut writer, &mut rows, u32::MAX)?;
                in_sheet_data = false;
                writer.write_event(Event::End(e.into_owned()))?;
            }
            Event::Start(e) if in_sheet_data && e.local_name().as_ref() == b"row" => {
                let start = e.into_owned();
                match row_number(&start)? {
                    Some(row) => {
                        write_new_rows(&mut writer, &mut rows, row)?;
                        match rows.remove(&row) {
                            Some(cells) => {
                                writer.write_event(Event::Start(without_spans(&start)?))?;
                                patcher.patch_row(&mut reader, &mut writer, row, cells)?;
                            }
                            None => writer.write_event(Event::Start(start))?,
                        }
                    }
                    None => writer.write_event(Event::Start(start))?,
                }
            }
            Event::Empty(e) if in_sheet_data && e.local_name().as_ref() == b"row" => {
                let start = e.into_owned();
                match row_number(&start)? {
                    Some(row) => {
                        write_new_rows(&mut writer, &mut rows, row)?;
                        match rows.remove(&row) {
                            Some(cells) => {
                                writer.write_event(Event::Start(without_spans(&start)?))?;
                                for (col, value) in cells {
                                    write_cell(&mut writer, CellRef::new(row, col), value, None)?;
                                }
                                writer.write_event(Event::End(BytesEnd::new("row")))?;
                            }
                            None => writer.write_event(Event::Empty(start))?,
                        }
                    }
                    None => writer.write_event(Event::Empty(start))?,
                }
            }
            Event::Empty(e) if patcher.is_orphaned(&e)? => {}
            other => writer.write_event(other)?,
        }
        buf.clear();
    }

    if !saw_sheet_data && !rows.is_empty() {
        return Err(PackageError::Malformed("worksheet has no sheetData"));
    }
    Ok(writer.into_inner())
}

/// Tracks shared-formula groups whose master cell was overwritten
#[derive(Default)]
struct RowPatcher {
    orphaned: BTreeSet<String>,
}

impl RowPatcher {
    fn patch_row(
        &mut self,
        reader: &mut Reader<&[u8]>,
        writer: &mut Writer<Vec<u8>>,
        row: u32,
        cells: RowCells,
    ) -> Result<(), PackageError> {
        let mut pending: PendingCells = cells.into_iter().peekable();
        let mut buf = Vec::new();

        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Start(e) if e.local_name().as_ref() == b"c" => {
                    let start = e.into_owned();
                    let existing = cell_ref(&start)?.filter(|c| c.row == row);
                    match existing {
                        Some(cell) => {
                            write_pending_before(writer, &mut pending, row, cell.col)?;
                            match pending.next_if(|(col, _)| *col == cell.col) {
                                Some((_, value)) => {
                                    self.skip_cell(reader)?;
                                    write_cell(writer, cell, value, style_of(&start)?.as_deref())?;
                                }
                                None => writer.write_event(Event::Start(start))?,
                            }
                        }
                        None => writer.write_event(Event::Start(start))?,
                    }
                }
                Event::Empty(e) if e.local_name().as_ref() == b"c" => {
                    let start = e.into_owned();
                    let existing = cell_ref(&start)?.filter(|c| c.row == row);
                    match existing {
                        Some(cell) => {
                            write_pending_before(writer, &mut pending, row, cell.col)?;
                            match pending.next_if(|(col, _)| *col == cell.col) {
                                Some((_, value)) => {
                                    write_cell(writer, cell, value, style_of(&start)?.as_deref())?;
                                }
                                None => writer.write_event(Event::Empty(start))?,
                            }
                        }
                        None => writer.write_event(Event::Empty(start))?,
                    }
                }
                Event::End(e) if e.local_name().as_ref() == b"row" => {
                    for (col, value) in pending.by_ref() {
                        write_cell(writer, CellRef::new(row, col), value, None)?;
                    }
                    writer.write_event(Event::End(e.into_owned()))?;
                    return Ok(());
                }
                Event::Empty(e) if self.is_orphaned(&e)? => {}
                Event::Eof => return Err(PackageError::Malformed("unterminated row")),
                other => writer.write_event(other)?,
            }
            buf.clear();
        }
    }

    /// Consume the rest of a `<c>` element being replaced
    fn skip_cell(&mut self, reader: &mut Reader<&[u8]>) -> Result<(), PackageError> {
        let mut buf = Vec::new();
        let mut depth = 0usize;
        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Start(e) => {
                    if e.local_name().as_ref() == b"f" {
                        self.note_shared_master(&e)?;
                    }
                    depth += 1;
                }
                Event::End(e) => {
                    if depth == 0 && e.local_name().as_ref() == b"c" {
                        return Ok(());
                    }
                    depth = depth.saturating_sub(1);
                }
                Event::Eof => return Err(PackageError::Malformed("unterminated cell")),
                _ => {}
            }
            buf.clear();
        }
    }

    /// A shared formula master carries `ref`; its followers only `si`
    fn note_shared_master(&mut self, f: &BytesStart) -> Result<(), PackageError> {
        let mut shared = false;
        let mut has_ref = false;
        let mut si = None;
        for attr in f.attributes() {
            let attr = attr?;
            match attr.key.local_name().as_ref() {
                b"t" => shared = attr.unescape_value()?.as_ref() == "shared",
                b"ref" => has_ref = true,
                b"si" => si = Some(attr.unescape_value()?.into_owned()),
                _ => {}
            }
        }
        if let (true, true, Some(si)) = (shared, has_ref, si) {
            self.orphaned.insert(si);
        }
        Ok(())
    }

    /// Follower `<f t="shared" si=".."/>` of an overwritten master; dropped
    /// so the cell keeps its cached value instead of a dangling reference
    fn is_orphaned(&self, e: &BytesStart) -> Result<bool, PackageError> {
        if self.orphaned.is_empty() || e.local_name().as_ref() != b"f" {
            return Ok(false);
        }
        for attr in e.attributes() {
            let attr = attr?;
            if attr.key.local_name().as_ref() == b"si" {
                return Ok(self.orphaned.contains(attr.unescape_value()?.as_ref()));
            }
        }
        Ok(false)
    }
}

/// Emit rows with edits that come before `before` and are not in the sheet
fn write_new_rows(
    writer: &mut Writer<Vec<u8>>,
    rows: &mut BTreeMap<u32, RowCells>,
    before: u32,
) -> Result<(), PackageError> {
    while let Some(entry) = rows.first_entry() {
        if *entry.key() >= before {
            break;
        }
        let (row, cells) = entry.remove_entry();
        if cells.iter().all(|(_, value)| value.is_empty()) {
            continue;
        }
        let number = row.to_string();
        let mut start = BytesStart::new("row");
        start.push_attribute(("r", number.as_str()));
        writer.write_event(Event::Start(start))?;
        for (col, value) in cells {
            write_cell(writer, CellRef::new(row, col), value, None)?;
        }
        writer.write_event(Event::End(BytesEnd::new("row")))?;
    }
    Ok(())
}

fn write_pending_before(
    writer: &mut Writer<Vec<u8>>,
    pending: &mut PendingCells,
    row: u32,
    col: u16,
) -> Result<(), PackageError> {
    while let Some((pending_col, value)) = pending.next_if(|(c, _)| *c < col) {
        write_cell(writer, CellRef::new(row, pending_col), value, None)?;
    }
    Ok(())
}

fn write_cell(
    writer: &mut Writer<Vec<u8>>,
    cell: CellRef,
    value: &CellValue,
    style: Option<&str>,
) -> Result<(), PackageError> {
    let reference = cell.to_string();
    let mut start = BytesStart::new("c");
    start.push_attribute(("r", reference.as_str()));
    if let Some(style) = style {
        start.push_attribute(("s", style));
    }

    match value {
        // Clearing an unstyled cell removes it
        CellValue::Empty if style.is_none() => return Ok(()),
        CellValue::Empty => {
            writer.write_event(Event::Empty(start))?;
            return Ok(());
        }
        CellValue::Number(n) => {
            writer.write_event(Event::Start(start))?;
            write_text_element(writer, "v", &n.to_string())?;
        }
        CellValue::Bool(b) => {
            start.push_attribute(("t", "b"));
            writer.write_event(Event::Start(start))?;
            write_text_element(writer, "v", if *b { "1" } else { "0" })?;
        }
        CellValue::Formula(formula) => {
            writer.write_event(Event::Start(start))?;
            write_text_element(writer, "f", formula.trim_start_matches('='))?;
        }
        CellValue::Text(text) => {
            // Inline strings leave sharedStrings.xml untouched
            start.push_attribute(("t", "inlineStr"));
            writer.write_event(Event::Start(start))?;
            writer.write_event(Event::Start(BytesStart::new("is")))?;
            let mut t = BytesStart::new("t");
            t.push_attribute(("xml:space", "preserve"));
            writer.write_event(Event::Start(t))?;
            writer.write_event(Event::Text(BytesText::new(text)))?;
            writer.write_event(Event::End(BytesEnd::new("t")))?;
            writer.write_event(Event::End(BytesEnd::new("is")))?;
        }
    }

    writer.write_event(Event::End(BytesEnd::new("c")))?;
    Ok(())
}

fn write_text_element(writer: &mut Writer<Vec<u8>>, name: &str, text: &str) -> Result<(), PackageError> {
    writer.write_event(Event::Start(BytesStart::new(name)))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

fn row_number(start: &BytesStart) -> Result<Option<u32>, PackageError> {
    for attr in start.attributes() {
        let attr = attr?;
        if attr.key.local_name().as_ref() == b"r" {
            return Ok(attr.unescape_value()?.trim().parse().ok());
        }
    }
    Ok(None)
}

fn cell_ref(start: &BytesStart) -> Result<Option<CellRef>, PackageError> {
    for attr in start.attributes() {
        let attr = attr?;
        if attr.key.local_name().as_ref() == b"r" {
            return Ok(CellRef::from_a1(&attr.unescape_value()?));
        }
    }
    Ok(None)
}

fn style_of(start: &BytesStart) -> Result<Option<String>, PackageError> {
    for attr in start.attributes() {
        let attr = attr?;
        if attr.key.local_name().as_ref() == b"s" {
            return Ok(Some(attr.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}

/// `spans` is an optional hint that new cells may invalidate
fn without_spans(start: &BytesStart) -> Result<BytesStart<'static>, PackageError> {
    let mut rebuilt = BytesStart::new("row");
    for attr in start.attributes() {
        let attr = attr?;
        if attr.key.as_ref() != b"spans" {
            rebuilt.push_attribute(attr);
        }
    }
    Ok(rebuilt.into_owned())
}

fn edit_bounds(edits: &BTreeMap<CellRef, CellValue>) -> Option<(CellRef, CellRef)> {
    edits.keys().fold(None, |bounds, cell| {
        Some(match bounds {
            None => (*cell, *cell),
            Some((lo, hi)) => (
                CellRef::new(lo.row.min(cell.row), lo.col.min(cell.col)),
                CellRef::new(hi.row.max(cell.row), hi.col.max(cell.col)),
            ),
        })
    })
}

/// Grow `<dimension ref>` so it still covers every written cell
fn widen_dimension(
    e: &BytesStart,
    bounds: Option<(CellRef, CellRef)>,
) -> Result<BytesStart<'static>, PackageError> {
    let mut current = None;
    for attr in e.attributes() {
        let attr = attr?;
        if attr.key.local_name().as_ref() == b"ref" {
            let value = attr.unescape_value()?;
            let mut parts = value.split(':');
            let first = parts.next().and_then(CellRef::from_a1);
            let last = parts.next().and_then(CellRef::from_a1).or(first);
            current = first.zip(last);
        }
    }

    let (Some((lo, hi)), Some((edit_lo, edit_hi))) = (current, bounds) else {
        return Ok(e.clone().into_owned());
    };
    let lo = CellRef::new(lo.row.min(edit_lo.row), lo.col.min(edit_lo.col));
    let hi = CellRef::new(hi.row.max(edit_hi.row), hi.col.max(edit_hi.col));
    let range = if lo == hi { lo.to_string() } else { format!("{lo}:{hi}") };

    let mut dimension = BytesStart::new("dimension");
    dimension.push_attribute(("ref", range.as_str()));
    Ok(dimension.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patch(xml: &str, edits: &[(u32, u16, CellValue)]) -> String {
        let edits: BTreeMap<CellRef, CellValue> = edits
            .iter()
            .map(|(row, col, value)| (CellRef::new(*row, *col), value.clone()))
            .collect();
        String::from_utf8(patch_worksheet_xml(xml.as_bytes(), &edits).unwrap()).unwrap()
    }

    const SHEET: &str = concat!(
        r#"<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">"#,
        r#"<dimension ref="A1:C3"/>"#,
        r#"<cols><col min="1" max="1" width="30" customWidth="1"/></cols>"#,
        r#"<sheetData>"#,
        r#"<row r="1" spans="1:3"><c r="A1" s="2" t="s"><v>0</v></c><c r="C1" s="5"><v>7</v></c></row>"#,
        r#"<row r="3"><c r="B3" s="4"><f>SUM(C1:C2)</f><v>7</v></c></row>"#,
        r#"</sheetData>"#,
        r#"<mergeCells count="1"><mergeCell ref="A5:C5"/></mergeCells>"#,
        r#"</worksheet>"#
    );

    #[test]
    fn test_replaced_cell_keeps_style() {
        let out = patch(SHEET, &[(1, 3, CellValue::Number(3500.0))]);
        assert!(out.contains(r#"<c r="C1" s="5"><v>3500</v></c>"#), "{out}");
        assert!(out.contains(r#"<c r="A1" s="2" t="s"><v>0</v></c>"#));
    }

    #[test]
    fn test_untouched_parts_pass_through() {
        let out = patch(SHEET, &[(1, 3, CellValue::Number(1.0))]);
        assert!(out.contains(r#"<cols><col min="1" max="1" width="30" customWidth="1"/></cols>"#));
        assert!(out.contains(r#"<mergeCell ref="A5:C5"/>"#));
        assert!(out.contains(r#"<c r="B3" s="4"><f>SUM(C1:C2)</f><v>7</v></c>"#));
    }

    #[test]
    fn test_cells_and_rows_inserted_in_order() {
        let out = patch(
            SHEET,
            &[
                (1, 2, CellValue::from("품번")),
                (2, 1, CellValue::Number(5.0)),
                (9, 4, CellValue::Bool(true)),
            ],
        );
        let a1 = out.find(r#"r="A1""#).unwrap();
        let b1 = out.find(r#"r="B1""#).unwrap();
        let c1 = out.find(r#"r="C1""#).unwrap();
        assert!(a1 < b1 && b1 < c1, "{out}");
        assert!(out.contains(r#"<c r="B1" t="inlineStr"><is><t xml:space="preserve">품번</t></is></c>"#));

        let row2 = out.find(r#"<row r="2">"#).unwrap();
        let row3 = out.find(r#"<row r="3">"#).unwrap();
        assert!(row2 < row3);
        assert!(out.contains(r#"<row r="9"><c r="D9" t="b"><v>1</v></c></row></sheetData>"#));
        assert!(out.contains(r#"<dimension ref="A1:D9"/>"#));
    }

    #[test]
    fn test_edited_row_drops_spans() {
        let out = patch(SHEET, &[(1, 6, CellValue::Number(1.0))]);
        assert!(out.contains(r#"<row r="1">"#), "{out}");
        assert!(!out.contains("spans"));
    }

    #[test]
    fn test_formula_and_clear() {
        let out = patch(
            SHEET,
            &[(3, 2, CellValue::Formula("=SUM(L27:L45)".into())), (1, 1, CellValue::Empty)],
        );
        assert!(out.contains(r#"<c r="B3" s="4"><f>SUM(L27:L45)</f></c>"#), "{out}");
        assert!(out.contains(r#"<c r="A1" s="2"/>"#));
    }

    #[test]
    fn test_clearing_missing_cells_adds_nothing() {
        let out = patch(SHEET, &[(2, 2, CellValue::Empty), (3, 3, CellValue::Empty)]);
        assert!(!out.contains(r#"<row r="2""#), "{out}");
        assert!(!out.contains(r#"r="C3""#));
    }

    #[test]
    fn test_text_is_escaped() {
        let out = patch(SHEET, &[(3, 1, CellValue::from("A&B <x>"))]);
        assert!(out.contains("A&amp;B &lt;x&gt;"), "{out}");
    }

    #[test]
    fn test_empty_sheet_data_gets_rows() {
        let xml = r#"<worksheet><sheetData/></worksheet>"#;
        let out = patch(xml, &[(2, 1, CellValue::Number(4.0))]);
        assert_eq!(
            out,
            r#"<worksheet><sheetData><row r="2"><c r="A2"><v>4</v></c></row></sheetData></worksheet>"#
        );
    }

    #[test]
    fn test_overwritten_shared_master_releases_followers() {
        let xml = concat!(
            r#"<worksheet><sheetData>"#,
            r#"<row r="1"><c r="A1"><f t="shared" ref="A1:A2" si="0">B1*2</f><v>2</v></c></row>"#,
            r#"<row r="2"><c r="A2"><f t="shared" si="0"/><v>4</v></c></row>"#,
            r#"</sheetData></worksheet>"#
        );
        let out = patch(xml, &[(1, 1, CellValue::Number(9.0))]);
        assert!(out.contains(r#"<c r="A1"><v>9</v></c>"#), "{out}");
        assert!(out.contains(r#"<c r="A2"><v>4</v></c>"#), "{out}");
    }
}
