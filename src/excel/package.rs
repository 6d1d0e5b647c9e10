//! xlsx package held as its original zip parts
//!
//! Exports never rebuild the workbook. The template's parts are kept as-is
//! and only the cost sheet's worksheet XML is rewritten, so styles, column
//! widths, print areas, drawings and defined names reach the output intact.

use super::grid::{CellRef, CellValue};
use super::patch::patch_worksheet_xml;
use crate::error::ExportError;
use quick_xml::events::{BytesStart, Event};
use quick_xml::{Reader, Writer};
use std::collections::{BTreeMap, HashMap};
use std::io::{Cursor, Read, Write};
use thiserror::Error;
use tracing::debug;

const WORKBOOK_PART: &str = "xl/workbook.xml";
const WORKBOOK_RELS_PART: &str = "xl/_rels/workbook.xml.rels";
const CONTENT_TYPES_PART: &str = "[Content_Types].xml";
const CALC_CHAIN_PART: &str = "xl/calcChain.xml";

/// Workbook children that must follow `<calcPr>`
const AFTER_CALC_PR: &[&[u8]] = &[
    b"oleSize",
    b"customWorkbookViews",
    b"pivotCaches",
    b"smartTagPr",
    b"smartTagTypes",
    b"webPublishing",
    b"fileRecoveryPr",
    b"webPublishObjects",
    b"extLst",
];

/// Low-level package failures, reported as [`ExportError::Unexpected`]
#[derive(Error, Debug)]
pub(super) enum PackageError {
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("XML attribute error: {0}")]
    Attr(#[from] quick_xml::events::attributes::AttrError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed package: {0}")]
    Malformed(&'static str),
}

/// The template's zip parts in archive order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TemplatePackage {
    parts: Vec<(String, Vec<u8>)>,
}

impl TemplatePackage {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ExportError> {
        read_parts(bytes).map_err(|e| ExportError::unexpected("failed to open template", &e))
    }

    pub fn part(&self, name: &str) -> Option<&[u8]> {
        self.parts
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, bytes)| bytes.as_slice())
    }

    pub fn part_names(&self) -> impl Iterator<Item = &str> {
        self.parts.iter().map(|(n, _)| n.as_str())
    }

    fn set_part(&mut self, name: &str, bytes: Vec<u8>) {
        match self.parts.iter_mut().find(|(n, _)| n == name) {
            Some((_, existing)) => *existing = bytes,
            None => self.parts.push((name.to_string(), bytes)),
        }
    }

    fn remove_part(&mut self, name: &str) -> bool {
        let before = self.parts.len();
        self.parts.retain(|(n, _)| n != name);
        self.parts.len() != before
    }

    /// Zero-based index of the tab Excel opens on (`workbookView@activeTab`)
    pub fn active_sheet(&self) -> usize {
        self.part(WORKBOOK_PART)
            .and_then(|xml| active_tab(xml).ok())
            .unwrap_or(0)
    }

    /// Zip part holding the worksheet named `sheet_name`
    pub fn worksheet_part(&self, sheet_name: &str) -> Option<String> {
        let workbook = self.part(WORKBOOK_PART)?;
        let rels = self.part(WORKBOOK_RELS_PART)?;
        let rel_id = sheet_relationships(workbook)
            .ok()?
            .into_iter()
            .find(|(name, _)| name == sheet_name)
            .map(|(_, rel_id)| rel_id)?;
        let target = relationship_targets(rels).ok()?.remove(&rel_id)?;
        Some(resolve_target(&target))
    }

    /// Write `edits` into the named sheet, leaving every other part untouched
    ///
    /// The calculation chain is dropped and a full recalculation requested,
    /// since cached formula results no longer match the written inputs.
    pub fn patch_sheet(
        &mut self,
        sheet_name: &str,
        edits: &BTreeMap<CellRef, CellValue>,
    ) -> Result<(), ExportError> {
        let part = self.worksheet_part(sheet_name).ok_or_else(|| {
            ExportError::Unexpected(format!("no worksheet part for sheet '{sheet_name}'"))
        })?;
        let original = self
            .part(&part)
            .ok_or_else(|| ExportError::Unexpected(format!("missing worksheet part {part}")))?;

        let patched = patch_worksheet_xml(original, edits)
            .map_err(|e| ExportError::unexpected(&format!("failed to patch {part}"), &e))?;
        self.set_part(&part, patched);
        self.refresh_calculation()
            .map_err(|e| ExportError::unexpected("failed to update workbook calculation", &e))?;

        debug!(sheet = %sheet_name, part = %part, cells = edits.len(), "patched worksheet");
        Ok(())
    }

    fn refresh_calculation(&mut self) -> Result<(), PackageError> {
        if self.remove_part(CALC_CHAIN_PART) {
            if let Some(rels) = self.part(WORKBOOK_RELS_PART) {
                let rels = without_elements(rels, b"Relationship", |e| {
                    Ok(attribute(e, b"Target")?.is_some_and(|t| t.ends_with("calcChain.xml")))
                })?;
                self.set_part(WORKBOOK_RELS_PART, rels);
            }
            if let Some(types) = self.part(CONTENT_TYPES_PART) {
                let types = without_elements(types, b"Override", |e| {
                    Ok(attribute(e, b"PartName")?.is_some_and(|p| p == "/xl/calcChain.xml"))
                })?;
                self.set_part(CONTENT_TYPES_PART, types);
            }
        }

        if let Some(workbook) = self.part(WORKBOOK_PART) {
            let workbook = with_full_calc_on_load(workbook)?;
            self.set_part(WORKBOOK_PART, workbook);
        }
        Ok(())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, ExportError> {
        write_parts(&self.parts).map_err(|e| ExportError::unexpected("failed to serialize workbook", &e))
    }
}

fn read_parts(bytes: &[u8]) -> Result<TemplatePackage, PackageError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))?;
    let mut parts = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        let mut file = archive.by_index(i)?;
        if file.is_dir() {
            continue;
        }
        let mut buf = Vec::with_capacity(file.size() as usize);
        file.read_to_end(&mut buf)?;
        parts.push((file.name().to_string(), buf));
    }
    Ok(TemplatePackage { parts })
}

fn write_parts(parts: &[(String, Vec<u8>)]) -> Result<Vec<u8>, PackageError> {
    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = zip::write::FileOptions::<()>::default()
        .compression_method(zip::CompressionMethod::Deflated);
    for (name, bytes) in parts {
        zip.start_file(name.as_str(), options)?;
        zip.write_all(bytes)?;
    }
    Ok(zip.finish()?.into_inner())
}

fn attribute(e: &BytesStart, key: &[u8]) -> Result<Option<String>, PackageError> {
    for attr in e.attributes() {
        let attr = attr?;
        if attr.key.as_ref() == key || attr.key.local_name().as_ref() == key {
            return Ok(Some(attr.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}

/// `(sheet name, relationship id)` pairs from `xl/workbook.xml`
fn sheet_relationships(xml: &[u8]) -> Result<Vec<(String, String)>, PackageError> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut sheets = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"sheet" => {
                let mut name = None;
                let mut rel_id = None;
                for attr in e.attributes() {
                    let attr = attr?;
                    // `r:id` is namespaced; `sheetId` is a different attribute
                    match attr.key.local_name().as_ref() {
                        b"name" => name = Some(attr.unescape_value()?.into_owned()),
                        b"id" => rel_id = Some(attr.unescape_value()?.into_owned()),
                        _ => {}
                    }
                }
                if let (Some(name), Some(rel_id)) = (name, rel_id) {
                    sheets.push((name, rel_id));
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(sheets)
}

fn relationship_targets(xml: &[u8]) -> Result<HashMap<String, String>, PackageError> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut targets = HashMap::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"Relationship" => {
                if let (Some(id), Some(target)) = (attribute(&e, b"Id")?, attribute(&e, b"Target")?) {
                    targets.insert(id, target);
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(targets)
}

fn active_tab(xml: &[u8]) -> Result<usize, PackageError> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"workbookView" => {
                return Ok(attribute(&e, b"activeTab")?
                    .and_then(|v| v.trim().parse().ok())
                    .unwrap_or(0));
            }
            Event::Eof => return Ok(0),
            _ => {}
        }
        buf.clear();
    }
}

/// Workbook relationship targets are relative to `xl/` unless rooted
fn resolve_target(target: &str) -> String {
    let joined = match target.strip_prefix('/') {
        Some(absolute) => absolute.to_string(),
        None => format!("xl/{target}"),
    };
    let mut segments: Vec<&str> = Vec::new();
    for segment in joined.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }
    segments.join("/")
}

/// Copy `xml` without the `tag` elements `unwanted` selects
fn without_elements(
    xml: &[u8],
    tag: &[u8],
    unwanted: impl Fn(&BytesStart) -> Result<bool, PackageError>,
) -> Result<Vec<u8>, PackageError> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(false);
    let mut writer = Writer::new(Vec::with_capacity(xml.len()));
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Eof => break,
            Event::Empty(e) if e.local_name().as_ref() == tag && unwanted(&e)? => {}
            Event::Start(e) if e.local_name().as_ref() == tag && unwanted(&e)? => {
                skip_element(&mut reader)?;
            }
            other => writer.write_event(other)?,
        }
        buf.clear();
    }
    Ok(writer.into_inner())
}

fn skip_element(reader: &mut Reader<&[u8]>) -> Result<(), PackageError> {
    let mut buf = Vec::new();
    let mut depth = 0usize;
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(_) => depth += 1,
            Event::End(_) if depth == 0 => return Ok(()),
            Event::End(_) => depth -= 1,
            Event::Eof => return Err(PackageError::Malformed("unterminated element")),
            _ => {}
        }
        buf.clear();
    }
}

/// Set `fullCalcOnLoad="1"` on `<calcPr>`, adding the element when absent
fn with_full_calc_on_load(xml: &[u8]) -> Result<Vec<u8>, PackageError> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(false);
    let mut writer = Writer::new(Vec::with_capacity(xml.len() + 32));
    let mut buf = Vec::new();
    let mut depth = 0usize;
    let mut done = false;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Eof => break,
            Event::Empty(e) if e.local_name().as_ref() == b"calcPr" => {
                writer.write_event(Event::Empty(full_calc(&e)?))?;
                done = true;
            }
            Event::Start(e) if e.local_name().as_ref() == b"calcPr" => {
                writer.write_event(Event::Start(full_calc(&e)?))?;
                depth += 1;
                done = true;
            }
            Event::Start(e) => {
                if !done && depth == 1 && follows_calc_pr(&e) {
                    writer.write_event(Event::Empty(new_calc_pr()))?;
                    done = true;
                }
                writer.write_event(Event::Start(e))?;
                depth += 1;
            }
            Event::Empty(e) => {
                if !done && depth == 1 && follows_calc_pr(&e) {
                    writer.write_event(Event::Empty(new_calc_pr()))?;
                    done = true;
                }
                writer.write_event(Event::Empty(e))?;
            }
            Event::End(e) => {
                if !done && depth == 1 {
                    writer.write_event(Event::Empty(new_calc_pr()))?;
                    done = true;
                }
                writer.write_event(Event::End(e))?;
                depth = depth.saturating_sub(1);
            }
            other => writer.write_event(other)?,
        }
        buf.clear();
    }
    Ok(writer.into_inner())
}

fn follows_calc_pr(e: &BytesStart) -> bool {
    AFTER_CALC_PR.iter().any(|name| *name == e.local_name().as_ref())
}

fn new_calc_pr() -> BytesStart<'static> {
    let mut calc_pr = BytesStart::new("calcPr");
    calc_pr.push_attribute(("fullCalcOnLoad", "1"));
    calc_pr
}

fn full_calc(e: &BytesStart) -> Result<BytesStart<'static>, PackageError> {
    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
    let mut calc_pr = BytesStart::new(name);
    for attr in e.attributes() {
        let attr = attr?;
        if attr.key.local_name().as_ref() != b"fullCalcOnLoad" {
            calc_pr.push_attribute(attr);
        }
    }
    calc_pr.push_attribute(("fullCalcOnLoad", "1"));
    Ok(calc_pr.into_owned())
}
