//! Quick-XML based XMLTV parser
//!
//! Streams `<programme>` elements out of a guide document and hands them to a
//! sink in bounded batches, so a guide with hundreds of thousands of entries
//! never has to exist as one parsed tree. Only the fields the guide uses are
//! extracted.

use quick_xml::Reader;
use quick_xml::escape::resolve_predefined_entity;
use quick_xml::events::{BytesStart, Event};
use std::collections::HashMap;
use tracing::debug;

use crate::errors::{AppError, AppResult, DecodeError};
use crate::models::Program;
use crate::utils::time::parse_xmltv_datetime;

/// Title used when a programme carries none
pub const UNTITLED: &str = "Untitled";

/// One schedule entry with its channel reference
#[derive(Debug, Clone, PartialEq)]
pub struct XmltvProgramme {
    pub channel: String,
    pub program: Program,
}

/// Counters for one parsed document
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct XmltvStats {
    pub programmes: usize,
    /// Entries dropped for a missing channel or unparseable start/stop
    pub dropped: usize,
    pub batches: usize,
}

/// Raw text fields of a `<programme>` while it is being read
#[derive(Debug, Default)]
struct RawProgramme {
    channel: String,
    start: String,
    stop: String,
    title: Option<String>,
    description: Option<String>,
    category: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TextField {
    Title,
    Description,
    Category,
}

impl RawProgramme {
    fn into_programme(self) -> AppResult<XmltvProgramme> {
        let channel = self.channel.trim();
        if channel.is_empty() {
            return Err(AppError::malformed("programme", "missing channel attribute"));
        }
        let start = parse_xmltv_datetime(&self.start).ok_or_else(|| {
            AppError::malformed(
                format!("programme on {channel}"),
                format!("unparseable start '{}'", self.start),
            )
        })?;
        let stop = parse_xmltv_datetime(&self.stop).ok_or_else(|| {
            AppError::malformed(
                format!("programme on {channel}"),
                format!("unparseable stop '{}'", self.stop),
            )
        })?;

        Ok(XmltvProgramme {
            channel: channel.to_string(),
            program: Program {
                start,
                stop,
                title: self.title.unwrap_or_else(|| UNTITLED.to_string()),
                description: self.description,
                category: self.category,
            },
        })
    }

    /// First non-empty value of each field wins
    fn set_field(&mut self, field: TextField, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        let slot = match field {
            TextField::Title => &mut self.title,
            TextField::Description => &mut self.description,
            TextField::Category => &mut self.category,
        };
        if slot.is_none() {
            *slot = Some(text.to_string());
        }
    }
}

/// Parse an XMLTV document, delivering programmes to `sink` in batches of at
/// most `batch_size`
///
/// Entries that cannot be interpreted are counted and skipped. A structural
/// XML error aborts the document with [`DecodeError::Xml`]; batches already
/// delivered are the caller's to discard.
pub fn parse_programmes<F>(content: &str, batch_size: usize, mut sink: F) -> AppResult<XmltvStats>
where
    F: FnMut(Vec<XmltvProgramme>),
{
    let batch_size = batch_size.max(1);
    let mut reader = Reader::from_str(content);
    let mut stats = XmltvStats::default();
    let mut batch = Vec::with_capacity(batch_size.min(1024));

    let mut current: Option<RawProgramme> = None;
    let mut field: Option<TextField> = None;
    let mut text = String::new();

    loop {
        let event = reader.read_event().map_err(|e| DecodeError::Xml {
            position: reader.error_position() as u64,
            message: e.to_string(),
        })?;

        match event {
            Event::Start(ref e) => match e.local_name().as_ref() {
                b"programme" => {
                    current = Some(programme_from_attributes(e));
                    field = None;
                }
                name => {
                    if current.is_some() && field.is_none() {
                        field = text_field(name);
                        text.clear();
                    }
                }
            },

            Event::Empty(ref e) => {
                // Self-closing programme without children
                if e.local_name().as_ref() == b"programme" {
                    let raw = programme_from_attributes(e);
                    push_programme(raw, &mut batch, &mut stats);
                }
            }

            Event::End(ref e) => match e.local_name().as_ref() {
                b"programme" => {
                    if let Some(raw) = current.take() {
                        push_programme(raw, &mut batch, &mut stats);
                    }
                    field = None;
                }
                name => {
                    if let (Some(open), Some(raw)) = (field, current.as_mut())
                        && text_field(name) == Some(open)
                    {
                        raw.set_field(open, &text);
                        field = None;
                        text.clear();
                    }
                }
            },

            Event::Text(ref e) if field.is_some() => {
                text.push_str(&String::from_utf8_lossy(e));
            }

            Event::CData(ref e) if field.is_some() => {
                text.push_str(&String::from_utf8_lossy(e));
            }

            Event::GeneralRef(ref e) if field.is_some() => {
                let name = String::from_utf8_lossy(e);
                if let Some(resolved) = resolve_reference(&name) {
                    text.push_str(&resolved);
                }
            }

            Event::Eof => break,

            _ => {}
        }

        if batch.len() >= batch_size {
            stats.batches += 1;
            sink(std::mem::replace(&mut batch, Vec::with_capacity(batch_size.min(1024))));
        }
    }

    if !batch.is_empty() {
        stats.batches += 1;
        sink(batch);
    }

    debug!(
        "Parsed {} programmes in {} batches ({} dropped)",
        stats.programmes, stats.batches, stats.dropped
    );
    Ok(stats)
}

fn push_programme(raw: RawProgramme, batch: &mut Vec<XmltvProgramme>, stats: &mut XmltvStats) {
    match raw.into_programme() {
        Ok(programme) => {
            stats.programmes += 1;
            batch.push(programme);
        }
        Err(e) => {
            stats.dropped += 1;
            debug!("Skipping schedule entry: {}", e);
        }
    }
}

fn text_field(name: &[u8]) -> Option<TextField> {
    match name {
        b"title" => Some(TextField::Title),
        b"desc" => Some(TextField::Description),
        b"category" => Some(TextField::Category),
        _ => None,
    }
}

fn programme_from_attributes(element: &BytesStart) -> RawProgramme {
    let attrs = parse_attributes(element);
    RawProgramme {
        channel: attrs.get("channel").cloned().unwrap_or_default(),
        start: attrs.get("start").cloned().unwrap_or_default(),
        stop: attrs.get("stop").cloned().unwrap_or_default(),
        ..Default::default()
    }
}

/// Parse XML attributes into a HashMap
fn parse_attributes(element: &BytesStart) -> HashMap<String, String> {
    let mut attrs = HashMap::new();

    for attr in element.attributes().flatten() {
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = match attr.unescape_value() {
            Ok(value) => value.into_owned(),
            Err(_) => String::from_utf8_lossy(&attr.value).into_owned(),
        };
        attrs.insert(key, value);
    }
    attrs
}

/// Resolve `&name;` or `&#NN;` / `&#xNN;` to its text
fn resolve_reference(name: &str) -> Option<String> {
    if let Some(code) = name.strip_prefix('#') {
        let value = match code.strip_prefix('x').or_else(|| code.strip_prefix('X')) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => code.parse::<u32>().ok()?,
        };
        return char::from_u32(value).map(String::from);
    }
    resolve_predefined_entity(name).map(str::to_string)
}
