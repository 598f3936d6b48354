//! M3U playlist parsing
//!
//! Turns extended M3U text into [`Channel`] entities. Parsing is line based:
//! an `#EXTINF` directive opens a record, `#EXTVLCOPT` lines directly after it
//! attach delivery headers, and the next `scheme://` line closes it. Anything
//! that does not fit that shape is dropped without failing the playlist.

use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::config::defaults::DEFAULT_GENRE;
use crate::errors::{AppError, AppResult};
use crate::models::{Catalog, CatalogBuilder, Channel, StreamDescriptor};
use crate::utils::url::UrlUtils;

const HEADER_PREFIX: &str = "#EXTM3U";
const EXTINF_PREFIX: &str = "#EXTINF:";
const VLCOPT_PREFIX: &str = "#EXTVLCOPT:";

/// Attributes consumed into typed [`Channel`] fields
const CONSUMED_ATTRIBUTES: &[&str] = &[
    "tvg-id",
    "tvg-name",
    "tvg-logo",
    "tvg-chno",
    "tvg-channo",
    "group-title",
];

/// Header attributes naming the default guide URL, in priority order
const SCHEDULE_URL_ATTRIBUTES: &[&str] = &["url-tvg", "x-tvg-url"];

/// Counters gathered while parsing one playlist
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PlaylistStats {
    pub channels: usize,
    /// Records dropped for lack of a URL or an identity, plus stray text lines
    pub malformed: usize,
    /// URL lines with no open record
    pub orphan_urls: usize,
    pub duplicates: usize,
}

/// `#EXTINF` record waiting for its URL line
#[derive(Debug)]
struct PendingRecord {
    attributes: BTreeMap<String, String>,
    display_name: String,
    headers: BTreeMap<String, String>,
    accepting_options: bool,
    line_number: usize,
}

/// Parse playlist text into a catalog
///
/// Deterministic for identical input. Never fails: malformed records are
/// counted and dropped.
pub fn parse_playlist(content: &str) -> Catalog {
    let mut builder = CatalogBuilder::new();
    let stats = parse_into(content, &mut builder);
    info!(
        "Parsed playlist: {} channels, {} malformed, {} orphan URLs, {} duplicates",
        stats.channels, stats.malformed, stats.orphan_urls, stats.duplicates
    );
    builder.build()
}

/// Parse playlist text, pushing channels into an existing builder
pub fn parse_into(content: &str, builder: &mut CatalogBuilder) -> PlaylistStats {
    let mut stats = PlaylistStats::default();
    let mut pending: Option<PendingRecord> = None;

    for (index, raw_line) in content.lines().enumerate() {
        let line_number = index + 1;
        let line = raw_line.trim_start_matches('\u{feff}').trim();

        if line.is_empty() {
            continue;
        }

        if let Some(rest) = line.strip_prefix(HEADER_PREFIX) {
            let header = parse_attributes(rest);
            let url = SCHEDULE_URL_ATTRIBUTES
                .iter()
                .find_map(|key| header.get(*key).filter(|v| !v.trim().is_empty()));
            if let Some(url) = url {
                debug!("Playlist header declares schedule URL");
                builder.offer_schedule_url(Some(url));
            }
            continue;
        }

        if let Some(rest) = line.strip_prefix(EXTINF_PREFIX) {
            if let Some(previous) = pending.take() {
                debug!(
                    "Dropping record at line {}: no URL before next directive",
                    previous.line_number
                );
                stats.malformed += 1;
            }
            pending = Some(parse_extinf(rest, line_number));
            continue;
        }

        if let Some(rest) = line.strip_prefix(VLCOPT_PREFIX) {
            if let Some(record) = pending.as_mut().filter(|r| r.accepting_options) {
                apply_vlc_option(record, rest);
            }
            continue;
        }

        if line.starts_with('#') {
            if let Some(record) = pending.as_mut() {
                record.accepting_options = false;
            }
            continue;
        }

        if !UrlUtils::has_scheme(line) {
            debug!("Ignoring non-URL line {}", line_number);
            stats.malformed += 1;
            continue;
        }

        match pending.take() {
            Some(record) => match complete_record(record, line) {
                Ok(channel) => {
                    if builder.push(channel) {
                        stats.channels += 1;
                    } else {
                        stats.duplicates += 1;
                    }
                }
                Err(e) => {
                    debug!("{}", e);
                    stats.malformed += 1;
                }
            },
            None => {
                debug!("Ignoring URL without metadata at line {}", line_number);
                stats.orphan_urls += 1;
            }
        }
    }

    if let Some(record) = pending {
        debug!(
            "Dropping record at line {}: input ended before its URL",
            record.line_number
        );
        stats.malformed += 1;
    }

    stats
}

fn parse_extinf(rest: &str, line_number: usize) -> PendingRecord {
    let (head, display_name) = match last_unquoted_comma(rest) {
        Some(pos) => (&rest[..pos], rest[pos + 1..].trim()),
        None => (rest, ""),
    };

    PendingRecord {
        attributes: parse_attributes(head),
        display_name: display_name.to_string(),
        headers: BTreeMap::new(),
        accepting_options: true,
        line_number,
    }
}

fn apply_vlc_option(record: &mut PendingRecord, option: &str) {
    let Some((key, value)) = option.trim().split_once('=') else {
        return;
    };
    let header = match key.trim().to_ascii_lowercase().as_str() {
        "http-user-agent" => "User-Agent",
        "http-referrer" | "http-referer" => "Referer",
        _ => return,
    };
    let value = value.trim();
    if !value.is_empty() {
        record.headers.insert(header.to_string(), value.to_string());
    }
}

fn complete_record(record: PendingRecord, url: &str) -> AppResult<Channel> {
    let PendingRecord {
        mut attributes,
        display_name,
        headers,
        line_number,
        ..
    } = record;

    let non_empty = |key: &str| {
        attributes
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };

    let identity = non_empty("tvg-id").unwrap_or_else(|| display_name.clone());
    if identity.is_empty() {
        return Err(AppError::malformed(
            format!("playlist line {line_number}"),
            "record has neither a schedule id nor a display name",
        ));
    }

    let name = non_empty("tvg-name")
        .or_else(|| (!display_name.is_empty()).then(|| display_name.clone()))
        .unwrap_or_else(|| identity.clone());

    let mut genres: Vec<String> = non_empty("group-title")
        .map(|group| {
            group
                .split(';')
                .map(str::trim)
                .filter(|g| !g.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    if genres.is_empty() {
        genres.push(DEFAULT_GENRE.to_string());
    }

    let logo = non_empty("tvg-logo");
    let number = non_empty("tvg-chno")
        .or_else(|| non_empty("tvg-channo"))
        .and_then(|n| n.parse::<u32>().ok());

    attributes.retain(|key, _| !CONSUMED_ATTRIBUTES.contains(&key.as_str()));

    Ok(Channel {
        id: Channel::qualified_id(&identity),
        identity,
        name,
        genres,
        logo,
        number,
        stream: StreamDescriptor {
            url: url.to_string(),
            headers,
        },
        attributes,
    })
}

/// Byte offset of the last comma not inside a quoted value
fn last_unquoted_comma(text: &str) -> Option<usize> {
    let mut in_quotes = false;
    let mut last = None;
    for (pos, ch) in text.char_indices() {
        match ch {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => last = Some(pos),
            _ => {}
        }
    }
    last
}

/// Tokenize `key="value"` pairs into a map
///
/// Keys are lowercased. Values may be quoted or bare; a missing closing quote
/// takes the rest of the input. Bare words without `=` (such as the duration)
/// are skipped, and for a repeated key the first occurrence wins.
pub fn parse_attributes(input: &str) -> BTreeMap<String, String> {
    let mut attributes = BTreeMap::new();
    let mut chars = input.chars().peekable();

    loop {
        while chars.next_if(|c| c.is_whitespace()).is_some() {}
        if chars.peek().is_none() {
            break;
        }

        let mut key = String::new();
        while let Some(ch) = chars.next_if(|c| !c.is_whitespace() && *c != '=') {
            key.push(ch);
        }

        if chars.next_if_eq(&'=').is_none() {
            continue;
        }

        let mut value = String::new();
        if chars.next_if_eq(&'"').is_some() {
            for ch in chars.by_ref() {
                if ch == '"' {
                    break;
                }
                value.push(ch);
            }
        } else {
            while let Some(ch) = chars.next_if(|c| !c.is_whitespace()) {
                value.push(ch);
            }
        }

        let key = key.trim().to_ascii_lowercase();
        if !key.is_empty() {
            attributes.entry(key).or_insert(value);
        }
    }

    attributes
}
