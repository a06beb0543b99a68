//! Transfer stream reader.
//!
//! The root element is a wrapper and its name is ignored. Every child of the
//! root is a row candidate: either an element named after a table, or a
//! generic `table` element whose real name comes from a `table-name`
//! attribute or child. Anything that does not resolve against the model is
//! skipped.

use std::collections::HashMap;
use std::io::BufRead;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::forms::{BASE64_ATTR, COLUMN_ELEMENT, COLUMN_NAME, COLUMN_VALUE, TABLE_ELEMENT, TABLE_NAME};
use super::value::ValueCodec;
use crate::config::SessionConfig;
use crate::core::{Model, Row, Table};
use crate::error::{Result, TransferError};

/// Counters collected while reading a document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadStats {
    /// Rows decoded.
    pub rows: u64,
    /// Row elements skipped because their table is unknown or unnamed.
    pub skipped_rows: u64,
    /// Column values skipped because the column is unknown.
    pub skipped_columns: u64,
}

/// Decodes a transfer document into rows of a model.
#[derive(Debug, Clone)]
pub struct DataReader {
    model: Arc<Model>,
    codec: ValueCodec,
    case_sensitive: bool,
}

/// One markup node, owned.
enum Node {
    Open {
        name: String,
        attrs: Vec<(String, String)>,
        empty: bool,
    },
    Close,
    Text(String),
    Eof,
}

/// Row element content before it is matched against the model.
#[derive(Default)]
struct RawRow {
    table: Option<String>,
    entries: Vec<(String, String)>,
}

/// Pull parser producing owned [`Node`]s.
struct NodeSource<R: BufRead> {
    reader: Reader<R>,
    buf: Vec<u8>,
}

impl<R: BufRead> NodeSource<R> {
    fn new(input: R) -> Self {
        let mut reader = Reader::from_reader(input);
        reader.trim_text(false);
        reader.expand_empty_elements(false);
        Self {
            reader,
            buf: Vec::new(),
        }
    }

    fn next(&mut self) -> Result<Node> {
        loop {
            self.buf.clear();
            let node = match self.reader.read_event_into(&mut self.buf)? {
                Event::Start(e) => open_node(&self.reader, &e, false)?,
                Event::Empty(e) => open_node(&self.reader, &e, true)?,
                Event::End(_) => Node::Close,
                Event::Text(t) => Node::Text(t.unescape()?.into_owned()),
                Event::CData(c) => {
                    Node::Text(self.reader.decoder().decode(&c)?.into_owned())
                }
                Event::Eof => Node::Eof,
                Event::Decl(_) | Event::PI(_) | Event::DocType(_) | Event::Comment(_) => continue,
            };
            return Ok(node);
        }
    }

    /// Skip the rest of an element whose start tag was just read.
    fn skip_element(&mut self) -> Result<()> {
        let mut depth = 1usize;
        while depth > 0 {
            match self.next()? {
                Node::Open { empty: false, .. } => depth += 1,
                Node::Close => depth -= 1,
                Node::Eof => return Err(unexpected_eof()),
                _ => {}
            }
        }
        Ok(())
    }

    /// Read the text of an element whose start tag was just read.
    ///
    /// Text and CDATA runs are concatenated; nested elements are skipped.
    fn element_text(&mut self, attrs: &[(String, String)], empty: bool) -> Result<String> {
        let mut text = String::new();
        if !empty {
            loop {
                match self.next()? {
                    Node::Text(t) => text.push_str(&t),
                    Node::Open { empty: true, .. } => {}
                    Node::Open { empty: false, .. } => self.skip_element()?,
                    Node::Close => break,
                    Node::Eof => return Err(unexpected_eof()),
                }
            }
        }
        if is_base64(attrs) {
            decode_base64_text(&text)
        } else {
            Ok(text)
        }
    }
}

fn open_node<R>(reader: &Reader<R>, e: &BytesStart<'_>, empty: bool) -> Result<Node> {
    let name = reader.decoder().decode(e.name().as_ref())?.into_owned();
    let mut attrs = Vec::new();
    for attr in e.attributes() {
        let attr = attr.map_err(quick_xml::Error::from)?;
        let key = reader.decoder().decode(attr.key.as_ref())?.into_owned();
        let value = attr.decode_and_unescape_value(reader)?.into_owned();
        attrs.push((key, value));
    }
    Ok(Node::Open { name, attrs, empty })
}

fn attr<'a>(attrs: &'a [(String, String)], key: &str) -> Option<&'a str> {
    attrs
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

fn is_base64(attrs: &[(String, String)]) -> bool {
    attr(attrs, BASE64_ATTR).is_some_and(|v| v.trim().eq_ignore_ascii_case("true"))
}

fn decode_base64_text(text: &str) -> Result<String> {
    let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = BASE64.decode(compact.as_bytes())?;
    String::from_utf8(bytes)
        .map_err(|e| TransferError::format(format!("base64 payload is not UTF-8 text: {e}")))
}

fn unexpected_eof() -> TransferError {
    TransferError::format("transfer stream ended inside an element")
}

impl DataReader {
    /// Create a reader for the given model.
    pub fn new(model: Arc<Model>, config: &SessionConfig, codec: ValueCodec) -> Self {
        Self {
            model,
            codec,
            case_sensitive: config.case_sensitive,
        }
    }

    /// Read every row of a document.
    ///
    /// Fails without returning any rows if the markup is malformed or a
    /// value cannot be decoded.
    pub fn read_rows<R: BufRead>(&self, input: R) -> Result<Vec<Row>> {
        let (rows, stats) = self.read_rows_with_stats(input)?;
        info!(
            "Read {} rows ({} rows and {} values skipped)",
            stats.rows, stats.skipped_rows, stats.skipped_columns
        );
        Ok(rows)
    }

    /// Read every row of a document and report what was skipped.
    pub fn read_rows_with_stats<R: BufRead>(&self, input: R) -> Result<(Vec<Row>, ReadStats)> {
        let mut source = NodeSource::new(input);
        let mut stats = ReadStats::default();
        let mut rows = Vec::new();
        let mut unknown_tables: HashMap<String, u64> = HashMap::new();

        // find the root element
        loop {
            match source.next()? {
                Node::Open { empty: true, .. } => return Ok((rows, stats)),
                Node::Open { .. } => break,
                Node::Eof => return Err(TransferError::format("transfer stream has no root element")),
                Node::Text(_) | Node::Close => {}
            }
        }

        loop {
            match source.next()? {
                Node::Open { name, attrs, empty } => {
                    let raw = self.read_raw_row(&mut source, name, attrs, empty)?;
                    match self.resolve_row(raw, &mut stats)? {
                        Ok(row) => {
                            stats.rows += 1;
                            rows.push(row);
                        }
                        Err(table) => {
                            stats.skipped_rows += 1;
                            *unknown_tables.entry(table).or_default() += 1;
                        }
                    }
                }
                Node::Close => break,
                Node::Text(_) => {}
                Node::Eof => return Err(unexpected_eof()),
            }
        }

        for (table, count) in &unknown_tables {
            warn!("Skipped {} rows of unknown table '{}'", count, table);
        }
        Ok((rows, stats))
    }

    fn read_raw_row<R: BufRead>(
        &self,
        source: &mut NodeSource<R>,
        tag: String,
        attrs: Vec<(String, String)>,
        empty: bool,
    ) -> Result<RawRow> {
        let generic = tag == TABLE_ELEMENT;
        let mut raw = RawRow::default();
        if !generic {
            raw.table = Some(tag);
        }

        for (key, value) in attrs {
            if generic && key == TABLE_NAME {
                raw.table = Some(value);
            } else {
                raw.entries.push((key, value));
            }
        }

        if empty {
            return Ok(raw);
        }

        loop {
            match source.next()? {
                Node::Open { name, attrs, empty } => {
                    if generic && name == TABLE_NAME {
                        raw.table = Some(source.element_text(&attrs, empty)?);
                    } else if name == COLUMN_ELEMENT {
                        if let Some(entry) = Self::read_column(source, &attrs, empty)? {
                            raw.entries.push(entry);
                        }
                    } else {
                        let value = source.element_text(&attrs, empty)?;
                        raw.entries.push((name, value));
                    }
                }
                Node::Close => break,
                Node::Text(_) => {}
                Node::Eof => return Err(unexpected_eof()),
            }
        }
        Ok(raw)
    }

    /// Read a generic `column` element in either its attribute-named or nested form.
    fn read_column<R: BufRead>(
        source: &mut NodeSource<R>,
        attrs: &[(String, String)],
        empty: bool,
    ) -> Result<Option<(String, String)>> {
        let mut name = attr(attrs, COLUMN_NAME).map(str::to_string);
        let mut nested_value = None;
        let mut text = String::new();

        if !empty {
            loop {
                match source.next()? {
                    Node::Open { name: child, attrs: child_attrs, empty } => {
                        if child == COLUMN_NAME {
                            name = Some(source.element_text(&child_attrs, empty)?);
                        } else if child == COLUMN_VALUE {
                            nested_value = Some(source.element_text(&child_attrs, empty)?);
                        } else if !empty {
                            source.skip_element()?;
                        }
                    }
                    Node::Text(t) => text.push_str(&t),
                    Node::Close => break,
                    Node::Eof => return Err(unexpected_eof()),
                }
            }
        }

        let value = match nested_value {
            Some(value) => value,
            None if is_base64(attrs) => decode_base64_text(&text)?,
            None => text,
        };
        match name {
            Some(name) => Ok(Some((name, value))),
            None => {
                debug!("Skipping column element without a name");
                Ok(None)
            }
        }
    }

    /// Match a raw row against the model. `Err(name)` for unknown tables.
    fn resolve_row(
        &self,
        raw: RawRow,
        stats: &mut ReadStats,
    ) -> Result<std::result::Result<Row, String>> {
        let Some(table_name) = raw.table else {
            return Ok(Err(String::from("<unnamed>")));
        };
        let Some(table) = self.model.find_table(&table_name, self.case_sensitive) else {
            debug!("Skipping row of unknown table '{}'", table_name);
            return Ok(Err(table_name));
        };

        let mut row = Row::new(Arc::clone(table));
        for (column_name, text) in raw.entries {
            match table.column_index(&column_name, self.case_sensitive) {
                Some(idx) => {
                    let column = &table.columns[idx];
                    let value = self.codec.decode(column.column_type, &text).map_err(|e| {
                        TransferError::format(format!(
                            "table {} column {}: {}",
                            table.name, column.name, e
                        ))
                    })?;
                    row.set_at(idx, value);
                }
                None => {
                    debug!(
                        "Skipping unknown column '{}' of table {}",
                        column_name, table.name
                    );
                    stats.skipped_columns += 1;
                }
            }
        }
        fill_nulls(table, &mut row);
        Ok(Ok(row))
    }
}

/// Give unset columns a NULL of their own type.
fn fill_nulls(table: &Table, row: &mut Row) {
    for (idx, column) in table.columns.iter().enumerate() {
        if row.value_at(idx).is_null() {
            row.set_at(idx, ValueCodec::null_for(column.column_type));
        }
    }
}
