//! Transfer stream writer.

use std::borrow::Cow;
use std::io::Write;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use quick_xml::events::attributes::Attribute;
use quick_xml::events::{BytesCData, BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::name::QName;
use quick_xml::Writer;
use tracing::debug;

use super::forms::{
    column_form, table_form, ColumnForm, TableForm, TextForm, BASE64_ATTR, COLUMN_ELEMENT,
    COLUMN_NAME, COLUMN_VALUE, TABLE_ELEMENT, TABLE_NAME,
};
use super::markup::{cdata_sections, char_len, escape_attr, escape_text};
use super::value::ValueCodec;
use crate::config::SessionConfig;
use crate::core::Row;
use crate::error::{Result, TransferError};

/// Writes rows as elements of a transfer document.
///
/// The document is produced incrementally: the declaration and root start
/// tag on the first row (or on [`finish`](Self::finish) for an empty
/// document), one element per row, and the root end tag on `finish`.
pub struct DataWriter<W: Write> {
    out: W,
    codec: ValueCodec,
    encoding: &'static encoding_rs::Encoding,
    root_element: String,
    cdata_threshold: usize,
    started: bool,
    rows_written: u64,
}

impl<W: Write> DataWriter<W> {
    /// Create a writer using the session's encoding, root element and CDATA threshold.
    pub fn new(out: W, config: &SessionConfig, codec: ValueCodec) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            out,
            codec,
            encoding: config.output_encoding(),
            root_element: config.root_element.clone(),
            cdata_threshold: config.cdata_threshold,
            started: false,
            rows_written: 0,
        })
    }

    /// Number of rows written so far.
    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }

    /// Write one row.
    pub fn write_row(&mut self, row: &Row) -> Result<()> {
        self.start()?;
        let mut xml = Writer::new(Vec::new());
        self.write_row_events(&mut xml, row)?;
        xml.get_mut().push(b'\n');
        let text = String::from_utf8(xml.into_inner())
            .map_err(|e| TransferError::Encoding(e.to_string()))?;
        self.emit(&text, Some(row))?;
        self.rows_written += 1;
        Ok(())
    }

    /// Write every row of an iterator.
    pub fn write_rows<'r, I>(&mut self, rows: I) -> Result<()>
    where
        I: IntoIterator<Item = &'r Row>,
    {
        for row in rows {
            self.write_row(row)?;
        }
        Ok(())
    }

    /// Close the document and return the underlying output.
    pub fn finish(mut self) -> Result<W> {
        self.start()?;
        let end = format!("</{}>\n", self.root_element);
        self.emit(&end, None)?;
        self.out.flush()?;
        debug!("Transfer document finished with {} rows", self.rows_written);
        Ok(self.out)
    }

    fn start(&mut self) -> Result<()> {
        if self.started {
            return Ok(());
        }
        self.started = true;

        let mut xml = Writer::new(Vec::new());
        xml.write_event(Event::Decl(BytesDecl::new(
            "1.0",
            Some(self.encoding.name()),
            None,
        )))?;
        xml.get_mut().push(b'\n');
        xml.write_event(Event::Start(BytesStart::new(self.root_element.as_str())))?;
        xml.get_mut().push(b'\n');
        let text = String::from_utf8(xml.into_inner())
            .map_err(|e| TransferError::Encoding(e.to_string()))?;
        self.emit(&text, None)
    }

    fn emit(&mut self, text: &str, row: Option<&Row>) -> Result<()> {
        let (bytes, _, unmappable) = self.encoding.encode(text);
        if unmappable {
            return Err(TransferError::Encoding(format!(
                "{} contains characters that cannot be written as {}",
                row.map(Row::describe)
                    .unwrap_or_else(|| format!("root element {}", self.root_element)),
                self.encoding.name()
            )));
        }
        self.out.write_all(&bytes)?;
        Ok(())
    }

    fn write_row_events(&self, xml: &mut Writer<Vec<u8>>, row: &Row) -> Result<()> {
        let table = row.table();
        let form = table_form(&table.name);
        let tag = match form {
            TableForm::Tag => table.name.as_str(),
            _ => TABLE_ELEMENT,
        };

        let mut start = BytesStart::new(tag);
        if form == TableForm::GenericAttribute {
            start.push_attribute(raw_attribute(TABLE_NAME, &table.name));
        }

        let mut children: Vec<(&str, String, ColumnForm)> = Vec::new();
        for (column, value) in table.columns.iter().zip(row.values()) {
            let Some(text) = self.codec.encode(column.column_type, value)? else {
                continue;
            };
            match column_form(&column.name, &text) {
                ColumnForm::Attribute => {
                    start.push_attribute(raw_attribute(&column.name, &text));
                }
                other => children.push((column.name.as_str(), text, other)),
            }
        }

        let has_name_child = matches!(
            form,
            TableForm::GenericElement | TableForm::GenericBase64Element
        );
        if children.is_empty() && !has_name_child {
            xml.write_event(Event::Empty(start))?;
            return Ok(());
        }

        xml.write_event(Event::Start(start))?;
        if has_name_child {
            self.write_text_element(
                xml,
                BytesStart::new(TABLE_NAME),
                &table.name,
                TextForm::of(&table.name),
            )?;
        }
        for (name, text, kind) in children {
            match kind {
                ColumnForm::Attribute => unreachable!("attributes are written on the row start tag"),
                ColumnForm::Element => {
                    self.write_text_element(xml, BytesStart::new(name), &text, TextForm::Plain)?;
                }
                ColumnForm::Base64Element => {
                    self.write_text_element(xml, BytesStart::new(name), &text, TextForm::Base64)?;
                }
                ColumnForm::NamedColumn | ColumnForm::Base64NamedColumn => {
                    let mut element = BytesStart::new(COLUMN_ELEMENT);
                    element.push_attribute(raw_attribute(COLUMN_NAME, name));
                    let text_form = if kind == ColumnForm::NamedColumn {
                        TextForm::Plain
                    } else {
                        TextForm::Base64
                    };
                    self.write_text_element(xml, element, &text, text_form)?;
                }
                ColumnForm::Nested => {
                    xml.write_event(Event::Start(BytesStart::new(COLUMN_ELEMENT)))?;
                    self.write_text_element(
                        xml,
                        BytesStart::new(COLUMN_NAME),
                        name,
                        TextForm::of(name),
                    )?;
                    self.write_text_element(
                        xml,
                        BytesStart::new(COLUMN_VALUE),
                        &text,
                        TextForm::of(&text),
                    )?;
                    xml.write_event(Event::End(BytesEnd::new(COLUMN_ELEMENT)))?;
                }
            }
        }
        xml.write_event(Event::End(BytesEnd::new(tag)))?;
        Ok(())
    }

    fn write_text_element(
        &self,
        xml: &mut Writer<Vec<u8>>,
        mut start: BytesStart<'_>,
        text: &str,
        form: TextForm,
    ) -> Result<()> {
        let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
        if form == TextForm::Base64 {
            start.push_attribute(raw_attribute(BASE64_ATTR, "true"));
        }
        if text.is_empty() {
            xml.write_event(Event::Empty(start))?;
            return Ok(());
        }

        xml.write_event(Event::Start(start))?;
        match form {
            TextForm::Base64 => {
                let encoded = BASE64.encode(text.as_bytes());
                xml.write_event(Event::Text(BytesText::from_escaped(encoded)))?;
            }
            TextForm::Plain if char_len(text) > self.cdata_threshold && !text.contains('\r') => {
                for section in cdata_sections(text) {
                    xml.write_event(Event::CData(BytesCData::new(section)))?;
                }
            }
            TextForm::Plain => {
                xml.write_event(Event::Text(BytesText::from_escaped(escape_text(text))))?;
            }
        }
        xml.write_event(Event::End(BytesEnd::new(name)))?;
        Ok(())
    }
}

/// Attribute whose value is escaped by us rather than by the writer.
fn raw_attribute<'a>(key: &'a str, value: &str) -> Attribute<'a> {
    Attribute {
        key: QName(key.as_bytes()),
        value: Cow::Owned(escape_attr(value).into_bytes()),
    }
}

/// Encode rows into an in-memory document.
pub fn write_to_string<'r, I>(rows: I, config: &SessionConfig, codec: ValueCodec) -> Result<String>
where
    I: IntoIterator<Item = &'r Row>,
{
    let mut config = config.clone();
    config.encoding = "UTF-8".to_string();
    let mut writer = DataWriter::new(Vec::new(), &config, codec)?;
    writer.write_rows(rows)?;
    let bytes = writer.finish()?;
    String::from_utf8(bytes).map_err(|e| TransferError::Encoding(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Column, ColumnType, SqlValue, Table};
    use std::sync::Arc;

    fn row_of(table: Table, values: &[(&str, SqlValue<'static>)]) -> Row {
        let mut row = Row::new(Arc::new(table));
        for (name, value) in values {
            row.set(name, value.clone()).unwrap();
        }
        row
    }

    fn encode(row: &Row) -> String {
        let doc = write_to_string([row], &SessionConfig::default(), ValueCodec::default()).unwrap();
        doc.lines()
            .filter(|l| !l.starts_with("<?xml") && *l != "<data>" && *l != "</data>")
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn id_table(name: &str) -> Table {
        Table::new(name, vec![Column::new("id", ColumnType::Integer).primary_key()])
    }

    #[test]
    fn test_plain_row() {
        let row = row_of(id_table("misc"), &[("id", SqlValue::I32(1))]);
        assert_eq!(encode(&row), r#"<misc id="1"/>"#);
    }

    #[test]
    fn test_invalid_table_name_uses_generic_attribute() {
        let row = row_of(id_table("test$"), &[("id", SqlValue::I32(1))]);
        assert_eq!(encode(&row), r#"<table table-name="test$" id="1"/>"#);
    }

    #[test]
    fn test_long_table_name_uses_child_element() {
        let name = "a".repeat(400);
        let row = row_of(id_table(&name), &[("id", SqlValue::I32(1))]);
        assert_eq!(
            encode(&row),
            format!(r#"<table id="1"><table-name>{name}</table-name></table>"#)
        );
    }

    #[test]
    fn test_table_name_with_nul_is_base64() {
        let row = row_of(id_table("a\0b"), &[("id", SqlValue::I32(1))]);
        assert_eq!(
            encode(&row),
            r#"<table id="1"><table-name base64="true">YQBi</table-name></table>"#
        );
    }

    #[test]
    fn test_column_with_space_uses_named_column() {
        let table = Table::new(
            "misc",
            vec![Column::new("the value", ColumnType::Varchar)],
        );
        let row = row_of(table, &[("the value", SqlValue::from("value".to_string()))]);
        assert_eq!(
            encode(&row),
            r#"<misc><column column-name="the value">value</column></misc>"#
        );
    }

    #[test]
    fn test_attribute_escaping() {
        let table = Table::new("t", vec![Column::new("v", ColumnType::Varchar)]);
        let row = row_of(table, &[("v", SqlValue::from("a<\"b\">&\nc".to_string()))]);
        assert_eq!(encode(&row), r#"<t v="a&lt;&quot;b&quot;&gt;&amp;&#10;c"/>"#);
    }

    #[test]
    fn test_illegal_value_is_base64_element() {
        let table = Table::new("t", vec![Column::new("v", ColumnType::Varchar)]);
        let row = row_of(table, &[("v", SqlValue::from("a\u{1}".to_string()))]);
        assert_eq!(encode(&row), r#"<t><v base64="true">YQE=</v></t>"#);
    }

    #[test]
    fn test_long_value_is_element_and_long_name_is_nested() {
        let long_name = "n".repeat(300);
        let table = Table::new(
            "t",
            vec![
                Column::new("v", ColumnType::Varchar),
                Column::new(long_name.clone(), ColumnType::Varchar),
            ],
        );
        let long_value = "x".repeat(300);
        let mut row = Row::new(Arc::new(table));
        row.set("v", SqlValue::from(long_value.clone())).unwrap();
        row.set(&long_name, SqlValue::from("\0".to_string())).unwrap();
        assert_eq!(
            encode(&row),
            format!(
                "<t><v>{long_value}</v><column><column-name>{long_name}</column-name>\
                 <column-value base64=\"true\">AA==</column-value></column></t>"
            )
        );
    }

    #[test]
    fn test_oversized_value_is_split_across_cdata_sections() {
        let table = Table::new("t", vec![Column::new("v", ColumnType::LongVarchar)]);
        let value = format!("{}]]>{}", "x".repeat(300), "y".repeat(300));
        let row = row_of(table, &[("v", SqlValue::from(value))]);
        let config = SessionConfig::default().with_cdata_threshold(100);
        let doc = write_to_string([&row], &config, ValueCodec::default()).unwrap();
        assert!(doc.contains(&format!(
            "<v><![CDATA[{}]]]]><![CDATA[>{}]]></v>",
            "x".repeat(300),
            "y".repeat(300)
        )));
    }

    #[test]
    fn test_nulls_are_omitted() {
        let table = Table::new(
            "misc",
            vec![
                Column::new("id", ColumnType::Integer).primary_key(),
                Column::new("parent", ColumnType::Integer),
            ],
        );
        let row = row_of(table, &[("id", SqlValue::I32(1))]);
        assert_eq!(encode(&row), r#"<misc id="1"/>"#);
    }

    #[test]
    fn test_declaration_names_encoding() {
        let table = Table::new("t", vec![Column::new("v", ColumnType::Varchar)]);
        let row = row_of(table, &[("v", SqlValue::from("caf\u{e9}".to_string()))]);
        let config = SessionConfig::default().with_encoding("latin1");
        let mut writer = DataWriter::new(Vec::new(), &config, ValueCodec::default()).unwrap();
        writer.write_row(&row).unwrap();
        let bytes = writer.finish().unwrap();
        assert!(bytes.starts_with(b"<?xml version=\"1.0\" encoding=\"windows-1252\"?>"));
        assert!(bytes.windows(5).any(|w| w == b"caf\xe9\""));
    }

    #[test]
    fn test_unmappable_character_is_an_error() {
        let table = Table::new("t", vec![Column::new("v", ColumnType::Varchar)]);
        let row = row_of(table, &[("v", SqlValue::from("\u{4e2d}".to_string()))]);
        let config = SessionConfig::default().with_encoding("latin1");
        let mut writer = DataWriter::new(Vec::new(), &config, ValueCodec::default()).unwrap();
        assert!(matches!(
            writer.write_row(&row),
            Err(TransferError::Encoding(_))
        ));
    }
}
