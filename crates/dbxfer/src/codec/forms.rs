//! Escalation rules: which markup form a table name or column uses.
//!
//! Selection depends only on the name, the value text and the fixed
//! limits in [`markup`], so the same input always picks the same form.

use super::markup::{has_illegal_chars, is_short, is_valid_name};

/// Generic row element used when a table name cannot be the tag.
pub const TABLE_ELEMENT: &str = "table";
/// Attribute or child element carrying the real table name.
pub const TABLE_NAME: &str = "table-name";
/// Generic column element used when a column name cannot be the tag.
pub const COLUMN_ELEMENT: &str = "column";
/// Attribute or child element carrying the real column name.
pub const COLUMN_NAME: &str = "column-name";
/// Child element carrying the column value in the nested form.
pub const COLUMN_VALUE: &str = "column-value";
/// Marker attribute for Base64 payloads.
pub const BASE64_ATTR: &str = "base64";

const RESERVED_COLUMN_NAMES: [&str; 5] =
    [TABLE_NAME, COLUMN_NAME, COLUMN_VALUE, COLUMN_ELEMENT, BASE64_ATTR];

/// How a row element names its table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableForm {
    /// `<T .../>`
    Tag,
    /// `<table table-name="T" .../>`
    GenericAttribute,
    /// `<table><table-name>T</table-name>...</table>`
    GenericElement,
    /// `<table><table-name base64="true">...</table-name>...</table>`
    GenericBase64Element,
}

/// How a column value is written inside a row element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnForm {
    /// `C="V"` on the row element.
    Attribute,
    /// `<C>V</C>`
    Element,
    /// `<C base64="true">...</C>`
    Base64Element,
    /// `<column column-name="C">V</column>`
    NamedColumn,
    /// `<column column-name="C" base64="true">...</column>`
    Base64NamedColumn,
    /// `<column><column-name>C</column-name><column-value>V</column-value></column>`
    Nested,
}

/// Whether a text part of the nested form needs the Base64 marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextForm {
    Plain,
    Base64,
}

impl TextForm {
    /// Form for an arbitrary piece of text.
    pub fn of(text: &str) -> Self {
        if has_illegal_chars(text) {
            TextForm::Base64
        } else {
            TextForm::Plain
        }
    }
}

/// Whether a column name collides with the codec's own element names.
pub fn is_reserved_column_name(name: &str) -> bool {
    RESERVED_COLUMN_NAMES.contains(&name)
}

/// Pick the form for a table name.
pub fn table_form(name: &str) -> TableForm {
    if has_illegal_chars(name) {
        TableForm::GenericBase64Element
    } else if !is_short(name) {
        TableForm::GenericElement
    } else if is_valid_name(name) && name != TABLE_ELEMENT {
        TableForm::Tag
    } else {
        TableForm::GenericAttribute
    }
}

/// Pick the form for a column name and its encoded value.
pub fn column_form(name: &str, value: &str) -> ColumnForm {
    let name_short = is_short(name);
    let name_is_tag = is_valid_name(name) && !is_reserved_column_name(name);
    let value_short = is_short(value);
    let value_legal = !has_illegal_chars(value);

    if name_short && name_is_tag {
        if value_short && value_legal {
            ColumnForm::Attribute
        } else if value_legal {
            ColumnForm::Element
        } else {
            ColumnForm::Base64Element
        }
    } else if name_short && !has_illegal_chars(name) && value_short {
        if value_legal {
            ColumnForm::NamedColumn
        } else {
            ColumnForm::Base64NamedColumn
        }
    } else {
        ColumnForm::Nested
    }
}
