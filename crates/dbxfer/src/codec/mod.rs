//! Row serialization codec.
//!
//! A row is written as one markup element. Table and column names that
//! cannot appear as element or attribute names, values that are too long to
//! inline, and text containing characters markup cannot carry are escalated
//! through a fixed set of forms (see [`forms`]):
//!
//! ```text
//! <misc id="4" parent="1"/>                                   plain
//! <table table-name="test$" id="1"/>                          invalid table tag
//! <table id="1"><table-name>aaaa...</table-name></table>      long table name
//! <misc><column column-name="the value">v</column></misc>     invalid column tag
//! <misc><notes base64="true">AAE=</notes></misc>              illegal characters
//! ```
//!
//! - [`value`]: canonical text of typed values
//! - [`markup`]: name grammar, legal characters and escaping
//! - [`forms`]: escalation decisions
//! - [`writer`] / [`reader`]: document encoding and decoding

pub mod forms;
pub mod markup;
pub mod reader;
pub mod value;
pub mod writer;

pub use forms::{column_form, table_form, ColumnForm, TableForm};
pub use reader::{DataReader, ReadStats};
pub use value::ValueCodec;
pub use writer::{write_to_string, DataWriter};
