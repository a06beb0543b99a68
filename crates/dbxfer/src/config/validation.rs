//! Configuration validation.

use super::SessionConfig;
use crate::codec::markup;
use crate::error::{Result, TransferError};

/// Validate the configuration.
pub fn validate(config: &SessionConfig) -> Result<()> {
    match encoding_rs::Encoding::for_label(config.encoding.as_bytes()) {
        None => {
            return Err(TransferError::Config(format!(
                "encoding '{}' is not a known character encoding",
                config.encoding
            )))
        }
        Some(encoding) if encoding.output_encoding() != encoding => {
            return Err(TransferError::Config(format!(
                "encoding '{}' cannot be used for output",
                config.encoding
            )))
        }
        Some(_) => {}
    }

    if config.cdata_threshold == 0 {
        return Err(TransferError::Config(
            "cdata_threshold must be at least 1".into(),
        ));
    }

    if !markup::is_valid_name(&config.root_element) {
        return Err(TransferError::Config(format!(
            "root_element '{}' is not a valid element name",
            config.root_element
        )));
    }

    Ok(())
}
