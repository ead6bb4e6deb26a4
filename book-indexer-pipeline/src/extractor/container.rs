//! EPUB container access.

use std::io::Cursor;

use epub::doc::EpubDoc;

use super::metadata::Metadata;
use crate::errors::ExtractionError;

/// A spine item in reading order.
#[derive(Debug, Clone)]
pub(crate) struct RawSection {
    pub id: String,
    pub markup: String,
}

/// What the container yields before any text processing.
#[derive(Debug, Clone, Default)]
pub(crate) struct RawBook {
    pub metadata: Metadata,
    pub unique_identifier: Option<String>,
    pub sections: Vec<RawSection>,
}

/// Open an EPUB from memory and read its spine.
pub(crate) fn read_container(bytes: &[u8]) -> Result<RawBook, ExtractionError> {
    let mut doc = EpubDoc::from_reader(Cursor::new(bytes.to_vec()))
        .map_err(|e| ExtractionError::container(e.to_string()))?;

    let count = doc.get_num_pages();
    let mut sections = Vec::with_capacity(count);
    for i in 0..count {
        if !doc.set_current_page(i) {
            continue;
        }
        let id = doc
            .get_current_id()
            .unwrap_or_else(|| format!("section-{}", i));
        match doc.get_current_str() {
            Some((markup, _mime)) => sections.push(RawSection { id, markup }),
            None => {
                return Err(ExtractionError::encoding(format!(
                    "section '{}' could not be decoded",
                    id
                )))
            }
        }
    }

    Ok(RawBook {
        metadata: doc.metadata.clone(),
        unique_identifier: doc.unique_identifier.clone(),
        sections,
    })
}
