use std::collections::HashMap;

use crate::constants;

/// Bounds the memory a decode may hold on to.
///
/// The header block of every part is parsed in memory, and so is the value of
/// every form field without a `filename` parameter. File bodies are streamed
/// and never counted.
#[derive(Debug, Clone)]
pub struct SizeLimit {
    pub(crate) header_block: usize,
    pub(crate) per_field: usize,
    pub(crate) field_map: HashMap<String, usize>,
}

impl SizeLimit {
    /// Creates the default size limit: 8 KiB of headers per part and
    /// [`usize::MAX`] for each field.
    pub fn new() -> SizeLimit {
        SizeLimit::default()
    }

    /// Sets size limit for the header block of each part.
    pub fn header_block(mut self, limit: usize) -> SizeLimit {
        self.header_block = limit;
        self
    }

    /// Sets size limit for each field.
    pub fn per_field(mut self, limit: usize) -> SizeLimit {
        self.per_field = limit;
        self
    }

    /// Sets size limit for a specific field, it overrides the `per_field` value for this field.
    pub fn for_field<N: Into<String>>(mut self, field_name: N, limit: usize) -> SizeLimit {
        self.field_map.insert(field_name.into(), limit);
        self
    }

    pub(crate) fn extract_size_limit_for(&self, field: Option<&str>) -> usize {
        field
            .and_then(|field| self.field_map.get(field))
            .copied()
            .unwrap_or(self.per_field)
    }
}

impl Default for SizeLimit {
    fn default() -> Self {
        SizeLimit {
            header_block: constants::DEFAULT_HEADER_BLOCK_SIZE_LIMIT,
            per_field: constants::DEFAULT_PER_FIELD_SIZE_LIMIT,
            field_map: HashMap::default(),
        }
    }
}
