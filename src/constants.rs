pub(crate) const DEFAULT_HEADER_BLOCK_SIZE_LIMIT: usize = 8 * 1024;
pub(crate) const DEFAULT_PER_FIELD_SIZE_LIMIT: usize = usize::MAX;

pub(crate) const BOUNDARY_EXT: &str = "--";
pub(crate) const CRLF: &str = "\r\n";
pub(crate) const CR: u8 = b'\r';
pub(crate) const LF: u8 = b'\n';

/// RFC 2046 caps the boundary parameter at 70 characters.
pub(crate) const MAX_BOUNDARY_LEN: usize = 70;
/// `CRLF` + `--` + boundary.
pub(crate) const MAX_DELIMITER_LEN: usize = CRLF.len() + BOUNDARY_EXT.len() + MAX_BOUNDARY_LEN;
/// An unresolved delimiter prefix is always shorter than the delimiter itself.
pub(crate) const MAX_CARRY_LEN: usize = MAX_DELIMITER_LEN - 1;

pub(crate) const FORM_DATA: &str = "form-data";
pub(crate) const FIELD_NAME_PARAM: &str = "name=";
pub(crate) const FILE_NAME_PARAM: &str = "filename=";
