/// Where the delimiter scanner is inside the byte stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ScanPhase {
    /// More delimiter characters expected.
    Matching,
    /// Delimiter found: expect `-`, linear whitespace or a line break.
    Delimiter,
    /// Delimiter + `-` found: expect a second `-`.
    Dash,
    /// Delimiter + `--` + optional whitespace found.
    DashDash,
    /// Delimiter + whitespace found.
    Padding,
    /// Delimiter + optional whitespace + `CR` found: expect `LF`.
    Cr,
    /// Delimiter + `--` + optional whitespace + `CR` found: expect `LF`.
    DashDashCr,
}

/// Which section of the multipart body the decoder is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartPhase {
    Preamble,
    Headers,
    Body,
    Epilogue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum HeaderPhase {
    LineStart,
    Name,
    Value,
    LineCr,
    BlankLineCr,
}
