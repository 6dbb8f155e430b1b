use crate::buffer::{CarryBuffer, Joined};
use crate::constants::{self, CR, LF};
use crate::state::ScanPhase;

/// What the scanner found in the stream.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum ScanEvent<'a> {
    /// Bytes between two delimiters. One span may be reported in several
    /// pieces.
    Data(&'a [u8]),
    /// A complete delimiter line; `last` marks the closing delimiter.
    Delimiter { last: bool },
}

/// Splits a live byte stream at `CRLF--boundary` delimiter lines.
///
/// Matching is a naive restart-on-mismatch comparison against the literal
/// delimiter. Whatever could still turn out to be a delimiter at the end of a
/// chunk is kept in the carry buffer and resolved by the next call.
pub(crate) struct BoundaryScanner {
    delimiter: Vec<u8>,
    phase: ScanPhase,
    matched: usize,
    carry: CarryBuffer,
}

impl BoundaryScanner {
    pub fn new(boundary: &str) -> Self {
        let boundary = boundary.as_bytes();
        let boundary = &boundary[..boundary.len().min(constants::MAX_BOUNDARY_LEN)];

        let mut delimiter = Vec::with_capacity(constants::MAX_DELIMITER_LEN);
        delimiter.extend_from_slice(constants::CRLF.as_bytes());
        delimiter.extend_from_slice(constants::BOUNDARY_EXT.as_bytes());
        delimiter.extend_from_slice(boundary);

        BoundaryScanner {
            delimiter,
            phase: ScanPhase::Matching,
            // The first delimiter may open the body without a preceding line break.
            matched: constants::CRLF.len(),
            carry: CarryBuffer::new(),
        }
    }

    /// Bytes held back from previous calls as a possible delimiter prefix.
    pub fn residue(&self) -> &[u8] {
        self.carry.as_slice()
    }

    pub fn clear_residue(&mut self) {
        self.carry.clear();
    }

    /// `true` if the stream so far ends in a closing delimiter that is still
    /// missing its line break.
    pub fn in_open_close_delimiter(&self) -> bool {
        matches!(self.phase, ScanPhase::DashDash | ScanPhase::DashDashCr)
    }

    pub fn scan<F>(&mut self, chunk: &[u8], mut emit: F) -> crate::Result<()>
    where
        F: FnMut(ScanEvent<'_>) -> crate::Result<()>,
    {
        let BoundaryScanner {
            delimiter,
            phase,
            matched,
            carry,
        } = self;

        let input = Joined::new(carry.as_slice(), chunk);
        let len = input.len();

        // `start..candidate` is data not yet forwarded, `candidate..pos` is the
        // part of the stream matched against the delimiter so far.
        let mut start = 0;
        let mut candidate = 0;
        let mut pos = carry.len();

        while pos < len {
            if *phase == ScanPhase::Matching && *matched == 0 {
                pos = input.find_line_break(pos);
                candidate = pos;
                if pos == len {
                    break;
                }
            }

            let byte = input.get(pos);
            pos += 1;

            match *phase {
                ScanPhase::Matching => {
                    if byte == delimiter[*matched] {
                        *matched += 1;
                        if *matched == delimiter.len() {
                            forward(&input, start, candidate, &mut emit)?;
                            *phase = ScanPhase::Delimiter;
                            start = pos;
                            candidate = pos;
                        }
                    } else if *matched == 0 && byte == LF {
                        // A bare LF is accepted in place of the leading CRLF.
                        *matched = constants::CRLF.len();
                    } else if pos - 1 == candidate {
                        // Only the implicit line break of the opening delimiter was matched.
                        *matched = 0;
                        pos = candidate;
                    } else {
                        *matched = 0;
                        candidate += 1;
                        pos = candidate;
                    }
                }
                ScanPhase::Delimiter | ScanPhase::Padding | ScanPhase::DashDash => match byte {
                    b'-' if *phase == ScanPhase::Delimiter => *phase = ScanPhase::Dash,
                    b' ' | b'\t' => {
                        if *phase == ScanPhase::Delimiter {
                            *phase = ScanPhase::Padding;
                        }
                    }
                    CR | LF => {
                        *phase = if *phase == ScanPhase::DashDash {
                            ScanPhase::DashDashCr
                        } else {
                            ScanPhase::Cr
                        };
                        if byte == LF {
                            pos -= 1;
                        }
                    }
                    _ => return Err(crate::Error::MalformedDelimiter { byte }),
                },
                ScanPhase::Dash => {
                    if byte == b'-' {
                        *phase = ScanPhase::DashDash;
                    } else {
                        return Err(crate::Error::MalformedDelimiter { byte });
                    }
                }
                ScanPhase::Cr | ScanPhase::DashDashCr => {
                    if byte != LF {
                        return Err(crate::Error::MalformedDelimiter { byte });
                    }
                    let last = *phase == ScanPhase::DashDashCr;
                    *phase = ScanPhase::Matching;
                    *matched = 0;
                    start = pos;
                    candidate = pos;
                    emit(ScanEvent::Delimiter { last })?;
                }
            }
        }

        let keep_from = if *phase == ScanPhase::Matching {
            forward(&input, start, candidate, &mut emit)?;
            candidate
        } else {
            len
        };

        carry.retain_from(keep_from, chunk);
        debug_assert!(carry.len() < delimiter.len());

        Ok(())
    }
}

fn forward<F>(input: &Joined<'_>, start: usize, end: usize, emit: &mut F) -> crate::Result<()>
where
    F: FnMut(ScanEvent<'_>) -> crate::Result<()>,
{
    if start >= end {
        return Ok(());
    }

    let (head, tail) = input.split(start, end);
    if !head.is_empty() {
        emit(ScanEvent::Data(head))?;
    }
    if !tail.is_empty() {
        emit(ScanEvent::Data(tail))?;
    }
    Ok(())
}
