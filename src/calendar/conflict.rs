use crate::error::DeskError;
use crate::model::*;

/// First booking in `existing` that overlaps `candidate`, skipping `exclude`.
///
/// Plain linear scan over a snapshot; overlap is the strict half-open test,
/// so shared endpoints and zero-length candidates never conflict.
pub fn find_conflict<'a>(
    candidate: &Span,
    existing: &'a [Booking],
    exclude: Option<&BookingId>,
) -> Option<&'a Booking> {
    existing
        .iter()
        .filter(|b| Some(&b.id) != exclude)
        .find(|b| candidate.start < b.span.end && b.span.start < candidate.end)
}

pub fn has_conflict(candidate: &Span, existing: &[Booking], exclude: Option<&BookingId>) -> bool {
    find_conflict(candidate, existing, exclude).is_some()
}

/// Reject spans no booking may have.
pub fn validate_span(span: &Span) -> Result<(), DeskError> {
    use crate::limits::*;
    if span.start >= span.end {
        return Err(DeskError::InvalidSpan(*span));
    }
    if span.start < MIN_VALID_TIMESTAMP_MS || span.end > MAX_VALID_TIMESTAMP_MS {
        return Err(DeskError::LimitExceeded("timestamp out of range"));
    }
    if span.duration_ms() > MAX_SPAN_DURATION_MS {
        return Err(DeskError::LimitExceeded("booking too long"));
    }
    Ok(())
}

pub(crate) fn validate_details(title: Option<&str>, description: Option<&str>) -> Result<(), DeskError> {
    use crate::limits::*;
    if title.is_some_and(|t| t.len() > MAX_TITLE_LEN) {
        return Err(DeskError::LimitExceeded("title too long"));
    }
    if description.is_some_and(|d| d.len() > MAX_DESCRIPTION_LEN) {
        return Err(DeskError::LimitExceeded("description too long"));
    }
    Ok(())
}
