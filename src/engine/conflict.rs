//! Conflict resolver: pure decision logic, no side effects. The caller
//! (creation flow) persists the reservation and updates station state only
//! after an accept.

use crate::limits::*;
use crate::model::*;

use super::error::{ConflictDetails, ConflictKind, EngineError};

/// Validate candidate bounds: well-formed span, not in the past, within
/// duration limits. Runs before any conflict check.
pub(crate) fn validate_candidate(span: &Span, now: Ms, max_duration: Ms) -> Result<(), EngineError> {
    if span.end <= span.start {
        return Err(EngineError::Validation("end must be after start"));
    }
    if span.start < now {
        return Err(EngineError::Validation("cannot reserve a time in the past"));
    }
    let duration = span.duration_ms();
    if duration < MIN_DURATION_MS {
        return Err(EngineError::Validation("duration below the 30 minute minimum"));
    }
    if duration > max_duration {
        return Err(EngineError::Validation("duration above the maximum"));
    }
    Ok(())
}

pub(crate) fn validate_purpose(purpose: &Option<String>) -> Result<(), EngineError> {
    if let Some(p) = purpose
        && p.len() > MAX_PURPOSE_LEN
    {
        return Err(EngineError::Validation("purpose exceeds 200 characters"));
    }
    Ok(())
}

/// Classify a candidate span against one existing reservation's span.
/// Checks run in a fixed order and the first match wins. Returns None when
/// the pair can coexist (disjoint with at least the buffer between them).
pub(crate) fn classify(candidate: &Span, existing: &Span) -> Option<ConflictKind> {
    if candidate.start >= existing.start && candidate.start < existing.end {
        Some(ConflictKind::OverlapStart)
    } else if candidate.end > existing.start && candidate.end <= existing.end {
        Some(ConflictKind::OverlapEnd)
    } else if candidate.start <= existing.start && candidate.end >= existing.end {
        Some(ConflictKind::Contains)
    } else if existing.end <= candidate.start && candidate.start - existing.end < BUFFER_MS {
        // Gap of exactly BUFFER_MS passes; 14m59s fails.
        Some(ConflictKind::BufferAfter)
    } else if candidate.end <= existing.start && existing.start - candidate.end < BUFFER_MS {
        Some(ConflictKind::BufferBefore)
    } else {
        None
    }
}

/// Evaluate a candidate against a station's active reservations, ordered by
/// start ascending. First conflict wins; zero active reservations always
/// accept.
pub(crate) fn evaluate(
    candidate: &Span,
    existing: &[Reservation],
    excluding: Option<ulid::Ulid>,
) -> Result<(), EngineError> {
    for e in existing {
        if Some(e.id) == excluding {
            continue;
        }
        if let Some(kind) = classify(candidate, &e.span) {
            let gap_minutes = match kind {
                ConflictKind::BufferAfter => Some((candidate.start - e.span.end) / MS_PER_MINUTE),
                ConflictKind::BufferBefore => Some((e.span.start - candidate.end) / MS_PER_MINUTE),
                _ => None,
            };
            return Err(EngineError::Conflict(ConflictDetails {
                kind,
                existing: e.span,
                station_id: e.station_id,
                gap_minutes,
            }));
        }
    }
    Ok(())
}

/// User-level exclusivity: a user cannot occupy two stations at once. Plain
/// overlap across all of the user's active reservations, no buffer.
pub(crate) fn find_user_overlap<'a>(
    candidate: &Span,
    user_active: &'a [Reservation],
) -> Option<&'a Reservation> {
    user_active.iter().find(|r| candidate.overlaps(&r.span))
}
