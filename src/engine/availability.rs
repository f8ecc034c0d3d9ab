use crate::model::*;

// ── Reconciliation ────────────────────────────────────────────────

/// Derived availability of a resource at `now`: unavailable iff a PLACED
/// booking covers `now` (`start <= now < end`).
pub fn availability_at(resource: &ResourceState, now: Ms) -> Availability {
    if resource.placed_covering(now).is_some() {
        Availability::Unavailable
    } else {
        Availability::Available
    }
}

/// Recompute and store the flag. Returns true if it changed.
pub fn reconcile_resource(resource: &mut ResourceState, now: Ms) -> bool {
    let next = availability_at(resource, now);
    let changed = resource.availability != next;
    resource.availability = next;
    changed
}

/// Outcome of one reconcile pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub visited: usize,
    pub changed: usize,
    pub unavailable: usize,
}

// ── Free windows ──────────────────────────────────────────────────

/// Sub-ranges of `window` not covered by any PLACED booking.
pub fn free_spans(resource: &ResourceState, window: &Span) -> Vec<Span> {
    let busy: Vec<Span> = resource
        .placed_overlapping(window)
        .map(|(s, _)| *s)
        .collect();
    subtract_intervals(&[*window], &merge_overlapping(&busy))
}

/// Merge sorted overlapping/adjacent intervals into disjoint intervals.
pub fn merge_overlapping(sorted: &[Span]) -> Vec<Span> {
    let mut merged: Vec<Span> = Vec::new();
    for &span in sorted {
        if let Some(last) = merged.last_mut()
            && span.start() <= last.end() {
                *last = Span::new(last.start(), last.end().max(span.end()));
                continue;
            }
        merged.push(span);
    }
    merged
}

/// `base` minus `to_remove`; both sorted by start, `to_remove` disjoint.
pub fn subtract_intervals(base: &[Span], to_remove: &[Span]) -> Vec<Span> {
    let mut result = Vec::new();
    let mut ri = 0;

    for &b in base {
        let mut current_start = b.start();
        let current_end = b.end();

        while ri < to_remove.len() && to_remove[ri].end() <= current_start {
            ri += 1;
        }

        let mut j = ri;
        while j < to_remove.len() && to_remove[j].start() < current_end {
            let r = &to_remove[j];
            if r.start() > current_start {
                result.push(Span::new(current_start, r.start()));
            }
            current_start = current_start.max(r.end());
            j += 1;
        }

        if current_start < current_end {
            result.push(Span::new(current_start, current_end));
        }
    }

    result
}
