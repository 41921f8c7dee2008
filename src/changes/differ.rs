use crate::types::{CourseRecord, Delta, DeltaKind, Snapshot};

/// Score movements below this are page rounding noise.
pub const SCORE_TOLERANCE: f64 = 0.1;
const TOLERANCE_EPSILON: f64 = 1e-9;

/// Added and Changed courses in `current` order, then Removed ones in
/// `previous` order. Never touches either snapshot.
pub fn diff(previous: &Snapshot, current: &Snapshot) -> Vec<Delta> {
    let mut deltas = Vec::new();

    for after in current.iter() {
        match previous.get(&after.name) {
            None => deltas.push(Delta {
                course: after.name.clone(),
                kind: DeltaKind::Added,
                before: None,
                after: Some(after.clone()),
                score_delta: None,
            }),
            Some(before) => {
                if let Some(delta) = compare(before, after) {
                    deltas.push(delta);
                }
            }
        }
    }

    for before in previous.iter() {
        if !current.contains(&before.name) {
            deltas.push(Delta {
                course: before.name.clone(),
                kind: DeltaKind::Removed,
                before: Some(before.clone()),
                after: None,
                score_delta: None,
            });
        }
    }

    deltas
}

fn compare(before: &CourseRecord, after: &CourseRecord) -> Option<Delta> {
    let raw_delta = match (before.numeric_score(), after.numeric_score()) {
        (Some(old), Some(new)) => Some(new - old),
        _ => None,
    };
    let grade_changed = before.letter_grade != after.letter_grade;
    let score_moved = raw_delta
        .map(|d| d.abs() + TOLERANCE_EPSILON >= SCORE_TOLERANCE)
        .unwrap_or(false);
    if !grade_changed && !score_moved {
        return None;
    }
    Some(Delta {
        course: after.name.clone(),
        kind: DeltaKind::Changed,
        before: Some(before.clone()),
        after: Some(after.clone()),
        score_delta: raw_delta.map(round_two_places),
    })
}

fn round_two_places(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
