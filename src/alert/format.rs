use crate::types::{CourseRecord, Delta, DeltaKind, Snapshot};

pub const REPORT_HEADER: &str = "Here are your current grades and assignment statuses:";
pub const NO_DATA_MESSAGE: &str = "No grades data found.";
pub const FETCH_FAILED_MESSAGE: &str = "Failed to fetch grades. Please try again later.";
pub const CHANGES_HEADER: &str = "Grade changes detected:";

pub fn render_report(snapshot: &Snapshot) -> String {
    if snapshot.is_empty() {
        return NO_DATA_MESSAGE.to_string();
    }
    let mut out = String::from(REPORT_HEADER);
    out.push('\n');
    for course in snapshot.iter() {
        out.push_str(&render_course_line(course));
        out.push('\n');
    }
    out
}

pub fn render_course_line(course: &CourseRecord) -> String {
    format!(
        "{}: Score: {} ({}), Missing Assignments: {}, Last Update: {}",
        course.name,
        course.score_label(),
        course.letter_grade,
        course.missing_assignments,
        course.last_update_label()
    )
}

/// `None` when there is nothing to announce.
pub fn render_changes(deltas: &[Delta]) -> Option<String> {
    if deltas.is_empty() {
        return None;
    }
    let mut out = String::from(CHANGES_HEADER);
    out.push('\n');
    for delta in deltas {
        out.push_str(&render_delta(delta));
        out.push('\n');
    }
    Some(out)
}

pub fn render_delta(delta: &Delta) -> String {
    match delta.kind {
        DeltaKind::Added => {
            let detail = delta
                .after
                .as_ref()
                .map(|c| format!("{} ({})", c.score_label(), c.letter_grade))
                .unwrap_or_else(|| "N/A".to_string());
            format!("+ {}: new course, {}", delta.course, detail)
        }
        DeltaKind::Removed => format!("- {}: no longer listed", delta.course),
        DeltaKind::Changed => {
            let grade = |record: Option<&CourseRecord>| {
                record
                    .map(|c| c.letter_grade.to_string())
                    .unwrap_or_else(|| "N/A".to_string())
            };
            let score = |record: Option<&CourseRecord>| {
                record
                    .map(|c| c.score_label().to_string())
                    .unwrap_or_else(|| "N/A".to_string())
            };
            let movement = delta
                .score_delta
                .map(|d| format!(" ({d:+.2})"))
                .unwrap_or_default();
            format!(
                "~ {}: {} -> {}, {} -> {}{}",
                delta.course,
                grade(delta.before.as_ref()),
                grade(delta.after.as_ref()),
                score(delta.before.as_ref()),
                score(delta.after.as_ref()),
                movement
            )
        }
    }
}
