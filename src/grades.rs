use crate::types::LetterGrade;

/// Parses a displayed percentage such as `"85.5%"` or `" 91 "`.
pub fn parse_percentage(text: &str) -> Option<f64> {
    let trimmed = text.trim();
    let trimmed = trimmed.strip_suffix('%').unwrap_or(trimmed).trim_end();
    trimmed.parse::<f64>().ok().filter(|v| v.is_finite())
}

pub fn classify(text: &str) -> LetterGrade {
    let Some(value) = parse_percentage(text) else {
        return LetterGrade::NotAvailable;
    };
    match value {
        v if (90.0..=100.0).contains(&v) => LetterGrade::A,
        v if (80.0..90.0).contains(&v) => LetterGrade::B,
        v if (70.0..80.0).contains(&v) => LetterGrade::C,
        v if (60.0..70.0).contains(&v) => LetterGrade::D,
        v if (0.0..60.0).contains(&v) => LetterGrade::F,
        _ => LetterGrade::NotAvailable,
    }
}
