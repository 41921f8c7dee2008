use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::grades::classify;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum LetterGrade {
    A,
    B,
    C,
    D,
    F,
    #[serde(rename = "N/A")]
    NotAvailable,
}

impl LetterGrade {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::A => "A",
            Self::B => "B",
            Self::C => "C",
            Self::D => "D",
            Self::F => "F",
            Self::NotAvailable => "N/A",
        }
    }
}

impl Display for LetterGrade {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CourseRecord {
    pub name: String,
    pub raw_score: Option<String>,
    pub letter_grade: LetterGrade,
    pub missing_assignments: u32,
    pub last_update: Option<String>,
}

impl CourseRecord {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            raw_score: None,
            letter_grade: LetterGrade::NotAvailable,
            missing_assignments: 0,
            last_update: None,
        }
    }

    /// Sets the displayed score and re-derives the letter grade from it.
    pub fn with_score(mut self, score: &str) -> Self {
        self.set_score(Some(score.to_string()));
        self
    }

    pub fn with_missing(mut self, missing: u32) -> Self {
        self.missing_assignments = missing;
        self
    }

    pub fn with_last_update(mut self, last_update: &str) -> Self {
        self.last_update = Some(last_update.to_string());
        self
    }

    pub fn set_score(&mut self, score: Option<String>) {
        self.letter_grade = score
            .as_deref()
            .map(classify)
            .unwrap_or(LetterGrade::NotAvailable);
        self.raw_score = score;
    }

    /// Numeric value of the displayed score, if it parses as a percentage.
    pub fn numeric_score(&self) -> Option<f64> {
        self.raw_score
            .as_deref()
            .and_then(crate::grades::parse_percentage)
    }

    pub fn score_label(&self) -> &str {
        self.raw_score.as_deref().unwrap_or("N/A")
    }

    pub fn last_update_label(&self) -> &str {
        self.last_update.as_deref().unwrap_or("N/A")
    }
}

/// One extraction of the gradebook. Courses keep the order in which they
/// first appeared on the page.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Snapshot {
    courses: Vec<CourseRecord>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: impl IntoIterator<Item = CourseRecord>) -> Self {
        let mut snapshot = Self::new();
        for record in records {
            snapshot.insert(record);
        }
        snapshot
    }

    /// Inserts a record, replacing any record with the same name in place.
    pub fn insert(&mut self, record: CourseRecord) {
        match self.get_mut(&record.name) {
            Some(existing) => *existing = record,
            None => self.courses.push(record),
        }
    }

    pub fn get(&self, name: &str) -> Option<&CourseRecord> {
        self.courses.iter().find(|c| c.name == name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut CourseRecord> {
        self.courses.iter_mut().find(|c| c.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CourseRecord> {
        self.courses.iter()
    }

    pub fn len(&self) -> usize {
        self.courses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.courses.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DeltaKind {
    Added,
    Changed,
    Removed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Delta {
    pub course: String,
    pub kind: DeltaKind,
    pub before: Option<CourseRecord>,
    pub after: Option<CourseRecord>,
    pub score_delta: Option<f64>,
}
