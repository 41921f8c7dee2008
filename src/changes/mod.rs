pub mod differ;

pub use differ::{diff, SCORE_TOLERANCE};
