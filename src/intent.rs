//! Query intent classification.
//!
//! A keyword classifier that tells a front-end whether a message should go
//! to the eligibility flow instead of the knowledge pipeline. It never
//! blocks answering: `ask` still runs retrieval for every query.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    /// "Am I eligible for a loan?", "EMI for 5 lakh over 10 years"
    Eligibility,
    Knowledge,
}

const ELIGIBILITY_PHRASES: &[&str] = &[
    "eligible",
    "eligibility",
    "emi for",
    "can i get a loan",
    "can i get loan",
    "how much loan",
    "loan amount can i",
    "qualify for a loan",
    "qualify for loan",
    "पात्र",
    "पात्रता",
    "ਯੋਗਤਾ",
];

pub fn classify(query: &str) -> Intent {
    let q = query.to_lowercase();
    if ELIGIBILITY_PHRASES.iter().any(|p| q.contains(p)) {
        Intent::Eligibility
    } else {
        Intent::Knowledge
    }
}
