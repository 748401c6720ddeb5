pub mod eligibility;
pub mod matching;
pub mod snapshot;
