//! Best-effort association of imported events with existing customers.
//!
//! Feeds carry no customer identity, only free text. The heuristic takes the
//! first word of the event title as a first name and looks for customers
//! whose name contains it. It is not proven correct: two customers sharing a
//! first name are indistinguishable, so such matches are reported as
//! ambiguous and resolved by a fixed ordering.

use serde::{Deserialize, Serialize};

use crate::normalize::PLACEHOLDER_SUMMARY;

/// A customer from the provider's client directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub id: String,
    pub owner_id: String,
    pub name: String,
}

/// Result of matching one event title against the customer list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CustomerMatch {
    None,
    Unique(String),
    /// Several customers matched; `chosen` is the first of `candidates`.
    Ambiguous {
        chosen: String,
        candidates: Vec<String>,
    },
}

impl CustomerMatch {
    pub fn customer_id(&self) -> Option<&str> {
        match self {
            CustomerMatch::None => None,
            CustomerMatch::Unique(id) => Some(id),
            CustomerMatch::Ambiguous { chosen, .. } => Some(chosen),
        }
    }

    pub fn is_ambiguous(&self) -> bool {
        matches!(self, CustomerMatch::Ambiguous { .. })
    }
}

/// Match an event title against `customers`.
///
/// Candidates are ordered by lowercase name, then id, so the outcome does not
/// depend on the order the directory returned them in.
pub fn match_customer(summary: &str, customers: &[Customer]) -> CustomerMatch {
    if summary.starts_with(PLACEHOLDER_SUMMARY) {
        return CustomerMatch::None;
    }

    let Some(token) = summary.split_whitespace().next() else {
        return CustomerMatch::None;
    };
    let token = token.to_lowercase();

    let mut candidates: Vec<&Customer> = customers
        .iter()
        .filter(|c| c.name.to_lowercase().contains(&token))
        .collect();
    candidates.sort_by(|a, b| {
        a.name
            .to_lowercase()
            .cmp(&b.name.to_lowercase())
            .then_with(|| a.id.cmp(&b.id))
    });

    match candidates.as_slice() {
        [] => CustomerMatch::None,
        [only] => CustomerMatch::Unique(only.id.clone()),
        [first, ..] => CustomerMatch::Ambiguous {
            chosen: first.id.clone(),
            candidates: candidates.iter().map(|c| c.id.clone()).collect(),
        },
    }
}
