//! Coarse statement classification
//!
//! A case-insensitive, whole-word scan for mutating verbs. String literals
//! and comments are not recognised, so a read-only query mentioning
//! `'update'` in a literal is reported as mutating. The result only gates a
//! confirmation step; it is not an enforcement boundary.

use serde::{Deserialize, Serialize};

/// Verbs that make a statement mutating
pub const MUTATING_VERBS: [&str; 6] = ["UPDATE", "DELETE", "INSERT", "DROP", "ALTER", "TRUNCATE"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StatementClass {
    ReadOnly,
    Mutating,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub class: StatementClass,
    /// Matched verbs, upper-case, in order of first appearance
    pub verbs: Vec<String>,
}

impl Classification {
    pub fn is_mutating(&self) -> bool {
        self.class == StatementClass::Mutating
    }
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Classify `sql` as read-only or mutating
pub fn classify_statement(sql: &str) -> Classification {
    let mut verbs: Vec<String> = Vec::new();
    for word in sql.split(|c: char| !is_word_char(c)).filter(|w| !w.is_empty()) {
        let upper = word.to_ascii_uppercase();
        if MUTATING_VERBS.contains(&upper.as_str()) && !verbs.contains(&upper) {
            verbs.push(upper);
        }
    }

    let class = if verbs.is_empty() {
        StatementClass::ReadOnly
    } else {
        StatementClass::Mutating
    };
    Classification { class, verbs }
}
