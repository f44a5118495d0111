//! Fixed sets of collection names an endpoint may operate on.
//!
//! The read endpoint and the review endpoint each hold their own list and
//! check it independently before touching the store.

use std::collections::BTreeSet;

use crate::error::DeskError;

/// The dated-total collections every deployment exposes.
pub const DATED_TOTAL_COLLECTIONS: [&str; 6] = [
    "daily_exceeding_t3global",
    "daily_exceeding_t3trading",
    "dailytotals_t3global",
    "dailytotals_t3trading",
    "monthly_exceeding_t3global",
    "monthly_exceeding_t3trading",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowList {
    names: BTreeSet<String>,
}

impl AllowList {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    /// The default list: the six dated-total collections.
    pub fn dated_totals() -> Self {
        Self::new(DATED_TOTAL_COLLECTIONS)
    }

    pub fn contains(&self, collection: &str) -> bool {
        self.names.contains(collection)
    }

    /// Rejects any collection not on the list.
    pub fn check(&self, collection: &str) -> Result<(), DeskError> {
        if self.contains(collection) {
            Ok(())
        } else {
            Err(DeskError::UnauthorizedCollection(collection.to_string()))
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl Default for AllowList {
    fn default() -> Self {
        Self::dated_totals()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_has_dated_totals() {
        let list = AllowList::default();
        assert_eq!(list.len(), 6);
        assert!(list.contains("dailytotals_t3global"));
        assert!(!list.contains("OBA"));
    }

    #[test]
    fn test_check_rejects_unknown() {
        let list = AllowList::new(["OBA"]);
        assert!(list.check("OBA").is_ok());
        let err = list.check("users").unwrap_err();
        assert_eq!(err, DeskError::UnauthorizedCollection("users".into()));
        assert_eq!(err.to_string(), "unauthorized collection: users");
    }

    #[test]
    fn test_check_is_exact_match() {
        let list = AllowList::new(["Locates"]);
        assert!(list.check("locates").is_err());
        assert!(list.check("Locates ").is_err());
    }
}
