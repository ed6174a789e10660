//! Direct-criteria matching
//!
//! A series passes a group's criteria when it passes every *non-empty*
//! category:
//!
//! | category   | sources (ORed)                                         |
//! |------------|--------------------------------------------------------|
//! | location   | site ids, `Location` / `BaseLocation` / `SubLocation`  |
//! | param      | datatype ids, `Param` / `BaseParam` / `SubParam`       |
//! | param type | `ParamType`                                            |
//! | interval   | `Interval`                                             |
//! | duration   | `Duration`                                             |
//! | version    | `Version` / `BaseVersion` / `SubVersion`               |

use super::model::{CriterionCategory, MemberAttribute, TsGroup};
use super::wildcard::WildcardPattern;
use crate::errors::DepsError;
use crate::shared::models::{DbKey, TimeSeriesIdentifier};
use rayon::prelude::*;
use std::collections::HashSet;

/// Universe size below which matching stays on the calling thread
const PARALLEL_THRESHOLD: usize = 2048;

#[derive(Debug, Clone, Default)]
pub struct CompiledCriteria {
    site_ids: HashSet<DbKey>,
    datatype_ids: HashSet<DbKey>,
    patterns: Vec<(MemberAttribute, WildcardPattern)>,
}

impl CompiledCriteria {
    /// Compile a group's criteria. Unknown attributes and malformed patterns
    /// are dropped and returned as warnings.
    pub fn compile(group: &TsGroup) -> (Self, Vec<DepsError>) {
        let mut warnings = Vec::new();
        let mut patterns = Vec::with_capacity(group.criteria.len());

        for criterion in &group.criteria {
            let Some(attribute) = MemberAttribute::parse(&criterion.attribute) else {
                tracing::warn!(
                    group = %group.display_id(),
                    attribute = %criterion.attribute,
                    "unknown group criterion attribute; ignored"
                );
                warnings.push(DepsError::malformed(
                    format!("{}={}", criterion.attribute, criterion.pattern),
                    "unknown attribute",
                ));
                continue;
            };
            match WildcardPattern::compile(&criterion.pattern) {
                Ok(pattern) => patterns.push((attribute, pattern)),
                Err(e) => {
                    tracing::warn!(
                        group = %group.display_id(),
                        attribute = %attribute,
                        error = %e,
                        "malformed group criterion; ignored"
                    );
                    warnings.push(e);
                }
            }
        }

        let compiled = Self {
            site_ids: group.site_ids.iter().copied().collect(),
            datatype_ids: group.datatype_ids.iter().copied().collect(),
            patterns,
        };
        (compiled, warnings)
    }

    /// No category has any value
    pub fn is_empty(&self) -> bool {
        self.site_ids.is_empty() && self.datatype_ids.is_empty() && self.patterns.is_empty()
    }

    fn category_has_values(&self, category: CriterionCategory) -> bool {
        let ids = match category {
            CriterionCategory::Location => !self.site_ids.is_empty(),
            CriterionCategory::Param => !self.datatype_ids.is_empty(),
            _ => false,
        };
        ids || self
            .patterns
            .iter()
            .any(|(attr, _)| attr.category() == category)
    }

    fn passes_category(&self, category: CriterionCategory, ts: &TimeSeriesIdentifier) -> bool {
        let by_id = match category {
            CriterionCategory::Location => ts.site_id.is_some_and(|s| self.site_ids.contains(&s)),
            CriterionCategory::Param => ts
                .datatype_id
                .is_some_and(|d| self.datatype_ids.contains(&d)),
            _ => false,
        };
        by_id
            || self
                .patterns
                .iter()
                .filter(|(attr, _)| attr.category() == category)
                .any(|(attr, pattern)| pattern.matches(attr.value_of(&ts.parts)))
    }

    /// AND across non-empty categories. Empty criteria match nothing.
    pub fn matches(&self, ts: &TimeSeriesIdentifier) -> bool {
        if self.is_empty() {
            return false;
        }
        CriterionCategory::ALL
            .iter()
            .filter(|c| self.category_has_values(**c))
            .all(|c| self.passes_category(*c, ts))
    }

    /// Every member of `universe` passing the criteria
    pub fn select(&self, universe: &[TimeSeriesIdentifier]) -> Vec<TimeSeriesIdentifier> {
        if self.is_empty() {
            return Vec::new();
        }
        if universe.len() < PARALLEL_THRESHOLD {
            universe.iter().filter(|ts| self.matches(ts)).cloned().collect()
        } else {
            universe
                .par_iter()
                .filter(|ts| self.matches(ts))
                .cloned()
                .collect()
        }
    }
}
