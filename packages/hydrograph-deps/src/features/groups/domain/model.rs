//! Group definitions
//!
//! A group is never stored expanded. It holds direct members (explicit
//! series, site ids, datatype ids, attribute patterns) and an ordered list
//! of child groups, each folded into the running result with its
//! [`CombineMode`].

use crate::shared::models::{DbKey, TsIdParts, TsSet};
use serde::{Deserialize, Serialize};
use std::fmt;

/// How a child group's members fold into the parent's running set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CombineMode {
    Include,
    Subtract,
    Intersect,
}

impl CombineMode {
    /// Stored one-letter code. `F` is a legacy spelling of Subtract; anything
    /// unrecognised reads as Include.
    pub fn from_code(code: &str) -> Self {
        match code.trim().chars().next().map(|c| c.to_ascii_uppercase()) {
            Some('S') | Some('F') => CombineMode::Subtract,
            Some('I') => CombineMode::Intersect,
            _ => CombineMode::Include,
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            CombineMode::Include => "A",
            CombineMode::Subtract => "S",
            CombineMode::Intersect => "I",
        }
    }

    /// Fold `child` into `running`
    pub fn apply(self, mut running: TsSet, child: TsSet) -> TsSet {
        match self {
            CombineMode::Include => {
                running.extend(child);
                running
            }
            CombineMode::Subtract => {
                running.retain(|ts| !child.contains(ts));
                running
            }
            CombineMode::Intersect => {
                running.retain(|ts| child.contains(ts));
                running
            }
        }
    }
}

impl fmt::Display for CombineMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CombineMode::Include => "include",
            CombineMode::Subtract => "subtract",
            CombineMode::Intersect => "intersect",
        };
        f.write_str(s)
    }
}

/// Criterion categories. Categories are ANDed; values inside one are ORed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CriterionCategory {
    Location,
    Param,
    ParamType,
    Interval,
    Duration,
    Version,
}

impl CriterionCategory {
    pub const ALL: [CriterionCategory; 6] = [
        CriterionCategory::Location,
        CriterionCategory::Param,
        CriterionCategory::ParamType,
        CriterionCategory::Interval,
        CriterionCategory::Duration,
        CriterionCategory::Version,
    ];
}

/// Identifier part an "other" criterion matches against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemberAttribute {
    Location,
    BaseLocation,
    SubLocation,
    Param,
    BaseParam,
    SubParam,
    ParamType,
    Interval,
    Duration,
    Version,
    BaseVersion,
    SubVersion,
}

impl MemberAttribute {
    const NAMES: [(&'static str, MemberAttribute); 12] = [
        ("Location", MemberAttribute::Location),
        ("BaseLocation", MemberAttribute::BaseLocation),
        ("SubLocation", MemberAttribute::SubLocation),
        ("Param", MemberAttribute::Param),
        ("BaseParam", MemberAttribute::BaseParam),
        ("SubParam", MemberAttribute::SubParam),
        ("ParamType", MemberAttribute::ParamType),
        ("Interval", MemberAttribute::Interval),
        ("Duration", MemberAttribute::Duration),
        ("Version", MemberAttribute::Version),
        ("BaseVersion", MemberAttribute::BaseVersion),
        ("SubVersion", MemberAttribute::SubVersion),
    ];

    /// Case-insensitive attribute name lookup
    pub fn parse(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::NAMES
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, attr)| *attr)
    }

    pub fn as_str(self) -> &'static str {
        Self::NAMES
            .iter()
            .find(|(_, attr)| *attr == self)
            .map(|(n, _)| *n)
            .unwrap_or("Unknown")
    }

    pub fn category(self) -> CriterionCategory {
        use MemberAttribute::*;
        match self {
            Location | BaseLocation | SubLocation => CriterionCategory::Location,
            Param | BaseParam | SubParam => CriterionCategory::Param,
            ParamType => CriterionCategory::ParamType,
            Interval => CriterionCategory::Interval,
            Duration => CriterionCategory::Duration,
            Version | BaseVersion | SubVersion => CriterionCategory::Version,
        }
    }

    /// The identifier part this attribute selects
    pub fn value_of(self, parts: &TsIdParts) -> &str {
        use MemberAttribute::*;
        match self {
            Location => &parts.location,
            BaseLocation => parts.base_location(),
            SubLocation => parts.sub_location(),
            Param => &parts.param,
            BaseParam => parts.base_param(),
            SubParam => parts.sub_param(),
            ParamType => &parts.param_type,
            Interval => &parts.interval,
            Duration => &parts.duration,
            Version => &parts.version,
            BaseVersion => parts.base_version(),
            SubVersion => parts.sub_version(),
        }
    }
}

impl fmt::Display for MemberAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An (attribute, pattern) pair as stored. The attribute stays textual so
/// definitions written by newer editors still load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupCriterion {
    pub attribute: String,
    pub pattern: String,
}

impl GroupCriterion {
    pub fn new(attribute: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
            pattern: pattern.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubGroupRef {
    pub group_id: DbKey,
    pub mode: CombineMode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TsGroup {
    /// `None` until first saved
    pub id: Option<DbKey>,
    pub name: String,
    pub group_type: String,
    pub description: String,
    /// Milliseconds since epoch of the last save
    pub modified_at: i64,
    pub ts_members: Vec<DbKey>,
    pub site_ids: Vec<DbKey>,
    pub datatype_ids: Vec<DbKey>,
    pub criteria: Vec<GroupCriterion>,
    pub children: Vec<SubGroupRef>,
}

impl TsGroup {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            group_type: String::new(),
            description: String::new(),
            modified_at: 0,
            ts_members: Vec::new(),
            site_ids: Vec::new(),
            datatype_ids: Vec::new(),
            criteria: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn with_id(mut self, id: DbKey) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_type(mut self, group_type: impl Into<String>) -> Self {
        self.group_type = group_type.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn add_ts(mut self, ts_key: DbKey) -> Self {
        if !self.ts_members.contains(&ts_key) {
            self.ts_members.push(ts_key);
        }
        self
    }

    pub fn add_site(mut self, site_id: DbKey) -> Self {
        if !self.site_ids.contains(&site_id) {
            self.site_ids.push(site_id);
        }
        self
    }

    pub fn add_datatype(mut self, datatype_id: DbKey) -> Self {
        if !self.datatype_ids.contains(&datatype_id) {
            self.datatype_ids.push(datatype_id);
        }
        self
    }

    pub fn add_criterion(mut self, attribute: impl Into<String>, pattern: impl Into<String>) -> Self {
        self.criteria.push(GroupCriterion::new(attribute, pattern));
        self
    }

    /// Append a child reference; a repeated child keeps its first position
    /// and takes the new mode
    pub fn add_child(mut self, group_id: DbKey, mode: CombineMode) -> Self {
        match self.children.iter_mut().find(|c| c.group_id == group_id) {
            Some(existing) => existing.mode = mode,
            None => self.children.push(SubGroupRef { group_id, mode }),
        }
        self
    }

    pub fn include_group(self, group_id: DbKey) -> Self {
        self.add_child(group_id, CombineMode::Include)
    }

    pub fn subtract_group(self, group_id: DbKey) -> Self {
        self.add_child(group_id, CombineMode::Subtract)
    }

    pub fn intersect_group(self, group_id: DbKey) -> Self {
        self.add_child(group_id, CombineMode::Intersect)
    }

    /// Drop a child reference, e.g. when the child group is deleted
    pub fn remove_child(&mut self, group_id: DbKey) -> bool {
        let before = self.children.len();
        self.children.retain(|c| c.group_id != group_id);
        before != self.children.len()
    }

    pub fn has_direct_criteria(&self) -> bool {
        !self.site_ids.is_empty() || !self.datatype_ids.is_empty() || !self.criteria.is_empty()
    }

    /// No members, no criteria, no children
    pub fn is_empty_definition(&self) -> bool {
        self.ts_members.is_empty() && !self.has_direct_criteria() && self.children.is_empty()
    }

    pub fn display_id(&self) -> String {
        match self.id {
            Some(id) => id.to_string(),
            None => format!("<unsaved '{}'>", self.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::models::TimeSeriesIdentifier;

    fn set(keys: &[i64]) -> TsSet {
        keys.iter()
            .map(|k| {
                TimeSeriesIdentifier::new(DbKey(*k), TsIdParts::new("L", "P", "", "", "", ""))
            })
            .collect()
    }

    fn keys(s: &TsSet) -> Vec<i64> {
        s.iter().map(|t| t.key.0).collect()
    }

    #[test]
    fn test_combine_codes() {
        assert_eq!(CombineMode::from_code("A"), CombineMode::Include);
        assert_eq!(CombineMode::from_code("s"), CombineMode::Subtract);
        assert_eq!(CombineMode::from_code("F"), CombineMode::Subtract);
        assert_eq!(CombineMode::from_code("I"), CombineMode::Intersect);
        assert_eq!(CombineMode::from_code(""), CombineMode::Include);
        for mode in [CombineMode::Include, CombineMode::Subtract, CombineMode::Intersect] {
            assert_eq!(CombineMode::from_code(mode.code()), mode);
        }
    }

    #[test]
    fn test_combine_apply() {
        assert_eq!(keys(&CombineMode::Include.apply(set(&[1, 2]), set(&[2, 3]))), vec![1, 2, 3]);
        assert_eq!(keys(&CombineMode::Subtract.apply(set(&[1, 2]), set(&[2, 3]))), vec![1]);
        assert_eq!(keys(&CombineMode::Intersect.apply(set(&[1, 2]), set(&[2, 3]))), vec![2]);
        assert!(CombineMode::Intersect.apply(set(&[1]), set(&[])).is_empty());
        assert_eq!(keys(&CombineMode::Subtract.apply(set(&[1]), set(&[]))), vec![1]);
    }

    #[test]
    fn test_attribute_names_and_values() {
        assert_eq!(MemberAttribute::parse("baselocation"), Some(MemberAttribute::BaseLocation));
        assert_eq!(MemberAttribute::parse(" SubVersion "), Some(MemberAttribute::SubVersion));
        assert_eq!(MemberAttribute::parse("Color"), None);
        assert_eq!(MemberAttribute::ParamType.as_str(), "ParamType");

        let parts = TsIdParts::parse("Dam-Gate1.Flow-Out.Ave.1Hour.1Day.Rev-A").unwrap();
        assert_eq!(MemberAttribute::SubLocation.value_of(&parts), "Gate1");
        assert_eq!(MemberAttribute::BaseParam.value_of(&parts), "Flow");
        assert_eq!(MemberAttribute::Duration.value_of(&parts), "1Day");
        assert_eq!(MemberAttribute::SubVersion.category(), CriterionCategory::Version);
    }

    #[test]
    fn test_builder_deduplicates_children() {
        let g = TsGroup::new("Basin")
            .include_group(DbKey(2))
            .subtract_group(DbKey(3))
            .intersect_group(DbKey(2));
        assert_eq!(g.children.len(), 2);
        assert_eq!(g.children[0].mode, CombineMode::Intersect);
        assert!(!g.is_empty_definition());
        assert!(TsGroup::new("Empty").is_empty_definition());
        assert_eq!(TsGroup::new("x").display_id(), "<unsaved 'x'>");
    }
}
