//! Computation definitions and parameter templates

use crate::shared::models::{DbKey, TsIdParts};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Property marking a computation as timed (run on a schedule, not on data)
pub const TIMED_INTERVAL_PROPERTY: &str = "timedCompInterval";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParmDirection {
    Input,
    Output,
}

impl ParmDirection {
    /// Stored code: `i` or `o`; anything else reads as input
    pub fn from_code(code: &str) -> Self {
        if code.trim().eq_ignore_ascii_case("o") {
            ParmDirection::Output
        } else {
            ParmDirection::Input
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            ParmDirection::Input => "i",
            ParmDirection::Output => "o",
        }
    }
}

/// Identifier parts a parameter overrides on each group member.
/// `None` or blank keeps the member's part.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParmTemplate {
    pub location: Option<String>,
    pub param: Option<String>,
    pub param_type: Option<String>,
    pub interval: Option<String>,
    pub duration: Option<String>,
    pub version: Option<String>,
}

fn override_part(target: &mut String, with: &Option<String>) -> bool {
    match with.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() && v != target.as_str() => {
            *target = v.to_string();
            true
        }
        _ => false,
    }
}

impl ParmTemplate {
    pub fn is_empty(&self) -> bool {
        [
            &self.location,
            &self.param,
            &self.param_type,
            &self.interval,
            &self.duration,
            &self.version,
        ]
        .iter()
        .all(|p| p.as_deref().map_or(true, |s| s.trim().is_empty()))
    }

    /// Apply the overrides to `member`. The flag is false when nothing changed.
    pub fn transform(&self, member: &TsIdParts) -> (TsIdParts, bool) {
        let mut out = member.clone();
        let mut changed = false;
        changed |= override_part(&mut out.location, &self.location);
        changed |= override_part(&mut out.param, &self.param);
        changed |= override_part(&mut out.param_type, &self.param_type);
        changed |= override_part(&mut out.interval, &self.interval);
        changed |= override_part(&mut out.duration, &self.duration);
        changed |= override_part(&mut out.version, &self.version);
        (out, changed)
    }
}

/// One named parameter slot of a computation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompParm {
    pub role_name: String,
    pub direction: ParmDirection,
    /// Fully bound series; when set the template is ignored
    pub ts_key: Option<DbKey>,
    pub template: ParmTemplate,
}

impl CompParm {
    pub fn bound_input(role_name: impl Into<String>, ts_key: DbKey) -> Self {
        Self {
            role_name: role_name.into(),
            direction: ParmDirection::Input,
            ts_key: Some(ts_key),
            template: ParmTemplate::default(),
        }
    }

    pub fn template_input(role_name: impl Into<String>, template: ParmTemplate) -> Self {
        Self {
            role_name: role_name.into(),
            direction: ParmDirection::Input,
            ts_key: None,
            template,
        }
    }

    pub fn output(role_name: impl Into<String>, template: ParmTemplate) -> Self {
        Self {
            role_name: role_name.into(),
            direction: ParmDirection::Output,
            ts_key: None,
            template,
        }
    }

    pub fn is_input(&self) -> bool {
        self.direction == ParmDirection::Input
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Computation {
    pub id: Option<DbKey>,
    pub name: String,
    pub enabled: bool,
    pub algorithm_id: Option<DbKey>,
    pub group_id: Option<DbKey>,
    pub app_id: Option<DbKey>,
    pub comment: String,
    pub modified_at: i64,
    pub parms: Vec<CompParm>,
    pub properties: BTreeMap<String, String>,
}

impl Computation {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            enabled: true,
            algorithm_id: None,
            group_id: None,
            app_id: None,
            comment: String::new(),
            modified_at: 0,
            parms: Vec::new(),
            properties: BTreeMap::new(),
        }
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_group(mut self, group_id: DbKey) -> Self {
        self.group_id = Some(group_id);
        self
    }

    pub fn with_algorithm(mut self, algorithm_id: DbKey) -> Self {
        self.algorithm_id = Some(algorithm_id);
        self
    }

    pub fn with_app(mut self, app_id: DbKey) -> Self {
        self.app_id = Some(app_id);
        self
    }

    pub fn with_parm(mut self, parm: CompParm) -> Self {
        self.parms.retain(|p| !p.role_name.eq_ignore_ascii_case(&parm.role_name));
        self.parms.push(parm);
        self
    }

    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    /// Case-insensitive property lookup
    pub fn property(&self, name: &str) -> Option<&str> {
        self.properties
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn is_timed(&self) -> bool {
        self.property(TIMED_INTERVAL_PROPERTY)
            .is_some_and(|v| !v.trim().is_empty())
    }

    pub fn inputs(&self) -> impl Iterator<Item = &CompParm> {
        self.parms.iter().filter(|p| p.is_input())
    }

    /// Participates in dependency tracking at all
    pub fn is_triggered(&self) -> bool {
        self.enabled && !self.is_timed()
    }

    pub fn display_id(&self) -> String {
        match self.id {
            Some(id) => id.to_string(),
            None => format!("<unsaved '{}'>", self.name),
        }
    }
}

impl fmt::Display for Computation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.display_id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transform_overrides_only_set_parts() {
        let member = TsIdParts::parse("Dam.Stage.Inst.1Hour.0.Raw").unwrap();
        let t = ParmTemplate {
            param: Some("Flow".into()),
            version: Some("  ".into()),
            ..ParmTemplate::default()
        };
        let (out, changed) = t.transform(&member);
        assert!(changed);
        assert_eq!(out.unique_string(), "Dam.Flow.Inst.1Hour.0.Raw");

        let (same, changed) = ParmTemplate::default().transform(&member);
        assert!(!changed);
        assert_eq!(same, member);
        assert!(ParmTemplate::default().is_empty());
    }

    #[test]
    fn test_timed_property_is_case_insensitive() {
        let c = Computation::new("c").with_property("TimedCompInterval", "1Hour");
        assert!(c.is_timed());
        assert!(!c.is_triggered());
        assert!(!Computation::new("c").with_property("timedCompInterval", "").is_timed());
        assert!(Computation::new("c").is_triggered());
    }

    #[test]
    fn test_parms_replace_by_role_and_filter_inputs() {
        let c = Computation::new("c")
            .with_parm(CompParm::bound_input("input", DbKey(1)))
            .with_parm(CompParm::output("output", ParmTemplate::default()))
            .with_parm(CompParm::bound_input("INPUT", DbKey(2)));
        assert_eq!(c.parms.len(), 2);
        let inputs: Vec<_> = c.inputs().map(|p| p.ts_key).collect();
        assert_eq!(inputs, vec![Some(DbKey(2))]);
        assert_eq!(ParmDirection::from_code("O"), ParmDirection::Output);
        assert_eq!(ParmDirection::from_code(""), ParmDirection::Input);
    }
}
