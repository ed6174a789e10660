//! Time-series groups
//!
//! - `domain`: definitions, combine modes, wildcard criteria
//! - `application`: recursive expansion ([`GroupResolver`])
//! - `infrastructure`: the SQL-backed [`GroupStore`] and containment graph

pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::{GroupExpansion, GroupResolver, GroupSource};
pub use domain::{CombineMode, CompiledCriteria, GroupCriterion, MemberAttribute, SubGroupRef, TsGroup, WildcardPattern};
pub use infrastructure::{GroupParentGraph, GroupStore};
