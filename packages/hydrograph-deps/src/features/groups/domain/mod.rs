//! Group domain: definitions, wildcard patterns, criteria matching

pub mod criteria;
pub mod model;
pub mod wildcard;

pub use criteria::CompiledCriteria;
pub use model::{
    CombineMode, CriterionCategory, GroupCriterion, MemberAttribute, SubGroupRef, TsGroup,
};
pub use wildcard::WildcardPattern;
