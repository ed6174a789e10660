//! Dependency table maintenance through computation saves

mod common;

use common::*;
use hydrograph_deps::{
    CompParm, Computation, DbKey, DependencyEdge, ParmTemplate, ReplaceOutcome, TsGroup,
};
use pretty_assertions::assert_eq;
use std::collections::BTreeSet;

fn edge(ts: i64, comp: DbKey) -> DependencyEdge {
    DependencyEdge::new(DbKey(ts), comp)
}

fn stage_of_group_member() -> ParmTemplate {
    ParmTemplate {
        param: Some("Stage".into()),
        ..ParmTemplate::default()
    }
}

#[test]
fn test_second_recompute_writes_nothing() {
    let s = session();
    let g = s.service.save_group(&mut TsGroup::new("dam+weir").add_site(DbKey(1)).add_site(DbKey(2))).unwrap();
    let mut comp = Computation::new("stage check")
        .with_group(g)
        .with_parm(CompParm::template_input("stage", stage_of_group_member()));
    let id = s.service.save_computation(&mut comp).unwrap();

    let tracker = s.service.tracker();
    assert_eq!(
        tracker.edges_for(id).unwrap(),
        BTreeSet::from([edge(1, id), edge(3, id)])
    );
    assert_eq!(tracker.recompute_and_replace(&comp).unwrap(), ReplaceOutcome::default());
    assert_eq!(tracker.recompute_and_replace(&comp).unwrap(), ReplaceOutcome::default());
}

#[test]
fn test_replace_applies_exact_delta() {
    let s = session();
    let tracker = s.service.tracker();
    let c = DbKey(70);
    tracker.replace(c, &BTreeSet::from([edge(1, c), edge(2, c)])).unwrap();

    let outcome = tracker.replace(c, &BTreeSet::from([edge(2, c), edge(4, c)])).unwrap();
    assert_eq!(outcome, ReplaceOutcome { inserted: 1, deleted: 1 });
    assert_eq!(tracker.edges_for(c).unwrap(), BTreeSet::from([edge(2, c), edge(4, c)]));
}

#[test]
fn test_disabling_removes_all_edges() {
    let s = session();
    let mut comp = Computation::new("bound")
        .with_parm(CompParm::bound_input("a", DbKey(1)))
        .with_parm(CompParm::bound_input("b", DbKey(4)));
    let id = s.service.save_computation(&mut comp).unwrap();
    assert_eq!(s.service.tracker().edges_for(id).unwrap().len(), 2);

    comp.enabled = false;
    s.service.save_computation(&mut comp).unwrap();
    assert!(s.service.tracker().edges_for(id).unwrap().is_empty());

    comp.enabled = true;
    s.service.save_computation(&mut comp).unwrap();
    assert_eq!(s.service.tracker().edges_for(id).unwrap().len(), 2);
}

#[test]
fn test_group_edit_followed_by_recompute_moves_edges() {
    let s = session();
    let mut g = TsGroup::new("sites").add_site(DbKey(1));
    let gid = s.service.save_group(&mut g).unwrap();
    let mut comp = Computation::new("flow from stage")
        .with_group(gid)
        .with_parm(CompParm::template_input("stage", stage_of_group_member()));
    let id = s.service.save_computation(&mut comp).unwrap();
    assert_eq!(s.service.tracker().edges_for(id).unwrap(), BTreeSet::from([edge(1, id)]));

    g.site_ids = vec![DbKey(2)];
    s.service.save_group(&mut g).unwrap();
    let outcome = s.service.tracker().recompute_and_replace(&comp).unwrap();
    assert_eq!(outcome, ReplaceOutcome { inserted: 1, deleted: 1 });
    assert_eq!(s.service.tracker().edges_for(id).unwrap(), BTreeSet::from([edge(3, id)]));
}

#[test]
fn test_computations_for_filters_by_application() {
    let s = session();
    let a = s
        .service
        .save_computation(&mut Computation::new("a").with_app(DbKey(10)).with_parm(CompParm::bound_input("in", DbKey(1))))
        .unwrap();
    let b = s
        .service
        .save_computation(&mut Computation::new("b").with_app(DbKey(20)).with_parm(CompParm::bound_input("in", DbKey(2))))
        .unwrap();

    let tracker = s.service.tracker();
    assert_eq!(tracker.computations_for(&[DbKey(1), DbKey(2)], None).unwrap(), vec![a, b]);
    assert_eq!(tracker.computations_for(&[DbKey(1), DbKey(2)], Some(DbKey(20))).unwrap(), vec![b]);
    assert!(tracker.computations_for(&[], None).unwrap().is_empty());

    let triggers: Vec<i64> = tracker.triggers_for(a).unwrap().iter().map(|t| t.key.0).collect();
    assert_eq!(triggers, vec![1]);
}

#[test]
fn test_full_rebuild_repairs_drift() {
    let s = session();
    let mut comp = Computation::new("c").with_parm(CompParm::bound_input("in", DbKey(3)));
    let id = s.service.save_computation(&mut comp).unwrap();

    // Simulate a stale table: one missing edge, one orphan
    let tracker = s.service.tracker();
    tracker.remove_for_computation(id).unwrap();
    tracker.add_edges(&BTreeSet::from([edge(5, DbKey(999))])).unwrap();

    let outcome = s.service.rebuild_all_dependencies().unwrap();
    assert_eq!(outcome, ReplaceOutcome { inserted: 1, deleted: 1 });
    assert_eq!(tracker.all_edges().unwrap(), BTreeSet::from([edge(3, id)]));
}
