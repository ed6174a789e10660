//! Computation save / update / delete through a session configured from YAML

mod common;

use common::*;
use hydrograph_deps::{
    CompFilter, CompParm, Computation, ConfigError, DbKey, DeliveryMode, DepsConfig, DepsError,
    ParmTemplate, TsGroup,
};
use hydrograph_storage::SqliteDatabase;
use pretty_assertions::assert_eq;
use std::io::Write;

#[test]
fn test_session_from_yaml_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        "version: 1\ncache:\n  group_ttl_secs: 30\nnotify:\n  delivery: at_most_once\nupdater:\n  full_eval_on_startup: true"
    )
    .unwrap();

    let config = DepsConfig::from_yaml(file.path()).unwrap();
    assert_eq!(config.cache.group_ttl_secs, 30);
    assert_eq!(config.notify.delivery, DeliveryMode::AtMostOnce);
    assert!(config.updater.full_eval_on_startup);

    let s = session_on(
        SqliteDatabase::in_memory().unwrap().into_shared(),
        river_catalog(),
        config,
    );
    assert_eq!(s.service.queue().delivery(), DeliveryMode::AtMostOnce);
}

#[test]
fn test_yaml_without_version_is_rejected() {
    let err = DepsConfig::from_yaml_str("cache:\n  group_ttl_secs: 30\n").unwrap_err();
    assert!(matches!(err, ConfigError::MissingVersion));
}

#[test]
fn test_full_lifecycle() {
    let s = session();
    let gid = s.service.save_group(&mut TsGroup::new("dam").add_site(DbKey(1))).unwrap();
    drain(&s.service);

    let mut comp = Computation::new("Dam Flow Rating")
        .with_group(gid)
        .with_algorithm(DbKey(7))
        .with_parm(CompParm::template_input(
            "stage",
            ParmTemplate {
                param: Some("Stage".into()),
                ..ParmTemplate::default()
            },
        ))
        .with_parm(CompParm::output(
            "flow",
            ParmTemplate {
                param: Some("Flow".into()),
                ..ParmTemplate::default()
            },
        ));
    let id = s.service.save_computation(&mut comp).unwrap();
    assert_eq!(drain(&s.service), vec![("C".to_string(), id.0)]);
    assert_eq!(s.service.tracker().edges_for(id).unwrap().len(), 1);

    // Rename and update keep the id
    comp.name = "Dam Flow Rating v2".into();
    s.clock.advance_millis(1_000);
    assert_eq!(s.service.save_computation(&mut comp).unwrap(), id);
    assert!(s.service.computations().get_by_name("dam flow rating v2").unwrap().is_some());
    assert!(s.service.computations().get_by_name("Dam Flow Rating").unwrap().is_none());

    let by_group = s
        .service
        .computations()
        .list(&CompFilter::default().with_group(gid))
        .unwrap();
    assert_eq!(by_group.len(), 1);

    s.service.delete_computation(id).unwrap();
    assert!(s.service.computations().get_by_id(id).unwrap().is_none());
    assert!(s.service.tracker().all_edges().unwrap().is_empty());
    assert!(s.service.delete_computation(id).unwrap_err().is_not_found());
}

#[test]
fn test_timed_computation_has_no_edges() {
    let s = session();
    let mut comp = Computation::new("daily average")
        .with_property("timedCompInterval", "1Day")
        .with_parm(CompParm::bound_input("in", DbKey(5)));
    let id = s.service.save_computation(&mut comp).unwrap();
    assert!(s.service.tracker().edges_for(id).unwrap().is_empty());

    comp.properties.clear();
    s.service.save_computation(&mut comp).unwrap();
    assert_eq!(s.service.tracker().edges_for(id).unwrap().len(), 1);
}

#[test]
fn test_duplicate_roles_rejected() {
    let s = session();
    let mut comp = Computation::new("dup roles");
    comp.parms = vec![
        CompParm::bound_input("in", DbKey(1)),
        CompParm::bound_input("IN", DbKey(2)),
    ];
    assert!(matches!(
        s.service.save_computation(&mut comp).unwrap_err(),
        DepsError::Validation(_)
    ));
    assert!(comp.id.is_none());
}
