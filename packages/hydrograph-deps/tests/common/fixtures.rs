//! Catalogs and sessions

use super::CountingExecutor;
use hydrograph_deps::{
    DbKey, DependencyService, DepsConfig, InMemoryTsCatalog, ManualClock, MetadataResolver,
    TimeSeriesIdentifier, TsIdParts,
};
use hydrograph_storage::{SqliteDatabase, StatementExecutor};
use std::sync::Arc;

pub const START_MILLIS: i64 = 1_700_000_000_000;

pub fn series(key: i64, name: &str, site: i64) -> TimeSeriesIdentifier {
    TimeSeriesIdentifier::new(DbKey(key), TsIdParts::parse(name).expect("six-part name"))
        .with_site(DbKey(site))
}

/// Two sites with stage and flow series, a third with stage only
///
/// | key | identifier                       | site |
/// |-----|----------------------------------|------|
/// | 1   | Dam.Stage.Inst.1Hour.0.Raw       | 1    |
/// | 2   | Dam.Flow.Inst.1Hour.0.Raw        | 1    |
/// | 3   | Weir.Stage.Inst.1Hour.0.Raw      | 2    |
/// | 4   | Weir.Flow.Inst.1Hour.0.Raw       | 2    |
/// | 5   | Lake-North.Stage.Inst.1Day.0.Rev | 3    |
pub fn river_catalog() -> Arc<InMemoryTsCatalog> {
    Arc::new(InMemoryTsCatalog::with_series([
        series(1, "Dam.Stage.Inst.1Hour.0.Raw", 1),
        series(2, "Dam.Flow.Inst.1Hour.0.Raw", 1),
        series(3, "Weir.Stage.Inst.1Hour.0.Raw", 2),
        series(4, "Weir.Flow.Inst.1Hour.0.Raw", 2),
        series(5, "Lake-North.Stage.Inst.1Day.0.Rev", 3),
    ]))
}

pub struct TestSession {
    pub service: Arc<DependencyService>,
    pub catalog: Arc<InMemoryTsCatalog>,
    pub clock: Arc<ManualClock>,
}

pub fn session_on(
    db: Arc<dyn StatementExecutor>,
    catalog: Arc<InMemoryTsCatalog>,
    config: DepsConfig,
) -> TestSession {
    let clock = Arc::new(ManualClock::new(START_MILLIS));
    let metadata: Arc<dyn MetadataResolver> = catalog.clone();
    let service = DependencyService::with_clock(db, metadata, config, None, clock.clone())
        .expect("service");
    TestSession {
        service: Arc::new(service),
        catalog,
        clock,
    }
}

/// In-memory database, river catalog, default config
pub fn session() -> TestSession {
    session_on(
        SqliteDatabase::in_memory().expect("in-memory database").into_shared(),
        river_catalog(),
        DepsConfig::default(),
    )
}

/// Session over a counting executor, for round-trip assertions
pub fn counted_session(config: DepsConfig) -> (TestSession, Arc<CountingExecutor>) {
    let db = Arc::new(CountingExecutor::in_memory());
    let shared: Arc<dyn StatementExecutor> = db.clone();
    (session_on(shared, river_catalog(), config), db)
}

/// Ack every pending record and return (event code, key) pairs in order
pub fn drain(service: &DependencyService) -> Vec<(String, i64)> {
    let mut out = Vec::new();
    while let Some(record) = service.poll_notification().expect("poll") {
        service.ack_notification(&record).expect("ack");
        out.push((record.event_type.code().to_string(), record.key.0));
    }
    out
}
