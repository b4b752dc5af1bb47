//! Status view - Reconciling the catalog against live and remembered processes

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::catalog::{Catalog, LIMBO_NAME, PROXY_NAME};
use super::instance::{parse_instance, InstanceTracker};
use super::process::Liveness;

/// Kind of a singleton unit as reported to clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitType {
    Proxy,
    Limbo,
    Service,
}

/// Status of the proxy, the limbo server or one service
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitStatus {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub unit_type: UnitType,
    pub running: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
}

/// One numbered game-server instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstanceStatus {
    pub id: String,
    pub instance: u32,
    pub running: bool,
}

/// Every instance of one server kind, ascending by instance number
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerKindStatus {
    pub name: String,
    pub instances: Vec<InstanceStatus>,
}

/// Point-in-time view of the whole fleet
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusSnapshot {
    pub proxy: UnitStatus,
    pub limbo: UnitStatus,
    pub services: Vec<UnitStatus>,
    /// Keyed by lowercase kind id
    pub gameservers: BTreeMap<String, ServerKindStatus>,
}

/// Raw per-LogicalName state, as served by `/api/status`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RawEntry {
    pub running: bool,
    pub pid: Option<u32>,
    pub started_at: Option<DateTime<Utc>>,
}

fn liveness_of(liveness: &HashMap<String, Liveness>, name: &str) -> Liveness {
    liveness.get(name).copied().unwrap_or(Liveness::NotRunning)
}

fn unit(
    liveness: &HashMap<String, Liveness>,
    id: String,
    name: &str,
    logical_name: &str,
    unit_type: UnitType,
) -> UnitStatus {
    let state = liveness_of(liveness, logical_name);
    UnitStatus {
        id,
        name: name.to_string(),
        unit_type,
        running: state.is_running(),
        pid: state.pid(),
    }
}

/// Build a snapshot from polled table liveness and the tracker.
///
/// Names missing from `liveness` are reported as not running. Every server kind gets
/// at least one entry: a not-running placeholder numbered 0 when nothing is known.
pub fn build(
    catalog: &Catalog,
    liveness: &HashMap<String, Liveness>,
    tracker: &InstanceTracker,
) -> StatusSnapshot {
    let proxy = unit(liveness, "proxy".to_string(), PROXY_NAME, PROXY_NAME, UnitType::Proxy);
    let limbo = unit(
        liveness,
        "nanolimbo".to_string(),
        LIMBO_NAME,
        LIMBO_NAME,
        UnitType::Limbo,
    );

    let services = catalog
        .services()
        .iter()
        .map(|service| unit(liveness, service.id(), service.name(), service.jar, UnitType::Service))
        .collect();

    let mut gameservers = BTreeMap::new();
    for kind in catalog.server_kinds() {
        let numbers: BTreeSet<u32> = tracker
            .instances_of(kind)
            .into_iter()
            .chain(liveness.keys().filter_map(|name| parse_instance(kind, name)))
            .collect();

        let mut instances: Vec<InstanceStatus> = numbers
            .into_iter()
            .map(|instance| InstanceStatus {
                id: format!("{}_{}", kind.id(), instance),
                instance,
                running: liveness_of(liveness, &kind.instance_name(instance)).is_running(),
            })
            .collect();

        if instances.is_empty() {
            instances.push(InstanceStatus {
                id: format!("{}_0", kind.id()),
                instance: 0,
                running: false,
            });
        }

        gameservers.insert(
            kind.id(),
            ServerKindStatus {
                name: kind.name.to_string(),
                instances,
            },
        );
    }

    StatusSnapshot {
        proxy,
        limbo,
        services,
        gameservers,
    }
}

/// Raw state of every name in the table or the tracker
pub fn build_raw(
    liveness: &HashMap<String, Liveness>,
    started_at: &HashMap<String, DateTime<Utc>>,
    tracker: &InstanceTracker,
) -> BTreeMap<String, RawEntry> {
    tracker
        .all()
        .iter()
        .chain(liveness.keys())
        .map(|name| {
            let state = liveness_of(liveness, name);
            let entry = RawEntry {
                running: state.is_running(),
                pid: state.pid(),
                started_at: started_at.get(name).copied(),
            };
            (name.clone(), entry)
        })
        .collect()
}
