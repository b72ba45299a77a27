//! PathMap Builder
//!
//! Pure function from the desired service set to per-device ordered ops.
//! Documents are visited in name order, entries in document order, and
//! within an entry down ports come before up ports, each sorted. The same
//! set of documents therefore always yields the same PathMap, whatever
//! order they were submitted in.
//!
//! Every port claim is keyed by (device, schema namespace, port). When two
//! documents sharing a namespace claim the same port differently, the
//! document that sorts last by name wins and the loser is reported.

use indexmap::IndexMap;
use lodestar_core::{
    DeviceId, PathMap, PathOp, PortId, SchemaRegistry, ServiceDocument, ServiceName, ServiceSchema,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// A port claimed by two documents with different ops
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentConflict {
    /// Device both documents address
    pub device: DeviceId,
    /// Shared schema namespace
    pub namespace: String,
    /// Contested port
    pub port: PortId,
    /// Document whose claim was kept
    pub winner: ServiceName,
    /// Document whose claim was dropped
    pub loser: ServiceName,
}

impl std::fmt::Display for IntentConflict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{} port {}: {} overrides {}",
            self.device, self.namespace, self.port, self.winner, self.loser
        )
    }
}

/// Builder output with conflict detail and per-service attribution
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BuildReport {
    /// Combined PathMap
    pub path_map: PathMap,
    /// Claims dropped by the tie-break
    pub conflicts: Vec<IntentConflict>,
    /// Ops contributed by each document after conflict resolution
    pub per_service: BTreeMap<ServiceName, PathMap>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ClaimKey {
    namespace: String,
    port: PortId,
}

#[derive(Debug, Clone)]
struct Claim {
    service: ServiceName,
    ops: Vec<PathOp>,
}

/// Derives PathMaps from service documents
#[derive(Debug, Clone)]
pub struct PathMapBuilder {
    schemas: Arc<SchemaRegistry>,
}

impl PathMapBuilder {
    /// Builder resolving schemas from `schemas`
    pub fn new(schemas: Arc<SchemaRegistry>) -> Self {
        Self { schemas }
    }

    /// Combined PathMap of `services`
    pub fn build(&self, services: &[ServiceDocument]) -> PathMap {
        self.build_report(services).path_map
    }

    /// PathMap plus conflicts and per-service attribution
    pub fn build_report(&self, services: &[ServiceDocument]) -> BuildReport {
        let mut ordered: Vec<&ServiceDocument> = services.iter().collect();
        ordered.sort_by(|a, b| a.name.cmp(&b.name));

        let mut claims: BTreeMap<DeviceId, IndexMap<ClaimKey, Claim>> = BTreeMap::new();
        let mut conflicts = Vec::new();

        for doc in ordered {
            let Some(schema) = self.schemas.get(doc.schema_name()) else {
                tracing::warn!(service = %doc.name, schema = doc.schema_name(), "skipping document with unknown schema");
                continue;
            };
            for entry in &doc.entries {
                let device_claims = claims.entry(entry.name.clone()).or_default();
                for port in &entry.down {
                    let ops = vec![schema.down_op(port)];
                    claim(device_claims, &mut conflicts, &entry.name, schema, port, &doc.name, ops);
                }
                for port in &entry.up {
                    let ops = match schema.up_ops(port) {
                        Ok(ops) => ops,
                        Err(err) => {
                            tracing::warn!(service = %doc.name, device = %entry.name, port = %port, error = %err, "skipping port");
                            continue;
                        }
                    };
                    claim(device_claims, &mut conflicts, &entry.name, schema, port, &doc.name, ops);
                }
            }
        }

        let mut path_map = PathMap::new();
        let mut per_service: BTreeMap<ServiceName, PathMap> = BTreeMap::new();
        for (device, device_claims) in claims {
            let mut ops = Vec::new();
            for claim in device_claims.into_values() {
                let service_map = per_service.entry(claim.service).or_default();
                for op in &claim.ops {
                    service_map.push(device.clone(), op.clone());
                }
                ops.extend(claim.ops);
            }
            path_map.insert(device, ops);
        }

        BuildReport {
            path_map,
            conflicts,
            per_service,
        }
    }
}

fn claim(
    device_claims: &mut IndexMap<ClaimKey, Claim>,
    conflicts: &mut Vec<IntentConflict>,
    device: &DeviceId,
    schema: &ServiceSchema,
    port: &PortId,
    service: &ServiceName,
    ops: Vec<PathOp>,
) {
    let key = ClaimKey {
        namespace: schema.namespace.clone(),
        port: port.clone(),
    };
    if let Some(previous) = device_claims.shift_remove(&key) {
        if previous.ops != ops {
            tracing::warn!(device = %device, port = %port, winner = %service, loser = %previous.service, "conflicting intent");
            conflicts.push(IntentConflict {
                device: device.clone(),
                namespace: key.namespace.clone(),
                port: port.clone(),
                winner: service.clone(),
                loser: previous.service,
            });
        }
    }
    device_claims.insert(
        key,
        Claim {
            service: service.clone(),
            ops,
        },
    );
}
