//! GATT topology of the scooter.
//!
//! The scooter exposes a fixed set of six services. After connecting, the
//! manager discovers all of them, requests exactly the expected
//! characteristics from each, and records one [`CharacteristicHandle`] per
//! [`CharacteristicRole`] in a [`RoleTable`]. Everything here is pure; the
//! manager drives the transport with the plans it returns.

use std::collections::BTreeMap;

use thiserror::Error;
use unu_types::CharacteristicRole;
use unu_types::uuid as uuids;
use uuid::Uuid;

use crate::transport::CharacteristicHandle;

/// One service and the roles expected inside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceSpec {
    /// Service UUID.
    pub service: Uuid,
    /// Roles whose characteristics live in this service.
    pub roles: &'static [CharacteristicRole],
}

impl ServiceSpec {
    /// Characteristic UUIDs to request for this service.
    pub fn characteristic_uuids(&self) -> Vec<Uuid> {
        self.roles.iter().map(CharacteristicRole::uuid).collect()
    }
}

/// The scooter's service layout, in discovery order.
pub const SERVICE_TABLE: [ServiceSpec; 6] = [
    ServiceSpec {
        service: uuids::COMMAND_SERVICE,
        roles: &[
            CharacteristicRole::Command,
            CharacteristicRole::HibernationWake,
        ],
    },
    ServiceSpec {
        service: uuids::MAIN_SERVICE,
        roles: &[
            CharacteristicRole::ScooterState,
            CharacteristicRole::HandlebarLock,
        ],
    },
    ServiceSpec {
        service: uuids::POWER_SERVICE,
        roles: &[CharacteristicRole::PowerState],
    },
    ServiceSpec {
        service: uuids::AUX_BATTERY_SERVICE,
        roles: &[CharacteristicRole::AuxSoC],
    },
    ServiceSpec {
        service: uuids::CBB_SERVICE,
        roles: &[CharacteristicRole::CbbSoC, CharacteristicRole::CbbCharging],
    },
    ServiceSpec {
        service: uuids::BATTERY_SERVICE,
        roles: &[
            CharacteristicRole::PrimarySoC,
            CharacteristicRole::SecondarySoC,
        ],
    },
];

/// Look up the table entry for a service UUID.
pub fn service_spec(service: Uuid) -> Option<&'static ServiceSpec> {
    SERVICE_TABLE.iter().find(|spec| spec.service == service)
}

/// Failure while resolving the GATT layout.
///
/// A failure in one service never stops resolution of its siblings.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum DiscoveryError {
    /// Service discovery itself failed.
    #[error("Service discovery error: {reason}")]
    Services { reason: String },

    /// An expected service was not present.
    #[error("Service {service} not found")]
    ServiceNotFound { service: Uuid },

    /// Characteristic discovery for a service failed.
    #[error("Characteristic discovery error in service {service}: {reason}")]
    Characteristics { service: Uuid, reason: String },

    /// An expected characteristic was not present in its service.
    #[error("Characteristic {characteristic} not found in service {service}")]
    CharacteristicNotFound { service: Uuid, characteristic: Uuid },
}

/// Characteristic discovery requests derived from a service discovery result.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DiscoveryPlan {
    /// `(service, characteristics)` pairs to request, in table order.
    pub requests: Vec<(Uuid, Vec<Uuid>)>,
    /// Services that could not be resolved.
    pub errors: Vec<DiscoveryError>,
}

/// Plan characteristic discovery from the services the peripheral reported.
///
/// Each known service gets exactly its own characteristic subset. Services
/// outside the table are ignored; table services that are missing are
/// reported.
pub fn plan_characteristic_discovery(
    result: std::result::Result<Vec<Uuid>, String>,
) -> DiscoveryPlan {
    let found = match result {
        Ok(found) => found,
        Err(reason) => {
            return DiscoveryPlan {
                requests: Vec::new(),
                errors: vec![DiscoveryError::Services { reason }],
            };
        }
    };

    let mut plan = DiscoveryPlan::default();
    for spec in &SERVICE_TABLE {
        if found.contains(&spec.service) {
            plan.requests
                .push((spec.service, spec.characteristic_uuids()));
        } else {
            plan.errors.push(DiscoveryError::ServiceNotFound {
                service: spec.service,
            });
        }
    }
    plan
}

/// Handles recorded from one service's characteristic discovery.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Roles that resolved, in table order.
    pub resolved: Vec<(CharacteristicRole, CharacteristicHandle)>,
    /// Expected characteristics that were missing, or the discovery failure.
    pub errors: Vec<DiscoveryError>,
}

/// Map a characteristic discovery result onto roles.
///
/// Characteristics outside the service's expected subset are ignored.
pub fn resolve_characteristics(
    service: Uuid,
    result: std::result::Result<Vec<Uuid>, String>,
    generation: u64,
) -> Resolution {
    let Some(spec) = service_spec(service) else {
        return Resolution::default();
    };

    let found = match result {
        Ok(found) => found,
        Err(reason) => {
            return Resolution {
                resolved: Vec::new(),
                errors: vec![DiscoveryError::Characteristics { service, reason }],
            };
        }
    };

    let mut resolution = Resolution::default();
    for &role in spec.roles {
        let uuid = role.uuid();
        if found.contains(&uuid) {
            resolution.resolved.push((
                role,
                CharacteristicHandle {
                    service,
                    uuid,
                    generation,
                },
            ));
        } else {
            resolution
                .errors
                .push(DiscoveryError::CharacteristicNotFound {
                    service,
                    characteristic: uuid,
                });
        }
    }
    resolution
}

/// Role to handle mapping for the current connection.
///
/// Holds at most one handle per role and is cleared in full on every
/// disconnect.
#[derive(Debug, Default, Clone)]
pub struct RoleTable {
    handles: BTreeMap<CharacteristicRole, CharacteristicHandle>,
}

impl RoleTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every handle.
    pub fn clear(&mut self) {
        self.handles.clear();
    }

    /// Record a handle, replacing any earlier one for the role.
    pub fn insert(&mut self, role: CharacteristicRole, handle: CharacteristicHandle) {
        self.handles.insert(role, handle);
    }

    /// Handle for a role.
    pub fn get(&self, role: CharacteristicRole) -> Option<CharacteristicHandle> {
        self.handles.get(&role).copied()
    }

    /// Whether no roles are resolved.
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Number of resolved roles.
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Role of a resolved characteristic UUID.
    pub fn role_for(&self, uuid: Uuid) -> Option<CharacteristicRole> {
        self.handles
            .iter()
            .find(|(_, handle)| handle.uuid == uuid)
            .map(|(role, _)| *role)
    }

    /// Resolved telemetry handles, which get a read and notifications.
    pub fn telemetry(&self) -> Vec<(CharacteristicRole, CharacteristicHandle)> {
        self.handles
            .iter()
            .filter(|(role, _)| role.is_telemetry())
            .map(|(role, handle)| (*role, *handle))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_covers_every_role_once() {
        let mut roles: Vec<_> = SERVICE_TABLE
            .iter()
            .flat_map(|spec| spec.roles.iter().copied())
            .collect();
        roles.sort();
        let mut all = CharacteristicRole::ALL.to_vec();
        all.sort();
        assert_eq!(roles, all);

        for spec in &SERVICE_TABLE {
            for role in spec.roles {
                assert_eq!(role.service(), spec.service);
            }
        }
    }

    #[test]
    fn test_plan_requests_exact_subsets() {
        let plan = plan_characteristic_discovery(Ok(uuids::ALL_SERVICES.to_vec()));
        assert!(plan.errors.is_empty());
        assert_eq!(plan.requests.len(), 6);

        let (service, chars) = &plan.requests[1];
        assert_eq!(*service, uuids::MAIN_SERVICE);
        assert_eq!(chars, &vec![uuids::SCOOTER_STATE, uuids::HANDLEBAR_LOCK]);
    }

    #[test]
    fn test_plan_reports_missing_service_and_continues() {
        let found = vec![uuids::COMMAND_SERVICE, uuids::MAIN_SERVICE, Uuid::nil()];
        let plan = plan_characteristic_discovery(Ok(found));
        assert_eq!(plan.requests.len(), 2);
        assert_eq!(plan.errors.len(), 4);
        assert!(plan.errors.contains(&DiscoveryError::ServiceNotFound {
            service: uuids::CBB_SERVICE
        }));
    }

    #[test]
    fn test_plan_service_failure() {
        let plan = plan_characteristic_discovery(Err("GATT error".into()));
        assert!(plan.requests.is_empty());
        assert_eq!(
            plan.errors,
            vec![DiscoveryError::Services {
                reason: "GATT error".into()
            }]
        );
    }

    #[test]
    fn test_resolve_records_generation() {
        let resolution = resolve_characteristics(
            uuids::CBB_SERVICE,
            Ok(vec![uuids::CBB_SOC, uuids::CBB_CHARGING, Uuid::nil()]),
            7,
        );
        assert!(resolution.errors.is_empty());
        assert_eq!(resolution.resolved.len(), 2);
        let (role, handle) = resolution.resolved[0];
        assert_eq!(role, CharacteristicRole::CbbSoC);
        assert_eq!(handle.uuid, uuids::CBB_SOC);
        assert_eq!(handle.service, uuids::CBB_SERVICE);
        assert_eq!(handle.generation, 7);
    }

    #[test]
    fn test_resolve_missing_characteristic() {
        let resolution =
            resolve_characteristics(uuids::COMMAND_SERVICE, Ok(vec![uuids::COMMAND]), 1);
        assert_eq!(resolution.resolved.len(), 1);
        assert_eq!(
            resolution.errors,
            vec![DiscoveryError::CharacteristicNotFound {
                service: uuids::COMMAND_SERVICE,
                characteristic: uuids::HIBERNATION_COMMAND,
            }]
        );
    }

    #[test]
    fn test_resolve_failure_and_unknown_service() {
        let resolution = resolve_characteristics(uuids::POWER_SERVICE, Err("timeout".into()), 1);
        assert!(resolution.resolved.is_empty());
        assert_eq!(resolution.errors.len(), 1);

        let resolution = resolve_characteristics(Uuid::nil(), Ok(vec![uuids::COMMAND]), 1);
        assert_eq!(resolution, Resolution::default());
    }

    #[test]
    fn test_role_table() {
        let mut table = RoleTable::new();
        assert!(table.is_empty());

        let handle = |uuid| CharacteristicHandle {
            service: uuids::MAIN_SERVICE,
            uuid,
            generation: 1,
        };
        table.insert(CharacteristicRole::ScooterState, handle(uuids::SCOOTER_STATE));
        table.insert(CharacteristicRole::Command, handle(uuids::COMMAND));
        table.insert(CharacteristicRole::ScooterState, handle(uuids::SCOOTER_STATE));

        assert_eq!(table.len(), 2);
        assert_eq!(
            table.role_for(uuids::SCOOTER_STATE),
            Some(CharacteristicRole::ScooterState)
        );
        assert_eq!(table.role_for(uuids::AUX_SOC), None);

        let telemetry = table.telemetry();
        assert_eq!(telemetry.len(), 1);
        assert_eq!(telemetry[0].0, CharacteristicRole::ScooterState);

        table.clear();
        assert!(table.is_empty());
        assert_eq!(table.get(CharacteristicRole::Command), None);
    }
}
