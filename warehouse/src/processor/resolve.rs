use std::collections::HashMap;

use crate::models::staging::StagingBooking;
use crate::processor::dimensions::DimensionTable;

/// The five foreign-key slots of a fact row. Both location slots resolve
/// against the same shared locations dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyField {
    Customer,
    Vehicle,
    PickupLocation,
    DropLocation,
    PaymentMethod,
}

impl KeyField {
    pub const ALL: [KeyField; 5] = [
        KeyField::Customer,
        KeyField::Vehicle,
        KeyField::PickupLocation,
        KeyField::DropLocation,
        KeyField::PaymentMethod,
    ];

    /// The staging column the slot is resolved from; this is the name the
    /// diagnostics report.
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyField::Customer => "customer_id",
            KeyField::Vehicle => "vehicle_type",
            KeyField::PickupLocation => "pickup_location",
            KeyField::DropLocation => "drop_location",
            KeyField::PaymentMethod => "payment_method",
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ResolvedKeys {
    pub customer_key: Option<i64>,
    pub vehicle_key: Option<i64>,
    pub pickup_location_key: Option<i64>,
    pub drop_location_key: Option<i64>,
    pub payment_method_key: Option<i64>,
}

impl ResolvedKeys {
    fn slot(&self, field: KeyField) -> Option<i64> {
        match field {
            KeyField::Customer => self.customer_key,
            KeyField::Vehicle => self.vehicle_key,
            KeyField::PickupLocation => self.pickup_location_key,
            KeyField::DropLocation => self.drop_location_key,
            KeyField::PaymentMethod => self.payment_method_key,
        }
    }

    pub fn missing_fields(&self) -> Vec<KeyField> {
        KeyField::ALL
            .into_iter()
            .filter(|f| self.slot(*f).is_none())
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        KeyField::ALL.into_iter().all(|f| self.slot(f).is_some())
    }
}

/// A staging row after key resolution. The row survives resolution even
/// when slots are missing; the fact loader applies the strict policy.
#[derive(Debug, Clone)]
pub struct ResolvedBooking {
    pub row: StagingBooking,
    pub keys: ResolvedKeys,
}

/// The per-run natural-key to surrogate-key dictionaries, built once from
/// the freshly persisted dimension tables and consulted for every row.
pub struct KeyResolver {
    customers: HashMap<String, i64>,
    vehicles: HashMap<String, i64>,
    locations: HashMap<String, i64>,
    payment_methods: HashMap<String, i64>,
}

impl KeyResolver {
    pub fn new(
        customers: &DimensionTable,
        vehicles: &DimensionTable,
        locations: &DimensionTable,
        payment_methods: &DimensionTable,
    ) -> Self {
        Self {
            customers: customers.lookup_map(),
            vehicles: vehicles.lookup_map(),
            locations: locations.lookup_map(),
            payment_methods: payment_methods.lookup_map(),
        }
    }

    /// Left-lookup: every slot is filled with `Some(key)` or `None`, never
    /// an error. Empty strings resolve to missing, same as nulls.
    pub fn resolve(&self, row: StagingBooking) -> ResolvedBooking {
        let keys = ResolvedKeys {
            customer_key: lookup(&self.customers, row.customer_id.as_deref()),
            vehicle_key: lookup(&self.vehicles, row.vehicle_type.as_deref()),
            pickup_location_key: lookup(&self.locations, row.pickup_location.as_deref()),
            drop_location_key: lookup(&self.locations, row.drop_location.as_deref()),
            payment_method_key: lookup(&self.payment_methods, row.payment_method.as_deref()),
        };

        ResolvedBooking { row, keys }
    }
}

fn lookup(map: &HashMap<String, i64>, value: Option<&str>) -> Option<i64> {
    match value {
        Some(v) if !v.is_empty() => map.get(v).copied(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::dimensions::{DimensionBuilder, DimensionKind, DimensionTable};
    use std::collections::BTreeSet;

    fn dimension(kind: DimensionKind, values: &[&str]) -> DimensionTable {
        let mut table = DimensionTable::empty(kind);
        let set: BTreeSet<String> = values.iter().map(|s| s.to_string()).collect();
        table.upsert(&set);
        table
    }

    fn resolver() -> KeyResolver {
        KeyResolver::new(
            &dimension(DimensionKind::Customer, &["C1", "C2"]),
            &dimension(DimensionKind::Vehicle, &["Bike", "Sedan"]),
            &dimension(DimensionKind::Location, &["Airport", "Docks", "Uptown"]),
            &dimension(DimensionKind::PaymentMethod, &["Card", "Cash"]),
        )
    }

    fn staging_row() -> StagingBooking {
        StagingBooking {
            booking_id: Some("CNR001".to_string()),
            customer_id: Some("C1".to_string()),
            vehicle_type: Some("Sedan".to_string()),
            pickup_location: Some("Airport".to_string()),
            drop_location: Some("Docks".to_string()),
            payment_method: Some("Cash".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn resolves_all_keys_when_present() {
        let resolved = resolver().resolve(staging_row());
        assert!(resolved.keys.is_complete());
        assert!(resolved.keys.missing_fields().is_empty());
        // pickup and drop share the locations dimension
        assert_ne!(
            resolved.keys.pickup_location_key,
            resolved.keys.drop_location_key
        );
    }

    #[test]
    fn empty_and_unknown_values_resolve_to_missing() {
        let mut row = staging_row();
        row.pickup_location = Some(String::new());
        row.customer_id = Some("C999".to_string());

        let resolved = resolver().resolve(row);
        assert!(!resolved.keys.is_complete());

        let missing = resolved.keys.missing_fields();
        assert_eq!(missing, vec![KeyField::Customer, KeyField::PickupLocation]);

        // left-lookup: the rest of the row still resolved
        assert!(resolved.keys.vehicle_key.is_some());
        assert!(resolved.keys.drop_location_key.is_some());
    }

    #[test]
    fn lookups_are_case_sensitive() {
        let mut row = staging_row();
        row.vehicle_type = Some("sedan".to_string());

        let resolved = resolver().resolve(row);
        assert_eq!(resolved.keys.vehicle_key, None);
    }

    #[test]
    fn distinct_then_resolve_covers_all_rows() {
        // dimension built from the same rows it later resolves
        let rows = vec![staging_row()];
        let values = DimensionBuilder::distinct_values(DimensionKind::Location, &rows);
        let mut locations = DimensionTable::empty(DimensionKind::Location);
        locations.upsert(&values);

        let resolver = KeyResolver::new(
            &dimension(DimensionKind::Customer, &["C1"]),
            &dimension(DimensionKind::Vehicle, &["Sedan"]),
            &locations,
            &dimension(DimensionKind::PaymentMethod, &["Cash"]),
        );

        let resolved = resolver.resolve(rows[0].clone());
        assert!(resolved.keys.is_complete());
    }
}
