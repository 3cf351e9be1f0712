//! # Allocation engine
//!
//! Picks the binding (and so, the pool) that a line item is served from. There are three policies:
//!
//! * **Exact**: the customer chose every attribute. The binding with the same attribute hash is used.
//! * **Random**: a "blind box". The system draws one of the random-eligible bindings that can supply the quantity,
//!   weighted by binding priority.
//! * **Hybrid**: the customer chose some attributes and the rest are blind-box. Only bindings whose attributes contain
//!   the customer's choice are considered. One such binding is used directly, several are drawn from at random.
//!
//! The functions here are pure. They work on a snapshot of [`BindingCandidate`]s and leave the authoritative stock
//! check to the reservation ledger.
use std::collections::HashSet;

use log::*;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{
    db_types::{Attributes, Binding, CatalogItem, InventoryMode},
    helpers::{attributes_hash, normalize_attributes, weighted_pick},
    traits::{AllocationError, BindingCandidate},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AllocationPolicy {
    Exact,
    Random,
    Hybrid,
}

/// The outcome of an allocation: the chosen binding, and the full attribute set the line actually receives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allocation {
    pub binding: Binding,
    pub attributes: Attributes,
}

impl From<&BindingCandidate> for Allocation {
    fn from(candidate: &BindingCandidate) -> Self {
        Self { binding: candidate.binding.clone(), attributes: candidate.binding.attributes.clone() }
    }
}

/// Strips blind-box attributes (which the customer may not choose) from a selection, and normalizes the rest.
pub fn customer_selection(item: &CatalogItem, selection: &Attributes) -> Attributes {
    normalize_attributes(&selection.without_keys(&item.blind_box_attributes()))
}

/// Chooses the allocation policy for a catalog item, given the customer's (already stripped) selection.
pub fn choose_policy(item: &CatalogItem, selection: &Attributes) -> AllocationPolicy {
    let random_mode = item.inventory_mode == InventoryMode::Random || item.has_blind_box();
    if !random_mode {
        return AllocationPolicy::Exact;
    }
    if !item.user_select_attributes().is_empty() && !selection.is_empty() {
        AllocationPolicy::Hybrid
    } else {
        AllocationPolicy::Random
    }
}

/// Checks that the customer has supplied a value for every user-select attribute of an exact-mode item.
pub fn check_required_attributes(item: &CatalogItem, selection: &Attributes) -> Result<(), AllocationError> {
    match item.user_select_attributes().into_iter().find(|name| !selection.contains_key(name)) {
        Some(missing) => Err(AllocationError::MissingAttribute(missing.to_string())),
        None => Ok(()),
    }
}

pub fn allocate<R: Rng + ?Sized>(
    policy: AllocationPolicy,
    candidates: &[BindingCandidate],
    selection: &Attributes,
    quantity: i64,
    rng: &mut R,
) -> Result<Allocation, AllocationError> {
    match policy {
        AllocationPolicy::Exact => allocate_exact(candidates, selection),
        AllocationPolicy::Random => allocate_random(candidates, quantity, rng),
        AllocationPolicy::Hybrid => allocate_hybrid(candidates, selection, quantity, rng),
    }
}

/// Finds the binding whose attribute hash matches the selection.
pub fn allocate_exact(candidates: &[BindingCandidate], selection: &Attributes) -> Result<Allocation, AllocationError> {
    let hash = attributes_hash(selection);
    let candidate = candidates
        .iter()
        .find(|c| c.binding.attributes_hash == hash)
        .ok_or(AllocationError::NoMatchingConfiguration)?;
    if !candidate.pool_active {
        debug!("🎲️ Binding #{} matches {selection}, but its pool is inactive", candidate.binding.id);
        return Err(AllocationError::Unavailable);
    }
    Ok(Allocation::from(candidate))
}

/// Weighted draw over the active, random-eligible bindings that can supply `quantity` units.
pub fn allocate_random<R: Rng + ?Sized>(
    candidates: &[BindingCandidate],
    quantity: i64,
    rng: &mut R,
) -> Result<Allocation, AllocationError> {
    let eligible = candidates
        .iter()
        .filter(|c| c.binding.is_random && c.pool_active && c.available >= quantity)
        .cloned()
        .collect::<Vec<BindingCandidate>>();
    let chosen = weighted_pick(&eligible, rng).ok_or(AllocationError::InsufficientStockForAllocation(quantity))?;
    trace!("🎲️ Drew binding #{} from {} candidates", chosen.binding.id, eligible.len());
    Ok(Allocation::from(chosen))
}

/// Restricts the draw to bindings whose attributes are a superset of the customer's partial selection.
pub fn allocate_hybrid<R: Rng + ?Sized>(
    candidates: &[BindingCandidate],
    selection: &Attributes,
    quantity: i64,
    rng: &mut R,
) -> Result<Allocation, AllocationError> {
    let matching = candidates
        .iter()
        .filter(|c| c.pool_active && c.available >= quantity && c.binding.attributes.is_superset_of(selection))
        .cloned()
        .collect::<Vec<BindingCandidate>>();
    match matching.len() {
        0 => Err(AllocationError::NoMatchingConfiguration),
        1 => Ok(Allocation::from(&matching[0])),
        n => {
            trace!("🎲️ {n} bindings match {selection}. Drawing one at random");
            let chosen = weighted_pick(&matching, rng).ok_or(AllocationError::NoMatchingConfiguration)?;
            Ok(Allocation::from(chosen))
        },
    }
}

/// Total units available across all of an item's bindings. A pool that is bound more than once counts once.
pub fn total_available(candidates: &[BindingCandidate]) -> i64 {
    let mut seen = HashSet::new();
    candidates
        .iter()
        .filter(|c| c.pool_active && seen.insert((c.binding.pool_kind, c.binding.pool_id)))
        .map(|c| c.available.max(0))
        .sum()
}

/// Units available for a (possibly partial) selection: the exact match if there is one, otherwise every binding that
/// contains the selection, counting each pool once.
pub fn available_for_selection(candidates: &[BindingCandidate], selection: &Attributes) -> i64 {
    let hash = attributes_hash(selection);
    if let Some(exact) = candidates.iter().find(|c| c.binding.attributes_hash == hash) {
        return if exact.pool_active { exact.available.max(0) } else { 0 };
    }
    let matching =
        candidates.iter().filter(|c| c.binding.attributes.is_superset_of(selection)).cloned().collect::<Vec<_>>();
    total_available(&matching)
}

#[cfg(test)]
mod test {
    use chrono::Utc;
    use rand::{rngs::StdRng, SeedableRng};

    use super::*;
    use crate::db_types::{AttributeDef, AttributeDefs, PoolKind, ProductType};

    fn candidate(
        id: i64,
        pool_id: i64,
        attrs: Attributes,
        is_random: bool,
        priority: i64,
        available: i64,
    ) -> BindingCandidate {
        let binding = Binding {
            id,
            catalog_item_id: 1,
            pool_kind: PoolKind::Physical,
            pool_id,
            attributes_hash: attributes_hash(&attrs),
            attributes: attrs,
            is_random,
            priority,
            created_at: Utc::now(),
        };
        BindingCandidate { binding, available, pool_active: true }
    }

    fn item(defs: Vec<AttributeDef>, mode: InventoryMode) -> CatalogItem {
        CatalogItem {
            id: 1,
            sku: "TEE".into(),
            name: "T-shirt".into(),
            product_type: ProductType::Physical,
            inventory_mode: mode,
            attribute_defs: AttributeDefs(defs),
            auto_delivery: false,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn red() -> Attributes {
        Attributes::new().with("color", "red")
    }

    #[test]
    fn policy_selection() {
        let exact = item(vec![AttributeDef::user_select("color")], InventoryMode::Fixed);
        assert_eq!(choose_policy(&exact, &red()), AllocationPolicy::Exact);

        let blind = item(vec![AttributeDef::blind_box("size")], InventoryMode::Fixed);
        assert_eq!(choose_policy(&blind, &Attributes::new()), AllocationPolicy::Random);

        let defs = vec![AttributeDef::user_select("color"), AttributeDef::blind_box("size")];
        let mixed = item(defs, InventoryMode::Fixed);
        assert_eq!(choose_policy(&mixed, &red()), AllocationPolicy::Hybrid);
        assert_eq!(choose_policy(&mixed, &Attributes::new()), AllocationPolicy::Random);

        let random = item(vec![], InventoryMode::Random);
        assert_eq!(choose_policy(&random, &Attributes::new()), AllocationPolicy::Random);
    }

    #[test]
    fn blind_box_keys_are_stripped_from_selection() {
        let defs = vec![AttributeDef::user_select("color"), AttributeDef::blind_box("size")];
        let mixed = item(defs, InventoryMode::Fixed);
        let selection = Attributes::new().with("color", "red").with("size", "L").with("note", "");
        assert_eq!(customer_selection(&mixed, &selection), red());
    }

    #[test]
    fn required_attributes() {
        let defs = vec![AttributeDef::user_select("color"), AttributeDef::user_select("size")];
        let exact = item(defs, InventoryMode::Fixed);
        assert_eq!(check_required_attributes(&exact, &red()), Err(AllocationError::MissingAttribute("size".into())));
        assert!(check_required_attributes(&exact, &red().with("size", "M")).is_ok());
    }

    #[test]
    fn exact_match() {
        let candidates = vec![
            candidate(1, 10, red(), false, 1, 5),
            candidate(2, 20, Attributes::new().with("color", "blue"), false, 1, 5),
        ];
        let alloc = allocate_exact(&candidates, &red()).unwrap();
        assert_eq!(alloc.binding.pool_id, 10);
        let err = allocate_exact(&candidates, &Attributes::new().with("color", "green")).unwrap_err();
        assert_eq!(err, AllocationError::NoMatchingConfiguration);
    }

    #[test]
    fn exact_match_on_inactive_pool() {
        let mut c = candidate(1, 10, red(), false, 1, 5);
        c.pool_active = false;
        assert_eq!(allocate_exact(&[c], &red()).unwrap_err(), AllocationError::Unavailable);
    }

    #[test]
    fn random_skips_ineligible() {
        let mut rng = StdRng::seed_from_u64(1);
        let candidates = vec![
            candidate(1, 10, red().with("size", "S"), false, 100, 50),
            candidate(2, 20, red().with("size", "M"), true, 1, 1),
            candidate(3, 30, red().with("size", "L"), true, 1, 10),
        ];
        for _ in 0..100 {
            let alloc = allocate_random(&candidates, 2, &mut rng).unwrap();
            assert_eq!(alloc.binding.pool_id, 30);
            assert_eq!(alloc.attributes.get("size"), Some("L"));
        }
        let err = allocate_random(&candidates, 11, &mut rng).unwrap_err();
        assert_eq!(err, AllocationError::InsufficientStockForAllocation(11));
    }

    #[test]
    fn random_draw_respects_weights() {
        let mut rng = StdRng::seed_from_u64(2024);
        let candidates = vec![
            candidate(1, 10, red().with("size", "S"), true, 1, 1000),
            candidate(2, 20, red().with("size", "L"), true, 3, 1000),
        ];
        let trials = 2000;
        let large =
            (0..trials).filter(|_| allocate_random(&candidates, 1, &mut rng).unwrap().binding.pool_id == 20).count();
        let ratio = large as f64 / trials as f64;
        assert!((ratio - 0.75).abs() < 0.03, "large was drawn {ratio:.3} of the time");
    }

    #[test]
    fn hybrid_only_draws_supersets() {
        let mut rng = StdRng::seed_from_u64(9);
        let candidates = vec![
            candidate(1, 10, red(), true, 1, 10),
            candidate(2, 20, red().with("size", "L"), true, 1, 10),
            candidate(3, 30, Attributes::new().with("color", "blue").with("size", "L"), true, 5, 10),
        ];
        let mut seen = HashSet::new();
        for _ in 0..200 {
            let alloc = allocate_hybrid(&candidates, &red(), 3, &mut rng).unwrap();
            assert!(alloc.attributes.is_superset_of(&red()));
            seen.insert(alloc.binding.pool_id);
        }
        assert!(seen.contains(&10) && seen.contains(&20));
        assert!(!seen.contains(&30));
    }

    #[test]
    fn hybrid_single_match_is_fixed() {
        let mut rng = StdRng::seed_from_u64(9);
        let candidates = vec![
            candidate(1, 10, red().with("size", "S"), true, 1, 10),
            candidate(2, 20, Attributes::new().with("color", "blue").with("size", "L"), true, 1, 10),
        ];
        let selection = Attributes::new().with("size", "S");
        let alloc = allocate_hybrid(&candidates, &selection, 1, &mut rng).unwrap();
        assert_eq!(alloc.binding.pool_id, 10);
        let none = Attributes::new().with("size", "XL");
        let err = allocate_hybrid(&candidates, &none, 1, &mut rng).unwrap_err();
        assert_eq!(err, AllocationError::NoMatchingConfiguration);
    }

    #[test]
    fn totals_count_each_pool_once() {
        let candidates = vec![
            candidate(1, 10, red(), false, 1, 4),
            candidate(2, 10, red().with("size", "L"), false, 1, 4),
            candidate(3, 20, Attributes::new().with("color", "blue"), false, 1, 6),
        ];
        assert_eq!(total_available(&candidates), 10);
        assert_eq!(available_for_selection(&candidates, &red()), 4);
        assert_eq!(available_for_selection(&candidates, &Attributes::new().with("size", "L")), 4);
        assert_eq!(available_for_selection(&candidates, &Attributes::new()), 10);
    }
}
