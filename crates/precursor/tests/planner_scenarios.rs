//! End-to-end planning scenarios over in-memory and on-disk catalogs.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use precursor::planner::{select_setup_entry, SetupHints};
use precursor::{
    ConditionContext, DirectoryLoader, Implication, MemoryLoader, MemoryRegistry, PlanOptions,
    Planner, PredicateRegistry, PrecursorError, Snapshot,
};
use serde_json::{json, Map};
use std::fs;
use tempfile::TempDir;

fn catalog(descriptors: &[(&str, &str)]) -> (MemoryRegistry, MemoryLoader) {
    let loader = MemoryLoader::new();
    for (id, yaml) in descriptors {
        loader.insert(Implication::from_yaml(*id, yaml).expect("descriptor parses"));
    }
    (loader.registry(), loader)
}

fn statuses(analysis: &precursor::Analysis) -> Vec<&str> {
    analysis.chain.iter().map(|s| s.status.as_str()).collect()
}

// ============================================================================
// Linear chains
// ============================================================================

const BOOKING: &[(&str, &str)] = &[
    (
        "BookingRequestedImplications",
        r"
targetStatus: booking_requested
setup:
  - testFile: tests/dancer/request-booking.spec.js
    actionName: requestBooking
    platform: dancer
",
    ),
    (
        "BookingConfirmedImplications",
        r"
targetStatus: booking_confirmed
setup:
  - testFile: tests/club/confirm-booking.spec.js
    actionName: confirmBooking
    previousStatus: booking_requested
    platform: clubApp
",
    ),
];

#[test]
fn test_booking_chain_from_initial() {
    let (registry, loader) = catalog(BOOKING);
    let planner = Planner::new(&registry, &loader).with_discovery(&registry);
    let snapshot = Snapshot::new(json!({"status": "initial"}));

    let analysis = planner
        .analyze_status("booking_confirmed", &snapshot, &PlanOptions::new())
        .unwrap();

    assert_eq!(statuses(&analysis), vec!["booking_requested", "booking_confirmed"]);
    assert!(!analysis.chain[0].complete);
    assert!(!analysis.chain[1].complete);
    assert!(analysis.chain[1].is_target);
    assert!(!analysis.ready);
    assert_eq!(analysis.next_step.as_ref().unwrap().status, "booking_requested");
    assert_eq!(analysis.steps_remaining, 2);
    assert_eq!(analysis.segments.len(), 2);
}

#[test]
fn test_booking_ready_after_prerequisite() {
    let (registry, loader) = catalog(BOOKING);
    let planner = Planner::new(&registry, &loader);
    let snapshot = Snapshot::new(json!({"status": "booking_requested"}));

    let analysis = planner
        .analyze_status("booking_confirmed", &snapshot, &PlanOptions::new())
        .unwrap();

    assert!(analysis.ready);
    assert!(analysis.chain[0].complete);
    assert!(analysis.chain[0].is_current);
    assert!(analysis.next_step.is_none());
}

#[test]
fn test_ready_at_target_without_previous_status() {
    let (registry, loader) = catalog(BOOKING);
    let planner = Planner::new(&registry, &loader);
    let snapshot = Snapshot::new(json!({"status": "booking_requested"}));

    let analysis = planner
        .analyze_status("booking_requested", &snapshot, &PlanOptions::new())
        .unwrap();

    assert!(analysis.ready);
    assert_eq!(analysis.chain.len(), 1);
    assert!(analysis.chain[0].is_current);
    assert!(analysis.chain[0].is_target);
}

#[test]
fn test_check_raises_not_ready() {
    let (registry, loader) = catalog(BOOKING);
    let planner = Planner::new(&registry, &loader);
    let implication = planner.implication_for("booking_confirmed").unwrap();

    let err = planner
        .check(&implication, &Snapshot::default(), &PlanOptions::new())
        .unwrap_err();
    match err {
        PrecursorError::NotReady {
            target,
            current,
            remaining,
        } => {
            assert_eq!(target, "booking_confirmed");
            assert_eq!(current, "initial");
            assert_eq!(remaining, 2);
        }
        other => panic!("expected NotReady, got {other:?}"),
    }
}

// ============================================================================
// Loop transitions
// ============================================================================

const AGENCY: &[(&str, &str)] = &[
    (
        "AgencyPrefferedImplications",
        r"
targetStatus: agency_preffered
setup:
  - testFile: tests/agency/prefer-agency.spec.js
    previousStatus: agency_modal_opened
on:
  OPEN_MODAL: agency_modal_opened
",
    ),
    (
        "AgencyModalOpenedImplications",
        r"
targetStatus: agency_modal_opened
setup:
  - testFile: tests/agency/open-modal.spec.js
    previousStatus: agency_preffered
on:
  PREFER: agency_preffered
",
    ),
];

#[test]
fn test_loop_transition_detours_through_previous() {
    let (registry, loader) = catalog(AGENCY);
    let planner = Planner::new(&registry, &loader).with_discovery(&registry);
    let snapshot = Snapshot::new(json!({"status": "agency_modal_opened"}));

    let analysis = planner
        .analyze_status("agency_modal_opened", &snapshot, &PlanOptions::new())
        .unwrap();

    assert!(analysis.is_loop_transition);
    assert!(!analysis.ready);
    let path = statuses(&analysis);
    let through = path.iter().position(|s| *s == "agency_preffered").unwrap();
    let back = path.iter().rposition(|s| *s == "agency_modal_opened").unwrap();
    assert!(through < back);
    assert!(analysis.chain[back].is_target);
    assert_eq!(analysis.next_step.unwrap().status, "agency_preffered");
}

#[test]
fn test_loop_target_ready_from_previous() {
    let (registry, loader) = catalog(AGENCY);
    let planner = Planner::new(&registry, &loader).with_discovery(&registry);
    let snapshot = Snapshot::new(json!({"status": "agency_preffered"}));

    let analysis = planner
        .analyze_status("agency_modal_opened", &snapshot, &PlanOptions::new())
        .unwrap();

    assert!(!analysis.is_loop_transition);
    assert!(analysis.ready);
}

// ============================================================================
// Guarded transitions
// ============================================================================

const PLANS: &[(&str, &str)] = &[
    (
        "Basic",
        r"
targetStatus: basic
setup:
  - testFile: basic.spec.js
on:
  UPGRADE_PRO:
    target: upgraded
    requires: { plan: pro }
  UPGRADE:
    target: upgraded
    isDefault: true
",
    ),
    (
        "Upgraded",
        r"
targetStatus: upgraded
setup:
  - testFile: upgrade.spec.js
    previousStatus: basic
",
    ),
];

#[test]
fn test_guarded_transition_selected_when_met() {
    let (registry, loader) = catalog(PLANS);
    let planner = Planner::new(&registry, &loader);

    let pro = Snapshot::new(json!({"status": "basic", "plan": "pro"}));
    let analysis = planner
        .analyze_status("upgraded", &pro, &PlanOptions::new())
        .unwrap();
    assert_eq!(analysis.chain.last().unwrap().event.as_deref(), Some("UPGRADE_PRO"));
    assert!(analysis.ready);

    let free = Snapshot::new(json!({"status": "basic", "plan": "free"}));
    let analysis = planner
        .analyze_status("upgraded", &free, &PlanOptions::new())
        .unwrap();
    assert_eq!(analysis.chain.last().unwrap().event.as_deref(), Some("UPGRADE"));
    assert!(analysis.ready);
}

const CART: &[(&str, &str)] = &[
    (
        "Cart",
        r"
targetStatus: cart
setup:
  - testFile: cart.spec.js
on:
  CHECKOUT:
    target: checkout
    requires: { items_count: { greaterThan: 0 } }
",
    ),
    (
        "Checkout",
        r"
targetStatus: checkout
setup:
  - testFile: checkout.spec.js
    previousStatus: cart
",
    ),
];

#[test]
fn test_blocked_transition_reports_fields() {
    let (registry, loader) = catalog(CART);
    let planner = Planner::new(&registry, &loader);
    let snapshot = Snapshot::new(json!({"status": "cart", "items_count": 0}));

    let analysis = planner
        .analyze_status("checkout", &snapshot, &PlanOptions::new())
        .unwrap();

    assert!(!analysis.ready);
    let blocked = analysis.blocked_step().expect("checkout is blocked");
    assert_eq!(blocked.status, "checkout");
    assert!(blocked.is_target);
    assert!(blocked.blocked_reason.as_deref().unwrap().contains("items_count"));
    assert_eq!(blocked.blocking_fields[0].field, "items_count");

    let implication = planner.implication_for("checkout").unwrap();
    match planner.check(&implication, &snapshot, &PlanOptions::new()) {
        Err(PrecursorError::Blocked { status, reason }) => {
            assert_eq!(status, "checkout");
            assert!(reason.contains("items_count"));
        }
        other => panic!("expected Blocked, got {other:?}"),
    }
}

#[test]
fn test_blocked_transition_reroutes_through_search() {
    let mut descriptors = CART.to_vec();
    descriptors[0] = (
        "Cart",
        r"
targetStatus: cart
setup:
  - testFile: cart.spec.js
on:
  CHECKOUT:
    target: checkout
    requires: { items_count: { greaterThan: 0 } }
  FILL: cart_filled
",
    );
    descriptors.push((
        "CartFilled",
        r"
targetStatus: cart_filled
setup:
  - testFile: fill-cart.spec.js
    previousStatus: cart
on:
  CHECKOUT: checkout
",
    ));
    let (registry, loader) = catalog(&descriptors);
    let planner = Planner::new(&registry, &loader);
    let snapshot = Snapshot::new(json!({"status": "cart", "items_count": 0}));

    let analysis = planner
        .analyze_status("checkout", &snapshot, &PlanOptions::new())
        .unwrap();

    assert!(!analysis.is_blocked());
    assert_eq!(statuses(&analysis), vec!["cart_filled", "checkout"]);
    assert!(analysis.chain[0].is_detour);
    assert_eq!(analysis.chain[0].event.as_deref(), Some("FILL"));
    assert_eq!(analysis.chain[1].event.as_deref(), Some("CHECKOUT"));
    assert_eq!(analysis.next_step.unwrap().status, "cart_filled");
}

const HOME: (&str, &str) = (
    "Home",
    r"
targetStatus: home
setup:
  - testFile: home.spec.js
",
);

const GUARDED_CART: (&str, &str) = (
    "Cart",
    r"
targetStatus: cart
setup:
  - testFile: cart.spec.js
    previousStatus: home
on:
  CHECKOUT:
    target: checkout
    requires: { items_count: { greaterThan: 0 } }
",
);

#[test]
fn test_blocked_transition_switches_setup_entry() {
    let descriptors = [
        (
            "Home",
            r"
targetStatus: home
setup:
  - testFile: home.spec.js
on:
  OPEN_CART: cart
  OPEN_EXPRESS: express
",
        ),
        GUARDED_CART,
        (
            "Express",
            r"
targetStatus: express
setup:
  - testFile: express.spec.js
    previousStatus: home
on:
  BUY_NOW: checkout
",
        ),
        (
            "Checkout",
            r"
targetStatus: checkout
setup:
  - testFile: checkout.spec.js
    previousStatus: cart
  - testFile: express-checkout.spec.js
    previousStatus: express
",
        ),
    ];
    let (registry, loader) = catalog(&descriptors);
    let planner = Planner::new(&registry, &loader);
    let snapshot = Snapshot::new(json!({"status": "home", "items_count": 0}));

    let analysis = planner
        .analyze_status("checkout", &snapshot, &PlanOptions::new())
        .unwrap();

    assert!(!analysis.is_blocked());
    assert_eq!(statuses(&analysis), vec!["home", "express", "checkout"]);
    assert!(analysis.chain[0].complete);
    assert_eq!(analysis.chain[1].event.as_deref(), Some("OPEN_EXPRESS"));
    let target = &analysis.chain[2];
    assert!(target.is_target);
    assert!(!target.is_detour);
    assert_eq!(target.test_file.as_deref(), Some("express-checkout.spec.js"));
    assert_eq!(target.previous_status.as_deref(), Some("express"));
    assert_eq!(target.event.as_deref(), Some("BUY_NOW"));
    assert_eq!(analysis.next_step.unwrap().status, "express");
}

#[test]
fn test_detour_searched_from_previous_status() {
    // `home` has no transitions, so only the previous status can detour.
    let descriptors = [
        HOME,
        (
            "Cart",
            r"
targetStatus: cart
setup:
  - testFile: cart.spec.js
    previousStatus: home
on:
  CHECKOUT:
    target: checkout
    requires: { items_count: { greaterThan: 0 } }
  FILL: cart_filled
",
        ),
        (
            "CartFilled",
            r"
targetStatus: cart_filled
setup:
  - testFile: fill-cart.spec.js
    previousStatus: cart
on:
  CHECKOUT: checkout
",
        ),
        (
            "Checkout",
            r"
targetStatus: checkout
setup:
  - testFile: checkout.spec.js
    previousStatus: cart
",
        ),
    ];
    let (registry, loader) = catalog(&descriptors);
    let planner = Planner::new(&registry, &loader);
    let snapshot = Snapshot::new(json!({"status": "home", "items_count": 0}));

    let analysis = planner
        .analyze_status("checkout", &snapshot, &PlanOptions::new())
        .unwrap();

    assert!(!analysis.is_blocked());
    assert_eq!(statuses(&analysis), vec!["home", "cart", "cart_filled", "checkout"]);
    assert!(analysis.chain[0].complete);
    assert!(!analysis.chain[1].is_detour);
    assert!(analysis.chain[2].is_detour);
    assert_eq!(analysis.chain[2].event.as_deref(), Some("FILL"));
    assert_eq!(analysis.chain[3].event.as_deref(), Some("CHECKOUT"));
    assert!(analysis.chain[3].is_target);
    assert_eq!(analysis.next_step.unwrap().status, "cart");
}

#[test]
fn test_no_detour_from_previous_status_is_terminal() {
    let descriptors = [
        HOME,
        GUARDED_CART,
        (
            "Checkout",
            r"
targetStatus: checkout
setup:
  - testFile: checkout.spec.js
    previousStatus: cart
",
        ),
    ];
    let (registry, loader) = catalog(&descriptors);
    let planner = Planner::new(&registry, &loader);
    let snapshot = Snapshot::new(json!({"status": "home", "items_count": 0}));

    let analysis = planner
        .analyze_status("checkout", &snapshot, &PlanOptions::new())
        .unwrap();

    assert!(analysis.is_blocked());
    assert!(!analysis.ready);
    assert_eq!(statuses(&analysis), vec!["checkout"]);
    let blocked = analysis.blocked_step().expect("checkout is blocked");
    assert!(blocked.is_target);
    assert!(blocked.blocked_reason.as_deref().unwrap().contains("'cart'"));
    assert_eq!(blocked.blocking_fields[0].field, "items_count");
}

#[test]
fn test_stored_var_satisfies_transition_guard() {
    let descriptors = [
        (
            "Cart",
            r#"
targetStatus: cart
setup:
  - testFile: cart.spec.js
on:
  CHECKOUT:
    target: checkout
    requires: { "{{basket}}.items_count": { greaterThan: 0 } }
"#,
        ),
        (
            "Checkout",
            r"
targetStatus: checkout
setup:
  - testFile: checkout.spec.js
    previousStatus: cart
",
        ),
    ];
    let (registry, loader) = catalog(&descriptors);
    let planner = Planner::new(&registry, &loader);
    let snapshot = Snapshot::new(json!({"status": "cart"}));

    let without = planner
        .analyze_status("checkout", &snapshot, &PlanOptions::new())
        .unwrap();
    assert!(without.is_blocked());

    let options = PlanOptions::new().with_stored_var("basket", json!({"items_count": 2}));
    let analysis = planner.analyze_status("checkout", &snapshot, &options).unwrap();
    assert!(!analysis.is_blocked());
    assert!(analysis.ready);
    assert_eq!(statuses(&analysis), vec!["cart", "checkout"]);
    assert_eq!(analysis.chain[1].event.as_deref(), Some("CHECKOUT"));
}

#[test]
fn test_loop_without_route_back_reenters_current() {
    // `agency_modal_opened` declares no transitions, so there is no route
    // back to `agency_preffered` and the chain re-enters the current status.
    let descriptors = [
        (
            "AgencyPreffered",
            r"
targetStatus: agency_preffered
setup:
  - testFile: prefer-agency.spec.js
    previousStatus: agency_modal_opened
on:
  OPEN_MODAL: agency_modal_opened
",
        ),
        (
            "AgencyModalOpened",
            r"
targetStatus: agency_modal_opened
setup:
  - testFile: open-agency-modal.spec.js
    previousStatus: agency_preffered
",
        ),
    ];
    let (registry, loader) = catalog(&descriptors);
    let planner = Planner::new(&registry, &loader);
    let snapshot = Snapshot::new(json!({"status": "agency_modal_opened"}));

    let analysis = planner
        .analyze_status("agency_modal_opened", &snapshot, &PlanOptions::new())
        .unwrap();

    assert!(analysis.is_loop_transition);
    assert_eq!(
        statuses(&analysis),
        vec!["agency_modal_opened", "agency_preffered", "agency_modal_opened"]
    );
    assert!(analysis.chain[0].is_loop_prerequisite);
    assert!(analysis.chain[0].complete);
    assert!(!analysis.chain[1].is_detour);
    assert!(!analysis.chain[1].complete);
    assert!(analysis.chain[2].is_target);
    assert_eq!(analysis.chain[2].event.as_deref(), Some("OPEN_MODAL"));
    assert!(!analysis.ready);
    assert_eq!(analysis.next_step.unwrap().status, "agency_preffered");
}

// ============================================================================
// Cycles, registry misses, entities
// ============================================================================

#[test]
fn test_mutual_cycle_terminates() {
    let (registry, loader) = catalog(&[
        ("A", "targetStatus: a\nsetup:\n  - testFile: a.spec.js\n    previousStatus: b\n"),
        ("B", "targetStatus: b\nsetup:\n  - testFile: b.spec.js\n    previousStatus: a\n"),
    ]);
    let planner = Planner::new(&registry, &loader);

    let analysis = planner
        .analyze_status("a", &Snapshot::default(), &PlanOptions::new())
        .unwrap();

    assert!(!analysis.ready);
    assert_eq!(statuses(&analysis), vec!["b", "a"]);
    assert!(analysis.chain[1].is_target);
}

#[test]
fn test_unregistered_previous_status_is_a_placeholder() {
    let (registry, loader) = catalog(&[(
        "Orphan",
        "targetStatus: orphan\nsetup:\n  - testFile: orphan.spec.js\n    previousStatus: ghost\n",
    )]);
    let planner = Planner::new(&registry, &loader);

    let analysis = planner
        .analyze_status("orphan", &Snapshot::default(), &PlanOptions::new())
        .unwrap();

    assert!(!analysis.ready);
    assert!(analysis.chain[0].is_placeholder());
    assert_eq!(analysis.chain[0].action_name, precursor::NOT_IN_REGISTRY);
}

#[test]
fn test_entity_requirement_expands_sub_chain() {
    let mut descriptors = BOOKING.to_vec();
    descriptors.push((
        "ReviewLeft",
        r#"
targetStatus: review_left
setup:
  - testFile: tests/dancer/leave-review.spec.js
requires:
  "booking.confirmed": true
"#,
    ));
    let (registry, loader) = catalog(&descriptors);
    let planner = Planner::new(&registry, &loader);
    let snapshot = Snapshot::new(json!({
        "status": "initial",
        "booking": {"status": "booking_requested", "confirmed": false}
    }));

    let analysis = planner
        .analyze_status("review_left", &snapshot, &PlanOptions::new())
        .unwrap();

    assert_eq!(
        statuses(&analysis),
        vec!["booking_requested", "booking_confirmed", "review_left"]
    );
    assert_eq!(analysis.chain[1].entity.as_deref(), Some("booking"));
    assert!(analysis.chain[0].complete);
    assert!(!analysis.chain[1].complete);
    assert_eq!(analysis.next_step.unwrap().status, "booking_confirmed");
    assert_eq!(analysis.missing_fields.len(), 1);
    assert!(!analysis.ready);
}

#[test]
fn test_setup_entry_priority() {
    let implication = Implication::from_yaml(
        "Profile",
        r"
targetStatus: profile_done
setup:
  - testFile: with-a.spec.js
    requires: { a: true }
  - testFile: plain.spec.js
",
    )
    .unwrap();
    let stored = Map::new();
    let predicates = PredicateRegistry::new();

    for (data, expected) in [(json!({"a": true}), "with-a.spec.js"), (json!({"a": false}), "plain.spec.js")] {
        let snapshot = Snapshot::new(data);
        let ctx = ConditionContext {
            snapshot: &snapshot,
            stored: &stored,
            predicates: &predicates,
        };
        let entry = select_setup_entry(&implication, &SetupHints::default(), &ctx).unwrap();
        assert_eq!(entry.test_file, expected);
    }
}

// ============================================================================
// Directory-backed catalogs
// ============================================================================

#[test]
fn test_directory_catalog_sees_descriptor_edits() {
    let dir = TempDir::new().unwrap();
    for (id, yaml) in BOOKING {
        fs::write(dir.path().join(format!("{id}.yaml")), yaml).unwrap();
    }
    let loader = DirectoryLoader::new(dir.path());
    let registry = loader.scan().unwrap();
    let planner = Planner::new(&registry, &loader);
    let snapshot = Snapshot::new(json!({"status": "initial"}));

    let before = planner
        .analyze_status("booking_confirmed", &snapshot, &PlanOptions::new())
        .unwrap();
    assert_eq!(before.chain.len(), 2);

    fs::write(
        dir.path().join("BookingConfirmedImplications.yaml"),
        "targetStatus: booking_confirmed\nsetup:\n  - testFile: confirm.spec.js\n",
    )
    .unwrap();
    let after = planner
        .analyze_status("booking_confirmed", &snapshot, &PlanOptions::new())
        .unwrap();
    assert_eq!(after.chain.len(), 1);
    assert_eq!(after.chain[0].test_file.as_deref(), Some("confirm.spec.js"));
}
