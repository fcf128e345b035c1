use super::*;
use crate::clock::{Clock, ManualClock};
use crate::codec::EntityCodec;
use crate::config::{SessionConfig, StoreConfig};
use crate::region::RegionStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
struct ShoppingCart {
    orders: Vec<i64>,
}

fn fixture() -> (SessionStore, ManualClock, Arc<RegionStore>) {
    let clock = ManualClock::default();
    let store = Arc::new(RegionStore::in_memory());
    let config = SessionConfig {
        max_inactive_secs: 30 * 60,
        ..SessionConfig::default()
    };
    let sessions = SessionStore::new(
        Arc::clone(&store),
        &config,
        EntityCodec::default(),
        Arc::new(clock.clone()),
    )
    .unwrap();
    (sessions, clock, store)
}

#[test]
fn sliding_expiry_after_touch() {
    let (sessions, clock, _) = fixture();
    let session = sessions.create().unwrap();

    clock.advance(chrono::Duration::minutes(10));
    assert!(sessions.touch(session.id()).unwrap().is_some());

    clock.advance(chrono::Duration::minutes(29));
    assert!(sessions.get(session.id()).unwrap().is_some());

    clock.advance(chrono::Duration::minutes(2));
    assert!(sessions.get(session.id()).unwrap().is_none());
    assert!(sessions.touch(session.id()).unwrap().is_none());
}

#[test]
fn expired_session_is_removed_on_access() {
    let (sessions, clock, store) = fixture();
    let session = sessions.create().unwrap();

    clock.advance(chrono::Duration::minutes(31));
    assert!(sessions.get(session.id()).unwrap().is_none());
    assert_eq!(store.len(sessions.region()), 0);
}

#[test]
fn sweep_evicts_only_expired_sessions() {
    let (sessions, clock, _) = fixture();
    let stale = sessions.create().unwrap();
    clock.advance(chrono::Duration::minutes(20));
    let fresh = sessions.create().unwrap();
    clock.advance(chrono::Duration::minutes(15));

    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions.purge_expired(), 1);
    assert!(sessions.get(stale.id()).unwrap().is_none());
    assert!(sessions.get(fresh.id()).unwrap().is_some());
    assert_eq!(sessions.purge_expired(), 0);
}

#[test]
fn per_session_interval_overrides_default() {
    let (sessions, clock, _) = fixture();
    let mut session = sessions.create().unwrap();
    session.set_max_inactive(std::time::Duration::from_secs(60));
    sessions.save(&session).unwrap();

    clock.advance(chrono::Duration::minutes(2));
    assert!(sessions.get(session.id()).unwrap().is_none());
}

#[test]
fn cart_attribute_survives_a_round_trip() {
    let (sessions, _, _) = fixture();
    let mut session = sessions.create().unwrap();
    assert_eq!(sessions.attribute::<ShoppingCart>(&session, "cart").unwrap(), None);

    let mut cart = ShoppingCart::default();
    cart.orders.push(1);
    cart.orders.push(2);
    sessions.set_attribute(&mut session, "cart", &cart).unwrap();
    sessions.save(&session).unwrap();

    let loaded = sessions.get(session.id()).unwrap().unwrap();
    assert_eq!(loaded.attribute_names().collect::<Vec<_>>(), vec!["cart"]);
    assert_eq!(
        sessions.attribute::<ShoppingCart>(&loaded, "cart").unwrap(),
        Some(cart)
    );
}

#[test]
fn invalidate_removes_the_session() {
    let (sessions, _, _) = fixture();
    let session = sessions.create().unwrap();
    assert!(sessions.invalidate(session.id()).unwrap());
    assert!(!sessions.invalidate(session.id()).unwrap());
    assert!(sessions.is_empty());
}

#[test]
fn sessions_region_exists_without_schema_on_write() {
    let mut config = StoreConfig::in_memory();
    config.auto_create_regions = false;
    let store = Arc::new(RegionStore::open(&config).unwrap());
    let sessions = SessionStore::new(
        Arc::clone(&store),
        &SessionConfig::default(),
        EntityCodec::default(),
        Arc::new(ManualClock::default()),
    )
    .unwrap();

    sessions.create().unwrap();
    assert_eq!(store.region_names(), vec!["Sessions".to_string()]);
}

#[test]
fn touch_after_invalidate_does_not_resurrect() {
    let (sessions, _, store) = fixture();
    let session = sessions.create().unwrap();

    assert!(sessions.invalidate(session.id()).unwrap());
    assert!(sessions.touch(session.id()).unwrap().is_none());
    assert_eq!(store.len(sessions.region()), 0);
}

#[test]
fn touch_keeps_attributes_saved_by_another_copy() {
    let (sessions, clock, _) = fixture();
    let session = sessions.create().unwrap();

    let mut other = sessions.get(session.id()).unwrap().unwrap();
    let cart = ShoppingCart { orders: vec![7] };
    sessions.set_attribute(&mut other, "cart", &cart).unwrap();
    sessions.save(&other).unwrap();

    clock.advance(chrono::Duration::minutes(5));
    let touched = sessions.touch(session.id()).unwrap().unwrap();
    assert_eq!(touched.last_accessed(), clock.now());
    assert_eq!(
        sessions.attribute::<ShoppingCart>(&touched, "cart").unwrap(),
        Some(cart)
    );
}

#[test]
fn touch_racing_invalidate_never_resurrects() {
    let (sessions, _, store) = fixture();

    for _ in 0..50 {
        let session = sessions.create().unwrap();
        std::thread::scope(|scope| {
            scope.spawn(|| {
                for _ in 0..20 {
                    sessions.touch(session.id()).unwrap();
                }
            });
            scope.spawn(|| sessions.invalidate(session.id()).unwrap());
        });
        assert!(sessions.get(session.id()).unwrap().is_none());
    }
    assert_eq!(store.len(sessions.region()), 0);
}

#[test]
fn sub_second_interval_survives_a_reload() {
    let (sessions, clock, _) = fixture();
    let mut session = sessions.create().unwrap();
    session.set_max_inactive(std::time::Duration::from_millis(500));
    sessions.save(&session).unwrap();

    let loaded = sessions.get(session.id()).unwrap().unwrap();
    assert_eq!(loaded.max_inactive(), std::time::Duration::from_millis(500));

    clock.advance(chrono::Duration::milliseconds(400));
    assert!(sessions.get(session.id()).unwrap().is_some());
    clock.advance(chrono::Duration::milliseconds(200));
    assert!(sessions.get(session.id()).unwrap().is_none());
}
