//! Spatial grid sync driven by component writes, and hook firing through the
//! full `World` surface rather than `HookRegistry` in isolation
//! (`spec.md` §4.14, §4.11).

use std::sync::{Arc, Mutex};

use archetype_ecs::{ComponentBuilder, PrimitiveType, Value, World};

#[test]
fn spatial_sync_tracks_position_writes_and_supports_radius_queries() {
    let mut world = World::new().unwrap();
    let position = world
        .register_component(
            "Position",
            ComponentBuilder::new().field("x", PrimitiveType::F32).field("y", PrimitiveType::F32),
        )
        .unwrap();

    let e1 = world.spawn(&[position]).unwrap();
    let e2 = world.spawn(&[position]).unwrap();
    let e3 = world.spawn(&[position]).unwrap();

    for (e, x, y) in [(e1, 100.0, 100.0), (e2, 120.0, 120.0), (e3, 500.0, 500.0)] {
        world
            .set(e, position, [("x".to_string(), Value::F32(x)), ("y".to_string(), Value::F32(y))].into_iter().collect())
            .unwrap();
        world.sync_spatial_entity(e, position, 0, 1);
    }

    let wide = world.spatial().query_radius(100.0, 100.0, 50.0);
    assert_eq!(wide.len(), 2);
    assert!(wide.contains(&e1));
    assert!(wide.contains(&e2));

    let narrow = world.spatial().query_radius(100.0, 100.0, 30.0);
    assert_eq!(narrow, vec![e1]);
}

#[test]
fn world_on_add_and_on_set_fire_with_field_snapshots() {
    let mut world = World::new().unwrap();
    let health = world
        .register_component("Health", ComponentBuilder::new().field("hp", PrimitiveType::I32))
        .unwrap();

    let added = Arc::new(Mutex::new(Vec::new()));
    let added_clone = added.clone();
    world
        .on_add(health, false, move |e, snapshot| {
            added_clone.lock().unwrap().push((e, snapshot.get("hp").copied()));
        })
        .unwrap();

    let changed = Arc::new(Mutex::new(Vec::new()));
    let changed_clone = changed.clone();
    world
        .on_set(health, false, move |e, prev, next| {
            changed_clone.lock().unwrap().push((
                e,
                prev.get("hp").copied(),
                next.get("hp").copied(),
            ));
        })
        .unwrap();

    let e = world.spawn(&[health]).unwrap();
    assert_eq!(added.lock().unwrap().len(), 1);

    world.set(e, health, [("hp".to_string(), Value::I32(10))].into_iter().collect()).unwrap();
    let sets = changed.lock().unwrap();
    assert_eq!(sets.len(), 1);
    assert_eq!(sets[0].2, Some(Value::I32(10)));
}

#[test]
fn with_hooks_disabled_suppresses_on_add_for_the_scoped_call() {
    let mut world = World::new().unwrap();
    let tag = world.register_tag("Marker").unwrap();

    let fired = Arc::new(Mutex::new(false));
    let fired_clone = fired.clone();
    world.on_add(tag, false, move |_, _| *fired_clone.lock().unwrap() = true).unwrap();

    world.with_hooks_disabled(|w| {
        w.spawn(&[tag]).unwrap();
    });
    assert!(!*fired.lock().unwrap());

    world.spawn(&[tag]).unwrap();
    assert!(*fired.lock().unwrap());
}
