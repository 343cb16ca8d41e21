//! Command buffer replay ordering combined with relation cascade-delete,
//! exercised against a live `World` (`spec.md` §4.8, §4.5, §3 relation store).

use archetype_ecs::{CascadePolicy, CommandBuffer, ComponentBuilder, PrimitiveType, World};

#[test]
fn command_buffer_spawn_then_add_resolves_placeholder_at_flush() {
    let mut world = World::new().unwrap();
    world.register_tag("Marker").unwrap();
    let health = world
        .register_component("Health", ComponentBuilder::new().field("hp", PrimitiveType::I32))
        .unwrap();

    let mut buffer = CommandBuffer::new();
    let placeholder = buffer.spawn(["Marker".to_string()]);
    buffer.add(
        placeholder,
        "Health",
        [("hp".to_string(), archetype_ecs::Value::I32(42))].into_iter().collect(),
    );

    buffer.flush(&mut world).unwrap();

    assert_eq!(world.entity_count(), 1);
    let entities = world.allocator().iter_live().collect::<Vec<_>>();
    assert_eq!(entities.len(), 1);
    assert_eq!(world.field_value(entities[0], health, "hp").unwrap().as_f64(), Some(42.0));
}

#[test]
fn command_buffer_flush_orders_despawns_by_sort_key_then_sequence() {
    let mut world = World::new().unwrap();
    let tag = world.register_tag("Marker").unwrap();
    let e1 = world.spawn(&[tag]).unwrap();
    let e2 = world.spawn(&[tag]).unwrap();
    let e3 = world.spawn(&[tag]).unwrap();

    let mut buffer = CommandBuffer::new();
    buffer.set_sort_key(10);
    buffer.despawn(e1);
    buffer.set_sort_key(5);
    buffer.despawn(e2);
    buffer.despawn(e3);

    buffer.flush(&mut world).unwrap();

    assert!(!world.is_alive(e1));
    assert!(!world.is_alive(e2));
    assert!(!world.is_alive(e3));
    assert_eq!(world.entity_count(), 0);
}

#[test]
fn command_against_despawned_entity_is_silent_noop() {
    let mut world = World::new().unwrap();
    let health = world
        .register_component("Health", ComponentBuilder::new().field("hp", PrimitiveType::I32))
        .unwrap();
    let e = world.spawn(&[health]).unwrap();
    world.despawn(e);

    let mut buffer = CommandBuffer::new();
    buffer.add(e, "Health", [("hp".to_string(), archetype_ecs::Value::I32(1))].into_iter().collect());
    assert!(buffer.flush(&mut world).is_ok());
}

#[test]
fn despawn_cascades_through_exclusive_relation_to_dependent_entities() {
    let mut world = World::new().unwrap();
    let tag = world.register_tag("Marker").unwrap();
    world
        .register_relation_type("owns", true, false, CascadePolicy::CascadeTarget)
        .unwrap();

    let owner = world.spawn(&[tag]).unwrap();
    let item = world.spawn(&[tag]).unwrap();
    world.relate(owner, "owns", item, Default::default()).unwrap();

    assert!(world.despawn(owner));
    assert!(!world.is_alive(item));
}

#[test]
fn despawn_nullifies_entity_ref_fields_pointing_at_target() {
    let mut world = World::new().unwrap();
    let holder_component = world
        .register_component("Holder", ComponentBuilder::new().field("target", PrimitiveType::Entity))
        .unwrap();

    let target = world.spawn(&[]).unwrap();
    let holder = world.spawn(&[holder_component]).unwrap();
    world.set_entity_ref(holder, holder_component, "target", target).unwrap();

    assert_eq!(world.get_entity_ref(holder, holder_component, "target"), Some(target));
    world.despawn(target);
    assert_eq!(world.get_entity_ref(holder, holder_component, "target"), None);
    assert!(world.get_entity_ref_raw(holder, holder_component, "target").unwrap().is_null());
}
