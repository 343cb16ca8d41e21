//! Snapshot save/restore and migration chain resolution (`spec.md` §6).

use archetype_ecs::component::PrimitiveType;
use archetype_ecs::serialization::{self, migrations, DeserializerOptions, MigrationRegistry};
use archetype_ecs::{ComponentBuilder, World};

#[test]
fn save_and_restore_preserves_component_data_across_fresh_worlds() {
    let mut world = World::new().unwrap();
    let health = world
        .register_component("Health", ComponentBuilder::new().field("hp", PrimitiveType::I32))
        .unwrap();
    let tag = world.register_tag("Marker").unwrap();

    let e1 = world.spawn(&[health]).unwrap();
    world.set(e1, health, [("hp".to_string(), archetype_ecs::Value::I32(55))].into_iter().collect()).unwrap();
    world.spawn(&[tag]).unwrap();

    let doc = serialization::save(&world).unwrap();
    assert_eq!(doc.entities.len(), 2);

    let mut restored = World::new().unwrap();
    restored
        .register_component("Health", ComponentBuilder::new().field("hp", PrimitiveType::I32))
        .unwrap();
    restored.register_tag("Marker").unwrap();

    let registry = MigrationRegistry::new();
    let options = DeserializerOptions::default();
    let injection = serialization::restore(&mut restored, &doc, &registry, &options).unwrap();

    assert_eq!(injection.len(), 2);
    let new_e1 = injection[&e1.to_bits()];
    let health_idx = restored.component_index("Health").unwrap();
    assert_eq!(restored.field_value(new_e1, health_idx, "hp").unwrap().as_f64(), Some(55.0));
}

#[test]
fn restoring_unknown_component_fails_without_skip_option() {
    let mut world = World::new().unwrap();
    let health = world
        .register_component("Health", ComponentBuilder::new().field("hp", PrimitiveType::I32))
        .unwrap();
    world.spawn(&[health]).unwrap();
    let doc = serialization::save(&world).unwrap();

    let mut restored = World::new().unwrap();
    let registry = MigrationRegistry::new();
    let options = DeserializerOptions::default();
    assert!(serialization::restore(&mut restored, &doc, &registry, &options).is_err());

    let skip_options = DeserializerOptions {
        skip_unknown_components: true,
        ..Default::default()
    };
    assert!(serialization::restore(&mut restored, &doc, &registry, &skip_options).is_ok());
}

#[test]
fn migration_adds_default_field_before_restoring_into_newer_schema() {
    let mut old_world = World::new().unwrap();
    old_world
        .register_component("Health", ComponentBuilder::new().field("hp", PrimitiveType::I32))
        .unwrap();
    old_world.spawn(&[old_world.component_index("Health").unwrap()]).unwrap();

    let mut doc = serialization::save(&old_world).unwrap();
    doc.version = "1.0.0".to_string();

    let mut new_world = World::new().unwrap();
    new_world
        .register_component(
            "Health",
            ComponentBuilder::new().field("hp", PrimitiveType::I32).field("max_hp", PrimitiveType::I32),
        )
        .unwrap();

    let mut registry = MigrationRegistry::new();
    registry.register(migrations::add_field(
        "1.0.0",
        "1.1.0",
        "Health",
        "max_hp",
        serde_json::json!(100),
    ));

    let options = DeserializerOptions::default();
    let injection = serialization::restore(&mut new_world, &doc, &registry, &options).unwrap();
    let health_idx = new_world.component_index("Health").unwrap();
    let new_entity = *injection.values().next().unwrap();
    assert_eq!(new_world.field_value(new_entity, health_idx, "max_hp").unwrap().as_f64(), Some(100.0));
}

#[test]
fn restore_without_migration_path_fails_on_version_mismatch() {
    let mut world = World::new().unwrap();
    world
        .register_component("Health", ComponentBuilder::new().field("hp", PrimitiveType::I32))
        .unwrap();
    world.spawn(&[world.component_index("Health").unwrap()]).unwrap();

    let mut doc = serialization::save(&world).unwrap();
    doc.version = "0.1.0".to_string();

    let mut target = World::new().unwrap();
    target
        .register_component("Health", ComponentBuilder::new().field("hp", PrimitiveType::I32))
        .unwrap();

    let registry = MigrationRegistry::new();
    let options = DeserializerOptions::default();
    assert!(serialization::restore(&mut target, &doc, &registry, &options).is_err());
}
