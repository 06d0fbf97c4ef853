use proptest::prelude::*;
use strata_blocks::config::MaterialDef;
use strata_blocks::{Block, BlockUpdate, DynamicBehavior, MaterialId, MaterialRegistry, UpdateOutcome};

fn level() -> impl Strategy<Value = u8> {
    0u8..=15
}

fn noop(_: &BlockUpdate) -> UpdateOutcome {
    UpdateOutcome::NONE
}

proptest! {
    // Packing keeps id and data in their own halves.
    #[test]
    fn pack_unpack_halves(id in any::<u16>(), data in any::<u16>()) {
        let b = Block::new(id, data);
        let p = b.pack();
        prop_assert_eq!((p >> 16) as u16, id);
        prop_assert_eq!(p as u16, data);
        prop_assert_eq!(Block::unpack(p), b);
    }

    // Lookup tables agree with the material entries they were built from.
    #[test]
    fn tables_follow_definitions(light in level(), opacity in level(), solid in any::<bool>()) {
        let mut reg = MaterialRegistry::new();
        let mut def = MaterialDef::named("m").light(light).opacity(opacity);
        def.solid = solid;
        let id = reg.register(def).unwrap();
        prop_assert_eq!(reg.light_level(id.0), light);
        prop_assert_eq!(reg.opacity(id.0), opacity);
        prop_assert_eq!(reg.occludes(id.0), solid);
        prop_assert_eq!(reg.get(id).unwrap().light_level(), light);
    }
}

#[test]
fn air_is_id_zero_and_not_surface() {
    let reg = MaterialRegistry::with_defaults();
    assert_eq!(reg.id_by_name("air"), Some(MaterialId::AIR));
    assert!(!reg.is_surface(0));
    assert!(!reg.occludes(0));
    assert_eq!(reg.opacity(0), 0);
}

#[test]
fn solid_without_explicit_opacity_blocks_all_light() {
    let reg = MaterialRegistry::with_defaults();
    let stone = reg.id_by_name("stone").unwrap();
    assert_eq!(reg.opacity(stone.0), 15);
    assert!(reg.is_surface(stone.0));
    let glow = reg.id_by_name("glowstone").unwrap();
    assert_eq!(reg.light_level(glow.0), 15);
}

#[test]
fn unknown_ids_occlude() {
    let reg = MaterialRegistry::new();
    assert!(reg.occludes(999));
    assert_eq!(reg.light_level(999), 0);
}

#[test]
fn duplicate_names_and_ids_rejected() {
    let mut reg = MaterialRegistry::new();
    reg.register(MaterialDef::named("stone")).unwrap();
    assert!(reg.register(MaterialDef::named("stone")).is_err());
    let mut def = MaterialDef::named("other");
    def.id = Some(1);
    assert!(reg.register(def).is_err());
    assert!(reg.register(MaterialDef::named("hot").light(16)).is_err());
}

#[test]
fn toml_config_assigns_ids() {
    let src = r#"
        [[materials]]
        name = "stone"
        solid = true

        [[materials]]
        name = "lamp"
        id = 40
        light = 12
        solid = true
    "#;
    let reg = MaterialRegistry::from_toml_str(src).unwrap();
    assert_eq!(reg.id_by_name("stone"), Some(MaterialId(1)));
    assert_eq!(reg.id_by_name("lamp"), Some(MaterialId(40)));
    assert_eq!(reg.light_level(40), 12);
    assert_eq!(reg.len(), 3);
}

#[test]
fn dynamic_behavior_attaches_once() {
    let mut reg = MaterialRegistry::with_defaults();
    let water = reg.id_by_name("water").unwrap();
    let beh = DynamicBehavior { update: noop, range: 1, first_delay_ms: Some(50) };
    reg.attach_dynamic(water, beh).unwrap();
    reg.attach_dynamic(water, DynamicBehavior { range: 2, ..beh }).unwrap();
    assert_eq!(reg.dynamic(water.0).map(|d| d.range), Some(2));
    assert_eq!(reg.physics_range(water.0, 0), 2);
    assert!(reg.attach_dynamic(MaterialId(500), beh).is_err());
}
