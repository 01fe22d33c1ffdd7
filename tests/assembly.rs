//! End-to-end builds against the built-in cuff catalog

use cuff_assembly::binder::{Arm, BranchChoice};
use cuff_assembly::{
    AssemblyConfig, AssemblyError, BindError, DesignFile, ExprError, IdentifierAllocator,
    InstanceRequest, Session, TemplateRegistry,
};
use pretty_assertions::assert_eq;

const DESIGNS: &str = r#"
[assembly]
fill_defaults = true

[[design]]
name = "Purdue"
params = { R_in = "150 [um]", Thk = "0.5 [mm]", R_out = "R_in + Thk", Theta = "340 [deg]", L_cuff = "2 [mm]" }

[[design.instance]]
label = "TubeCuff"
template = "TubeCuff_Primitive"
bind = { N_holes = 1, Theta = "Theta", R_in = "R_in", R_out = "R_out", L = "L_cuff" }

[[design.instance]]
label = "Contact"
template = "CircleContact_Primitive"
bind = { R_in = "R_in", Recess = "0.1 [mm]", L = "L_cuff" }

[[design]]
name = "Broken"
params = { R_in = "100 [um]" }

[[design.instance]]
label = "TubeCuff"
template = "TubeCuff_Primitive"
bind = { R_in = "R_in", R_out = "R_nerve + 1 [mm]" }

[[design]]
name = "CorTec"
params = { R_medium = "5 [mm]" }

[[design.instance]]
label = "Medium"
template = "Medium_Primitive"
bind = { radius = "R_medium" }
keep = { MEDIUM = false }
"#;

fn session() -> Session {
    let registry = TemplateRegistry::builtin().unwrap();
    Session::new(registry).with_config(AssemblyConfig::new().with_fill_defaults(true))
}

fn members(session: &Session, handle: &str) -> Vec<String> {
    session
        .resolve(handle)
        .unwrap()
        .iter()
        .map(|e| e.id.clone())
        .collect()
}

fn choice(feature: &str, arm: Arm) -> BranchChoice {
    BranchChoice {
        feature: feature.to_string(),
        arm,
    }
}

#[test]
fn test_partial_tube_cuff_from_defaults() {
    let mut session = session();
    let instance = session
        .instantiate(&InstanceRequest::new("TubeCuff_Primitive").bind("Theta", "340 [deg]"))
        .unwrap();
    assert_eq!(instance.branches(), [choice("pi1_if1", Arm::Branch(1))]);
    assert_eq!(instance.handle("CUFF_FINAL"), Some("pi1_csel3"));
    assert!(!instance.selection("HOLES").unwrap().materialized);

    let cuff_final = members(&session, "pi1_csel3");
    assert!(!cuff_final.is_empty());
    assert_eq!(cuff_final, ["pi1_cyl2"]);
}

#[test]
fn test_partial_tube_cuff_with_one_hole() {
    let mut session = session();
    let instance = session
        .instantiate(
            &InstanceRequest::new("TubeCuff_Primitive")
                .bind("N_holes", "1")
                .with_pseudonym("Cuff 0_TubeCuff"),
        )
        .unwrap();

    assert_eq!(instance.instance_id(), "pi1");
    assert_eq!(
        instance.branches(),
        [choice("pi1_if1", Arm::Branch(3)), choice("pi1_if2", Arm::Else)]
    );
    assert_eq!(instance.handle("CUFF_FINAL"), Some("pi1_csel3"));
    assert!(!instance.selection("CUFF_PRE_GAP").unwrap().materialized);
    assert_eq!(members(&session, "pi1_csel3"), ["pi1_cyl2"]);
    assert_eq!(members(&session, "pi1_csel12"), ["pi1_econ2"]);

    insta::assert_snapshot!(session.kernel().journal().join("\n"), @r###"
    pi1_cyl1
    pi1_cyl2
    pi1_dif6
    pi1_wp2
    pi1_rev2
    pi1_dif7
    pi1_econ2
    pi1_rot3
    pi1_dif8
    pi1_rot4
    "###);
}

#[test]
fn test_full_tube_cuff_without_holes() {
    let mut session = session();
    let instance = session
        .instantiate(
            &InstanceRequest::new("TubeCuff_Primitive")
                .bind("Theta", "360 [deg]")
                .bind("N_holes", "0"),
        )
        .unwrap();
    assert_eq!(instance.branches(), [choice("pi1_if1", Arm::Branch(0))]);
    assert!(!instance.selection("CUFF_GAP").unwrap().materialized);
    assert!(!instance.selection("HOLES").unwrap().materialized);
    assert_eq!(members(&session, "pi1_csel3"), ["pi1_cyl2"]);
}

#[test]
fn test_second_hole_joins_holes_selection() {
    let mut session = session();
    session
        .instantiate(&InstanceRequest::new("TubeCuff_Primitive").bind("N_holes", "2"))
        .unwrap();
    assert_eq!(members(&session, "pi1_csel12"), ["pi1_econ2", "pi1_econ3"]);
}

#[test]
fn test_theta_above_full_turn_matches_no_branch() {
    let mut session = session();
    let err = session
        .instantiate(&InstanceRequest::new("TubeCuff_Primitive").bind("Theta", "400 [deg]"))
        .unwrap_err();
    assert!(matches!(
        err,
        AssemblyError::Bind(BindError::NonExhaustiveConditional { ref feature, .. })
            if feature == "pi1_if1"
    ));

    // The failed instance keeps its identifier
    let next = session
        .instantiate(&InstanceRequest::new("Medium_Primitive"))
        .unwrap();
    assert_eq!(next.instance_id(), "pi2");
}

#[test]
fn test_circle_contact_overshoot_is_deleted() {
    let mut session = session();
    let instance = session
        .instantiate(&InstanceRequest::new("CircleContact_Primitive"))
        .unwrap();
    let recess_final = instance.handle("RECESS_FINAL").unwrap().to_string();
    let contact_final = instance.handle("CONTACT_FINAL").unwrap().to_string();
    let overshoot = instance.handle("RECESS_OVERSHOOT").unwrap().to_string();
    let prunable: Vec<String> = instance.prunable().iter().map(|e| e.id.clone()).collect();

    assert_eq!(members(&session, &recess_final), ["pi1_ext1/pi1_pard1:1"]);
    assert_eq!(members(&session, &contact_final), ["pi1_ext2/pi1_pard2:1"]);
    assert_eq!(
        members(&session, &overshoot),
        ["pi1_ext1/pi1_pard1:2", "pi1_ext2/pi1_pard2:2"]
    );
    assert!(prunable.contains(&"pi1_pt1".to_string()));
    assert!(!prunable.contains(&"pi1_ext2/pi1_pard2:1".to_string()));
    assert!(!prunable.iter().any(|id| id.ends_with(":2")));
}

#[test]
fn test_circle_contact_without_recess() {
    let mut session = session();
    let instance = session
        .instantiate(&InstanceRequest::new("CircleContact_Primitive").bind("Recess", "0"))
        .unwrap();
    assert!(!instance.selection("RECESS_FINAL").unwrap().materialized);
    assert_eq!(
        instance.branches(),
        [
            choice("pi1_if1", Arm::Else),
            choice("pi1_if3", Arm::Branch(0))
        ]
    );
}

#[test]
fn test_rectangle_contact_trims_excess() {
    let mut session = session();
    let instance = session
        .instantiate(&InstanceRequest::new("RectangleContact_Primitive"))
        .unwrap();
    assert_eq!(instance.branches(), [choice("pi1_if1", Arm::Else)]);
    assert!(!instance.selection("FINAL_RECESS").unwrap().materialized);
    assert_eq!(instance.sources(), ["pcs1"]);
    let contact_final = instance.handle("FINAL_CONTACT").unwrap().to_string();

    assert_eq!(
        members(&session, &contact_final),
        [
            "pi1_ext1/pi1_pard1:1/pi1_pard2:1",
            "pi1_ext1/pi1_pard1:1/pi1_pard2:2",
            "pi1_ext1/pi1_pard1:2/pi1_pard2:1",
        ]
    );
}

#[test]
fn test_rectangle_contact_with_recess() {
    let mut session = session();
    let instance = session
        .instantiate(&InstanceRequest::new("RectangleContact_Primitive").bind("Recess", "20 [um]"))
        .unwrap();
    assert_eq!(instance.branches(), [choice("pi1_if1", Arm::Branch(0))]);
    let recess_final = instance.handle("FINAL_RECESS").unwrap().to_string();
    assert_eq!(members(&session, &recess_final).len(), 3);
}

#[test]
fn test_u_shaped_contact_and_cuff_fill() {
    let mut session = session();
    let contact = session
        .instantiate(&InstanceRequest::new("uContact_Primitive").with_pseudonym("Cuff 0_uContact"))
        .unwrap();
    assert_eq!(contact.sources(), ["pcs1"]);
    let prunable: Vec<_> = contact.prunable().iter().map(|e| e.id.clone()).collect();
    assert_eq!(prunable, ["pi1_wp1"]);
    assert_eq!(members(&session, "pi1_csel2"), ["pi1_ext1"]);
    assert_eq!(session.allocator().get("Cuff 0_uContact_SRC"), Some("pcs1"));

    let fill = session
        .instantiate(&InstanceRequest::new("CuffFill_Primitive"))
        .unwrap();
    assert!(fill.prunable().is_empty());
    assert_eq!(members(&session, "pi2_csel1"), ["pi2_cyl1"]);

    session
        .instantiate(&InstanceRequest::new("uCuff_Primitive"))
        .unwrap();
    assert_eq!(members(&session, "pi3_csel2"), ["pi3_ext1"]);
}

#[test]
fn test_helical_cuff_union_and_source() {
    let mut session = session();
    let instance = session
        .instantiate(&InstanceRequest::new("HelicalCuffnContact_Primitive"))
        .unwrap();
    assert_eq!(instance.sources(), ["pcs1"]);
    let cuff_final = instance.handle("CUFF_FINAL").unwrap().to_string();
    let end_face = instance.handle("SEL_END_P1").unwrap().to_string();

    assert_eq!(
        members(&session, &cuff_final),
        ["pi1_swe1", "pi1_swe2", "pi1_swe4"]
    );
    assert_eq!(members(&session, &end_face), ["pi1_swe1"]);
    assert_eq!(session.allocator().get("pi1_SRC"), Some("pcs1"));
}

#[test]
fn test_driver_continues_past_failing_design() {
    let file = DesignFile::from_str(DESIGNS).unwrap();
    let mut session = Session::new(TemplateRegistry::builtin().unwrap()).with_config(file.assembly.clone());
    let report = session.run(&file.designs);

    assert!(!report.is_success());
    let summary: Vec<_> = report
        .outcomes
        .iter()
        .map(|o| (o.design.as_str(), o.parameter_group.as_deref(), o.instances.clone()))
        .collect();
    assert_eq!(
        summary,
        vec![
            ("Purdue", Some("par1"), vec!["pi1".to_string(), "pi2".to_string()]),
            ("Broken", Some("par2"), vec![]),
            ("CorTec", Some("par3"), vec!["pi3".to_string()]),
        ]
    );

    let failed: Vec<_> = report.failures().collect();
    assert_eq!(failed.len(), 1);
    assert!(matches!(
        failed[0].error,
        Some(AssemblyError::Bind(BindError::Binding {
            ref param,
            source: ExprError::UnknownIdentifier { ref name },
            ..
        })) if param == "R_out" && name == "R_nerve"
    ));

    let tube = session.instance_by_pseudonym("Cuff 0_TubeCuff").unwrap();
    let r_out = tube.value("R_out").unwrap().as_number().unwrap();
    assert!((r_out - 0.00065).abs() < 1e-12);
    assert_eq!(members(&session, "pi1_csel3"), ["pi1_cyl2"]);

    let contact = session.instance_by_pseudonym("Cuff 0_Contact").unwrap();
    assert_eq!(contact.sources(), ["pcs1"]);
    let sources: Vec<_> = session
        .allocator()
        .current_sources()
        .map(|(index, s)| (index, s.name.clone(), s.cuff_index))
        .collect();
    assert_eq!(sources, vec![(1, "Cuff 0_Contact_SRC".to_string(), 0)]);

    let medium = session.instance_by_pseudonym("Cuff 2_Medium").unwrap();
    assert!(!medium.selection("MEDIUM").unwrap().keep);
    assert_eq!(medium.prunable().len(), 1);
}

#[test]
fn test_resumed_run_rebuilds_in_place() {
    let file = DesignFile::from_str(DESIGNS).unwrap();
    let mut first = Session::new(TemplateRegistry::builtin().unwrap()).with_config(file.assembly.clone());
    first.run(&file.designs);
    let json = first.allocator().to_json().unwrap();

    let mut resumed = Session::new(TemplateRegistry::builtin().unwrap())
        .with_config(file.assembly.clone())
        .with_allocator(IdentifierAllocator::from_json(&json).unwrap());
    let report = resumed.run(&file.designs);

    let summary: Vec<_> = report
        .outcomes
        .iter()
        .map(|o| (o.design.as_str(), o.parameter_group.as_deref(), o.instances.clone()))
        .collect();
    assert_eq!(
        summary,
        vec![
            ("Purdue", Some("par1"), vec!["pi1".to_string(), "pi2".to_string()]),
            ("Broken", Some("par2"), vec![]),
            ("CorTec", Some("par3"), vec!["pi3".to_string()]),
        ]
    );
    assert_eq!(report.failures().count(), 1);

    let ids = resumed.allocator();
    assert_eq!((ids.counter("par"), ids.counter("pi"), ids.counter("pcs")), (3, 3, 1));
    assert_eq!(ids.current_sources().count(), 1);
    assert_eq!(members(&resumed, "pi1_csel3"), ["pi1_cyl2"]);
    assert_eq!(resumed.instance_by_pseudonym("Cuff 0_Contact").unwrap().sources(), ["pcs1"]);

    // Designs re-attached on resume accept further instances
    let extra = resumed
        .instantiate_in("Purdue", &InstanceRequest::new("Medium_Primitive").bind("radius", "R_in * 20"))
        .unwrap();
    assert_eq!(extra.instance_id(), "pi4");
}

#[test]
fn test_resumed_session_continues_numbering() {
    let file = DesignFile::from_str(DESIGNS).unwrap();
    let mut first = Session::new(TemplateRegistry::builtin().unwrap()).with_config(file.assembly.clone());
    first.run(&file.designs);
    let json = first.allocator().to_json().unwrap();

    let restored = IdentifierAllocator::from_json(&json).unwrap();
    let mut second = Session::new(TemplateRegistry::builtin().unwrap())
        .with_config(file.assembly.clone())
        .with_allocator(restored);

    let instance = second
        .instantiate(&InstanceRequest::new("Medium_Primitive").with_pseudonym("Cuff 3_Medium"))
        .unwrap();
    assert_eq!(instance.instance_id(), "pi4");

    // Pseudonyms from the earlier run stay bound
    let err = second
        .instantiate(&InstanceRequest::new("Medium_Primitive").with_pseudonym("Cuff 0_TubeCuff"))
        .unwrap_err();
    assert!(matches!(err, AssemblyError::Bind(BindError::Allocation { .. })));
    assert_eq!(second.allocator().counter("pi"), 5);
}
