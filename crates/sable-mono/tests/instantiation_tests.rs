//! End-to-end tests for generic package instantiation

use sable_frontend::ast::{
    BinaryOp, ConstDecl, Description, Expr, GenericParam, IntKind, LetDecl, ModuleDecl,
    ModuleItem, PackageDecl, PackageItem, QualifiedPath, SourceUnit, StructDecl, StructField,
    StructKind, TypeExpr, VarDecl,
};
use sable_frontend::{ConstValue, IntValue, SourceSpan};
use sable_mono::{demangle, instantiate, InstanceReport, InstantiationConfig, InstantiationError};
use std::io::Write;

fn unit(descriptions: Vec<Description>) -> SourceUnit {
    SourceUnit {
        name: "prj".to_string(),
        descriptions,
    }
}

fn module(name: &str, items: Vec<ModuleItem>) -> Description {
    Description::Module(ModuleDecl::new(name, items))
}

fn module_const(name: &str, value: Expr) -> ModuleItem {
    ModuleItem::Const(ConstDecl::new(name, None, value))
}

fn member(package: &str, args: Vec<Expr>, member: &str) -> Expr {
    Expr::path(QualifiedPath::generic(package, args, &[member]))
}

fn uint(value: u128, width: u32) -> ConstValue {
    ConstValue::Int(IntValue::new(value, width, false).unwrap())
}

/// `package Pkg::<X: u32> { const V: u32 = X; }`
fn value_package() -> Description {
    Description::Package(PackageDecl::generic(
        "Pkg",
        vec![GenericParam::typed("X", TypeExpr::Int(IntKind::U32))],
        vec![PackageItem::Const(ConstDecl::new(
            "V",
            Some(TypeExpr::Int(IntKind::U32)),
            Expr::ident("X"),
        ))],
    ))
}

fn module_items(unit: &sable_mono::InstantiatedUnit, name: &str) -> Vec<ModuleItem> {
    unit.descriptions
        .iter()
        .find_map(|d| match d {
            Description::Module(m) if m.name == name => Some(m.items.clone()),
            _ => None,
        })
        .expect("module present in output")
}

#[test]
fn test_equal_arguments_reuse_an_instance() {
    let source = unit(vec![
        value_package(),
        module(
            "Top",
            vec![
                module_const("A", member("Pkg", vec![Expr::int(1)], "V")),
                module_const("B", member("Pkg", vec![Expr::int(2)], "V")),
                module_const("C", member("Pkg", vec![Expr::int(1)], "V")),
            ],
        ),
    ]);
    let result = instantiate(&source, &InstantiationConfig::default()).unwrap();

    let names: Vec<&str> = result.packages.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["__Pkg__1", "__Pkg__2"]);
    assert_eq!(result.registry.instance_count("Pkg"), 2);
    assert_eq!(
        result.package("__Pkg__1").and_then(|p| p.constant("V")),
        Some(&uint(1, 32))
    );
    assert_eq!(
        result.package("__Pkg__2").and_then(|p| p.constant("V")),
        Some(&uint(2, 32))
    );

    let items = module_items(&result, "Top");
    let rewritten = |name: &str, package: &str| {
        module_const(name, Expr::path(QualifiedPath::new(package, &["V"])))
    };
    assert_eq!(
        items,
        vec![
            rewritten("A", "__Pkg__1"),
            rewritten("B", "__Pkg__2"),
            rewritten("C", "__Pkg__1"),
        ]
    );
}

#[test]
fn test_argument_width_distinguishes_instances() {
    let package = Description::Package(PackageDecl::generic(
        "Pkg",
        vec![GenericParam::constant("X")],
        vec![PackageItem::Const(ConstDecl::new("V", None, Expr::ident("X")))],
    ));
    let source = unit(vec![
        package,
        module(
            "Top",
            vec![
                module_const("A", member("Pkg", vec![Expr::sized(32, 1)], "V")),
                module_const("B", member("Pkg", vec![Expr::sized(64, 1)], "V")),
                // An unsized literal takes the default 32 bits
                module_const("C", member("Pkg", vec![Expr::int(1)], "V")),
            ],
        ),
    ]);
    let result = instantiate(&source, &InstantiationConfig::default()).unwrap();

    assert_eq!(result.registry.instance_count("Pkg"), 2);
    assert_eq!(
        result.package("__Pkg__1").and_then(|p| p.constant("V")),
        Some(&uint(1, 32))
    );
    assert_eq!(
        result.package("__Pkg__2").and_then(|p| p.constant("V")),
        Some(&uint(1, 64))
    );

    let items = module_items(&result, "Top");
    assert_eq!(
        items[2],
        module_const("C", Expr::path(QualifiedPath::new("__Pkg__1", &["V"])))
    );
}

#[test]
fn test_struct_type_reference_keeps_member_path() {
    let package = Description::Package(PackageDecl::generic(
        "Pkg",
        vec![GenericParam::typed("W", TypeExpr::Int(IntKind::U32))],
        vec![PackageItem::Struct(StructDecl {
            name: "StructC".to_string(),
            kind: StructKind::Struct,
            fields: vec![StructField {
                name: "field".to_string(),
                ty: TypeExpr::logic(Expr::ident("W")),
            }],
        })],
    ));
    let source = unit(vec![
        package,
        module(
            "Top",
            vec![
                ModuleItem::Var(VarDecl {
                    name: "s".to_string(),
                    ty: TypeExpr::Path(QualifiedPath::generic(
                        "Pkg",
                        vec![Expr::int(8)],
                        &["StructC"],
                    )),
                }),
                ModuleItem::Let(LetDecl {
                    name: "y".to_string(),
                    ty: TypeExpr::logic(Expr::int(8)),
                    value: Expr::field(Expr::ident("s"), "field"),
                }),
            ],
        ),
    ]);
    let result = instantiate(&source, &InstantiationConfig::default()).unwrap();

    let instance = result.package("__Pkg__1").unwrap();
    assert_eq!(
        instance.item("StructC"),
        Some(&PackageItem::Struct(StructDecl {
            name: "StructC".to_string(),
            kind: StructKind::Struct,
            fields: vec![StructField {
                name: "field".to_string(),
                ty: TypeExpr::logic(Expr::int(8)),
            }],
        }))
    );

    let items = module_items(&result, "Top");
    assert_eq!(
        items[0],
        ModuleItem::Var(VarDecl {
            name: "s".to_string(),
            ty: TypeExpr::Path(QualifiedPath::new("__Pkg__1", &["StructC"])),
        })
    );
    // Field access on the value is untouched
    assert_eq!(
        items[1],
        ModuleItem::Let(LetDecl {
            name: "y".to_string(),
            ty: TypeExpr::logic(Expr::int(8)),
            value: Expr::field(Expr::ident("s"), "field"),
        })
    );
}

#[test]
fn test_dependency_is_specialized_first() {
    let b = Description::Package(PackageDecl::generic(
        "B",
        vec![GenericParam::constant("N")],
        vec![PackageItem::Const(ConstDecl::new(
            "Y",
            None,
            Expr::binary(BinaryOp::Mul, Expr::ident("N"), Expr::int(2)),
        ))],
    ));
    let a = Description::Package(PackageDecl::generic(
        "A",
        vec![GenericParam::constant("M")],
        vec![PackageItem::Const(ConstDecl::new(
            "X",
            None,
            Expr::binary(
                BinaryOp::Add,
                member("B", vec![Expr::ident("M")], "Y"),
                Expr::int(1),
            ),
        ))],
    ));
    // A is declared and referenced before B is ever specialized
    let source = unit(vec![
        a,
        b,
        module("Top", vec![module_const("C", member("A", vec![Expr::int(3)], "X"))]),
    ]);
    let result = instantiate(&source, &InstantiationConfig::default()).unwrap();

    let names: Vec<&str> = result.packages.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["__B__1", "__A__1"]);

    let b_value = result.package("__B__1").and_then(|p| p.constant("Y")).cloned();
    let a_value = result.package("__A__1").and_then(|p| p.constant("X")).cloned();
    assert_eq!(b_value.as_ref().and_then(ConstValue::as_u64), Some(6));
    assert_eq!(a_value.as_ref().and_then(ConstValue::as_u64), Some(7));
    assert_eq!(
        result.package("__A__1").and_then(|p| p.item("X")),
        Some(&PackageItem::Const(ConstDecl::new("X", None, Expr::int(7))))
    );
}

#[test]
fn test_nested_arguments_allocate_inner_first() {
    let inner = member("Pkg", vec![Expr::int(2)], "V");
    let outer = member(
        "Pkg",
        vec![Expr::binary(BinaryOp::Add, inner, Expr::int(1))],
        "V",
    );
    let source = unit(vec![
        value_package(),
        module("Top", vec![module_const("C", outer)]),
    ]);
    let result = instantiate(&source, &InstantiationConfig::default()).unwrap();

    let arguments: Vec<String> = result
        .instances_of("Pkg")
        .iter()
        .map(|p| p.arguments.to_string())
        .collect();
    assert_eq!(arguments, vec!["32'd2", "32'd3"]);
    assert_eq!(
        module_items(&result, "Top")[0],
        module_const("C", Expr::path(QualifiedPath::new("__Pkg__2", &["V"])))
    );
}

#[test]
fn test_cross_package_cycle_is_reported() {
    let a = Description::Package(PackageDecl::generic(
        "A",
        vec![GenericParam::constant("N")],
        vec![PackageItem::Const(ConstDecl::new(
            "X",
            None,
            member("B", vec![Expr::ident("N")], "Y"),
        ))],
    ));
    let b = Description::Package(PackageDecl::generic(
        "B",
        vec![GenericParam::constant("N")],
        vec![PackageItem::Const(ConstDecl::new(
            "Y",
            None,
            member("A", vec![Expr::ident("N")], "X"),
        ))],
    ));
    let source = unit(vec![
        a,
        b,
        module("Top", vec![module_const("C", member("A", vec![Expr::int(1)], "X"))]),
    ]);
    let failure = instantiate(&source, &InstantiationConfig::default()).unwrap_err();

    assert_eq!(failure.errors.len(), 1);
    match &failure.errors[0] {
        InstantiationError::CyclicConstantDependency { chain, .. } => {
            assert_eq!(chain, &["A::<1>::X", "B::<1>::Y", "A::<1>::X"]);
        }
        other => panic!("expected a cycle, got {other}"),
    }
    assert!(failure.packages.is_empty());
}

#[test]
fn test_mutual_reference_without_cycle() {
    // X reads Y, and W reads X: the packages refer to each other but no
    // constant depends on itself
    let a = Description::Package(PackageDecl::generic(
        "A",
        vec![GenericParam::constant("N")],
        vec![PackageItem::Const(ConstDecl::new(
            "X",
            None,
            member("B", vec![Expr::ident("N")], "Y"),
        ))],
    ));
    let b = Description::Package(PackageDecl::generic(
        "B",
        vec![GenericParam::constant("N")],
        vec![
            PackageItem::Const(ConstDecl::new("Y", None, Expr::int(5))),
            PackageItem::Const(ConstDecl::new(
                "W",
                None,
                member("A", vec![Expr::ident("N")], "X"),
            )),
        ],
    ));
    let source = unit(vec![
        a,
        b,
        module("Top", vec![module_const("C", member("A", vec![Expr::int(1)], "X"))]),
    ]);
    let result = instantiate(&source, &InstantiationConfig::default()).unwrap();

    let names: Vec<&str> = result.packages.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["__B__1", "__A__1"]);
    let value = |package: &str, name: &str| {
        result
            .package(package)
            .and_then(|p| p.constant(name))
            .and_then(ConstValue::as_u64)
    };
    assert_eq!(value("__A__1", "X"), Some(5));
    assert_eq!(value("__B__1", "Y"), Some(5));
    assert_eq!(value("__B__1", "W"), Some(5));
}

#[test]
fn test_self_qualified_constant_is_a_cycle() {
    // package P::<N> { const X = P::<N>::X; }
    let source = unit(vec![
        Description::Package(PackageDecl::generic(
            "P",
            vec![GenericParam::constant("N")],
            vec![PackageItem::Const(ConstDecl::new(
                "X",
                None,
                member("P", vec![Expr::ident("N")], "X"),
            ))],
        )),
        module("Top", vec![module_const("C", member("P", vec![Expr::int(1)], "X"))]),
    ]);
    let failure = instantiate(&source, &InstantiationConfig::default()).unwrap_err();

    assert_eq!(failure.errors.len(), 1);
    match &failure.errors[0] {
        InstantiationError::CyclicConstantDependency { chain, .. } => {
            assert_eq!(chain, &["P::<1>::X", "P::<1>::X"]);
        }
        other => panic!("expected a cycle, got {other}"),
    }
    assert!(failure.packages.is_empty());
}

#[test]
fn test_forward_reference_in_instance_is_unresolved() {
    // package P::<N> { const A = B; const B = N; }
    let source = unit(vec![
        Description::Package(PackageDecl::generic(
            "P",
            vec![GenericParam::constant("N")],
            vec![
                PackageItem::Const(ConstDecl::new("A", None, Expr::ident("B"))),
                PackageItem::Const(ConstDecl::new("B", None, Expr::ident("N"))),
            ],
        )),
        module("Top", vec![module_const("C", member("P", vec![Expr::int(1)], "B"))]),
    ]);
    let failure = instantiate(&source, &InstantiationConfig::default()).unwrap_err();

    assert!(matches!(
        failure.errors.as_slice(),
        [InstantiationError::UnresolvedDependency { name, .. }] if name == "B"
    ));
    assert!(failure.packages.is_empty());
}

#[test]
fn test_unbounded_instantiation_hits_the_limit() {
    // package P::<N> { const X = P::<N + 1>::X; }
    let next = member(
        "P",
        vec![Expr::binary(BinaryOp::Add, Expr::ident("N"), Expr::int(1))],
        "X",
    );
    let source = unit(vec![
        Description::Package(PackageDecl::generic(
            "P",
            vec![GenericParam::constant("N")],
            vec![PackageItem::Const(ConstDecl::new("X", None, next))],
        )),
        module("Top", vec![module_const("C", member("P", vec![Expr::int(0)], "X"))]),
    ]);
    let config = InstantiationConfig {
        max_instantiation_depth: 8,
        ..InstantiationConfig::default()
    };
    let failure = instantiate(&source, &config).unwrap_err();

    assert!(matches!(
        failure.errors.as_slice(),
        [InstantiationError::RecursionLimit { limit: 8, .. }]
    ));
}

#[test]
fn test_rejected_binding_reports_once() {
    // 300 does not fit the declared logic<8>
    let package = Description::Package(PackageDecl::generic(
        "Pkg",
        vec![GenericParam::typed("X", TypeExpr::logic(Expr::int(8)))],
        vec![PackageItem::Const(ConstDecl::new("V", None, Expr::ident("X")))],
    ));
    let source = unit(vec![
        package,
        module(
            "Top",
            vec![
                module_const("A", member("Pkg", vec![Expr::int(300)], "V")),
                module_const("B", member("Pkg", vec![Expr::int(300)], "V")),
                module_const("C", member("Pkg", vec![Expr::int(3)], "V")),
            ],
        ),
    ]);
    let failure = instantiate(&source, &InstantiationConfig::default()).unwrap_err();

    // Binding fails before any instance is allocated
    assert_eq!(failure.errors.len(), 1);
    assert!(matches!(
        failure.errors[0],
        InstantiationError::TypeMismatch { .. }
    ));
    let names: Vec<&str> = failure.packages.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["__Pkg__1"]);
}

#[test]
fn test_non_constant_argument() {
    let source = unit(vec![
        value_package(),
        module(
            "Top",
            vec![
                ModuleItem::Var(VarDecl {
                    name: "count".to_string(),
                    ty: TypeExpr::logic(Expr::int(8)),
                }),
                module_const("C", member("Pkg", vec![Expr::ident("count")], "V")),
            ],
        ),
    ]);
    let failure = instantiate(&source, &InstantiationConfig::default()).unwrap_err();

    assert!(matches!(
        failure.errors.as_slice(),
        [InstantiationError::NotConstant { .. }]
    ));
}

#[test]
fn test_errors_point_at_the_call_site() {
    let site = SourceSpan::new(12, 5).with_file("rtl/top.sb");
    let path = QualifiedPath::generic("Pkg", vec![Expr::int(1), Expr::int(2)], &["V"])
        .at(site.clone());
    let source = unit(vec![
        value_package(),
        module("Top", vec![module_const("C", Expr::path(path))]),
    ]);
    let failure = instantiate(&source, &InstantiationConfig::default()).unwrap_err();

    assert_eq!(
        failure.errors,
        vec![InstantiationError::ArityMismatch {
            package: "Pkg".to_string(),
            expected: 1,
            found: 2,
            site,
        }]
    );
    assert_eq!(
        failure.errors[0].to_string(),
        "rtl/top.sb:12:5: package 'Pkg' expects 1 generic argument(s), found 2"
    );
}

#[test]
fn test_module_constants_feed_arguments() {
    let source = unit(vec![
        value_package(),
        module(
            "Top",
            vec![
                module_const("DEPTH", Expr::int(16)),
                module_const(
                    "C",
                    member("Pkg", vec![Expr::call("$clog2", vec![Expr::ident("DEPTH")])], "V"),
                ),
            ],
        ),
    ]);
    let result = instantiate(&source, &InstantiationConfig::default()).unwrap();

    assert_eq!(
        result.package("__Pkg__1").and_then(|p| p.constant("V")),
        Some(&uint(4, 32))
    );
}

#[test]
fn test_report_round_trip() {
    let source = unit(vec![
        value_package(),
        module(
            "Top",
            vec![
                module_const("A", member("Pkg", vec![Expr::int(1)], "V")),
                module_const("B", member("Pkg", vec![Expr::int(2)], "V")),
            ],
        ),
    ]);
    let result = instantiate(&source, &InstantiationConfig::default()).unwrap();
    let report = InstanceReport::from_unit(&result);

    assert_eq!(report.unit, "prj");
    assert_eq!(report.instances.len(), 2);
    for record in &report.instances {
        let (base, id) = demangle(&record.name).unwrap();
        assert_eq!(base, record.base);
        assert_eq!(id.get(), record.id);
    }
    assert_eq!(
        report.find("__Pkg__2").map(|r| r.arguments.clone()),
        Some(vec!["32'd2".to_string()])
    );

    let json = report.to_json().unwrap();
    assert_eq!(InstanceReport::from_json(&json).unwrap(), report);
}

#[test]
fn test_generic_free_output() {
    let source = unit(vec![
        value_package(),
        module("Top", vec![module_const("A", member("Pkg", vec![Expr::int(1)], "V"))]),
    ]);
    let flattened = instantiate(&source, &InstantiationConfig::default())
        .unwrap()
        .into_source_unit();

    let names: Vec<&str> = flattened.descriptions.iter().map(|d| d.name()).collect();
    assert_eq!(names, vec!["__Pkg__1", "Top"]);
    assert!(flattened.descriptions.iter().all(|d| match d {
        Description::Package(p) => !p.is_generic(),
        Description::Module(_) => true,
    }));
}

#[test]
fn test_config_from_manifest_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        "[package]\nname = \"fifo\"\n\n[generics]\nmax_instantiation_depth = 2"
    )
    .unwrap();

    let config = InstantiationConfig::from_path(file.path()).unwrap();
    assert_eq!(config.max_instantiation_depth, 2);

    let next = member(
        "P",
        vec![Expr::binary(BinaryOp::Add, Expr::ident("N"), Expr::int(1))],
        "X",
    );
    let source = unit(vec![
        Description::Package(PackageDecl::generic(
            "P",
            vec![GenericParam::constant("N")],
            vec![PackageItem::Const(ConstDecl::new("X", None, next))],
        )),
        module("Top", vec![module_const("C", member("P", vec![Expr::int(0)], "X"))]),
    ]);
    let failure = instantiate(&source, &config).unwrap_err();
    assert!(matches!(
        failure.errors.as_slice(),
        [InstantiationError::RecursionLimit { limit: 2, .. }]
    ));
}
