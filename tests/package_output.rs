//! Driver-level tests: whole packages in, header/source/manifest out

use std::rc::Rc;

use micac::ast::{ConstValue, Decl, Package, Span, Stmt};
use micac::codegen::Config;
use micac::test_support::*;
use micac::types::{Field, Type};
use micac::Translator;

fn small_package() -> Package {
    // package pkg
    // type Point struct { x, y int }
    // const N = 7 (int32)
    // var origin Point
    // var count int = runtime_noos.Tick()
    // func get(p *Point) int { return p.x }   -- kept simple: return N
    let point = type_obj(
        "demo/pkg",
        "Point",
        Rc::new(Type::Struct(vec![
            Field {
                name: "x".into(),
                ty: tint(),
                embedded: false,
            },
            Field {
                name: "y".into(),
                ty: tint(),
                embedded: false,
            },
        ])),
    );
    let n = pkg_const("demo/pkg", "N", tint32(), ConstValue::Int(7));
    let origin = pkg_var(
        "demo/pkg",
        "origin",
        Type::named("demo/pkg", "Point", Rc::new(Type::Struct(vec![]))),
    );
    let tick = pkg_func("runtime/noos", "Tick", sig(vec![], vec![param("", tint())]));
    let count = pkg_var("demo/pkg", "count", tint());
    let get = pkg_func("demo/pkg", "get", sig(vec![], vec![param("", tint32())]));
    let body = block(vec![Stmt::Return {
        results: vec![int_const(7, tint32())],
        span: Span::default(),
    }]);

    Package {
        path: "demo/pkg".into(),
        name: "pkg".into(),
        decls: vec![
            // Function first on purpose: the sort must still put the type
            // declarations ahead of everything in the header
            func_decl(&get, body),
            Decl::Type {
                obj: point,
                span: Span::default(),
            },
            Decl::Const {
                obj: n,
                span: Span::default(),
            },
            var_decl(&origin, None),
            var_decl(&count, Some(call(ident(&tick), vec![], tint()))),
        ],
    }
}

#[test]
fn header_is_include_guarded() {
    let mut tr = Translator::new(Config::default(), "demo/pkg");
    let out = tr.translate_package(&small_package()).unwrap();
    assert!(out.header.starts_with("#ifndef DEMO_PKG_H\n#define DEMO_PKG_H\n"));
    assert!(out.header.trim_end().ends_with("#endif /* DEMO_PKG_H */"));
}

#[test]
fn header_includes_runtime_and_imports() {
    let mut tr = Translator::new(Config::default(), "demo/pkg");
    let out = tr.translate_package(&small_package()).unwrap();
    assert!(out.header.contains("#include \"mica.h\"\n"));
    assert!(out.header.contains("#include \"runtime/noos/noos.h\"\n"));
}

#[test]
fn declarations_precede_definitions() {
    let mut tr = Translator::new(Config::default(), "demo/pkg");
    let out = tr.translate_package(&small_package()).unwrap();
    let typedef = out.header.find("typedef struct demo_pkg$Point$s").unwrap();
    let body = out.header.find("struct demo_pkg$Point$s {").unwrap();
    assert!(typedef < body);
    let extern_var = out.header.find("extern demo_pkg$Point demo_pkg$origin;").unwrap();
    assert!(body < extern_var || typedef < extern_var);
    // Definitions of vars live in the source file
    assert!(out.source.contains("demo_pkg$Point demo_pkg$origin;"));
    assert!(!out.header.contains("\ndemo_pkg$Point demo_pkg$origin;\n"));
}

#[test]
fn manifest_lists_cross_unit_references_once() {
    let mut tr = Translator::new(Config::default(), "demo/pkg");
    let out = tr.translate_package(&small_package()).unwrap();
    let entries: Vec<_> = out
        .imports
        .iter()
        .filter(|e| e.pkg == "runtime/noos" && e.name == "Tick")
        .collect();
    assert_eq!(entries.len(), 1);
    assert!(entries[0].direct);
    assert_eq!(out.manifest().matches("runtime/noos Tick").count(), 1);
}

#[test]
fn non_constant_initialiser_runs_in_unit_init() {
    let mut tr = Translator::new(Config::default(), "demo/pkg");
    let out = tr.translate_package(&small_package()).unwrap();
    assert!(out.header.contains("void demo_pkg$init(void);"));
    assert!(out.source.contains("void demo_pkg$init(void) {"));
    assert!(
        out.source.contains("demo_pkg$count = runtime_noos$Tick();"),
        "source: {}",
        out.source
    );
    // The variable definition itself carries no initialiser
    assert!(out.source.contains("int demo_pkg$count;") || out.header.contains("int demo_pkg$count;"));
}

#[test]
fn user_init_functions_are_collected_in_order() {
    let init = pkg_func("demo/pkg", "init", sig(vec![], vec![]));
    let init2 = pkg_func("demo/pkg", "init", sig(vec![], vec![]));
    let pkg = Package {
        path: "demo/pkg".into(),
        name: "pkg".into(),
        decls: vec![
            func_decl(&init, block(vec![])),
            func_decl(&init2, block(vec![])),
        ],
    };
    let mut tr = Translator::new(Config::default(), "demo/pkg");
    let out = tr.translate_package(&pkg).unwrap();
    // Two distinct uniqued init functions, called in declaration order
    let first = out.source.find("demo_pkg$init$1();");
    let second = out.source.find("demo_pkg$init$2();");
    assert!(first.is_some(), "source: {}", out.source);
    assert!(second.is_some(), "source: {}", out.source);
    assert!(first.unwrap() < second.unwrap());
}

#[test]
fn output_files_land_in_a_directory_per_package() {
    let mut tr = Translator::new(Config::default(), "demo/pkg");
    let out = tr.translate_package(&small_package()).unwrap();
    let root = std::env::temp_dir().join(format!("micac-test-{}", std::process::id()));
    out.write_to(&root).unwrap();
    let dir = root.join("demo/pkg");
    assert!(dir.join("pkg.h").exists());
    assert!(dir.join("pkg.c").exists());
    assert!(dir.join("pkg.imports").exists());
    let manifest = std::fs::read_to_string(dir.join("pkg.imports")).unwrap();
    assert!(manifest.contains("runtime/noos Tick direct"));
    std::fs::remove_dir_all(&root).ok();
}
