//! Declaration translation: (Decl, Def) pairs for top-level objects

use std::rc::Rc;

use micac::ast::{BinOp, ConstValue, Decl, Span, Stmt};
use micac::codegen::Config;
use micac::test_support::*;
use micac::types::{Field, Method, Type};

fn em() -> Emitter {
    // Force bodies out of line so Decl/Def split is visible
    Emitter::with_config(
        "pkg",
        Config {
            ptr_size: 4,
            inline_threshold: 0,
        },
    )
}

#[test]
fn struct_type_splits_typedef_and_body() {
    let mut em = em();
    let obj = type_obj(
        "pkg",
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
    let (decl, def) = em.decl(&Decl::Type {
        obj,
        span: Span::default(),
    })
    .unwrap();
    assert_eq!(decl, "typedef struct pkg$Point$s pkg$Point;\n");
    assert_eq!(def, "struct pkg$Point$s {\n\tint x;\n\tint y;\n};\n");
}

#[test]
fn interface_type_lives_entirely_in_the_declaration() {
    let mut em = em();
    let obj = type_obj(
        "pkg",
        "Reader",
        Rc::new(Type::Interface(vec![Method {
            name: "read".into(),
            sig: sig(vec![], vec![param("", tint())]),
        }])),
    );
    let (decl, def) = em.decl(&Decl::Type {
        obj,
        span: Span::default(),
    })
    .unwrap();
    assert_eq!(
        decl,
        "typedef struct { interface interface; int (*read)(interface); } pkg$Reader;\n"
    );
    assert_eq!(def, "");
}

#[test]
fn simple_constant_is_a_define() {
    let mut em = em();
    let obj = pkg_const("pkg", "N", tint32(), ConstValue::Int(7));
    let (decl, def) = em.decl(&Decl::Const {
        obj,
        span: Span::default(),
    })
    .unwrap();
    assert_eq!(decl, "#define pkg$N 7L\n");
    assert_eq!(def, "");
}

#[test]
fn string_constant_is_a_static_definition() {
    let mut em = em();
    let obj = pkg_const("pkg", "Greeting", tstr(), ConstValue::Str("hi".into()));
    let (decl, def) = em.decl(&Decl::Const {
        obj,
        span: Span::default(),
    })
    .unwrap();
    assert_eq!(decl, "");
    assert_eq!(
        def,
        "static const string pkg$Greeting = EGSTR(\"hi\");\n"
    );
}

#[test]
fn var_with_nil_initialiser_matches_the_slice_convention() {
    let mut em = em();
    let obj = pkg_var("pkg", "s", tslice(tint()));
    let (decl, def) = em.decl(&var_decl(&obj, Some(nil_expr()))).unwrap();
    assert_eq!(decl, "extern slice pkg$s;\n");
    assert_eq!(def, "slice pkg$s = NILSLICE;\n");
}

#[test]
fn var_with_call_initialiser_defers_to_unit_init() {
    let mut em = em();
    let f = pkg_func("pkg", "mk", sig(vec![], vec![param("", tint())]));
    let obj = pkg_var("pkg", "v", tint());
    let init = call(ident(&f), vec![], tint());
    let (decl, def) = em.decl(&var_decl(&obj, Some(init))).unwrap();
    assert_eq!(decl, "extern int pkg$v;\n");
    // The definition carries no initialiser; the init collector assigns it
    assert_eq!(def, "int pkg$v;\n");
}

#[test]
fn multi_result_function_declares_its_tuple() {
    let mut em = em();
    let div = pkg_func(
        "pkg",
        "div",
        sig(
            vec![param("a", tint()), param("b", tint())],
            vec![param("", tint()), param("", tint())],
        ),
    );
    let a = local_var("a", tint());
    let b = local_var("b", tint());
    let body = block(vec![Stmt::Return {
        results: vec![
            binary(BinOp::Div, ident(&a), ident(&b), tint()),
            binary(BinOp::Rem, ident(&a), ident(&b), tint()),
        ],
        span: Span::default(),
    }]);
    let (decl, def) = em.decl(&func_decl(&div, body)).unwrap();
    assert_eq!(
        decl,
        "typedef struct { int _0; int _1; } pkg$div$out;\npkg$div$out pkg$div(int a$, int b$);\n"
    );
    assert_eq!(
        def,
        "pkg$div$out pkg$div(int a$, int b$) {\n\treturn (pkg$div$out){(a$/b$), (a$%b$)};\n}\n"
    );
}

#[test]
fn void_function_returns_plainly() {
    let mut em = em();
    let f = pkg_func("pkg", "noop", sig(vec![], vec![]));
    let body = block(vec![Stmt::Return {
        results: vec![],
        span: Span::default(),
    }]);
    let (decl, def) = em.decl(&func_decl(&f, body)).unwrap();
    assert_eq!(decl, "void pkg$noop(void);\n");
    assert_eq!(def, "void pkg$noop(void) {\n\treturn;\n}\n");
}

#[test]
fn named_results_get_an_end_label() {
    let mut em = em();
    let f = pkg_func(
        "pkg",
        "get",
        sig(vec![], vec![param("r", tint()), param("ok", tbool())]),
    );
    let r = local_var("r", tint());
    let body = block(vec![
        assign(vec![ident(&r)], vec![int_const(1, tint())]),
        Stmt::Return {
            results: vec![],
            span: Span::default(),
        },
    ]);
    let (_decl, def) = em.decl(&func_decl(&f, body)).unwrap();
    assert!(def.contains("int r$ = 0;"), "got: {}", def);
    assert!(def.contains("bool ok$ = false;"), "got: {}", def);
    assert!(def.contains("goto end;"), "got: {}", def);
    assert!(def.contains("end:;"), "got: {}", def);
    assert!(def.contains("return (pkg$get$out){r$, ok$};"), "got: {}", def);
}

#[test]
fn small_function_inlines_into_the_header() {
    let mut em = Emitter::new("pkg");
    let f = pkg_func("pkg", "id", sig(vec![param("x", tint())], vec![param("", tint())]));
    let x = local_var("x", tint());
    let body = block(vec![Stmt::Return {
        results: vec![ident(&x)],
        span: Span::default(),
    }]);
    // Peek at the descriptor to check placement
    let cdds = em.decl_cdds(&func_decl(&f, body)).unwrap();
    assert!(cdds[0].def_in_header);
    assert!(cdds[0].def.starts_with("static inline int pkg$id(int x$)"));
    assert!(cdds[0].decl.is_empty());
}

#[test]
fn method_takes_the_receiver_first() {
    let mut em = em();
    let point = Type::named("pkg", "Point", Rc::new(Type::Struct(vec![])));
    let msig = Rc::new(
        micac::types::Signature::new(vec![], vec![param("", tint())])
            .with_recv(Type::pointer(point)),
    );
    let m = Rc::new(micac::ast::Object {
        name: "norm".into(),
        pkg: Some("pkg".into()),
        ty: Rc::new(Type::Signature(msig.clone())),
        kind: micac::ast::ObjKind::Func { sig: msig },
    });
    let recv = local_var("p", Type::pointer(Type::named("pkg", "Point", Rc::new(Type::Struct(vec![])))));
    let body = block(vec![Stmt::Return {
        results: vec![int_const(0, tint())],
        span: Span::default(),
    }]);
    let d = Decl::Func {
        obj: m,
        recv: Some(recv),
        body: Some(body),
        span: Span::default(),
    };
    let (decl, def) = em.decl(&d).unwrap();
    assert_eq!(decl, "int pkg$Point$norm(pkg$Point *p$);\n");
    assert!(def.starts_with("int pkg$Point$norm(pkg$Point *p$) {"));
}
