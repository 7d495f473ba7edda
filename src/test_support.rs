//! Test support infrastructure
//!
//! The crate has no frontend, so tests build typed ASTs by hand. This module
//! keeps that bearable: constructors for objects, types and expressions, and
//! an `Emitter` fixture that runs the translator over a single node and hands
//! back the C text.

use std::rc::Rc;

use crate::ast::{
    AssignOp, BinOp, Block, Builtin, ConstValue, Decl, Expr, ExprKind, ObjKind, Object, Span,
    Stmt, UnOp,
};
use crate::codegen::cdd::{Cdd, DeclKind};
use crate::codegen::stmt::FuncCtx;
use crate::codegen::{Config, Translator};
use crate::errors::Result;
use crate::types::{BasicKind, Param, Signature, Type};

// ============================================================================
// Types
// ============================================================================

pub fn tint() -> Rc<Type> {
    Type::basic(BasicKind::Int)
}

pub fn tint32() -> Rc<Type> {
    Type::basic(BasicKind::Int32)
}

pub fn tbool() -> Rc<Type> {
    Type::basic(BasicKind::Bool)
}

pub fn tstr() -> Rc<Type> {
    Type::basic(BasicKind::Str)
}

pub fn tslice(elem: Rc<Type>) -> Rc<Type> {
    Type::slice(elem)
}

pub fn tchan(elem: Rc<Type>) -> Rc<Type> {
    Type::chan(crate::types::ChanDir::Both, elem)
}

pub fn tempty_iface() -> Rc<Type> {
    Rc::new(Type::Interface(Vec::new()))
}

pub fn param(name: &str, ty: Rc<Type>) -> Param {
    Param {
        name: name.to_string(),
        ty,
    }
}

pub fn sig(params: Vec<Param>, results: Vec<Param>) -> Rc<Signature> {
    Rc::new(Signature::new(params, results))
}

// ============================================================================
// Objects
// ============================================================================

fn object(name: &str, pkg: Option<&str>, ty: Rc<Type>, kind: ObjKind) -> Rc<Object> {
    Rc::new(Object {
        name: name.to_string(),
        pkg: pkg.map(|p| p.to_string()),
        ty,
        kind,
    })
}

pub fn local_var(name: &str, ty: Rc<Type>) -> Rc<Object> {
    object(name, None, ty, ObjKind::Var)
}

pub fn pkg_var(pkg: &str, name: &str, ty: Rc<Type>) -> Rc<Object> {
    object(name, Some(pkg), ty, ObjKind::Var)
}

pub fn pkg_func(pkg: &str, name: &str, s: Rc<Signature>) -> Rc<Object> {
    object(
        name,
        Some(pkg),
        Rc::new(Type::Signature(s.clone())),
        ObjKind::Func { sig: s },
    )
}

pub fn method_obj(name: &str, s: Rc<Signature>) -> Rc<Object> {
    object(
        name,
        None,
        Rc::new(Type::Signature(s.clone())),
        ObjKind::Func { sig: s },
    )
}

pub fn pkg_const(pkg: &str, name: &str, ty: Rc<Type>, v: ConstValue) -> Rc<Object> {
    object(name, Some(pkg), ty, ObjKind::Const(v))
}

pub fn type_obj(pkg: &str, name: &str, underlying: Rc<Type>) -> Rc<Object> {
    object(
        name,
        Some(pkg),
        Type::named(pkg, name, underlying),
        ObjKind::TypeName,
    )
}

pub fn label_obj(name: &str) -> Rc<Object> {
    object(name, None, Type::basic(BasicKind::Bool), ObjKind::Label)
}

pub fn builtin_obj(b: Builtin, name: &str) -> Rc<Object> {
    object(name, None, Type::basic(BasicKind::UntypedNil), ObjKind::Builtin(b))
}

// ============================================================================
// Expressions
// ============================================================================

pub fn ident(obj: &Rc<Object>) -> Expr {
    Expr::new(ExprKind::Ident(obj.clone()), obj.ty.clone(), Span::default())
}

pub fn int_const(v: i64, ty: Rc<Type>) -> Expr {
    Expr::new(ExprKind::Ident(local_var("k", ty.clone())), ty, Span::default())
        .with_const(ConstValue::Int(v))
}

pub fn str_const(s: &str) -> Expr {
    Expr::new(
        ExprKind::Ident(local_var("k", tstr())),
        tstr(),
        Span::default(),
    )
    .with_const(ConstValue::Str(s.to_string()))
}

pub fn nil_expr() -> Expr {
    Expr::new(
        ExprKind::Nil,
        Type::basic(BasicKind::UntypedNil),
        Span::default(),
    )
}

pub fn binary(op: BinOp, lhs: Expr, rhs: Expr, ty: Rc<Type>) -> Expr {
    Expr::new(
        ExprKind::Binary {
            op,
            lhs: Rc::new(lhs),
            rhs: Rc::new(rhs),
        },
        ty,
        Span::default(),
    )
}

pub fn unary(op: UnOp, operand: Expr, ty: Rc<Type>) -> Expr {
    Expr::new(
        ExprKind::Unary {
            op,
            operand: Rc::new(operand),
        },
        ty,
        Span::default(),
    )
}

pub fn call(fun: Expr, args: Vec<Expr>, ty: Rc<Type>) -> Expr {
    Expr::new(
        ExprKind::Call {
            fun: Rc::new(fun),
            args,
        },
        ty,
        Span::default(),
    )
}

pub fn index(x: Expr, i: Expr, ty: Rc<Type>) -> Expr {
    Expr::new(
        ExprKind::Index {
            x: Rc::new(x),
            index: Rc::new(i),
        },
        ty,
        Span::default(),
    )
}

pub fn type_ref(t: Rc<Type>) -> Expr {
    Expr::new(ExprKind::TypeRef(t.clone()), t, Span::default())
}

// ============================================================================
// Statements and declarations
// ============================================================================

pub fn block(stmts: Vec<Stmt>) -> Block {
    Block {
        stmts,
        span: Span::default(),
    }
}

pub fn assign(lhs: Vec<Expr>, rhs: Vec<Expr>) -> Stmt {
    Stmt::Assign {
        lhs,
        rhs,
        op: AssignOp::Assign,
    }
}

pub fn define(lhs: Vec<Expr>, rhs: Vec<Expr>) -> Stmt {
    Stmt::Assign {
        lhs,
        rhs,
        op: AssignOp::Define,
    }
}

pub fn var_decl(obj: &Rc<Object>, init: Option<Expr>) -> Decl {
    Decl::Var {
        obj: obj.clone(),
        init,
        span: Span::default(),
    }
}

pub fn func_decl(obj: &Rc<Object>, body: Block) -> Decl {
    Decl::Func {
        obj: obj.clone(),
        recv: None,
        body: Some(body),
        span: Span::default(),
    }
}

// ============================================================================
// Emission fixture
// ============================================================================

/// Runs translator entry points over single nodes, collecting the C text
pub struct Emitter {
    pub tr: Translator,
    pub cdd: Cdd,
}

impl Emitter {
    pub fn new(pkg: &str) -> Self {
        Emitter {
            tr: Translator::new(Config::default(), pkg),
            cdd: Cdd::new("test", DeclKind::Func, 0),
        }
    }

    pub fn with_config(pkg: &str, cfg: Config) -> Self {
        Emitter {
            tr: Translator::new(cfg, pkg),
            cdd: Cdd::new("test", DeclKind::Func, 0),
        }
    }

    /// C text of an expression
    pub fn expr(&mut self, e: &Expr) -> Result<String> {
        self.tr.expr_str(&mut self.cdd, e, None)
    }

    /// C text of an expression under a target-type hint
    pub fn expr_hint(&mut self, e: &Expr, hint: &Rc<Type>) -> Result<String> {
        self.tr.expr_str(&mut self.cdd, e, Some(hint))
    }

    /// C text of an expression supplied where `target` is expected (boxing
    /// applies)
    pub fn expr_to(&mut self, e: &Expr, target: &Rc<Type>) -> Result<String> {
        self.tr.iface_expr_str(&mut self.cdd, e, Some(target))
    }

    /// C text of a statement in a void function
    pub fn stmt(&mut self, s: &Stmt) -> Result<String> {
        let fctx = FuncCtx {
            result_t: "void".to_string(),
            results: Vec::new(),
            tuple: None,
        };
        self.stmt_in(s, &fctx)
    }

    /// C text of a statement in a function with the given signature
    pub fn stmt_with_sig(&mut self, s: &Stmt, fsig: &Rc<Signature>) -> Result<String> {
        let fctx = self.tr.func_ctx(&mut self.cdd, fsig, None)?;
        self.stmt_in(s, &fctx)
    }

    fn stmt_in(&mut self, s: &Stmt, fctx: &FuncCtx) -> Result<String> {
        let mut w = String::new();
        self.tr
            .stmts_into(&mut self.cdd, &mut w, std::slice::from_ref(s), fctx)?;
        Ok(w)
    }

    /// (Decl, Def) pair of a top-level declaration
    pub fn decl(&mut self, d: &Decl) -> Result<(String, String)> {
        let cdds = self.tr.decl(d, 0)?;
        let mut decl = String::new();
        let mut def = String::new();
        for c in &cdds {
            decl.push_str(&c.decl);
            def.push_str(&c.def);
            self.cdd.merge_uses(c);
        }
        Ok((decl, def))
    }

    /// The type id the registry would hand this type
    pub fn type_id_of(&mut self, t: &Rc<Type>) -> u64 {
        let (base, dims) = self
            .tr
            .type_dims(&mut self.cdd, t, false)
            .expect("printable type");
        self.tr.type_id(&base, &dims)
    }

    /// The mangled C identifier of an object
    pub fn mangle(&mut self, obj: &Rc<Object>) -> Result<String> {
        self.tr.name_str(&mut self.cdd, obj, true)
    }

    /// The printed (base, dims) pair of a type
    pub fn type_dims(&mut self, t: &Rc<Type>) -> Result<(String, Vec<String>)> {
        self.tr.type_dims(&mut self.cdd, t, true)
    }

    /// Raw descriptors of a top-level declaration, for placement checks
    pub fn decl_cdds(&mut self, d: &Decl) -> Result<Vec<Cdd>> {
        self.tr.decl(d, 0)
    }
}
