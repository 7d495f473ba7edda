//! Declaration translation
//!
//! Each top-level object becomes one descriptor with a *(Decl, Def)* pair:
//!
//! - types: `typedef struct «m»$s «m»;` / `struct «m»$s { … };` (interfaces
//!   keep both halves in the declaration);
//! - constants: a `#define` when the value is a simple literal, otherwise a
//!   file-local definition;
//! - variables: `extern` declaration and definition; initialisers that are
//!   not compile-time constants run in the per-unit init collector;
//! - functions and methods: prototype and body, with the tuple struct of a
//!   multi-result signature typedef'd in the declaration, named results
//!   declared up front, and an `end:` label appended when any `return` took
//!   the goto-end path. Bodies whose complexity stays small are emitted
//!   `static inline` into the header instead.

use std::rc::Rc;

use super::cdd::{Cdd, DeclKind};
use super::ctype::place_decl;
use super::package::Translator;
use crate::ast::{Block, ConstValue, Decl, ObjKind, Object, Span};
use crate::codegen::conval::value_str;
use crate::errors::{Result, TranslateError};
use crate::types::{Signature, Type};

impl Translator {
    /// Translate one declaration into descriptors. `il` is the surrounding
    /// indentation level; zero means package scope.
    pub(crate) fn decl(&mut self, d: &Decl, il: usize) -> Result<Vec<Cdd>> {
        let cdd = match d {
            Decl::Type { obj, span } => self.type_decl(obj, il, *span)?,
            Decl::Const { obj, span } => self.const_decl(obj, il, *span)?,
            Decl::Var { obj, init, span } => self.var_decl(obj, init.as_ref(), il, *span)?,
            Decl::Func {
                obj,
                recv,
                body,
                span,
            } => self.func_decl(obj, recv.as_ref(), body.as_ref(), il, *span)?,
        };
        Ok(vec![cdd])
    }

    fn finish(&mut self, mut cdd: Cdd) -> Cdd {
        cdd.hoist_body_uses();
        // Body-local descriptors keep their tuple typedefs pending; the
        // enclosing function hoists them to its own declaration
        if cdd.il == 0 && !cdd.tuple_typedefs.is_empty() {
            let mut decl: String = cdd.tuple_typedefs.drain(..).collect();
            decl.push_str(&cdd.decl);
            cdd.decl = decl;
        }
        cdd
    }

    // ========================================================================
    // Types
    // ========================================================================

    fn type_decl(&mut self, obj: &Rc<Object>, il: usize, span: Span) -> Result<Cdd> {
        let mut cdd = Cdd::new("", DeclKind::Type, il);
        let m = self.name_str(&mut cdd, obj, true)?;
        cdd.name = m.clone();
        // Mentioning yourself is not a dependency
        cdd.local_deps.remove(&m);
        cdd.def_in_header = true;

        let underlying = match &*obj.ty {
            Type::Named { underlying, .. } => underlying.clone(),
            _ => {
                return Err(TranslateError::violation(
                    format!("type declaration of non-named type {}", obj.ty),
                    span,
                ))
            }
        };

        match &*underlying {
            Type::Struct(fields) => {
                cdd.decl = format!("typedef struct {}$s {};\n", m, m);
                let mut def = format!("struct {}$s {{\n", m);
                for f in fields {
                    let (fb, fdims) = self.type_dims(&mut cdd, &f.ty, true)?;
                    def.push_str(&format!("\t{} {};\n", fb, place_decl(&f.name, &fdims)));
                }
                def.push_str("};\n");
                cdd.def = def;
            }
            Type::Interface(_) => {
                // Both halves live in the declaration
                let (base, _) = self.type_dims(&mut cdd, &underlying, true)?;
                cdd.decl = format!("typedef {} {};\n", base, m);
            }
            _ => {
                let (base, dims) = self.type_dims(&mut cdd, &underlying, true)?;
                cdd.decl = format!("typedef {} {};\n", base, place_decl(&m, &dims));
            }
        }
        cdd.local_deps.remove(&m);
        Ok(self.finish(cdd))
    }

    // ========================================================================
    // Constants
    // ========================================================================

    fn const_decl(&mut self, obj: &Rc<Object>, il: usize, span: Span) -> Result<Cdd> {
        let mut cdd = Cdd::new("", DeclKind::Const, il);
        let m = self.name_str(&mut cdd, obj, true)?;
        cdd.name = m.clone();
        cdd.local_deps.remove(&m);

        let v = match &obj.kind {
            ObjKind::Const(v) => v.clone(),
            _ => {
                return Err(TranslateError::violation(
                    "constant declaration without a value",
                    span,
                ))
            }
        };
        match &v {
            ConstValue::Str(_) => {
                let ts = self.type_str(&mut cdd, &obj.ty, true)?;
                cdd.def = format!("static const {} {} = {};\n", ts, m, value_str(&v, &obj.ty));
            }
            _ => {
                cdd.decl = format!("#define {} {}\n", m, value_str(&v, &obj.ty));
            }
        }
        Ok(self.finish(cdd))
    }

    // ========================================================================
    // Variables
    // ========================================================================

    fn var_decl(
        &mut self,
        obj: &Rc<Object>,
        init: Option<&crate::ast::Expr>,
        il: usize,
        _span: Span,
    ) -> Result<Cdd> {
        let mut cdd = Cdd::new("", DeclKind::Var, il);
        let m = self.name_str(&mut cdd, obj, true)?;
        cdd.name = m.clone();
        cdd.local_deps.remove(&m);

        let (base, dims) = self.type_dims(&mut cdd, &obj.ty, true)?;
        let placed = place_decl(&m, &dims);

        if il > 0 {
            // Body-local: one definition line, zero value unless initialised
            let init_text = match init {
                Some(e) => self.iface_expr_str(&mut cdd, e, Some(&obj.ty))?,
                None => self.zero_val(&mut cdd, &obj.ty)?,
            };
            cdd.def = format!("{} {} = {};\n", base, placed, init_text);
            return Ok(self.finish(cdd));
        }

        cdd.decl = format!("extern {} {};\n", base, placed);
        let mut def = format!("{} {}", base, placed);
        match init {
            // Constants, nil spellings and composite literals are valid C
            // static initialisers; anything else runs in the init collector
            Some(e)
                if e.konst.is_some()
                    || matches!(
                        e.kind,
                        crate::ast::ExprKind::Composite { .. } | crate::ast::ExprKind::Nil
                    ) =>
            {
                let text = self.iface_expr_str(&mut cdd, e, Some(&obj.ty))?;
                def.push_str(&format!(" = {}", text));
            }
            Some(e) => {
                let text = self.iface_expr_str(&mut cdd, e, Some(&obj.ty))?;
                self.add_unit_init(format!("\t{} = {};\n", m, text));
            }
            None => {}
        }
        def.push_str(";\n");
        cdd.def = def;
        Ok(self.finish(cdd))
    }

    // ========================================================================
    // Functions and methods
    // ========================================================================

    fn func_decl(
        &mut self,
        obj: &Rc<Object>,
        recv: Option<&Rc<Object>>,
        body: Option<&Block>,
        il: usize,
        span: Span,
    ) -> Result<Cdd> {
        if il > 0 {
            return Err(TranslateError::violation(
                "function declaration inside a body",
                span,
            ));
        }
        let mut cdd = Cdd::new("", DeclKind::Func, il);
        let m = self.name_str(&mut cdd, obj, true)?;
        cdd.name = m.clone();
        cdd.local_deps.remove(&m);

        let sig = obj
            .sig()
            .cloned()
            .ok_or_else(|| TranslateError::violation("function without a signature", span))?;

        if obj.name == "init" {
            self.add_unit_init_func(m.clone());
        }

        let sigtext = self.signature_text(&mut cdd, &m, &sig, recv)?;

        let def_body = match body {
            Some(b) => {
                let fctx = self.func_ctx(&mut cdd, &sig, Some(&m))?;
                Some(self.func_body_text(&mut cdd, &sig, b, &fctx, span)?)
            }
            None => None,
        };

        match def_body {
            Some(text) if cdd.complexity <= self.cfg().inline_threshold => {
                cdd.def_in_header = true;
                cdd.def = format!("static inline {} {}\n", sigtext, text);
            }
            Some(text) => {
                cdd.decl.push_str(&format!("{};\n", sigtext));
                cdd.def = format!("{} {}\n", sigtext, text);
            }
            None => {
                // Body provided elsewhere (assembly, runtime)
                cdd.decl.push_str(&format!("{};\n", sigtext));
            }
        }
        Ok(self.finish(cdd))
    }

    /// `«result» «name»(«receiver?, params»)` with declarator placement for
    /// results that are pointers or function values
    pub(crate) fn signature_text(
        &mut self,
        cdd: &mut Cdd,
        fname: &str,
        sig: &Rc<Signature>,
        recv: Option<&Rc<Object>>,
    ) -> Result<String> {
        let (rb, rdims) = match sig.results.len() {
            0 => ("void".to_string(), Vec::new()),
            1 => self.type_dims(cdd, &sig.results[0].ty, true)?,
            _ => {
                let elems: Vec<Rc<Type>> = sig.results.iter().map(|r| r.ty.clone()).collect();
                (self.tuple_name(cdd, &elems, Some(fname))?, Vec::new())
            }
        };

        let mut params = Vec::new();
        if let Some(r) = recv {
            let rt = sig.recv.clone().ok_or_else(|| {
                TranslateError::violation("receiver object without receiver type", Span::default())
            })?;
            let (base, dims) = self.type_dims(cdd, &rt, true)?;
            let rname = self.name_str(cdd, r, true)?;
            params.push(format!("{} {}", base, place_decl(&rname, &dims)));
        }
        for (i, p) in sig.params.iter().enumerate() {
            let (base, dims) = self.type_dims(cdd, &p.ty, true)?;
            let pname = if p.name.is_empty() || p.name == "_" {
                format!("arg{}$", i)
            } else {
                format!("{}$", p.name)
            };
            params.push(format!("{} {}", base, place_decl(&pname, &dims)));
        }
        let ptext = if params.is_empty() {
            "void".to_string()
        } else {
            params.join(", ")
        };

        Ok(format!(
            "{} {}",
            rb,
            place_decl(&format!("{}({})", fname, ptext), &rdims)
        ))
    }

    /// A complete function body `{ … }`, including named-result declarations
    /// and the `end:` label when some return needs it
    pub(crate) fn func_body_text(
        &mut self,
        cdd: &mut Cdd,
        sig: &Rc<Signature>,
        body: &Block,
        fctx: &super::stmt::FuncCtx,
        span: Span,
    ) -> Result<String> {
        let mut w = String::from("{\n");
        cdd.il += 1;

        let named = sig.results.iter().all(|r| !r.name.is_empty() && r.name != "_");
        if !sig.results.is_empty() && named {
            for r in &sig.results {
                cdd.indent(&mut w);
                let (base, dims) = self.type_dims(cdd, &r.ty, true)?;
                let zero = self.zero_val(cdd, &r.ty)?;
                w.push_str(&format!(
                    "{} {} = {};\n",
                    base,
                    place_decl(&format!("{}$", r.name), &dims),
                    zero
                ));
            }
        }

        let end = self.stmts_into(cdd, &mut w, &body.stmts, fctx)?;

        if end {
            if !named {
                return Err(TranslateError::violation(
                    "bare return in a function without named results",
                    span,
                ));
            }
            cdd.indent_out(&mut w);
            w.push_str("end:;\n");
            cdd.indent(&mut w);
            match &fctx.tuple {
                Some(tup) => {
                    let names: Vec<String> =
                        sig.results.iter().map(|r| format!("{}$", r.name)).collect();
                    w.push_str(&format!("return ({}){{{}}};\n", tup, names.join(", ")));
                }
                None => {
                    w.push_str(&format!("return {}$;\n", sig.results[0].name));
                }
            }
        }

        cdd.il -= 1;
        cdd.indent(&mut w);
        w.push('}');
        Ok(w)
    }

    /// A nested function definition hoisted out of an expression; the text is
    /// indented for the current block and ready to flush as a pre-statement
    pub(crate) fn nested_func_def(
        &mut self,
        cdd: &mut Cdd,
        fname: &str,
        sig: &Rc<Signature>,
        body: &Block,
    ) -> Result<String> {
        let sigtext = self.signature_text(cdd, fname, sig, None)?;
        let fctx = self.func_ctx(cdd, sig, Some(fname))?;
        let body_text = self.func_body_text(cdd, sig, body, &fctx, body.span)?;
        let mut out = String::new();
        cdd.indent(&mut out);
        out.push_str(&format!("{} {}\n", sigtext, body_text));
        Ok(out)
    }
}
