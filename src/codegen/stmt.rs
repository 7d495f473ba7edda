//! Statement translation
//!
//! Statements append C statements to the caller's buffer; the caller has
//! already written the indentation for the first line, and every emitted line
//! ends with a newline. The returned flag says whether the statement emitted
//! a `goto end`, which makes the declaration layer synthesise the `end:`
//! label for the named-result return convention.
//!
//! Control flow re-encodings worth knowing before reading the arms:
//! - `for` becomes `while`, with the post statement in a wrapper block that
//!   also carries the `continue` label target;
//! - `switch` becomes `switch(0){case 0:{…}}` so each clause can be an `if`
//!   over a once-evaluated `tag` local, with `fallthrough` running the next
//!   clause's body by simply not breaking;
//! - `select` follows the runtime's two-phase protocol: per-clause inits,
//!   one `SELECT`/`NBSELECT` call, then a dispatch table of local labels;
//! - `go` evaluates every argument into fresh locals and hands a nested
//!   `wrap` function to `GOWAIT`.

use std::rc::Rc;

use super::cdd::Cdd;
use super::ctype::place_decl;
use super::expr::ReceiverCall;
use super::package::Translator;
use crate::ast::{
    AssignOp, Block, BranchKind, CaseClause, CommClause, CommOp, Expr, ExprKind, ObjKind,
    SelKind, Stmt,
};
use crate::errors::{Result, TranslateError};
use crate::types::{BasicKind, Param, Signature, Type};

/// Per-function emission context: how `return` must be spelled
#[derive(Debug, Clone)]
pub(crate) struct FuncCtx {
    /// Printed result type: `void`, a single type, or a tuple struct name
    pub result_t: String,
    pub results: Vec<Param>,
    /// Tuple struct name when there are two or more results
    pub tuple: Option<String>,
}

impl Translator {
    pub(crate) fn func_ctx(
        &mut self,
        cdd: &mut Cdd,
        sig: &Signature,
        owner: Option<&str>,
    ) -> Result<FuncCtx> {
        let (result_t, tuple) = match sig.results.len() {
            0 => ("void".to_string(), None),
            1 => (self.type_str(cdd, &sig.results[0].ty, true)?, None),
            _ => {
                let elems: Vec<Rc<Type>> = sig.results.iter().map(|r| r.ty.clone()).collect();
                let name = self.tuple_name(cdd, &elems, owner)?;
                (name.clone(), Some(name))
            }
        };
        Ok(FuncCtx {
            result_t,
            results: sig.results.clone(),
            tuple,
        })
    }

    /// Translate the statements of a block body (no braces); used by blocks
    /// and by function bodies
    pub(crate) fn stmts_into(
        &mut self,
        cdd: &mut Cdd,
        w: &mut String,
        stmts: &[Stmt],
        fctx: &FuncCtx,
    ) -> Result<bool> {
        let mut end = false;
        for stmt in stmts {
            let mut sbuf = String::new();
            let (label, inner) = match stmt {
                Stmt::Labeled { label, stmt } => (Some(format!("{}$", label.name)), &**stmt),
                s => (None, s),
            };
            let e = self.stmt(cdd, &mut sbuf, inner, label.as_deref().unwrap_or(""), fctx)?;
            end = end || e;
            // Hoisted nested definitions precede the statement that made them
            for pre in std::mem::take(&mut cdd.pre_stmts) {
                w.push_str(&pre);
            }
            if let Some(l) = &label {
                self.write_label(cdd, w, l, "");
            }
            cdd.indent(w);
            w.push_str(&sbuf);
        }
        Ok(end)
    }

    pub(crate) fn block_stmt(
        &mut self,
        cdd: &mut Cdd,
        w: &mut String,
        block: &Block,
        fctx: &FuncCtx,
    ) -> Result<bool> {
        w.push_str("{\n");
        cdd.il += 1;
        let end = self.stmts_into(cdd, w, &block.stmts, fctx)?;
        cdd.il -= 1;
        cdd.indent(w);
        w.push('}');
        Ok(end)
    }

    fn write_label(&self, cdd: &Cdd, w: &mut String, label: &str, suffix: &str) {
        cdd.indent_out(w);
        w.push_str(label);
        w.push_str(suffix);
        w.push_str(":;\n");
    }

    /// Translate one statement; `label` is the mangled label when the
    /// statement is the target of one
    pub(crate) fn stmt(
        &mut self,
        cdd: &mut Cdd,
        w: &mut String,
        stmt: &Stmt,
        label: &str,
        fctx: &FuncCtx,
    ) -> Result<bool> {
        let mut end = false;
        cdd.complexity += 1;

        match stmt {
            Stmt::Decl(d) => {
                let cdds = self.decl(d, cdd.il)?;
                let mut first = true;
                for mut c in cdds {
                    for chunk in [&c.decl, &c.def] {
                        if chunk.is_empty() {
                            continue;
                        }
                        if !first {
                            cdd.indent(w);
                        }
                        first = false;
                        w.push_str(chunk);
                    }
                    cdd.merge_uses(&c);
                    // Tuple typedefs ride up to the enclosing declaration
                    cdd.tuple_typedefs.append(&mut c.tuple_typedefs);
                }
            }

            Stmt::Expr(e) => {
                self.expr(cdd, w, e, None)?;
                w.push_str(";\n");
            }

            Stmt::Assign { lhs, rhs, op } => {
                self.assign_stmt(cdd, w, lhs, rhs, *op)?;
            }

            Stmt::IncDec { x, inc } => {
                w.push_str(if *inc { "++(" } else { "--(" });
                self.expr(cdd, w, x, None)?;
                w.push_str(");\n");
            }

            Stmt::If {
                init,
                cond,
                then,
                els,
            } => {
                if let Some(init) = init {
                    w.push_str("{\n");
                    cdd.il += 1;
                    cdd.indent(w);
                    end |= self.stmt(cdd, w, init, "", fctx)?;
                    cdd.indent(w);
                }
                w.push_str("if (");
                self.expr(cdd, w, cond, None)?;
                w.push_str(") ");
                end |= self.block_stmt(cdd, w, then, fctx)?;
                match els {
                    None => w.push('\n'),
                    Some(s) => {
                        w.push_str(" else ");
                        end |= self.stmt(cdd, w, s, "", fctx)?;
                    }
                }
                if init.is_some() {
                    cdd.il -= 1;
                    cdd.indent(w);
                    w.push_str("}\n");
                }
            }

            Stmt::Block(b) => {
                end |= self.block_stmt(cdd, w, b, fctx)?;
                w.push('\n');
            }

            Stmt::For {
                init,
                cond,
                post,
                body,
            } => {
                if let Some(init) = init {
                    w.push_str("{\n");
                    cdd.il += 1;
                    cdd.indent(w);
                    end |= self.stmt(cdd, w, init, "", fctx)?;
                    cdd.indent(w);
                }

                if !label.is_empty() && post.is_none() {
                    w.push_str(&format!("{}_continue: ", label));
                }

                w.push_str("while (");
                match cond {
                    Some(c) => self.expr(cdd, w, c, None)?,
                    None => w.push_str("true"),
                }
                w.push_str(") ");

                if post.is_some() {
                    w.push_str("{\n");
                    cdd.il += 1;
                    cdd.indent(w);
                }
                end |= self.block_stmt(cdd, w, body, fctx)?;
                w.push('\n');

                if let Some(post) = post {
                    if !label.is_empty() {
                        self.write_label(cdd, w, label, "_continue");
                    }
                    cdd.indent(w);
                    end |= self.stmt(cdd, w, post, "", fctx)?;
                    cdd.il -= 1;
                    cdd.indent(w);
                    w.push_str("}\n");
                }

                if init.is_some() {
                    cdd.il -= 1;
                    cdd.indent(w);
                    w.push_str("}\n");
                }

                if !label.is_empty() {
                    self.write_label(cdd, w, label, "_break");
                }
            }

            Stmt::Range {
                key,
                value,
                define,
                x,
                body,
            } => {
                end |= self.range_stmt(cdd, w, key, value, *define, x, body, label, fctx)?;
            }

            Stmt::Return { results, span } => {
                end |= self.return_stmt(cdd, w, results, *span, fctx)?;
            }

            Stmt::Switch { init, tag, clauses } => {
                end |= self.switch_stmt(cdd, w, init, tag, clauses, label, fctx)?;
            }

            Stmt::Select { clauses, span: _ } => {
                end |= self.select_stmt(cdd, w, clauses, fctx)?;
            }

            Stmt::Go { call } => {
                self.go_stmt(cdd, w, call)?;
            }

            Stmt::Send { chan, value } => {
                let elem = chan.ty.elem().cloned().ok_or_else(|| {
                    TranslateError::violation("send on non-channel", chan.span)
                })?;
                w.push_str("SEND(");
                self.expr(cdd, w, chan, None)?;
                let ts = self.type_str(cdd, &elem, true)?;
                w.push_str(&format!(", {}, ", ts));
                self.iface_expr(cdd, w, value, Some(&elem))?;
                w.push_str(");\n");
            }

            Stmt::Branch { kind, label } => match (kind, label) {
                (BranchKind::Break, None) => w.push_str("break;\n"),
                (BranchKind::Continue, None) => w.push_str("continue;\n"),
                (BranchKind::Break, Some(l)) => {
                    w.push_str(&format!("goto {}$_break;\n", l.name))
                }
                (BranchKind::Continue, Some(l)) => {
                    w.push_str(&format!("goto {}$_continue;\n", l.name))
                }
                (BranchKind::Goto, Some(l)) => w.push_str(&format!("goto {}$;\n", l.name)),
                (BranchKind::Goto, None) => {
                    return Err(TranslateError::violation(
                        "goto without a label",
                        crate::ast::Span::default(),
                    ))
                }
                (BranchKind::Fallthrough, _) => {
                    return Err(TranslateError::violation(
                        "fallthrough outside a switch clause tail",
                        crate::ast::Span::default(),
                    ))
                }
            },

            Stmt::Labeled { label, stmt } => {
                // Labels nested below block level still get a target
                let l = format!("{}$", label.name);
                self.write_label(cdd, w, &l, "");
                cdd.indent(w);
                end |= self.stmt(cdd, w, stmt, &l, fctx)?;
            }
        }
        Ok(end)
    }

    // ========================================================================
    // Assignment
    // ========================================================================

    fn assign_stmt(
        &mut self,
        cdd: &mut Cdd,
        w: &mut String,
        lhs: &[Expr],
        rhs: &[Expr],
        op: AssignOp,
    ) -> Result<()> {
        let define = op == AssignOp::Define;
        let rhs_is_tuple = lhs.len() > 1 && rhs.len() == 1;

        let mut rhs_texts: Vec<String> = Vec::with_capacity(lhs.len());
        let mut types: Vec<Option<Rc<Type>>> = vec![None; lhs.len()];
        let mut consumed = vec![false; lhs.len()];
        let mut first = true;

        if rhs_is_tuple {
            let elems = match &*rhs[0].ty {
                Type::Tuple(elems) => elems.clone(),
                other => {
                    return Err(TranslateError::violation(
                        format!("multi-assignment from non-tuple {}", other),
                        rhs[0].span,
                    ))
                }
            };
            if elems.len() < lhs.len() {
                return Err(TranslateError::violation(
                    "assignment arity exceeds tuple width",
                    rhs[0].span,
                ));
            }
            // A declared callee's tuple typedef comes from its own
            // declaration (or its header); only structural tuples are
            // declared at the use site
            let owner = self.callee_tuple_owner(cdd, &rhs[0])?;
            let tup = match owner {
                Some(f) => format!("{}$out", f),
                None => self.tuple_name(cdd, &elems, None)?,
            };
            let tmp = format!("tmp${}", self.unique_id());
            w.push_str(&format!("{} {} = ", tup, tmp));
            self.expr(cdd, w, &rhs[0], None)?;
            w.push_str(";\n");
            first = false;
            for (i, elem) in elems.iter().enumerate().take(lhs.len()) {
                rhs_texts.push(format!("{}._{}", tmp, i));
                if define {
                    types[i] = Some(elem.clone());
                }
            }
        } else {
            if rhs.len() != lhs.len() {
                return Err(TranslateError::violation(
                    "assignment arity mismatch",
                    crate::ast::Span::default(),
                ));
            }
            for (i, e) in rhs.iter().enumerate() {
                if lhs[i].is_blank() {
                    rhs_texts.push(self.expr_str(cdd, e, None)?);
                    continue;
                }
                let t = lhs[i].ty.clone();
                types[i] = Some(t.clone());
                if define {
                    rhs_texts.push(self.expr_str(cdd, e, Some(&t))?);
                } else {
                    rhs_texts.push(self.iface_expr_str(cdd, e, Some(&t))?);
                }
            }
        }

        // Left-hand sides
        let mut lhs_texts: Vec<String> = Vec::with_capacity(lhs.len());
        for (i, e) in lhs.iter().enumerate() {
            if e.is_blank() {
                lhs_texts.push("_".to_string());
            } else if define {
                let obj = e.ident_obj().cloned().ok_or_else(|| {
                    TranslateError::violation("define target is not an identifier", e.span)
                })?;
                let name = self.name_str(cdd, &obj, true)?;
                match &types[i] {
                    Some(t) => {
                        let (base, dims) = self.type_dims(cdd, t, true)?;
                        lhs_texts.push(format!("{} {}", base, place_decl(&name, &dims)));
                    }
                    None => lhs_texts.push(name),
                }
            } else {
                lhs_texts.push(self.expr_str(cdd, e, None)?);
            }
        }

        // Parallel assignment: serialise through temporaries so every store
        // sees pre-assignment values
        if rhs.len() == lhs.len() && lhs.len() > 1 && !define {
            for i in 0..lhs.len() {
                if lhs_texts[i] == "_" {
                    if !first {
                        cdd.indent(w);
                    }
                    first = false;
                    w.push_str(&format!("(void)({});\n", rhs_texts[i]));
                    consumed[i] = true;
                    continue;
                }
                let t = types[i].clone().expect("typed non-blank lhs");
                let (base, dims) = self.type_dims(cdd, &t, true)?;
                let tmp = format!("tmp${}", self.unique_id());
                if !first {
                    cdd.indent(w);
                }
                first = false;
                w.push_str(&format!(
                    "{} {} = {};\n",
                    base,
                    place_decl(&tmp, &dims),
                    rhs_texts[i]
                ));
                rhs_texts[i] = tmp;
            }
        }

        let atok = match op {
            AssignOp::Assign | AssignOp::Define => " = ".to_string(),
            AssignOp::AndNot => {
                rhs_texts[0] = format!("~({})", rhs_texts[0]);
                " &= ".to_string()
            }
            other => format!(" {} ", other.c_op()),
        };

        for i in 0..lhs.len() {
            if consumed[i] {
                continue;
            }
            if lhs_texts[i] == "_" && rhs_is_tuple {
                continue;
            }
            if !first {
                cdd.indent(w);
            }
            first = false;
            if lhs_texts[i] == "_" {
                w.push_str(&format!("(void)({});\n", rhs_texts[i]));
            } else {
                w.push_str(&format!("{}{}{};\n", lhs_texts[i], atok, rhs_texts[i]));
            }
        }
        Ok(())
    }

    /// The tuple struct of a call is named after the callee when the callee
    /// is a declared function or method
    fn callee_tuple_owner(&mut self, cdd: &mut Cdd, e: &Expr) -> Result<Option<String>> {
        let fun = match &e.kind {
            ExprKind::Call { fun, .. } => fun,
            _ => return Ok(None),
        };
        match &fun.kind {
            ExprKind::Ident(obj) if matches!(obj.kind, ObjKind::Func { .. }) => {
                Ok(Some(self.name_str(cdd, obj, false)?))
            }
            ExprKind::Selector { sel, .. }
                if matches!(sel.kind, SelKind::MethodVal | SelKind::MethodExpr) =>
            {
                Ok(Some(self.name_str(cdd, &sel.obj, false)?))
            }
            _ => Ok(None),
        }
    }

    // ========================================================================
    // Return
    // ========================================================================

    fn return_stmt(
        &mut self,
        cdd: &mut Cdd,
        w: &mut String,
        results: &[Expr],
        span: crate::ast::Span,
        fctx: &FuncCtx,
    ) -> Result<bool> {
        match results.len() {
            0 => {
                if fctx.result_t == "void" {
                    w.push_str("return;\n");
                    Ok(false)
                } else {
                    // Named results are written; the end label returns them
                    w.push_str("goto end;\n");
                    Ok(true)
                }
            }
            1 => {
                w.push_str("return ");
                if fctx.results.len() > 1 {
                    // Tuple passthrough from another call
                    self.expr(cdd, w, &results[0], None)?;
                } else {
                    let hint = fctx.results.first().map(|r| r.ty.clone());
                    self.iface_expr(cdd, w, &results[0], hint.as_ref())?;
                }
                w.push_str(";\n");
                Ok(false)
            }
            n => {
                if n != fctx.results.len() {
                    return Err(TranslateError::violation("return arity mismatch", span));
                }
                w.push_str(&format!("return ({}){{", fctx.result_t));
                for (i, e) in results.iter().enumerate() {
                    if i > 0 {
                        w.push_str(", ");
                    }
                    let hint = fctx.results[i].ty.clone();
                    self.iface_expr(cdd, w, e, Some(&hint))?;
                }
                w.push_str("};\n");
                Ok(false)
            }
        }
    }

    // ========================================================================
    // Range
    // ========================================================================

    #[allow(clippy::too_many_arguments)]
    fn range_stmt(
        &mut self,
        cdd: &mut Cdd,
        w: &mut String,
        key: &Option<Expr>,
        value: &Option<Expr>,
        define: bool,
        x: &Expr,
        body: &Block,
        label: &str,
        fctx: &FuncCtx,
    ) -> Result<bool> {
        let mut end = false;
        let xt = x.ty.clone();

        // Reject the container kinds the runtime has no iteration protocol for
        match xt.underlying() {
            Type::Map(_, _) => {
                return Err(TranslateError::unsupported("range over a map", x.span))
            }
            Type::Chan(_, _) => {
                return Err(TranslateError::unsupported("range over a channel", x.span))
            }
            Type::Slice(_) | Type::Array(_, _) | Type::Basic(BasicKind::Str) => {}
            Type::Pointer(elem) if matches!(elem.underlying(), Type::Array(_, _)) => {}
            other => {
                return Err(TranslateError::violation(
                    format!("range over {}", other),
                    x.span,
                ))
            }
        }

        let fixed_len = match xt.underlying() {
            Type::Array(n, _) => Some(*n),
            Type::Pointer(elem) => match elem.underlying() {
                Type::Array(n, _) => Some(*n),
                _ => None,
            },
            _ => None,
        };

        let value = value.as_ref().filter(|v| !v.is_blank());

        w.push_str("{\n");
        cdd.il += 1;

        // Evaluate the ranged expression once
        let xs = match x.ident_obj() {
            Some(obj) => {
                let obj = obj.clone();
                self.name_str(cdd, &obj, true)?
            }
            None => {
                let xn = format!("x${}", self.unique_id());
                let (base, dims) = self.type_dims(cdd, &xt, true)?;
                cdd.indent(w);
                let init = self.expr_str(cdd, x, None)?;
                w.push_str(&format!(
                    "{} {} = {};\n",
                    base,
                    place_decl(&xn, &dims),
                    init
                ));
                xn
            }
        };

        let xl = match fixed_len {
            Some(n) => n.to_string(),
            None => format!("len({})", xs),
        };

        let ks = match key.as_ref().filter(|k| !k.is_blank()) {
            Some(k) => self.expr_str(cdd, k, None)?,
            None => format!("i${}", self.unique_id()),
        };
        let key_synth = key.as_ref().filter(|k| !k.is_blank()).is_none();

        cdd.indent(w);
        if define || key_synth {
            w.push_str("int ");
        }
        w.push_str(&format!("{} = 0;\n", ks));

        if !label.is_empty() {
            self.write_label(cdd, w, label, "_continue");
        }

        cdd.indent(w);
        w.push_str(&format!("for (; {} < {}; ++{}) ", ks, xl, ks));

        if let Some(v) = value {
            w.push_str("{\n");
            cdd.il += 1;
            cdd.indent(w);
            if define {
                let vt = self.range_elem(&xt);
                let (base, dims) = self.type_dims(cdd, &vt, true)?;
                let vname = self.expr_str(cdd, v, None)?;
                w.push_str(&format!("{} {}", base, place_decl(&vname, &dims)));
            } else {
                self.expr(cdd, w, v, None)?;
            }
            w.push_str(" = ");
            let idx = self.range_index(cdd, &xt, &xs, &ks)?;
            w.push_str(&idx);
            w.push_str(";\n");
            cdd.indent(w);
        }

        end |= self.block_stmt(cdd, w, body, fctx)?;
        w.push('\n');

        if value.is_some() {
            cdd.il -= 1;
            cdd.indent(w);
            w.push_str("}\n");
        }

        cdd.il -= 1;
        cdd.indent(w);
        w.push_str("}\n");

        if !label.is_empty() {
            self.write_label(cdd, w, label, "_break");
        }
        Ok(end)
    }

    /// The element type yielded by ranging over `t`
    fn range_elem(&self, t: &Rc<Type>) -> Rc<Type> {
        match t.underlying() {
            Type::Basic(BasicKind::Str) => Type::basic(BasicKind::Uint8),
            Type::Pointer(elem) => elem.elem().cloned().unwrap_or_else(|| elem.clone()),
            _ => t.elem().cloned().unwrap_or_else(|| t.clone()),
        }
    }

    /// `x[i]` spelled for the ranged container's kind
    fn range_index(&mut self, cdd: &mut Cdd, t: &Rc<Type>, xs: &str, ks: &str) -> Result<String> {
        Ok(match t.underlying() {
            Type::Basic(BasicKind::Str) => format!("{}.str[{}]", xs, ks),
            Type::Slice(elem) => {
                let elem = elem.clone();
                let (base, mut dims) = self.type_dims(cdd, &elem, false)?;
                dims.insert(0, "*".to_string());
                format!("(({}{}){}.arr)[{}]", base, place_decl("", &dims), xs, ks)
            }
            Type::Pointer(_) => format!("(*{})[{}]", xs, ks),
            _ => format!("{}[{}]", xs, ks),
        })
    }

    // ========================================================================
    // Switch
    // ========================================================================

    fn switch_stmt(
        &mut self,
        cdd: &mut Cdd,
        w: &mut String,
        init: &Option<Box<Stmt>>,
        tag: &Option<Expr>,
        clauses: &[CaseClause],
        label: &str,
        fctx: &FuncCtx,
    ) -> Result<bool> {
        let mut end = false;
        w.push_str("switch(0){case 0:{\n");
        cdd.il += 1;

        if let Some(init) = init {
            cdd.indent(w);
            end |= self.stmt(cdd, w, init, "", fctx)?;
        }

        cdd.indent(w);
        let tag_ty = match tag {
            Some(t) => {
                let ty = t.ty.clone();
                let (base, dims) = self.type_dims(cdd, &ty, true)?;
                let init = self.expr_str(cdd, t, None)?;
                w.push_str(&format!("{} {} = {};\n", base, place_decl("tag", &dims), init));
                ty
            }
            None => {
                w.push_str("bool tag = true;\n");
                Type::basic(BasicKind::Bool)
            }
        };

        for clause in clauses {
            cdd.indent(w);
            if let Some(exprs) = &clause.exprs {
                w.push_str("if (");
                for (i, e) in exprs.iter().enumerate() {
                    if i != 0 {
                        w.push_str(" || ");
                    }
                    let cmp = self.eq_tag(cdd, "tag", e, &tag_ty)?;
                    w.push_str(&cmp);
                }
                w.push_str(") ");
            }
            w.push_str("{\n");
            cdd.il += 1;

            // A trailing fallthrough suppresses the break and lets control
            // run into the next clause's body
            let mut body = &clause.body[..];
            let mut brk = true;
            if let Some(Stmt::Branch {
                kind: BranchKind::Fallthrough,
                ..
            }) = body.last()
            {
                brk = false;
                body = &body[..body.len() - 1];
            }
            for s in body {
                cdd.indent(w);
                end |= self.stmt(cdd, w, s, "", fctx)?;
            }
            if brk {
                cdd.indent(w);
                w.push_str("break;\n");
            }

            cdd.il -= 1;
            cdd.indent(w);
            w.push_str("}\n");
        }

        cdd.il -= 1;
        cdd.indent(w);
        w.push_str("}}\n");

        if !label.is_empty() {
            self.write_label(cdd, w, label, "_break");
        }
        Ok(end)
    }

    /// `tag == e` spelled per the tag's type
    fn eq_tag(&mut self, cdd: &mut Cdd, tag: &str, e: &Expr, t: &Rc<Type>) -> Result<String> {
        match t.underlying() {
            Type::Basic(BasicKind::Str) => {
                let es = self.expr_str(cdd, e, Some(t))?;
                Ok(format!("equals({}, {})", tag, es))
            }
            Type::Interface(ms) => {
                let tag_box = if ms.is_empty() {
                    tag.to_string()
                } else {
                    format!("{}.interface", tag)
                };
                let rhs = if e.ty.is_interface() {
                    let empty = matches!(e.ty.underlying(), Type::Interface(m) if m.is_empty());
                    let es = self.expr_str(cdd, e, Some(t))?;
                    if empty {
                        es
                    } else {
                        format!("{}.interface", es)
                    }
                } else if matches!(e.kind, ExprKind::Nil) {
                    "NILI".to_string()
                } else {
                    let (base, dims) = self.type_dims(cdd, &e.ty, false)?;
                    let tid = self.type_id(&base, &dims);
                    let es = self.expr_str(cdd, e, None)?;
                    format!("INTERFACE({}, 0x{:x})", es, tid)
                };
                Ok(format!("EQUALI({}, {})", tag_box, rhs))
            }
            _ => {
                let es = self.expr_str(cdd, e, Some(t))?;
                Ok(format!("{} == {}", tag, es))
            }
        }
    }

    // ========================================================================
    // Select
    // ========================================================================

    fn select_stmt(
        &mut self,
        cdd: &mut Cdd,
        w: &mut String,
        clauses: &[CommClause],
        fctx: &FuncCtx,
    ) -> Result<bool> {
        let mut end = false;
        w.push_str("switch(0){case 0:{\n");
        cdd.il += 1;

        // Local labels for the dispatch table
        cdd.indent(w);
        w.push_str("__label__ ");
        let mut dflt = false;
        for (i, c) in clauses.iter().enumerate() {
            if i != 0 {
                w.push_str(", ");
            }
            if c.comm.is_none() {
                dflt = true;
                w.push_str("dflt");
            } else {
                w.push_str(&format!("case{}", i));
            }
        }
        w.push_str(";\n");

        // Phase one: init every communication
        for (i, c) in clauses.iter().enumerate() {
            match &c.comm {
                None => {}
                Some(CommOp::Send { chan, value }) => {
                    let elem = chan.ty.elem().cloned().ok_or_else(|| {
                        TranslateError::violation("select send on non-channel", chan.span)
                    })?;
                    cdd.indent(w);
                    w.push_str(&format!("SENDINIT({}, ", i));
                    self.expr(cdd, w, chan, None)?;
                    let ts = self.type_str(cdd, &elem, true)?;
                    w.push_str(&format!(", {}, ", ts));
                    self.iface_expr(cdd, w, value, Some(&elem))?;
                    w.push_str(");\n");
                }
                Some(CommOp::Recv { chan, .. }) => {
                    let elem = chan.ty.elem().cloned().ok_or_else(|| {
                        TranslateError::violation("select receive on non-channel", chan.span)
                    })?;
                    cdd.indent(w);
                    w.push_str(&format!("RECVINIT({}, ", i));
                    self.expr(cdd, w, chan, None)?;
                    let ts = self.type_str(cdd, &elem, true)?;
                    w.push_str(&format!(", {});\n", ts));
                }
            }
        }

        // Phase two: the choosing call
        cdd.indent(w);
        let mut n = clauses.len();
        if dflt {
            w.push_str("NBSELECT(\n");
            n -= 1;
        } else {
            w.push_str("SELECT(\n");
        }
        cdd.il += 1;
        for (i, c) in clauses.iter().enumerate() {
            match &c.comm {
                None => continue,
                Some(CommOp::Send { .. }) => {
                    cdd.indent(w);
                    w.push_str(&format!("SENDCOMM({})", i));
                }
                Some(CommOp::Recv { .. }) => {
                    cdd.indent(w);
                    w.push_str(&format!("RECVCOMM({})", i));
                }
            }
            n -= 1;
            if n > 0 {
                w.push(',');
            }
            w.push('\n');
        }
        cdd.il -= 1;
        cdd.indent(w);
        w.push_str(");\n");

        // Phase three: dispatch table
        for (i, c) in clauses.iter().enumerate() {
            cdd.indent(w);
            match &c.comm {
                None => w.push_str("dflt"),
                Some(_) => w.push_str(&format!("case{}", i)),
            }
            w.push_str(":{\n");
            cdd.il += 1;

            match &c.comm {
                None => {}
                Some(CommOp::Send { .. }) => {
                    cdd.indent(w);
                    w.push_str(&format!("SELSEND({});\n", i));
                }
                Some(CommOp::Recv { chan, lhs, define }) => {
                    self.select_recv(cdd, w, i, chan, lhs, *define)?;
                }
            }

            for s in &c.body {
                cdd.indent(w);
                end |= self.stmt(cdd, w, s, "", fctx)?;
            }
            cdd.indent(w);
            w.push_str("break;\n");
            cdd.il -= 1;
            cdd.indent(w);
            w.push_str("}\n");
        }

        cdd.il -= 1;
        cdd.indent(w);
        w.push_str("}}\n");
        Ok(end)
    }

    fn select_recv(
        &mut self,
        cdd: &mut Cdd,
        w: &mut String,
        i: usize,
        chan: &Expr,
        lhs: &[Expr],
        define: bool,
    ) -> Result<()> {
        let elem = chan
            .ty
            .elem()
            .cloned()
            .ok_or_else(|| TranslateError::violation("select receive on non-channel", chan.span))?;

        if lhs.len() <= 1 {
            cdd.indent(w);
            if let Some(v) = lhs.first().filter(|v| !v.is_blank()) {
                if define {
                    let (base, dims) = self.type_dims(cdd, &elem, true)?;
                    let name = self.expr_str(cdd, v, None)?;
                    w.push_str(&format!("{} {}", base, place_decl(&name, &dims)));
                } else {
                    self.expr(cdd, w, v, None)?;
                }
                w.push_str(" = ");
            }
            w.push_str(&format!("SELRECV({});\n", i));
            return Ok(());
        }

        let v = &lhs[0];
        let ok = &lhs[1];
        cdd.indent(w);
        let mut tmp = String::new();
        if !v.is_blank() || !ok.is_blank() {
            let elems = vec![elem.clone(), Type::basic(BasicKind::Bool)];
            let tup = self.tuple_name(cdd, &elems, None)?;
            tmp = format!("tmp${}", self.unique_id());
            w.push_str(&format!("{} {} = ", tup, tmp));
        }
        w.push_str(&format!("SELRECVOK({});\n", i));

        if !v.is_blank() {
            cdd.indent(w);
            if define {
                let (base, dims) = self.type_dims(cdd, &elem, true)?;
                let name = self.expr_str(cdd, v, None)?;
                w.push_str(&format!("{} {}", base, place_decl(&name, &dims)));
            } else {
                self.expr(cdd, w, v, None)?;
            }
            w.push_str(&format!(" = {}._0;\n", tmp));
        }
        if !ok.is_blank() {
            cdd.indent(w);
            if define {
                w.push_str("bool ");
            }
            let name = self.expr_str(cdd, ok, None)?;
            w.push_str(&format!("{} = {}._1;\n", name, tmp));
        }
        Ok(())
    }

    // ========================================================================
    // Go
    // ========================================================================

    fn go_stmt(&mut self, cdd: &mut Cdd, w: &mut String, call: &Expr) -> Result<()> {
        let (fun, args) = match &call.kind {
            ExprKind::Call { fun, args } => (fun, args),
            _ => {
                return Err(TranslateError::violation(
                    "go statement without a call",
                    call.span,
                ))
            }
        };

        enum Target {
            Plain(String),
            Value(String, Rc<Type>),
            Method(String, super::expr::Receiver),
            Iface(String, super::expr::Receiver),
        }

        let sig = match fun.ty.underlying() {
            Type::Signature(sig) => sig.clone(),
            _ => match &fun.kind {
                ExprKind::Selector { sel, .. } => sel.obj.sig().cloned().ok_or_else(|| {
                    TranslateError::violation("go target is not a function", fun.span)
                })?,
                _ => {
                    return Err(TranslateError::violation(
                        "go target is not a function",
                        fun.span,
                    ))
                }
            },
        };

        let target = match &fun.kind {
            ExprKind::Ident(obj) => match &obj.kind {
                ObjKind::Func { .. } => Target::Plain(self.name_str(cdd, obj, true)?),
                ObjKind::Var => {
                    let obj = obj.clone();
                    Target::Value(self.name_str(cdd, &obj, true)?, fun.ty.clone())
                }
                _ => {
                    return Err(TranslateError::unsupported(
                        "go on a builtin",
                        fun.span,
                    ))
                }
            },
            ExprKind::Selector { x, sel } => match sel.kind {
                SelKind::MethodVal => {
                    let msig = sel.obj.sig().cloned().unwrap_or_else(|| sig.clone());
                    let recv = self.receiver_text(cdd, x, &sel.path, &msig)?;
                    match recv.call {
                        ReceiverCall::Concrete => {
                            Target::Method(self.name_str(cdd, &sel.obj, true)?, recv)
                        }
                        ReceiverCall::Interface => Target::Iface(sel.obj.name.clone(), recv),
                    }
                }
                SelKind::MethodExpr => Target::Plain(self.name_str(cdd, &sel.obj, true)?),
                SelKind::FieldVal => {
                    let mut text = String::new();
                    self.selector_field(cdd, &mut text, x, &sel.path)?;
                    Target::Value(text, fun.ty.clone())
                }
            },
            _ => Target::Value(self.expr_str(cdd, fun, None)?, fun.ty.clone()),
        };

        // Fast path: an ordinary function with no arguments needs no wrapper
        if let Target::Plain(f) = &target {
            if args.is_empty() {
                w.push_str(&format!("GO({}());\n", f));
                return Ok(());
            }
        }

        struct GoArg {
            l: String,
            r: String,
            base: String,
            dims: Vec<String>,
        }
        let mut argv: Vec<GoArg> = Vec::new();

        match &target {
            Target::Value(text, ty) => {
                let (base, dims) = self.type_dims(cdd, ty, true)?;
                argv.push(GoArg {
                    l: "_f".to_string(),
                    r: text.clone(),
                    base,
                    dims,
                });
            }
            Target::Method(_, recv) | Target::Iface(_, recv) => {
                let (base, dims) = self.type_dims(cdd, &recv.ty, true)?;
                argv.push(GoArg {
                    l: "_r".to_string(),
                    r: recv.text.clone(),
                    base,
                    dims,
                });
            }
            Target::Plain(_) => {}
        }

        for (i, a) in args.iter().enumerate() {
            let pt = sig
                .params
                .get(i)
                .map(|p| p.ty.clone())
                .unwrap_or_else(|| a.ty.clone());
            let (base, dims) = self.type_dims(cdd, &pt, true)?;
            let r = self.iface_expr_str(cdd, a, Some(&pt))?;
            argv.push(GoArg {
                l: format!("_{}", i),
                r,
                base,
                dims,
            });
        }

        w.push_str("{\n");
        cdd.il += 1;

        cdd.indent(w);
        w.push_str("void wrap(");
        for (i, a) in argv.iter().enumerate() {
            if i > 0 {
                w.push_str(", ");
            }
            w.push_str(&format!("{} {}", a.base, place_decl(&a.l, &a.dims)));
        }
        w.push_str(") {\n");
        cdd.il += 1;
        cdd.indent(w);
        w.push_str("goready();\n");
        cdd.indent(w);
        let plain_args: Vec<&str> = argv
            .iter()
            .filter(|a| a.l.starts_with("_") && a.l[1..].chars().all(|c| c.is_ascii_digit()))
            .map(|a| a.l.as_str())
            .collect();
        match &target {
            Target::Plain(f) => w.push_str(&format!("{}({})", f, plain_args.join(", "))),
            Target::Value(_, _) => w.push_str(&format!("_f({})", plain_args.join(", "))),
            Target::Method(f, _) => {
                let mut all = vec!["_r"];
                all.extend(plain_args.iter().copied());
                w.push_str(&format!("{}({})", f, all.join(", ")));
            }
            Target::Iface(m, _) => {
                let mut all = vec!["_r.interface".to_string()];
                all.extend(plain_args.iter().map(|s| s.to_string()));
                w.push_str(&format!("_r.{}({})", m, all.join(", ")));
            }
        }
        w.push_str(";\n");
        cdd.il -= 1;
        cdd.indent(w);
        w.push_str("}\n");

        for a in &argv {
            cdd.indent(w);
            w.push_str(&format!(
                "{} {} = {};\n",
                a.base,
                place_decl(&a.l, &a.dims),
                a.r
            ));
        }

        cdd.indent(w);
        let names: Vec<&str> = argv.iter().map(|a| a.l.as_str()).collect();
        w.push_str(&format!("GOWAIT(wrap({}));\n", names.join(", ")));

        cdd.il -= 1;
        cdd.indent(w);
        w.push_str("}\n");
        Ok(())
    }
}
