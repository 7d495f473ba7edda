//! Expression translation
//!
//! Every function here appends a C expression to the caller's buffer. The
//! contract: the emitted text has the printed type of the node's static type.
//! The one deliberate exception is interface boxing, inserted by
//! `iface_expr` wherever an interface is expected and the expression is not
//! one.
//!
//! The *hint* argument only matters for untyped constants and `nil`; it never
//! changes the translation of an already-typed expression.

use std::rc::Rc;

use super::cdd::{Cdd, RefKey};
use super::conval::write_value;
use super::ctype::place_decl;
use super::mangle::upath;
use super::package::Translator;
use crate::ast::{
    Builtin, CompositeElem, CompositeKey, ConstValue, Expr, ExprKind, ObjKind, Selection, SelKind,
    Span, UnOp,
};
use crate::ast::BinOp;
use crate::errors::{Result, TranslateError};
use crate::types::{size_align, BasicKind, Signature, Type};

impl Translator {
    /// Translate one expression into `w`
    pub(crate) fn expr(
        &mut self,
        cdd: &mut Cdd,
        w: &mut String,
        e: &Expr,
        hint: Option<&Rc<Type>>,
    ) -> Result<()> {
        cdd.complexity += 1;

        if let Some(v) = &e.konst {
            if matches!(v, ConstValue::Nil) {
                let t = hint.unwrap_or(&e.ty).clone();
                w.push_str(&self.nil_value(cdd, &t)?);
            } else {
                let t = if matches!(&*e.ty, Type::Basic(BasicKind::UntypedNil)) {
                    hint.unwrap_or(&e.ty)
                } else {
                    &e.ty
                };
                write_value(w, v, t);
            }
            return Ok(());
        }

        match &e.kind {
            ExprKind::Ident(obj) => self.name(cdd, w, obj, true),

            ExprKind::Nil => {
                let t = hint.unwrap_or(&e.ty).clone();
                w.push_str(&self.nil_value(cdd, &t)?);
                Ok(())
            }

            ExprKind::Binary { op, lhs, rhs } => self.binary(cdd, w, *op, lhs, rhs),

            ExprKind::Unary { op, operand } => match op {
                UnOp::Recv => self.recv_expr(cdd, w, e, operand),
                _ => {
                    let c = match op {
                        UnOp::Neg => "-",
                        UnOp::Not => "!",
                        UnOp::BitNot => "~",
                        UnOp::Addr => "&",
                        UnOp::Recv => unreachable!(),
                    };
                    w.push_str(c);
                    self.expr(cdd, w, operand, None)
                }
            },

            ExprKind::Star(x) => {
                w.push('*');
                self.expr(cdd, w, x, None)
            }

            ExprKind::Paren(x) => {
                w.push('(');
                self.expr(cdd, w, x, hint)?;
                w.push(')');
                Ok(())
            }

            ExprKind::Call { fun, args } => self.call(cdd, w, fun, args, e.span),

            ExprKind::Index { x, index } => self.index_expr(cdd, w, x, index, e.span),

            ExprKind::Slice { x, low, high, max } => {
                self.slice_expr(cdd, w, x, low.as_deref(), high.as_deref(), max.as_deref(), e.span)
            }

            ExprKind::Selector { x, sel } => match sel.kind {
                SelKind::FieldVal => self.selector_field(cdd, w, x, &sel.path),
                SelKind::MethodExpr => self.name(cdd, w, &sel.obj, true),
                SelKind::MethodVal => self.method_value(cdd, w, x, sel),
            },

            ExprKind::Composite { elems } => self.composite(cdd, w, &e.ty, elems, e.span),

            ExprKind::FuncLit { sig, body } => {
                let fname = format!("func${}", self.unique_id());
                let def = self.nested_func_def(cdd, &fname, sig, body)?;
                cdd.pre_stmts.push(def);
                w.push_str(&fname);
                Ok(())
            }

            ExprKind::TypeRef(t) => Err(TranslateError::violation(
                format!("type {} used as a value", t),
                e.span,
            )),

            ExprKind::TypeAssert { .. } => {
                Err(TranslateError::unsupported("type assertion", e.span))
            }
        }
    }

    /// Translate into a fresh string
    pub(crate) fn expr_str(
        &mut self,
        cdd: &mut Cdd,
        e: &Expr,
        hint: Option<&Rc<Type>>,
    ) -> Result<String> {
        let mut buf = String::new();
        self.expr(cdd, &mut buf, e, hint)?;
        Ok(buf)
    }

    // ========================================================================
    // Interface boxing
    // ========================================================================

    /// Emit `e` where a value of type `target` is expected, boxing into an
    /// interface when the target asks for one
    pub(crate) fn iface_expr(
        &mut self,
        cdd: &mut Cdd,
        w: &mut String,
        e: &Expr,
        target: Option<&Rc<Type>>,
    ) -> Result<()> {
        let t = match target {
            Some(t) if t.is_interface() => t.clone(),
            _ => return self.expr(cdd, w, e, target),
        };
        if matches!(e.kind, ExprKind::Nil) || matches!(e.konst, Some(ConstValue::Nil)) {
            w.push_str(&self.nil_value(cdd, &t)?);
            return Ok(());
        }
        if e.ty.is_interface() {
            return self.rebox(cdd, w, e, &t);
        }
        self.box_value(cdd, w, e, &t)
    }

    pub(crate) fn iface_expr_str(
        &mut self,
        cdd: &mut Cdd,
        e: &Expr,
        target: Option<&Rc<Type>>,
    ) -> Result<String> {
        let mut buf = String::new();
        self.iface_expr(cdd, &mut buf, e, target)?;
        Ok(buf)
    }

    /// Box a concrete value into an interface
    fn box_value(&mut self, cdd: &mut Cdd, w: &mut String, e: &Expr, iface: &Rc<Type>) -> Result<()> {
        let (size, _) = size_align(&e.ty, self.cfg().ptr_size);
        if size > self.cfg().ptr_size {
            let ty = format!("{}", e.ty);
            return Err(TranslateError::TooLargeForInterface { ty, span: e.span });
        }
        let (base, dims) = self.type_dims(cdd, &e.ty, false)?;
        let tid = self.type_id(&base, &dims);
        let methods = match iface.underlying() {
            Type::Interface(ms) => ms.clone(),
            _ => unreachable!("iface_expr checked the target"),
        };
        if methods.is_empty() {
            w.push_str("INTERFACE(");
            self.expr(cdd, w, e, None)?;
            w.push_str(&format!(", 0x{:x})", tid));
            return Ok(());
        }
        // Struct literal: the box plus one method pointer per slot
        let tn = self.recv_type_name(e)?;
        let ibase = self.type_str(cdd, iface, true)?;
        w.push_str(&format!("(({}){{.interface = INTERFACE(", ibase));
        self.expr(cdd, w, e, None)?;
        w.push_str(&format!(", 0x{:x})", tid));
        for m in &methods {
            let mangled = format!("{}${}${}", upath(&tn.pkg), tn.name, m.name);
            if tn.pkg != self.cur_pkg() {
                cdd.add_ref(
                    RefKey::new(tn.pkg.clone(), format!("{}.{}", tn.name, m.name)),
                    true,
                );
            } else {
                cdd.add_local(mangled.clone());
            }
            w.push_str(&format!(", .{} = &{}", m.name, mangled));
        }
        w.push_str("})");
        Ok(())
    }

    /// The named type whose method set satisfies the interface `e` is being
    /// boxed into
    fn recv_type_name(&self, e: &Expr) -> Result<crate::types::TypeName> {
        let mut t = e.ty.clone();
        if let Type::Pointer(elem) = &*t {
            t = elem.clone();
        }
        match &*t {
            Type::Named { name, .. } => Ok(name.clone()),
            _ => Err(TranslateError::violation(
                format!("cannot box unnamed type {} into a non-empty interface", e.ty),
                e.span,
            )),
        }
    }

    /// Convert between interface types: copy the box, rewire method slots
    fn rebox(&mut self, cdd: &mut Cdd, w: &mut String, e: &Expr, target: &Rc<Type>) -> Result<()> {
        let src = self.type_str(cdd, &e.ty, true)?;
        let dst = self.type_str(cdd, target, true)?;
        if src == dst {
            return self.expr(cdd, w, e, None);
        }
        let tgt_methods = match target.underlying() {
            Type::Interface(ms) => ms.clone(),
            _ => unreachable!(),
        };
        let src_empty = matches!(e.ty.underlying(), Type::Interface(ms) if ms.is_empty());
        if tgt_methods.is_empty() {
            // Down to the empty interface: keep the box, drop the slots
            if src_empty {
                return self.expr(cdd, w, e, None);
            }
            self.expr(cdd, w, e, None)?;
            w.push_str(".interface");
            return Ok(());
        }
        if src_empty {
            return Err(TranslateError::violation(
                "conversion from empty interface requires a type assertion",
                e.span,
            ));
        }
        // Materialise so every slot reads the same source value
        if let Some(obj) = e.ident_obj() {
            let rs = self.name_str(cdd, obj, true)?;
            w.push_str(&format!("(({}){{.interface = {}.interface", dst, rs));
            for m in &tgt_methods {
                w.push_str(&format!(", .{} = {}.{}", m.name, rs, m.name));
            }
            w.push_str("})");
        } else {
            let tmp = format!("tmp${}", self.unique_id());
            w.push_str(&format!("({{ {} {} = ", src, tmp));
            self.expr(cdd, w, e, None)?;
            w.push_str(&format!("; (({}){{.interface = {}.interface", dst, tmp));
            for m in &tgt_methods {
                w.push_str(&format!(", .{} = {}.{}", m.name, tmp, m.name));
            }
            w.push_str("}); })");
        }
        Ok(())
    }

    /// `nil` spelled for a target type
    pub(crate) fn nil_value(&mut self, cdd: &mut Cdd, t: &Rc<Type>) -> Result<String> {
        Ok(match t.underlying() {
            Type::Slice(_) => "NILSLICE".to_string(),
            Type::Map(_, _) => "NILMAP".to_string(),
            Type::Chan(_, _) => "NILCHAN".to_string(),
            Type::Interface(ms) if ms.is_empty() => "NILI".to_string(),
            Type::Interface(_) => {
                let base = self.type_str(cdd, t, true)?;
                format!("(({}){{NILI}})", base)
            }
            _ => "nil".to_string(),
        })
    }

    // ========================================================================
    // Operators
    // ========================================================================

    fn binary(
        &mut self,
        cdd: &mut Cdd,
        w: &mut String,
        op: BinOp,
        lhs: &Expr,
        rhs: &Expr,
    ) -> Result<()> {
        if matches!(op, BinOp::Eq | BinOp::Ne) {
            if let Some(()) = self.special_eq(cdd, w, op, lhs, rhs)? {
                return Ok(());
            }
        }
        w.push('(');
        let (lh, rh) = operand_hints(lhs, rhs);
        self.expr(cdd, w, lhs, lh)?;
        w.push_str(op.c_op());
        self.expr(cdd, w, rhs, rh)?;
        w.push(')');
        Ok(())
    }

    /// Equality over interfaces, strings and slices dispatches to helpers;
    /// returns `Some(())` when it produced the whole expression.
    fn special_eq(
        &mut self,
        cdd: &mut Cdd,
        w: &mut String,
        op: BinOp,
        lhs: &Expr,
        rhs: &Expr,
    ) -> Result<Option<()>> {
        let neg = op == BinOp::Ne;
        // Type the comparison by whichever side is not a bare nil
        let ty = if matches!(lhs.kind, ExprKind::Nil) {
            rhs.ty.clone()
        } else {
            lhs.ty.clone()
        };
        match ty.underlying() {
            Type::Interface(ms) => {
                let empty = ms.is_empty();
                if neg {
                    w.push('!');
                }
                w.push_str("EQUALI(");
                self.eq_iface_operand(cdd, w, lhs, &ty, empty)?;
                w.push_str(", ");
                self.eq_iface_operand(cdd, w, rhs, &ty, empty)?;
                w.push(')');
                Ok(Some(()))
            }
            Type::Basic(BasicKind::Str) => {
                if neg {
                    w.push('!');
                }
                w.push_str("equals(");
                self.expr(cdd, w, lhs, None)?;
                w.push_str(", ");
                self.expr(cdd, w, rhs, None)?;
                w.push(')');
                Ok(Some(()))
            }
            Type::Slice(_) => {
                // Only comparison against nil is defined; it tests the array
                // pointer
                let (sl, _nil) = if matches!(lhs.kind, ExprKind::Nil)
                    || matches!(lhs.konst, Some(ConstValue::Nil))
                {
                    (rhs, lhs)
                } else {
                    (lhs, rhs)
                };
                w.push('(');
                self.expr(cdd, w, sl, None)?;
                w.push_str(if neg { ".arr != nil)" } else { ".arr == nil)" });
                Ok(Some(()))
            }
            _ => Ok(None),
        }
    }

    fn eq_iface_operand(
        &mut self,
        cdd: &mut Cdd,
        w: &mut String,
        e: &Expr,
        ty: &Rc<Type>,
        empty: bool,
    ) -> Result<()> {
        if matches!(e.kind, ExprKind::Nil) || matches!(e.konst, Some(ConstValue::Nil)) {
            w.push_str("NILI");
            return Ok(());
        }
        if !e.ty.is_interface() {
            // Box the concrete side down to a bare box value
            let (base, dims) = self.type_dims(cdd, &e.ty, false)?;
            let tid = self.type_id(&base, &dims);
            w.push_str("INTERFACE(");
            self.expr(cdd, w, e, None)?;
            w.push_str(&format!(", 0x{:x})", tid));
            return Ok(());
        }
        self.expr(cdd, w, e, Some(ty))?;
        if !empty {
            w.push_str(".interface");
        }
        Ok(())
    }

    /// `<-ch`: a plain receive or, when the result is a pair, a receive with
    /// the ok flag
    fn recv_expr(&mut self, cdd: &mut Cdd, w: &mut String, e: &Expr, chan: &Expr) -> Result<()> {
        let elem = chan
            .ty
            .elem()
            .cloned()
            .ok_or_else(|| TranslateError::violation("receive from non-channel", e.span))?;
        if let Type::Tuple(elems) = &*e.ty {
            let tup = self.tuple_name(cdd, elems, None)?;
            w.push_str(&format!("RECVOK({}, ", tup));
            self.expr(cdd, w, chan, None)?;
            w.push(')');
        } else {
            let ts = self.type_str(cdd, &elem, true)?;
            let zero = self.zero_val(cdd, &elem)?;
            w.push_str(&format!("RECV({}, ", ts));
            self.expr(cdd, w, chan, None)?;
            w.push_str(&format!(", {})", zero));
        }
        Ok(())
    }

    // ========================================================================
    // Indexing and slicing
    // ========================================================================

    fn index_expr(
        &mut self,
        cdd: &mut Cdd,
        w: &mut String,
        x: &Expr,
        index: &Expr,
        span: Span,
    ) -> Result<()> {
        let mut ty = x.ty.clone();
        let mut xtext = self.expr_str(cdd, x, None)?;
        if matches!(ty.underlying(), Type::Pointer(_)) {
            xtext = format!("(*{})", xtext);
            ty = ty.elem().cloned().unwrap();
        }

        match ty.underlying() {
            Type::Basic(BasicKind::Str) => {
                w.push_str(&xtext);
                w.push_str(".str");
            }
            Type::Slice(elem) => {
                let elem = elem.clone();
                let (base, mut dims) = self.type_dims(cdd, &elem, false)?;
                dims.insert(0, "*".to_string());
                w.push_str(&format!(
                    "(({}{}){}.arr)",
                    base,
                    place_decl("", &dims),
                    xtext
                ));
            }
            Type::Array(_, _) => {
                w.push_str(&xtext);
            }
            Type::Map(_, v) => {
                let v = v.clone();
                let vs = self.type_str(cdd, &v, true)?;
                w.push_str(&format!("MAPGET({}, {}, ", vs, xtext));
                self.expr(cdd, w, index, None)?;
                w.push(')');
                return Ok(());
            }
            _ => return Err(TranslateError::unsupported("indexing this type", span)),
        }

        w.push('[');
        self.expr(cdd, w, index, None)?;
        w.push(']');
        Ok(())
    }

    fn slice_expr(
        &mut self,
        cdd: &mut Cdd,
        w: &mut String,
        x: &Expr,
        low: Option<&Expr>,
        high: Option<&Expr>,
        max: Option<&Expr>,
        span: Span,
    ) -> Result<()> {
        let mut sex = self.expr_str(cdd, x, None)?;
        let mut ty = x.ty.clone();
        if matches!(ty.underlying(), Type::Pointer(_)) {
            ty = ty.elem().cloned().unwrap();
            sex = format!("(*{})", sex);
        }

        let suffix = |l: bool, h: bool, m: bool| {
            let mut s = String::new();
            if l {
                s.push('L');
            }
            if h {
                s.push('H');
            }
            if m {
                s.push('M');
            }
            s
        };
        let (l, h, m) = (low.is_some(), high.is_some(), max.is_some());

        match ty.underlying() {
            Type::Slice(elem) => {
                if !l && !h && !m {
                    w.push_str(&sex);
                    return Ok(());
                }
                let elem = elem.clone();
                w.push_str(&format!("SLICE{}({}", suffix(l, h, m), sex));
                if l {
                    // The element pointer type feeds the macro's arithmetic
                    let (base, mut dims) = self.type_dims(cdd, &elem, false)?;
                    dims.insert(0, "*".to_string());
                    w.push_str(&format!(", {}{}", base, place_decl("", &dims)));
                }
            }
            Type::Array(_, _) => {
                w.push_str(&format!("ASLICE{}({}", suffix(l, h, m), sex));
            }
            Type::Basic(BasicKind::Str) => {
                if m {
                    return Err(TranslateError::unsupported(
                        "full slice expression on a string",
                        span,
                    ));
                }
                if !l && !h {
                    w.push_str(&sex);
                    return Ok(());
                }
                w.push_str(&format!("SSLICE{}({}", suffix(l, h, false), sex));
            }
            _ => return Err(TranslateError::unsupported("slicing this type", span)),
        }

        for part in [low, high, max].into_iter().flatten() {
            w.push_str(", ");
            self.expr(cdd, w, part, None)?;
        }
        w.push(')');
        Ok(())
    }

    // ========================================================================
    // Composite literals
    // ========================================================================

    fn composite(
        &mut self,
        cdd: &mut Cdd,
        w: &mut String,
        ty: &Rc<Type>,
        elems: &[CompositeElem],
        span: Span,
    ) -> Result<()> {
        match ty.underlying() {
            Type::Array(_, elem) => {
                let elem = elem.clone();
                w.push('{');
                for (i, el) in elems.iter().enumerate() {
                    if i > 0 {
                        w.push_str(", ");
                    }
                    if let Some(CompositeKey::Expr(k)) = &el.key {
                        w.push('[');
                        self.expr(cdd, w, k, None)?;
                        w.push_str("] = ");
                    }
                    self.iface_expr(cdd, w, &el.value, Some(&elem))?;
                }
                w.push('}');
                Ok(())
            }

            Type::Slice(elem) => {
                let elem = elem.clone();
                let (base, mut dims) = self.type_dims(cdd, &elem, true)?;
                dims.insert(0, "[]".to_string());
                w.push_str(&format!("(slice){{({}{}){{", base, place_decl("", &dims)));
                for (i, el) in elems.iter().enumerate() {
                    if i > 0 {
                        w.push_str(", ");
                    }
                    if let Some(CompositeKey::Expr(k)) = &el.key {
                        w.push('[');
                        self.expr(cdd, w, k, None)?;
                        w.push_str("] = ");
                    }
                    self.iface_expr(cdd, w, &el.value, Some(&elem))?;
                }
                let n = elems.len();
                w.push_str(&format!("}}, {}, {}}}", n, n));
                Ok(())
            }

            Type::Struct(fields) => {
                let fields = fields.clone();
                let base = self.type_str(cdd, ty, true)?;
                w.push_str(&format!("({}){{", base));
                for (i, el) in elems.iter().enumerate() {
                    if i > 0 {
                        w.push_str(", ");
                    }
                    let fty = match &el.key {
                        Some(CompositeKey::Field(name)) => {
                            w.push_str(&format!(".{} = ", name));
                            fields
                                .iter()
                                .find(|f| &f.name == name)
                                .map(|f| f.ty.clone())
                                .ok_or_else(|| {
                                    TranslateError::violation(
                                        format!("unknown field {} in composite literal", name),
                                        span,
                                    )
                                })?
                        }
                        Some(CompositeKey::Expr(_)) => {
                            return Err(TranslateError::violation(
                                "index key in struct literal",
                                span,
                            ))
                        }
                        None => fields
                            .get(i)
                            .map(|f| f.ty.clone())
                            .ok_or_else(|| {
                                TranslateError::violation("too many composite elements", span)
                            })?,
                    };
                    self.iface_expr(cdd, w, &el.value, Some(&fty))?;
                }
                w.push('}');
                Ok(())
            }

            Type::Map(_, _) => Err(TranslateError::unsupported("map composite literal", span)),

            _ => Err(TranslateError::violation(
                format!("composite literal of type {}", ty),
                span,
            )),
        }
    }

    // ========================================================================
    // Selectors
    // ========================================================================

    /// Field access: walk the selection chain, inserting `.` or `->` per step
    pub(crate) fn selector_field(
        &mut self,
        cdd: &mut Cdd,
        w: &mut String,
        x: &Expr,
        path: &[usize],
    ) -> Result<()> {
        self.expr(cdd, w, x, None)?;
        self.walk_path(w, &x.ty, path, x.span)?;
        Ok(())
    }

    /// Append the `.f`/`->f` chain for `path`, returning the final field type
    fn walk_path(
        &mut self,
        w: &mut String,
        start: &Rc<Type>,
        path: &[usize],
        span: Span,
    ) -> Result<Rc<Type>> {
        let mut cur = start.clone();
        for &i in path {
            let mut sep = '.';
            let mut t = cur.clone();
            if let Type::Pointer(elem) = cur.underlying() {
                sep = '>';
                t = elem.clone();
            }
            let fields = match t.underlying() {
                Type::Struct(fs) => fs.clone(),
                other => {
                    return Err(TranslateError::violation(
                        format!("selection step through non-struct {}", other),
                        span,
                    ))
                }
            };
            let f = fields.get(i).ok_or_else(|| {
                TranslateError::violation("selection index out of range", span)
            })?;
            if sep == '>' {
                w.push_str("->");
            } else {
                w.push('.');
            }
            w.push_str(&f.name);
            cur = f.ty.clone();
        }
        Ok(cur)
    }

    /// A bound method value: hoist a nested forwarder that captures the
    /// receiver, then name it
    fn method_value(&mut self, cdd: &mut Cdd, w: &mut String, x: &Expr, sel: &Selection) -> Result<()> {
        let sig = sel
            .obj
            .sig()
            .cloned()
            .ok_or_else(|| TranslateError::violation("method value without signature", x.span))?;
        let n = self.unique_id();
        let recv_name = format!("recv${}", n);
        let fname = format!("mval${}", n);

        let recv = self.receiver_text(cdd, x, &sel.path, &sig)?;
        let mut pre = String::new();
        cdd.indent(&mut pre);
        pre.push_str(&format!("{} {} = {};\n", recv.ty_str, recv_name, recv.text));

        // Forwarder with the method's own parameter list
        let (rb, rdims) = self.result_dims(cdd, &sig)?;
        let mut params = Vec::new();
        let mut argnames = Vec::new();
        for (i, p) in sig.params.iter().enumerate() {
            let (pb, pdims) = self.type_dims(cdd, &p.ty, true)?;
            let an = format!("_{}", i);
            params.push(format!("{} {}", pb, place_decl(&an, &pdims)));
            argnames.push(an);
        }
        let ptext = if params.is_empty() {
            "void".to_string()
        } else {
            params.join(", ")
        };
        cdd.indent(&mut pre);
        let decl = place_decl(&format!("{}({})", fname, ptext), &rdims);
        pre.push_str(&format!("{} {} {{ ", rb, decl));
        if !sig.results.is_empty() {
            pre.push_str("return ");
        }
        match recv.call {
            ReceiverCall::Concrete => {
                let m = self.name_str(cdd, &sel.obj, true)?;
                pre.push_str(&format!("{}({}", m, recv_name));
            }
            ReceiverCall::Interface => {
                pre.push_str(&format!(
                    "{}.{}({}.interface",
                    recv_name, sel.obj.name, recv_name
                ));
            }
        }
        for a in &argnames {
            pre.push_str(&format!(", {}", a));
        }
        pre.push_str("); }\n");
        cdd.pre_stmts.push(pre);
        w.push_str(&fname);
        Ok(())
    }

    /// Compute the receiver of a method use: its C text after `&`/`*`
    /// adjustment, its printed type, and how the call must be spelled
    pub(crate) fn receiver_text(
        &mut self,
        cdd: &mut Cdd,
        x: &Expr,
        path: &[usize],
        sig: &Rc<Signature>,
    ) -> Result<Receiver> {
        // Walk embedded fields down to the declared receiver
        let mut text = self.expr_str(cdd, x, None)?;
        let mut buf = String::new();
        let cur = self.walk_path(&mut buf, &x.ty, path, x.span)?;
        text.push_str(&buf);

        if cur.is_interface() {
            // Interface receivers carry the method slot themselves
            return Ok(Receiver {
                text,
                ty_str: self.type_str(cdd, &cur, true)?,
                ty: cur,
                call: ReceiverCall::Interface,
            });
        }

        let recv_ty = sig
            .recv
            .clone()
            .ok_or_else(|| TranslateError::violation("method without receiver", x.span))?;
        let want_ptr = matches!(&*recv_ty, Type::Pointer(_));
        let have_ptr = matches!(cur.underlying(), Type::Pointer(_));
        let (text, ty) = match (want_ptr, have_ptr) {
            (true, false) => (format!("&{}", text), Type::pointer(cur)),
            (false, true) => (format!("(*{})", text), cur.elem().cloned().unwrap()),
            _ => (text, cur),
        };
        Ok(Receiver {
            text,
            ty_str: self.type_str(cdd, &ty, true)?,
            ty,
            call: ReceiverCall::Concrete,
        })
    }

    // ========================================================================
    // Calls
    // ========================================================================

    pub(crate) fn call(
        &mut self,
        cdd: &mut Cdd,
        w: &mut String,
        fun: &Expr,
        args: &[Expr],
        span: Span,
    ) -> Result<()> {
        // Conversions look like calls with a type as the callee
        let conv_ty = match &fun.kind {
            ExprKind::TypeRef(t) => Some(t.clone()),
            ExprKind::Ident(obj) if matches!(obj.kind, ObjKind::TypeName) => Some(obj.ty.clone()),
            _ => None,
        };
        if let Some(t) = conv_ty {
            let arg = args.first().ok_or_else(|| {
                TranslateError::violation("conversion without operand", span)
            })?;
            return self.conversion(cdd, w, &t, arg);
        }

        match &fun.kind {
            ExprKind::Ident(obj) => {
                if let ObjKind::Builtin(b) = obj.kind {
                    return self.builtin(cdd, w, b, args, span);
                }
                self.name(cdd, w, obj, true)?;
                let sig = self.callee_sig(fun)?;
                self.arg_list(cdd, w, None, args, &sig)
            }

            ExprKind::Selector { x, sel } => match sel.kind {
                SelKind::MethodExpr => {
                    self.name(cdd, w, &sel.obj, true)?;
                    let sig = self.callee_sig(fun)?;
                    self.arg_list(cdd, w, None, args, &sig)
                }
                SelKind::MethodVal => {
                    let sig = sel.obj.sig().cloned().ok_or_else(|| {
                        TranslateError::violation("method call without signature", span)
                    })?;
                    let recv = self.receiver_text(cdd, x, &sel.path, &sig)?;
                    match recv.call {
                        ReceiverCall::Concrete => {
                            self.name(cdd, w, &sel.obj, true)?;
                            self.arg_list(cdd, w, Some(recv.text), args, &sig)
                        }
                        ReceiverCall::Interface => {
                            self.iface_call(cdd, w, &recv, &sel.obj.name, args, &sig)
                        }
                    }
                }
                SelKind::FieldVal => {
                    let sig = self.callee_sig(fun)?;
                    self.selector_field(cdd, w, x, &sel.path)?;
                    self.arg_list(cdd, w, None, args, &sig)
                }
            },

            _ => {
                let sig = self.callee_sig(fun)?;
                self.expr(cdd, w, fun, None)?;
                self.arg_list(cdd, w, None, args, &sig)
            }
        }
    }

    fn callee_sig(&self, fun: &Expr) -> Result<Rc<Signature>> {
        match fun.ty.underlying() {
            Type::Signature(sig) => Ok(sig.clone()),
            other => Err(TranslateError::violation(
                format!("call of non-function type {}", other),
                fun.span,
            )),
        }
    }

    /// Method call through an interface slot: the receiver feeds both the
    /// slot lookup and the first argument, so anything non-trivial is
    /// materialised first.
    fn iface_call(
        &mut self,
        cdd: &mut Cdd,
        w: &mut String,
        recv: &Receiver,
        mname: &str,
        args: &[Expr],
        sig: &Rc<Signature>,
    ) -> Result<()> {
        if trivial_receiver(&recv.text) {
            w.push_str(&format!("{}.{}({}.interface", recv.text, mname, recv.text));
            for (i, a) in args.iter().enumerate() {
                w.push_str(", ");
                let hint = sig.params.get(i).map(|p| p.ty.clone());
                self.iface_expr(cdd, w, a, hint.as_ref())?;
            }
            w.push(')');
            return Ok(());
        }
        let tmp = format!("tmp${}", self.unique_id());
        w.push_str(&format!("({{ {} {} = {}; ", recv.ty_str, tmp, recv.text));
        w.push_str(&format!("{}.{}({}.interface", tmp, mname, tmp));
        for (i, a) in args.iter().enumerate() {
            w.push_str(", ");
            let hint = sig.params.get(i).map(|p| p.ty.clone());
            self.iface_expr(cdd, w, a, hint.as_ref())?;
        }
        w.push_str("); })");
        Ok(())
    }

    /// Emit `(recv?, args…)` with parameter-typed hints so boxing happens at
    /// the call boundary; variadic tails are wrapped into a slice.
    fn arg_list(
        &mut self,
        cdd: &mut Cdd,
        w: &mut String,
        recv: Option<String>,
        args: &[Expr],
        sig: &Rc<Signature>,
    ) -> Result<()> {
        w.push('(');
        let mut first = true;
        if let Some(r) = recv {
            w.push_str(&r);
            first = false;
        }

        let fixed = if sig.variadic {
            sig.params.len().saturating_sub(1)
        } else {
            sig.params.len()
        };

        for (i, a) in args.iter().enumerate().take(fixed.min(args.len())) {
            if !first {
                w.push_str(", ");
            }
            first = false;
            let hint = sig.params.get(i).map(|p| p.ty.clone());
            self.iface_expr(cdd, w, a, hint.as_ref())?;
        }

        if sig.variadic {
            let tail = &args[fixed.min(args.len())..];
            let slice_ty = sig.params.last().map(|p| p.ty.clone());
            let passthrough = tail.len() == 1
                && slice_ty
                    .as_ref()
                    .map(|t| matches!(tail[0].ty.underlying(), Type::Slice(_)) && matches!(t.underlying(), Type::Slice(_)))
                    .unwrap_or(false);
            if !first {
                w.push_str(", ");
            }
            if passthrough {
                self.expr(cdd, w, &tail[0], slice_ty.as_ref())?;
            } else if tail.is_empty() {
                w.push_str("NILSLICE");
            } else {
                let elem = slice_ty
                    .as_ref()
                    .and_then(|t| t.elem().cloned())
                    .ok_or_else(|| {
                        TranslateError::violation("variadic parameter is not a slice", Span::default())
                    })?;
                let (base, mut dims) = self.type_dims(cdd, &elem, true)?;
                dims.insert(0, "[]".to_string());
                w.push_str(&format!("(slice){{({}{}){{", base, place_decl("", &dims)));
                for (i, a) in tail.iter().enumerate() {
                    if i > 0 {
                        w.push_str(", ");
                    }
                    self.iface_expr(cdd, w, a, Some(&elem))?;
                }
                w.push_str(&format!("}}, {}, {}}}", tail.len(), tail.len()));
            }
        }
        w.push(')');
        Ok(())
    }

    fn conversion(&mut self, cdd: &mut Cdd, w: &mut String, target: &Rc<Type>, arg: &Expr) -> Result<()> {
        // []byte(s) and friends go through the runtime
        if matches!(target.underlying(), Type::Slice(_))
            && matches!(arg.ty.underlying(), Type::Basic(BasicKind::Str))
        {
            w.push_str("NEWSTR(");
            self.expr(cdd, w, arg, None)?;
            w.push(')');
            return Ok(());
        }
        if target.is_interface() {
            return self.iface_expr(cdd, w, arg, Some(target));
        }
        let ts = self.type_str(cdd, target, false)?;
        w.push_str(&format!("(({})(", ts));
        self.expr(cdd, w, arg, Some(target))?;
        w.push_str("))");
        Ok(())
    }

    // ========================================================================
    // Builtins
    // ========================================================================

    fn builtin(
        &mut self,
        cdd: &mut Cdd,
        w: &mut String,
        b: Builtin,
        args: &[Expr],
        span: Span,
    ) -> Result<()> {
        match b {
            Builtin::Len | Builtin::Cap => {
                let x = args
                    .first()
                    .ok_or_else(|| TranslateError::violation("len/cap without operand", span))?;
                match x.ty.underlying() {
                    Type::Array(n, _) => {
                        // Compile-time constant
                        w.push_str(&format!("{}", n));
                        return Ok(());
                    }
                    Type::Chan(_, _) => {
                        w.push_str(if b == Builtin::Len { "clen(" } else { "ccap(" });
                    }
                    _ => {
                        w.push_str(if b == Builtin::Len { "len(" } else { "cap(" });
                    }
                }
                self.expr(cdd, w, x, None)?;
                w.push(')');
                Ok(())
            }

            Builtin::Copy => {
                let (dst, src) = match args {
                    [d, s] => (d, s),
                    _ => return Err(TranslateError::violation("copy arity", span)),
                };
                match src.ty.underlying() {
                    Type::Basic(BasicKind::Str) => {
                        w.push_str("STRCPY(");
                        self.expr(cdd, w, dst, None)?;
                        w.push_str(", ");
                        self.expr(cdd, w, src, None)?;
                        w.push(')');
                    }
                    Type::Slice(elem) => {
                        let elem = elem.clone();
                        let ts = self.type_str(cdd, &elem, false)?;
                        w.push_str(&format!("SLICPY({}, ", ts));
                        self.expr(cdd, w, dst, None)?;
                        w.push_str(", ");
                        self.expr(cdd, w, src, None)?;
                        w.push(')');
                    }
                    other => {
                        return Err(TranslateError::violation(
                            format!("copy from {}", other),
                            span,
                        ))
                    }
                }
                Ok(())
            }

            Builtin::New => {
                let t = builtin_type_arg(args, span)?;
                let ts = self.type_str(cdd, &t, true)?;
                w.push_str(&format!("NEW({})", ts));
                Ok(())
            }

            Builtin::Make => {
                let t = builtin_type_arg(args, span)?;
                let extra = &args[1..];
                match t.underlying() {
                    Type::Slice(elem) => {
                        let elem = elem.clone();
                        let ts = self.type_str(cdd, &elem, true)?;
                        match extra {
                            [n] => {
                                w.push_str(&format!("MAKESLI({}, ", ts));
                                self.expr(cdd, w, n, None)?;
                                w.push(')');
                            }
                            [n, c] => {
                                w.push_str(&format!("MAKESLIC({}, ", ts));
                                self.expr(cdd, w, n, None)?;
                                w.push_str(", ");
                                self.expr(cdd, w, c, None)?;
                                w.push(')');
                            }
                            _ => return Err(TranslateError::violation("make slice arity", span)),
                        }
                    }
                    Type::Map(k, v) => {
                        let (k, v) = (k.clone(), v.clone());
                        let ks = self.type_str(cdd, &k, true)?;
                        let vs = self.type_str(cdd, &v, true)?;
                        match extra {
                            [] => w.push_str(&format!("MAKEMAP({}, {})", ks, vs)),
                            [n] => {
                                w.push_str(&format!("MAKEMAPC({}, {}, ", ks, vs));
                                self.expr(cdd, w, n, None)?;
                                w.push(')');
                            }
                            _ => return Err(TranslateError::violation("make map arity", span)),
                        }
                    }
                    Type::Chan(_, elem) => {
                        let elem = elem.clone();
                        let ts = self.type_str(cdd, &elem, true)?;
                        match extra {
                            [] => w.push_str(&format!("MAKECHAN({})", ts)),
                            [n] => {
                                w.push_str(&format!("MAKECHAN({}, ", ts));
                                self.expr(cdd, w, n, None)?;
                                w.push(')');
                            }
                            _ => return Err(TranslateError::violation("make chan arity", span)),
                        }
                    }
                    other => {
                        return Err(TranslateError::violation(
                            format!("make of {}", other),
                            span,
                        ))
                    }
                }
                Ok(())
            }
        }
    }
}

fn builtin_type_arg(args: &[Expr], span: Span) -> Result<Rc<Type>> {
    match args.first().map(|a| &a.kind) {
        Some(ExprKind::TypeRef(t)) => Ok(t.clone()),
        _ => Err(TranslateError::violation(
            "builtin expects a type argument",
            span,
        )),
    }
}

/// Which side of a binary operator should type an untyped other side
fn operand_hints<'a>(lhs: &'a Expr, rhs: &'a Expr) -> (Option<&'a Rc<Type>>, Option<&'a Rc<Type>>) {
    let l_untyped = lhs.konst.is_some() || matches!(lhs.kind, ExprKind::Nil);
    let r_untyped = rhs.konst.is_some() || matches!(rhs.kind, ExprKind::Nil);
    match (l_untyped, r_untyped) {
        (true, false) => (Some(&rhs.ty), None),
        (false, true) => (None, Some(&lhs.ty)),
        _ => (None, None),
    }
}

/// How a method receiver reaches its method
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ReceiverCall {
    /// Call the mangled function, receiver as the first argument
    Concrete,
    /// Call through the interface record's slot
    Interface,
}

/// True when duplicating the text cannot double-evaluate anything
pub(crate) fn trivial_receiver(text: &str) -> bool {
    text.chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

/// A method receiver, adjusted per the receiver kind
pub(crate) struct Receiver {
    pub text: String,
    pub ty: Rc<Type>,
    pub ty_str: String,
    pub call: ReceiverCall,
}
