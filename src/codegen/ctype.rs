//! Type printing
//!
//! A type prints as a *(base, dims)* pair: `base` is a C type string and
//! `dims` is the ordered list of declarator suffixes that must be interleaved
//! with the declared name. `place_decl` does the interleaving, so the same
//! pair works in declarations, casts and compound literals:
//!
//! - `[3][4]int`    → base `int`,   dims `["[3]", "[4]"]`
//! - `*[3]int`      → base `int`,   dims `["*", "[3]"]`      → `int (*x)[3]`
//! - `func(int)int` → base `int`,   dims `["(*)", "(int)"]`  → `int (*x)(int)`
//! - `[]T`          → base `slice`, dims `[]`

use std::rc::Rc;

use super::cdd::{Cdd, RefKey};
use super::package::Translator;
use crate::errors::Result;
use crate::types::{BasicKind, Signature, Type};

/// Interleave a declared name with its dim suffixes, producing a C
/// declarator.
pub fn place_decl(name: &str, dims: &[String]) -> String {
    let mut decl = name.to_string();
    for d in dims {
        match d.as_str() {
            "*" => decl = format!("*{}", decl),
            "(*)" => decl = format!("(*{})", decl),
            _ => {
                // "[N]" and "(params)" bind tighter than a leading "*"
                if decl.starts_with('*') {
                    decl = format!("({}){}", decl, d);
                } else {
                    decl.push_str(d);
                }
            }
        }
    }
    decl
}

impl Translator {
    /// Print a type as its *(base, dims)* pair.
    ///
    /// `direct` says whether this use needs the full definition of any named
    /// type it mentions; printing through a pointer downgrades to
    /// declaration-only.
    pub(crate) fn type_dims(
        &mut self,
        cdd: &mut Cdd,
        t: &Rc<Type>,
        direct: bool,
    ) -> Result<(String, Vec<String>)> {
        match &**t {
            Type::Basic(k) => Ok((k.c_name().to_string(), Vec::new())),

            Type::Pointer(elem) => {
                let (base, mut dims) = self.type_dims(cdd, elem, false)?;
                dims.insert(0, "*".to_string());
                Ok((base, dims))
            }

            Type::Array(n, elem) => {
                let (base, mut dims) = self.type_dims(cdd, elem, direct)?;
                dims.insert(0, format!("[{}]", n));
                Ok((base, dims))
            }

            Type::Slice(_) => Ok(("slice".to_string(), Vec::new())),
            Type::Map(_, _) => Ok(("map".to_string(), Vec::new())),
            Type::Chan(_, _) => Ok(("chan".to_string(), Vec::new())),

            Type::Struct(fields) => {
                let mut body = String::from("struct {");
                for f in fields {
                    let (fb, fdims) = self.type_dims(cdd, &f.ty, true)?;
                    body.push_str(&format!(" {} {};", fb, place_decl(&f.name, &fdims)));
                }
                body.push_str(" }");
                Ok((body, Vec::new()))
            }

            Type::Interface(methods) => {
                if methods.is_empty() {
                    return Ok(("interface".to_string(), Vec::new()));
                }
                let mut body = String::from("struct { interface interface;");
                for m in methods {
                    let (rb, rdims) = self.result_dims(cdd, &m.sig)?;
                    let mut dims = vec!["(*)".to_string(), self.param_list(cdd, &m.sig, true)?];
                    dims.extend(rdims);
                    body.push_str(&format!(" {} {};", rb, place_decl(&m.name, &dims)));
                }
                body.push_str(" }");
                Ok((body, Vec::new()))
            }

            Type::Signature(sig) => {
                let (base, rdims) = self.result_dims(cdd, sig)?;
                let mut dims = vec!["(*)".to_string(), self.param_list(cdd, sig, false)?];
                dims.extend(rdims);
                Ok((base, dims))
            }

            Type::Named { name, .. } => {
                let mangled = format!("{}${}", super::mangle::upath(&name.pkg), name.name);
                if name.pkg != self.cur_pkg() {
                    cdd.add_ref(RefKey::new(name.pkg.clone(), name.name.clone()), direct);
                } else {
                    cdd.add_local(mangled.clone());
                }
                Ok((mangled, Vec::new()))
            }

            Type::Tuple(elems) => {
                let name = self.tuple_name(cdd, elems, None)?;
                Ok((name, Vec::new()))
            }
        }
    }

    /// The full printed type with no declared name (casts, macro arguments)
    pub(crate) fn type_str(&mut self, cdd: &mut Cdd, t: &Rc<Type>, direct: bool) -> Result<String> {
        let (base, dims) = self.type_dims(cdd, t, direct)?;
        Ok(format!("{}{}", base, place_decl("", &dims)))
    }

    /// Result part of a signature: void, a single type, or a tuple struct
    pub(crate) fn result_dims(
        &mut self,
        cdd: &mut Cdd,
        sig: &Signature,
    ) -> Result<(String, Vec<String>)> {
        match sig.results.len() {
            0 => Ok(("void".to_string(), Vec::new())),
            1 => self.type_dims(cdd, &sig.results[0].ty, true),
            _ => {
                let elems: Vec<Rc<Type>> = sig.results.iter().map(|r| r.ty.clone()).collect();
                Ok((self.tuple_name(cdd, &elems, None)?, Vec::new()))
            }
        }
    }

    /// Parameter list of a signature as a dim token, receiver elided; the
    /// interface variant prepends the boxed-value slot.
    pub(crate) fn param_list(
        &mut self,
        cdd: &mut Cdd,
        sig: &Signature,
        iface: bool,
    ) -> Result<String> {
        let mut parts = Vec::new();
        if iface {
            parts.push("interface".to_string());
        }
        for p in &sig.params {
            parts.push(self.type_str(cdd, &p.ty, true)?);
        }
        Ok(format!("({})", parts.join(", ")))
    }

    /// The C name of the tuple struct for a result list or receive pair.
    ///
    /// A function declaration names its own tuple `«fn»$out`; every other
    /// tuple gets a structural `tup$…` name. Either way the typedef is
    /// emitted once per unit, attached to the descriptor that first needed
    /// it.
    pub(crate) fn tuple_name(
        &mut self,
        cdd: &mut Cdd,
        elems: &[Rc<Type>],
        owner: Option<&str>,
    ) -> Result<String> {
        let name = match owner {
            Some(f) => format!("{}$out", f),
            None => {
                let mut parts = Vec::with_capacity(elems.len());
                for e in elems {
                    let (base, dims) = self.type_dims(cdd, e, true)?;
                    let mut p = sanitize(&base);
                    for d in &dims {
                        p.push_str(&sanitize(d));
                    }
                    parts.push(p);
                }
                format!("tup${}", parts.join("$"))
            }
        };
        if self.note_tuple(&name) {
            let mut td = String::from("typedef struct {");
            for (i, e) in elems.iter().enumerate() {
                let (base, dims) = self.type_dims(cdd, e, true)?;
                td.push_str(&format!(" {} {};", base, place_decl(&format!("_{}", i), &dims)));
            }
            td.push_str(&format!(" }} {};\n", name));
            if owner.is_some() {
                // The owning declaration places this typedef itself
                cdd.decl.push_str(&td);
            } else {
                cdd.tuple_typedefs.push(td);
            }
        }
        Ok(name)
    }

    /// The zero value of a type, as a C expression
    pub(crate) fn zero_val(&mut self, cdd: &mut Cdd, t: &Rc<Type>) -> Result<String> {
        Ok(match t.underlying() {
            Type::Basic(k) => match k {
                BasicKind::Bool => "false".to_string(),
                BasicKind::Str => "EGSTR(\"\")".to_string(),
                BasicKind::UnsafePointer | BasicKind::UntypedNil => "nil".to_string(),
                _ => "0".to_string(),
            },
            Type::Pointer(_) | Type::Signature(_) => "nil".to_string(),
            Type::Slice(_) => "NILSLICE".to_string(),
            Type::Map(_, _) => "NILMAP".to_string(),
            Type::Chan(_, _) => "NILCHAN".to_string(),
            Type::Interface(ms) if ms.is_empty() => "NILI".to_string(),
            _ => {
                let ts = self.type_str(cdd, t, true)?;
                format!("(({}){{0}})", ts)
            }
        })
    }
}

fn sanitize(s: &str) -> String {
    s.chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '$' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::cdd::DeclKind;
    use crate::codegen::Config;
    use crate::types::{Param, Signature};

    fn fixture() -> (Translator, Cdd) {
        (
            Translator::new(Config::default(), "pkg"),
            Cdd::new("t", DeclKind::Var, 0),
        )
    }

    fn dims(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn place_decl_composes_declarators() {
        assert_eq!(place_decl("a", &dims(&["[3]", "[4]"])), "a[3][4]");
        assert_eq!(place_decl("a", &dims(&["[3]", "*"])), "*a[3]");
        assert_eq!(place_decl("a", &dims(&["*", "[3]"])), "(*a)[3]");
        assert_eq!(place_decl("f", &dims(&["(*)", "(int)"])), "(*f)(int)");
        assert_eq!(place_decl("", &dims(&["*", "(*)", "(int)"])), "(**)(int)");
    }

    #[test]
    fn nested_array_prints_outermost_first() {
        let (mut tr, mut cdd) = fixture();
        let t = Type::array(3, Type::array(4, Type::basic(BasicKind::Int)));
        let (base, d) = tr.type_dims(&mut cdd, &t, true).unwrap();
        assert_eq!(base, "int");
        assert_eq!(d, dims(&["[3]", "[4]"]));
    }

    #[test]
    fn function_type_prints_as_function_pointer() {
        let (mut tr, mut cdd) = fixture();
        let sig = Rc::new(Signature::new(
            vec![Param {
                name: "n".into(),
                ty: Type::basic(BasicKind::Int),
            }],
            vec![Param {
                name: String::new(),
                ty: Type::basic(BasicKind::Int),
            }],
        ));
        let t = Rc::new(Type::Signature(sig));
        assert_eq!(
            tr.type_str(&mut cdd, &t, true).unwrap(),
            "int(*)(int)"
        );
    }

    #[test]
    fn named_type_records_its_package() {
        let (mut tr, mut cdd) = fixture();
        let t = Type::named("hal/gpio", "Port", Type::basic(BasicKind::Uint32));
        assert_eq!(tr.type_str(&mut cdd, &t, true).unwrap(), "hal_gpio$Port");
        assert_eq!(cdd.refs[&RefKey::new("hal/gpio", "Port")], true);
        // Through a pointer only the declaration is needed
        let mut cdd2 = Cdd::new("t2", DeclKind::Var, 0);
        let pt = Type::pointer(t);
        assert_eq!(tr.type_str(&mut cdd2, &pt, true).unwrap(), "hal_gpio$Port*");
        assert_eq!(cdd2.refs[&RefKey::new("hal/gpio", "Port")], false);
    }

    #[test]
    fn empty_interface_is_the_box_type() {
        let (mut tr, mut cdd) = fixture();
        let t = Rc::new(Type::Interface(Vec::new()));
        assert_eq!(tr.type_str(&mut cdd, &t, true).unwrap(), "interface");
    }

    #[test]
    fn structural_tuple_typedef_is_emitted_once() {
        let (mut tr, mut cdd) = fixture();
        let elems = vec![Type::basic(BasicKind::Int), Type::basic(BasicKind::Bool)];
        let n1 = tr.tuple_name(&mut cdd, &elems, None).unwrap();
        let n2 = tr.tuple_name(&mut cdd, &elems, None).unwrap();
        assert_eq!(n1, "tup$int$bool");
        assert_eq!(n1, n2);
        assert_eq!(cdd.tuple_typedefs.len(), 1);
        assert_eq!(
            cdd.tuple_typedefs[0],
            "typedef struct { int _0; bool _1; } tup$int$bool;\n"
        );
    }
}
