//! Name mangling
//!
//! Every source object maps to a stable C identifier built with the `$`
//! separator (the generated C is compiled with `-fdollars-in-identifiers`):
//!
//! - package-level `P.Name` → `«upath(P)»$«Name»`
//! - method `T.m`           → `«upath(P)»$«T»$«m»`
//! - function-local `name`  → `«name»$`
//! - blank `_`              → `unused$«n»`, uniqued per object
//! - `init`                 → `«upath(P)»$init$«n»`, uniqued per unit
//!
//! Mangling an object that lives in another package records a cross-unit
//! reference on the current descriptor; the *direct* flag says whether the
//! referenced definition itself is needed or its declaration suffices.

use std::rc::Rc;

use super::cdd::{Cdd, RefKey};
use super::package::Translator;
use crate::ast::{ObjKind, Object, Span};
use crate::errors::{Result, TranslateError};
use crate::types::Type;

/// A package import path as a C identifier fragment: every character that is
/// not valid in an identifier becomes `_`.
pub fn upath(path: &str) -> String {
    path.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

impl Translator {
    /// Mangle `obj` into `w`, recording references as a side effect
    pub(crate) fn name(
        &mut self,
        cdd: &mut Cdd,
        w: &mut String,
        obj: &Rc<Object>,
        direct: bool,
    ) -> Result<()> {
        match &obj.kind {
            ObjKind::Package => {
                // Imported package name in a selector: only the path matters
                let path = obj.pkg.as_deref().unwrap_or("");
                w.push_str(&upath(path));
                return Ok(());
            }

            ObjKind::Builtin(_) => {
                w.push_str(&obj.name);
                return Ok(());
            }

            ObjKind::Label => {
                w.push_str(&obj.name);
                w.push('$');
                return Ok(());
            }

            ObjKind::Func { sig } => {
                if let Some(recv) = &sig.recv {
                    return self.method_name(cdd, w, obj, recv, direct);
                }
            }

            _ => {}
        }

        if obj.is_blank() {
            let n = self.uniq_name(obj, "unused");
            w.push_str(&n);
            return Ok(());
        }

        match &obj.pkg {
            Some(p) => {
                let mangled = if obj.name == "init" {
                    // One uniqued init per declaration
                    self.uniq_name(obj, &format!("{}$init", upath(p)))
                } else {
                    format!("{}${}", upath(p), obj.name)
                };
                if p != self.cur_pkg() {
                    cdd.add_ref(RefKey::new(p.clone(), obj.name.clone()), direct);
                } else {
                    cdd.add_local(mangled.clone());
                }
                w.push_str(&mangled);
            }
            None => {
                w.push_str(&obj.name);
                w.push('$');
            }
        }
        Ok(())
    }

    fn method_name(
        &mut self,
        cdd: &mut Cdd,
        w: &mut String,
        obj: &Rc<Object>,
        recv: &Rc<Type>,
        direct: bool,
    ) -> Result<()> {
        let mut direct = direct;
        let mut rt = recv.clone();
        if let Type::Pointer(elem) = &*rt {
            rt = elem.clone();
            direct = false;
        }
        let tn = match &*rt {
            Type::Named { name, .. } => name.clone(),
            _ => {
                return Err(TranslateError::violation(
                    format!("method {} on unnamed receiver type {}", obj.name, rt),
                    Span::default(),
                ))
            }
        };
        let mangled = format!("{}${}${}", upath(&tn.pkg), tn.name, obj.name);
        if tn.pkg != self.cur_pkg() {
            cdd.add_ref(
                RefKey::new(tn.pkg.clone(), format!("{}.{}", tn.name, obj.name)),
                direct,
            );
        } else {
            cdd.add_local(mangled.clone());
        }
        w.push_str(&mangled);
        Ok(())
    }

    /// Mangle into a fresh string
    pub(crate) fn name_str(&mut self, cdd: &mut Cdd, obj: &Rc<Object>, direct: bool) -> Result<String> {
        let mut buf = String::new();
        self.name(cdd, &mut buf, obj, direct)?;
        Ok(buf)
    }

    /// A fresh `prefix$«n»` name, memoised per object so that mangling the
    /// same object twice yields the same string
    fn uniq_name(&mut self, obj: &Rc<Object>, prefix: &str) -> String {
        let key = Rc::as_ptr(obj) as usize;
        if let Some(n) = self.uniq_names.get(&key) {
            return n.clone();
        }
        let n = format!("{}${}", prefix, self.unique_id());
        self.uniq_names.insert(key, n.clone());
        n
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::cdd::DeclKind;
    use crate::codegen::Config;
    use crate::test_support::*;
    use crate::types::BasicKind;

    fn fixture() -> (Translator, Cdd) {
        (
            Translator::new(Config::default(), "hal/gpio"),
            Cdd::new("t", DeclKind::Var, 0),
        )
    }

    #[test]
    fn upath_replaces_non_identifier_chars() {
        assert_eq!(upath("hal/gpio"), "hal_gpio");
        assert_eq!(upath("github.com/x-y/z"), "github_com_x_y_z");
    }

    #[test]
    fn package_level_names_carry_the_path() {
        let (mut tr, mut cdd) = fixture();
        let v = pkg_var("hal/gpio", "Pin", Type::basic(BasicKind::Int));
        assert_eq!(tr.name_str(&mut cdd, &v, true).unwrap(), "hal_gpio$Pin");
        assert!(cdd.refs.is_empty());
        assert!(cdd.local_deps.contains("hal_gpio$Pin"));
    }

    #[test]
    fn external_names_record_a_reference() {
        let (mut tr, mut cdd) = fixture();
        let v = pkg_var("runtime/noos", "Tick", Type::basic(BasicKind::Int64));
        assert_eq!(
            tr.name_str(&mut cdd, &v, true).unwrap(),
            "runtime_noos$Tick"
        );
        assert_eq!(cdd.refs[&RefKey::new("runtime/noos", "Tick")], true);
    }

    #[test]
    fn locals_get_a_trailing_separator() {
        let (mut tr, mut cdd) = fixture();
        let v = local_var("x", Type::basic(BasicKind::Int));
        assert_eq!(tr.name_str(&mut cdd, &v, true).unwrap(), "x$");
    }

    #[test]
    fn blank_is_uniqued_but_stable_per_object() {
        let (mut tr, mut cdd) = fixture();
        let b1 = local_var("_", Type::basic(BasicKind::Int));
        let b2 = local_var("_", Type::basic(BasicKind::Int));
        let n1 = tr.name_str(&mut cdd, &b1, true).unwrap();
        let n1again = tr.name_str(&mut cdd, &b1, true).unwrap();
        let n2 = tr.name_str(&mut cdd, &b2, true).unwrap();
        assert_eq!(n1, n1again);
        assert_ne!(n1, n2);
        assert!(n1.starts_with("unused$"));
    }
}
