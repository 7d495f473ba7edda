//! Constant emission
//!
//! Compile-time values print with the suffix their C type demands. Two traps
//! drive the shape of this code: `-2147483648` parses in C as unary minus
//! applied to an out-of-range literal, so both signed minimums print as
//! `(-MAX-1)`; and exact rationals print as `N/D.` so the trailing dot turns
//! the division into a float one.

use std::rc::Rc;

use crate::ast::{ConstValue, Rational};
use crate::types::{BasicKind, Type};

fn int_suffix(k: BasicKind) -> &'static str {
    match k {
        BasicKind::Int32 => "L",
        BasicKind::Uint32 => "UL",
        BasicKind::Int64 => "LL",
        BasicKind::Uint64 => "ULL",
        _ => "",
    }
}

fn write_int(w: &mut String, v: i64, k: BasicKind) {
    if k == BasicKind::Uintptr {
        w.push_str(&format!("0x{:x}", v as u64));
        return;
    }
    let suf = int_suffix(k);
    match (k, v) {
        (BasicKind::Int32, v) if v == i32::MIN as i64 => {
            w.push_str("(-2147483647L-1L)");
        }
        (BasicKind::Int64, i64::MIN) => {
            w.push_str("(-9223372036854775807LL-1LL)");
        }
        (_, v) if v < 0 => {
            w.push_str(&format!("({}{})", v, suf));
        }
        (_, v) => {
            w.push_str(&format!("{}{}", v, suf));
        }
    }
}

fn write_uint(w: &mut String, v: u64, k: BasicKind) {
    if k == BasicKind::Uintptr {
        w.push_str(&format!("0x{:x}", v));
        return;
    }
    w.push_str(&format!("{}{}", v, int_suffix(k)));
}

fn write_float_raw(w: &mut String, r: &Rational, k: BasicKind) {
    w.push_str(&format!("{}", r.num));
    if r.den != 1 {
        w.push_str(&format!("/{}", r.den));
    }
    w.push('.');
    if k == BasicKind::Float32 {
        w.push('F');
    }
}

fn write_float(w: &mut String, r: &Rational, k: BasicKind) {
    let neg = r.num < 0;
    if neg {
        w.push('(');
    }
    write_float_raw(w, r, k);
    if neg {
        w.push(')');
    }
}

/// Escape a string for a C string literal. Control and non-ASCII bytes use
/// three-digit octal escapes, which cannot swallow a following digit the way
/// hex escapes do.
pub fn c_quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for b in s.bytes() {
        match b {
            b'"' => out.push_str("\\\""),
            b'\\' => out.push_str("\\\\"),
            b'\n' => out.push_str("\\n"),
            b'\t' => out.push_str("\\t"),
            b'\r' => out.push_str("\\r"),
            0x20..=0x7e => out.push(b as char),
            _ => out.push_str(&format!("\\{:03o}", b)),
        }
    }
    out.push('"');
    out
}

/// Emit a typed compile-time value into `w`.
///
/// The kind is taken from the type, not from the value's own variant: the
/// frontend resolves untyped constants against their context before they get
/// here.
pub fn write_value(w: &mut String, v: &ConstValue, t: &Rc<Type>) {
    let k = t.basic_kind().unwrap_or(BasicKind::UntypedNil);
    match v {
        ConstValue::Int(n) => match k {
            BasicKind::Uint
            | BasicKind::Uint8
            | BasicKind::Uint16
            | BasicKind::Uint32
            | BasicKind::Uint64
            | BasicKind::Uintptr => write_uint(w, *n as u64, k),
            BasicKind::Float32 | BasicKind::Float64 => write_float(w, &Rational::int(*n), k),
            _ => write_int(w, *n, k),
        },
        ConstValue::Uint(n) => match k {
            BasicKind::Float32 | BasicKind::Float64 => {
                write_float(w, &Rational::int(*n as i64), k)
            }
            _ => write_uint(w, *n, k),
        },
        ConstValue::Float(r) => write_float(w, r, k),
        ConstValue::Complex { re, im } => {
            // Components print with the float kind matching the complex width
            let fk = match k {
                BasicKind::Complex64 => BasicKind::Float32,
                BasicKind::Complex128 => BasicKind::Float64,
                other => other,
            };
            write_float(w, re, fk);
            if im.num >= 0 {
                w.push('+');
            }
            // A negative imaginary part supplies its own minus sign, so it
            // must not be parenthesised
            write_float_raw(w, im, fk);
            w.push('i');
        }
        ConstValue::Str(s) => {
            w.push_str("EGSTR(");
            w.push_str(&c_quote(s));
            w.push(')');
        }
        ConstValue::Bool(b) => w.push_str(if *b { "true" } else { "false" }),
        ConstValue::Nil => w.push_str("nil"),
    }
}

/// Convenience wrapper returning the emitted text
pub fn value_str(v: &ConstValue, t: &Rc<Type>) -> String {
    let mut w = String::new();
    write_value(&mut w, v, t);
    w
}
