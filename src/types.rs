//! Type representation for the Mica translator
//!
//! The frontend hands every expression a fully resolved type. This module is
//! the translator-side model of those types: basic kinds, composites, named
//! types with their underlying shape, and function signatures. Structural
//! identity is by underlying shape; named types are nominally distinct but
//! share the underlying.

use std::fmt;
use std::rc::Rc;

/// Basic (predeclared) type kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BasicKind {
    Bool,
    Int,
    Int8,
    Int16,
    Int32,
    Int64,
    Uint,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Uintptr,
    Float32,
    Float64,
    Complex64,
    Complex128,
    Str,
    UnsafePointer,
    /// The type of a bare `nil` before the translator resolves it via a hint
    UntypedNil,
}

impl BasicKind {
    /// The C spelling of this kind (the runtime header typedefs these)
    pub fn c_name(self) -> &'static str {
        match self {
            BasicKind::Bool => "bool",
            BasicKind::Int => "int",
            BasicKind::Int8 => "int8",
            BasicKind::Int16 => "int16",
            BasicKind::Int32 => "int32",
            BasicKind::Int64 => "int64",
            BasicKind::Uint => "uint",
            BasicKind::Uint8 => "uint8",
            BasicKind::Uint16 => "uint16",
            BasicKind::Uint32 => "uint32",
            BasicKind::Uint64 => "uint64",
            BasicKind::Uintptr => "uintptr",
            BasicKind::Float32 => "float32",
            BasicKind::Float64 => "float64",
            BasicKind::Complex64 => "complex64",
            BasicKind::Complex128 => "complex128",
            BasicKind::Str => "string",
            BasicKind::UnsafePointer => "unsafe$Pointer",
            BasicKind::UntypedNil => "nil",
        }
    }
}

/// Channel direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChanDir {
    Send,
    Recv,
    Both,
}

/// A struct field
#[derive(Debug, Clone)]
pub struct Field {
    pub name: String,
    pub ty: Rc<Type>,
    pub embedded: bool,
}

/// A named function parameter
#[derive(Debug, Clone)]
pub struct Param {
    pub name: String,
    pub ty: Rc<Type>,
}

/// A function signature: optional receiver, parameters, results.
///
/// Result names may be empty; a bare `return` in a result-bearing function
/// requires them, and the declaration translator checks that.
#[derive(Debug, Clone)]
pub struct Signature {
    pub recv: Option<Rc<Type>>,
    pub params: Vec<Param>,
    pub results: Vec<Param>,
    pub variadic: bool,
}

impl Signature {
    pub fn new(params: Vec<Param>, results: Vec<Param>) -> Self {
        Signature {
            recv: None,
            params,
            results,
            variadic: false,
        }
    }

    pub fn with_recv(mut self, recv: Rc<Type>) -> Self {
        self.recv = Some(recv);
        self
    }
}

/// An interface method: name plus signature (receiver elided)
#[derive(Debug, Clone)]
pub struct Method {
    pub name: String,
    pub sig: Rc<Signature>,
}

/// The identity of a named type: its declaring package and name.
///
/// Stored inline rather than through the declaring object so the type graph
/// stays acyclic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeName {
    /// Import path of the declaring package
    pub pkg: String,
    pub name: String,
}

/// A Mica type as seen by the translator
#[derive(Debug, Clone)]
pub enum Type {
    Basic(BasicKind),
    Pointer(Rc<Type>),
    Array(u64, Rc<Type>),
    Slice(Rc<Type>),
    Map(Rc<Type>, Rc<Type>),
    Chan(ChanDir, Rc<Type>),
    Struct(Vec<Field>),
    /// Method set, sorted by name by the frontend
    Interface(Vec<Method>),
    Signature(Rc<Signature>),
    Named {
        name: TypeName,
        underlying: Rc<Type>,
    },
    /// Multi-value carrier; only appears as a result list or receive pair
    Tuple(Vec<Rc<Type>>),
}

impl Type {
    /// Follow named types to the underlying shape
    pub fn underlying(&self) -> &Type {
        match self {
            Type::Named { underlying, .. } => underlying.underlying(),
            t => t,
        }
    }

    pub fn is_interface(&self) -> bool {
        matches!(self.underlying(), Type::Interface(_))
    }

    pub fn basic_kind(&self) -> Option<BasicKind> {
        match self.underlying() {
            Type::Basic(k) => Some(*k),
            _ => None,
        }
    }

    /// The element type of a pointer, array, slice or channel
    pub fn elem(&self) -> Option<&Rc<Type>> {
        match self.underlying() {
            Type::Pointer(e) | Type::Array(_, e) | Type::Slice(e) | Type::Chan(_, e) => Some(e),
            _ => None,
        }
    }

    pub fn rc(self) -> Rc<Type> {
        Rc::new(self)
    }
}

// ============================================================================
// Target sizing
// ============================================================================

/// Byte size and alignment of a type on the target.
///
/// Used for the interface-boxing fit check: a value only goes into an
/// interface when it is no larger than a pointer.
pub fn size_align(t: &Type, ptr_size: u64) -> (u64, u64) {
    match t.underlying() {
        Type::Basic(k) => {
            let s = match k {
                BasicKind::Bool | BasicKind::Int8 | BasicKind::Uint8 => 1,
                BasicKind::Int16 | BasicKind::Uint16 => 2,
                BasicKind::Int32 | BasicKind::Uint32 | BasicKind::Float32 => 4,
                BasicKind::Int64
                | BasicKind::Uint64
                | BasicKind::Float64
                | BasicKind::Complex64 => 8,
                BasicKind::Complex128 => 16,
                BasicKind::Int
                | BasicKind::Uint
                | BasicKind::Uintptr
                | BasicKind::UnsafePointer
                | BasicKind::UntypedNil => ptr_size,
                // {data pointer, length}
                BasicKind::Str => return (2 * ptr_size, ptr_size),
            };
            (s, s.min(ptr_size))
        }
        Type::Pointer(_) | Type::Chan(_, _) | Type::Map(_, _) | Type::Signature(_) => {
            (ptr_size, ptr_size)
        }
        // {data pointer, length, capacity}
        Type::Slice(_) => (3 * ptr_size, ptr_size),
        Type::Array(n, elem) => {
            let (es, ea) = size_align(elem, ptr_size);
            (es * n, ea)
        }
        Type::Struct(fields) => {
            let mut size = 0u64;
            let mut align = 1u64;
            for f in fields {
                let (fs, fa) = size_align(&f.ty, ptr_size);
                size = round_up(size, fa) + fs;
                align = align.max(fa);
            }
            (round_up(size, align), align)
        }
        // {boxed value, type id} plus one pointer per method
        Type::Interface(ms) => ((2 + ms.len() as u64) * ptr_size, ptr_size),
        Type::Tuple(elems) => {
            let mut size = 0u64;
            let mut align = 1u64;
            for e in elems {
                let (es, ea) = size_align(e, ptr_size);
                size = round_up(size, ea) + es;
                align = align.max(ea);
            }
            (round_up(size, align), align)
        }
        Type::Named { .. } => unreachable!("underlying() strips named types"),
    }
}

fn round_up(n: u64, align: u64) -> u64 {
    (n + align - 1) / align * align
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Basic(k) => write!(f, "{}", k.c_name()),
            Type::Pointer(e) => write!(f, "*{}", e),
            Type::Array(n, e) => write!(f, "[{}]{}", n, e),
            Type::Slice(e) => write!(f, "[]{}", e),
            Type::Map(k, v) => write!(f, "map[{}]{}", k, v),
            Type::Chan(ChanDir::Send, e) => write!(f, "chan<- {}", e),
            Type::Chan(ChanDir::Recv, e) => write!(f, "<-chan {}", e),
            Type::Chan(ChanDir::Both, e) => write!(f, "chan {}", e),
            Type::Struct(fields) => {
                write!(f, "struct {{")?;
                for (i, fld) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, "; ")?;
                    }
                    write!(f, "{} {}", fld.name, fld.ty)?;
                }
                write!(f, "}}")
            }
            Type::Interface(ms) => {
                write!(f, "interface {{")?;
                for (i, m) in ms.iter().enumerate() {
                    if i > 0 {
                        write!(f, "; ")?;
                    }
                    write!(f, "{}", m.name)?;
                }
                write!(f, "}}")
            }
            Type::Signature(sig) => {
                write!(f, "func(")?;
                for (i, p) in sig.params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", p.ty)?;
                }
                write!(f, ")")?;
                match sig.results.len() {
                    0 => Ok(()),
                    1 => write!(f, " {}", sig.results[0].ty),
                    _ => {
                        write!(f, " (")?;
                        for (i, r) in sig.results.iter().enumerate() {
                            if i > 0 {
                                write!(f, ", ")?;
                            }
                            write!(f, "{}", r.ty)?;
                        }
                        write!(f, ")")
                    }
                }
            }
            Type::Named { name, .. } => {
                if name.pkg.is_empty() {
                    write!(f, "{}", name.name)
                } else {
                    write!(f, "{}.{}", name.pkg, name.name)
                }
            }
            Type::Tuple(elems) => {
                write!(f, "(")?;
                for (i, e) in elems.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", e)?;
                }
                write!(f, ")")
            }
        }
    }
}

// ============================================================================
// Construction helpers
// ============================================================================

impl Type {
    pub fn basic(k: BasicKind) -> Rc<Type> {
        Rc::new(Type::Basic(k))
    }

    pub fn pointer(elem: Rc<Type>) -> Rc<Type> {
        Rc::new(Type::Pointer(elem))
    }

    pub fn array(n: u64, elem: Rc<Type>) -> Rc<Type> {
        Rc::new(Type::Array(n, elem))
    }

    pub fn slice(elem: Rc<Type>) -> Rc<Type> {
        Rc::new(Type::Slice(elem))
    }

    pub fn chan(dir: ChanDir, elem: Rc<Type>) -> Rc<Type> {
        Rc::new(Type::Chan(dir, elem))
    }

    pub fn named(pkg: &str, name: &str, underlying: Rc<Type>) -> Rc<Type> {
        Rc::new(Type::Named {
            name: TypeName {
                pkg: pkg.to_string(),
                name: name.to_string(),
            },
            underlying,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn underlying_strips_nesting() {
        let base = Type::basic(BasicKind::Int);
        let n1 = Type::named("p", "A", base);
        let n2 = Type::named("p", "B", n1);
        assert!(matches!(n2.underlying(), Type::Basic(BasicKind::Int)));
    }

    #[test]
    fn sizes_on_a_32_bit_target() {
        let ptr = 4;
        assert_eq!(size_align(&Type::Basic(BasicKind::Int64), ptr).0, 8);
        assert_eq!(
            size_align(&Type::Slice(Type::basic(BasicKind::Int)), ptr).0,
            12
        );
        assert_eq!(size_align(&Type::Basic(BasicKind::Str), ptr).0, 8);
        let s = Type::Struct(vec![
            Field {
                name: "a".into(),
                ty: Type::basic(BasicKind::Int8),
                embedded: false,
            },
            Field {
                name: "b".into(),
                ty: Type::basic(BasicKind::Int32),
                embedded: false,
            },
        ]);
        // int8 padded up to int32 alignment
        assert_eq!(size_align(&s, ptr), (8, 4));
    }
}
