//! Micac backend: typed AST → C
//!
//! The pipeline is a straight walk, leaves first:
//! 1. `mangle` turns objects into stable C identifiers
//! 2. `ctype` prints types as (base, dims) declarator pairs
//! 3. `conval` emits typed compile-time values
//! 4. `expr` and `stmt` walk the tree, one descriptor (`cdd`) per top-level
//!    declaration
//! 5. `decl` produces each declaration's (Decl, Def) pair
//! 6. `package` drives a whole unit and writes header, source and manifest
//!
//! `typeids` assigns the runtime identity hashes interface boxing relies on.

pub mod cdd;
pub mod conval;
pub mod ctype;
pub mod decl;
pub mod expr;
pub mod mangle;
pub mod package;
pub mod stmt;
pub mod typeids;

pub use cdd::{Cdd, DeclKind, RefKey};
pub use ctype::place_decl;
pub use mangle::upath;
pub use package::{Config, ImportEntry, PackageOutput, Translator};
pub use typeids::TypeIds;
