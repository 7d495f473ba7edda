//! Micac - translates typed Mica packages into portable C for embedded targets

pub mod ast;
pub mod codegen;
pub mod errors;
pub mod test_support;
pub mod types;

pub use ast::Package;
pub use codegen::{Config, PackageOutput, Translator};
pub use errors::TranslateError;
pub use types::Type;
