//! JS macro fast path for operations the Plan contract cannot express.

pub mod generator;
pub mod syntax;

pub use generator::{
    finalise_macro, obtain_macro, MacroError, MacroGenerator, MacroOutcome, MacroRequest,
};
pub use syntax::{detect_unsupported_syntax, SyntaxIssue, UnsupportedSyntax};
