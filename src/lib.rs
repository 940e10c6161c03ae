//! Kiln core library.
//!
//! Parses project-description modules, resolves one build graph per
//! requested (toolset, configuration) pair, and defines the emitter seam
//! through which native build files get written.

pub mod ast;
pub mod emit;
pub mod eval;
pub mod ir;
pub mod lexer;
pub mod parser;
pub mod paths;
pub mod project;
pub mod props;
