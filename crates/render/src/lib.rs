//! Document and diagram rendering for cloud plans: Statements of Work from
//! Tera templates and architecture diagrams as Graphviz DOT.

pub mod diagram;
pub mod sow;

pub use diagram::{DiagramError, DiagramOutput, DiagramRenderer, DiagramSpec};
pub use sow::{SowError, SowRenderer, SowSpec};
