//! In-memory model of a DART XBRL filing and materialization of its
//! presentation tables into [`StatementMatrix`](crate::matrix::StatementMatrix)
//! form.
//!
//! A filing is a set of role tables. Metadata roles (`d999001`..`d999007`)
//! describe the document itself; the financial statement information role
//! (`d999007`) names which statement variants were filed and maps them to the
//! role numbers carrying the actual statements (`D210000` and friends). Each
//! table holds its reporting contexts, the facts reported against them, and
//! the presentation tree of concepts with Korean and English labels.

pub mod document;
pub mod table;

pub use document::{
    Classification, ContextPeriod, Dimension, LabelNode, XbrlContext, XbrlDocument, XbrlFact,
    XbrlTable,
};
pub use table::XbrlRenderOptions;
