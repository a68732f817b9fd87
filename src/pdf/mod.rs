//! PDF low-level machinery: lexing of classic cross-reference documents,
//! incremental update serialisation, signature placeholder preparation,
//! token embedding and signature discovery.

pub mod embed;
pub mod extract;
pub mod lexer;
pub mod prepare;
pub mod writer;

pub use embed::embed_token;
pub use extract::{extract_timestamps, EmbeddedTimestamp};
pub use lexer::{Document, ObjRef, PdfDict, PdfValue};
pub use prepare::{prepare, PrepareOptions, PreparedPdf};
