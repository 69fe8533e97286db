//! Pipeline stages for turning the applications PDF into stored records.
//!
//! Each submodule implements one transformation step and can be tested on
//! its own.
//!
//! ## Data Flow
//!
//! ```text
//! fetch ──▶ extract ──▶ table ──▶ normalize ──▶ upsert
//! (URL/path) (pdfium)   (rows)    (records)     (store)
//! ```
//!
//! 1. [`fetch`]     download the document or read a local copy
//! 2. [`extract`]   positioned text fragments per page; runs in
//!    `spawn_blocking` because pdfium is not async-safe
//! 3. [`table`]     visual lines, header-anchored column boundaries and
//!    continuation merging
//! 4. [`normalize`] data-row filtering, field cleanup, date parsing
//! 5. [`upsert`]    insert unless the council reference is already stored

pub mod extract;
pub mod fetch;
pub mod normalize;
pub mod table;
pub mod upsert;
