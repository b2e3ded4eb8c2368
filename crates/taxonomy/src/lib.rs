//! # Taxonomy Navigator: Taxonomy Index
//!
//! Parses a flat, line-oriented taxonomy file into an immutable index that the
//! classification funnel queries for candidates and final path resolution.
//!
//! ## File format
//!
//! ```text
//! # Google_Product_Taxonomy_Version: 2021-09-21     <- header, discarded
//! Electronics
//! Electronics > Computers
//! Electronics > Computers > Laptops
//! ```
//!
//! ## Architecture
//!
//! ```text
//! lines
//!   │
//!   ├──> Segment split (" > ")
//!   │
//!   ├──> Prefix tree (one node per distinct prefix)
//!   │      └─> leaf = node carrying a path with no children
//!   │
//!   └──> Derived lookups
//!          ├─> distinct top-level categories (file order)
//!          ├─> leaves grouped by top-level category
//!          └─> leaf name → full path (exact final segment)
//! ```
//!
//! ## Example
//!
//! ```rust
//! use taxonav_taxonomy::TaxonomyIndex;
//!
//! let index = TaxonomyIndex::build([
//!     "header",
//!     "Electronics",
//!     "Electronics > Computers",
//!     "Electronics > Computers > Laptops",
//! ])
//! .unwrap();
//!
//! assert_eq!(index.leaf_flags(), &[false, false, true]);
//! let path = index.full_path_for_leaf("Laptops").unwrap();
//! assert_eq!(path.to_string(), "Electronics > Computers > Laptops");
//! ```

mod error;
mod index;
mod path;
mod trie;

pub use error::{Result, TaxonomyError};
pub use index::{Candidate, TaxonomyIndex, TaxonomyStats};
pub use path::{TaxonomyPath, SEPARATOR};
