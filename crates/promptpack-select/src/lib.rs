//! Selection logic for promptpack.
//!
//! This crate works on an already scanned
//! [`ProjectTree`](promptpack_core::ProjectTree) and never touches the
//! walker:
//!
//! - **Exclusion state** - [`ExclusionSet`], the paths a user excluded
//! - **Cascading selection** - [`compute_effective`] and [`toggle`]
//! - **Assembly** - the ordered file list for a prompt payload
//!
//! # Example
//!
//! ```rust
//! use promptpack_core::ProjectTree;
//! use promptpack_select::{ExclusionSet, ToggleOutcome, assemble, compute_effective, toggle};
//!
//! let tree = ProjectTree::from_paths("/work/app", &["src/a.py", "src/b.py", "README.md"]);
//! let mut exclusions = ExclusionSet::new();
//!
//! assert_eq!(toggle("src", &tree, &mut exclusions), ToggleOutcome::Excluded);
//! let state = compute_effective(&tree, &exclusions);
//! assert_eq!(assemble(&tree, &state), vec!["README.md"]);
//! ```

mod assemble;
mod exclusion;
mod selection;

pub use assemble::{
    AssembleOptions, AssembleOptionsBuilder, Assembler, Assembly, assemble, assemble_folder,
    estimate_tokens, is_binary,
};
pub use exclusion::ExclusionSet;
pub use selection::{
    EffectiveState, Inclusion, SelectionCounts, ToggleOutcome, bulk_set, compute_effective,
    excluded_ancestor, toggle,
};
