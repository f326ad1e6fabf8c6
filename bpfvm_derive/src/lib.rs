//! Derive macros for the bpfvm crate.
//!
//! Provides `#[derive(Error)]`, which generates `Display` and
//! `std::error::Error` implementations from `#[error("...")]` variant
//! attributes (a workspace-local replacement for the `thiserror` crate).

mod error;

use proc_macro::TokenStream;

/// Implements `Display` and `Error` for an error enum.
///
/// Every variant must carry an `#[error("...")]` attribute. The message may
/// interpolate fields: `{name}` for struct variants, `{0}`, `{1}` for tuple
/// variants.
#[proc_macro_derive(Error, attributes(error))]
pub fn derive_error(input: TokenStream) -> TokenStream {
    error::derive_error(input)
}
