//! Model URI resolution for the lockstep co-simulation workspace.
//!
//! This crate provides:
//! - [`uri`]: RFC 3986 URI parsing, reference resolution, percent coding,
//!   and `file:` URI / local path conversions
//! - [`model`]: the [`Model`](model::Model) capability and the composable
//!   [`ModelUriResolver`](model::ModelUriResolver)

pub mod model;
pub mod uri;

pub use model::{Model, ModelUriResolver, ModelUriSubResolver, SchemeSubResolver};
pub use uri::{
    file_query_uri_to_path, file_uri_to_path, path_to_file_uri, percent_decode, percent_encode,
    resolve_reference, Uri, UriError,
};
