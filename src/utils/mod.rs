// SPDX-License-Identifier: GPL-3.0-only
pub mod path_sanitizer;
pub mod url_validator;

pub use path_sanitizer::{validate_path_within_base, validate_relative_path};
pub use url_validator::validate_endpoint_url;
