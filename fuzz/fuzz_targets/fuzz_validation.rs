//! Fuzz testing for upload validation functions.
//!
//! This fuzz target tests the robustness of the validation module against
//! arbitrary input strings. It ensures that validation functions:
//!
//! - Never panic on any input
//! - Always return a valid Result (Ok or Err)
//! - Handle edge cases like empty strings, long strings, path traversal
//!   attempts, and non-ASCII filenames
//!
//! # Running the Fuzz Tests
//!
//! ```bash
//! # Install cargo-fuzz (requires nightly)
//! cargo +nightly install cargo-fuzz
//!
//! # Run the validation fuzz target
//! cargo +nightly fuzz run fuzz_validation
//!
//! # Run with a time limit (e.g., 60 seconds)
//! cargo +nightly fuzz run fuzz_validation -- -max_total_time=60
//! ```
//!
//! # What This Tests
//!
//! - `validate_image_filename`: Extension and length validation
//! - `sanitize_filename`: Path component stripping
//! - `content_type_for`: Extension to content-type mapping
//! - `unique_object_name`: Object naming from arbitrary filenames

#![no_main]

use libfuzzer_sys::fuzz_target;
use upload_gateway::storage::unique_object_name;
use upload_gateway::validation::{content_type_for, sanitize_filename, validate_image_filename};

fuzz_target!(|data: &[u8]| {
    // Try to interpret the bytes as a UTF-8 string for filename validation
    if let Ok(s) = std::str::from_utf8(data) {
        // Extension validation (shouldn't panic)
        let _ = validate_image_filename(s);

        // Sanitization must always yield a path-free name
        let sanitized = sanitize_filename(s);
        assert!(!sanitized.contains('/'));

        // Content-type mapping always resolves to something
        let content_type = content_type_for(s);
        assert!(!content_type.is_empty());

        // Object naming must not panic on arbitrary names
        let _ = unique_object_name(s);
    }
});
