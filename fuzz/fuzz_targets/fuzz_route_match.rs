//! Fuzz target: route lookup over arbitrary request paths.
//!
//! Checks that matching never panics and that a matched route's captures
//! cover exactly its declared parameters.

#![no_main]

use libfuzzer_sys::fuzz_target;
use mimic_core::examples::example_api;
use mimic_core::{HttpMethod, RouteTable};

fuzz_target!(|data: &[u8]| {
    let Ok(path) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(spec) = example_api() else {
        return;
    };
    let Ok(table) = RouteTable::from_spec(spec) else {
        return;
    };

    for method in [HttpMethod::Get, HttpMethod::Post, HttpMethod::Delete] {
        if let Some(found) = table.find(method, path) {
            assert!(found.route.method.accepts(method));
            assert_eq!(found.path_params.len(), found.route.param_names.len());
        }
    }
});
