#![cfg_attr(feature = "docs", feature(doc_cfg))]
#![deny(
    single_use_lifetimes,
    large_assignments,
    absolute_paths_not_starting_with_crate,
    anonymous_parameters,
    explicit_outlives_requirements,
    keyword_idents,
    macro_use_extern_crate,
    meta_variable_misuse,
    missing_docs,
    trivial_casts,
    trivial_numeric_casts,
    unsafe_code,
    unused_import_braces,
    unused_lifetimes,
    unused_qualifications
)]

//! # sling-ureq
//!
//! ## Sling Ureq 传输层实现
//!
//! 基于 Ureq 库提供 HTTP 传输能力接口实现，仅提供阻塞接口的实现。

mod client;
mod extensions;

pub use client::Client;
pub use extensions::TimeoutExtension;

pub use sling_http as http;
pub use ureq;
