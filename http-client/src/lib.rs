#![cfg_attr(feature = "docs", feature(doc_cfg))]
#![deny(
    single_use_lifetimes,
    large_assignments,
    exported_private_dependencies,
    absolute_paths_not_starting_with_crate,
    anonymous_parameters,
    explicit_outlives_requirements,
    keyword_idents,
    macro_use_extern_crate,
    meta_variable_misuse,
    trivial_casts,
    trivial_numeric_casts,
    unsafe_code,
    unused_extern_crates,
    unused_import_braces,
    unused_lifetimes
)]

//! # sling-http-client
//!
//! ## Sling HTTP 客户端
//!
//! 以选项驱动的可组合 HTTP 请求客户端：
//! 请求模板积累配置并按需物化请求，
//! 请求经过中间件链与执行器发出，
//! 响应按 Content-Type 分发给编解码器解码。
//!
//! ```no_run
//! use serde::Deserialize;
//! use sling_http_client::{get, query_params, receive};
//!
//! #[derive(Deserialize)]
//! struct Thing {
//!     color: String,
//! }
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let (thing, _response): (Thing, _) = receive(&[
//!     get("http://api.example.com/things"),
//!     query_params([("limit", "30")]),
//! ])?;
//! println!("{}", thing.color);
//! # Ok(())
//! # }
//! ```

mod client;

pub extern crate sling_http as http;

#[cfg(feature = "ureq")]
pub extern crate sling_ureq as ureq;

pub use client::*;

pub use http::{Canceller, Context, GetBody, HttpCaller, Request, RequestBody, Response, ResponseBody};
