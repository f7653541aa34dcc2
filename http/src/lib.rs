#![cfg_attr(feature = "docs", feature(doc_cfg))]
#![deny(
    single_use_lifetimes,
    missing_debug_implementations,
    large_assignments,
    exported_private_dependencies,
    absolute_paths_not_starting_with_crate,
    anonymous_parameters,
    explicit_outlives_requirements,
    keyword_idents,
    macro_use_extern_crate,
    meta_variable_misuse,
    non_ascii_idents,
    trivial_casts,
    trivial_numeric_casts,
    unsafe_code,
    unused_extern_crates,
    unused_import_braces,
    unused_lifetimes,
    unused_qualifications
)]

//! # sling-http
//!
//! ## Sling HTTP 传输层接口
//!
//! 定义 HTTP 请求 / 响应模型以及传输能力接口，
//! 实现该接口即可为 Sling 客户端提供 HTTP 调用能力，仅提供阻塞接口。

mod context;
mod error;
mod request;
mod response;

use auto_impl::auto_impl;
use std::fmt::Debug;

pub use context::{Canceller, Context};
pub use error::{Error as TransportError, ErrorKind as TransportErrorKind};
pub use http::{
    header::{self, HeaderMap, HeaderName, HeaderValue, InvalidHeaderName, InvalidHeaderValue},
    method::Method,
    status::{InvalidStatusCode, StatusCode},
    uri::{self, Uri},
    Extensions, Version,
};
pub use request::{GetBody, Request, RequestBody, RequestBuilder, RequestParts, RequestPartsBuilder};
pub use response::{
    Body as ResponseBody, Response, ResponseBuilder, ResponseParts, Result as ResponseResult,
};

/// HTTP 请求处理接口
///
/// 实现该接口，即可处理 Sling 客户端发送的 HTTP 请求
#[auto_impl(&, &mut, Box, Rc, Arc)]
pub trait HttpCaller: Debug + Send + Sync {
    /// 同步发送 HTTP 请求
    fn call(&self, request: &mut Request) -> ResponseResult;
}

pub mod prelude {
    pub use super::HttpCaller;
}
