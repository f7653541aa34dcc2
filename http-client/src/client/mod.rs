mod backoff;
mod body;
mod error;
mod inspector;
mod marshaling;
mod middleware;
mod mocks;
mod options;
mod query;
mod requester;
mod response;
mod retry;

pub use backoff::{
    constant_backoff, constant_backoff_with_jitter, no_backoff, Backoff, BackoffFn,
    ExponentialBackoff,
};
pub use body::BodyValue;
pub use error::{ApiResult, Error, ErrorKind};
pub use inspector::{Exchange, ExchangeInspector, Inspector};
pub use marshaling::{
    decode_with, ContentTypeUnmarshaler, DecodeTarget, FormMarshaler, JsonMarshaler, MarshalFn,
    MarshalValue, Marshaler, UnmarshalFn, Unmarshaler, XmlMarshaler, CONTENT_TYPE_FORM,
    CONTENT_TYPE_JSON, CONTENT_TYPE_JSON_UTF8, CONTENT_TYPE_XML, CONTENT_TYPE_XML_UTF8,
};
pub use middleware::{
    dump_to_log, expect_code, expect_success_code, wrap, CallerExecutor, Dump, DumpToLog,
    Executor, ExecutorFunc, ExpectCode, ExpectSuccessCode, Middleware, MiddlewareFunc,
};
pub use mocks::{channel_executor, mock_executor, mock_response, ChannelExecutor, MockExecutor};
pub use options::{
    accept, add_header, append_path, basic_auth, bearer_auth, body, body_bytes, body_reader,
    body_text, close_connection, content_length, content_type, delete, delete_header, form, get,
    head, header, host, json, method, patch, post, put, query_param, query_params, range,
    relative_url, transfer_encoding, url, with_caller, with_executor, with_get_body,
    with_marshaler, with_middleware, with_unmarshaler, xml, RequestOption,
};
pub use query::QueryInput;
pub use requester::{
    default_requester, receive, receive_bytes, receive_bytes_with_context, receive_with_context,
    request, request_with_context, send, send_with_context, Requester,
};
pub use response::{is_success, read_body};
pub use retry::{
    retry, AllRetryers, DefaultShouldRetry, OnlyIdempotent, Retry, RetryConfig, ShouldRetry,
    ShouldRetryFn,
};
