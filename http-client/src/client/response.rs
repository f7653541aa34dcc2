use super::error::{ApiResult, Error, ErrorKind};
use anyhow::Error as AnyError;
use sling_http::{header::CONTENT_LENGTH, Response, StatusCode};
use std::io::Read;

/// 判定状态码是否表示成功
///
/// 成功状态码为 200 到 226（IM Used）的闭区间
#[inline]
pub fn is_success(status_code: StatusCode) -> bool {
    (200..=226).contains(&status_code.as_u16())
}

/// 完整读出响应体
///
/// 空响应体哨兵直接得到空字节数组；
/// Content-Length 大于零时按其预分配缓冲区；
/// 无论读取成败，原响应体都被关闭
pub fn read_body(response: Response) -> ApiResult<Response<Vec<u8>>> {
    let (parts, mut body) = response.into_parts_and_body();

    if body.is_empty_sentinel() {
        return Ok(Response::from_parts_and_body(parts, Vec::new()));
    }

    let content_length = parts
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<usize>().ok())
        .unwrap_or(0);

    let mut buf = if content_length > 0 {
        Vec::with_capacity(content_length)
    } else {
        Vec::new()
    };
    body.read_to_end(&mut buf)
        .map_err(|err| Error::new(ErrorKind::Io, AnyError::new(err).context("error reading response body")))?;

    Ok(Response::from_parts_and_body(parts, buf))
}
