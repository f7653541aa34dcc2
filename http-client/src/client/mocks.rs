use super::{
    error::{ApiResult, Error, ErrorKind},
    inspector::snapshot_request_parts,
    middleware::Executor,
    options::RequestOption,
    requester::Requester,
};
use crossbeam_channel::{bounded, Receiver, Sender};
use sling_http::{Request, Response, ResponseBody, StatusCode};

/// 通过选项构造一个模拟响应
///
/// 选项描述的请求字段被搬到响应上：请求体成为响应体，
/// 请求 Header 成为响应 Header。仅用于测试，选项非法时直接崩溃
pub fn mock_response(status_code: u16, options: &[RequestOption]) -> Response {
    let request = Requester::default()
        .must_with(options)
        .request(&[])
        .expect("failed to materialize the mock response template");
    let status_code = StatusCode::from_u16(status_code).expect("invalid mock status code");

    let (parts, body) = request.into_parts_and_body();
    let body = if body.is_empty() {
        ResponseBody::from_bytes(Vec::new())
    } else if let Some(bytes) = body.bytes() {
        ResponseBody::from_bytes(bytes.to_vec())
    } else {
        ResponseBody::from_reader(body)
    };

    let mut response = Response::from_parts_and_body(Default::default(), body);
    *response.status_code_mut() = status_code;
    *response.headers_mut() = parts.headers().to_owned();
    response
}

/// 返回固定模拟响应的执行器
///
/// 每次执行都重新物化一遍选项，因此响应体可以反复读取；
/// 响应上会带上产生它的请求信息
#[derive(Debug)]
pub struct MockExecutor {
    status_code: u16,
    options: Vec<RequestOption>,
}

/// 创建返回固定模拟响应的执行器
pub fn mock_executor(status_code: u16, options: &[RequestOption]) -> MockExecutor {
    MockExecutor {
        status_code,
        options: options.to_vec(),
    }
}

impl Executor for MockExecutor {
    fn execute(&self, request: &mut Request) -> ApiResult<Response> {
        let mut response = mock_response(self.status_code, &self.options);
        *response.request_mut() = Some(Box::new(snapshot_request_parts(request.parts())));
        Ok(response)
    }
}

/// 从通道里取出预设响应的执行器
///
/// 与 [`channel_executor`] 配套使用，响应上会带上产生它的请求信息
#[derive(Debug, Clone)]
pub struct ChannelExecutor {
    rx: Receiver<Response>,
}

/// 创建通道执行器，返回响应发送端与执行器
pub fn channel_executor() -> (Sender<Response>, ChannelExecutor) {
    let (tx, rx) = bounded(1);
    (tx, ChannelExecutor { rx })
}

impl Executor for ChannelExecutor {
    fn execute(&self, request: &mut Request) -> ApiResult<Response> {
        let mut response = self.rx.recv().map_err(|_| {
            Error::new_with_msg(
                ErrorKind::Config,
                "channel executor has no response to serve and the sender is gone",
            )
        })?;
        *response.request_mut() = Some(Box::new(snapshot_request_parts(request.parts())));
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::{
        super::options::{body_text, header},
        *,
    };
    use std::{error::Error as StdError, io::Read, thread};

    #[test]
    fn test_mock_response_copies_request_fields() -> Result<(), Box<dyn StdError>> {
        let response = mock_response(201, &[header("X-Color", "red"), body_text("hello")]);
        assert_eq!(response.status_code().as_u16(), 201);
        assert_eq!(response.headers().get("X-Color").unwrap(), "red");

        let mut body = response.into_body();
        let mut buf = Vec::new();
        body.read_to_end(&mut buf)?;
        assert_eq!(buf, b"hello");
        Ok(())
    }

    #[test]
    fn test_mock_executor_attaches_the_request() -> Result<(), Box<dyn StdError>> {
        let executor = mock_executor(200, &[]);
        let mut request = Request::builder()
            .url("http://test.example.com/things".parse()?)
            .build();
        let response = executor.execute(&mut request)?;
        assert_eq!(
            response.request().unwrap().url().to_string(),
            "http://test.example.com/things"
        );
        Ok(())
    }

    #[test]
    fn test_channel_executor_serves_queued_responses() -> Result<(), Box<dyn StdError>> {
        let (tx, executor) = channel_executor();
        let feeder = thread::spawn(move || {
            tx.send(mock_response(200, &[body_text("first")])).unwrap();
            tx.send(mock_response(500, &[body_text("second")])).unwrap();
        });

        let mut request = Request::builder().build();
        let first = executor.execute(&mut request)?;
        assert_eq!(first.status_code().as_u16(), 200);
        let second = executor.execute(&mut request)?;
        assert_eq!(second.status_code().as_u16(), 500);
        feeder.join().unwrap();

        let err = executor.execute(&mut request).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
        Ok(())
    }
}
