use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::Duration;

pub const STUB_TOKEN: &str = "stub-token";

#[derive(Debug, Clone, Default)]
pub struct SharePointStubConfig {
    /// Body served for the navigation config; `None` answers 404.
    pub document: Option<String>,
    pub fail_download: bool,
    pub fail_upload: bool,
}

#[derive(Debug, Clone)]
pub struct Upload {
    pub url: String,
    pub authorization: Option<String>,
    pub body: String,
}

#[derive(Debug, Default)]
pub struct StubLog {
    pub token_requests: usize,
    pub downloads: usize,
    pub uploads: Vec<Upload>,
}

pub struct SharePointStub {
    pub base_url: String,
    pub log: Arc<Mutex<StubLog>>,
    shutdown_tx: Option<mpsc::Sender<()>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl SharePointStub {
    pub fn spawn(config: SharePointStubConfig) -> Self {
        let server = tiny_http::Server::http("127.0.0.1:0").expect("start sharepoint stub server");
        let addr = server.server_addr();
        let base_url = format!("http://{addr}");

        let log = Arc::new(Mutex::new(StubLog::default()));
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let thread_log = Arc::clone(&log);
        let handle = thread::spawn(move || {
            let mut document = config.document.clone();
            let expected_auth = format!("Bearer {STUB_TOKEN}");
            loop {
                if shutdown_rx.try_recv().is_ok() {
                    break;
                }

                let mut request = match server.recv_timeout(Duration::from_millis(50)) {
                    Ok(Some(req)) => req,
                    Ok(None) => continue,
                    Err(_) => break,
                };

                let url = request.url().to_string();
                let method = request.method().clone();
                let authorization = request
                    .headers()
                    .iter()
                    .find(|h| h.field.equiv("Authorization"))
                    .map(|h| h.value.as_str().to_owned());

                let mut body = String::new();
                if request.as_reader().read_to_string(&mut body).is_err() {
                    let _ = request.respond(
                        tiny_http::Response::from_string("invalid request body")
                            .with_status_code(400),
                    );
                    continue;
                }

                let (status, response_body) = if method == tiny_http::Method::Post
                    && url == "/token"
                {
                    thread_log.lock().expect("lock stub log").token_requests += 1;
                    if body.contains("grant_type=client_credentials")
                        && body.contains("client_secret=")
                    {
                        (
                            200,
                            format!(
                                r#"{{"token_type":"Bearer","expires_in":3599,"access_token":"{STUB_TOKEN}"}}"#
                            ),
                        )
                    } else {
                        (
                            400,
                            r#"{"error":"invalid_request","error_description":"unsupported grant"}"#
                                .to_owned(),
                        )
                    }
                } else if authorization.as_deref() != Some(expected_auth.as_str()) {
                    (
                        401,
                        r#"{"error":{"message":{"value":"Access denied."}}}"#.to_owned(),
                    )
                } else if method == tiny_http::Method::Get
                    && url.contains("/_api/web/GetFileByServerRelativeUrl(")
                {
                    thread_log.lock().expect("lock stub log").downloads += 1;
                    match &document {
                        _ if config.fail_download => (
                            503,
                            r#"{"error":{"message":{"value":"Server busy."}}}"#.to_owned(),
                        ),
                        Some(doc) => (200, doc.clone()),
                        None => (
                            404,
                            r#"{"error":{"code":"-2147024894","message":{"value":"File Not Found."}}}"#
                                .to_owned(),
                        ),
                    }
                } else if method == tiny_http::Method::Post && url.contains("/Files/add(") {
                    thread_log
                        .lock()
                        .expect("lock stub log")
                        .uploads
                        .push(Upload {
                            url: url.clone(),
                            authorization: authorization.clone(),
                            body: body.clone(),
                        });
                    if config.fail_upload {
                        (
                            500,
                            r#"{"error":{"message":{"value":"Save conflict."}}}"#.to_owned(),
                        )
                    } else {
                        document = Some(body);
                        (200, "{}".to_owned())
                    }
                } else {
                    (404, "not found".to_owned())
                };

                let header =
                    tiny_http::Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..])
                        .expect("build header");
                let response = tiny_http::Response::from_string(response_body)
                    .with_status_code(status)
                    .with_header(header);
                let _ = request.respond(response);
            }
        });

        Self {
            base_url,
            log,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    pub fn site_url(&self) -> String {
        format!("{}/sites/shan", self.base_url)
    }

    pub fn token_url(&self) -> String {
        format!("{}/token", self.base_url)
    }

    pub fn uploads(&self) -> Vec<Upload> {
        self.log.lock().expect("lock stub log").uploads.clone()
    }

    pub fn token_requests(&self) -> usize {
        self.log.lock().expect("lock stub log").token_requests
    }

    pub fn downloads(&self) -> usize {
        self.log.lock().expect("lock stub log").downloads
    }
}

impl Drop for SharePointStub {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
