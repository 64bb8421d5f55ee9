// crates/rollout-storage/tests/chunked_uploads.rs
// ============================================================================
// Module: Chunked Upload Tests
// Description: S3 multipart and Azure block uploads against a local endpoint.
// Purpose: Pin the request sequence of large uploads and their failure paths.
// Dependencies: rollout-storage, rollout-core, tiny_http, tokio
// ============================================================================

//! ## Overview
//! A `tiny_http` server on the loopback interface stands in for the provider.
//! It records every request and answers from a per-test responder, so the
//! tests can observe part staging, commits, and aborts without credentials
//! or network access.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

use std::io::Cursor;
use std::sync::Arc;
use std::sync::Mutex;
use std::thread;

use rollout_core::ObjectStorage;
use rollout_core::ObjectStorageError;
use rollout_core::RequestContext;
use rollout_core::StorageOp;
use rollout_storage::AzureCredentials;
use rollout_storage::AzureOptions;
use rollout_storage::AzureStorage;
use rollout_storage::S3Options;
use rollout_storage::S3Storage;
use rollout_storage::StaticCredentials;
use rollout_storage::azblob;
use rollout_storage::s3;
use tiny_http::Header;
use tiny_http::Response;
use tiny_http::Server;

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Response type produced by the responders.
type Reply = Response<Cursor<Vec<u8>>>;

/// One request observed by the local endpoint.
#[derive(Debug, Clone)]
struct Seen {
    /// HTTP method.
    method: String,
    /// Path and query.
    url: String,
    /// Lower-cased header names with their values.
    headers: Vec<(String, String)>,
    /// Request body.
    body: Vec<u8>,
}

impl Seen {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers.iter().find(|(field, _)| field == name).map(|(_, value)| value.as_str())
    }
}

/// Local endpoint handle.
struct Endpoint {
    /// Base URL, without a trailing slash.
    base: String,
    /// Requests in arrival order.
    seen: Arc<Mutex<Vec<Seen>>>,
}

impl Endpoint {
    fn requests(&self) -> Vec<Seen> {
        self.seen.lock().unwrap().clone()
    }
}

/// Serves requests on a loopback port until the test process exits.
fn serve<F>(respond: F) -> Endpoint
where
    F: Fn(&str, &str) -> Reply + Send + 'static,
{
    let server = Server::http("127.0.0.1:0").unwrap();
    let addr = server.server_addr().to_ip().unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&seen);
    thread::spawn(move || {
        for mut request in server.incoming_requests() {
            let mut body = Vec::new();
            request.as_reader().read_to_end(&mut body).unwrap();
            let method = request.method().to_string();
            let url = request.url().to_string();
            let headers = request
                .headers()
                .iter()
                .map(|header| {
                    (header.field.to_string().to_ascii_lowercase(), header.value.to_string())
                })
                .collect();
            let reply = respond(&method, &url);
            log.lock().unwrap().push(Seen {
                method,
                url,
                headers,
                body,
            });
            let _ = request.respond(reply);
        }
    });
    Endpoint {
        base: format!("http://{addr}"),
        seen,
    }
}

fn xml(status: u16, body: &str) -> Reply {
    Response::from_string(body)
        .with_status_code(status)
        .with_header(Header::from_bytes(&b"Content-Type"[..], &b"application/xml"[..]).unwrap())
}

fn empty(status: u16) -> Reply {
    Response::from_string("").with_status_code(status)
}

// ============================================================================
// SECTION: S3 Multipart
// ============================================================================

const UPLOAD_ID: &str = "upload-1";

const INITIATED: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
    <InitiateMultipartUploadResult xmlns=\"http://s3.amazonaws.com/doc/2006-03-01/\">\
    <Bucket>artifacts</Bucket><Key>art-1</Key><UploadId>upload-1</UploadId>\
    </InitiateMultipartUploadResult>";

const COMPLETED: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
    <CompleteMultipartUploadResult xmlns=\"http://s3.amazonaws.com/doc/2006-03-01/\">\
    <Location>http://127.0.0.1/artifacts/art-1</Location><Bucket>artifacts</Bucket>\
    <Key>art-1</Key><ETag>\"combined\"</ETag></CompleteMultipartUploadResult>";

const ACCESS_DENIED: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
    <Error><Code>AccessDenied</Code><Message>Access Denied</Message>\
    <RequestId>req-1</RequestId></Error>";

async fn s3_storage(endpoint: &Endpoint) -> S3Storage {
    let mut options = S3Options::new("artifacts");
    options.region = Some("us-east-1".to_string());
    options.uri = Some(endpoint.base.clone());
    options.force_path_style = true;
    options.buffer_size = s3::MIN_BUFFER_SIZE;
    options.credentials = Some(StaticCredentials {
        key: "AKIDEXAMPLE".to_string(),
        secret: "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY".to_string(),
        token: None,
    });
    S3Storage::from_options(options).await.unwrap()
}

/// Answers the multipart calls, delegating part uploads and aborts.
fn multipart_responder(
    part: fn() -> Reply,
    abort: fn() -> Reply,
) -> impl Fn(&str, &str) -> Reply + Send + 'static {
    move |method: &str, url: &str| match method {
        "POST" if url.contains("uploads") => xml(200, INITIATED),
        "POST" if url.contains("uploadId=") => xml(200, COMPLETED),
        "PUT" if url.contains("partNumber=") => part(),
        "DELETE" if url.contains("uploadId=") => abort(),
        _ => empty(200),
    }
}

fn part_accepted() -> Reply {
    empty(200).with_header(Header::from_bytes(&b"ETag"[..], &b"\"part\""[..]).unwrap())
}

fn denied() -> Reply {
    xml(403, ACCESS_DENIED)
}

fn aborted() -> Reply {
    empty(204)
}

fn is_part_upload(seen: &Seen) -> bool {
    seen.method == "PUT" && seen.url.contains("partNumber=")
}

fn is_abort(seen: &Seen) -> bool {
    seen.method == "DELETE" && seen.url.contains(&format!("uploadId={UPLOAD_ID}"))
}

#[tokio::test]
async fn s3_payload_larger_than_one_part_is_uploaded_in_parts_and_completed() {
    let endpoint = serve(multipart_responder(part_accepted, aborted));
    let storage = s3_storage(&endpoint).await;
    let payload = vec![7_u8; s3::MIN_BUFFER_SIZE + 10];
    let mut reader: &[u8] = &payload;

    storage.put_object(&RequestContext::new(), "art-1", &mut reader).await.unwrap();

    let requests = endpoint.requests();
    let parts: Vec<&Seen> = requests.iter().filter(|seen| is_part_upload(seen)).collect();
    assert_eq!(parts.len(), 2);
    assert!(parts[0].url.contains("partNumber=1"));
    assert!(parts[1].url.contains("partNumber=2"));
    assert!(requests.iter().all(|seen| !is_abort(seen)));

    let complete = requests.last().unwrap();
    assert_eq!(complete.method, "POST");
    assert!(complete.url.starts_with("/artifacts/art-1?"));
    let body = String::from_utf8(complete.body.clone()).unwrap();
    assert!(body.contains("<PartNumber>1</PartNumber>"));
    assert!(body.contains("<PartNumber>2</PartNumber>"));
}

#[tokio::test]
async fn s3_failed_part_aborts_the_multipart_upload() {
    let endpoint = serve(multipart_responder(denied, aborted));
    let storage = s3_storage(&endpoint).await;
    let payload = vec![7_u8; s3::MIN_BUFFER_SIZE + 10];
    let mut reader: &[u8] = &payload;

    let err = storage.put_object(&RequestContext::new(), "art-1", &mut reader).await.unwrap_err();
    assert!(matches!(
        err,
        ObjectStorageError::Backend {
            provider: "s3",
            op: StorageOp::PutObject,
            ..
        }
    ));
    assert!(!err.to_string().contains("aborting multipart upload"));

    let requests = endpoint.requests();
    assert_eq!(requests.iter().filter(|seen| is_part_upload(seen)).count(), 1);
    assert!(requests.last().is_some_and(is_abort));
    assert!(!requests.iter().any(|seen| seen.method == "POST" && seen.url.contains("uploadId=")));
}

#[tokio::test]
async fn s3_failed_abort_is_reported_with_the_upload_error() {
    let endpoint = serve(multipart_responder(denied, denied));
    let storage = s3_storage(&endpoint).await;
    let payload = vec![7_u8; s3::MIN_BUFFER_SIZE + 10];
    let mut reader: &[u8] = &payload;

    let err = storage.put_object(&RequestContext::new(), "art-1", &mut reader).await.unwrap_err();
    let message = err.to_string();
    assert!(message.starts_with("s3 PutObject: "));
    assert!(message.contains("aborting multipart upload upload-1 failed"));
    assert!(endpoint.requests().iter().any(is_abort));
}

// ============================================================================
// SECTION: Azure Blocks
// ============================================================================

fn azure_storage(endpoint: &Endpoint) -> AzureStorage {
    let mut options = AzureOptions::new("artifacts");
    options.buffer_size = azblob::MIN_BUFFER_SIZE;
    options.content_type = Some("application/vnd.rollout.artifact".to_string());
    options.credentials = Some(
        AzureCredentials::shared_key("acct", "Zm9vYmFy", Some(&format!("{}/acct", endpoint.base)))
            .unwrap(),
    );
    AzureStorage::new(options).unwrap()
}

fn is_staged_block(seen: &Seen) -> bool {
    seen.method == "PUT" && seen.url.contains("comp=block&")
}

#[tokio::test]
async fn azure_payload_larger_than_one_block_is_staged_and_committed() {
    let endpoint = serve(|_, _| empty(201));
    let storage = azure_storage(&endpoint);
    let payload = vec![3_u8; azblob::MIN_BUFFER_SIZE * 2 + 100];
    let mut reader: &[u8] = &payload;

    storage.put_object(&RequestContext::new(), "art-1", &mut reader).await.unwrap();

    let requests = endpoint.requests();
    assert_eq!(requests.len(), 4);
    let staged: Vec<&Seen> = requests.iter().filter(|seen| is_staged_block(seen)).collect();
    assert_eq!(staged.len(), 3);
    for (seen, block_id) in staged.iter().zip(["MDAwMDA%3D", "MDAwMDE%3D", "MDAwMDI%3D"]) {
        assert!(seen.url.starts_with("/acct/artifacts/art-1?"));
        assert!(seen.url.contains(&format!("blockid={block_id}")));
    }
    assert_eq!(staged[0].body.len(), azblob::MIN_BUFFER_SIZE);
    assert_eq!(staged[1].body.len(), azblob::MIN_BUFFER_SIZE);
    assert_eq!(staged[2].body.len(), 100);

    let commit = &requests[3];
    assert_eq!(commit.method, "PUT");
    assert!(commit.url.contains("comp=blocklist"));
    assert_eq!(
        String::from_utf8(commit.body.clone()).unwrap(),
        "<?xml version=\"1.0\" encoding=\"utf-8\"?><BlockList><Latest>MDAwMDA=</Latest>\
         <Latest>MDAwMDE=</Latest><Latest>MDAwMDI=</Latest></BlockList>"
    );
    assert_eq!(commit.header("x-ms-blob-content-type"), Some("application/vnd.rollout.artifact"));
}

#[tokio::test]
async fn azure_payload_within_one_block_is_a_single_put_blob() {
    let endpoint = serve(|_, _| empty(201));
    let storage = azure_storage(&endpoint);
    let mut reader: &[u8] = b"small artifact";

    storage.put_object(&RequestContext::new(), "art-1", &mut reader).await.unwrap();

    let requests = endpoint.requests();
    assert_eq!(requests.len(), 1);
    assert!(!requests[0].url.contains("comp="));
    assert_eq!(requests[0].header("x-ms-blob-type"), Some("BlockBlob"));
    assert_eq!(requests[0].body, b"small artifact");
}

#[tokio::test]
async fn azure_failed_block_is_never_committed() {
    let endpoint = serve(|_, url| {
        if url.contains("blockid=MDAwMDE") {
            empty(500).with_header(
                Header::from_bytes(&b"x-ms-error-code"[..], &b"InternalError"[..]).unwrap(),
            )
        } else {
            empty(201)
        }
    });
    let storage = azure_storage(&endpoint);
    let payload = vec![3_u8; azblob::MIN_BUFFER_SIZE * 2 + 100];
    let mut reader: &[u8] = &payload;

    let err = storage.put_object(&RequestContext::new(), "art-1", &mut reader).await.unwrap_err();
    assert_eq!(
        err.to_string(),
        "azblob PutObject: failed to stage block: 500 Internal Server Error InternalError"
    );
    let requests = endpoint.requests();
    assert_eq!(requests.len(), 2);
    assert!(requests.iter().all(|seen| !seen.url.contains("comp=blocklist")));
}
