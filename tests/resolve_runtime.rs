//! Integration tests for musl runtime asset resolution.
//!
//! These tests use local HTTP servers so the full flow (page fetch, anchor
//! scan, href resolution, reachability check) runs without touching the
//! real vendor page.

use std::io::{BufRead, BufReader, Write};
use std::net::TcpListener;
use std::thread;

use bombom_release::resolver::resolve_runtime_url;

/// Start a server that answers GET requests with `html` and HEAD requests
/// with `head_status`, for any number of connections.
fn spawn_vendor_server(html: &'static str, head_status: u16) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("failed to bind");
    let addr = listener.local_addr().unwrap();

    thread::spawn(move || {
        loop {
            let Ok((mut stream, _)) = listener.accept() else {
                return;
            };
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut request_line = String::new();
            let _ = reader.read_line(&mut request_line);
            let method = request_line.split_whitespace().next().unwrap_or("");

            let response = if method == "HEAD" {
                format!(
                    "HTTP/1.1 {head_status} X\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
                )
            } else {
                format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{html}",
                    html.len()
                )
            };
            let _ = stream.write_all(response.as_bytes());
            let _ = stream.flush();
        }
    });

    format!("http://{addr}")
}

/// Start a server that always answers with the given status and no body.
fn spawn_status_server(status: u16) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("failed to bind");
    let addr = listener.local_addr().unwrap();

    thread::spawn(move || {
        loop {
            let Ok((mut stream, _)) = listener.accept() else {
                return;
            };
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut request_line = String::new();
            let _ = reader.read_line(&mut request_line);

            let response = format!(
                "HTTP/1.1 {status} X\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
            );
            let _ = stream.write_all(response.as_bytes());
            let _ = stream.flush();
        }
    });

    format!("http://{addr}")
}

const TWO_ARCH_PAGE: &str = r#"
    <html><body>
    <h1>Downloads</h1>
    <a href="/x86_64-runtime.so">musl runtime (x86_64)</a>
    <a href="/aarch64-runtime.so">musl runtime (aarch64)</a>
    </body></html>
"#;

#[test]
fn resolves_relative_href_against_page_base() {
    let base = spawn_vendor_server(TWO_ARCH_PAGE, 200);

    let amd64 = resolve_runtime_url(&base, "x86_64").unwrap();
    assert_eq!(amd64, format!("{base}/x86_64-runtime.so"));

    let arm64 = resolve_runtime_url(&base, "aarch64").unwrap();
    assert_eq!(arm64, format!("{base}/aarch64-runtime.so"));
}

#[test]
fn reports_asset_not_found_when_no_anchor_matches() {
    let base = spawn_vendor_server(
        r#"<a href="/notes.html">runtime release notes</a>"#,
        200,
    );

    let err = resolve_runtime_url(&base, "x86_64").unwrap_err();
    let msg = format!("{err:#}");
    assert!(msg.contains("no link"), "got: {msg}");
    assert!(msg.contains("x86_64"), "got: {msg}");
}

#[test]
fn reports_unreachable_asset_on_failed_head_check() {
    let base = spawn_vendor_server(TWO_ARCH_PAGE, 404);

    let err = resolve_runtime_url(&base, "aarch64").unwrap_err();
    let msg = format!("{err:#}");
    assert!(msg.contains("unreachable"), "got: {msg}");
    assert!(msg.contains("404"), "got: {msg}");
}

#[test]
fn reports_fetch_error_when_page_keeps_failing() {
    let base = spawn_status_server(500);

    let err = resolve_runtime_url(&base, "x86_64").unwrap_err();
    let msg = format!("{err:#}");
    assert!(msg.contains("failed after 3 attempt"), "got: {msg}");
}

#[test]
fn follows_absolute_href_to_another_host() {
    // The asset lives on a CDN host distinct from the vendor page.
    let cdn = spawn_status_server(200);
    let page = format!(
        r#"<a href="{cdn}/blobs/x86_64-runtime.so">musl runtime (x86_64)</a>"#
    );
    let page: &'static str = Box::leak(page.into_boxed_str());
    let base = spawn_vendor_server(page, 200);

    let resolved = resolve_runtime_url(&base, "x86_64").unwrap();
    assert_eq!(resolved, format!("{cdn}/blobs/x86_64-runtime.so"));
}
