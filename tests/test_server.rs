#![cfg(unix)]
use microserv::config::parse_config_string;
use microserv::network::server::Server;
use std::fs;
use std::io::{Read, Write};
use std::net::TcpStream;
use std::os::unix::fs::PermissionsExt;
use std::thread;
use std::time::{Duration, Instant};

/// Spin up a server on its own thread; the loop never returns
fn start_server(config: &str) {
    let configs = parse_config_string(config).unwrap();
    thread::spawn(move || {
        let _ = Server::new(configs).run();
    });
}

fn connect(port: u16) -> TcpStream {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        match TcpStream::connect(("127.0.0.1", port)) {
            Ok(stream) => {
                stream
                    .set_read_timeout(Some(Duration::from_secs(10)))
                    .unwrap();
                return stream;
            }
            Err(_) if Instant::now() < deadline => thread::sleep(Duration::from_millis(50)),
            Err(e) => panic!("could not connect to test server: {}", e),
        }
    }
}

/// Read one response: status line, headers, Content-Length body
fn read_response(stream: &mut TcpStream) -> (String, String, Vec<u8>) {
    let mut raw = Vec::new();
    let mut buf = [0u8; 4096];

    let header_end = loop {
        if let Some(pos) = raw.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos;
        }
        let n = stream.read(&mut buf).expect("read failed");
        assert!(n > 0, "connection closed before headers completed");
        raw.extend_from_slice(&buf[..n]);
    };

    let head = String::from_utf8_lossy(&raw[..header_end]).to_string();
    let status_line = head.lines().next().unwrap_or("").to_string();

    let content_length: usize = head
        .lines()
        .find_map(|l| l.strip_prefix("Content-Length: "))
        .and_then(|v| v.trim().parse().ok())
        .expect("response without Content-Length");

    let mut body: Vec<u8> = raw[header_end + 4..].to_vec();
    while body.len() < content_length {
        let n = stream.read(&mut buf).expect("body read failed");
        assert!(n > 0, "connection closed mid-body");
        body.extend_from_slice(&buf[..n]);
    }
    body.truncate(content_length);

    (status_line, head, body)
}

fn send(stream: &mut TcpStream, request: &str) {
    stream.write_all(request.as_bytes()).unwrap();
    stream.flush().unwrap();
}

#[test]
fn test_get_static_file_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("index.html"), "hi\n").unwrap();

    let config = format!(
        r#"
        server {{
            listen 18321;
            root {};
            location / {{
                index index.html;
            }}
        }}
        "#,
        dir.path().display()
    );
    start_server(&config);

    let mut stream = connect(18321);
    send(&mut stream, "GET / HTTP/1.1\r\nHost: x\r\n\r\n");

    let (status, head, body) = read_response(&mut stream);
    assert_eq!(status, "HTTP/1.1 200 OK");
    assert!(head.contains("Content-Type: text/html"));
    assert!(head.contains("Content-Length: 3"));
    assert_eq!(body, b"hi\n");

    // Keep-alive: a second request rides the same connection
    send(&mut stream, "GET /index.html HTTP/1.1\r\nHost: x\r\n\r\n");
    let (status, _, body) = read_response(&mut stream);
    assert_eq!(status, "HTTP/1.1 200 OK");
    assert_eq!(body, b"hi\n");
}

#[test]
fn test_upload_fetch_delete_cycle() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir(dir.path().join("up")).unwrap();

    let config = format!(
        r#"
        server {{
            listen 18322;
            root {};
            location / {{
                allow_methods GET POST DELETE;
            }}
        }}
        "#,
        dir.path().display()
    );
    start_server(&config);

    let mut stream = connect(18322);

    send(
        &mut stream,
        "POST /up/file.txt HTTP/1.1\r\nHost: x\r\nContent-Length: 5\r\n\r\nhello",
    );
    let (status, _, _) = read_response(&mut stream);
    assert_eq!(status, "HTTP/1.1 201 Created");

    send(&mut stream, "GET /up/file.txt HTTP/1.1\r\nHost: x\r\n\r\n");
    let (status, _, body) = read_response(&mut stream);
    assert_eq!(status, "HTTP/1.1 200 OK");
    assert_eq!(body, b"hello");

    send(&mut stream, "DELETE /up/file.txt HTTP/1.1\r\nHost: x\r\n\r\n");
    let (status, _, body) = read_response(&mut stream);
    assert_eq!(status, "HTTP/1.1 204 No Content");
    assert!(body.is_empty());

    send(&mut stream, "GET /up/file.txt HTTP/1.1\r\nHost: x\r\n\r\n");
    let (status, _, _) = read_response(&mut stream);
    assert_eq!(status, "HTTP/1.1 404 Not Found");
}

#[test]
fn test_chunked_post_end_to_end() {
    let dir = tempfile::tempdir().unwrap();

    let config = format!(
        r#"
        server {{
            listen 18323;
            root {};
            location / {{
                allow_methods GET POST;
            }}
        }}
        "#,
        dir.path().display()
    );
    start_server(&config);

    let mut stream = connect(18323);
    send(
        &mut stream,
        "POST /chunky.bin HTTP/1.1\r\nHost: x\r\nTransfer-Encoding: chunked\r\n\r\n5\r\nhello\r\n6\r\n world\r\n0\r\n\r\n",
    );
    let (status, _, _) = read_response(&mut stream);
    assert_eq!(status, "HTTP/1.1 201 Created");

    let content = fs::read(dir.path().join("chunky.bin")).unwrap();
    assert_eq!(content, b"hello world");
}

#[test]
fn test_slow_cgi_times_out_and_connection_survives() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir(dir.path().join("cgi")).unwrap();
    fs::write(dir.path().join("static.txt"), "still alive").unwrap();

    let script = dir.path().join("cgi/slow.sh");
    fs::write(&script, "#!/bin/sh\nsleep 10\n").unwrap();
    fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();

    let config = format!(
        r#"
        server {{
            listen 18324;
            root {};
            location / {{
            }}
            location /cgi {{
                cgi_ext .sh;
            }}
        }}
        "#,
        dir.path().display()
    );
    start_server(&config);

    let mut stream = connect(18324);
    let started = Instant::now();
    send(&mut stream, "GET /cgi/slow.sh HTTP/1.1\r\nHost: x\r\n\r\n");

    let (status, _, _) = read_response(&mut stream);
    assert_eq!(status, "HTTP/1.1 504 Gateway Timeout");
    assert!(
        started.elapsed() < Duration::from_secs(6),
        "504 took {:?}",
        started.elapsed()
    );

    // Same connection keeps working after the timeout
    send(&mut stream, "GET /static.txt HTTP/1.1\r\nHost: x\r\n\r\n");
    let (status, _, body) = read_response(&mut stream);
    assert_eq!(status, "HTTP/1.1 200 OK");
    assert_eq!(body, b"still alive");
}

#[test]
fn test_cgi_response_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir(dir.path().join("cgi")).unwrap();

    let script = dir.path().join("cgi/greet.sh");
    fs::write(
        &script,
        "#!/bin/sh\nprintf 'Content-Type: text/html\\r\\n\\r\\n<p>cgi says hi</p>'\n",
    )
    .unwrap();
    fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();

    let config = format!(
        r#"
        server {{
            listen 18325;
            root {};
            location /cgi {{
                cgi_ext .sh;
            }}
        }}
        "#,
        dir.path().display()
    );
    start_server(&config);

    let mut stream = connect(18325);
    send(&mut stream, "GET /cgi/greet.sh HTTP/1.1\r\nHost: x\r\n\r\n");

    let (status, head, body) = read_response(&mut stream);
    assert_eq!(status, "HTTP/1.1 200 OK");
    assert!(head.contains("Content-Type: text/html"));
    assert_eq!(body, b"<p>cgi says hi</p>");
}

#[test]
fn test_connection_close_honored() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("a.txt"), "x").unwrap();

    let config = format!(
        r#"
        server {{
            listen 18326;
            root {};
            location / {{
            }}
        }}
        "#,
        dir.path().display()
    );
    start_server(&config);

    let mut stream = connect(18326);
    send(
        &mut stream,
        "GET /a.txt HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n",
    );
    let (status, head, _) = read_response(&mut stream);
    assert_eq!(status, "HTTP/1.1 200 OK");
    assert!(head.contains("Connection: close"));

    // Peer should close; reads eventually return 0
    let mut buf = [0u8; 16];
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        match stream.read(&mut buf) {
            Ok(0) => break,
            Ok(_) => continue,
            Err(_) if Instant::now() < deadline => thread::sleep(Duration::from_millis(20)),
            Err(e) => panic!("expected close, got {}", e),
        }
    }
}

#[test]
fn test_unknown_method_gets_501() {
    let dir = tempfile::tempdir().unwrap();

    let config = format!(
        r#"
        server {{
            listen 18327;
            root {};
            location / {{
            }}
        }}
        "#,
        dir.path().display()
    );
    start_server(&config);

    let mut stream = connect(18327);
    send(&mut stream, "PATCH /x HTTP/1.1\r\nHost: x\r\n\r\n");
    let (status, _, _) = read_response(&mut stream);
    assert_eq!(status, "HTTP/1.1 501 Not Implemented");
}
