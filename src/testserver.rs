//! A minimal TCP test server for socket-level tests (keep-alive, real
//! disconnects). One handler thread per accepted connection.

use std::io::{self, BufRead};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

pub(crate) struct TestServer {
    pub port: u16,
    done: Arc<AtomicBool>,
}

impl TestServer {
    pub fn new<H>(handler: H) -> Self
    where
        H: Fn(TcpStream) -> io::Result<()> + Send + Sync + 'static,
    {
        let _ = env_logger::try_init();

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let done = Arc::new(AtomicBool::new(false));
        let done_flag = done.clone();
        let handler = Arc::new(handler);
        thread::spawn(move || {
            for stream in listener.incoming() {
                if done_flag.load(Ordering::SeqCst) {
                    break;
                }
                match stream {
                    Ok(stream) => {
                        let handler = handler.clone();
                        thread::spawn(move || handler(stream));
                    }
                    Err(e) => {
                        eprintln!("testserver: accept error: {}", e);
                        break;
                    }
                }
            }
        });
        TestServer { port, done }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://127.0.0.1:{}{}", self.port, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.done.store(true, Ordering::SeqCst);
        // connect once to unblock the listen loop
        let _ = TcpStream::connect(("127.0.0.1", self.port));
    }
}

/// Read request line plus headers. Empty vec when the client went away.
pub(crate) fn read_head(reader: &mut impl BufRead) -> Vec<String> {
    let mut lines = vec![];
    loop {
        let mut line = String::new();
        match reader.read_line(&mut line) {
            Ok(0) | Err(_) => return vec![],
            Ok(_) => {}
        }
        let line = line.trim_end_matches(['\r', '\n'].as_ref());
        if line.is_empty() {
            break;
        }
        lines.push(line.to_string());
    }
    lines
}
