use std::io::Read;
use std::sync::{Arc, Mutex};

use crate::test;
use crate::{Error, Request};

#[test]
fn redirect_on() {
    test::set_handler("/redirect_on1", |_| {
        test::make_response(
            301,
            "Moved",
            vec!["Location: /redirect_on2", "Content-Length: 0"],
            vec![],
        )
    });
    test::set_handler("/redirect_on2", |_| {
        test::make_response(200, "OK", vec!["Content-Length: 5"], b"hello".to_vec())
    });
    let agent = test::test_agent();
    let request = Request::new("GET", "test://host/redirect_on1").unwrap();
    let (value, url, resp) = agent
        .call_with_response(request, None, |_, body| {
            let mut s = String::new();
            body.read_to_string(&mut s)?;
            Ok(s)
        })
        .unwrap();
    assert_eq!(value, "hello");
    assert_eq!(url.as_str(), "test://host/redirect_on2");
    assert_eq!(resp.status(), 200);
}

#[test]
fn redirect_absolute_location() {
    test::set_handler("/redirect_abs1", |_| {
        test::make_response(
            302,
            "Found",
            vec!["Location: test://other/redirect_abs2", "Content-Length: 0"],
            vec![],
        )
    });
    test::set_handler("/redirect_abs2", |_| {
        test::make_response(200, "OK", vec!["Content-Length: 2"], b"ok".to_vec())
    });
    let resp = test::test_agent().get("test://host/redirect_abs1").call().unwrap();
    assert_eq!(resp.get_url().as_str(), "test://other/redirect_abs2");
}

#[test]
fn redirect_many() {
    for n in 1..=7 {
        let next = format!("Location: /redirect_many{}", n + 1);
        test::set_handler(&format!("/redirect_many{}", n), move |_| {
            test::make_response(302, "Found", vec![next.as_str(), "Content-Length: 0"], vec![])
        });
    }
    let err = test::test_agent()
        .get("test://host/redirect_many1")
        .redirects(3)
        .call()
        .unwrap_err();
    assert!(matches!(err, Error::TooManyRedirects(4)));
}

#[test]
fn redirect_303_forces_get_and_drops_body() {
    test::set_handler("/redirect_303_1", |_| {
        test::make_response(
            303,
            "See Other",
            vec!["Location: /redirect_303_2", "Content-Length: 0"],
            vec![],
        )
    });
    let capture = Arc::new(Mutex::new(vec![]));
    let c = capture.clone();
    test::set_handler("/redirect_303_2", move |_| {
        test::make_captured_response(200, "OK", vec!["Content-Length: 2"], b"ok".to_vec(), c.clone())
    });
    let resp = test::test_agent()
        .post("test://host/redirect_303_1")
        .send_form(&[("k", "v")])
        .unwrap();
    assert_eq!(resp.into_string().unwrap(), "ok");

    let text = test::captured(&capture);
    assert!(text.starts_with("GET /redirect_303_2 HTTP/1.1\r\n"), "{}", text);
    assert!(test::captured_header(&capture, "content-length").is_none());
    assert!(test::captured_header(&capture, "content-type").is_none());
    assert!(text.ends_with("\r\n\r\n"), "{}", text);
}

#[test]
fn redirect_307_keeps_method_and_body() {
    test::set_handler("/redirect_307_1", |_| {
        test::make_response(
            307,
            "Temporary",
            vec!["Location: /redirect_307_2", "Content-Length: 0"],
            vec![],
        )
    });
    let capture = Arc::new(Mutex::new(vec![]));
    let c = capture.clone();
    test::set_handler("/redirect_307_2", move |_| {
        test::make_captured_response(200, "OK", vec!["Content-Length: 0"], vec![], c.clone())
    });
    test::test_agent()
        .post("test://host/redirect_307_1")
        .send_string("abc")
        .unwrap();
    let text = test::captured(&capture);
    assert!(text.starts_with("POST /redirect_307_2 HTTP/1.1\r\n"), "{}", text);
    assert!(text.ends_with("\r\n\r\nabc"), "{}", text);
}

#[test]
fn redirect_keeps_user_headers() {
    test::set_handler("/redirect_hdr1", |_| {
        test::make_response(
            302,
            "Found",
            vec!["Location: /redirect_hdr2", "Content-Length: 0"],
            vec![],
        )
    });
    let capture = Arc::new(Mutex::new(vec![]));
    let c = capture.clone();
    test::set_handler("/redirect_hdr2", move |_| {
        test::make_captured_response(200, "OK", vec!["Content-Length: 0"], vec![], c.clone())
    });
    test::test_agent()
        .get("test://host/redirect_hdr1")
        .set("Range", "bytes=10-50")
        .call()
        .unwrap();
    assert_eq!(test::captured_header(&capture, "range").unwrap(), "bytes=10-50");
}

#[test]
fn redirect_without_location_is_terminal() {
    test::set_handler("/redirect_noloc", |_| {
        test::make_response(301, "Moved", vec!["Content-Length: 0"], vec![])
    });
    let err = test::test_agent().get("test://host/redirect_noloc").call().unwrap_err();
    // a 3xx that can't be followed is handed over, then classified
    assert!(matches!(err, Error::UnexpectedStatus(_)));
}

#[test]
fn proxy_hint_305_is_one_shot() {
    // the 305 response names a proxy; the request is reissued through it
    // with an absolute-form request line, exactly once
    test::set_handler("/proxy_hint", |_| {
        test::make_response(
            305,
            "Use Proxy",
            vec!["Location: test://proxyhost:9/", "Content-Length: 0"],
            vec![],
        )
    });
    let capture = Arc::new(Mutex::new(vec![]));
    let c = capture.clone();
    test::set_handler("/proxy_hint", move |_| {
        test::make_captured_response(200, "OK", vec!["Content-Length: 2"], b"ok".to_vec(), c.clone())
    });
    let resp = test::test_agent().get("test://host/proxy_hint").call().unwrap();
    assert_eq!(resp.into_string().unwrap(), "ok");
    let text = test::captured(&capture);
    assert!(
        text.starts_with("GET test://host/proxy_hint HTTP/1.1\r\n"),
        "{}",
        text
    );
}
