use std::sync::{Arc, Mutex};

use url::Url;

use crate::cookies::{Cookie, CookieInfo};
use crate::test;

#[test]
fn set_cookie_is_sent_back() {
    test::set_handler("/cookie_set", |_| {
        test::make_response(
            200,
            "OK",
            vec!["Set-Cookie: session=abc123; Path=/", "Content-Length: 0"],
            vec![],
        )
    });
    let capture = Arc::new(Mutex::new(vec![]));
    let c = capture.clone();
    test::set_handler("/cookie_get", move |_| {
        test::make_captured_response(200, "OK", vec!["Content-Length: 0"], vec![], c.clone())
    });

    let agent = test::test_agent();
    agent.get("test://host/cookie_set").call().unwrap();
    agent.get("test://host/cookie_get").call().unwrap();

    assert_eq!(
        test::captured_header(&capture, "cookie").unwrap(),
        "session=abc123"
    );
}

#[test]
fn cookie_not_sent_to_other_host() {
    test::set_handler("/cookie_scope_set", |_| {
        test::make_response(
            200,
            "OK",
            vec!["Set-Cookie: k=v; Path=/", "Content-Length: 0"],
            vec![],
        )
    });
    let capture = Arc::new(Mutex::new(vec![]));
    let c = capture.clone();
    test::set_handler("/cookie_scope_get", move |_| {
        test::make_captured_response(200, "OK", vec!["Content-Length: 0"], vec![], c.clone())
    });

    let agent = test::test_agent();
    agent.get("test://host/cookie_scope_set").call().unwrap();
    agent.get("test://otherhost/cookie_scope_get").call().unwrap();

    assert!(test::captured_header(&capture, "cookie").is_none());
}

#[test]
fn cookies_update_before_redirect_is_followed() {
    // the redirect response sets a cookie; the follow-up request to the
    // same host must already carry it
    test::set_handler("/cookie_redir1", |_| {
        test::make_response(
            302,
            "Found",
            vec![
                "Set-Cookie: hop=1; Path=/",
                "Location: /cookie_redir2",
                "Content-Length: 0",
            ],
            vec![],
        )
    });
    let capture = Arc::new(Mutex::new(vec![]));
    let c = capture.clone();
    test::set_handler("/cookie_redir2", move |_| {
        test::make_captured_response(200, "OK", vec!["Content-Length: 0"], vec![], c.clone())
    });

    let agent = test::test_agent();
    agent.get("test://host/cookie_redir1").call().unwrap();

    assert_eq!(test::captured_header(&capture, "cookie").unwrap(), "hop=1");
}

#[test]
fn challenge_response_cookies_are_kept() {
    // cookie processing happens before status dispatch, so a 401 both
    // sets the cookie and triggers authentication
    test::set_handler("/cookie_401", |_| {
        test::make_response(
            401,
            "Unauthorized",
            vec![
                "Set-Cookie: pre=auth; Path=/",
                "WWW-Authenticate: Basic realm=\"r\"",
                "Content-Length: 0",
            ],
            vec![],
        )
    });
    let capture = Arc::new(Mutex::new(vec![]));
    let c = capture.clone();
    test::set_handler("/cookie_401", move |_| {
        test::make_captured_response(200, "OK", vec!["Content-Length: 0"], vec![], c.clone())
    });

    let agent = test::test_agent();
    agent.get("test://u:p@host/cookie_401").call().unwrap();

    assert_eq!(test::captured_header(&capture, "cookie").unwrap(), "pre=auth");
}

#[test]
fn stored_cookie_api_roundtrip() {
    let agent = test::test_agent();
    let url = Url::parse("test://host/a/b").unwrap();

    agent.store_cookie(CookieInfo::new("host", "/a"), Cookie::new("k", "v"));
    assert_eq!(agent.cookies_for(&url).len(), 1);

    let capture = Arc::new(Mutex::new(vec![]));
    let c = capture.clone();
    test::set_handler("/a/b", move |_| {
        test::make_captured_response(200, "OK", vec!["Content-Length: 0"], vec![], c.clone())
    });
    agent.get("test://host/a/b").call().unwrap();
    assert_eq!(test::captured_header(&capture, "cookie").unwrap(), "k=v");

    assert!(agent.delete_cookie("k", "host", "/a"));
    assert!(agent.cookies_for(&url).is_empty());
}
