use std::sync::{Arc, Mutex};

use url::Url;

use crate::auth::{digest_response, md5_hex, Challenge};
use crate::test;
use crate::Error;

#[test]
fn basic_auth_from_userinfo() {
    test::set_handler("/basic_auth", |_| {
        test::make_response(
            401,
            "Unauthorized",
            vec!["WWW-Authenticate: Basic realm=\"r\"", "Content-Length: 0"],
            vec![],
        )
    });
    let capture = Arc::new(Mutex::new(vec![]));
    let c = capture.clone();
    test::set_handler("/basic_auth", move |_| {
        test::make_captured_response(200, "OK", vec!["Content-Length: 0"], vec![], c.clone())
    });
    let resp = test::test_agent()
        .get("test://u:p@host/basic_auth")
        .call()
        .unwrap();
    assert_eq!(resp.status(), 200);
    // base64("u:p")
    assert_eq!(
        test::captured_header(&capture, "authorization").unwrap(),
        "Basic dTpw"
    );
}

#[test]
fn basic_auth_custom_resolver() {
    test::set_handler("/basic_resolver", |_| {
        test::make_response(
            401,
            "Unauthorized",
            vec!["WWW-Authenticate: Basic realm=\"wally\"", "Content-Length: 0"],
            vec![],
        )
    });
    let capture = Arc::new(Mutex::new(vec![]));
    let c = capture.clone();
    test::set_handler("/basic_resolver", move |_| {
        test::make_captured_response(200, "OK", vec!["Content-Length: 0"], vec![], c.clone())
    });
    let agent = crate::AgentBuilder::new()
        .private_cookie_jar()
        .proxy_resolver(|_: &Url| None)
        .server_credentials(|_: &Url, realm: &str| {
            assert_eq!(realm, "wally");
            Some(("user".to_string(), "pass".to_string()))
        })
        .build();
    let resp = agent.get("test://host/basic_resolver").call().unwrap();
    assert_eq!(resp.status(), 200);
    assert!(test::captured_header(&capture, "authorization")
        .unwrap()
        .starts_with("Basic "));
}

#[test]
fn digest_auth_qop_auth() {
    test::set_handler("/digest_auth", |_| {
        test::make_response(
            401,
            "Unauthorized",
            vec![
                "WWW-Authenticate: Digest realm=\"r\", nonce=\"n\", qop=\"auth\", opaque=\"op\"",
                "Content-Length: 0",
            ],
            vec![],
        )
    });
    let capture = Arc::new(Mutex::new(vec![]));
    let c = capture.clone();
    test::set_handler("/digest_auth", move |_| {
        test::make_captured_response(200, "OK", vec!["Content-Length: 0"], vec![], c.clone())
    });
    let resp = test::test_agent()
        .get("test://u:p@host/digest_auth")
        .call()
        .unwrap();
    assert_eq!(resp.status(), 200);

    let value = test::captured_header(&capture, "authorization").unwrap();
    let sent = Challenge::parse(&value).unwrap();
    assert_eq!(sent.scheme(), "digest");
    assert_eq!(sent.get("username"), Some("u"));
    assert_eq!(sent.get("realm"), Some("r"));
    assert_eq!(sent.get("nonce"), Some("n"));
    assert_eq!(sent.get("uri"), Some("/digest_auth"));
    assert_eq!(sent.get("qop"), Some("auth"));
    assert_eq!(sent.get("nc"), Some("00000001"));
    assert_eq!(sent.get("opaque"), Some("op"));

    // the response hash recomputes from the sent cnonce
    let cnonce = sent.get("cnonce").unwrap();
    let expected = digest_response(
        "u",
        "r",
        "p",
        "GET",
        "/digest_auth",
        "n",
        Some("auth"),
        Some(cnonce),
        None,
    );
    assert_eq!(sent.get("response"), Some(expected.as_str()));
}

#[test]
fn digest_auth_int_digests_body() {
    test::set_handler("/digest_int", |_| {
        test::make_response(
            401,
            "Unauthorized",
            vec![
                "WWW-Authenticate: Digest realm=\"r\", nonce=\"n\", qop=\"auth,auth-int\"",
                "Content-Length: 0",
            ],
            vec![],
        )
    });
    let capture = Arc::new(Mutex::new(vec![]));
    let c = capture.clone();
    test::set_handler("/digest_int", move |_| {
        test::make_captured_response(200, "OK", vec!["Content-Length: 0"], vec![], c.clone())
    });
    let resp = test::test_agent()
        .put("test://u:p@host/digest_int")
        .send_string("k=v")
        .unwrap();
    assert_eq!(resp.status(), 200);

    let value = test::captured_header(&capture, "authorization").unwrap();
    let sent = Challenge::parse(&value).unwrap();
    // auth-int wins over auth
    assert_eq!(sent.get("qop"), Some("auth-int"));

    let cnonce = sent.get("cnonce").unwrap();
    let body_hash = md5_hex(&["k=v"]);
    let expected = digest_response(
        "u",
        "r",
        "p",
        "PUT",
        "/digest_int",
        "n",
        Some("auth-int"),
        Some(cnonce),
        Some(&body_hash),
    );
    assert_eq!(sent.get("response"), Some(expected.as_str()));
}

#[test]
fn unknown_auth_scheme_errors() {
    test::set_handler("/unknown_auth", |_| {
        test::make_response(
            401,
            "Unauthorized",
            vec!["WWW-Authenticate: Negotiate abc", "Content-Length: 0"],
            vec![],
        )
    });
    let err = test::test_agent()
        .get("test://u:p@host/unknown_auth")
        .call()
        .unwrap_err();
    match err {
        Error::UnknownAuthType(scheme) => assert_eq!(scheme, "negotiate"),
        other => panic!("expected UnknownAuthType, got {:?}", other),
    }
}

#[test]
fn challenge_without_credentials_is_handed_over() {
    test::set_handler("/no_creds", |_| {
        test::make_response(
            401,
            "Unauthorized",
            vec!["WWW-Authenticate: Basic realm=\"r\"", "Content-Length: 0"],
            vec![],
        )
    });
    // no userinfo, no resolver: the 401 itself comes back
    let err = test::test_agent().get("test://host/no_creds").call().unwrap_err();
    assert_eq!(err.status(), Some(401));
}

#[test]
fn proxy_challenge_uses_proxy_credentials() {
    test::set_handler("/proxy_auth", |_| {
        test::make_response(
            407,
            "Proxy Authentication Required",
            vec!["Proxy-Authenticate: Basic realm=\"px\"", "Content-Length: 0"],
            vec![],
        )
    });
    let capture = Arc::new(Mutex::new(vec![]));
    let c = capture.clone();
    test::set_handler("/proxy_auth", move |_| {
        test::make_captured_response(200, "OK", vec!["Content-Length: 0"], vec![], c.clone())
    });
    let proxy = Url::parse("test://pu:pp@proxyhost:9/").unwrap();
    let agent = crate::AgentBuilder::new()
        .private_cookie_jar()
        .proxy(proxy)
        .build();
    let resp = agent.get("test://host/proxy_auth").call().unwrap();
    assert_eq!(resp.status(), 200);

    let text = test::captured(&capture);
    // proxied requests use the absolute form
    assert!(text.starts_with("GET test://host/proxy_auth HTTP/1.1\r\n"), "{}", text);
    // base64("pu:pp")
    assert_eq!(
        test::captured_header(&capture, "proxy-authorization").unwrap(),
        "Basic cHU6cHA="
    );
}
