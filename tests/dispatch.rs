use liviano::{
    chain, json, Application, Body, Context, DispatchMode, HttpException, Method, Next, Request,
    ServerError, ServerResult, Value,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

async fn call(app: &Application, method: Method, url: &str) -> liviano::Response {
    app.handle(Request::new(method, url)).await
}

async fn post_json(app: &Application, url: &str, body: &str) -> liviano::Response {
    let request = Request::new(Method::POST, url)
        .header("Content-Type", "application/json")
        .body(Body::from_bytes(body));
    app.handle(request).await
}

async fn echo_params(c: Context, _next: Next) -> ServerResult<()> {
    c.json(c.params())
}

#[tokio::test]
async fn params_are_captured_by_position() {
    let mut app = Application::new();
    app.get("/users/:id/posts/:postId", echo_params);

    let response = call(&app, Method::GET, "/users/42/posts/7").await;
    assert_eq!(response.status, 200);
    let body: Value = response.json().unwrap();
    assert_eq!(body, json!({ "id": "42", "postId": "7" }));
}

#[tokio::test]
async fn query_is_shared_with_the_handler() {
    async fn search(c: Context, _next: Next) -> ServerResult<()> {
        c.text(format!("{}:{}", c.query("q").unwrap_or(""), c.path()));
        Ok(())
    }

    let mut app = Application::new();
    app.get("/search", search);

    let response = call(&app, Method::GET, "/search?q=hello%20world").await;
    assert_eq!(response.body, "hello world:/search");
}

#[tokio::test]
async fn every_basic_verb_reaches_its_route() {
    async fn which(c: Context, _next: Next) -> ServerResult<()> {
        c.text(format!("Hello I am a {} request", c.method()));
        Ok(())
    }

    let mut app = Application::new();
    app.base_path("/api");
    app.get("/", which)
        .post("/", which)
        .put("/", which)
        .patch("/", which)
        .delete("/", which);

    for method in [Method::GET, Method::POST, Method::PUT, Method::PATCH, Method::DELETE] {
        let response = call(&app, method, "/api/").await;
        assert_eq!(response.status, 200);
        assert_eq!(response.body, format!("Hello I am a {} request", method));
        assert_eq!(response.get_header("Content-Type"), Some("text/plain"));
    }
}

#[tokio::test]
async fn all_route_matches_every_verb() {
    async fn all(c: Context, _next: Next) -> ServerResult<()> {
        c.text("I'm the '/all' endpoint");
        Ok(())
    }

    let mut app = Application::new();
    app.all("/all", all);

    for method in [Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::TRACE, Method::CONNECT] {
        let response = call(&app, method, "/all").await;
        assert_eq!(response.status, 200, "{method}");
        assert_eq!(response.body, "I'm the '/all' endpoint");
    }
}

#[tokio::test]
async fn method_mismatch_is_not_found() {
    let mut app = Application::new();
    app.get("/only-get", echo_params);

    let response = call(&app, Method::POST, "/only-get").await;
    assert_eq!(response.status, 404);
}

#[tokio::test]
async fn options_matches_any_declared_method() {
    async fn reached(c: Context, _next: Next) -> ServerResult<()> {
        c.text(format!("{} reached", c.method()));
        Ok(())
    }

    let mut app = Application::new();
    app.post("/things", reached);

    let response = call(&app, Method::OPTIONS, "/things").await;
    assert_eq!(response.status, 200);
    assert_eq!(response.body, "OPTIONS reached");
}

#[tokio::test]
async fn middleware_registered_after_a_route_does_not_apply_to_it() {
    async fn tag(c: Context, next: Next) -> ServerResult<()> {
        c.header("X-Tagged", "yes");
        next.run().await
    }

    let mut app = Application::new();
    app.get("/early", echo_params);
    app.middleware(tag);
    app.get("/late", echo_params);

    let early = call(&app, Method::GET, "/early").await;
    assert_eq!(early.get_header("X-Tagged"), None);

    let late = call(&app, Method::GET, "/late").await;
    assert_eq!(late.get_header("X-Tagged"), Some("yes"));
}

#[tokio::test]
async fn middleware_runs_in_registration_order_around_the_route() {
    let log: Arc<Mutex<Vec<String>>> = Arc::default();

    let wrap = |name: &'static str, log: Arc<Mutex<Vec<String>>>| {
        move |_c: Context, next: Next| {
            let log = Arc::clone(&log);
            async move {
                log.lock().unwrap().push(format!("{name}:in"));
                next.run().await?;
                log.lock().unwrap().push(format!("{name}:out"));
                Ok::<(), ServerError>(())
            }
        }
    };

    let mut app = Application::new();
    app.middleware(wrap("first", Arc::clone(&log)));
    app.middleware(wrap("second", Arc::clone(&log)));
    app.get("/", echo_params);

    call(&app, Method::GET, "/").await;
    assert_eq!(
        *log.lock().unwrap(),
        vec!["first:in", "second:in", "second:out", "first:out"]
    );
}

#[tokio::test]
async fn gate_without_next_halts_chain_but_response_is_sent() {
    let ran = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&ran);

    async fn gate(c: Context, _next: Next) -> ServerResult<()> {
        c.status(401);
        c.text("stopped");
        Ok(())
    }

    let mut app = Application::new();
    app.get(
        "/guarded",
        chain![gate, move |_c: Context, _next: Next| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<(), ServerError>(())
            }
        }],
    );

    let response = call(&app, Method::GET, "/guarded").await;
    assert_eq!(response.status, 401);
    assert_eq!(response.body, "stopped");
    assert_eq!(ran.load(Ordering::SeqCst), 0);
}

async fn check_age(c: Context, next: Next) -> ServerResult<()> {
    let body: Value = c.json_body().await?;
    let age: u32 = body["age"].as_str().and_then(|a| a.parse().ok()).unwrap_or(0);
    if age >= 18 {
        next.run().await
    } else {
        Err(HttpException::new(405, "Kids are not allowed to the party 😡").into())
    }
}

async fn welcome(c: Context, _next: Next) -> ServerResult<()> {
    c.json(&json!({ "message": "Hello welcome to the party 🤠🤙" }))
}

fn party_app() -> Application {
    let mut app = Application::new();
    app.base_path("/api");
    app.post("/party", chain![check_age, welcome]);
    app.on_error(|e, c| {
        c.status(e.status);
        c.json(&json!({ "message": format!("Test: {}", e.message) }))
    });
    app
}

#[tokio::test]
async fn adult_gets_into_the_party() {
    let response = post_json(&party_app(), "/api/party", r#"{"age":"18"}"#).await;
    assert_eq!(response.status, 200);
    assert_eq!(response.get_header("Content-Type"), Some("application/json"));
    let body: Value = response.json().unwrap();
    assert_eq!(body, json!({ "message": "Hello welcome to the party 🤠🤙" }));
}

#[tokio::test]
async fn http_exception_goes_through_the_error_handler() {
    let response = post_json(&party_app(), "/api/party", r#"{"age":"17"}"#).await;
    assert_eq!(response.status, 405);
    let body: Value = response.json().unwrap();
    assert_eq!(
        body,
        json!({ "message": "Test: Kids are not allowed to the party 😡" })
    );
}

#[tokio::test]
async fn default_error_handler_uses_exception_verbatim() {
    async fn teapot(_c: Context, _next: Next) -> ServerResult<()> {
        Err(ServerError::http(418, "short and stout"))
    }

    let mut app = Application::new();
    app.get("/tea", teapot);

    let response = call(&app, Method::GET, "/tea").await;
    assert_eq!(response.status, 418);
    assert_eq!(response.body, r#"{"message":"short and stout"}"#);
}

#[tokio::test]
async fn unknown_route_gets_default_not_found() {
    let app = Application::new();
    let response = call(&app, Method::GET, "/unknown").await;
    assert_eq!(response.status, 404);
    let body: Value = response.json().unwrap();
    assert_eq!(body, json!({ "message": "Route \"/unknown\" does not exist" }));
}

#[tokio::test]
async fn custom_not_found_handler() {
    let mut app = Application::new();
    app.not_found(|c| {
        c.status(404);
        c.json(&json!({ "message": "What are you doing here? 🤔" }))
    });

    let response = call(&app, Method::GET, "/nope").await;
    assert_eq!(response.status, 404);
    assert_eq!(response.body, r#"{"message":"What are you doing here? 🤔"}"#);
}

#[tokio::test]
async fn unexpected_failure_is_a_generic_500() {
    async fn broken(_c: Context, _next: Next) -> ServerResult<()> {
        Err(ServerError::Internal("database password is hunter2".to_string()))
    }

    let mut app = Application::new();
    app.on_error(|_e, c| {
        c.status(299);
        Ok(())
    });
    app.get("/broken", broken);

    let response = call(&app, Method::GET, "/broken").await;
    assert_eq!(response.status, 500);
    assert_eq!(response.body, r#"{"message":"Internal Server Error"}"#);
    assert!(!response.body.contains("hunter2"));
}

#[tokio::test]
async fn malformed_json_body_is_an_unexpected_failure() {
    let response = post_json(&party_app(), "/api/party", "{age: 18").await;
    assert_eq!(response.status, 500);
    assert_eq!(response.body, r#"{"message":"Internal Server Error"}"#);
}

#[tokio::test]
async fn empty_body_parses_as_empty_object() {
    async fn echo_body(c: Context, _next: Next) -> ServerResult<()> {
        let body: Value = c.json_body().await?;
        c.json(&body)
    }

    let mut app = Application::new();
    app.post("/echo", echo_body);

    let response = call(&app, Method::POST, "/echo").await;
    assert_eq!(response.status, 200);
    assert_eq!(response.body, "{}");
}

#[tokio::test]
async fn oversized_body_is_rejected_with_413() {
    let mut app = party_app();
    app.max_body_size(8);

    let response = post_json(&app, "/api/party", r#"{"age":"18","plus_one":true}"#).await;
    assert_eq!(response.status, 413);
    let body: Value = response.json().unwrap();
    assert_eq!(body, json!({ "message": "Test: Payload Too Large" }));
}

#[tokio::test(start_paused = true)]
async fn body_that_never_arrives_times_out() {
    async fn needs_body(c: Context, _next: Next) -> ServerResult<()> {
        let _: Value = c.json_body().await?;
        c.text("unreachable");
        Ok(())
    }

    let mut app = Application::new();
    app.body_timeout(Duration::from_secs(30));
    app.post("/slow", needs_body);

    let (_client, server_side) = tokio::io::duplex(64);
    let request = Request::new(Method::POST, "/slow").body(Body::from_reader(server_side, 12));
    let response = app.handle(request).await;
    assert_eq!(response.status, 500);
    assert_eq!(response.body, r#"{"message":"Internal Server Error"}"#);
}

#[tokio::test]
async fn handler_panic_becomes_500() {
    async fn explode(_c: Context, _next: Next) -> ServerResult<()> {
        panic!("boom");
    }

    let mut app = Application::new();
    app.get("/panic", explode);

    let response = call(&app, Method::GET, "/panic").await;
    assert_eq!(response.status, 500);
    assert_eq!(response.body, r#"{"message":"Internal Server Error"}"#);
}

#[tokio::test]
async fn last_status_and_header_writes_win() {
    async fn indecisive(c: Context, _next: Next) -> ServerResult<()> {
        c.status(201);
        c.header("X-Mood", "happy");
        c.status(202);
        c.header("X-Mood", "sad");
        c.text("maybe");
        Ok(())
    }

    let mut app = Application::new();
    app.get("/", indecisive);

    let response = call(&app, Method::GET, "/").await;
    assert_eq!(response.status, 202);
    assert_eq!(response.get_header("X-Mood"), Some("sad"));
}

#[tokio::test]
async fn headers_set_before_an_exception_survive() {
    async fn tagged_failure(c: Context, _next: Next) -> ServerResult<()> {
        c.header("X-Request-Id", "abc");
        Err(ServerError::http(409, "conflict"))
    }

    let mut app = Application::new();
    app.get("/", tagged_failure);

    let response = call(&app, Method::GET, "/").await;
    assert_eq!(response.status, 409);
    assert_eq!(response.get_header("X-Request-Id"), Some("abc"));
}

fn overlapping_app(mode: DispatchMode, hits: Arc<AtomicUsize>) -> Application {
    let counting = move |body: &'static str| {
        let hits = Arc::clone(&hits);
        move |c: Context, _next: Next| {
            let hits = Arc::clone(&hits);
            async move {
                hits.fetch_add(1, Ordering::SeqCst);
                c.text(body);
                Ok::<(), ServerError>(())
            }
        }
    };

    let mut app = Application::new();
    app.dispatch_mode(mode);
    app.get("/items/:id", counting("by id"));
    app.get("/items/latest", counting("latest"));
    app
}

#[tokio::test]
async fn first_match_wins_by_default() {
    let hits = Arc::new(AtomicUsize::new(0));
    let app = overlapping_app(DispatchMode::FirstMatch, Arc::clone(&hits));

    let response = call(&app, Method::GET, "/items/latest").await;
    assert_eq!(response.body, "by id");
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn every_match_runs_all_chains_and_sends_the_last() {
    let hits = Arc::new(AtomicUsize::new(0));
    let app = overlapping_app(DispatchMode::EveryMatch, Arc::clone(&hits));

    let response = call(&app, Method::GET, "/items/latest").await;
    assert_eq!(response.body, "latest");
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}
