//! A small API showing base paths, handler chains and custom error handling.
//!
//! ```sh
//! cargo run --example party
//! curl -X POST localhost:3001/api/party -d '{"age":"21"}'
//! ```

use liviano::middleware::{Cors, CorsConfig, RequestLogger};
use liviano::{chain, json, Application, Context, HttpException, Next, ServerResult, Value};

async fn index(c: Context, _next: Next) -> ServerResult<()> {
    c.text("I'm the base endpoint");
    Ok(())
}

// Lets adults through to the next handler.
async fn check_age(c: Context, next: Next) -> ServerResult<()> {
    let body: Value = c.json_body().await?;
    let age = body["age"]
        .as_str()
        .and_then(|age| age.parse::<f64>().ok())
        .or_else(|| body["age"].as_f64())
        .unwrap_or(0.0);

    if age >= 18.0 {
        next.run().await
    } else {
        Err(HttpException::new(405, "Kids are not allowed to the party 😡").into())
    }
}

async fn welcome(c: Context, _next: Next) -> ServerResult<()> {
    c.json(&json!({ "message": "Hello welcome to the party 🤠🤙" }))
}

async fn fail(_c: Context, _next: Next) -> ServerResult<()> {
    Err(HttpException::new(500, "Internal Server Error").into())
}

async fn all(c: Context, _next: Next) -> ServerResult<()> {
    c.text("I'm the '/all' endpoint");
    Ok(())
}

#[tokio::main]
async fn main() -> ServerResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,liviano=debug".into()),
        )
        .init();

    let mut app = Application::new();
    app.middleware(RequestLogger);
    app.middleware(Cors::new(CorsConfig::default()));
    app.base_path("/api");

    app.get("/", index)
        .post("/party", chain![check_age, welcome])
        .get("/error", fail)
        .all("/all", all);

    app.on_error(|e, c| {
        c.status(e.status);
        c.json(&json!({ "message": format!("Test: {}", e.message) }))
    });
    app.not_found(|c| {
        c.status(404);
        c.json(&json!({ "message": "What are you doing here? 🤔" }))
    });

    let server = app
        .listen_with("127.0.0.1:3001", |addr| println!("Listening to {addr}"))
        .await?;

    tokio::signal::ctrl_c().await?;
    server.close_with(|| println!("Bye")).await;
    Ok(())
}
