//! CORS configured from JSON, restricted to two front-end origins.
//!
//! ```sh
//! cargo run --example cors
//! curl -i -X OPTIONS localhost:3002/todos -H 'Origin: http://localhost:5173'
//! ```

use liviano::middleware::{Cors, CorsConfig};
use liviano::{json, Application, Context, Next, ServerResult};

const CORS: &str = r#"{
    "origin": ["http://localhost:5173", "https://todo.example"],
    "allowHeaders": ["Content-Type", "Authorization"],
    "exposeHeaders": ["X-Total-Count"],
    "credentials": true,
    "maxAge": 600
}"#;

async fn list(c: Context, _next: Next) -> ServerResult<()> {
    c.header("X-Total-Count", "2");
    c.json(&json!([
        { "id": 1, "title": "write docs", "done": false },
        { "id": 2, "title": "ship it", "done": true },
    ]))
}

async fn show(c: Context, _next: Next) -> ServerResult<()> {
    let id = c.param("id").unwrap_or_default();
    c.json(&json!({ "id": id, "title": "write docs", "done": false }))
}

#[tokio::main]
async fn main() -> ServerResult<()> {
    tracing_subscriber::fmt().init();

    let config: CorsConfig = serde_json::from_str(CORS)?;

    let mut app = Application::new();
    app.middleware(Cors::new(config));
    app.get("/todos", list).get("/todos/:id", show);

    let server = app.listen("127.0.0.1:3002").await?;
    println!("Listening on http://{}", server.local_addr());

    tokio::signal::ctrl_c().await?;
    server.close().await;
    Ok(())
}
