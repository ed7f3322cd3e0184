//! Request-scoped application logging.
//!
//! Run with:
//!   RUST_LOG=info cargo run --example server
//!
//! Try:
//!   curl http://localhost:1323/
//!   curl 'http://localhost:1323/users/42?verbose=1' -H 'cookie: session=abc'
//!
//! Every line the handlers log carries the request's metadata:
//!   {"time":"2024-05-01T20:00:22+09:00","id":"5f0c…","remote_ip":"127.0.0.1","host":"localhost:1323","method":"GET","uri":"/","user_agent":"curl/8.4.0","level":"INFO","message":"This is a log in the hello handler."}

use tagline::middleware::{AppLogger, AppLoggerConfig, RequestId};
use tagline::{Level, Logger, Method, Request, Response, Router, Server};

#[tokio::main]
async fn main() -> Result<(), tagline::Error> {
    tracing_subscriber::fmt::init();

    let app = Router::new()
        .logger(Logger::stdout().with_level(Level::Debug))
        .layer(RequestId::new())
        .layer(AppLogger::with_config(AppLoggerConfig {
            format: concat!(
                r#"{"time":"${time_rfc3339}","id":"${id}","remote_ip":"${remote_ip}","#,
                r#""host":"${host}","method":"${method}","uri":"${uri}","user_agent":"${user_agent}","#,
                r#""session":"${cookie:session}","level":"${level}"}"#,
            )
            .into(),
            ..Default::default()
        })?)
        .on(Method::GET, "/", hello)
        .on(Method::GET, "/users/{id}", get_user);

    Server::bind("0.0.0.0:1323")?.serve(app).await
}

async fn hello(req: Request) -> Response {
    req.logger().info("This is a log in the hello handler.");
    Response::json(br#""Hello, World""#.to_vec())
}

async fn get_user(req: Request) -> Response {
    let id = req.param("id").unwrap_or("unknown");
    if req.query("verbose").is_some() {
        req.logger().debug(format_args!("verbose lookup for user {id}"));
    }
    Response::json(format!(r#"{{"id":"{id}","name":"alice"}}"#).into_bytes())
}
