//! sociable-web: HTTP and WebSocket server binary.

#[tokio::main]
async fn main() {
    if let Err(error) = sociable::web::run().await {
        eprintln!("error: {error}");
        std::process::exit(1);
    }
}
