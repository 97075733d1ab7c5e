mod app;

#[tokio::main]
async fn main() {
    if let Err(err) = app::run().await {
        eprintln!("qrtrust: {err}");
        std::process::exit(1);
    }
}
