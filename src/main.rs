use imagegate::app;

#[tokio::main]
async fn main() {
    let code = app::startup::startup().await;
    std::process::exit(code);
}
