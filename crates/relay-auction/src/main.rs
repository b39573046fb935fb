#[tokio::main]
async fn main() {
    relay_auction::start(std::env::args()).await;
}
