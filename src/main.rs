#[tokio::main]
async fn main() {
    rollcall::start_server().await;
}
