#[tokio::main]
async fn main() {
    stackrate::web::run().await;
}
