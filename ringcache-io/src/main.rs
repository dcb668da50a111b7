use ringcache::builder::Builder;

#[tokio::main]
async fn main() {
    // Build a node with all features enabled. Groups and peers are taken from the config...
    let node = Builder::new().enable_all().build().await;

    node.run().await;
}
