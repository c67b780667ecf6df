mod dispatcher;
mod group;
mod host;
mod proxy;
mod store;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    host::run().await
}
