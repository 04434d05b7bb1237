mod bus;
mod host;
mod ports;
mod zone_runtime;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    host::run().await
}
