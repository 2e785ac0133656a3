mod client;
mod entities;
mod host;
mod scheduler;
mod setup;
mod store;
#[cfg(test)]
mod testing;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    host::run().await
}
