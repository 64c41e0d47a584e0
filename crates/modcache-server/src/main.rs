//! Entrypoint for the `modcache-server` binary.

#[tokio::main]
async fn main() {
    if let Err(e) = modcache_server::run().await {
        eprintln!("{e:?}");
        std::process::exit(1);
    }
}
