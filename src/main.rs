#[tokio::main]
async fn main() -> anyhow::Result<()> {
    toxiscan_lib::init_logging();
    let args: Vec<String> = std::env::args().skip(1).collect();
    toxiscan_lib::api::run(args).await
}
