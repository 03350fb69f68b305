#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = math_tutor_api::run().await {
        eprintln!("math-tutor-api fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
