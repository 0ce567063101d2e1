#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = handwriting_ocr::run().await {
        eprintln!("handwriting-ocr fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
