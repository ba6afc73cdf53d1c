use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    match kiosk_checkout_lib::run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}
