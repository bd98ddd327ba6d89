//! Check whether ffmpeg is usable.
//!
//! Usage: cargo run --example probe

#[tokio::main]
async fn main() {
    match mediascribe::check_ffmpeg().await {
        Ok(()) => println!("ffmpeg is installed and working"),
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    }
}
