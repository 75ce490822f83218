mod cli;
mod commands;
mod transport;

use cli::Cli;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let code = Cli::execute().await;
    std::process::exit(code);
}
